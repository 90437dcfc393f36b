pub mod connection;
pub mod dispatcher;
pub mod presence;

pub use dispatcher::{Delivery, Dispatcher};
pub use presence::{ConnectionHandle, PresenceRegistry};
