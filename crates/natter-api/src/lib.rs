pub mod auth;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod summarize;
pub mod textgen;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use conversation::{Conversations, SendOutcome};
pub use error::ApiError;
pub use routes::router;

use std::sync::Arc;

use natter_db::Database;
use tracing::error;

/// Run a store call on the blocking pool.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> natter_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(ApiError::from)
}
