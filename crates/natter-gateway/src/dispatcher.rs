use tracing::{debug, trace};
use uuid::Uuid;

use natter_types::events::GatewayEvent;

use crate::presence::{ConnectionHandle, PresenceRegistry};

/// Result of a single best-effort push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Receiver not connected. Not an error: history is the source of truth.
    Missed,
}

/// Routes events to connected users through the presence registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    presence: PresenceRegistry,
}

impl Dispatcher {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Pushes `event` to `receiver_id` once, if connected. Never blocks and
    /// never retries.
    pub fn notify(&self, receiver_id: Uuid, event: GatewayEvent) -> Delivery {
        let kind = event.kind();
        let Some(handle) = self.presence.lookup(receiver_id) else {
            debug!("{} offline, skipping {}", receiver_id, kind);
            return Delivery::Missed;
        };

        if handle.push(event) {
            trace!("Delivered {} to {}", kind, receiver_id);
            Delivery::Delivered
        } else {
            debug!(
                "Connection {} for {} closed before {} was pushed",
                handle.conn_id(),
                receiver_id,
                kind
            );
            Delivery::Missed
        }
    }

    /// Registers a new connection for `user_id`. The superseded connection,
    /// if any, is dropped here so its push loop ends.
    pub fn connect(&self, user_id: Uuid, handle: ConnectionHandle) {
        if let Some(previous) = self.presence.register(user_id, handle) {
            debug!(
                "{} reconnected, replacing connection {}",
                user_id,
                previous.conn_id()
            );
        }
        self.broadcast_presence();
    }

    /// Drops the connection's presence entry, then tells everyone.
    pub fn disconnect(&self, conn_id: Uuid) {
        if self.presence.unregister(conn_id).is_some() {
            self.broadcast_presence();
        }
    }

    /// Sends the current online list to every connected user.
    pub fn broadcast_presence(&self) {
        let user_ids = self.presence.online_users();
        for handle in self.presence.handles() {
            let _ = handle.push(GatewayEvent::Presence {
                user_ids: user_ids.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natter_types::models::Message;

    fn message(sender_id: Uuid, receiver_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            text: Some("hi".into()),
            image: None,
            audio: None,
            reply_to: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn notify_offline_user_is_a_silent_miss() {
        let dispatcher = Dispatcher::default();
        let someone = Uuid::new_v4();
        let (watcher, mut watcher_rx) = ConnectionHandle::new();
        dispatcher.presence().register(Uuid::new_v4(), watcher);

        let outcome = dispatcher.notify(
            someone,
            GatewayEvent::Deleted {
                message_id: Uuid::new_v4(),
            },
        );

        assert_eq!(outcome, Delivery::Missed);
        assert!(!dispatcher.presence().is_online(someone));
        assert_eq!(dispatcher.presence().online_users().len(), 1);
        assert!(watcher_rx.try_recv().is_err());
    }

    #[test]
    fn notify_reaches_only_the_latest_connection() {
        let dispatcher = Dispatcher::default();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (h1, mut rx1) = ConnectionHandle::new();
        let (h2, mut rx2) = ConnectionHandle::new();
        dispatcher.presence().register(bob, h1);
        dispatcher.presence().register(bob, h2);

        let msg = message(alice, bob);
        let outcome = dispatcher.notify(bob, GatewayEvent::Created(msg.clone()));

        assert_eq!(outcome, Delivery::Delivered);
        assert_eq!(rx2.try_recv().unwrap(), GatewayEvent::Created(msg));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn notify_after_receiver_dropped_is_a_miss() {
        let dispatcher = Dispatcher::default();
        let bob = Uuid::new_v4();
        let (handle, rx) = ConnectionHandle::new();
        dispatcher.presence().register(bob, handle);
        drop(rx);

        let outcome = dispatcher.notify(bob, GatewayEvent::Updated(message(Uuid::new_v4(), bob)));
        assert_eq!(outcome, Delivery::Missed);
    }

    #[test]
    fn connect_and_disconnect_broadcast_presence() {
        let dispatcher = Dispatcher::default();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (ha, mut rx_a) = ConnectionHandle::new();
        let (hb, _rx_b) = ConnectionHandle::new();
        let bob_conn = hb.conn_id();

        dispatcher.connect(alice, ha);
        assert_eq!(
            rx_a.try_recv().unwrap(),
            GatewayEvent::Presence { user_ids: vec![alice] }
        );

        dispatcher.connect(bob, hb);
        match rx_a.try_recv().unwrap() {
            GatewayEvent::Presence { mut user_ids } => {
                user_ids.sort();
                let mut expected = vec![alice, bob];
                expected.sort();
                assert_eq!(user_ids, expected);
            }
            other => panic!("unexpected event {:?}", other),
        }

        dispatcher.disconnect(bob_conn);
        assert_eq!(
            rx_a.try_recv().unwrap(),
            GatewayEvent::Presence { user_ids: vec![alice] }
        );

        // Second disconnect for the same connection changes nothing
        dispatcher.disconnect(bob_conn);
        assert!(rx_a.try_recv().is_err());
    }
}
