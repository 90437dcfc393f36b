use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events pushed to clients over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server accepted the connection
    Ready { user_id: Uuid, username: String },

    /// Users currently connected
    Presence { user_ids: Vec<Uuid> },

    /// A new message addressed to this user
    Created(Message),

    /// A message in one of this user's conversations was edited
    Updated(Message),

    /// A message was deleted; only the id is sent
    Deleted { message_id: Uuid },

    /// The assistant could not answer `message_id`
    BotReplyFailed { message_id: Uuid, reason: String },
}

impl GatewayEvent {
    /// Wire name of the event, as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Presence { .. } => "presence",
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Deleted { .. } => "deleted",
            Self::BotReplyFailed { .. } => "bot_reply_failed",
        }
    }
}
