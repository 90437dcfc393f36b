use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed id of the assistant contact. Its replies come from the text generator.
pub const BOT_USER_ID: Uuid = Uuid::from_u128(0xb07);

pub const BOT_USERNAME: &str = "gemini";

pub const BOT_DISPLAY_NAME: &str = "Gemini";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub profile_pic: Option<String>,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
}

/// A direct message between two users.
///
/// `reply_to` is resolved on read: it summarizes the referenced message, or
/// is `None` when no reference was set or the target has since been deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub reply_to: Option<ReplySummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySummary {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub text: Option<String>,
    pub has_image: bool,
    pub has_audio: bool,
}

/// Payload of a message. Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Drops fields that are empty or whitespace-only.
    pub fn normalized(self) -> Self {
        Self {
            text: non_blank(self.text),
            image: non_blank(self.image),
            audio: non_blank(self.audio),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none() && self.audio.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
