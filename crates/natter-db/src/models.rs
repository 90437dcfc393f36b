//! Database row types. These map directly to SQLite rows and stay distinct
//! from the `natter-types` models so the schema can change independently.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use natter_types::models::{Message, ReplySummary, User};

use crate::error::{Result, StoreError};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub profile_pic: Option<String>,
    pub is_bot: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id, "users.id")?,
            username: self.username,
            display_name: self.display_name,
            profile_pic: self.profile_pic,
            is_bot: self.is_bot,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Message row joined with the summary columns of its reply target.
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub created_at: String,
    pub reply_id: Option<String>,
    pub reply_sender_id: Option<String>,
    pub reply_text: Option<String>,
    pub reply_has_image: bool,
    pub reply_has_audio: bool,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let reply_to = match (self.reply_id, self.reply_sender_id) {
            (Some(id), Some(sender_id)) => Some(ReplySummary {
                id: parse_uuid(&id, "reply.id")?,
                sender_id: parse_uuid(&sender_id, "reply.sender_id")?,
                text: self.reply_text,
                has_image: self.reply_has_image,
                has_audio: self.reply_has_audio,
            }),
            _ => None,
        };

        Ok(Message {
            id: parse_uuid(&self.id, "messages.id")?,
            sender_id: parse_uuid(&self.sender_id, "messages.sender_id")?,
            receiver_id: parse_uuid(&self.receiver_id, "messages.receiver_id")?,
            text: self.text,
            image: self.image,
            audio: self.audio,
            reply_to,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Fields to overwrite on edit. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none() && self.audio.is_none()
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so that string order is
/// chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{} '{}': {}", column, raw, e)))
}
