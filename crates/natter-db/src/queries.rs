use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::info;
use uuid::Uuid;

use natter_types::models::{
    BOT_DISPLAY_NAME, BOT_USER_ID, BOT_USERNAME, Message, MessageContent, User,
};

use crate::Database;
use crate::error::{Result, StoreError};
use crate::models::{MessagePatch, MessageRow, UserRow, format_timestamp};

/// Bot accounts never log in; this is not a valid PHC string.
const BOT_PASSWORD: &str = "!";

const USER_COLUMNS: &str =
    "id, username, display_name, password, profile_pic, is_bot, created_at";

// Reply summary is resolved with a self-join so a conversation loads in one query.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.sender_id, m.receiver_id, m.text, m.image, m.audio, m.created_at,
           r.id, r.sender_id, r.text, r.image IS NOT NULL, r.audio IS NOT NULL
    FROM messages m
    LEFT JOIN messages r ON r.id = m.reply_to";

impl Database {
    // -- Users --

    /// Fails with `Conflict` if the username is taken, including when a
    /// concurrent registration wins the race.
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        display_name: &str,
        password_hash: &str,
        profile_pic: Option<&str>,
    ) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, password, profile_pic, is_bot, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    id.to_string(),
                    username,
                    display_name,
                    password_hash,
                    profile_pic,
                    format_timestamp(Utc::now()),
                ],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => {
                    StoreError::Conflict(format!("username '{}'", username))
                }
                _ => StoreError::Sqlite(e),
            })?;
            query_user(conn, "id", &id.to_string())?
                .ok_or(StoreError::NotFound)?
                .into_user()
        })
    }

    /// Returns the raw row, password hash included, for login.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            query_user(conn, "id", &id.to_string())?
                .map(UserRow::into_user)
                .transpose()
        })
    }

    /// Contacts for the sidebar: everyone but `id`, bot first.
    pub fn list_users_except(&self, id: Uuid) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE id != ?1 ORDER BY is_bot DESC, display_name COLLATE NOCASE",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([id.to_string()], row_to_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(UserRow::into_user).collect()
        })
    }

    /// Creates the assistant account if it does not exist yet.
    pub fn ensure_bot_user(&self) -> Result<User> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (id, username, display_name, password, profile_pic, is_bot, created_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, 1, ?5)",
                params![
                    BOT_USER_ID.to_string(),
                    BOT_USERNAME,
                    BOT_DISPLAY_NAME,
                    BOT_PASSWORD,
                    format_timestamp(Utc::now()),
                ],
            )?;
            if inserted > 0 {
                info!("Created assistant account {}", BOT_USER_ID);
            }

            query_user(conn, "id", &BOT_USER_ID.to_string())?
                .ok_or(StoreError::NotFound)?
                .into_user()
        })
    }

    // -- Messages --

    /// Persists a new message with a generated id and timestamp.
    pub fn append_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &MessageContent,
        reply_to: Option<Uuid>,
    ) -> Result<Message> {
        let id = Uuid::new_v4().to_string();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image, audio, reply_to, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    content.text,
                    content.image,
                    content.audio,
                    reply_to.map(|r| r.to_string()),
                    format_timestamp(Utc::now()),
                ],
            )?;
            query_message(conn, &id)
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.with_conn(|conn| query_message(conn, &id.to_string()))
    }

    /// Overwrites only the fields set in `patch`.
    pub fn update_message(&self, id: Uuid, patch: &MessagePatch) -> Result<Message> {
        let id = id.to_string();

        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages
                 SET text  = COALESCE(?2, text),
                     image = COALESCE(?3, image),
                     audio = COALESCE(?4, audio)
                 WHERE id = ?1",
                params![id, patch.text, patch.image, patch.audio],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            query_message(conn, &id)
        })
    }

    /// Deletes a message and returns it as it was.
    pub fn remove_message(&self, id: Uuid) -> Result<Message> {
        let id = id.to_string();

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let message = query_message(&tx, &id)?;
            tx.execute("DELETE FROM messages WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(message)
        })
    }

    /// All messages exchanged between `a` and `b`, oldest first.
    pub fn conversation_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                    OR (m.sender_id = ?2 AND m.receiver_id = ?1)
                 ORDER BY m.created_at ASC, m.rowid ASC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![a.to_string(), b.to_string()], row_to_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn.query_row(&sql, [value], row_to_user).optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, id: &str) -> Result<Message> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    conn.query_row(&sql, [id], row_to_message)
        .optional()?
        .ok_or(StoreError::NotFound)?
        .into_message()
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        is_bot: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        audio: row.get(5)?,
        created_at: row.get(6)?,
        reply_id: row.get(7)?,
        reply_sender_id: row.get(8)?,
        reply_text: row.get(9)?,
        reply_has_image: row.get(10)?,
        reply_has_audio: row.get(11)?,
    })
}
