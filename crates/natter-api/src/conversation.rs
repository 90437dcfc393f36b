use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use natter_db::{Database, MessagePatch};
use natter_gateway::Dispatcher;
use natter_types::events::GatewayEvent;
use natter_types::models::{BOT_USER_ID, Message, MessageContent};

use crate::blocking;
use crate::error::ApiError;
use crate::media::{MediaHost, is_remote_url, validate_audio};
use crate::textgen::Assistant;

/// What `send_message` hands back: the persisted message, and for messages
/// to the bot, the task producing its answer.
pub struct SendOutcome {
    pub message: Message,
    pub bot_reply: Option<JoinHandle<Result<Message, ApiError>>>,
}

/// Message lifecycle (send, edit, delete, read) with live delivery.
///
/// Every mutation is persisted first and then pushed to the other
/// participant, in that order.
#[derive(Clone)]
pub struct Conversations {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    assistant: Option<Assistant>,
    media: Option<Arc<dyn MediaHost>>,
}

impl Conversations {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self {
            db,
            dispatcher,
            assistant: None,
            media: None,
        }
    }

    pub fn with_assistant(mut self, assistant: Assistant) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn with_media_host(mut self, media: Arc<dyn MediaHost>) -> Self {
        self.media = Some(media);
        self
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: MessageContent,
        reply_to: Option<Uuid>,
    ) -> Result<SendOutcome, ApiError> {
        let mut content = content.normalized();
        if content.is_empty() {
            return Err(ApiError::BadRequest(
                "message needs text, an image or audio".into(),
            ));
        }
        if let Some(audio) = &content.audio {
            validate_audio(audio)?;
        }

        self.ensure_receiver(receiver_id).await?;
        if let Some(target) = reply_to {
            self.check_reply_target(sender_id, receiver_id, target).await?;
        }

        // Media first: a failed upload must not leave a message behind
        content.image = self.host_image(content.image).await?;

        let message = blocking(&self.db, move |db| {
            db.append_message(sender_id, receiver_id, &content, reply_to)
        })
        .await?;

        self.dispatcher
            .notify(receiver_id, GatewayEvent::Created(message.clone()));

        let bot_reply = (receiver_id == BOT_USER_ID).then(|| self.spawn_bot_reply(message.clone()));

        Ok(SendOutcome { message, bot_reply })
    }

    /// Applies `patch` to a message sent by `actor`.
    pub async fn edit_message(
        &self,
        actor: Uuid,
        message_id: Uuid,
        patch: MessagePatch,
    ) -> Result<Message, ApiError> {
        let normalized = MessageContent {
            text: patch.text,
            image: patch.image,
            audio: patch.audio,
        }
        .normalized();
        if normalized.is_empty() {
            return Err(ApiError::BadRequest("nothing to update".into()));
        }
        if let Some(audio) = &normalized.audio {
            validate_audio(audio)?;
        }

        self.owned_message(actor, message_id).await?;

        let patch = MessagePatch {
            text: normalized.text,
            image: self.host_image(normalized.image).await?,
            audio: normalized.audio,
        };
        let updated = blocking(&self.db, move |db| db.update_message(message_id, &patch)).await?;

        self.dispatcher
            .notify(updated.receiver_id, GatewayEvent::Updated(updated.clone()));

        Ok(updated)
    }

    /// Deletes a message sent by `actor` and returns it as it was.
    pub async fn delete_message(&self, actor: Uuid, message_id: Uuid) -> Result<Message, ApiError> {
        self.owned_message(actor, message_id).await?;

        let removed = blocking(&self.db, move |db| db.remove_message(message_id)).await?;

        self.dispatcher
            .notify(removed.receiver_id, GatewayEvent::Deleted { message_id });

        Ok(removed)
    }

    /// History between `viewer` and `peer`, oldest first.
    pub async fn conversation(&self, viewer: Uuid, peer: Uuid) -> Result<Vec<Message>, ApiError> {
        blocking(&self.db, move |db| db.conversation_between(viewer, peer)).await
    }

    async fn ensure_receiver(&self, receiver_id: Uuid) -> Result<(), ApiError> {
        if receiver_id == BOT_USER_ID {
            blocking(&self.db, |db| db.ensure_bot_user()).await?;
            return Ok(());
        }

        blocking(&self.db, move |db| db.get_user_by_id(receiver_id))
            .await?
            .map(|_| ())
            .ok_or(ApiError::NotFound("User"))
    }

    /// A reply may only point at a message between the same two users.
    async fn check_reply_target(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        target: Uuid,
    ) -> Result<(), ApiError> {
        let original = blocking(&self.db, move |db| db.get_message(target)).await?;
        let same_pair = (original.sender_id == sender_id && original.receiver_id == receiver_id)
            || (original.sender_id == receiver_id && original.receiver_id == sender_id);
        if !same_pair {
            return Err(ApiError::BadRequest(
                "can only reply to a message in this conversation".into(),
            ));
        }
        Ok(())
    }

    async fn owned_message(&self, actor: Uuid, message_id: Uuid) -> Result<Message, ApiError> {
        let message = blocking(&self.db, move |db| db.get_message(message_id)).await?;
        if message.sender_id != actor {
            return Err(ApiError::Forbidden(
                "only the sender can change a message".into(),
            ));
        }
        Ok(message)
    }

    /// Uploads an inline image and returns its URL. URLs pass through, and
    /// without a media host the value is stored as given.
    async fn host_image(&self, image: Option<String>) -> Result<Option<String>, ApiError> {
        let Some(image) = image else {
            return Ok(None);
        };
        if is_remote_url(&image) {
            return Ok(Some(image));
        }
        let Some(media) = &self.media else {
            debug!("No media host configured, storing inline image");
            return Ok(Some(image));
        };

        let url = media.upload_image(&image).await.map_err(|e| {
            warn!("Image upload failed: {:#}", e);
            ApiError::Upstream(format!("image upload failed: {}", e))
        })?;
        Ok(Some(url))
    }

    fn spawn_bot_reply(&self, prompt: Message) -> JoinHandle<Result<Message, ApiError>> {
        let this = self.clone();
        tokio::spawn(async move { this.bot_reply(prompt).await })
    }

    /// Answers `prompt` as the bot. The user's own message is already stored;
    /// on failure only the answer is skipped and the user is told so.
    async fn bot_reply(&self, prompt: Message) -> Result<Message, ApiError> {
        let user_id = prompt.sender_id;

        let reply = match self.generate_bot_text(&prompt).await {
            Ok(text) => {
                let content = MessageContent::text(text);
                let reply_to = Some(prompt.id);
                blocking(&self.db, move |db| {
                    db.append_message(BOT_USER_ID, user_id, &content, reply_to)
                })
                .await
            }
            Err(e) => Err(e),
        };

        match reply {
            Ok(reply) => {
                info!("Assistant answered message {} from {}", prompt.id, user_id);
                self.dispatcher
                    .notify(user_id, GatewayEvent::Created(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!("Assistant reply to message {} failed: {}", prompt.id, e);
                self.dispatcher.notify(
                    user_id,
                    GatewayEvent::BotReplyFailed {
                        message_id: prompt.id,
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn generate_bot_text(&self, prompt: &Message) -> Result<String, ApiError> {
        let assistant = self
            .assistant
            .as_ref()
            .ok_or_else(|| ApiError::Upstream("assistant is not configured".into()))?;
        let text = prompt
            .text
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("the assistant only answers text".into()))?;

        assistant.ask(text).await
    }
}
