// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Message channel: append-only ordered log scoped to a connection id.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::Message;

#[derive(Clone)]
pub struct MessageService {
    db: FirestoreDb,
}

impl MessageService {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Append a message to a channel.
    ///
    /// Rejected when the trimmed text is empty, when the channel does not
    /// exist, when the sender is not a participant, or when the sender's
    /// profile is missing a display name. The stored record carries a
    /// denormalized snapshot of the sender's display name and avatar as of
    /// send time.
    pub async fn send(
        &self,
        chat_id: &str,
        sender_uid: &str,
        text: &str,
    ) -> Result<Message, AppError> {
        if chat_id.trim().is_empty() {
            return Err(AppError::Validation("No channel selected".to_string()));
        }
        if text.trim().is_empty() {
            return Err(AppError::Validation(
                "Message text must not be empty".to_string(),
            ));
        }

        let connection = self
            .db
            .get_connection(chat_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Channel not found".to_string()))?;

        if !connection.involves(sender_uid) {
            return Err(AppError::Validation(
                "Sender is not a participant of this channel".to_string(),
            ));
        }

        let profile = self.db.get_user(sender_uid).await?;
        let profile = match profile {
            Some(p) if p.has_display_name() => p,
            _ => {
                return Err(AppError::Validation(
                    "Set up your profile before sending messages".to_string(),
                ))
            }
        };

        let message = Message {
            id: None,
            chat_id: chat_id.to_string(),
            uid: sender_uid.to_string(),
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            text: text.to_string(),
            created_at: chrono::Utc::now(),
        };

        self.db.create_message(&message).await
    }

    /// Full channel history, ordered ascending by server timestamp.
    pub async fn history(&self, chat_id: &str) -> Result<Vec<Message>, AppError> {
        self.db.messages_for_channel(chat_id).await
    }
}
