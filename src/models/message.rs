// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat message model.

use serde::{Deserialize, Serialize};

/// Message stored in Firestore (auto-generated document id).
///
/// `display_name` and `photo_url` are a denormalized snapshot of the
/// sender's profile captured at send time; readers join the live profile
/// over them best-effort and fall back to the snapshot. Messages are
/// append-only, ordered ascending by `created_at`, never mutated or
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "_firestore_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Channel scope: the owning connection's document id
    pub chat_id: String,
    /// Sender identity
    pub uid: String,
    /// Sender display name as of send time
    pub display_name: String,
    /// Sender avatar URL as of send time
    pub photo_url: Option<String>,
    pub text: String,
    /// Server-assigned timestamp; channel ordering key
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}
