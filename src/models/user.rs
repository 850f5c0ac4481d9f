//! User profile model for storage and API.

use serde::{Deserialize, Serialize};

fn default_active() -> bool {
    true
}

/// User profile stored in Firestore.
///
/// The document id is the identity-provider subject (`uid`). Created on
/// the first profile save, mutated only by its owner, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity-provider subject (also used as document ID)
    pub uid: String,
    /// Display name, intended-unique (checked opportunistically at save time)
    pub display_name: String,
    /// Avatar URL served by the upload service (may be None)
    pub photo_url: Option<String>,
    /// Whether the user shows as active to their connections
    #[serde(default = "default_active")]
    pub active_status: bool,
    /// When the profile was first saved
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl UserProfile {
    /// A profile can author messages once it carries a non-empty display name.
    pub fn has_display_name(&self) -> bool {
        !self.display_name.trim().is_empty()
    }
}
