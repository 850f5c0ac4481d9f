// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User directory: prefix search and profile lookup.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::UserProfile;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Transient projection of a user profile returned by search. Never
/// persisted.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserSummary {
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub active_status: bool,
}

impl From<UserProfile> for UserSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            uid: profile.uid,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            active_status: profile.active_status,
        }
    }
}

#[derive(Clone)]
pub struct DirectoryService {
    db: FirestoreDb,
}

impl DirectoryService {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Prefix search over display names (case-sensitive, exact prefix).
    ///
    /// Backing-store failures degrade to an empty result; the empty-term
    /// guard and the caller's self-exclusion are the call site's concern.
    pub async fn search(&self, term: &str) -> Vec<UserSummary> {
        match self.db.search_users_by_prefix(term).await {
            Ok(profiles) => profiles.into_iter().map(UserSummary::from).collect(),
            Err(e) => {
                tracing::warn!(error = %e, term, "User search failed");
                Vec::new()
            }
        }
    }

    /// Point-read a profile; failures degrade to None.
    pub async fn lookup_profile(&self, uid: &str) -> Option<UserProfile> {
        match self.db.get_user(uid).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, uid, "Profile lookup failed");
                None
            }
        }
    }

    /// Opportunistic display-name uniqueness check at save time: taken
    /// when another identity currently holds the exact name.
    pub async fn is_display_name_taken(
        &self,
        display_name: &str,
        owner_uid: &str,
    ) -> Result<bool, AppError> {
        let holder = self.db.find_user_by_display_name(display_name).await?;
        Ok(holder.is_some_and(|p| p.uid != owner_uid))
    }
}
