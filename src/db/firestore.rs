// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage, display-name lookup, prefix search)
//! - Connection requests (lifecycle writes, pair queries)
//! - Connections (per-participant queries, hard delete)
//! - Messages (append, ordered channel reads)
//! - Live listeners for the sync layer

use crate::db::collections;
use crate::error::AppError;
use crate::models::{Connection, ConnectionRequest, Message, RequestStatus, UserProfile};
use firestore::{
    FirestoreListener, FirestoreListenerTarget, FirestoreMemListenStateStorage,
    FirestoreQueryDirection,
};
use futures_util::{stream, StreamExt};
use std::collections::HashMap;

const MAX_CONCURRENT_PROFILE_READS: usize = 32;

/// Upper bound of the display-name prefix range scan. Firestore range
/// queries are half-open, so the scan covers `[term, term + SENTINEL)`.
pub const PREFIX_SENTINEL: char = '\u{f8ff}';

/// Listener type used by the live sync layer. State storage is in-memory
/// on purpose: every subscription must replay the full matching set from
/// scratch, so resume tokens are never persisted.
pub type LiveListener = FirestoreListener<firestore::FirestoreDb, FirestoreMemListenStateStorage>;

/// Result of an atomic accept attempt.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// Status transitioned and the connection record was created.
    Accepted(ConnectionRequest, Connection),
    /// No request exists for the given id.
    NotFound,
    /// The request had already reached a terminal state.
    NotPending(RequestStatus),
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user profile by identity.
    pub async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user profile. Only the owner may call this.
    pub async fn upsert_user(&self, profile: &UserProfile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&profile.uid)
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Find the profile holding an exact display name, if any.
    ///
    /// Used for the opportunistic uniqueness check at profile save time.
    pub async fn find_user_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Option<UserProfile>, AppError> {
        let name = display_name.to_string();
        let mut matches: Vec<UserProfile> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("display_name").eq(name.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.pop())
    }

    /// Prefix search over display names.
    ///
    /// Case-sensitive half-open range scan `[term, term + PREFIX_SENTINEL)`,
    /// exact-prefix only.
    pub async fn search_users_by_prefix(&self, term: &str) -> Result<Vec<UserProfile>, AppError> {
        let lower = term.to_string();
        let upper = format!("{}{}", term, PREFIX_SENTINEL);

        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| {
                q.for_all([
                    q.field("display_name").greater_than_or_equal(lower.clone()),
                    q.field("display_name").less_than(upper.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Point-read a batch of profiles, deduplicated, keyed by uid.
    ///
    /// Missing profiles are simply absent from the result map. Used by the
    /// sync layer to enrich requests/connections/messages in one pass.
    pub async fn get_users_by_ids(
        &self,
        uids: impl IntoIterator<Item = String>,
    ) -> Result<HashMap<String, UserProfile>, AppError> {
        let unique: std::collections::HashSet<String> = uids.into_iter().collect();
        let db = self.clone();

        let profiles: Vec<Option<UserProfile>> = stream::iter(unique)
            .map(|uid| {
                let db = db.clone();
                async move { db.get_user(&uid).await }
            })
            .buffer_unordered(MAX_CONCURRENT_PROFILE_READS)
            .collect::<Vec<Result<Option<UserProfile>, AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<Option<UserProfile>>, AppError>>()?;

        Ok(profiles
            .into_iter()
            .flatten()
            .map(|p| (p.uid.clone(), p))
            .collect())
    }

    // ─── Connection Request Operations ───────────────────────────

    /// Create a new connection request with a generated document id.
    ///
    /// Returns the stored record with its id populated.
    pub async fn create_request(
        &self,
        request: &ConnectionRequest,
    ) -> Result<ConnectionRequest, AppError> {
        self.get_client()?
            .fluent()
            .insert()
            .into(collections::CONNECTION_REQUESTS)
            .generate_document_id()
            .object(request)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a connection request by document id.
    pub async fn get_request(&self, request_id: &str) -> Result<Option<ConnectionRequest>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONNECTION_REQUESTS)
            .obj()
            .one(request_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Overwrite a connection request document.
    pub async fn set_request(&self, request: &ConnectionRequest) -> Result<(), AppError> {
        let id = request
            .id
            .as_deref()
            .ok_or_else(|| AppError::Database("request has no document id".to_string()))?;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CONNECTION_REQUESTS)
            .document_id(id)
            .object(request)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// All requests sent from `from_uid` to `to_uid` (one direction only).
    ///
    /// The storage layer cannot express an OR across the two directions in
    /// one query; callers union both directions client-side.
    pub async fn requests_directed(
        &self,
        from_uid: &str,
        to_uid: &str,
    ) -> Result<Vec<ConnectionRequest>, AppError> {
        let from = from_uid.to_string();
        let to = to_uid.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTION_REQUESTS)
            .filter(move |q| {
                q.for_all([
                    q.field("from_uid").eq(from.clone()),
                    q.field("to_uid").eq(to.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All pending requests addressed to `uid`, unordered.
    pub async fn pending_requests_for(&self, uid: &str) -> Result<Vec<ConnectionRequest>, AppError> {
        let to = uid.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTION_REQUESTS)
            .filter(move |q| {
                q.for_all([
                    q.field("to_uid").eq(to.clone()),
                    q.field("status").eq(RequestStatus::Pending.as_str()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic Accept ───────────────────────────────────────────

    /// Atomically accept a request: transition its status and create the
    /// connection record in one transaction.
    ///
    /// The request is re-read before the writes are committed; if another
    /// accept landed first the transaction observes a terminal status and
    /// backs off without writing, so a concurrent double-accept cannot
    /// produce two connection records. The connection document id is the
    /// request id, tying each connection to exactly one accepted request.
    pub async fn accept_request_atomic(&self, request_id: &str) -> Result<AcceptOutcome, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read the request within the transaction; this registers the
        // document for conflict detection.
        let request: Option<ConnectionRequest> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONNECTION_REQUESTS)
            .obj()
            .one(request_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read request in transaction: {}", e))
            })?;

        let Some(mut request) = request else {
            let _ = transaction.rollback().await;
            return Ok(AcceptOutcome::NotFound);
        };

        if request.status != RequestStatus::Pending {
            let status = request.status;
            let _ = transaction.rollback().await;
            return Ok(AcceptOutcome::NotPending(status));
        }

        request.status = RequestStatus::Accepted;

        let connection = Connection {
            id: Some(request_id.to_string()),
            user1_uid: request.from_uid.clone(),
            user2_uid: request.to_uid.clone(),
            created_at: chrono::Utc::now(),
        };

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::CONNECTION_REQUESTS)
            .document_id(request_id)
            .object(&request)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add request to transaction: {}", e))
            })?;

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::CONNECTIONS)
            .document_id(request_id)
            .object(&connection)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add connection to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            request_id,
            from_uid = %request.from_uid,
            to_uid = %request.to_uid,
            "Connection request accepted atomically"
        );

        Ok(AcceptOutcome::Accepted(request, connection))
    }

    // ─── Connection Operations ───────────────────────────────────

    /// Get a connection by document id.
    pub async fn get_connection(&self, connection_id: &str) -> Result<Option<Connection>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONNECTIONS)
            .obj()
            .one(connection_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Connections where `uid` appears in the given participant field
    /// (`user1_uid` or `user2_uid`).
    ///
    /// Listing everything for a user takes two of these queries unioned
    /// client-side; the storage layer cannot query an "either field"
    /// condition in one pass.
    pub async fn connections_by_field(
        &self,
        field: &'static str,
        uid: &str,
    ) -> Result<Vec<Connection>, AppError> {
        let uid = uid.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTIONS)
            .filter(move |q| q.for_all([q.field(field).eq(uid.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Hard-delete a connection. Deleting an absent document is treated as
    /// success.
    pub async fn delete_connection(&self, connection_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::CONNECTIONS)
            .document_id(connection_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Message Operations ──────────────────────────────────────

    /// Append a message with a generated document id.
    pub async fn create_message(&self, message: &Message) -> Result<Message, AppError> {
        self.get_client()?
            .fluent()
            .insert()
            .into(collections::MESSAGES)
            .generate_document_id()
            .object(message)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All messages for a channel, ordered ascending by server timestamp.
    pub async fn messages_for_channel(&self, chat_id: &str) -> Result<Vec<Message>, AppError> {
        let chat = chat_id.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::MESSAGES)
            .filter(move |q| q.for_all([q.field("chat_id").eq(chat.clone())]))
            .order_by([("created_at", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Live Listeners ──────────────────────────────────────────

    /// Create a listener with in-memory resume state, so every new
    /// subscription replays the full matching set.
    pub async fn create_live_listener(&self) -> Result<LiveListener, AppError> {
        self.get_client()?
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Database(format!("Failed to create listener: {}", e)))
    }

    /// Attach a target watching pending requests addressed to `uid`.
    pub fn listen_pending_requests(
        &self,
        listener: &mut LiveListener,
        uid: &str,
        target: FirestoreListenerTarget,
    ) -> Result<(), AppError> {
        let to = uid.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTION_REQUESTS)
            .filter(move |q| {
                q.for_all([
                    q.field("to_uid").eq(to.clone()),
                    q.field("status").eq(RequestStatus::Pending.as_str()),
                ])
            })
            .listen()
            .add_target(target, listener)
            .map_err(|e| AppError::Database(format!("Failed to add listen target: {}", e)))
    }

    /// Attach a target watching connections where `uid` appears in the
    /// given participant field.
    pub fn listen_connections_by_field(
        &self,
        listener: &mut LiveListener,
        field: &'static str,
        uid: &str,
        target: FirestoreListenerTarget,
    ) -> Result<(), AppError> {
        let uid = uid.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTIONS)
            .filter(move |q| q.for_all([q.field(field).eq(uid.clone())]))
            .listen()
            .add_target(target, listener)
            .map_err(|e| AppError::Database(format!("Failed to add listen target: {}", e)))
    }

    /// Attach a target watching one channel's messages.
    pub fn listen_channel_messages(
        &self,
        listener: &mut LiveListener,
        chat_id: &str,
        target: FirestoreListenerTarget,
    ) -> Result<(), AppError> {
        let chat = chat_id.to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::MESSAGES)
            .filter(move |q| q.for_all([q.field("chat_id").eq(chat.clone())]))
            .listen()
            .add_target(target, listener)
            .map_err(|e| AppError::Database(format!("Failed to add listen target: {}", e)))
    }
}
