// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection request ledger and connection registry.
//!
//! The ledger owns the request lifecycle (`pending -> accepted|rejected`)
//! and enforces at-most-one pending request per unordered identity pair.
//! The registry is derived from accepted requests and holds the symmetric
//! is-connected relation.

use crate::db::{AcceptOutcome, FirestoreDb};
use crate::error::AppError;
use crate::models::{Connection, ConnectionRequest, RequestStatus};
use std::collections::HashMap;

/// Ledger + registry operations against the backing store.
#[derive(Clone)]
pub struct ConnectionService {
    db: FirestoreDb,
}

/// Outcome of inspecting the existing requests between a pair before a new
/// send. The check inspects the request ledger only, never the connection
/// registry: an accepted request is what marks a pair as connected here,
/// even if the connection record was later deleted out-of-band.
fn classify_existing(existing: &[ConnectionRequest]) -> Option<AppError> {
    if existing
        .iter()
        .any(|r| r.status == RequestStatus::Pending)
    {
        return Some(AppError::DuplicateRequest);
    }

    if existing
        .iter()
        .any(|r| r.status == RequestStatus::Accepted)
    {
        return Some(AppError::AlreadyConnected);
    }

    // Rejected requests are terminal but do not block resubmission.
    None
}

impl ConnectionService {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    // ─── Ledger ──────────────────────────────────────────────────

    /// Send a connection request from `from_uid` to `to_uid`.
    ///
    /// Fails with `DuplicateRequest` when a pending request already exists
    /// between the pair in either direction, and with `AlreadyConnected`
    /// when an accepted one does.
    pub async fn send_request(
        &self,
        from_uid: &str,
        to_uid: &str,
        initial_message: &str,
    ) -> Result<ConnectionRequest, AppError> {
        if to_uid.trim().is_empty() {
            return Err(AppError::Validation("Recipient must not be empty".to_string()));
        }
        if from_uid == to_uid {
            return Err(AppError::Validation(
                "Cannot send a connection request to yourself".to_string(),
            ));
        }

        // Both directions, unioned client-side; the store cannot express
        // the OR in one query.
        let mut existing = self.db.requests_directed(from_uid, to_uid).await?;
        existing.extend(self.db.requests_directed(to_uid, from_uid).await?);

        if let Some(err) = classify_existing(&existing) {
            return Err(err);
        }

        let request = ConnectionRequest {
            id: None,
            from_uid: from_uid.to_string(),
            to_uid: to_uid.to_string(),
            status: RequestStatus::Pending,
            initial_message: initial_message.to_string(),
            created_at: chrono::Utc::now(),
        };

        let created = self.db.create_request(&request).await?;

        tracing::info!(
            request_id = created.id.as_deref().unwrap_or("<unknown>"),
            from_uid,
            to_uid,
            "Connection request sent"
        );

        Ok(created)
    }

    /// Accept a pending request addressed to `caller_uid`.
    ///
    /// The status transition and the connection creation happen in one
    /// transaction; see [`FirestoreDb::accept_request_atomic`].
    pub async fn accept_request(
        &self,
        request_id: &str,
        caller_uid: &str,
    ) -> Result<Connection, AppError> {
        let request = self
            .db
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Connection request not found".to_string()))?;

        if request.to_uid != caller_uid {
            return Err(AppError::Validation(
                "Only the recipient can accept a connection request".to_string(),
            ));
        }

        match self.db.accept_request_atomic(request_id).await? {
            AcceptOutcome::Accepted(_, connection) => Ok(connection),
            AcceptOutcome::NotFound => {
                Err(AppError::NotFound("Connection request not found".to_string()))
            }
            AcceptOutcome::NotPending(status) => Err(AppError::Validation(format!(
                "Request is already {}",
                status.as_str()
            ))),
        }
    }

    /// Reject a request addressed to `caller_uid`.
    ///
    /// Unlike accept, an absent request is silently ignored rather than
    /// reported; the asymmetry is deliberate and mirrors the guard
    /// coverage of the accept path being the only one that needs the
    /// record afterwards.
    pub async fn reject_request(&self, request_id: &str, caller_uid: &str) -> Result<(), AppError> {
        let Some(mut request) = self.db.get_request(request_id).await? else {
            tracing::debug!(request_id, "Reject of absent request ignored");
            return Ok(());
        };

        if request.to_uid != caller_uid {
            return Err(AppError::Validation(
                "Only the recipient can reject a connection request".to_string(),
            ));
        }

        request.status = RequestStatus::Rejected;
        self.db.set_request(&request).await?;

        tracing::info!(request_id, "Connection request rejected");
        Ok(())
    }

    /// All pending requests addressed to `uid`, unordered.
    pub async fn list_pending(&self, uid: &str) -> Result<Vec<ConnectionRequest>, AppError> {
        self.db.pending_requests_for(uid).await
    }

    // ─── Registry ────────────────────────────────────────────────

    /// Union of connections where `uid` appears as either participant.
    ///
    /// Two independent equality queries merged by document id; the store
    /// cannot query an "either field" condition in one pass.
    pub async fn list_connections(&self, uid: &str) -> Result<Vec<Connection>, AppError> {
        let first = self.db.connections_by_field("user1_uid", uid).await?;
        let second = self.db.connections_by_field("user2_uid", uid).await?;

        let mut merged: HashMap<String, Connection> = HashMap::new();
        for conn in first.into_iter().chain(second) {
            if let Some(id) = conn.id.clone() {
                merged.insert(id, conn);
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Unfriend: hard-delete the connection record. Absence is success.
    pub async fn delete_connection(
        &self,
        connection_id: &str,
        caller_uid: &str,
    ) -> Result<(), AppError> {
        if let Some(connection) = self.db.get_connection(connection_id).await? {
            if !connection.involves(caller_uid) {
                return Err(AppError::Validation(
                    "Only a participant can delete a connection".to_string(),
                ));
            }
        }

        self.db.delete_connection(connection_id).await?;
        tracing::info!(connection_id, "Connection deleted");
        Ok(())
    }
}
