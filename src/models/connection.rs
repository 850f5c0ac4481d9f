// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection request and connection models.
//!
//! A connection request is a proposal to form a connection, with lifecycle
//! `pending -> accepted` or `pending -> rejected`; both outcomes are
//! terminal. A connection is the symmetric "is contact of" relation,
//! created as a side effect of accepting a request and hard-deleted on
//! unfriend.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    /// Accepted and rejected requests never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Accepted | RequestStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// Connection request stored in Firestore (auto-generated document id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Firestore document id, populated on reads
    #[serde(alias = "_firestore_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender identity
    pub from_uid: String,
    /// Recipient identity (the only party allowed to transition status)
    pub to_uid: String,
    pub status: RequestStatus,
    /// Optional note shown alongside the request
    #[serde(default)]
    pub initial_message: String,
    /// Server-assigned creation time
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ConnectionRequest {
    /// True when this request links the unordered pair {a, b}.
    pub fn links_pair(&self, a: &str, b: &str) -> bool {
        (self.from_uid == a && self.to_uid == b) || (self.from_uid == b && self.to_uid == a)
    }
}

/// Connection stored in Firestore.
///
/// The pair is unordered; it is stored as ordered fields purely for query
/// convenience (`user1_uid` is the requester, `user2_uid` the acceptor).
/// The document id is the accepted request's id, which ties every
/// connection to exactly one historical accepted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    #[serde(alias = "_firestore_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user1_uid: String,
    pub user2_uid: String,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Connection {
    /// The counterpart identity for `uid`, or None when `uid` is not a
    /// participant.
    pub fn other_party(&self, uid: &str) -> Option<&str> {
        if self.user1_uid == uid {
            Some(&self.user2_uid)
        } else if self.user2_uid == uid {
            Some(&self.user1_uid)
        } else {
            None
        }
    }

    pub fn involves(&self, uid: &str) -> bool {
        self.user1_uid == uid || self.user2_uid == uid
    }
}
