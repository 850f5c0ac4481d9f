//! Database layer (Firestore).

pub mod firestore;

pub use firestore::{AcceptOutcome, FirestoreDb, LiveListener};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CONNECTION_REQUESTS: &str = "connection_requests";
    pub const CONNECTIONS: &str = "connections";
    pub const MESSAGES: &str = "messages";
}
