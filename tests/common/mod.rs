// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use confab::config::Config;
use confab::db::FirestoreDb;
use confab::routes::create_router;
use confab::services::{
    ConnectionService, DirectoryService, IdentityVerifier, MessageService, SyncService,
};
use confab::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Generate a unique identity for test isolation.
#[allow(dead_code)]
pub fn unique_uid(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let db = test_db_offline();

    let identity =
        Arc::new(IdentityVerifier::new(&config).expect("Failed to build identity verifier"));

    let state = Arc::new(AppState {
        connections: ConnectionService::new(db.clone()),
        directory: DirectoryService::new(db.clone()),
        messages: MessageService::new(db.clone()),
        sync: SyncService::new(db.clone()),
        identity,
        config,
        db,
    });

    (create_router(state.clone()), state)
}
