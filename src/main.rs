// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Confab API Server
//!
//! Backend for the browser chat client: connection requests, connections,
//! live message channels, and user directory search over Firestore.

use confab::{
    config::Config,
    db::FirestoreDb,
    services::{
        ConnectionService, DirectoryService, IdentityVerifier, MessageService, SyncService,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Confab API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    let identity =
        Arc::new(IdentityVerifier::new(&config).expect("Failed to initialize identity verifier"));

    // Build shared state
    let state = Arc::new(AppState {
        connections: ConnectionService::new(db.clone()),
        directory: DirectoryService::new(db.clone()),
        messages: MessageService::new(db.clone()),
        sync: SyncService::new(db.clone()),
        identity,
        config: config.clone(),
        db,
    });

    // Build router
    let app = confab::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("confab=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
