// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Confab upload server.
//!
//! Small standalone service: accepts profile-picture uploads keyed by the
//! `x-user-id` header and serves them back under `/uploads`. Runs
//! independently of the API server and needs no Firestore or identity
//! configuration.

use confab::routes::upload::create_upload_router;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    dotenvy::dotenv().ok();

    let port: u16 = std::env::var("UPLOAD_PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse()
        .unwrap_or(3001);
    let uploads_dir = PathBuf::from(
        std::env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
    );

    tokio::fs::create_dir_all(&uploads_dir).await?;
    tracing::info!(dir = %uploads_dir.display(), "Uploads directory ready");

    let app = create_upload_router(uploads_dir);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Upload server listening");

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
