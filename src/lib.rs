// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Confab: real-time chat backend.
//!
//! This crate provides the backend API for a browser chat application:
//! connection requests, connections, live message channels, user directory
//! search, and the standalone profile-picture upload service.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use services::{
    ConnectionService, DirectoryService, IdentityVerifier, MessageService, SyncService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub connections: ConnectionService,
    pub directory: DirectoryService,
    pub messages: MessageService,
    pub sync: SyncService,
    pub identity: Arc<IdentityVerifier>,
}
