// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod connections;
pub mod directory;
pub mod identity;
pub mod messages;
pub mod sync;

pub use connections::ConnectionService;
pub use directory::{DirectoryService, UserSummary};
pub use identity::{IdentityError, IdentityVerifier, VerifiedIdentity};
pub use messages::MessageService;
pub use sync::{ConnectionView, MessageView, PendingRequestView, SyncService, SyncSnapshot};
