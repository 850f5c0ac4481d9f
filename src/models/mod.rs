// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod connection;
pub mod message;
pub mod user;

pub use connection::{Connection, ConnectionRequest, RequestStatus};
pub use message::Message;
pub use user::UserProfile;
