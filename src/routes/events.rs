// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-sent event streams backed by the live sync layer.
//!
//! Each open stream owns one backing-store listener; closing the HTTP
//! response drops the receiver, which tears the listener down.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::routes::api::require_participant;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::Stream;
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/events", get(user_events))
        .route("/api/connections/{id}/events", get(channel_events))
}

/// Live snapshots of the caller's pending requests and connections.
async fn user_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let rx = state.sync.subscribe_user(&user.uid).await?;

    let stream = ReceiverStream::new(rx)
        .map(|snapshot| Event::default().event("sync").json_data(&snapshot));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Live ordered message snapshots for one channel.
///
/// Resubscribing replays the full history; the stream stays open until
/// the client disconnects (e.g. when switching channels).
async fn channel_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(connection_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    require_participant(&state, &connection_id, &user.uid).await?;

    let rx = state.sync.subscribe_channel(&connection_id).await?;

    let stream = ReceiverStream::new(rx)
        .map(|messages| Event::default().event("messages").json_data(&messages));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
