// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::UserProfile;
use crate::services::sync::{enrich_messages, UNKNOWN_USER};
use crate::services::{ConnectionView, MessageView, PendingRequestView, UserSummary};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require a session via the auth middleware, applied in
/// routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/profile", put(update_profile))
        .route("/api/users/search", get(search_users))
        .route("/api/requests", post(send_request))
        .route("/api/requests/pending", get(pending_requests))
        .route("/api/requests/{id}/accept", post(accept_request))
        .route("/api/requests/{id}/reject", post(reject_request))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/{id}", delete(delete_connection))
        .route(
            "/api/connections/{id}/messages",
            get(message_history).post(send_message),
        )
}

// ─── Profile ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileResponse {
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub active_status: bool,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            uid: profile.uid,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            active_status: profile.active_status,
        }
    }
}

/// Get the current user's profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>> {
    let profile = state
        .db
        .get_user(&user.uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not set up yet".to_string()))?;

    Ok(Json(profile.into()))
}

#[derive(Deserialize, Validate)]
struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64, message = "display name must be 1-64 characters"))]
    display_name: String,
    photo_url: Option<String>,
    #[serde(default = "default_active")]
    active_status: bool,
}

fn default_active() -> bool {
    true
}

/// Create or update the caller's profile.
///
/// Display-name uniqueness is checked opportunistically at write time:
/// the name is rejected when another identity currently holds it, but
/// nothing prevents two concurrent saves from racing past the check.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let display_name = body.display_name.trim().to_string();

    if state
        .directory
        .is_display_name_taken(&display_name, &user.uid)
        .await?
    {
        return Err(AppError::Validation(
            "This username is already taken. Please choose another.".to_string(),
        ));
    }

    // First save creates the profile; later saves keep the original
    // creation time.
    let created_at = match state.db.get_user(&user.uid).await? {
        Some(existing) => existing.created_at,
        None => chrono::Utc::now(),
    };

    let profile = UserProfile {
        uid: user.uid.clone(),
        display_name,
        photo_url: body.photo_url,
        active_status: body.active_status,
        created_at,
    };

    state.db.upsert_user(&profile).await?;
    tracing::info!(uid = %user.uid, "Profile saved");

    Ok(Json(profile.into()))
}

// ─── Directory Search ────────────────────────────────────────

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Prefix search over display names.
///
/// The empty-term guard and the caller's self-exclusion live here, at the
/// call site, not in the search component.
async fn search_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<UserSummary>> {
    let term = query.q.trim();
    if term.is_empty() {
        return Json(Vec::new());
    }

    let results = state
        .directory
        .search(term)
        .await
        .into_iter()
        .filter(|summary| summary.uid != user.uid)
        .collect();

    Json(results)
}

// ─── Connection Requests ─────────────────────────────────────

#[derive(Deserialize, Validate)]
struct SendRequestBody {
    to_uid: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "initial message must be at most 500 characters"))]
    initial_message: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RequestResponse {
    pub id: String,
    pub to_uid: String,
    pub status: String,
}

async fn send_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SendRequestBody>,
) -> Result<Json<RequestResponse>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let created = state
        .connections
        .send_request(&user.uid, &body.to_uid, &body.initial_message)
        .await?;

    Ok(Json(RequestResponse {
        id: created
            .id
            .ok_or_else(|| AppError::Database("created request has no id".to_string()))?,
        to_uid: created.to_uid,
        status: created.status.as_str().to_string(),
    }))
}

/// Pending requests addressed to the caller, enriched with the sender's
/// profile (placeholder name when the sender has none).
async fn pending_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<PendingRequestView>>> {
    let requests = state.connections.list_pending(&user.uid).await?;

    let profiles = state
        .db
        .get_users_by_ids(requests.iter().map(|r| r.from_uid.clone()))
        .await?;

    let views = requests
        .into_iter()
        .filter_map(|request| {
            let id = request.id?;
            Some(PendingRequestView {
                id,
                from_display_name: profiles
                    .get(&request.from_uid)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                from_uid: request.from_uid,
                initial_message: request.initial_message,
                created_at: request.created_at,
            })
        })
        .collect();

    Ok(Json(views))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AcceptResponse {
    /// Id of the connection created by the accept; doubles as the chat
    /// channel id.
    pub connection_id: String,
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> Result<Json<AcceptResponse>> {
    let connection = state
        .connections
        .accept_request(&request_id, &user.uid)
        .await?;

    Ok(Json(AcceptResponse {
        connection_id: connection
            .id
            .ok_or_else(|| AppError::Database("created connection has no id".to_string()))?,
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StatusResponse {
    pub success: bool,
}

async fn reject_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    state
        .connections
        .reject_request(&request_id, &user.uid)
        .await?;

    Ok(Json(StatusResponse { success: true }))
}

// ─── Connections ─────────────────────────────────────────────

/// The caller's connections, enriched with the counterpart's profile.
async fn list_connections(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ConnectionView>>> {
    let connections = state.connections.list_connections(&user.uid).await?;

    let profiles = state
        .db
        .get_users_by_ids(
            connections
                .iter()
                .filter_map(|c| c.other_party(&user.uid))
                .map(str::to_string),
        )
        .await?;

    let mut views: Vec<ConnectionView> = connections
        .into_iter()
        .filter_map(|connection| {
            let id = connection.id.clone()?;
            let other_uid = connection.other_party(&user.uid)?.to_string();
            let other = profiles.get(&other_uid);
            Some(ConnectionView {
                id,
                other_display_name: other
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                other_photo_url: other.and_then(|p| p.photo_url.clone()),
                other_active_status: other.map(|p| p.active_status).unwrap_or(false),
                other_uid,
                created_at: connection.created_at,
            })
        })
        .collect();
    views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(Json(views))
}

async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(connection_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    state
        .connections
        .delete_connection(&connection_id, &user.uid)
        .await?;

    Ok(Json(StatusResponse { success: true }))
}

// ─── Messages ────────────────────────────────────────────────

/// Full ordered history of a channel with the live-profile join applied.
async fn message_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(connection_id): Path<String>,
) -> Result<Json<Vec<MessageView>>> {
    require_participant(&state, &connection_id, &user.uid).await?;

    let messages = state.messages.history(&connection_id).await?;

    let profiles = state
        .db
        .get_users_by_ids(messages.iter().map(|m| m.uid.clone()))
        .await?;

    Ok(Json(enrich_messages(messages, &profiles)))
}

#[derive(Deserialize)]
struct SendMessageBody {
    text: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SendMessageResponse {
    pub id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(connection_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<SendMessageResponse>> {
    let message = state
        .messages
        .send(&connection_id, &user.uid, &body.text)
        .await?;

    Ok(Json(SendMessageResponse {
        id: message
            .id
            .ok_or_else(|| AppError::Database("created message has no id".to_string()))?,
        created_at: message.created_at,
    }))
}

/// Channel access guard shared by the read paths.
pub(crate) async fn require_participant(
    state: &AppState,
    connection_id: &str,
    uid: &str,
) -> Result<()> {
    let connection = state
        .db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Channel not found".to_string()))?;

    if !connection.involves(uid) {
        return Err(AppError::Validation(
            "Not a participant of this channel".to_string(),
        ));
    }

    Ok(())
}
