// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session issuance: exchange an identity-provider ID token for a session.

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_session_jwt, SESSION_COOKIE};
use crate::services::IdentityError;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const SESSION_DAYS: i64 = 30;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/session", post(create_session))
}

#[derive(Deserialize)]
struct SessionRequest {
    id_token: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub token: String,
    pub uid: String,
    /// Display name the identity provider shared at sign-in, if any
    pub display_name: Option<String>,
    /// Avatar URL the identity provider shared at sign-in, if any
    pub photo_url: Option<String>,
}

/// Verify an identity-provider ID token and issue a session JWT.
///
/// The session is returned both as a JSON field and as an http-only
/// cookie; browser clients rely on the cookie, other callers on the
/// bearer token.
async fn create_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SessionRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let identity = state
        .identity
        .verify_id_token(&body.id_token)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected(msg) => {
                tracing::warn!(reason = %msg, "ID token rejected");
                AppError::InvalidToken
            }
            IdentityError::Transient(msg) => {
                AppError::Internal(anyhow::anyhow!("identity provider unavailable: {msg}"))
            }
        })?;

    let token = create_session_jwt(&identity.uid, &state.config.session_signing_key)?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_DAYS))
        .build();

    tracing::info!(uid = %identity.uid, "Session issued");

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            token,
            uid: identity.uid,
            display_name: identity.display_name,
            photo_url: identity.photo_url,
        }),
    ))
}
