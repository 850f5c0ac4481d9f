// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Standalone profile-picture upload service.
//!
//! Accepts one binary per user identity and serves it back over static
//! file hosting. The stored file is named `<user-id><original-extension>`,
//! so a re-upload silently overwrites the previous picture and each
//! identity holds at most one object.

use crate::error::AppError;
use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, HeaderName, Method},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Header carrying the uploader's identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Multipart field name the client must use.
const FILE_FIELD: &str = "profilePic";

#[derive(Clone)]
struct UploadState {
    uploads_dir: PathBuf,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub url: String,
}

/// Build the upload-service router.
///
/// `GET /uploads/<filename>` serves raw bytes with no access control;
/// CORS allows any origin with the custom identity header.
pub fn create_upload_router(uploads_dir: PathBuf) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
        ]);

    Router::new()
        .route("/upload-profile-pic", post(upload_profile_pic))
        .nest_service("/uploads", ServeDir::new(&uploads_dir))
        .layer(cors)
        .with_state(UploadState { uploads_dir })
}

/// Reject identities that could escape the uploads directory when used as
/// a filename stem.
fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.is_empty()
        || user_id.contains('/')
        || user_id.contains('\\')
        || user_id.contains("..")
    {
        return Err(AppError::Upload("Invalid user ID".to_string()));
    }
    Ok(())
}

/// Extension of the original filename, including the leading dot, or
/// empty when there is none.
fn original_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

async fn upload_profile_pic(
    State(state): State<UploadState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Upload("User ID not provided in x-user-id header".to_string())
        })?;

    validate_user_id(&user_id)?;

    // Find the profile picture field; anything else in the body is
    // ignored.
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Upload(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Upload(format!("Failed to read uploaded file: {e}")))?;

        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(AppError::Upload("No file uploaded.".to_string()));
    };

    let stored_name = format!("{}{}", user_id, original_extension(&file_name));

    tokio::fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|e| AppError::Upload(format!("Failed to prepare uploads directory: {e}")))?;

    // One object per identity: drop any previous upload stored under a
    // different extension before writing the new one.
    remove_stale_uploads(&state.uploads_dir, &user_id, &stored_name).await;

    let target = state.uploads_dir.join(&stored_name);
    tokio::fs::write(&target, &bytes)
        .await
        .map_err(|e| AppError::Upload(format!("Failed to store file: {e}")))?;

    tracing::info!(
        user_id = %user_id,
        file = %stored_name,
        size = bytes.len(),
        "Profile picture stored"
    );

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        url: format!("/uploads/{stored_name}"),
    }))
}

async fn remove_stale_uploads(uploads_dir: &Path, user_id: &str, keep: &str) {
    let Ok(mut entries) = tokio::fs::read_dir(uploads_dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);

        if stem == user_id && name != keep {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(error = %e, file = name, "Failed to remove stale upload");
            }
        }
    }
}
