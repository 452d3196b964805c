use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_id, validate_title};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::{MusicInput, MusicSheet};

#[derive(Deserialize)]
pub struct MusicRequest {
    pub title: String,
    /// Sheet document. Any JSON value is stored as-is.
    pub contents: serde_json::Value,
}

impl MusicRequest {
    fn into_input(self) -> Result<MusicInput, ApiError> {
        let title = validate_title(&self.title)?.to_string();
        Ok(MusicInput {
            title,
            contents: self.contents,
        })
    }
}

/// GET /music
pub async fn list_music(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<MusicSheet>>>, ApiError> {
    let sheets = state.store().music_repo().list().await?;
    Ok(Json(ApiResponse::success(sheets)))
}

/// GET /music/{id}
pub async fn get_music(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MusicSheet>>, ApiError> {
    let id = validate_id(id)?;
    let sheet = state
        .store()
        .music_repo()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Music sheet", id))?;

    Ok(Json(ApiResponse::success(sheet)))
}

/// POST /music
pub async fn create_music(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MusicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sheet = state
        .store()
        .music_repo()
        .create(payload.into_input()?)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(sheet))))
}

/// PUT /music/{id}
pub async fn update_music(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<MusicRequest>,
) -> Result<Json<ApiResponse<MusicSheet>>, ApiError> {
    let id = validate_id(id)?;
    let sheet = state
        .store()
        .music_repo()
        .update(id, payload.into_input()?)
        .await?
        .ok_or_else(|| ApiError::not_found("Music sheet", id))?;

    Ok(Json(ApiResponse::success(sheet)))
}

/// DELETE /music/{id}
pub async fn delete_music(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_id(id)?;
    if !state.store().music_repo().delete(id).await? {
        return Err(ApiError::not_found("Music sheet", id));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Music sheet deleted",
    ))))
}
