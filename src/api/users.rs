//! Administrator endpoints for managing accounts.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::{validate_email, validate_id, validate_name};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::repositories::user::UserChanges;
use crate::services::{UserDetail, UserProfile};

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct SetPermissionsRequest {
    #[serde(alias = "permissionCodes", default)]
    pub permission_codes: Vec<String>,
}

#[derive(Serialize)]
pub struct PermissionsResponse {
    pub permissions: Vec<String>,
}

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, ApiError> {
    let users = state.users().list_users().await?;
    Ok(Json(ApiResponse::success(users)))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDetail>>, ApiError> {
    let id = validate_id(id)?;
    let detail = state.users().get_user(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// PUT /users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let id = validate_id(id)?;
    let changes = UserChanges {
        name: payload
            .name
            .as_deref()
            .map(validate_name)
            .transpose()?
            .map(str::to_string),
        email: payload
            .email
            .as_deref()
            .map(validate_email)
            .transpose()?
            .map(str::to_string),
        is_active: payload.is_active,
    };

    let user = state.users().update_user(id, changes).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// PUT /users/{id}/password
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_id(id)?;
    state.users().set_password(id, &payload.password).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated",
    ))))
}

/// PUT /users/{id}/permissions
/// Replace the user's whole permission set
pub async fn set_permissions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<SetPermissionsRequest>,
) -> Result<Json<ApiResponse<PermissionsResponse>>, ApiError> {
    let id = validate_id(id)?;
    let permissions = state
        .users()
        .set_permissions(id, &payload.permission_codes)
        .await?;

    Ok(Json(ApiResponse::success(PermissionsResponse { permissions })))
}
