use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::db::FeatureFlags;

#[derive(Deserialize)]
pub struct UpdateFeatureFlagsRequest {
    #[serde(alias = "registrationActive")]
    pub registration_active: Option<bool>,
    #[serde(alias = "forgotPasswordActive")]
    pub forgot_password_active: Option<bool>,
}

/// GET /feature-flags
pub async fn get_feature_flags(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<FeatureFlags>>, ApiError> {
    let flags = state.store().get_feature_flags().await?.unwrap_or_default();
    Ok(Json(ApiResponse::success(flags)))
}

/// PUT /feature-flags
/// Omitted toggles keep their current value
pub async fn update_feature_flags(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateFeatureFlagsRequest>,
) -> Result<Json<ApiResponse<FeatureFlags>>, ApiError> {
    let flags = state
        .store()
        .feature_flag_repo()
        .update(payload.registration_active, payload.forgot_password_active)
        .await?;

    tracing::info!(
        registration_active = flags.registration_active,
        forgot_password_active = flags.forgot_password_active,
        "Feature flags updated"
    );

    Ok(Json(ApiResponse::success(flags)))
}
