use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_id, validate_vitals};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::{BloodPressureInput, BloodPressureRecord};

pub const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Deserialize)]
pub struct ListQuery {
    pub days: Option<String>,
}

#[derive(Deserialize)]
pub struct BloodPressureRequest {
    #[serde(alias = "dateTime")]
    pub measured_at: DateTime<Utc>,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
    pub weight: f64,
}

impl BloodPressureRequest {
    fn into_input(self) -> Result<BloodPressureInput, ApiError> {
        validate_vitals(self.systolic, self.diastolic, self.pulse, self.weight)?;
        Ok(BloodPressureInput {
            measured_at: self.measured_at,
            systolic: self.systolic,
            diastolic: self.diastolic,
            pulse: self.pulse,
            weight: self.weight,
        })
    }
}

/// Start of the listing window. Unparseable input falls back to the
/// default window, zero or negative means no limit.
fn window_start(days: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let days = days
        .and_then(|d| d.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_WINDOW_DAYS);

    if days <= 0 {
        return None;
    }

    Duration::try_days(days).and_then(|span| now.checked_sub_signed(span))
}

/// GET /blood-pressure?days=N
pub async fn list_measurements(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<BloodPressureRecord>>>, ApiError> {
    let since = window_start(query.days.as_deref(), Utc::now());
    let records = state.store().blood_pressure_repo().list(since).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// GET /blood-pressure/{id}
pub async fn get_measurement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<BloodPressureRecord>>, ApiError> {
    let id = validate_id(id)?;
    let record = state
        .store()
        .blood_pressure_repo()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Record", id))?;

    Ok(Json(ApiResponse::success(record)))
}

/// POST /blood-pressure
pub async fn create_measurement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BloodPressureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = payload.into_input()?;
    let record = state.store().blood_pressure_repo().create(input).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

/// PUT /blood-pressure/{id}
pub async fn update_measurement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<BloodPressureRequest>,
) -> Result<Json<ApiResponse<BloodPressureRecord>>, ApiError> {
    let id = validate_id(id)?;
    let input = payload.into_input()?;
    let record = state
        .store()
        .blood_pressure_repo()
        .update(id, input)
        .await?
        .ok_or_else(|| ApiError::not_found("Record", id))?;

    Ok(Json(ApiResponse::success(record)))
}

/// DELETE /blood-pressure/{id}
pub async fn delete_measurement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_id(id)?;
    if !state.store().blood_pressure_repo().delete(id).await? {
        return Err(ApiError::not_found("Record", id));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Record deleted",
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start() {
        let now = Utc::now();
        assert_eq!(window_start(None, now), Some(now - Duration::days(30)));
        assert_eq!(window_start(Some("7"), now), Some(now - Duration::days(7)));
        assert_eq!(window_start(Some("abc"), now), Some(now - Duration::days(30)));
        assert_eq!(window_start(Some("0"), now), None);
        assert_eq!(window_start(Some("-5"), now), None);
    }
}
