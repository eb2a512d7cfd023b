//! Read-only operator API over the local ledgers.

use crate::error::ReconcileError;
use crate::store::with_conn;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use launchsync_types::{CalendarMirror, Event};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Response body for `GET /api/events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub count: usize,
}

/// Response body for the mirror listings.
#[derive(Debug, Serialize, Deserialize)]
pub struct MirrorsResponse {
    pub mirrors: Vec<CalendarMirror>,
    pub count: usize,
}

impl MirrorsResponse {
    fn new(mirrors: Vec<CalendarMirror>) -> Self {
        Self {
            count: mirrors.len(),
            mirrors,
        }
    }
}

/// Response body for `GET /api/destinations/{id}/watermark`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WatermarkResponse {
    #[serde(rename = "destinationId")]
    pub destination_id: i64,
    /// `None` until the first countdown scan has seen the destination.
    pub watermark: Option<DateTime<Utc>>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        tracing::error!(error = %e, "operator api storage failure");
        ApiError::InternalServerError(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `GET /api/events`.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = with_conn(&state.pool, launchsync_ledger::list_events).await?;
    Ok(Json(EventsResponse {
        count: events.len(),
        events,
    }))
}

/// Handler for `GET /api/events/{id}/mirrors`.
pub async fn event_mirrors_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<MirrorsResponse>, ApiError> {
    let lookup = event_id.clone();
    let (event, mirrors) = with_conn(&state.pool, move |conn| {
        Ok((
            launchsync_ledger::get_event(conn, &lookup)?,
            launchsync_ledger::mirrors_for_event(conn, &lookup)?,
        ))
    })
    .await?;

    if event.is_none() && mirrors.is_empty() {
        return Err(ApiError::NotFound(format!("event {event_id}")));
    }
    Ok(Json(MirrorsResponse::new(mirrors)))
}

/// Handler for `GET /api/destinations/{id}/mirrors`.
pub async fn destination_mirrors_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(destination_id): Path<i64>,
) -> Result<Json<MirrorsResponse>, ApiError> {
    let (destination, mirrors) = with_conn(&state.pool, move |conn| {
        Ok((
            launchsync_ledger::get_destination(conn, destination_id)?,
            launchsync_ledger::mirrors_for_destination(conn, destination_id)?,
        ))
    })
    .await?;

    if destination.is_none() {
        return Err(ApiError::NotFound(format!("destination {destination_id}")));
    }
    Ok(Json(MirrorsResponse::new(mirrors)))
}

/// Handler for `GET /api/destinations/{id}/watermark`.
pub async fn destination_watermark_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(destination_id): Path<i64>,
) -> Result<Json<WatermarkResponse>, ApiError> {
    let (destination, watermark) = with_conn(&state.pool, move |conn| {
        Ok((
            launchsync_ledger::get_destination(conn, destination_id)?,
            launchsync_ledger::get_watermark(conn, destination_id)?,
        ))
    })
    .await?;

    if destination.is_none() {
        return Err(ApiError::NotFound(format!("destination {destination_id}")));
    }
    Ok(Json(WatermarkResponse {
        destination_id,
        watermark,
    }))
}
