//! Water lookup endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde_json::Value;
use tracing::{debug, error};

use super::context::RequestContext;
use super::AppState;
use crate::models::QueryResult;
use crate::validate::{validate_batch, validate_query, ValidationError};

const SINGLE_USAGE: &str = "'lat' and 'lon' query parameters required representing a valid lat/lon (-180 <= lat/lon <= 180)";
const BATCH_SHAPE_USAGE: &str = "body must be an array of coordinates";
const BATCH_ELEMENT_USAGE: &str = "body must be an array of objects containing keys 'lat' and 'lon' representing a valid lat/lon (-180 <= lat/lon <= 180)";

#[derive(Debug)]
pub enum ApiError {
    /// Single coordinate failed validation
    InvalidCoordinate(ValidationError),
    /// Batch body was not a JSON array
    InvalidBody(String),
    /// A batch element failed validation
    InvalidBatch(ValidationError),
    Internal(String),
}

impl ApiError {
    pub fn message(&self) -> String {
        match self {
            ApiError::InvalidCoordinate(e) => format!("{}: {}", SINGLE_USAGE, e),
            ApiError::InvalidBody(_) => BATCH_SHAPE_USAGE.to_string(),
            ApiError::InvalidBatch(e) => format!("{}: {}", BATCH_ELEMENT_USAGE, e),
            ApiError::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Internal(ref detail) => {
                error!("Water lookup failed: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::InvalidBody(ref detail) => {
                debug!("Rejected batch body: {}", detail);
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.message()).into_response()
    }
}

/// Health check endpoint
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Single point lookup: `GET /api/is-on-water?lat=..&lon=..`
pub async fn check_point(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<QueryResult>, ApiError> {
    let coordinate = validate_query(&params).map_err(|e| {
        debug!(request_id = %ctx.request_id, "Rejected coordinate: {}", e);
        ApiError::InvalidCoordinate(e)
    })?;

    let span = state.tracer.lookup_span(&ctx.request_id, 1);
    let result = span.in_scope(|| state.classifier.classify(coordinate));

    debug!(
        request_id = %ctx.request_id,
        "Lookup ({}, {}): water={}",
        result.lat,
        result.lon,
        result.water
    );

    Ok(Json(result))
}

/// Batch lookup: `POST /api/is-on-water` with a JSON array of `{lat, lon}`
pub async fn check_batch(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Vec<QueryResult>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let coordinates = validate_batch(&body).map_err(|e| {
        debug!(request_id = %ctx.request_id, "Rejected batch: {}", e);
        match e {
            ValidationError::NotAnArray => ApiError::InvalidBody(e.to_string()),
            other => ApiError::InvalidBatch(other),
        }
    })?;

    let count = coordinates.len();
    let span = state.tracer.lookup_span(&ctx.request_id, count);
    let worker = Arc::clone(&state);

    let results = tokio::task::spawn_blocking(move || {
        span.in_scope(|| worker.classifier.classify_all(&coordinates))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    debug!(
        request_id = %ctx.request_id,
        "Batch lookup of {} coordinates, {} on water",
        count,
        results.iter().filter(|r| r.water).count()
    );

    Ok(Json(results))
}
