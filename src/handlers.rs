//! HTTP handlers for the sensor-data API.
//!
//! Request flow:
//!     parse params -> default/validate -> store (sanitized rows) -> (tags) -> JSON
//!
//! Both read endpoints go through `read_readings`; they only differ in the
//! default limit and whether tags are attached.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ApiError, StorageError};
use crate::query::{parse_timestamp, ReadFilter, ReadKind};
use crate::reading::{NewReading, NewReadingPayload, ReadingResponse};
use crate::store::ReadingStore;
use crate::tags::annotate;
use crate::AppState;

const FETCH_FAILED: &str = "Failed to fetch sensor data";
const FETCH_LATEST_FAILED: &str = "Failed to fetch latest sensor data";
const INSERT_FAILED: &str = "Failed to insert sensor data";
const INSERTED: &str = "Sensor data inserted successfully";

/// Raw query string pairs. Decoding into pairs instead of a struct keeps a
/// repeated key from turning into an extractor rejection.
type QueryPairs = Query<Vec<(String, String)>>;

/// Query string for `GET /api/sensor-data`. Everything stays text so a bad
/// `limit` falls back to the default instead of rejecting the request.
#[derive(Debug, Default, PartialEq)]
pub struct HistoryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
}

impl HistoryParams {
    /// The last occurrence of a repeated key wins; unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "startDate" => params.start_date = Some(value),
                "endDate" => params.end_date = Some(value),
                "limit" => params.limit = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Query string for `GET /api/sensor-data/latest`.
#[derive(Debug, Default, PartialEq)]
pub struct LatestParams {
    pub limit: Option<String>,
}

impl LatestParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self {
            limit: pairs
                .into_iter()
                .filter(|(key, _)| key == "limit")
                .map(|(_, value)| value)
                .last(),
        }
    }
}

fn parse_limit(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_timestamp(text)
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("Invalid {}", name))),
    }
}

/// Shared read path for both GET endpoints. Rows arrive sanitized from the
/// store; tags are only attached for historical reads.
pub async fn read_readings(
    store: &dyn ReadingStore,
    kind: ReadKind,
    filter: &ReadFilter,
) -> Result<Vec<ReadingResponse>, StorageError> {
    let rows = store.fetch(filter).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = if kind.annotates() {
                annotate(&row.measurements)
            } else {
                Vec::new()
            };
            let mut response = ReadingResponse::from(row);
            response.tags = tags;
            response
        })
        .collect())
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Result<Response, ApiError> {
    let bytes = serde_json::to_vec(body)?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// GET /api/sensor-data?startDate=..&endDate=..&limit=..
pub async fn get_sensor_data_handler(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Response, ApiError> {
    let params = HistoryParams::from_pairs(pairs);
    let start = parse_bound("startDate", params.start_date.as_deref())?;
    let end = parse_bound("endDate", params.end_date.as_deref())?;
    let filter = ReadFilter::new(
        ReadKind::Historical,
        start,
        end,
        parse_limit(params.limit.as_deref()),
    );

    info!(
        "Fetching data with range: {:?} to {:?}, limit: {}",
        filter.start, filter.end, filter.limit
    );

    let readings = read_readings(state.store.as_ref(), ReadKind::Historical, &filter)
        .await
        .map_err(|e| ApiError::storage(FETCH_FAILED, e))?;

    info!("Returned {} records", readings.len());
    json_response(StatusCode::OK, &readings)
}

/// GET /api/sensor-data/latest?limit=..
pub async fn get_latest_handler(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Response, ApiError> {
    let params = LatestParams::from_pairs(pairs);
    let filter = ReadFilter::new(
        ReadKind::Latest,
        None,
        None,
        parse_limit(params.limit.as_deref()),
    );
    debug!("Fetching latest {} readings", filter.limit);

    let readings = read_readings(state.store.as_ref(), ReadKind::Latest, &filter)
        .await
        .map_err(|e| ApiError::storage(FETCH_LATEST_FAILED, e))?;

    json_response(StatusCode::OK, &readings)
}

/// POST /api/sensor-data
///
/// The body is read raw so that any malformed input, including a missing or
/// wrong content type or a non-object JSON value, is a plain 400.
pub async fn post_sensor_data_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = NewReadingPayload::from_json(&body)?;
    let reading = NewReading::from_payload(payload)?;

    debug!(
        "Inserting reading for location {} at {}",
        reading.location, reading.recorded_at
    );

    state
        .store
        .insert(reading)
        .await
        .map_err(|e| ApiError::storage(INSERT_FAILED, e))?;

    json_response(StatusCode::CREATED, &json!({ "message": INSERTED }))
}

/// Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, label) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    (
        status,
        Json(json!({
            "status": label,
            "service": "sensor-api",
            "timestamp": Utc::now().to_rfc3339()
        })),
    )
}
