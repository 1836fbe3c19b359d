//! REST API endpoints.
//!
//! # Routes
//!
//! - `GET /api/health` - service health check
//! - `GET /api/devices` - registered devices
//! - `GET /api/devices/{id}/range?start=..&end=..[&format=csv]` - measurements of
//!   one device in `[start, end)`; bounds are RFC 3339
//! - `GET /api/locations/{location}/range?...` - same, addressed by location
//! - `GET /api/latest` - newest reading of every device
//! - `GET /api/devices/{id}/latest` - newest reading of one device, with
//!   derived absolute humidity
//! - `GET /api/locations/{location}/latest` - same, addressed by location
//! - `POST /api/rollup` - run a [`TriggerRequest`], respond with its summary
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]: unknown
//! devices and periods with no data are 404, malformed input is 400, and
//! storage failures are 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use picotherm_store::{ExportFormat, export};
use picotherm_types::Measurement;

use crate::registry::DeviceEntry;
use crate::state::AppState;
use crate::trigger::{TriggerRequest, TriggerSummary};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}/range", get(device_range))
        .route("/api/locations/{location}/range", get(location_range))
        .route("/api/latest", get(all_latest))
        .route("/api/devices/{id}/latest", get(device_latest))
        .route("/api/locations/{location}/latest", get(location_latest))
        .route("/api/rollup", post(rollup))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

async fn list_devices(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DeviceEntry>>, AppError> {
    Ok(Json(state.devices().await?))
}

/// Query parameters for range reads.
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    /// Inclusive RFC 3339 start.
    pub start: String,
    /// Exclusive RFC 3339 end.
    pub end: String,
    /// `json` (default) or `csv`.
    pub format: Option<String>,
}

impl RangeParams {
    fn parse(&self) -> Result<(OffsetDateTime, OffsetDateTime, ExportFormat), AppError> {
        let start = parse_time("start", &self.start)?;
        let end = parse_time("end", &self.end)?;
        let format = match &self.format {
            Some(f) => f.parse().map_err(AppError::BadRequest)?,
            None => ExportFormat::Json,
        };
        Ok((start, end, format))
    }
}

fn parse_time(name: &str, value: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| {
        AppError::BadRequest(format!("Invalid '{}' time '{}': {}", name, value, e))
    })
}

fn check_device(state: &AppState, id: &str) -> Result<(), AppError> {
    if !state.registry.is_empty() && state.registry.get(id).is_none() {
        return Err(AppError::NotFound(format!("Device not found: {}", id)));
    }
    Ok(())
}

fn device_at(state: &AppState, location: &str) -> Result<String, AppError> {
    state
        .registry
        .by_location(location)
        .map(|d| d.id.clone())
        .ok_or_else(|| AppError::NotFound(format!("No device at location: {}", location)))
}

async fn device_range(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response, AppError> {
    check_device(&state, &id)?;
    range_response(&state, &id, &params).await
}

async fn location_range(
    State(state): State<Arc<AppState>>,
    Path(location): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response, AppError> {
    let id = device_at(&state, &location)?;
    range_response(&state, &id, &params).await
}

async fn range_response(state: &AppState, device: &str, params: &RangeParams) -> Result<Response, AppError> {
    let (start, end, format) = params.parse()?;
    let series = state.query.get_range_between(device, start, end).await?;
    debug!("Range read for {} returned {} points", device, series.len());

    let mut body = Vec::new();
    export::write_series(&series, format, &mut body)?;
    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Newest reading of one device.
#[derive(Debug, Serialize)]
pub struct LatestReading {
    pub device: String,
    /// Registered location, or the device id when it has none.
    pub location: String,
    pub timestamp_ms: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub temperature: f64,
    pub humidity: f64,
    /// g/m³, rounded to two decimals.
    pub absolute_humidity: f64,
}

impl LatestReading {
    fn new(device: String, location: Option<String>, m: Measurement) -> Result<Self, AppError> {
        let time = OffsetDateTime::from_unix_timestamp_nanos(i128::from(m.timestamp_ms) * 1_000_000)
            .map_err(|e| AppError::Store(picotherm_store::Error::InvalidTimestamp(e.to_string())))?;
        Ok(Self {
            location: location.unwrap_or_else(|| device.clone()),
            device,
            timestamp_ms: m.timestamp_ms,
            time,
            temperature: m.temperature,
            humidity: m.humidity,
            absolute_humidity: (m.absolute_humidity() * 100.0).round() / 100.0,
        })
    }
}

async fn latest_of(state: &AppState, device: String) -> Result<Option<LatestReading>, AppError> {
    let location = state.registry.get(&device).and_then(|d| d.location.clone());
    match state.hot.latest(&device).await? {
        Some(m) => Ok(Some(LatestReading::new(device, location, m)?)),
        None => Ok(None),
    }
}

async fn latest_response(state: &AppState, device: String) -> Result<Json<LatestReading>, AppError> {
    latest_of(state, device.clone())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No readings for {}", device)))
}

async fn all_latest(State(state): State<Arc<AppState>>) -> Result<Json<Vec<LatestReading>>, AppError> {
    let devices = state.device_ids().await?;
    let readings = try_join_all(devices.into_iter().map(|id| latest_of(&state, id))).await?;
    Ok(Json(readings.into_iter().flatten().collect()))
}

async fn device_latest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LatestReading>, AppError> {
    check_device(&state, &id)?;
    latest_response(&state, id).await
}

async fn location_latest(
    State(state): State<Arc<AppState>>,
    Path(location): Path<String>,
) -> Result<Json<LatestReading>, AppError> {
    let id = device_at(&state, &location)?;
    latest_response(&state, id).await
}

async fn rollup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<TriggerSummary>, AppError> {
    let devices = state.device_ids().await?;
    let summary = state
        .trigger()
        .run_request(&devices, request, state.clock.today())
        .await?;
    Ok(Json(summary))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Core(picotherm_core::Error),
    Store(picotherm_store::Error),
}

impl From<picotherm_core::Error> for AppError {
    fn from(e: picotherm_core::Error) -> Self {
        AppError::Core(e)
    }
}

impl From<picotherm_store::Error> for AppError {
    fn from(e: picotherm_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use picotherm_core::Error as CoreError;

        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Core(e @ (CoreError::DataUnavailable(_) | CoreError::MissingPeriod(_))) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            AppError::Core(
                e @ (CoreError::InvalidRange { .. }
                | CoreError::Parse(_)
                | CoreError::InvalidConfig(_)),
            ) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Core(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use picotherm_core::FixedClock;
    use picotherm_store::{ColdStore, MockColdStore, MockHotStore};
    use picotherm_types::{Measurement, Period, Series, date_start_ms};
    use time::macros::date;
    use tower::ServiceExt;

    use crate::config::{Config, DeviceConfig};

    const HOUR: i64 = 3_600_000;

    struct TestApp {
        hot: Arc<MockHotStore>,
        cold: Arc<MockColdStore>,
        router: Router,
    }

    /// Today is 2024-03-07; `pt-1` lives in the Bedroom.
    fn create_test_app() -> TestApp {
        let hot = Arc::new(MockHotStore::new());
        let cold = Arc::new(MockColdStore::new());
        let mut config = Config::default();
        config.devices = vec![
            DeviceConfig {
                id: "pt-1".into(),
                location: Some("Bedroom".into()),
            },
            DeviceConfig {
                id: "pt-2".into(),
                location: None,
            },
        ];
        let state = AppState::new(
            config,
            hot.clone(),
            cold.clone(),
            Arc::new(FixedClock::at_noon(date!(2024 - 03 - 07))),
        );
        TestApp {
            hot,
            cold,
            router: router().with_state(state),
        }
    }

    async fn get(app: &TestApp, uri: &str) -> Response {
        app.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(app: &TestApp, uri: &str, json: &str) -> Response {
        app.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn response_body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn response_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&response_body(response).await).unwrap()
    }

    async fn seed_yesterday(app: &TestApp) {
        let day = date!(2024 - 03 - 06);
        let points: Vec<Measurement> = (0..24)
            .map(|h| Measurement::new(date_start_ms(day) + h * HOUR, 20.0 + h as f64 / 10.0, 50.0))
            .collect();
        app.cold
            .put(&Period::day("pt-1", day), &Series::new(points).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();
        let response = get(&app, "/api/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_list_devices() {
        let app = create_test_app();
        let response = get(&app, "/api/devices").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json[0]["id"], "pt-1");
        assert_eq!(json[0]["location"], "Bedroom");
        assert_eq!(json[1]["id"], "pt-2");
    }

    #[tokio::test]
    async fn test_device_range_json() {
        let app = create_test_app();
        seed_yesterday(&app).await;

        let response = get(
            &app,
            "/api/devices/pt-1/range?start=2024-03-06T06:00:00Z&end=2024-03-06T09:00:00Z",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let json = response_json(response).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["time"], "2024-03-06T06:00:00Z");
        assert_eq!(rows[2]["timestamp_ms"], date_start_ms(date!(2024 - 03 - 06)) + 8 * HOUR);
    }

    #[tokio::test]
    async fn test_location_range_csv_includes_live_data() {
        let app = create_test_app();
        seed_yesterday(&app).await;
        let today = date_start_ms(date!(2024 - 03 - 07));
        app.hot
            .insert("pt-1", vec![Measurement::new(today + HOUR, 19.5, 48.0)])
            .await;

        let response = get(
            &app,
            "/api/locations/bedroom/range?start=2024-03-06T23:00:00Z&end=2024-03-07T12:00:00Z&format=csv",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "timestamp_ms,time,temperature,humidity");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("2024-03-07T01:00:00Z"));
    }

    #[tokio::test]
    async fn test_missing_closed_day_is_404() {
        let app = create_test_app();
        let response = get(
            &app,
            "/api/devices/pt-2/range?start=2024-03-01T00:00:00Z&end=2024-03-02T00:00:00Z",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = response_json(response).await;
        assert_eq!(json["error"], "Data unavailable for pt-2 day 2024-03-01");
    }

    #[tokio::test]
    async fn test_unknown_device_and_location_are_404() {
        let app = create_test_app();
        let q = "range?start=2024-03-01T00:00:00Z&end=2024-03-02T00:00:00Z";

        let response = get(&app, &format!("/api/devices/pt-9/{q}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = get(&app, &format!("/api/locations/Kitchen/{q}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("Kitchen"));
    }

    #[tokio::test]
    async fn test_bad_range_input_is_400() {
        let app = create_test_app();
        for uri in [
            "/api/devices/pt-1/range?start=yesterday&end=2024-03-02T00:00:00Z",
            "/api/devices/pt-1/range?start=2024-03-02T00:00:00Z&end=2024-03-01T00:00:00Z",
            "/api/devices/pt-1/range?start=2024-03-01T00:00:00Z&end=2024-03-02T00:00:00Z&format=xml",
        ] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert!(response_json(response).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let app = create_test_app();
        app.cold.set_should_fail(true, Some("bucket gone")).await;

        let response = get(
            &app,
            "/api/devices/pt-1/range?start=2024-03-01T00:00:00Z&end=2024-03-02T00:00:00Z",
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("bucket gone"));
    }

    #[tokio::test]
    async fn test_latest_by_location_derives_absolute_humidity() {
        let app = create_test_app();
        let today = date_start_ms(date!(2024 - 03 - 07));
        app.hot
            .insert(
                "pt-1",
                vec![
                    Measurement::new(today + HOUR, 19.0, 55.0),
                    Measurement::new(today + 2 * HOUR, 20.0, 50.0),
                ],
            )
            .await;

        let response = get(&app, "/api/locations/BEDROOM/latest").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["device"], "pt-1");
        assert_eq!(json["location"], "Bedroom");
        assert_eq!(json["time"], "2024-03-07T02:00:00Z");
        assert_eq!(json["temperature"], 20.0);
        assert_eq!(json["absolute_humidity"], 8.64);
    }

    #[tokio::test]
    async fn test_latest_for_every_device() {
        let app = create_test_app();
        app.hot
            .insert("pt-2", vec![Measurement::new(1_709_769_600_000, 18.0, 60.0)])
            .await;

        let response = get(&app, "/api/latest").await;
        assert_eq!(response.status(), StatusCode::OK);

        // pt-1 has no readings and is left out; pt-2 has no location.
        let json = response_json(response).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["device"], "pt-2");
        assert_eq!(rows[0]["location"], "pt-2");
    }

    #[tokio::test]
    async fn test_latest_without_readings_is_404() {
        let app = create_test_app();
        let response = get(&app, "/api/devices/pt-1/latest").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response_json(response).await["error"], "No readings for pt-1");

        let response = get(&app, "/api/devices/pt-9/latest").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rollup_trigger_defaults_to_yesterday() {
        let app = create_test_app();
        let day = date!(2024 - 03 - 06);
        app.hot
            .insert("pt-1", vec![Measurement::new(date_start_ms(day) + HOUR, 21.0, 45.0)])
            .await;

        let response = post_json(&app, "/api/rollup", r#"{"granularity":"day"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["period"], "2024-03-06");
        assert_eq!(json["devices"].as_array().unwrap().len(), 2);
        assert_eq!(json["devices"][0]["device"], "pt-1");
        assert_eq!(json["devices"][0]["detail"]["points"], 1);
        assert_eq!(json["devices"][1]["detail"]["points"], 0);

        let blob = app.cold.get(&Period::day("pt-1", day)).await.unwrap();
        assert_eq!(blob.map(|s| s.len()), Some(1));
    }

    #[tokio::test]
    async fn test_rollup_trigger_rejects_bad_body() {
        let app = create_test_app();
        let response = post_json(&app, "/api/rollup", r#"{"granularity":"hourly"}"#).await;
        assert!(response.status().is_client_error());
    }
}
