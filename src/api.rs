//! REST API for route optimization and demand forecasting.
//!
//! Provides endpoints for:
//! - Route optimization (`POST /optimize`)
//! - Demand prediction (`POST /predict`) and dynamic pricing (`POST /pricing`)
//! - Demo data retrieval
//! - Swagger UI at /q/swagger-ui

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info_span, Instrument};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::Config;
use crate::demo_data::{available_datasets, generate_by_name, generate_history};
use crate::domain::{DemandSample, ForecastMethod, Termination};
use crate::dto::{
    OptimizeRequest, OptimizeResponse, PredictRequest, PredictResponse, PricingFactors,
    PricingRequest, PricingResponse, RouteDto,
};
use crate::error::ServiceError;
use crate::service::OptimizationService;

/// Days of synthetic history served by `/demo-data/history`.
const DEMO_HISTORY_DAYS: usize = 60;

/// Application state shared across handlers.
pub struct AppState {
    pub service: OptimizationService,
    /// Solves that stopped on the move budget or deadline.
    budget_hits: AtomicU64,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            service: OptimizationService::new(config),
            budget_hits: AtomicU64::new(0),
        }
    }

    pub fn budget_hits(&self) -> u64 {
        self.budget_hits.load(Ordering::Relaxed)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Creates the API router with CORS and Swagger UI enabled.
pub fn create_router(config: Config) -> Router {
    router(Arc::new(AppState::new(config)))
}

/// Builds the router over existing state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/history", get(get_demo_history))
        .route("/demo-data/{name}", get(get_demo_data))
        // Core
        .route("/optimize", post(optimize))
        .route("/predict", post(predict))
        .route("/pricing", post(pricing))
        // Swagger UI at /q/swagger-ui (Quarkus-style path)
        .merge(SwaggerUi::new("/q/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health & Info
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Status indicator ("UP" when healthy).
    pub status: &'static str,
}

/// GET /health - Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// Application info response.
#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    /// Application name.
    pub name: &'static str,
    /// Application version.
    pub version: &'static str,
    /// Optimizer engine description.
    pub engine: &'static str,
    /// Optimize calls that returned a best-so-far plan.
    pub budget_hits: u64,
}

/// GET /info - Application info endpoint.
#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "Application info", body = InfoResponse))
)]
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Dairy Logistics",
        version: env!("CARGO_PKG_VERSION"),
        engine: "cheapest-insertion + local search",
        budget_hits: state.budget_hits(),
    })
}

// ============================================================================
// Demo Data
// ============================================================================

/// GET /demo-data - List available demo datasets.
#[utoipa::path(
    get,
    path = "/demo-data",
    responses((status = 200, description = "List of demo dataset names", body = Vec<String>))
)]
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(available_datasets().to_vec())
}

/// GET /demo-data/{name} - Get a ready-to-post optimize request.
#[utoipa::path(
    get,
    path = "/demo-data/{name}",
    params(("name" = String, Path, description = "Demo dataset name")),
    responses(
        (status = 200, description = "Demo data retrieved", body = OptimizeRequest),
        (status = 404, description = "Dataset not found")
    )
)]
async fn get_demo_data(Path(name): Path<String>) -> Result<Json<OptimizeRequest>, StatusCode> {
    generate_by_name(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// GET /demo-data/history - Synthetic daily demand ending yesterday.
#[utoipa::path(
    get,
    path = "/demo-data/history",
    responses((status = 200, description = "Daily demand history", body = Vec<DemandSample>))
)]
async fn get_demo_history() -> Json<Vec<DemandSample>> {
    let today = chrono::Utc::now().date_naive();
    Json(generate_history(today, DEMO_HISTORY_DAYS))
}

// ============================================================================
// Optimize / Predict / Pricing
// ============================================================================

/// POST /optimize - Plan capacitated delivery routes.
#[utoipa::path(
    post,
    path = "/optimize",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Routes, possibly with unserved stops", body = OptimizeResponse),
        (status = 400, description = "Invalid input"),
        (status = 422, description = "Unserved stops in strict capacity mode")
    )
)]
async fn optimize(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<OptimizeResponse>, ServiceError> {
    let request: OptimizeRequest = parse_body(&body)?;
    let span = info_span!("optimize", request_id = %Uuid::new_v4());

    let worker = Arc::clone(&state);
    let plan = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        worker.service.optimize(&request)
    })
    .await
    .map_err(|e| ServiceError::Internal(format!("optimizer task failed: {}", e)))??;

    if plan.result.termination.budget_hit() {
        state.budget_hits.fetch_add(1, Ordering::Relaxed);
    }

    Ok(Json(plan.to_response()))
}

/// POST /predict - Forecast next-day demand. An empty body falls back.
#[utoipa::path(
    post,
    path = "/predict",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Forecast", body = PredictResponse),
        (status = 400, description = "Malformed or out-of-range history")
    )
)]
async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ServiceError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        PredictRequest::default()
    } else {
        parse_body(&body)?
    };

    let span = info_span!("predict", request_id = %Uuid::new_v4());
    async { state.service.predict(&request) }
        .instrument(span)
        .await
        .map(Json)
}

/// POST /pricing - Quote a dynamic per-litre price.
#[utoipa::path(
    post,
    path = "/pricing",
    request_body = PricingRequest,
    responses(
        (status = 200, description = "Price quote", body = PricingResponse),
        (status = 400, description = "Invalid input")
    )
)]
async fn pricing(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PricingResponse>, ServiceError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        PricingRequest::default()
    } else {
        parse_body(&body)?
    };
    state.service.price(&request).map(Json)
}

/// Decodes a JSON body, reporting failures in the service error format.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|e| ServiceError::invalid("body", e.to_string()))
}

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        info,
        list_demo_data,
        get_demo_data,
        get_demo_history,
        optimize,
        predict,
        pricing,
    ),
    components(schemas(
        HealthResponse,
        InfoResponse,
        OptimizeRequest,
        OptimizeResponse,
        RouteDto,
        Termination,
        PredictRequest,
        PredictResponse,
        DemandSample,
        ForecastMethod,
        PricingRequest,
        PricingResponse,
        PricingFactors,
    ))
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn quiet_state(config: Config) -> Arc<AppState> {
        Arc::new(AppState::new(Config {
            console_output: false,
            ..config
        }))
    }

    async fn send(state: Arc<AppState>, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let state = quiet_state(Config::default());
        let (status, body) = send(state.clone(), "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");

        let (status, body) = send(state, "GET", "/info", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Dairy Logistics");
        assert_eq!(body["budget_hits"], 0);
    }

    #[tokio::test]
    async fn test_optimize_scenario() {
        let state = quiet_state(Config::default());
        let body = r#"{
            "locations": ["depot", "jalandhar", "amritsar", "patiala"],
            "demands": [0, 250, 300, 200],
            "num_vehicles": 2,
            "capacity": 500
        }"#;
        let (status, json) = send(state, "POST", "/optimize", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["routes"].as_array().unwrap().len(), 2);
        assert_eq!(json["unserved"].as_array().unwrap().len(), 0);
        assert_eq!(json["total_load"], 750.0);
        assert_eq!(json["termination"], "converged");
        assert_eq!(json["routes"][0]["stops"][0], "depot");
    }

    #[tokio::test]
    async fn test_optimize_length_mismatch_is_bad_request() {
        let state = quiet_state(Config::default());
        let body = r#"{"locations": ["depot", "moga"], "demands": [0], "num_vehicles": 1}"#;
        let (status, json) = send(state, "POST", "/optimize", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_input");
        assert_eq!(json["field"], "demands");
        assert!(json.get("routes").is_none());
    }

    #[tokio::test]
    async fn test_optimize_malformed_json() {
        let state = quiet_state(Config::default());
        let (status, json) = send(state, "POST", "/optimize", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["field"], "body");
    }

    #[tokio::test]
    async fn test_optimize_strict_capacity() {
        let state = quiet_state(Config {
            strict_capacity: true,
            ..Config::default()
        });
        let body = r#"{
            "locations": ["depot", "jalandhar", "amritsar", "patiala"],
            "demands": [0, 250, 300, 200],
            "num_vehicles": 1,
            "capacity": 400
        }"#;
        let (status, json) = send(state, "POST", "/optimize", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"], "infeasible_demand");
    }

    #[tokio::test]
    async fn test_budget_hits_counted() {
        let state = quiet_state(Config {
            optimizer: crate::optimizer::OptimizerConfig {
                time_limit: std::time::Duration::ZERO,
                move_budget: 10,
            },
            ..Config::default()
        });
        let body = r#"{"locations": ["depot", "moga", "bathinda"], "demands": [0, 10, 10], "num_vehicles": 1}"#;
        let (status, json) = send(state.clone(), "POST", "/optimize", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["termination"], "deadline_expired");
        assert_eq!(state.budget_hits(), 1);
    }

    #[tokio::test]
    async fn test_predict_empty_body_falls_back() {
        let state = quiet_state(Config::default());
        for body in ["", "{}"] {
            let (status, json) = send(state.clone(), "POST", "/predict", body).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["method"], "fallback");
            assert_eq!(json["predicted_demand"], 1200.0);
            assert_eq!(json["confidence"], 0.5);
        }
    }

    #[tokio::test]
    async fn test_predict_with_history() {
        let state = quiet_state(Config::default());
        let history: Vec<String> = (1..=10)
            .map(|d| format!(r#"{{"date":"2025-03-{:02}","actual_demand":1000}}"#, d))
            .collect();
        let body = format!(r#"{{"history":[{}]}}"#, history.join(","));
        let (status, json) = send(state, "POST", "/predict", &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["method"], "model");
        assert_eq!(json["predicted_demand"], 1000.0);
        assert_eq!(json["date"], "2025-03-11");
    }

    #[tokio::test]
    async fn test_predict_malformed_history() {
        let state = quiet_state(Config::default());
        let (status, json) = send(state, "POST", "/predict", r#"{"history":[{"date":"soon"}]}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_predict_out_of_range_history() {
        let state = quiet_state(Config::default());
        let history: Vec<String> = (1..=7)
            .map(|d| format!(r#"{{"date":"2025-03-{:02}","actual_demand":-500}}"#, d))
            .collect();
        let body = format!(r#"{{"history":[{}]}}"#, history.join(","));
        let (status, json) = send(state.clone(), "POST", "/predict", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_input");
        assert_eq!(json["field"], "history[0].actual_demand");

        let body = r#"{"history":[{"date":"2025-03-01","actual_demand":900,"confidence":2}]}"#;
        let (status, json) = send(state, "POST", "/predict", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["field"], "history[0].confidence");
    }

    #[tokio::test]
    async fn test_predict_last_representable_date() {
        let state = quiet_state(Config::default());
        let body = r#"{"history":[{"date":"+262142-12-31","actual_demand":5}]}"#;
        let (status, json) = send(state, "POST", "/predict", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["method"], "fallback");
        assert!(json.get("date").is_none());
    }

    #[tokio::test]
    async fn test_pricing() {
        let state = quiet_state(Config::default());
        let (status, json) = send(state.clone(), "POST", "/pricing", r#"{"quality":"A+"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["dynamic_price"], 68.4);
        assert_eq!(json["factors"]["quality_multiplier"], 1.2);

        let (status, json) = send(state.clone(), "POST", "/pricing", r#"{"predicted_demand":1800}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["factors"]["demand_index"], 1.5);
        // 50 x (1 + 0.225 - 0.01)
        assert_eq!(json["dynamic_price"], 60.75);

        let (status, _) = send(state, "POST", "/pricing", r#"{"spoilage_risk":-1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_demo_data() {
        let state = quiet_state(Config::default());
        let (status, json) = send(state.clone(), "GET", "/demo-data", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0], "punjab");

        let (status, json) = send(state.clone(), "GET", "/demo-data/punjab", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["num_vehicles"], 3);

        let (status, json) = send(state.clone(), "GET", "/demo-data/history", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), DEMO_HISTORY_DAYS);

        let (status, _) = send(state, "GET", "/demo-data/atlantis", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
