use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use shared::types::{
    ExperimentRecord, McpBatchRequest, McpRequest, McpResponse, ServiceInfo, StatusUpdate,
};
use crate::error::ChaosError;
use crate::parser::Context;
use crate::service_context::ServiceContext;
use crate::synth::CatalogEntry;

pub type AppState = ServiceContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: usize,
    pub experiments: usize,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: &'static str,
}

/// Registry and tracker misuse, reported to the calling collaborator
pub struct ApiError(ChaosError);

impl From<ChaosError> for ApiError {
    fn from(e: ChaosError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChaosError::UnknownService(_) | ChaosError::UnknownExperiment(_) => StatusCode::NOT_FOUND,
            ChaosError::DuplicateService(_) | ChaosError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ChaosError::TrackerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            error_code: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/mcp", post(handle_instruction))
        .route("/v1/mcp/batch", post(handle_batch))
        .route("/v1/templates", get(get_templates))
        .route("/v1/services", get(get_services).post(register_service))
        .route("/v1/services/:name", get(get_service))
        .route("/v1/experiments", get(get_experiments))
        .route("/v1/experiments/hash", get(get_hash))
        .route("/v1/experiments/:id", get(get_experiment))
        .route("/v1/experiments/:id/status", put(update_status))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok",
        services: state.registry.len(),
        experiments: state.tracker.len().await?,
    }))
}

async fn handle_instruction(
    State(state): State<AppState>,
    Json(req): Json<McpRequest>,
) -> (StatusCode, Json<McpResponse>) {
    let context = Context::new(req.context);
    let response = state.orchestrator.handle(&req.instruction, &context).await;
    let status = match response.error_code.as_deref() {
        None => StatusCode::OK,
        Some("TrackerUnavailable") => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(response))
}

async fn handle_batch(
    State(state): State<AppState>,
    Json(req): Json<McpBatchRequest>,
) -> Json<Vec<McpResponse>> {
    Json(state.orchestrator.handle_batch(req.requests).await)
}

async fn get_templates(State(state): State<AppState>) -> Json<Vec<CatalogEntry>> {
    Json(state.catalog.entries())
}

async fn get_services(State(state): State<AppState>) -> Json<Vec<ServiceInfo>> {
    Json(state.registry.list())
}

async fn register_service(
    State(state): State<AppState>,
    Json(info): Json<ServiceInfo>,
) -> Result<(StatusCode, Json<ServiceInfo>), ApiError> {
    state.registry.register(info.clone())?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceInfo>, ApiError> {
    Ok(Json(state.registry.lookup(&name)?))
}

async fn get_experiments(State(state): State<AppState>) -> Result<Json<Vec<ExperimentRecord>>, ApiError> {
    Ok(Json(state.tracker.list().await?))
}

async fn get_hash(State(state): State<AppState>) -> Result<String, ApiError> {
    Ok(state.tracker.hash().await?)
}

async fn get_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExperimentRecord>, ApiError> {
    state
        .tracker
        .get(id.clone())
        .await?
        .map(Json)
        .ok_or(ApiError(ChaosError::UnknownExperiment(id)))
}

/// Execution monitor callback
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<ExperimentRecord>, ApiError> {
    Ok(Json(state.tracker.update_status(id, update.status).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use crate::config::Config;

    fn app() -> Router {
        let config = Config::from_toml(
            r#"
            [[services]]
            name = "web-server"
            host = "localhost"
            port = 8080
            process = "nginx"

            [[services]]
            name = "database"
            host = "localhost"
            port = 5432
            process = "postgres"
            "#,
        )
        .unwrap();
        router(ServiceContext::start(&config).unwrap())
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
        (status, value)
    }

    #[tokio::test]
    async fn test_mcp_success_and_history() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/mcp",
            Some(json!({"instruction": "cause 50% cpu load on web-server for 30s"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], "blade create cpu load --cpu-percent 50 --timeout 30s");
        assert!(body.get("error").is_none());

        let (status, history) = send(&app, Method::GET, "/v1/experiments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["id"], body["experiment_id"]);
        assert_eq!(history[0]["status"], "Pending");
    }

    #[tokio::test]
    async fn test_mcp_failure_is_structured() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/mcp",
            Some(json!({"instruction": "melt the gpu"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["command"], "");
        assert_eq!(body["error_code"], "UnrecognizedIntent");

        let (_, health) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(health["experiments"], 0);
        assert_eq!(health["services"], 2);
    }

    #[tokio::test]
    async fn test_batch() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/mcp/batch",
            Some(json!({"requests": [
                {"instruction": "kill process postgres"},
                {"instruction": "cpu load on payments"}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["command"], "blade create process kill --process postgres --timeout 30s");
        assert_eq!(body[1]["error_code"], "TargetNotFound");
    }

    #[tokio::test]
    async fn test_status_updates_from_monitor() {
        let app = app();
        let (_, body) = send(
            &app,
            Method::POST,
            "/v1/mcp",
            Some(json!({"instruction": "kill the database process"})),
        )
        .await;
        let id = body["experiment_id"].as_str().unwrap().to_string();
        let uri = format!("/v1/experiments/{}/status", id);

        let (_, hash_before) = send(&app, Method::GET, "/v1/experiments/hash", None).await;

        let (status, record) = send(&app, Method::PUT, &uri, Some(json!({"status": "Running"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "Running");

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"status": "Completed"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, err) = send(&app, Method::PUT, &uri, Some(json!({"status": "Running"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error_code"], "InvalidTransition");

        let (status, _) = send(
            &app,
            Method::PUT,
            "/v1/experiments/exp-999999/status",
            Some(json!({"status": "Running"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, record) = send(&app, Method::GET, &format!("/v1/experiments/{}", id), None).await;
        assert_eq!(record["status"], "Completed");

        let (_, hash_after) = send(&app, Method::GET, "/v1/experiments/hash", None).await;
        assert_ne!(hash_before, hash_after);
    }

    #[tokio::test]
    async fn test_service_registration() {
        let app = app();
        let cache = json!({"name": "cache", "host": "10.0.0.9", "port": 6379, "process": "redis-server"});

        let (status, _) = send(&app, Method::POST, "/v1/services", Some(cache.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, err) = send(&app, Method::POST, "/v1/services", Some(cache)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error_code"], "DuplicateService");

        let (status, info) = send(&app, Method::GET, "/v1/services/cache", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["process"], "redis-server");

        let (status, _) = send(&app, Method::GET, "/v1/services/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = send(&app, Method::GET, "/v1/services", None).await;
        assert_eq!(list.as_array().unwrap().len(), 3);

        // Newly registered services are targetable straight away
        let (_, body) = send(
            &app,
            Method::POST,
            "/v1/mcp",
            Some(json!({"instruction": "kill the cache process"})),
        )
        .await;
        assert_eq!(body["command"], "blade create process kill --process redis-server --timeout 30s");
    }

    #[tokio::test]
    async fn test_templates() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/v1/templates", None).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0]["experiment_type"], "cpu");
        assert_eq!(
            entries[0]["pattern"],
            "blade create cpu load --cpu-percent <int> --timeout <duration>"
        );
    }
}
