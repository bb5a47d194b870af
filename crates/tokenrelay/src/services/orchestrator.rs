//! Orchestrator: runs a task on behalf of the user forwarded by the edge

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    HandlerResult, Profile, ServiceError, USER_SUB_HEADER, bearer_from_headers, http_client,
    with_common_layers,
};
use crate::config::{OrchestratorSettings, ServiceKind};
use crate::observability;
use crate::{Error, Result};

const WHOAMI_TASK: &str = "whoami";

#[derive(Debug, Clone)]
pub struct OrchestratorState {
    client: reqwest::Client,
    whoami_url: Url,
}

impl OrchestratorState {
    pub fn new(resource_url: &Url, timeout: Duration) -> Result<Self> {
        let whoami_url = resource_url
            .join("/v1/whoami")
            .map_err(|e| Error::Config(format!("Invalid resource URL '{resource_url}': {e}")))?;
        Ok(Self {
            client: http_client(timeout)?,
            whoami_url,
        })
    }

    pub fn from_settings(settings: &OrchestratorSettings) -> Result<Self> {
        let resource_url = Url::parse(&settings.resource_url).map_err(|e| {
            Error::Config(format!(
                "Invalid orchestrator.resource_url '{}': {e}",
                settings.resource_url
            ))
        })?;
        Self::new(
            &resource_url,
            Duration::from_secs(settings.upstream_timeout_secs),
        )
    }

    async fn whoami(&self, access_token: &str) -> HandlerResult<Profile> {
        let started = Instant::now();
        let outcome = self.fetch_profile(access_token).await;
        observability::record_upstream_call("resource", started.elapsed(), outcome.is_ok());
        outcome.map_err(|e| {
            tracing::warn!(error = %e, "Resource API call failed");
            ServiceError::Upstream(format!("Resource API call failed: {e}"))
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> reqwest::Result<Profile> {
        self.client
            .get(self.whoami_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default = "default_task")]
    task: String,
}

fn default_task() -> String {
    WHOAMI_TASK.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub user: String,
    pub result: TaskResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub profile: Profile,
}

pub fn router(state: Arc<OrchestratorState>) -> Router {
    let routes = Router::new()
        .route("/run", post(run_handler))
        .with_state(state);

    with_common_layers(routes, ServiceKind::Orchestrator)
}

async fn run_handler(
    State(state): State<Arc<OrchestratorState>>,
    headers: HeaderMap,
    Json(request): Json<RunRequest>,
) -> HandlerResult<Json<RunResponse>> {
    let (user, access_token) = user_context(&headers)?;

    let profile = match request.task.as_str() {
        WHOAMI_TASK => state.whoami(access_token).await?,
        other => {
            return Err(ServiceError::Validation(format!("Unknown task '{other}'")));
        }
    };

    tracing::info!(%user, task = %request.task, "Task completed");
    Ok(Json(RunResponse {
        user,
        result: TaskResult {
            task: request.task,
            profile,
        },
    }))
}

/// Subject and bearer token forwarded by the edge; both are required.
fn user_context(headers: &HeaderMap) -> HandlerResult<(String, &str)> {
    let token = bearer_from_headers(headers);
    let sub = headers
        .get(USER_SUB_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (sub, token) {
        (Some(sub), Some(token)) => Ok((sub.to_string(), token)),
        _ => Err(ServiceError::Authentication("Missing user context".into())),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        // Nothing listens on the discard port; whoami calls fail fast.
        let resource = Url::parse("http://127.0.0.1:9").unwrap();
        let state = OrchestratorState::new(&resource, Duration::from_secs(1)).unwrap();
        router(Arc::new(state))
    }

    fn run(body: &str, token: Option<&str>, sub: Option<&str>) -> Request<Body> {
        let mut request = Request::post("/run").header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(sub) = sub {
            request = request.header(USER_SUB_HEADER, sub);
        }
        request.body(Body::from(body.to_string())).unwrap()
    }

    async fn detail(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["detail"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_whoami_url() {
        let resource = Url::parse("http://resource:8082/").unwrap();
        let state = OrchestratorState::new(&resource, Duration::from_secs(1)).unwrap();
        assert_eq!(state.whoami_url.as_str(), "http://resource:8082/v1/whoami");
    }

    #[test]
    fn test_run_request_defaults_to_whoami() {
        let request: RunRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.task, "whoami");
    }

    #[tokio::test]
    async fn test_run_missing_sub_header() {
        let response = app()
            .oneshot(run(r#"{"task":"whoami"}"#, Some("tok"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(detail(response).await, "Missing user context");
    }

    #[tokio::test]
    async fn test_run_missing_bearer() {
        let response = app()
            .oneshot(run(r#"{"task":"whoami"}"#, None, Some("user-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_run_unknown_task() {
        let response = app()
            .oneshot(run(r#"{"task":"delete-everything"}"#, Some("tok"), Some("user-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(detail(response).await, "Unknown task 'delete-everything'");
    }

    #[tokio::test]
    async fn test_run_resource_unreachable() {
        let response = app()
            .oneshot(run("{}", Some("tok"), Some("user-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
