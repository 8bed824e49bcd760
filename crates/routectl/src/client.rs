//! HTTP client for the routed daemon.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use route_core::semantic::SemanticMatch;
use route_core::skills::SkillDefinition;
use route_core::{DecisionRecord, RoutingDecision, Skill};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running at {addr}\n  → start with: routed\n  → or set ROUTED_ADDR if using a different address")]
    ConnectionFailed { addr: String },

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("unauthorized: check ROUTED_TOKEN env var or --token flag")]
    Unauthorized,

    #[error(
        "daemon not ready after {timeout_ms}ms at {addr}\n  → ensure routed is running\n  → check ROUTED_TOKEN if auth is enabled"
    )]
    DaemonNotReady { addr: String, timeout_ms: u64 },
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            let addr = e
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            ClientError::ConnectionFailed { addr }
        } else {
            ClientError::HttpError {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RouteRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    decision: RoutingDecision,
}

#[derive(Debug, Serialize)]
struct SemanticRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SemanticResponse {
    matches: Vec<SemanticMatch>,
}

#[derive(Debug, Deserialize)]
struct ListSkillsResponse {
    skills: Vec<Skill>,
}

/// A skill with the keys it links, when it is a sequence.
#[derive(Debug, Deserialize)]
pub struct SkillResponse {
    pub skill: Skill,
    #[serde(default)]
    pub linked_skills: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SetLinksRequest<'a> {
    linked_skills: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ListDecisionsResponse {
    decisions: Vec<DecisionRecord>,
}

/// Error response from API.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Default total timeout for the daemon readiness probe.
const DEFAULT_READY_TIMEOUT_MS: u64 = 5000;

/// Initial backoff delay for the readiness probe.
const INITIAL_BACKOFF_MS: u64 = 200;

/// HTTP client for routed.
pub struct Client {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            http: reqwest::Client::new(),
        }
    }

    /// Check if daemon is healthy by probing /health.
    pub async fn check_health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(&url).headers(self.headers()).send().await?;
        Ok(response.status().is_success())
    }

    /// Wait for daemon to become ready with exponential backoff.
    ///
    /// Retries for 5s total, starting at 200ms and doubling.
    pub async fn wait_for_ready(&self) -> Result<(), ClientError> {
        self.wait_for_ready_with_timeout(DEFAULT_READY_TIMEOUT_MS)
            .await
    }

    /// Wait for daemon to become ready with custom timeout.
    pub async fn wait_for_ready_with_timeout(&self, timeout_ms: u64) -> Result<(), ClientError> {
        let start = std::time::Instant::now();
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.check_health().await {
                Ok(true) => return Ok(()),
                Ok(false) | Err(_) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    if elapsed >= timeout_ms {
                        return Err(ClientError::DaemonNotReady {
                            addr: self.base_url.clone(),
                            timeout_ms,
                        });
                    }

                    eprintln!(
                        "waiting for daemon at {} (retrying in {}ms)",
                        self.base_url, backoff_ms
                    );

                    let remaining = timeout_ms.saturating_sub(elapsed);
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms.min(remaining)))
                        .await;
                    backoff_ms = backoff_ms.saturating_mul(2);
                }
            }
        }
    }

    /// Build headers with optional auth token.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ClientError> {
        let response = request.headers(self.headers()).send().await?;

        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Handle error response from API.
    async fn handle_error(&self, response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();

        if status == 401 {
            return ClientError::Unauthorized;
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| "unknown error".to_string());

        match status {
            404 => ClientError::NotFound(message),
            400 => ClientError::BadRequest(message),
            _ => ClientError::HttpError { status, message },
        }
    }

    /// POST /route
    pub async fn route(&self, message: &str, user_id: Option<&str>) -> Result<RoutingDecision, ClientError> {
        let body: RouteResponse = self
            .send(
                self.http
                    .post(self.url("/route"))
                    .json(&RouteRequest { message, user_id }),
            )
            .await?;
        Ok(body.decision)
    }

    /// POST /semantic
    pub async fn semantic(
        &self,
        query: &str,
        threshold: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<SemanticMatch>, ClientError> {
        let body: SemanticResponse = self
            .send(self.http.post(self.url("/semantic")).json(&SemanticRequest {
                query,
                threshold,
                limit,
            }))
            .await?;
        Ok(body.matches)
    }

    /// GET /skills?category=...&active=...
    pub async fn list_skills(
        &self,
        category: Option<&str>,
        active: Option<bool>,
    ) -> Result<Vec<Skill>, ClientError> {
        let mut params = vec![];
        if let Some(c) = category {
            params.push(format!("category={}", urlencoding::encode(c)));
        }
        if let Some(a) = active {
            params.push(format!("active={a}"));
        }
        let mut path = "/skills".to_string();
        if !params.is_empty() {
            path = format!("{}?{}", path, params.join("&"));
        }

        let body: ListSkillsResponse = self.send(self.http.get(self.url(&path))).await?;
        Ok(body.skills)
    }

    /// GET /skills/{key}
    pub async fn get_skill(&self, key: &str) -> Result<SkillResponse, ClientError> {
        let path = format!("/skills/{}", urlencoding::encode(key));
        self.send(self.http.get(self.url(&path))).await
    }

    /// POST /skills
    pub async fn upsert_skill(&self, def: &SkillDefinition) -> Result<SkillResponse, ClientError> {
        self.send(self.http.post(self.url("/skills")).json(def))
            .await
    }

    /// POST /skills/{key}/activate or /deactivate
    pub async fn set_active(&self, key: &str, active: bool) -> Result<Skill, ClientError> {
        let action = if active { "activate" } else { "deactivate" };
        let path = format!("/skills/{}/{}", urlencoding::encode(key), action);
        let body: SkillResponse = self.send(self.http.post(self.url(&path))).await?;
        Ok(body.skill)
    }

    /// PUT /sequences/{key}/links
    pub async fn set_links(&self, key: &str, linked_skills: &[String]) -> Result<SkillResponse, ClientError> {
        let path = format!("/sequences/{}/links", urlencoding::encode(key));
        self.send(
            self.http
                .put(self.url(&path))
                .json(&SetLinksRequest { linked_skills }),
        )
        .await
    }

    /// GET /decisions?limit=...&user_id=...
    pub async fn list_decisions(
        &self,
        limit: Option<u32>,
        user_id: Option<&str>,
    ) -> Result<Vec<DecisionRecord>, ClientError> {
        let mut params = vec![];
        if let Some(l) = limit {
            params.push(format!("limit={l}"));
        }
        if let Some(u) = user_id {
            params.push(format!("user_id={}", urlencoding::encode(u)));
        }
        let mut path = "/decisions".to_string();
        if !params.is_empty() {
            path = format!("{}?{}", path, params.join("&"));
        }

        let body: ListDecisionsResponse = self.send(self.http.get(self.url(&path))).await?;
        Ok(body.decisions)
    }

    /// GET /metrics
    pub async fn metrics(&self) -> Result<BTreeMap<String, u64>, ClientError> {
        self.send(self.http.get(self.url("/metrics"))).await
    }
}
