//! HTTP control plane server for routed.
//!
//! Local-only REST API: routing, semantic lookup, catalog management,
//! decision history and metrics. Optional bearer-token auth.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use route_core::semantic::{SemanticMatch, SemanticMatcher};
use route_core::skills::SkillDefinition;
use route_core::{Config, DecisionRecord, RoutingDecision, Skill, SkillCatalog};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::catalog::store_definition;
use crate::embeddings::HashEmbedder;
use crate::logger::DecisionLogger;
use crate::metrics::{MetricsSnapshot, RoutingMetrics};
use crate::storage::{Storage, StorageError};

/// Default and maximum page sizes for GET /decisions.
const DEFAULT_DECISION_LIMIT: u32 = 50;
const MAX_DECISION_LIMIT: u32 = 500;

/// Shared state for HTTP handlers.
pub struct AppState {
    pub storage: Arc<Storage>,
    pub router: route_core::Router,
    pub semantic: SemanticMatcher,
    pub embedder: Arc<HashEmbedder>,
    pub logger: DecisionLogger,
    pub metrics: Arc<RoutingMetrics>,
    pub config: Config,
    pub auth_token: Option<String>,
}

impl AppState {
    /// Wire the router, semantic matcher and decision logger over one storage.
    pub fn new(storage: Arc<Storage>, config: Config, auth_token: Option<String>) -> Self {
        let embedder = Arc::new(HashEmbedder::new(config.embedding_dims));
        let metrics = Arc::new(RoutingMetrics::new());
        let semantic = SemanticMatcher::new(embedder.clone(), storage.clone());
        let catalog: Arc<dyn SkillCatalog> = storage.clone();
        let router = route_core::Router::new(catalog, config.clone()).with_semantic(semantic.clone());
        let logger = DecisionLogger::new(
            Arc::clone(&storage),
            Arc::clone(&metrics),
            config.snippet_chars(),
        );

        Self {
            storage,
            router,
            semantic,
            embedder,
            logger,
            metrics,
            config,
            auth_token,
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/route", post(route_message))
        .route("/semantic", post(semantic_matches))
        .route("/skills", get(list_skills).post(upsert_skill))
        .route("/skills/{key}", get(get_skill))
        .route("/skills/{key}/activate", post(activate_skill))
        .route("/skills/{key}/deactivate", post(deactivate_skill))
        .route("/sequences/{key}/links", put(set_sequence_links))
        .route("/decisions", get(list_decisions))
        .route("/metrics", get(get_metrics))
        // Health check
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server; returns when `shutdown` is cancelled.
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_router(state);

    // Local-only.
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

/// Validate auth token if configured.
fn check_auth(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if let Some(expected) = &state.auth_token {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.strip_prefix("Bearer ").unwrap_or(s));

        match provided {
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(error_response(StatusCode::UNAUTHORIZED, "invalid auth token")),
            None => Err(error_response(StatusCode::UNAUTHORIZED, "missing auth token")),
        }
    } else {
        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a storage error to a status: missing skills are 404, bad input 400.
fn storage_error(action: &str, e: StorageError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        StorageError::SkillNotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidDefinition(_) | StorageError::NotASequence(_) => StatusCode::BAD_REQUEST,
        StorageError::Database(_) | StorageError::Serialization(_) => {
            error!("failed to {}: {}", action, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, format!("failed to {action}: {e}"))
}

// --- Request/Response types ---

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Request payload for POST /route.
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub decision: RoutingDecision,
}

/// Request payload for POST /semantic.
#[derive(Debug, Deserialize)]
pub struct SemanticRequest {
    pub query: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SemanticResponse {
    pub matches: Vec<SemanticMatch>,
}

/// Query params for GET /skills.
#[derive(Debug, Deserialize, Default)]
pub struct ListSkillsQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ListSkillsResponse {
    pub skills: Vec<Skill>,
}

#[derive(Debug, Serialize)]
pub struct SkillResponse {
    pub skill: Skill,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub linked_skills: Vec<String>,
}

/// Request payload for PUT /sequences/{key}/links.
#[derive(Debug, Deserialize)]
pub struct SetLinksRequest {
    pub linked_skills: Vec<String>,
}

/// Query params for GET /decisions.
#[derive(Debug, Deserialize, Default)]
pub struct ListDecisionsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListDecisionsResponse {
    pub decisions: Vec<DecisionRecord>,
}

// --- Handlers ---

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /route - Route a message to a sequence or skill.
async fn route_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RouteRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    if req.message.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "message cannot be empty"));
    }

    let output = state.router.route_with_diagnostics(&req.message).await;
    let diagnostics = &output.diagnostics;
    let failed_fetches =
        usize::from(diagnostics.sequence_fetch_failed) + usize::from(diagnostics.individual_fetch_failed);
    if failed_fetches > 0 {
        state.metrics.inc_catalog_fetch_failed(failed_fetches);
    }
    if diagnostics.semantic_failed {
        state.metrics.inc_semantic_failed();
    }
    state.metrics.record_decision(&output.decision);

    if state.config.log_decisions {
        // Fire-and-forget: the response never waits on the log write.
        drop(
            state
                .logger
                .record(req.user_id.clone(), &req.message, &output.decision),
        );
    }

    info!(
        outcome = output.decision.outcome.as_str(),
        selected = output.decision.selected.as_ref().map(|c| c.skill_key.as_str()),
        "routed message"
    );
    Ok(Json(RouteResponse {
        decision: output.decision,
    }))
}

/// POST /semantic - Similarity-ranked skills for a query.
async fn semantic_matches(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SemanticRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    let threshold = req.threshold.unwrap_or(state.config.semantic_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("threshold must be within [0, 1], got {threshold}"),
        ));
    }
    let limit = req.limit.unwrap_or(state.config.semantic_limit);

    let matches = match state.semantic.try_find_matches(&req.query, threshold, limit).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "semantic lookup failed, returning no matches");
            state.metrics.inc_semantic_failed();
            Vec::new()
        }
    };

    Ok(Json(SemanticResponse { matches }))
}

/// GET /skills - List skills.
async fn list_skills(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListSkillsQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    let skills = state
        .storage
        .list_skills(query.category.as_deref(), query.active)
        .await
        .map_err(|e| storage_error("list skills", e))?;

    Ok(Json(ListSkillsResponse { skills }))
}

/// POST /skills - Create or update a skill from a definition.
async fn upsert_skill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(def): Json<SkillDefinition>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    let skill = store_definition(&state.storage, &state.embedder, &def)
        .await
        .map_err(|e| storage_error("store skill", e))?;

    info!("stored skill: {} ({})", skill.key, skill.id);
    Ok((
        StatusCode::CREATED,
        Json(SkillResponse {
            skill,
            linked_skills: def.linked_skills,
        }),
    ))
}

/// GET /skills/{key} - Get a single skill with its links.
async fn get_skill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    let skill = state
        .storage
        .get_skill(&key)
        .await
        .map_err(|e| storage_error("get skill", e))?;
    let linked_skills = state
        .storage
        .list_sequence_links(&key)
        .await
        .map_err(|e| storage_error("list sequence links", e))?;

    Ok(Json(SkillResponse {
        skill,
        linked_skills,
    }))
}

async fn activate_skill(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    key: Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    set_active(state, headers, key, true).await
}

async fn deactivate_skill(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    key: Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    set_active(state, headers, key, false).await
}

async fn set_active(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    active: bool,
) -> Result<Json<SkillResponse>, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    let skill = state
        .storage
        .set_skill_active(&key, active)
        .await
        .map_err(|e| storage_error("update skill", e))?;

    info!(key = %key, active, "updated skill active flag");
    Ok(Json(SkillResponse {
        skill,
        linked_skills: Vec::new(),
    }))
}

/// PUT /sequences/{key}/links - Replace the skills a sequence orchestrates.
async fn set_sequence_links(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(req): Json<SetLinksRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    if req.linked_skills.iter().any(|k| k == &key) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("sequence '{key}' cannot link itself"),
        ));
    }

    let skill = state
        .storage
        .set_sequence_links(&key, &req.linked_skills)
        .await
        .map_err(|e| storage_error("set sequence links", e))?;

    info!(key = %key, count = req.linked_skills.len(), "replaced sequence links");
    Ok(Json(SkillResponse {
        skill,
        linked_skills: req.linked_skills,
    }))
}

/// GET /decisions - Recent routing decisions.
async fn list_decisions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListDecisionsQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_DECISION_LIMIT)
        .min(MAX_DECISION_LIMIT);
    let decisions = state
        .storage
        .list_decisions(query.user_id.as_deref(), limit)
        .await
        .map_err(|e| storage_error("list decisions", e))?;

    Ok(Json(ListDecisionsResponse { decisions }))
}

/// GET /metrics - Routing counters.
async fn get_metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;
    Ok(Json(state.metrics.snapshot()))
}
