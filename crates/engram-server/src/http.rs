// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API built on axum.
//!
//! Read-only surface: search, timeline, export, stats, and a health
//! probe. All failures render as a `(kind, message)` error body so
//! clients can branch on kind without parsing messages.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use engram_core::{EngramError, ObservationKind, ScoredObservation};
use engram_retrieval::{RetrievalEngine, SearchRequest};
use engram_storage::Database;
use engram_storage::queries::{observations, outbox, sessions, summaries};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::cache::SearchCache;
use crate::export::{self, ExportFormat};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<RetrievalEngine>,
    pub cache: Arc<SearchCache>,
    pub default_limit: usize,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Map engine errors onto HTTP statuses.
fn error_response(e: EngramError) -> Response {
    let status = match &e {
        EngramError::Validation(_) => StatusCode::BAD_REQUEST,
        EngramError::NotFound(_) => StatusCode::NOT_FOUND,
        EngramError::TransientIo { .. } | EngramError::Timeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorResponse {
        error: ErrorBody {
            kind: e.kind(),
            message: e.to_string(),
        },
    };
    (status, Json(body)).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/search", get(get_search))
        .route("/api/timeline", get(get_timeline))
        .route("/api/export", get(get_export))
        .route("/api/stats", get(get_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the listener fails.
pub async fn start_server(host: &str, port: u16, state: AppState) -> Result<(), EngramError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| EngramError::Internal(format!("failed to bind {addr}: {e}")))?;
    tracing::info!("engram listening on {addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| EngramError::Internal(format!("http server error: {e}")))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    schema_version: i64,
    uptime_secs: u64,
}

async fn get_health(State(state): State<AppState>) -> Response {
    if let Err(e) = state.db.ping().await {
        return error_response(e);
    }
    match state.db.schema_version().await {
        Ok(schema_version) => Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            schema_version,
            uptime_secs: state.start_time.elapsed().as_secs(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
    /// Comma-separated kind filter.
    #[serde(rename = "type")]
    kind: Option<String>,
    project: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    memory_id: String,
    kind: String,
    title: String,
    subtitle: Option<String>,
    narrative: String,
    project: String,
    created_at: String,
    favorite: bool,
    score: f64,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    count: usize,
    results: Vec<SearchHit>,
}

fn parse_kinds(raw: Option<&str>) -> Vec<ObservationKind> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ObservationKind::from_str_value)
            .collect()
    })
    .unwrap_or_default()
}

fn to_hits(scored: Vec<ScoredObservation>) -> Vec<SearchHit> {
    scored
        .into_iter()
        .map(|s| SearchHit {
            memory_id: s.observation.memory_id,
            kind: s.observation.kind.as_str().to_string(),
            title: s.observation.title,
            subtitle: s.observation.subtitle,
            narrative: s.observation.narrative,
            project: s.observation.project,
            created_at: s.observation.created_at,
            favorite: s.observation.favorite,
            score: s.score,
        })
        .collect()
}

async fn get_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let limit = params.limit.unwrap_or(state.default_limit);
    let kinds = parse_kinds(params.kind.as_deref());

    if let Some(cached) = state
        .cache
        .get(&params.q, &kinds, limit, params.project.as_deref())
    {
        return Json(SearchResponse {
            count: cached.len(),
            results: to_hits(cached),
        })
        .into_response();
    }

    let req = SearchRequest {
        query: params.q.clone(),
        kinds: kinds.clone(),
        limit,
        project: params.project.clone(),
    };
    match state.engine.search(&req).await {
        Ok(scored) => {
            state.cache.put(
                &params.q,
                &kinds,
                limit,
                params.project.as_deref(),
                scored.clone(),
            );
            Json(SearchResponse {
                count: scored.len(),
                results: to_hits(scored),
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct TimelineParams {
    project: Option<String>,
    days: Option<u32>,
}

async fn get_timeline(
    State(state): State<AppState>,
    Query(params): Query<TimelineParams>,
) -> Response {
    let days = params.days.unwrap_or(7);
    match observations::timeline(&state.db, params.project.as_deref(), days).await {
        Ok(rows) => Json(serde_json::json!({ "count": rows.len(), "observations": rows }))
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    format: Option<String>,
}

async fn get_export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Response {
    let raw = params.format.as_deref().unwrap_or("json");
    let Some(format) = ExportFormat::parse(raw) else {
        return error_response(EngramError::Validation(format!(
            "unknown export format: {raw}"
        )));
    };
    let rows = match observations::list_all(&state.db).await {
        Ok(rows) => rows,
        Err(e) => return error_response(e),
    };
    match export::render(format, &rows) {
        Ok(body) => ([(header::CONTENT_TYPE, format.content_type())], body).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_stats(State(state): State<AppState>) -> Response {
    let sessions = match sessions::count_sessions(&state.db).await {
        Ok(n) => n,
        Err(e) => return error_response(e),
    };
    let observations_total = match observations::count_observations(&state.db).await {
        Ok(n) => n,
        Err(e) => return error_response(e),
    };
    let by_kind = match observations::counts_by_kind(&state.db).await {
        Ok(rows) => rows,
        Err(e) => return error_response(e),
    };
    let summaries_total = match summaries::count_summaries(&state.db).await {
        Ok(n) => n,
        Err(e) => return error_response(e),
    };
    let outbox_counts = match outbox::status_counts(&state.db).await {
        Ok(rows) => rows,
        Err(e) => return error_response(e),
    };
    let schema_version = match state.db.schema_version().await {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let store_size_bytes = match state.db.store_size_bytes().await {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    let by_kind: serde_json::Map<String, serde_json::Value> = by_kind
        .into_iter()
        .map(|(kind, n)| (kind, serde_json::Value::from(n)))
        .collect();
    let outbox_counts: serde_json::Map<String, serde_json::Value> = outbox_counts
        .into_iter()
        .map(|(status, n)| (status, serde_json::Value::from(n)))
        .collect();

    Json(serde_json::json!({
        "sessions": sessions,
        "observations": observations_total,
        "observations_by_kind": by_kind,
        "summaries": summaries_total,
        "outbox": outbox_counts,
        "schema_version": schema_version,
        "store_size_bytes": store_size_bytes,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use engram_config::RetrievalConfig;
    use engram_storage::queries::sessions as session_queries;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let db = Database::open_in_memory().await.unwrap();
        session_queries::open_session(&db, "sess-1", "engram").await.unwrap();
        let engine = Arc::new(RetrievalEngine::new(
            db.clone(),
            RetrievalConfig::default(),
            None,
        ));
        AppState {
            db,
            engine,
            cache: Arc::new(SearchCache::new(Duration::from_secs(30))),
            default_limit: 20,
            start_time: Instant::now(),
        }
    }

    async fn seed_observation(db: &Database, memory_id: &str, narrative: &str) {
        let obs = engram_core::Observation {
            id: 0,
            memory_id: memory_id.to_string(),
            session_id: "sess-1".to_string(),
            kind: ObservationKind::Learning,
            title: narrative.chars().take(40).collect(),
            subtitle: None,
            narrative: narrative.to_string(),
            facts: vec![],
            concepts: vec![],
            files_read: vec![],
            files_modified: vec![],
            project: "engram".to_string(),
            prompt_number: 1,
            created_at: "2026-08-01T00:00:00.000Z".to_string(),
            created_epoch: chrono::Utc::now().timestamp(),
            token_cost: 10,
            favorite: false,
        };
        observations::insert_observation(db, &obs).await.unwrap();
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_and_schema() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["schema_version"].as_i64().unwrap() >= 3);
    }

    #[tokio::test]
    async fn search_returns_ranked_hits() {
        let state = test_state().await;
        seed_observation(&state.db, "mem-1", "the retry queue uses linear backoff").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::get("/api/search?q=linear+backoff")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["results"][0]["memory_id"], "mem-1");
    }

    #[tokio::test]
    async fn search_kind_filter_excludes() {
        let state = test_state().await;
        seed_observation(&state.db, "mem-1", "the retry queue uses linear backoff").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::get("/api/search?q=linear+backoff&type=decision")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn export_rejects_unknown_format() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::get("/api/export?format=xml")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn export_csv_sets_content_type() {
        let state = test_state().await;
        seed_observation(&state.db, "mem-1", "exported fact").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::get("/api/export?format=csv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv"
        );
    }

    #[tokio::test]
    async fn stats_counts_everything() {
        let state = test_state().await;
        seed_observation(&state.db, "mem-1", "a counted fact").await;
        let app = router(state);

        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["sessions"], 1);
        assert_eq!(json["observations"], 1);
        assert_eq!(json["observations_by_kind"]["learning"], 1);
        assert!(json["store_size_bytes"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn timeline_filters_by_project() {
        let state = test_state().await;
        seed_observation(&state.db, "mem-1", "a recent fact").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::get("/api/timeline?project=other&days=7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 0);
    }
}
