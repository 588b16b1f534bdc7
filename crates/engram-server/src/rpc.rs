// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-delimited JSON-RPC 2.0 service over stdio.
//!
//! The assistant-facing surface: one request object per line on stdin,
//! one response per line on stdout. Notifications (no id) get no
//! response. The handler is a small state machine; every method except
//! `initialize` is rejected with -32002 until initialization, and
//! `shutdown` ends the loop after its response is written.

use std::sync::Arc;

use engram_capture::{CapturePipeline, new_memory_id};
use engram_core::{CaptureEvent, EngramError, Observation, ObservationKind};
use engram_retrieval::{ContextAssembler, RetrievalEngine, SearchRequest};
use engram_storage::Database;
use engram_storage::queries::{observations, sessions};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::cache::SearchCache;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const NOT_INITIALIZED: i64 = -32002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Serving,
    ShuttingDown,
}

pub struct RpcHandler {
    db: Database,
    engine: Arc<RetrievalEngine>,
    assembler: Arc<ContextAssembler>,
    pipeline: Arc<CapturePipeline>,
    cache: Arc<SearchCache>,
    allowed_kinds: Vec<String>,
    default_limit: usize,
    phase: Phase,
}

/// What the caller should do with the handler's output.
pub enum Outcome {
    /// Write this response line.
    Reply(String),
    /// Notification or unparseable id: write nothing.
    Silent,
    /// Write this response line, then stop reading.
    ReplyAndClose(String),
}

impl RpcHandler {
    pub fn new(
        db: Database,
        engine: Arc<RetrievalEngine>,
        assembler: Arc<ContextAssembler>,
        pipeline: Arc<CapturePipeline>,
        cache: Arc<SearchCache>,
        allowed_kinds: Vec<String>,
        default_limit: usize,
    ) -> Self {
        Self {
            db,
            engine,
            assembler,
            pipeline,
            cache,
            allowed_kinds,
            default_limit,
            phase: Phase::Uninitialized,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Process one request line.
    pub async fn handle_line(&mut self, line: &str) -> Outcome {
        let line = line.trim();
        if line.is_empty() {
            return Outcome::Silent;
        }

        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "unparseable request line");
                return Outcome::Reply(error_reply(Value::Null, PARSE_ERROR, "parse error"));
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        // Notifications get no response, well-formed or not.
        if id.is_null() {
            return Outcome::Silent;
        }

        if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Outcome::Reply(error_reply(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
        }
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_REQUEST, "missing method"));
        };
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        if self.phase == Phase::Uninitialized && method != "initialize" {
            return Outcome::Reply(error_reply(
                id,
                NOT_INITIALIZED,
                "server not initialized; call initialize first",
            ));
        }

        match method {
            "initialize" => {
                self.phase = Phase::Serving;
                info!("rpc session initialized");
                Outcome::Reply(result_reply(
                    id,
                    json!({
                        "serverInfo": {
                            "name": "engram",
                            "version": env!("CARGO_PKG_VERSION"),
                        }
                    }),
                ))
            }
            "shutdown" => {
                self.phase = Phase::ShuttingDown;
                info!("rpc shutdown requested");
                Outcome::ReplyAndClose(result_reply(id, Value::Null))
            }
            "recall_context" => self.recall_context(id, &params).await,
            "search_memories" => self.search_memories(id, &params).await,
            "save_memory" => self.save_memory(id, &params).await,
            "session_start" => self.session_start(id, &params).await,
            "record_event" => self.record_event(id, &params).await,
            "session_end" => self.session_end(id, &params).await,
            other => Outcome::Reply(error_reply(
                id,
                METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            )),
        }
    }

    async fn recall_context(&self, id: Value, params: &Value) -> Outcome {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let project = params
            .get("project")
            .and_then(Value::as_str)
            .map(str::to_string);

        let req = SearchRequest {
            query: query.to_string(),
            kinds: vec![],
            limit: self.default_limit,
            project,
        };
        match self.engine.search(&req).await {
            Ok(ranked) => {
                let ctx = self.assembler.build(&ranked);
                Outcome::Reply(result_reply(
                    id,
                    json!({
                        "context": ctx.text,
                        "included": ctx.included,
                        "token_estimate": ctx.token_estimate,
                    }),
                ))
            }
            Err(e) => Outcome::Reply(engine_error_reply(id, e)),
        }
    }

    async fn search_memories(&self, id: Value, params: &Value) -> Outcome {
        let Some(query) = params.get("query").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_PARAMS, "query is required"));
        };
        let limit = match params.get("limit") {
            None => self.default_limit,
            Some(v) => match v.as_u64() {
                Some(n) => n as usize,
                None => {
                    return Outcome::Reply(error_reply(
                        id,
                        INVALID_PARAMS,
                        "limit must be a non-negative integer",
                    ));
                }
            },
        };
        let kinds: Vec<ObservationKind> = params
            .get("type")
            .and_then(Value::as_str)
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ObservationKind::from_str_value)
                    .collect()
            })
            .unwrap_or_default();

        let req = SearchRequest {
            query: query.to_string(),
            kinds,
            limit,
            project: params
                .get("project")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        match self.engine.search(&req).await {
            Ok(ranked) => {
                let results: Vec<Value> = ranked
                    .iter()
                    .map(|s| {
                        json!({
                            "memory_id": s.observation.memory_id,
                            "kind": s.observation.kind.as_str(),
                            "title": s.observation.title,
                            "narrative": s.observation.narrative,
                            "project": s.observation.project,
                            "created_at": s.observation.created_at,
                            "score": s.score,
                        })
                    })
                    .collect();
                Outcome::Reply(result_reply(
                    id,
                    json!({ "count": results.len(), "results": results }),
                ))
            }
            Err(e) => Outcome::Reply(engine_error_reply(id, e)),
        }
    }

    async fn save_memory(&self, id: Value, params: &Value) -> Outcome {
        let Some(title) = params.get("title").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_PARAMS, "title is required"));
        };
        let Some(narrative) = params.get("narrative").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_PARAMS, "narrative is required"));
        };
        let project = params
            .get("project")
            .and_then(Value::as_str)
            .unwrap_or("default");
        let session_id = params
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or("manual");
        let kind_raw = params.get("kind").and_then(Value::as_str).unwrap_or("context");
        if !self.allowed_kinds.iter().any(|k| k == kind_raw) {
            return Outcome::Reply(error_reply(
                id,
                INVALID_PARAMS,
                format!("kind '{kind_raw}' is not allowed"),
            ));
        }

        let result: Result<String, EngramError> = async {
            sessions::open_session(&self.db, session_id, project).await?;
            let now = chrono::Utc::now();
            let obs = Observation {
                id: 0,
                memory_id: new_memory_id(),
                session_id: session_id.to_string(),
                kind: ObservationKind::from_str_value(kind_raw),
                title: title.to_string(),
                subtitle: None,
                narrative: narrative.to_string(),
                facts: vec![],
                concepts: vec![],
                files_read: vec![],
                files_modified: vec![],
                project: project.to_string(),
                prompt_number: 0,
                created_at: now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                created_epoch: now.timestamp(),
                token_cost: (narrative.len() / 4) as i64,
                favorite: false,
            };
            let memory_id = obs.memory_id.clone();
            observations::insert_observation(&self.db, &obs).await?;
            Ok(memory_id)
        }
        .await;

        match result {
            Ok(memory_id) => {
                self.cache.invalidate();
                Outcome::Reply(result_reply(id, json!({ "memory_id": memory_id })))
            }
            Err(e) => Outcome::Reply(engine_error_reply(id, e)),
        }
    }

    async fn session_start(&self, id: Value, params: &Value) -> Outcome {
        let Some(session_id) = params.get("session_id").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_PARAMS, "session_id is required"));
        };
        let project = params
            .get("project")
            .and_then(Value::as_str)
            .unwrap_or("default");

        match self.pipeline.on_session_start(session_id, project).await {
            Ok(session) => Outcome::Reply(result_reply(
                id,
                json!({
                    "session_id": session.session_id,
                    "project": session.project,
                    "prompt_count": session.prompt_count,
                }),
            )),
            Err(e) => Outcome::Reply(engine_error_reply(id, e)),
        }
    }

    async fn record_event(&self, id: Value, params: &Value) -> Outcome {
        let Some(session_id) = params.get("session_id").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_PARAMS, "session_id is required"));
        };
        let event = CaptureEvent {
            session_id: session_id.to_string(),
            project: params
                .get("project")
                .and_then(Value::as_str)
                .unwrap_or("default")
                .to_string(),
            input_text: params
                .get("input_text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            response_text: params
                .get("response_text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        match self.pipeline.on_event(&event).await {
            Ok(written) => {
                if !written.is_empty() {
                    self.cache.invalidate();
                }
                let memory_ids: Vec<&str> =
                    written.iter().map(|o| o.memory_id.as_str()).collect();
                Outcome::Reply(result_reply(
                    id,
                    json!({ "captured": written.len(), "memory_ids": memory_ids }),
                ))
            }
            Err(e) => Outcome::Reply(engine_error_reply(id, e)),
        }
    }

    async fn session_end(&self, id: Value, params: &Value) -> Outcome {
        let Some(session_id) = params.get("session_id").and_then(Value::as_str) else {
            return Outcome::Reply(error_reply(id, INVALID_PARAMS, "session_id is required"));
        };
        match self.pipeline.on_session_end(session_id).await {
            Ok(summary) => Outcome::Reply(result_reply(
                id,
                json!({ "summarized": summary.is_some() }),
            )),
            Err(e) => Outcome::Reply(engine_error_reply(id, e)),
        }
    }
}

fn result_reply(id: Value, result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

fn error_reply(id: Value, code: i64, message: impl Into<String>) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
    .to_string()
}

fn engine_error_reply(id: Value, e: EngramError) -> String {
    let code = match &e {
        EngramError::Validation(_) | EngramError::NotFound(_) => INVALID_PARAMS,
        _ => INTERNAL_ERROR,
    };
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": e.to_string(), "data": { "kind": e.kind() } }
    })
    .to_string()
}

/// Serve JSON-RPC over stdin/stdout until EOF or shutdown.
pub async fn run_stdio(mut handler: RpcHandler) -> Result<(), EngramError> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| EngramError::Internal(format!("stdin read failed: {e}")))?
    {
        match handler.handle_line(&line).await {
            Outcome::Silent => {}
            Outcome::Reply(reply) => write_line(&mut stdout, &reply).await?,
            Outcome::ReplyAndClose(reply) => {
                write_line(&mut stdout, &reply).await?;
                break;
            }
        }
    }
    info!("rpc loop finished");
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, reply: &str) -> Result<(), EngramError> {
    let io = async {
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    };
    io.await.map_err(|e| {
        warn!(error = %e, "stdout write failed");
        EngramError::Internal(format!("stdout write failed: {e}"))
    })
}
