// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engram serve` and `engram rpc` command implementations.
//!
//! Both commands wire the same stack: store, retrieval engine, context
//! assembler, cache, capture pipeline, and optional Anthropic provider.
//! `serve` exposes HTTP and runs the outbox and retention workers;
//! `rpc` speaks JSON-RPC over stdio for the assistant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use engram_capture::{AnthropicSummarizer, CapturePipeline, RegexExtractor};
use engram_config::EngramConfig;
use engram_core::{EngramError, SummaryProvider};
use engram_retrieval::{ContextAssembler, RetrievalEngine};
use engram_server::{AppState, OutboxWorker, RpcHandler, SearchCache, retention, rpc};
use engram_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct Stack {
    db: Database,
    engine: Arc<RetrievalEngine>,
    assembler: Arc<ContextAssembler>,
    cache: Arc<SearchCache>,
    provider: Option<Arc<dyn SummaryProvider>>,
}

async fn build_stack(config: &EngramConfig) -> Result<Stack, EngramError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    db.verify_shadow_index().await?;

    let provider: Option<Arc<dyn SummaryProvider>> = match config.provider.name.as_str() {
        "anthropic" => Some(Arc::new(AnthropicSummarizer::new(&config.provider)?)),
        _ => None,
    };
    if provider.is_none() {
        info!("no summary provider configured, session rollups disabled");
    }

    Ok(Stack {
        engine: Arc::new(RetrievalEngine::new(
            db.clone(),
            config.retrieval.clone(),
            None,
        )),
        assembler: Arc::new(ContextAssembler::new(config.context.clone())),
        cache: Arc::new(SearchCache::new(Duration::from_secs(config.cache.ttl_secs))),
        provider,
        db,
    })
}

/// Run the HTTP server with outbox and retention workers.
pub async fn run_serve(config: &EngramConfig) -> Result<(), EngramError> {
    let stack = build_stack(config).await?;
    let shutdown = CancellationToken::new();

    let outbox_worker = OutboxWorker::new(
        stack.db.clone(),
        stack.provider.clone(),
        Duration::from_secs(30),
        Duration::from_millis(config.provider.backoff_base_ms),
    );
    let outbox_task = tokio::spawn(outbox_worker.run(shutdown.clone()));

    let retention_task = tokio::spawn(retention::run_sweeper(
        stack.db.clone(),
        config.retention.clone(),
        shutdown.clone(),
    ));

    let state = AppState {
        db: stack.db.clone(),
        engine: stack.engine,
        cache: stack.cache,
        default_limit: config.retrieval.default_limit,
        start_time: Instant::now(),
    };

    let server = engram_server::start_server(&config.server.host, config.server.port, state);
    tokio::select! {
        result = server => {
            shutdown.cancel();
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    }

    if let Err(e) = outbox_task.await {
        warn!(error = %e, "outbox worker did not stop cleanly");
    }
    if let Err(e) = retention_task.await {
        warn!(error = %e, "retention sweeper did not stop cleanly");
    }
    stack.db.close().await?;
    Ok(())
}

/// Run the JSON-RPC stdio loop.
pub async fn run_rpc(config: &EngramConfig) -> Result<(), EngramError> {
    let stack = build_stack(config).await?;
    let extractor = Arc::new(RegexExtractor::new(&config.capture)?);
    let pipeline = Arc::new(CapturePipeline::new(
        stack.db.clone(),
        config.capture.clone(),
        extractor,
        stack.provider.clone(),
    ));
    let handler = RpcHandler::new(
        stack.db.clone(),
        stack.engine,
        stack.assembler,
        pipeline,
        stack.cache,
        config.capture.allowed_kinds.clone(),
        config.retrieval.default_limit,
    );
    rpc::run_stdio(handler).await?;
    stack.db.close().await?;
    Ok(())
}
