// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Engram memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject
//! unrecognized keys at startup. Every field is optional with a stated
//! default; invalid values fail fast with a descriptive error rather
//! than silently falling back.

use serde::{Deserialize, Serialize};

/// Top-level Engram configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Request service bind address and logging.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Capture pipeline heuristics.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Retention and pruning policy.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Retrieval ranking weights and limits.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Context assembly budgets.
    #[serde(default)]
    pub context: ContextConfig,

    /// Summarization provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Query-result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Request service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind. Local-only by default.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    37777
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("engram").join("engram.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("engram.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Capture pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Minimum accepted extraction span length in characters.
    #[serde(default = "default_min_span_chars")]
    pub min_span_chars: usize,

    /// Maximum accepted extraction span length in characters.
    #[serde(default = "default_max_span_chars")]
    pub max_span_chars: usize,

    /// Observation count above which a session summary is generated.
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,

    /// Size of the in-memory working set loaded on session start.
    #[serde(default = "default_working_set_size")]
    pub working_set_size: usize,

    /// Allowed observation kinds. Writes with other kinds are rejected.
    #[serde(default = "default_allowed_kinds")]
    pub allowed_kinds: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_span_chars: default_min_span_chars(),
            max_span_chars: default_max_span_chars(),
            summary_threshold: default_summary_threshold(),
            working_set_size: default_working_set_size(),
            allowed_kinds: default_allowed_kinds(),
        }
    }
}

fn default_min_span_chars() -> usize {
    20
}

fn default_max_span_chars() -> usize {
    200
}

fn default_summary_threshold() -> usize {
    5
}

fn default_working_set_size() -> usize {
    50
}

fn default_allowed_kinds() -> Vec<String> {
    [
        "preference",
        "decision",
        "learning",
        "context",
        "discovery",
        "implementation",
        "issue",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Retention and pruning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Delete observations older than this many days. 0 disables.
    #[serde(default)]
    pub days: u32,

    /// Ceiling on total observation count. 0 disables.
    #[serde(default)]
    pub max_observations: u64,

    /// Seconds between background sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: 0,
            max_observations: 0,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

/// Retrieval ranking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Weight of full-text relevance in the merged score.
    #[serde(default = "default_w_text")]
    pub w_text: f64,

    /// Weight of semantic similarity in the merged score.
    /// Contributes nothing when no similarity backend is configured.
    #[serde(default = "default_w_similarity")]
    pub w_similarity: f64,

    /// Weight of recency decay in the merged score.
    #[serde(default = "default_w_recency")]
    pub w_recency: f64,

    /// Age in days at which recency decay halves.
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,

    /// Default result limit when a caller does not supply one.
    #[serde(default = "default_default_limit")]
    pub default_limit: usize,

    /// Candidate cap per search method before merging.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            w_text: default_w_text(),
            w_similarity: default_w_similarity(),
            w_recency: default_w_recency(),
            recency_half_life_days: default_recency_half_life_days(),
            default_limit: default_default_limit(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_w_text() -> f64 {
    0.7
}

fn default_w_similarity() -> f64 {
    0.2
}

fn default_w_recency() -> f64 {
    0.1
}

fn default_recency_half_life_days() -> f64 {
    30.0
}

fn default_default_limit() -> usize {
    20
}

fn default_max_candidates() -> usize {
    50
}

/// Context assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Maximum observations injected per context build.
    #[serde(default = "default_max_context_observations")]
    pub max_observations: usize,

    /// Token budget for one context block.
    #[serde(default = "default_max_context_tokens")]
    pub max_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_observations: default_max_context_observations(),
            max_tokens: default_max_context_tokens(),
        }
    }
}

fn default_max_context_observations() -> usize {
    10
}

fn default_max_context_tokens() -> usize {
    2000
}

/// Summarization provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Active provider: "anthropic" or "none".
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// API key for the provider. `None` requires an environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier for summarization calls.
    #[serde(default = "default_provider_model")]
    pub model: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts for one outbound call (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts; grows linearly with attempt number.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            model: default_provider_model(),
            timeout_secs: default_provider_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_provider_name() -> String {
    "none".to_string()
}

fn default_provider_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

/// Query-result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    30
}
