// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./engram.toml` > `~/.config/engram/engram.toml`
//! > `/etc/engram/engram.toml` with environment overrides via `ENGRAM_`.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::EngramConfig;

/// Load configuration from the standard XDG hierarchy with env overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/engram/engram.toml` (system-wide)
/// 3. `~/.config/engram/engram.toml` (user XDG config)
/// 4. `./engram.toml` (local directory)
/// 5. `ENGRAM_*` environment variables
pub fn load_config() -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file("/etc/engram/engram.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("engram/engram.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("engram.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider.
///
/// Uses explicit `map()` rather than `Env::split("_")` to avoid
/// ambiguity with underscore-containing key names: `ENGRAM_STORAGE_DATABASE_PATH`
/// must map to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("ENGRAM_").map(|key| {
        // Keys arrive in environment case (SERVER_PORT).
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("capture_", "capture.", 1)
            .replacen("retention_", "retention.", 1)
            .replacen("retrieval_", "retrieval.", 1)
            .replacen("context_", "context.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("cache_", "cache.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 37777);
        assert_eq!(config.capture.summary_threshold, 5);
        assert_eq!(config.capture.min_span_chars, 20);
        assert_eq!(config.capture.max_span_chars, 200);
        assert_eq!(config.retention.days, 0);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[server]
port = 40000

[retention]
days = 14
max_observations = 500
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 40000);
        assert_eq!(config.retention.days, 14);
        assert_eq!(config.retention.max_observations, 500);
        // Untouched sections keep defaults.
        assert_eq!(config.context.max_observations, 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
[server]
prot = 40000
"#,
        );
        assert!(result.is_err(), "typo'd key must fail, not silently pass");
    }

    #[test]
    #[serial_test::serial]
    fn env_vars_override_toml() {
        unsafe {
            std::env::set_var("ENGRAM_SERVER_PORT", "41111");
        }
        let config = Figment::new()
            .merge(Serialized::defaults(EngramConfig::default()))
            .merge(Toml::string("[server]\nport = 40000\n"))
            .merge(env_provider())
            .extract::<EngramConfig>()
            .unwrap();
        unsafe {
            std::env::remove_var("ENGRAM_SERVER_PORT");
        }
        assert_eq!(config.server.port, 41111);
    }

    #[test]
    #[serial_test::serial]
    fn env_mapping_preserves_underscored_keys() {
        unsafe {
            std::env::set_var("ENGRAM_STORAGE_DATABASE_PATH", "/tmp/engram-test.db");
        }
        let config = Figment::new()
            .merge(Serialized::defaults(EngramConfig::default()))
            .merge(env_provider())
            .extract::<EngramConfig>()
            .unwrap();
        unsafe {
            std::env::remove_var("ENGRAM_STORAGE_DATABASE_PATH");
        }
        assert_eq!(config.storage.database_path, "/tmp/engram-test.db");
    }
}
