// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Engram memory engine.
//!
//! TOML configuration with strict parsing (`deny_unknown_fields`), XDG
//! file hierarchy lookup, `ENGRAM_*` environment overrides, and
//! collected fail-fast validation at startup.

pub mod loader;
pub mod model;
pub mod validation;

use engram_core::EngramError;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    CacheConfig, CaptureConfig, ContextConfig, EngramConfig, ProviderConfig, RetentionConfig,
    RetrievalConfig, ServerConfig, StorageConfig,
};

/// Load configuration from the XDG hierarchy and validate it.
///
/// The high-level entry point used by the binary: loads TOML + env via
/// Figment, then runs semantic validation. Any failure is returned as
/// structured [`EngramError::Config`] values; the process should exit
/// rather than run with a partially valid config.
pub fn load_and_validate() -> Result<EngramConfig, Vec<EngramError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(err
            .into_iter()
            .map(|e| EngramError::Config(e.to_string()))
            .collect()),
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<EngramConfig, Vec<EngramError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(err
            .into_iter()
            .map(|e| EngramError::Config(e.to_string()))
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_inline_config_loads_and_validates() {
        let config = load_and_validate_str(
            r#"
[server]
port = 38888

[capture]
summary_threshold = 8
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 38888);
        assert_eq!(config.capture.summary_threshold, 8);
    }

    #[test]
    fn parse_errors_become_config_errors() {
        let errors = load_and_validate_str("[server]\nport = \"not-a-number\"\n").unwrap_err();
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| e.kind() == "config"));
    }

    #[test]
    fn section_types_are_reachable_from_the_crate_root() {
        let _ = crate::CaptureConfig::default();
        let _ = crate::ContextConfig::default();
        let _ = crate::ProviderConfig::default();
        let _ = crate::RetentionConfig::default();
        let _ = crate::RetrievalConfig::default();
    }

    #[test]
    fn semantic_errors_become_config_errors() {
        let errors = load_and_validate_str("[cache]\nttl_secs = 0\n").unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("ttl_secs")));
    }
}
