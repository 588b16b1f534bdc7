// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints serde attributes cannot express.
//! Collects every violation instead of failing fast on the first, so
//! a broken config is reported in one pass.

use engram_core::EngramError;

use crate::model::EngramConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns all collected violations as [`EngramError::Config`] values.
pub fn validate_config(config: &EngramConfig) -> Result<(), Vec<EngramError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(EngramError::Config(
            "server.host must not be empty".to_string(),
        ));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(EngramError::Config(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(EngramError::Config(
            "storage.database_path must not be empty".to_string(),
        ));
    }

    if config.capture.min_span_chars == 0 {
        errors.push(EngramError::Config(
            "capture.min_span_chars must be at least 1".to_string(),
        ));
    }
    if config.capture.min_span_chars >= config.capture.max_span_chars {
        errors.push(EngramError::Config(format!(
            "capture.min_span_chars ({}) must be less than capture.max_span_chars ({})",
            config.capture.min_span_chars, config.capture.max_span_chars
        )));
    }
    if config.capture.allowed_kinds.is_empty() {
        errors.push(EngramError::Config(
            "capture.allowed_kinds must not be empty".to_string(),
        ));
    }

    for (name, value) in [
        ("retrieval.w_text", config.retrieval.w_text),
        ("retrieval.w_similarity", config.retrieval.w_similarity),
        ("retrieval.w_recency", config.retrieval.w_recency),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(EngramError::Config(format!(
                "{name} must be within 0.0..=1.0, got {value}"
            )));
        }
    }
    if config.retrieval.recency_half_life_days <= 0.0 {
        errors.push(EngramError::Config(format!(
            "retrieval.recency_half_life_days must be positive, got {}",
            config.retrieval.recency_half_life_days
        )));
    }

    match config.provider.name.as_str() {
        "none" => {}
        "anthropic" => {
            if config.provider.api_key.is_none()
                && std::env::var("ANTHROPIC_API_KEY").is_err()
            {
                errors.push(EngramError::Config(
                    "provider.api_key (or ANTHROPIC_API_KEY) is required when provider.name = \"anthropic\""
                        .to_string(),
                ));
            }
        }
        other => {
            errors.push(EngramError::Config(format!(
                "provider.name must be \"anthropic\" or \"none\", got `{other}`"
            )));
        }
    }
    if config.provider.max_attempts == 0 {
        errors.push(EngramError::Config(
            "provider.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.cache.ttl_secs == 0 {
        errors.push(EngramError::Config(
            "cache.ttl_secs must be at least 1".to_string(),
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = EngramConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails() {
        let mut config = EngramConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.to_string().contains("database_path"))
        );
    }

    #[test]
    fn inverted_span_window_fails() {
        let mut config = EngramConfig::default();
        config.capture.min_span_chars = 300;
        config.capture.max_span_chars = 200;
        let errors = validate_config(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.to_string().contains("min_span_chars"))
        );
    }

    #[test]
    fn out_of_range_weight_fails() {
        let mut config = EngramConfig::default();
        config.retrieval.w_text = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("w_text")));
    }

    #[test]
    fn unknown_provider_fails() {
        let mut config = EngramConfig::default();
        config.provider.name = "openai".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.to_string().contains("provider.name"))
        );
    }

    #[test]
    fn anthropic_with_inline_key_passes() {
        let mut config = EngramConfig::default();
        config.provider.name = "anthropic".to_string();
        config.provider.api_key = Some("sk-test".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn multiple_violations_are_all_reported() {
        let mut config = EngramConfig::default();
        config.storage.database_path = "".to_string();
        config.cache.ttl_secs = 0;
        config.provider.max_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
