// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engram status` command implementation.
//!
//! Queries the health and stats endpoints of a running server and
//! prints a short report. Falls back gracefully when the server is not
//! running.

use std::time::Duration;

use engram_config::EngramConfig;
use engram_core::EngramError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    schema_version: i64,
    uptime_secs: u64,
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub async fn run_status(config: &EngramConfig, json: bool) -> Result<(), EngramError> {
    let host = &config.server.host;
    let port = config.server.port;
    let base = format!("http://{host}:{port}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| EngramError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(format!("{base}/health")).send().await {
        Ok(resp) if resp.status().is_success() => {
            resp.json::<HealthResponse>().await.map_err(|e| {
                EngramError::Internal(format!("failed to parse health response: {e}"))
            })?
        }
        Ok(resp) => {
            println!("engram server at {base} is unhealthy (HTTP {})", resp.status());
            return Ok(());
        }
        Err(_) => {
            println!("engram server is not running at {base}");
            return Ok(());
        }
    };

    let stats: serde_json::Value = client
        .get(format!("{base}/api/stats"))
        .send()
        .await
        .map_err(|e| EngramError::Internal(format!("stats request failed: {e}")))?
        .json()
        .await
        .map_err(|e| EngramError::Internal(format!("failed to parse stats response: {e}")))?;

    if json {
        let out = serde_json::json!({
            "status": health.status,
            "version": health.version,
            "schema_version": health.schema_version,
            "uptime_secs": health.uptime_secs,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)
            .map_err(|e| EngramError::Internal(format!("serialize status: {e}")))?);
        return Ok(());
    }

    println!("engram {} at {base}", health.version);
    println!("  status:         {}", health.status);
    println!("  uptime:         {}", format_uptime(health.uptime_secs));
    println!("  schema version: {}", health.schema_version);
    println!("  sessions:       {}", stats["sessions"]);
    println!("  observations:   {}", stats["observations"]);
    println!("  summaries:      {}", stats["summaries"]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3_660), "1h 1m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
    }
}
