// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Export renderers: JSON, CSV, and Markdown.

use std::fmt::Write as _;

use engram_core::{EngramError, Observation};
use serde::Serialize;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Markdown => "text/markdown",
        }
    }
}

pub fn render(format: ExportFormat, rows: &[Observation]) -> Result<String, EngramError> {
    match format {
        ExportFormat::Json => render_json(rows),
        ExportFormat::Csv => render_csv(rows),
        ExportFormat::Markdown => Ok(render_markdown(rows)),
    }
}

fn render_json(rows: &[Observation]) -> Result<String, EngramError> {
    serde_json::to_string_pretty(rows)
        .map_err(|e| EngramError::Internal(format!("serialize export: {e}")))
}

#[derive(Serialize)]
struct CsvRow<'a> {
    memory_id: &'a str,
    session_id: &'a str,
    kind: &'a str,
    title: &'a str,
    narrative: &'a str,
    project: &'a str,
    created_at: &'a str,
    favorite: bool,
}

fn render_csv(rows: &[Observation]) -> Result<String, EngramError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for obs in rows {
        writer
            .serialize(CsvRow {
                memory_id: &obs.memory_id,
                session_id: &obs.session_id,
                kind: obs.kind.as_str(),
                title: &obs.title,
                narrative: &obs.narrative,
                project: &obs.project,
                created_at: &obs.created_at,
                favorite: obs.favorite,
            })
            .map_err(|e| EngramError::Internal(format!("write csv row: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| EngramError::Internal(format!("flush csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| EngramError::Internal(format!("csv is not utf-8: {e}")))
}

fn render_markdown(rows: &[Observation]) -> String {
    let mut out = String::from("# Engram export\n");
    let mut current_project: Option<&str> = None;
    for obs in rows {
        if current_project != Some(obs.project.as_str()) {
            current_project = Some(obs.project.as_str());
            let _ = writeln!(out, "\n## {}\n", obs.project);
        }
        let _ = writeln!(
            out,
            "- **{}** `{}` ({}): {}",
            obs.title,
            obs.kind.as_str(),
            obs.created_at,
            obs.narrative
        );
    }
    out
}
