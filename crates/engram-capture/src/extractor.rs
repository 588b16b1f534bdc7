// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Regex-based observation extraction.
//!
//! Preference triggers run over the user's input text; decision
//! triggers run over the assistant's response. Each match is widened to
//! the end of its sentence, then length-gated: only spans inside the
//! configured [min, max] character window are kept. Too short is noise,
//! too long is an unfocused run-on not worth storing.

use engram_config::CaptureConfig;
use engram_core::{CaptureEvent, EngramError, ExtractedObservation, Extractor, ObservationKind};
use regex::Regex;
use tracing::debug;

const PREFERENCE_PATTERN: &str = r"(?i)\b(I prefer|I like|I always|I never)\b";
const DECISION_PATTERN: &str = r"(?i)\b(I'll|Let's|We should)\b";

const TITLE_MAX_CHARS: usize = 80;

/// Deterministic extractor backed by trigger-phrase regexes.
pub struct RegexExtractor {
    preference: Regex,
    decision: Regex,
    min_span_chars: usize,
    max_span_chars: usize,
}

impl RegexExtractor {
    pub fn new(config: &CaptureConfig) -> Result<Self, EngramError> {
        let preference = Regex::new(PREFERENCE_PATTERN)
            .map_err(|e| EngramError::Internal(format!("preference pattern: {e}")))?;
        let decision = Regex::new(DECISION_PATTERN)
            .map_err(|e| EngramError::Internal(format!("decision pattern: {e}")))?;
        Ok(Self {
            preference,
            decision,
            min_span_chars: config.min_span_chars,
            max_span_chars: config.max_span_chars,
        })
    }

    fn scan(&self, text: &str, pattern: &Regex, kind: ObservationKind) -> Vec<ExtractedObservation> {
        let mut out = Vec::new();
        let mut scanned_to = 0;
        for m in pattern.find_iter(text) {
            // Skip matches inside a span already emitted.
            if m.start() < scanned_to {
                continue;
            }
            let span = sentence_from(text, m.start());
            scanned_to = m.start() + span.len();

            let span = span.trim();
            let char_count = span.chars().count();
            if char_count < self.min_span_chars || char_count > self.max_span_chars {
                debug!(
                    kind = kind.as_str(),
                    chars = char_count,
                    "span outside acceptance window, dropped"
                );
                continue;
            }
            out.push(ExtractedObservation {
                kind: kind.clone(),
                title: derive_title(span),
                narrative: span.to_string(),
            });
        }
        out
    }
}

impl Extractor for RegexExtractor {
    fn name(&self) -> &str {
        "regex"
    }

    fn extract(&self, event: &CaptureEvent) -> Vec<ExtractedObservation> {
        let mut out = self.scan(&event.input_text, &self.preference, ObservationKind::Preference);
        out.extend(self.scan(&event.response_text, &self.decision, ObservationKind::Decision));
        out
    }
}

/// The sentence starting at `start`: runs to the first terminator at or
/// after it, or to the end of the text.
fn sentence_from(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    match rest.find(['.', '!', '?', '\n']) {
        Some(end) => {
            // Include the terminator unless it is a newline.
            let terminator = rest[end..].chars().next().map(char::len_utf8).unwrap_or(0);
            if rest[end..].starts_with('\n') {
                &rest[..end]
            } else {
                &rest[..end + terminator]
            }
        }
        None => rest,
    }
}

/// Cut `s` to at most `max_chars` characters, retreating to the last
/// word boundary when a cut lands mid-word.
fn clip_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => cut[..pos].trim_end().to_string(),
        _ => cut,
    }
}

fn derive_title(span: &str) -> String {
    let title = clip_chars(span, TITLE_MAX_CHARS);
    title.trim_end_matches(['.', '!', '?']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> RegexExtractor {
        RegexExtractor::new(&CaptureConfig::default()).unwrap()
    }

    fn event(input: &str, response: &str) -> CaptureEvent {
        CaptureEvent {
            session_id: "sess-1".to_string(),
            project: "engram".to_string(),
            input_text: input.to_string(),
            response_text: response.to_string(),
        }
    }

    #[test]
    fn captures_preference_from_input() {
        let got = extractor().extract(&event("I prefer tabs over spaces", ""));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, ObservationKind::Preference);
        assert_eq!(got[0].narrative, "I prefer tabs over spaces");
    }

    #[test]
    fn short_decision_is_dropped() {
        let got = extractor().extract(&event("", "I'll do it."));
        assert!(got.is_empty(), "11-char span is below the 20-char minimum");
    }

    #[test]
    fn long_decision_is_captured() {
        let response = "I'll store the JWT signing key in the vault and rotate it \
                        every ninety days as part of the release checklist.";
        let got = extractor().extract(&event("", response));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, ObservationKind::Decision);
        assert!(got[0].narrative.starts_with("I'll store the JWT"));
    }

    #[test]
    fn trigger_matching_is_case_insensitive() {
        let got = extractor().extract(&event("i always run clippy before pushing", ""));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, ObservationKind::Preference);
    }

    #[test]
    fn span_stops_at_sentence_end() {
        let input = "I like small focused commits. The second sentence is unrelated.";
        let got = extractor().extract(&event(input, ""));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].narrative, "I like small focused commits.");
    }

    #[test]
    fn span_stops_at_newline() {
        let input = "I never force-push to shared branches\nUnrelated second line";
        let got = extractor().extract(&event(input, ""));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].narrative, "I never force-push to shared branches");
    }

    #[test]
    fn over_window_span_is_rejected() {
        // A 300-char unterminated run-on must yield nothing, not a
        // truncated observation.
        let filler = "word ".repeat(59);
        let response = format!("I'll {filler}");
        assert!(response.chars().count() >= 300);
        let got = extractor().extract(&event("", &response));
        assert!(got.is_empty(), "over-window span must be dropped");
    }

    #[test]
    fn span_at_window_edges_is_kept() {
        // Exactly max_span_chars (200) is still inside the window.
        let narrative = format!("I prefer {}", "x".repeat(191));
        assert_eq!(narrative.chars().count(), 200);
        let got = extractor().extract(&event(&narrative, ""));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].narrative.chars().count(), 200);
    }

    #[test]
    fn multiple_triggers_yield_multiple_candidates() {
        let input = "I prefer explicit error types everywhere. I always gate writes behind validation.";
        let got = extractor().extract(&event(input, ""));
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn unmatched_text_yields_nothing() {
        let got = extractor().extract(&event("please refactor the parser", "done, see the diff"));
        assert!(got.is_empty());
    }

    #[test]
    fn title_is_clipped_and_unterminated() {
        let got = extractor().extract(&event("I prefer tabs over spaces.", ""));
        assert_eq!(got[0].title, "I prefer tabs over spaces");
    }
}
