// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context assembly under a token budget.
//!
//! Takes ranked observations and greedily packs them, best first, into
//! a compact text block for injection into an assistant prompt. Both
//! the record ceiling and the token budget are hard limits; duplicate
//! narratives are skipped so the budget is never spent twice on the
//! same fact.

use engram_config::ContextConfig;
use engram_core::ScoredObservation;
use tracing::debug;

/// Rough token estimate: four characters per token.
///
/// Deliberately provider-agnostic; budgets are sized with slack so the
/// estimate only has to be stable, not exact.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// The assembled injection block.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// One line per included observation, best first.
    pub text: String,
    /// Observations included.
    pub included: usize,
    /// Token estimate for `text`.
    pub token_estimate: usize,
}

impl AssembledContext {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            included: 0,
            token_estimate: 0,
        }
    }
}

pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Pack ranked observations into the budget, best first.
    ///
    /// An observation whose line would overflow the remaining token
    /// budget is skipped, not truncated; later (cheaper) lines may
    /// still fit.
    pub fn build(&self, ranked: &[ScoredObservation]) -> AssembledContext {
        let mut lines: Vec<String> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        // Byte length of the final joined block, separators included, so
        // the budget check and the reported estimate never diverge.
        let mut block_len = 0usize;

        for scored in ranked {
            if lines.len() >= self.config.max_observations {
                break;
            }
            let obs = &scored.observation;
            let normalized = normalize(&obs.narrative);
            if seen.iter().any(|n| n == &normalized) {
                continue;
            }

            let line = format!("- [{}] {}: {}", obs.kind.as_str(), obs.title, obs.narrative);
            let candidate_len = block_len + line.len() + usize::from(!lines.is_empty());
            if candidate_len.div_ceil(4) > self.config.max_tokens {
                debug!(
                    memory_id = obs.memory_id,
                    line_bytes = line.len(),
                    "line over budget, skipped"
                );
                continue;
            }

            block_len = candidate_len;
            seen.push(normalized);
            lines.push(line);
        }

        if lines.is_empty() {
            return AssembledContext::empty();
        }
        let text = lines.join("\n");
        AssembledContext {
            included: lines.len(),
            token_estimate: estimate_tokens(&text),
            text,
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
