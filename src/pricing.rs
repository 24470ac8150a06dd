//! Model rate table and cost derivation.
//!
//! Rates are "per 1000 estimated tokens" in display cost units. Unknown
//! models never fail a lookup; they degrade to the fallback rate so
//! accounting keeps working when a mode names a model this table has not
//! caught up with.

use serde::{Deserialize, Serialize};

/// Rate applied when a model is missing from the table.
pub const DEFAULT_RATE_PER_1K: f64 = 0.5;

/// Alias a mode may use to defer model choice.
pub const AUTO_ALIAS: &str = "auto";

/// Concrete model the `auto` alias resolves to for cost reporting.
pub const AUTO_RESOLVED_MODEL: &str = "gemini-1.5-flash";

/// Display currency label for cost breakdowns.
pub const CURRENCY: &str = "JPY";

/// Per-1k-token rate for a known model.
pub fn rate_per_1k(model: &str) -> Option<f64> {
    let rate = match model {
        "gemini-2.0-flash-001" => 0.25,
        "gemini-2.5-flash-preview-05-20" => 0.30,
        "gemini-2.5-pro-preview-05-06" => 0.75,
        "gemini-2.0-flash-lite-001" => 0.15,
        "gemma-3-27b-it" => 0.40,
        "gemma-3n-e4b-it" => 0.20,
        "gemini-pro" => 0.50,
        "gemini-1.5-flash" => 0.25,
        "gemini-1.5-pro" => 0.75,
        _ => return None,
    };
    Some(rate)
}

/// Rate for a model, degrading to [`DEFAULT_RATE_PER_1K`] when unknown.
pub fn rate_or_default(model: &str) -> f64 {
    match rate_per_1k(model) {
        Some(rate) => rate,
        None => {
            tracing::debug!("No rate for model '{}', using default", model);
            DEFAULT_RATE_PER_1K
        }
    }
}

/// Resolve the `auto` alias to a concrete model identifier.
pub fn resolve_alias(model: &str) -> &str {
    if model == AUTO_ALIAS {
        AUTO_RESOLVED_MODEL
    } else {
        model
    }
}

/// Cost of `tokens` at the model's rate.
pub fn cost_for_tokens(tokens: u64, model: &str) -> f64 {
    (tokens as f64 / 1000.0) * rate_or_default(model)
}

/// Round to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rough token estimate for a prompt or response body.
pub fn estimate_tokens(text: &str) -> u64 {
    // ceil(len / 1.5)
    (text.len() as u64 * 2).div_ceil(3)
}

/// Session cost summary keyed by the resolved model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub model: String,
    pub tokens_used: u64,
    pub rate_per_1k: f64,
    pub estimated_cost: f64,
    pub currency: String,
}

impl CostBreakdown {
    /// Breakdown for a session total, resolving the `auto` alias before the
    /// rate lookup.
    pub fn for_session(preferred_model: &str, tokens_used: u64) -> Self {
        let model = resolve_alias(preferred_model);
        let rate = rate_or_default(model);
        Self {
            model: model.to_string(),
            tokens_used,
            rate_per_1k: rate,
            estimated_cost: round2((tokens_used as f64 / 1000.0) * rate),
            currency: CURRENCY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_rates() {
        assert_eq!(rate_per_1k("gemini-1.5-flash"), Some(0.25));
        assert_eq!(rate_per_1k("gemini-pro"), Some(0.50));
        assert_eq!(rate_per_1k("gemini-2.5-pro-preview-05-06"), Some(0.75));
        assert_eq!(rate_per_1k("made-up-model"), None);
    }

    #[test]
    fn test_unknown_model_degrades_to_default() {
        assert_eq!(rate_or_default("made-up-model"), DEFAULT_RATE_PER_1K);
        let cost = cost_for_tokens(2000, "made-up-model");
        assert!((cost - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_auto_alias_resolution() {
        assert_eq!(resolve_alias("auto"), "gemini-1.5-flash");
        assert_eq!(resolve_alias("gemini-pro"), "gemini-pro");

        let breakdown = CostBreakdown::for_session("auto", 4000);
        assert_eq!(breakdown.model, "gemini-1.5-flash");
        assert!((breakdown.rate_per_1k - 0.25).abs() < f64::EPSILON);
        assert!((breakdown.estimated_cost - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rounding_for_display() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(1.0 / 3.0), 0.33);
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 2);
        assert_eq!(estimate_tokens("abcd"), 3);
    }
}
