//! Session usage accounting.
//!
//! Tokens are estimated, not provider-reported, so the numbers here are a
//! budget gauge rather than a bill. Cost accrues at the rate of whatever
//! model the active efficiency mode prefers at the moment of recording.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::modes::ModeCatalog;
use crate::pricing::{self, CostBreakdown};
use crate::settings::SharedSettingsStore;
use crate::trace::{emit_usage, UsageSink, UsageUpdate};

/// Running totals for the current session.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    pub tokens_used: u64,
    pub tool_calls: u64,
    /// Display cost, rounded to two decimals.
    pub estimated_cost: f64,
    pub sessions_count: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    tokens_used: u64,
    tool_calls: u64,
    cost: f64,
    sessions_count: u64,
}

impl SessionState {
    fn update(&self) -> UsageUpdate {
        UsageUpdate {
            tokens: self.tokens_used,
            cost: pricing::round2(self.cost),
            tool_calls: self.tool_calls,
        }
    }
}

/// Accumulates tokens, tool calls, and estimated cost for the active session.
/// Every mutation pushes the new totals through the usage sink.
pub struct UsageAccountant {
    settings: SharedSettingsStore,
    modes: Arc<ModeCatalog>,
    sink: Arc<dyn UsageSink>,
    state: RwLock<SessionState>,
}

impl UsageAccountant {
    pub fn new(
        settings: SharedSettingsStore,
        modes: Arc<ModeCatalog>,
        sink: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            settings,
            modes,
            sink,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Model the active mode prefers right now. Cost attribution follows mode
    /// switches mid-session; already-accrued cost is never restated.
    async fn active_model(&self) -> String {
        let mode_name = self.settings.get().await.efficiency_mode;
        self.modes.get_or_default(&mode_name).preferred_model
    }

    /// Add estimated tokens, costed at the active model's per-1k rate.
    pub async fn record_tokens(&self, tokens: u64) {
        let model = self.active_model().await;
        let mut state = self.state.write().await;
        state.tokens_used += tokens;
        state.cost += pricing::cost_for_tokens(tokens, &model);
        let update = state.update();
        drop(state);

        tracing::debug!(tokens, model = %model, "Recorded token usage");
        emit_usage(&self.sink, update).await;
    }

    /// Count one tool invocation.
    pub async fn record_tool_call(&self) {
        let mut state = self.state.write().await;
        state.tool_calls += 1;
        let update = state.update();
        drop(state);

        emit_usage(&self.sink, update).await;
    }

    /// Point-in-time counters with display rounding applied.
    pub async fn snapshot(&self) -> SessionStats {
        let state = self.state.read().await;
        SessionStats {
            tokens_used: state.tokens_used,
            tool_calls: state.tool_calls,
            estimated_cost: pricing::round2(state.cost),
            sessions_count: state.sessions_count,
        }
    }

    /// Cost summary keyed by the active mode's resolved model.
    pub async fn cost_breakdown(&self) -> CostBreakdown {
        let model = self.active_model().await;
        let state = self.state.read().await;
        CostBreakdown::for_session(&model, state.tokens_used)
    }

    /// Zero the running counters and open a new session.
    pub async fn reset_session(&self) {
        let mut state = self.state.write().await;
        state.tokens_used = 0;
        state.tool_calls = 0;
        state.cost = 0.0;
        state.sessions_count += 1;
        let update = state.update();
        drop(state);

        tracing::debug!("Session usage reset");
        emit_usage(&self.sink, update).await;
    }
}
