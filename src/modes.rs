//! Efficiency-mode catalog.
//!
//! A mode bundles the resource caps for one goal run: how many plan steps the
//! planner may emit, which model the stages prefer, how many verification
//! criteria to check, and how many tool calls the executor will spend. Modes
//! are loaded (builtin or from a YAML file) and only ever read by the core.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Mode assumed when a requested name is unknown.
pub const DEFAULT_MODE: &str = "middle";

/// Resource caps for one goal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMode {
    /// Upper bound on plan length; the planner prompt advertises it and the
    /// parsed plan is truncated to it.
    pub max_plan_steps: usize,
    /// Model the stages request; `auto` defers the choice to the rate table.
    pub preferred_model: String,
    /// Number of success criteria the verifier is asked to check.
    pub verification_count: u32,
    /// Upper bound on executed steps, applied as `min(steps, max_tool_calls)`.
    pub max_tool_calls: usize,
}

impl Default for EfficiencyMode {
    fn default() -> Self {
        Self {
            max_plan_steps: 10,
            preferred_model: "auto".to_string(),
            verification_count: 2,
            max_tool_calls: 7,
        }
    }
}

/// Named mode table. Read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeCatalog {
    modes: HashMap<String, EfficiencyMode>,
}

impl ModeCatalog {
    /// The compiled-in catalog: `efficiency_first`, `middle`, `best_results`.
    pub fn builtin() -> Self {
        let mut modes = HashMap::new();
        modes.insert(
            "efficiency_first".to_string(),
            EfficiencyMode {
                max_plan_steps: 5,
                preferred_model: "gemini-1.5-flash".to_string(),
                verification_count: 1,
                max_tool_calls: 3,
            },
        );
        modes.insert("middle".to_string(), EfficiencyMode::default());
        modes.insert(
            "best_results".to_string(),
            EfficiencyMode {
                max_plan_steps: 20,
                preferred_model: "gemini-pro".to_string(),
                verification_count: 3,
                max_tool_calls: 10,
            },
        );
        Self { modes }
    }

    /// Load a catalog from a YAML file mapping mode names to their caps.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading modes file {}", path.display()))?;
        let modes: HashMap<String, EfficiencyMode> = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing modes file {}", path.display()))?;
        tracing::info!("Loaded {} efficiency modes from {}", modes.len(), path.display());
        Ok(Self { modes })
    }

    pub fn get(&self, name: &str) -> Option<&EfficiencyMode> {
        self.modes.get(name)
    }

    /// Look up a mode, degrading to the default caps for unknown names.
    pub fn get_or_default(&self, name: &str) -> EfficiencyMode {
        if let Some(mode) = self.modes.get(name) {
            return mode.clone();
        }
        tracing::warn!("Unknown efficiency mode '{}', using '{}'", name, DEFAULT_MODE);
        self.modes
            .get(DEFAULT_MODE)
            .cloned()
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modes.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ModeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
