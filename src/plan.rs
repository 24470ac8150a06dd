//! Goal-run data model: analysis, plan, step results, and verification.
//!
//! These records cross the model boundary, so deserialization is lenient:
//! missing fields default and numeric fields accept numbers or numeric
//! strings. Validation is strict where execution correctness depends on it
//! (step numbering and dependency direction).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, ErrorKind};

/// Structured reading of the goal produced by the analyze stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub goal_type: String,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub required_tools: Vec<String>,
    /// Criteria the verify stage checks. Empty means "verify has nothing to
    /// check" and must verify as an automatic pass with zero confidence.
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub estimated_steps: Option<u32>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub context_needed: Vec<String>,
}

/// Ordered tool-invocation plan produced by the plan stage.
///
/// # Invariants
///
/// After [`Plan::validate`] succeeds: step numbers are unique and 1-based,
/// and every dependency references a strictly smaller step number. The plan
/// is immutable once generated; per-step retry state lives in the executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Advisory only; the executor never runs steps concurrently.
    #[serde(default, deserialize_with = "lenient::u32_list")]
    pub parallel_execution: Vec<u32>,
    #[serde(default)]
    pub verification_points: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub resource_requirements: Vec<String>,
}

impl Plan {
    /// Check step numbering and dependency direction.
    ///
    /// # Errors
    ///
    /// `AgentError::Validation` on a duplicate or non-positive step number,
    /// or on a dependency referencing the step itself or a later step.
    /// Forward references are a plan-generation error and are never handed
    /// to the executor.
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.step_number == 0 {
                return Err(AgentError::Validation(
                    "step numbers are 1-based, found step 0".to_string(),
                ));
            }
            if !seen.insert(step.step_number) {
                return Err(AgentError::Validation(format!(
                    "duplicate step number {}",
                    step.step_number
                )));
            }
            for dep in &step.dependencies {
                if *dep >= step.step_number {
                    return Err(AgentError::Validation(format!(
                        "step {} depends on step {}, which does not precede it",
                        step.step_number, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Cap the plan at `max_steps`, dropping the tail. Applied at generation
    /// time so the stored plan never exceeds the active mode.
    pub fn truncate(&mut self, max_steps: usize) {
        if self.steps.len() > max_steps {
            tracing::debug!(
                "Truncating plan from {} to {} steps",
                self.steps.len(),
                max_steps
            );
            self.steps.truncate(max_steps);
        }
    }
}

/// One planned tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique, 1-based; referenced by dependents.
    #[serde(deserialize_with = "lenient::u32")]
    pub step_number: u32,
    #[serde(default)]
    pub action: String,
    /// Must name a registered tool (the direct-inference sentinel included).
    pub tool: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub expected_output: String,
    /// Step numbers that must have succeeded before this step may run.
    #[serde(default, deserialize_with = "lenient::u32_list")]
    pub dependencies: Vec<u32>,
}

/// Terminal outcome recorded for one step.
///
/// Exactly one StepResult per step_number reaches the verify stage; fallback
/// re-attempts replace the pending outcome rather than appending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: u32,
    pub action: String,
    /// For fallback failures this reports the original tool, not the last
    /// alternative tried.
    pub tool: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
}

impl StepResult {
    /// Successful execution through the registry.
    pub fn success(step: &Step, tool: &str, output: Value, execution_time_ms: u64) -> Self {
        Self {
            step_number: step.step_number,
            action: step.action.clone(),
            tool: tool.to_string(),
            success: true,
            output: Some(output),
            error: None,
            error_kind: None,
            execution_time_ms: Some(execution_time_ms),
            timestamp: Utc::now(),
            from_cache: false,
        }
    }

    /// Result synthesized from a cached output while offline.
    pub fn cached(step: &Step, output: Value) -> Self {
        Self {
            step_number: step.step_number,
            action: step.action.clone(),
            tool: step.tool.clone(),
            success: true,
            output: Some(output),
            error: None,
            error_kind: None,
            execution_time_ms: None,
            timestamp: Utc::now(),
            from_cache: true,
        }
    }

    /// Terminal failure after fallback exhaustion (or with none available).
    pub fn failure(step: &Step, original_tool: &str, error: String, kind: ErrorKind) -> Self {
        Self {
            step_number: step.step_number,
            action: step.action.clone(),
            tool: original_tool.to_string(),
            success: false,
            output: None,
            error: Some(error),
            error_kind: Some(kind),
            execution_time_ms: None,
            timestamp: Utc::now(),
            from_cache: false,
        }
    }
}

/// Verdict produced by the verify stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Verification {
    #[serde(default)]
    pub overall_success: bool,
    #[serde(default)]
    pub criteria_met: Vec<String>,
    #[serde(default)]
    pub criteria_failed: Vec<String>,
    /// 0..=100; clamped during parsing.
    #[serde(default, deserialize_with = "lenient::score")]
    pub quality_score: u32,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
}

impl Verification {
    /// Verdict for a run with no success criteria: pass, zero confidence.
    pub fn automatic_pass() -> Self {
        Self {
            overall_success: true,
            quality_score: 0,
            ..Self::default()
        }
    }
}

mod lenient {
    //! Deserializers tolerant of model output quirks (numbers as strings,
    //! floats where integers are expected, scalars where lists are expected).

    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number_from(value: &Value) -> Option<u32> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f.round().max(0.0) as u64))
                .and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        number_from(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {}", value)))
    }

    pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(number_from))
    }

    pub fn score<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(number_from).unwrap_or(0).min(100))
    }

    pub fn u32_list<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        match value {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.iter().filter_map(number_from).collect()),
            Some(other) => Ok(number_from(&other).into_iter().collect()),
        }
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }
}
