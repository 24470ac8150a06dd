//! Plan execution engine.
//!
//! Steps run strictly in declared order, one at a time. Failure handling is
//! layered: a dependency gate before every attempt, offline cache
//! substitution, alternative-tool fallback, and a total-failure abort policy
//! on top.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::cache::{tool_cache_key, CacheStore};
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{AgentError, ErrorKind};
use crate::plan::{Plan, Step, StepResult};
use crate::registry::{ToolContext, ToolRegistry};
use crate::trace::{emit_trace, TraceEvent, TraceStatus};
use crate::usage::UsageAccountant;

/// Tunables for one executor instance.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// Tools whose output may be memoized by (name, parameters) and served
    /// from cache while offline.
    pub cacheable: HashSet<String>,
    /// Fallback map keyed by a step's original tool name.
    pub alternatives: HashMap<String, Vec<String>>,
    /// Total failed steps tolerated before the run stops.
    pub max_failures: u32,
    /// Pacing delay after each successful step.
    pub step_delay: Duration,
    /// TTL for tool results written to the cache.
    pub cache_ttl_minutes: i64,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        let cacheable = [
            "searchWeb",
            "quickLookup",
            "trendAnalyzer",
            "citationBuilder",
            "chartBuilder",
            "correlationAnalyzer",
            "timeSeriesForecaster",
            "codeExplainer",
            "regexBuilder",
            "taskPlanner",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut alternatives: HashMap<String, Vec<String>> = HashMap::new();
        alternatives.insert("searchWeb".to_string(), vec!["quickLookup".to_string()]);
        alternatives.insert("trendAnalyzer".to_string(), Vec::new());
        alternatives.insert(
            "generateImage".to_string(),
            vec![
                "generateImageSDXL".to_string(),
                "generateImageDallE".to_string(),
            ],
        );

        Self {
            cacheable,
            alternatives,
            max_failures: 3,
            step_delay: Duration::from_millis(500),
            cache_ttl_minutes: 24 * 60,
        }
    }
}

impl ExecutionPolicy {
    /// Default tool lists with the limits taken from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_failures: config.max_failures,
            step_delay: Duration::from_millis(config.step_delay_ms),
            cache_ttl_minutes: config.tool_cache_ttl_minutes,
            ..Self::default()
        }
    }

    pub fn is_cacheable(&self, tool: &str) -> bool {
        self.cacheable.contains(tool)
    }

    /// Next alternative for the step's original tool that has not been tried.
    fn untried_alternative(&self, original: &str, attempted: &HashSet<String>) -> Option<String> {
        self.alternatives
            .get(original)?
            .iter()
            .find(|alt| !attempted.contains(*alt))
            .cloned()
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }
}

/// Outcome of one tool attempt inside a step.
enum Attempt {
    Done(StepResult),
    Failed { message: String, kind: ErrorKind },
}

/// Sequential step runner.
///
/// # Invariants
///
/// - A step never has any tool invoked for it, original or substitute,
///   unless all of its dependencies already have a successful result.
/// - The returned list holds at most one result per step number; fallback
///   re-attempts replace the pending outcome rather than appending.
/// - The plan itself is never mutated; per-step retry state (which tools
///   were already tried) lives in a side table owned by the run.
pub struct PlanExecutor {
    registry: Arc<ToolRegistry>,
    cache: Arc<CacheStore>,
    connectivity: Arc<ConnectivityMonitor>,
    accountant: Arc<UsageAccountant>,
    policy: ExecutionPolicy,
}

impl PlanExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        cache: Arc<CacheStore>,
        connectivity: Arc<ConnectivityMonitor>,
        accountant: Arc<UsageAccountant>,
        policy: ExecutionPolicy,
    ) -> Self {
        Self {
            registry,
            cache,
            connectivity,
            accountant,
            policy,
        }
    }

    /// Run the plan's steps in order, bounded by `max_tool_calls`.
    ///
    /// Individual tool failures never error out of this method; they become
    /// failed [`StepResult`] entries, and hitting the failure threshold only
    /// stops the loop early so the caller still receives the partial results.
    ///
    /// # Errors
    ///
    /// `AgentError::Critical` when a step fails critically (for example on
    /// revoked credentials). The run stops at that step and the error
    /// carries its message.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        max_tool_calls: usize,
        ctx: &ToolContext,
    ) -> Result<Vec<StepResult>, AgentError> {
        let bound = plan.steps.len().min(max_tool_calls);
        if plan.steps.len() > bound {
            tracing::debug!(
                "Plan has {} steps, cap allows {}; tail is skipped",
                plan.steps.len(),
                bound
            );
        }

        let mut results: Vec<StepResult> = Vec::with_capacity(bound);
        let mut attempted: HashMap<u32, HashSet<String>> = HashMap::new();
        let mut failures: u32 = 0;

        for step in &plan.steps[..bound] {
            emit_trace(
                &ctx.trace,
                TraceEvent::new(
                    format!("Step {}: {}", step.step_number, step.action),
                    step.tool.clone(),
                    TraceStatus::Active,
                )
                .with_metadata(json!({ "step": step.step_number })),
            )
            .await;

            let step_attempts = attempted.entry(step.step_number).or_default();
            let terminal = self
                .run_step(step, step_attempts, failures, &results, ctx)
                .await?;

            if terminal.success {
                emit_trace(
                    &ctx.trace,
                    TraceEvent::new(
                        format!("Step {} completed", step.step_number),
                        terminal.tool.clone(),
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({
                        "step": step.step_number,
                        "from_cache": terminal.from_cache,
                    })),
                )
                .await;
            } else {
                failures += 1;
                emit_trace(
                    &ctx.trace,
                    TraceEvent::new(
                        format!(
                            "Step {} failed: {}",
                            step.step_number,
                            terminal.error.as_deref().unwrap_or("unknown error")
                        ),
                        terminal.tool.clone(),
                        TraceStatus::Error,
                    )
                    .with_metadata(json!({ "step": step.step_number })),
                )
                .await;
            }

            let succeeded = terminal.success;
            results.push(terminal);

            if failures >= self.policy.max_failures {
                tracing::warn!("Stopping plan execution after {} failed steps", failures);
                emit_trace(
                    &ctx.trace,
                    TraceEvent::new(
                        format!("Stopping execution after {} failures", failures),
                        "executor",
                        TraceStatus::Error,
                    ),
                )
                .await;
                break;
            }

            if succeeded && !self.policy.step_delay.is_zero() {
                tokio::time::sleep(self.policy.step_delay).await;
            }
        }

        Ok(results)
    }

    /// Drive one step to its terminal result, cycling through alternatives
    /// on recoverable failures. Every attempt, including a substituted one,
    /// passes the dependency gate first.
    async fn run_step(
        &self,
        step: &Step,
        step_attempts: &mut HashSet<String>,
        recorded_failures: u32,
        results: &[StepResult],
        ctx: &ToolContext,
    ) -> Result<StepResult, AgentError> {
        let original_tool = step.tool.as_str();
        let mut current_tool = original_tool.to_string();

        loop {
            step_attempts.insert(current_tool.clone());

            let outcome = match self.unmet_dependency(step, results) {
                Some(missing) => {
                    tracing::debug!(
                        "Step {} blocked: dependency {} has no successful result",
                        step.step_number,
                        missing
                    );
                    Attempt::Failed {
                        message: format!(
                            "dependencies not met: step {} requires step {}",
                            step.step_number, missing
                        ),
                        kind: ErrorKind::Tool,
                    }
                }
                None => self.attempt_tool(step, &current_tool, ctx).await,
            };

            let (message, kind) = match outcome {
                Attempt::Done(result) => return Ok(result),
                Attempt::Failed { message, kind } => (message, kind),
            };

            if kind == ErrorKind::Critical {
                tracing::error!(
                    "Step {} failed critically with '{}': {}",
                    step.step_number,
                    current_tool,
                    message
                );
                return Err(AgentError::Critical(message));
            }

            // One more terminal failure would hit the threshold, so an
            // alternative attempt would be wasted.
            if recorded_failures + 1 >= self.policy.max_failures {
                return Ok(StepResult::failure(step, original_tool, message, kind));
            }

            if kind.is_recoverable() {
                if let Some(alternative) =
                    self.policy.untried_alternative(original_tool, step_attempts)
                {
                    tracing::info!(
                        "Step {}: falling back from '{}' to '{}'",
                        step.step_number,
                        current_tool,
                        alternative
                    );
                    emit_trace(
                        &ctx.trace,
                        TraceEvent::new(
                            format!("Falling back to '{}'", alternative),
                            original_tool.to_string(),
                            TraceStatus::Active,
                        )
                        .with_metadata(json!({ "step": step.step_number })),
                    )
                    .await;
                    current_tool = alternative;
                    continue;
                }
            }

            return Ok(StepResult::failure(step, original_tool, message, kind));
        }
    }

    fn unmet_dependency(&self, step: &Step, results: &[StepResult]) -> Option<u32> {
        step.dependencies
            .iter()
            .copied()
            .find(|dep| !results.iter().any(|r| r.step_number == *dep && r.success))
    }

    /// One tool attempt: offline substitution, then registry execution with
    /// write-through caching for allowlisted tools.
    async fn attempt_tool(&self, step: &Step, tool_name: &str, ctx: &ToolContext) -> Attempt {
        let parameters = Value::Object(step.parameters.clone());

        if self.connectivity.is_offline() {
            if self.policy.is_cacheable(tool_name) {
                let key = tool_cache_key(tool_name, &parameters);
                if let Some(output) = self.cache.get(&key).await {
                    tracing::debug!("Serving '{}' from cache while offline", tool_name);
                    return Attempt::Done(StepResult::cached(step, output));
                }
                return Attempt::Failed {
                    message: format!("offline and no cached result for '{}'", tool_name),
                    kind: ErrorKind::Connectivity,
                };
            }
            if self.registry.requires_network(tool_name).await {
                return Attempt::Failed {
                    message: format!("'{}' requires connectivity", tool_name),
                    kind: ErrorKind::Connectivity,
                };
            }
            // Local tools keep working offline.
        }

        self.accountant.record_tool_call().await;
        let execution = self.registry.execute(tool_name, &parameters, ctx).await;

        if execution.success {
            let output = execution.data.unwrap_or(Value::Null);
            if self.policy.is_cacheable(tool_name) {
                let key = tool_cache_key(tool_name, &parameters);
                self.cache
                    .set(&key, output.clone(), self.policy.cache_ttl_minutes)
                    .await;
            }
            Attempt::Done(StepResult::success(
                step,
                tool_name,
                output,
                execution.metadata.execution_time_ms,
            ))
        } else {
            Attempt::Failed {
                message: execution
                    .error
                    .unwrap_or_else(|| "tool failed without a message".to_string()),
                kind: execution.error_kind.unwrap_or(ErrorKind::Tool),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeCatalog;
    use crate::registry::{Tool, ToolCategory, ToolRegistration, ToolSpec};
    use crate::settings::SettingsStore;
    use crate::trace::LogUsage;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Succeeds {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Succeeds {
        async fn execute(&self, _parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "ok": true, "invocation": n }))
        }
    }

    struct Fails {
        error: fn() -> anyhow::Error,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Fails {
        async fn execute(&self, _parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    struct Harness {
        executor: PlanExecutor,
        registry: Arc<ToolRegistry>,
        cache: Arc<CacheStore>,
        connectivity: Arc<ConnectivityMonitor>,
        accountant: Arc<UsageAccountant>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::new());
        let cache = Arc::new(CacheStore::in_memory());
        let connectivity = Arc::new(ConnectivityMonitor::online());
        let accountant = Arc::new(UsageAccountant::new(
            Arc::new(SettingsStore::new(dir.path()).await),
            Arc::new(ModeCatalog::builtin()),
            Arc::new(LogUsage),
        ));
        let executor = PlanExecutor::new(
            registry.clone(),
            cache.clone(),
            connectivity.clone(),
            accountant.clone(),
            ExecutionPolicy::default().with_step_delay(Duration::ZERO),
        );
        Harness {
            executor,
            registry,
            cache,
            connectivity,
            accountant,
            _dir: dir,
        }
    }

    async fn register_ok(registry: &ToolRegistry, name: &str) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                "test",
                ToolRegistration::new(
                    ToolSpec::new(name, "test tool", ToolCategory::Search),
                    Arc::new(Succeeds {
                        calls: calls.clone(),
                    }),
                ),
            )
            .await;
        calls
    }

    async fn register_failing(
        registry: &ToolRegistry,
        name: &str,
        error: fn() -> anyhow::Error,
    ) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                "test",
                ToolRegistration::new(
                    ToolSpec::new(name, "test tool", ToolCategory::Search),
                    Arc::new(Fails {
                        error,
                        calls: calls.clone(),
                    }),
                ),
            )
            .await;
        calls
    }

    fn step(n: u32, tool: &str, deps: &[u32]) -> Step {
        Step {
            step_number: n,
            action: format!("run {}", tool),
            tool: tool.to_string(),
            parameters: Map::new(),
            expected_output: String::new(),
            dependencies: deps.to_vec(),
        }
    }

    fn plan_of(steps: Vec<Step>) -> Plan {
        Plan {
            steps,
            ..Plan::default()
        }
    }

    fn tool_error() -> anyhow::Error {
        AgentError::Tool("synthetic failure".to_string()).into()
    }

    fn critical_error() -> anyhow::Error {
        AgentError::Critical("credentials revoked".to_string()).into()
    }

    #[tokio::test]
    async fn test_single_step_success_counts_one_tool_call() {
        let h = harness().await;
        register_ok(&h.registry, "searchWeb").await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "searchWeb", &[])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].step_number, 1);
        assert_eq!(results[0].tool, "searchWeb");
        assert_eq!(h.accountant.snapshot().await.tool_calls, 1);
    }

    #[tokio::test]
    async fn test_zero_step_plan_yields_empty_results() {
        let h = harness().await;
        let results = h
            .executor
            .execute_plan(&plan_of(vec![]), 10, &ToolContext::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_max_tool_calls_caps_the_run() {
        let h = harness().await;
        let calls = register_ok(&h.registry, "quickLookup").await;

        let steps = (1..=5).map(|n| step(n, "quickLookup", &[])).collect();
        let results = h
            .executor
            .execute_plan(&plan_of(steps), 2, &ToolContext::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unmet_dependency_blocks_without_invoking_the_tool() {
        let h = harness().await;
        register_failing(&h.registry, "toolX", tool_error).await;
        let y_calls = register_ok(&h.registry, "toolY").await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "toolX", &[]), step(2, "toolY", &[1])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(!results[1].success);
        assert!(results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("dependencies not met"));
        // The dependent tool body never ran.
        assert_eq!(y_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dependency_failure_never_invokes_an_alternative() {
        let h = harness().await;
        register_failing(&h.registry, "toolX", tool_error).await;
        let original_calls = register_ok(&h.registry, "searchWeb").await;
        let alt_calls = register_ok(&h.registry, "quickLookup").await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "toolX", &[]), step(2, "searchWeb", &[1])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        // The gate applies to substituted tools as well, so the step ends as
        // a dependency failure on the original name with no body invoked.
        assert!(!results[1].success);
        assert_eq!(results[1].tool, "searchWeb");
        assert!(results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("dependencies not met"));
        assert_eq!(original_calls.load(Ordering::SeqCst), 0);
        assert_eq!(alt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_substitutes_an_alternative() {
        let h = harness().await;
        register_failing(&h.registry, "searchWeb", tool_error).await;
        let alt_calls = register_ok(&h.registry, "quickLookup").await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "searchWeb", &[])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        // Exactly one terminal result for the step, from the alternative.
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].tool, "quickLookup");
        assert_eq!(alt_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_fallback_reports_the_original_tool() {
        let h = harness().await;
        register_failing(&h.registry, "searchWeb", tool_error).await;
        register_failing(&h.registry, "quickLookup", tool_error).await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "searchWeb", &[])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].tool, "searchWeb");
        assert_eq!(results[0].error_kind, Some(ErrorKind::Tool));
    }

    #[tokio::test]
    async fn test_abort_threshold_stops_before_later_steps() {
        let h = harness().await;
        register_failing(&h.registry, "t1", tool_error).await;
        register_failing(&h.registry, "t2", tool_error).await;
        register_failing(&h.registry, "t3", tool_error).await;
        let t4_calls = register_ok(&h.registry, "t4").await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![
                    step(1, "t1", &[]),
                    step(2, "t2", &[]),
                    step(3, "t3", &[]),
                    step(4, "t4", &[]),
                ]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(t4_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_doomed_plan_spends_no_alternative() {
        let h = harness().await;
        register_failing(&h.registry, "t1", tool_error).await;
        register_failing(&h.registry, "t2", tool_error).await;
        register_failing(&h.registry, "searchWeb", tool_error).await;
        let alt_calls = register_ok(&h.registry, "quickLookup").await;

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![
                    step(1, "t1", &[]),
                    step(2, "t2", &[]),
                    step(3, "searchWeb", &[]),
                ]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        // The third failure hits the threshold, so its alternative is not
        // attempted.
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].tool, "searchWeb");
        assert_eq!(alt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_critical_failure_aborts_the_run() {
        let h = harness().await;
        register_failing(&h.registry, "apiConnector", critical_error).await;
        let next_calls = register_ok(&h.registry, "quickLookup").await;

        let err = h
            .executor
            .execute_plan(
                &plan_of(vec![
                    step(1, "apiConnector", &[]),
                    step(2, "quickLookup", &[]),
                ]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Critical);
        assert_eq!(next_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_serves_cacheable_results_from_cache() {
        let h = harness().await;
        let calls = register_ok(&h.registry, "searchWeb").await;
        let plan = plan_of(vec![step(1, "searchWeb", &[])]);
        let ctx = ToolContext::new();

        let online = h.executor.execute_plan(&plan, 10, &ctx).await.unwrap();
        assert!(online[0].success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        h.connectivity.set_offline();
        let first_offline = h.executor.execute_plan(&plan, 10, &ctx).await.unwrap();
        let second_offline = h.executor.execute_plan(&plan, 10, &ctx).await.unwrap();

        assert!(first_offline[0].from_cache);
        assert!(second_offline[0].from_cache);
        assert_eq!(first_offline[0].output, online[0].output);
        assert_eq!(second_offline[0].output, first_offline[0].output);
        // The tool body never ran again.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_cache_miss_is_a_connectivity_failure() {
        let h = harness().await;
        register_ok(&h.registry, "searchWeb").await;
        register_ok(&h.registry, "quickLookup").await;
        h.connectivity.set_offline();

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "searchWeb", &[])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        // The alternative is also cacheable and also has no cached entry, so
        // the step ends as a connectivity failure on the original tool.
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].tool, "searchWeb");
        assert_eq!(results[0].error_kind, Some(ErrorKind::Connectivity));
    }

    #[tokio::test]
    async fn test_offline_network_tool_fails_without_invocation() {
        let h = harness().await;
        let calls = Arc::new(AtomicUsize::new(0));
        h.registry
            .register(
                "test",
                ToolRegistration::new(
                    ToolSpec::new("directInference", "model call", ToolCategory::System)
                        .requires_network(),
                    Arc::new(Succeeds {
                        calls: calls.clone(),
                    }),
                ),
            )
            .await;
        h.connectivity.set_offline();

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "directInference", &[])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert!(!results[0].success);
        assert_eq!(results[0].error_kind, Some(ErrorKind::Connectivity));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_local_tool_still_executes() {
        let h = harness().await;
        let calls = register_ok(&h.registry, "passwordStrengthChecker").await;
        h.connectivity.set_offline();

        let results = h
            .executor
            .execute_plan(
                &plan_of(vec![step(1, "passwordStrengthChecker", &[])]),
                10,
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert!(results[0].success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_cacheable_results_are_written_through() {
        let h = harness().await;
        register_ok(&h.registry, "codeExplainer").await;
        let mut s = step(1, "codeExplainer", &[]);
        s.parameters
            .insert("code".to_string(), json!("fn main() {}"));

        let results = h
            .executor
            .execute_plan(&plan_of(vec![s.clone()]), 10, &ToolContext::new())
            .await
            .unwrap();

        let key = tool_cache_key("codeExplainer", &Value::Object(s.parameters.clone()));
        assert_eq!(h.cache.get(&key).await, results[0].output);
    }
}
