//! Five-stage goal pipeline.
//!
//! `ANALYZE -> PLAN -> EXECUTE -> VERIFY -> DELIVER`, strictly in order, no
//! re-entry. Analyze, plan, and verify each make one provider call; losing
//! connectivity there defers the stage to the offline queue instead of
//! failing the goal. The deliver summary is the one call that is never
//! queued: without connectivity the already-computed results ship as a
//! partial package.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::connectivity::ConnectivityMonitor;
use crate::delivery::{extract_artifacts, extract_sources, Delivery, DeliveryMetrics};
use crate::error::AgentError;
use crate::executor::{ExecutionPolicy, PlanExecutor};
use crate::inference::{call_type, InferenceProvider, InferenceResponse};
use crate::modes::{EfficiencyMode, ModeCatalog};
use crate::plan::{Analysis, Plan, StepResult, Verification};
use crate::pricing::estimate_tokens;
use crate::queue::{OfflineQueue, QueuedRequest, QueuedStage, StageReplayer};
use crate::registry::{ToolContext, ToolRegistry};
use crate::settings::SharedSettingsStore;
use crate::trace::{
    emit_trace, notify, LogNotifier, LogTrace, NoticeLevel, NotificationSink, TraceEvent,
    TraceSink, TraceStatus,
};
use crate::usage::UsageAccountant;

/// Final package for a goal that reached the deliver stage.
#[derive(Debug, Clone, Serialize)]
pub struct GoalReport {
    pub goal_id: Uuid,
    /// True only when verification passed and nothing belonging to this goal
    /// sits in the offline queue.
    pub success: bool,
    pub partial_due_to_queue: bool,
    pub analysis: Analysis,
    pub plan: Plan,
    pub results: Vec<StepResult>,
    pub verification: Verification,
    pub delivery: Delivery,
}

/// A goal accepted but deferred to the offline queue at a reasoning stage.
#[derive(Debug, Clone, Serialize)]
pub struct DeferredGoal {
    pub goal_id: Uuid,
    pub request_id: Uuid,
    /// Replay entry point, e.g. `analyzeGoal`.
    pub stage: String,
    pub message: String,
}

/// Terminal state of one `process_goal` invocation. Hard failures are the
/// `Err` side of `process_goal`, with the original error text preserved.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GoalOutcome {
    /// Every stage ran, summary included.
    Completed(GoalReport),
    /// A reasoning stage was queued for replay after reconnect. Not a
    /// failure; the caller should present it as accepted-and-deferred.
    Deferred(DeferredGoal),
    /// Results and verification computed, but the summary call had no
    /// connectivity. Deliberately not queued.
    DeliveredOffline(GoalReport),
}

impl GoalOutcome {
    pub fn goal_id(&self) -> Uuid {
        match self {
            GoalOutcome::Completed(report) | GoalOutcome::DeliveredOffline(report) => {
                report.goal_id
            }
            GoalOutcome::Deferred(deferred) => deferred.goal_id,
        }
    }
}

/// Stage result: ready to continue, or snapshotted into the offline queue.
enum Staged<T> {
    Ready(T),
    Queued(QueuedRequest),
}

fn deferred(request: QueuedRequest, message: &str) -> GoalOutcome {
    GoalOutcome::Deferred(DeferredGoal {
        goal_id: request.goal_id,
        request_id: request.id,
        stage: request.stage.original_action().to_string(),
        message: message.to_string(),
    })
}

/// Orchestrates one goal end to end.
///
/// Owns nothing mutable itself; all run state lives on the stack of one
/// `process_goal` call, correlated by a per-invocation goal id that queue
/// entries carry.
pub struct GoalPipeline {
    provider: Arc<dyn InferenceProvider>,
    registry: Arc<ToolRegistry>,
    executor: PlanExecutor,
    queue: Arc<OfflineQueue>,
    accountant: Arc<UsageAccountant>,
    settings: SharedSettingsStore,
    modes: Arc<ModeCatalog>,
    trace: Arc<dyn TraceSink>,
    notifications: Arc<dyn NotificationSink>,
}

impl GoalPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        registry: Arc<ToolRegistry>,
        cache: Arc<CacheStore>,
        connectivity: Arc<ConnectivityMonitor>,
        queue: Arc<OfflineQueue>,
        accountant: Arc<UsageAccountant>,
        settings: SharedSettingsStore,
        modes: Arc<ModeCatalog>,
        policy: ExecutionPolicy,
    ) -> Self {
        let executor = PlanExecutor::new(
            registry.clone(),
            cache,
            connectivity,
            accountant.clone(),
            policy,
        );
        Self {
            provider,
            registry,
            executor,
            queue,
            accountant,
            settings,
            modes,
            trace: Arc::new(LogTrace),
            notifications: Arc::new(LogNotifier),
        }
    }

    /// Route trace events and notices somewhere other than the log.
    pub fn with_sinks(
        mut self,
        trace: Arc<dyn TraceSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        self.trace = trace;
        self.notifications = notifications;
        self
    }

    /// Run the full pipeline for one goal.
    ///
    /// # Errors
    ///
    /// Any non-connectivity stage failure is fatal to the invocation and
    /// comes back with its original message. Connectivity failures during
    /// analyze, plan, or verify are not errors; they produce
    /// [`GoalOutcome::Deferred`].
    pub async fn process_goal(&self, goal: &str) -> Result<GoalOutcome, AgentError> {
        self.process_goal_with_id(Uuid::new_v4(), goal).await
    }

    /// [`process_goal`](Self::process_goal) with a caller-supplied
    /// correlation id, used when resuming deferred work under the id it was
    /// queued with.
    pub async fn process_goal_with_id(
        &self,
        goal_id: Uuid,
        goal: &str,
    ) -> Result<GoalOutcome, AgentError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(AgentError::Validation("goal text is empty".to_string()));
        }
        tracing::info!(goal_id = %goal_id, "Processing goal");

        let analysis = match self.analyze_stage(goal_id, goal).await? {
            Staged::Ready(analysis) => analysis,
            Staged::Queued(request) => {
                return Ok(deferred(
                    request,
                    "Offline: goal accepted, analysis will run when connectivity returns.",
                ))
            }
        };
        self.run_from_plan(goal_id, goal, analysis).await
    }

    async fn run_from_plan(
        &self,
        goal_id: Uuid,
        goal: &str,
        analysis: Analysis,
    ) -> Result<GoalOutcome, AgentError> {
        let plan = match self.plan_stage(goal_id, &analysis).await? {
            Staged::Ready(plan) => plan,
            Staged::Queued(request) => {
                return Ok(deferred(
                    request,
                    "Offline: plan generation queued until connectivity returns.",
                ))
            }
        };
        self.run_from_execute(goal_id, goal, analysis, plan).await
    }

    async fn run_from_execute(
        &self,
        goal_id: Uuid,
        goal: &str,
        analysis: Analysis,
        plan: Plan,
    ) -> Result<GoalOutcome, AgentError> {
        let mode = self.active_mode().await;
        let ctx = self.tool_context().await;

        emit_trace(
            &self.trace,
            TraceEvent::new(
                format!(
                    "Executing plan: {} steps, {} tool calls allowed",
                    plan.steps.len(),
                    mode.max_tool_calls
                ),
                "executor",
                TraceStatus::Active,
            ),
        )
        .await;

        // Individual step failures land in the results; only a critical
        // failure comes back as Err and fails the goal.
        let results = match self
            .executor
            .execute_plan(&plan, mode.max_tool_calls, &ctx)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!("Plan execution aborted: {}", e),
                        "executor",
                        TraceStatus::Error,
                    ),
                )
                .await;
                return Err(e);
            }
        };

        let completed = results.iter().filter(|r| r.success).count();
        emit_trace(
            &self.trace,
            TraceEvent::new(
                format!(
                    "Execution finished: {} of {} steps succeeded",
                    completed,
                    results.len()
                ),
                "executor",
                TraceStatus::Completed,
            ),
        )
        .await;

        let verification = match self
            .verify_stage(goal_id, &analysis.success_criteria, &results)
            .await?
        {
            Staged::Ready(verification) => verification,
            Staged::Queued(request) => {
                return Ok(deferred(
                    request,
                    "Offline: verification queued, the verdict arrives after reconnect.",
                ))
            }
        };

        self.deliver(goal_id, goal, analysis, plan, results, verification)
            .await
    }

    async fn deliver(
        &self,
        goal_id: Uuid,
        goal: &str,
        analysis: Analysis,
        plan: Plan,
        results: Vec<StepResult>,
        verification: Verification,
    ) -> Result<GoalOutcome, AgentError> {
        emit_trace(
            &self.trace,
            TraceEvent::new("Assembling delivery", "deliverer", TraceStatus::Active),
        )
        .await;

        let artifacts = extract_artifacts(&results);
        let sources = extract_sources(&results);
        let metrics = DeliveryMetrics::from_run(&plan, &results, &verification);
        let cost_breakdown = self.accountant.cost_breakdown().await;
        let partial_due_to_queue = self.queue.has_entries_for_goal(goal_id).await;
        let success = verification.overall_success && !partial_due_to_queue;

        match self.call_summary(goal, &results, &verification).await {
            Ok(summary) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!(
                            "Delivery ready: {} of {} steps completed",
                            metrics.steps_completed, metrics.total_steps
                        ),
                        "deliverer",
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({
                        "success": success,
                        "partial_due_to_queue": partial_due_to_queue,
                    })),
                )
                .await;
                if partial_due_to_queue {
                    tracing::info!(goal_id = %goal_id, "Goal has deferred work in the offline queue");
                }
                Ok(GoalOutcome::Completed(GoalReport {
                    goal_id,
                    success,
                    partial_due_to_queue,
                    analysis,
                    plan,
                    results,
                    verification,
                    delivery: Delivery {
                        summary,
                        artifacts,
                        metrics,
                        sources,
                        cost_breakdown,
                    },
                }))
            }
            Err(e) if e.is_connectivity() => {
                // A terminal convenience step: ship what exists, queue nothing.
                tracing::warn!("Summary call offline; delivering partial package without queueing");
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        "Delivery assembled offline without a summary",
                        "deliverer",
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({ "offline": true })),
                )
                .await;
                let summary = format!(
                    "Offline: no summary available. {} of {} steps completed.",
                    metrics.steps_completed, metrics.total_steps
                );
                Ok(GoalOutcome::DeliveredOffline(GoalReport {
                    goal_id,
                    success,
                    partial_due_to_queue,
                    analysis,
                    plan,
                    results,
                    verification,
                    delivery: Delivery {
                        summary,
                        artifacts,
                        metrics,
                        sources,
                        cost_breakdown,
                    },
                }))
            }
            Err(e) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!("Delivery failed: {}", e),
                        "deliverer",
                        TraceStatus::Error,
                    ),
                )
                .await;
                Err(e)
            }
        }
    }

    // ========================================================================
    // Stage wrappers: trace events plus queue-on-connectivity
    // ========================================================================

    async fn analyze_stage(
        &self,
        goal_id: Uuid,
        goal: &str,
    ) -> Result<Staged<Analysis>, AgentError> {
        emit_trace(
            &self.trace,
            TraceEvent::new("Analyzing goal", "analyzer", TraceStatus::Active),
        )
        .await;

        match self.call_analyze(goal).await {
            Ok(analysis) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!(
                            "Goal understood: {} ({} complexity)",
                            analysis.goal_type, analysis.complexity
                        ),
                        "analyzer",
                        TraceStatus::Completed,
                    ),
                )
                .await;
                Ok(Staged::Ready(analysis))
            }
            Err(e) if e.is_connectivity() => {
                let request = self
                    .queue
                    .enqueue(
                        goal_id,
                        QueuedStage::Analyze {
                            goal: goal.to_string(),
                        },
                    )
                    .await;
                self.notify_if_enabled(
                    NoticeLevel::Info,
                    "Offline: your goal is queued and will run when connectivity returns.",
                )
                .await;
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        "Analysis deferred to the offline queue",
                        "analyzer",
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({ "queued": true })),
                )
                .await;
                Ok(Staged::Queued(request))
            }
            Err(e) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!("Goal analysis failed: {}", e),
                        "analyzer",
                        TraceStatus::Error,
                    ),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn plan_stage(
        &self,
        goal_id: Uuid,
        analysis: &Analysis,
    ) -> Result<Staged<Plan>, AgentError> {
        emit_trace(
            &self.trace,
            TraceEvent::new("Generating execution plan", "planner", TraceStatus::Active),
        )
        .await;

        match self.call_plan(analysis).await {
            Ok(plan) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!("Plan ready with {} steps", plan.steps.len()),
                        "planner",
                        TraceStatus::Completed,
                    ),
                )
                .await;
                Ok(Staged::Ready(plan))
            }
            Err(e) if e.is_connectivity() => {
                let request = self
                    .queue
                    .enqueue(
                        goal_id,
                        QueuedStage::Plan {
                            analysis: analysis.clone(),
                        },
                    )
                    .await;
                self.notify_if_enabled(
                    NoticeLevel::Info,
                    "Offline: plan generation queued until connectivity returns.",
                )
                .await;
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        "Plan generation deferred to the offline queue",
                        "planner",
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({ "queued": true })),
                )
                .await;
                Ok(Staged::Queued(request))
            }
            Err(e) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!("Plan generation failed: {}", e),
                        "planner",
                        TraceStatus::Error,
                    ),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn verify_stage(
        &self,
        goal_id: Uuid,
        criteria: &[String],
        results: &[StepResult],
    ) -> Result<Staged<Verification>, AgentError> {
        emit_trace(
            &self.trace,
            TraceEvent::new(
                "Verifying results against success criteria",
                "verifier",
                TraceStatus::Active,
            ),
        )
        .await;

        match self.call_verify(criteria, results).await {
            Ok(verification) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!(
                            "Verification complete: {}",
                            if verification.overall_success {
                                "passed"
                            } else {
                                "failed"
                            }
                        ),
                        "verifier",
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({ "quality_score": verification.quality_score })),
                )
                .await;
                Ok(Staged::Ready(verification))
            }
            Err(e) if e.is_connectivity() => {
                let request = self
                    .queue
                    .enqueue(
                        goal_id,
                        QueuedStage::Verify {
                            results: results.to_vec(),
                            criteria: criteria.to_vec(),
                        },
                    )
                    .await;
                self.notify_if_enabled(
                    NoticeLevel::Info,
                    "Offline: verification queued, the verdict arrives after reconnect.",
                )
                .await;
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        "Verification deferred to the offline queue",
                        "verifier",
                        TraceStatus::Completed,
                    )
                    .with_metadata(json!({ "queued": true })),
                )
                .await;
                Ok(Staged::Queued(request))
            }
            Err(e) => {
                emit_trace(
                    &self.trace,
                    TraceEvent::new(
                        format!("Verification failed: {}", e),
                        "verifier",
                        TraceStatus::Error,
                    ),
                )
                .await;
                Err(e)
            }
        }
    }

    // ========================================================================
    // Raw stage calls
    // ========================================================================

    async fn call_analyze(&self, goal: &str) -> Result<Analysis, AgentError> {
        let mode = self.active_mode().await;
        let prompt = prompts::analyze(goal, &mode);
        let response = self.call_provider(&prompt, call_type::ANALYSIS).await?;
        Ok(parse_analysis(response, goal))
    }

    async fn call_plan(&self, analysis: &Analysis) -> Result<Plan, AgentError> {
        let mode = self.active_mode().await;
        let catalog = self.registry.tool_list().await;
        let prompt = prompts::plan(analysis, &catalog, &mode);
        let response = self.call_provider(&prompt, call_type::PLANNING).await?;

        // A prose plan is unusable; unlike analysis there is no sensible
        // fallback shape.
        let value = response.into_json()?;
        let mut plan: Plan = serde_json::from_value(value).map_err(|e| {
            AgentError::Validation(format!("plan does not match the expected shape: {}", e))
        })?;
        plan.validate()?;
        plan.truncate(mode.max_plan_steps);
        Ok(plan)
    }

    async fn call_verify(
        &self,
        criteria: &[String],
        results: &[StepResult],
    ) -> Result<Verification, AgentError> {
        if criteria.is_empty() {
            tracing::debug!("No success criteria to check, passing automatically");
            return Ok(Verification::automatic_pass());
        }
        let prompt = prompts::verify(criteria, results);
        let response = self.call_provider(&prompt, call_type::VERIFICATION).await?;
        Ok(parse_verification(response, results))
    }

    async fn call_summary(
        &self,
        goal: &str,
        results: &[StepResult],
        verification: &Verification,
    ) -> Result<String, AgentError> {
        let prompt = prompts::summarize(goal, results, verification);
        let response = self
            .call_provider(&prompt, call_type::SUMMARIZATION)
            .await?;
        let summary = match response {
            InferenceResponse::Json(value) => value
                .get("summary")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            InferenceResponse::Text(text) => text,
        };
        Ok(summary)
    }

    /// One provider round trip with token accounting.
    async fn call_provider(
        &self,
        prompt: &str,
        call_type: &str,
    ) -> Result<InferenceResponse, AgentError> {
        let response = self.provider.call(prompt, call_type).await?;
        self.accountant
            .record_tokens(estimate_tokens(prompt) + estimate_tokens(&response.to_text()))
            .await;
        Ok(response)
    }

    async fn active_mode(&self) -> EfficiencyMode {
        let settings = self.settings.get().await;
        self.modes.get_or_default(&settings.efficiency_mode)
    }

    async fn tool_context(&self) -> ToolContext {
        let settings = self.settings.get().await;
        ToolContext::new()
            .with_high_risk(settings.high_risk_tools_enabled)
            .with_sinks(self.trace.clone(), self.notifications.clone())
            .with_provider(self.provider.clone())
    }

    async fn notify_if_enabled(&self, level: NoticeLevel, message: &str) {
        if self.settings.get().await.notifications_enabled {
            notify(&self.notifications, level, message).await;
        }
    }
}

/// Replays deferred stages out of the offline queue.
///
/// Analyze and plan replays resume the goal and run it to completion under
/// the original goal id, so a later stage losing connectivity re-queues under
/// that same id. A verify replay ends at the verdict: the snapshot carries
/// results and criteria but not the plan, so there is nothing to deliver.
#[async_trait]
impl StageReplayer for GoalPipeline {
    async fn replay(&self, request: &QueuedRequest) -> Result<(), AgentError> {
        tracing::info!(
            action = request.stage.original_action(),
            goal_id = %request.goal_id,
            "Replaying deferred stage"
        );
        match &request.stage {
            QueuedStage::Analyze { goal } => {
                let analysis = self.call_analyze(goal).await?;
                self.run_from_plan(request.goal_id, goal, analysis).await?;
            }
            QueuedStage::Plan { analysis } => {
                let plan = self.call_plan(analysis).await?;
                self.run_from_execute(request.goal_id, "", analysis.clone(), plan)
                    .await?;
            }
            QueuedStage::Verify { results, criteria } => {
                let verification = self.call_verify(criteria, results).await?;
                self.notify_if_enabled(
                    NoticeLevel::Info,
                    &format!(
                        "Deferred verification finished: {}, quality {}",
                        if verification.overall_success {
                            "passed"
                        } else {
                            "failed"
                        },
                        verification.quality_score
                    ),
                )
                .await;
            }
        }
        Ok(())
    }
}

fn parse_analysis(response: InferenceResponse, goal: &str) -> Analysis {
    match response {
        InferenceResponse::Json(value) => match serde_json::from_value(value) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(
                    "Analysis response did not match the expected shape ({}), using defaults",
                    e
                );
                fallback_analysis(goal)
            }
        },
        InferenceResponse::Text(_) => {
            tracing::warn!("Analysis response was prose, using defaults");
            fallback_analysis(goal)
        }
    }
}

fn fallback_analysis(goal: &str) -> Analysis {
    Analysis {
        goal_type: "general".to_string(),
        complexity: "medium".to_string(),
        success_criteria: vec![format!("A useful response to '{}' was produced", goal)],
        estimated_steps: Some(3),
        ..Analysis::default()
    }
}

fn parse_verification(response: InferenceResponse, results: &[StepResult]) -> Verification {
    match response {
        InferenceResponse::Json(value) => match serde_json::from_value(value) {
            Ok(verification) => verification,
            Err(e) => {
                tracing::warn!(
                    "Verification response did not match the expected shape ({}), deriving a verdict",
                    e
                );
                heuristic_verification(results)
            }
        },
        InferenceResponse::Text(_) => {
            tracing::warn!("Verification response was prose, deriving a verdict");
            heuristic_verification(results)
        }
    }
}

/// Verdict derived from step outcomes when the verifier answer is unusable.
fn heuristic_verification(results: &[StepResult]) -> Verification {
    let completed = results.iter().filter(|r| r.success).count();
    let rate = if results.is_empty() {
        0.0
    } else {
        completed as f64 / results.len() as f64
    };
    Verification {
        overall_success: !results.is_empty() && completed == results.len(),
        quality_score: (rate * 100.0).round() as u32,
        recommendations: vec![
            "Verdict derived from step outcomes; the verifier gave no structured answer"
                .to_string(),
        ],
        ..Verification::default()
    }
}

mod prompts {
    use std::fmt::Write;

    use crate::modes::EfficiencyMode;
    use crate::plan::{Analysis, StepResult, Verification};
    use crate::registry::ToolInfo;

    /// Characters of a step output included in verify and summary prompts.
    const OUTPUT_PREVIEW_CHARS: usize = 200;

    pub(super) fn analyze(goal: &str, mode: &EfficiencyMode) -> String {
        format!(
            "Analyze the following goal and answer with a single JSON object, no prose.\n\
             Goal: {}\n\n\
             Fields: goal_type (string), complexity (low|medium|high), \
             required_tools (array of tool names), success_criteria (array of at most {} \
             concrete checks), estimated_steps (integer), risks (array of strings), \
             context_needed (array of strings).",
            goal, mode.verification_count
        )
    }

    pub(super) fn plan(analysis: &Analysis, catalog: &[ToolInfo], mode: &EfficiencyMode) -> String {
        let mut tools = String::new();
        for info in catalog {
            let _ = writeln!(tools, "- {} [{}]: {}", info.name, info.category, info.description);
        }
        format!(
            "Create an execution plan as a single JSON object, no prose.\n\
             Goal type: {}. Complexity: {}.\n\
             Success criteria: {}\n\
             Available tools:\n{}\n\
             Use at most {} steps. Fields: steps (array of {{step_number, action, tool, \
             parameters, expected_output, dependencies}}), parallel_execution (array of \
             step numbers), verification_points (array of strings), estimated_time (string), \
             resource_requirements (array of strings). Step numbers start at 1 and \
             dependencies may only reference earlier steps.",
            analysis.goal_type,
            analysis.complexity,
            analysis.success_criteria.join("; "),
            tools,
            mode.max_plan_steps
        )
    }

    pub(super) fn verify(criteria: &[String], results: &[StepResult]) -> String {
        let mut criteria_list = String::new();
        for criterion in criteria {
            let _ = writeln!(criteria_list, "- {}", criterion);
        }
        format!(
            "Check the execution outcome against each success criterion and answer with a \
             single JSON object, no prose.\n\
             Success criteria:\n{}\
             Step outcomes:\n{}\
             Fields: overall_success (bool), criteria_met (array), criteria_failed (array), \
             quality_score (0-100), recommendations (array), next_actions (array).",
            criteria_list,
            render_results(results)
        )
    }

    pub(super) fn summarize(
        goal: &str,
        results: &[StepResult],
        verification: &Verification,
    ) -> String {
        let goal_line = if goal.is_empty() {
            String::new()
        } else {
            format!("Goal: {}\n", goal)
        };
        format!(
            "Write a short plain-text summary (three sentences at most) of this run for the \
             user.\n\
             {}Verification: success={}, quality={}.\n\
             Step outcomes:\n{}",
            goal_line,
            verification.overall_success,
            verification.quality_score,
            render_results(results)
        )
    }

    fn render_results(results: &[StepResult]) -> String {
        let mut out = String::new();
        for result in results {
            let detail = if result.success {
                result
                    .output
                    .as_ref()
                    .map(|output| {
                        output
                            .to_string()
                            .chars()
                            .take(OUTPUT_PREVIEW_CHARS)
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                result.error.clone().unwrap_or_default()
            };
            let _ = writeln!(
                out,
                "- step {} ({}): {} {}",
                result.step_number,
                result.tool,
                if result.success { "ok" } else { "failed" },
                detail
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::plan::Step;
    use crate::registry::{Tool, ToolCategory, ToolRegistration, ToolSpec};
    use crate::settings::SettingsStore;
    use crate::trace::{LogUsage, MemoryNotifier, MemoryTrace};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<InferenceResponse, AgentError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<InferenceResponse, AgentError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn push(&self, entries: Vec<Result<InferenceResponse, AgentError>>) {
            self.script.lock().unwrap().extend(entries);
        }

        fn call_types(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn call(
            &self,
            _prompt: &str,
            call_type: &str,
        ) -> Result<InferenceResponse, AgentError> {
            self.calls.lock().unwrap().push(call_type.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Inference("script exhausted".to_string())))
        }
    }

    struct StaticTool {
        output: Value,
    }

    #[async_trait]
    impl Tool for StaticTool {
        async fn execute(&self, _parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            Ok(self.output.clone())
        }
    }

    struct FailTool {
        error: fn() -> anyhow::Error,
    }

    #[async_trait]
    impl Tool for FailTool {
        async fn execute(&self, _parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            Err((self.error)())
        }
    }

    struct Harness {
        pipeline: GoalPipeline,
        provider: Arc<ScriptedProvider>,
        registry: Arc<ToolRegistry>,
        queue: Arc<OfflineQueue>,
        accountant: Arc<UsageAccountant>,
        settings: SharedSettingsStore,
        trace: Arc<MemoryTrace>,
        notifier: Arc<MemoryNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn harness(script: Vec<Result<InferenceResponse, AgentError>>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(script));
        let registry = Arc::new(ToolRegistry::new());
        let cache = Arc::new(CacheStore::in_memory());
        let connectivity = Arc::new(ConnectivityMonitor::online());
        let settings = Arc::new(SettingsStore::new(dir.path()).await);
        let modes = Arc::new(ModeCatalog::builtin());
        let accountant = Arc::new(UsageAccountant::new(
            settings.clone(),
            modes.clone(),
            Arc::new(LogUsage),
        ));
        let trace = Arc::new(MemoryTrace::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let queue = Arc::new(OfflineQueue::new(cache.clone(), notifier.clone()));
        let pipeline = GoalPipeline::new(
            provider.clone(),
            registry.clone(),
            cache,
            connectivity,
            queue.clone(),
            accountant.clone(),
            settings.clone(),
            modes,
            ExecutionPolicy::default().with_step_delay(Duration::ZERO),
        )
        .with_sinks(trace.clone(), notifier.clone());

        Harness {
            pipeline,
            provider,
            registry,
            queue,
            accountant,
            settings,
            trace,
            notifier,
            _dir: dir,
        }
    }

    async fn register_tool(registry: &ToolRegistry, name: &str, output: Value) {
        registry
            .register(
                "test",
                ToolRegistration::new(
                    ToolSpec::new(name, "test tool", ToolCategory::Search),
                    Arc::new(StaticTool { output }),
                ),
            )
            .await;
    }

    async fn register_failing(registry: &ToolRegistry, name: &str, error: fn() -> anyhow::Error) {
        registry
            .register(
                "test",
                ToolRegistration::new(
                    ToolSpec::new(name, "test tool", ToolCategory::Search),
                    Arc::new(FailTool { error }),
                ),
            )
            .await;
    }

    fn analysis_ok() -> Result<InferenceResponse, AgentError> {
        Ok(InferenceResponse::Json(json!({
            "goal_type": "research",
            "complexity": "medium",
            "required_tools": ["quickLookup"],
            "success_criteria": ["the answer names a source"],
            "estimated_steps": 1
        })))
    }

    fn plan_ok(tools: &[&str]) -> Result<InferenceResponse, AgentError> {
        let steps: Vec<Value> = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| {
                json!({
                    "step_number": i + 1,
                    "action": format!("run {}", tool),
                    "tool": tool,
                    "parameters": {},
                    "expected_output": "data",
                    "dependencies": []
                })
            })
            .collect();
        Ok(InferenceResponse::Json(json!({ "steps": steps })))
    }

    fn verification_ok() -> Result<InferenceResponse, AgentError> {
        Ok(InferenceResponse::Json(json!({
            "overall_success": true,
            "criteria_met": ["the answer names a source"],
            "criteria_failed": [],
            "quality_score": 90
        })))
    }

    fn summary_ok() -> Result<InferenceResponse, AgentError> {
        Ok(InferenceResponse::Text(
            "Found the answer with one lookup.".to_string(),
        ))
    }

    fn offline() -> Result<InferenceResponse, AgentError> {
        Err(AgentError::Connectivity("fetch failed".to_string()))
    }

    #[tokio::test]
    async fn test_full_run_completes() {
        let h = harness(vec![analysis_ok(), plan_ok(&["quickLookup"]), verification_ok(), summary_ok()]).await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let outcome = h.pipeline.process_goal("what is 6 times 7").await.unwrap();

        let report = match outcome {
            GoalOutcome::Completed(report) => report,
            other => panic!("expected completed outcome, got {:?}", other),
        };
        assert!(report.success);
        assert!(!report.partial_due_to_queue);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].success);
        assert_eq!(report.delivery.summary, "Found the answer with one lookup.");
        assert_eq!(report.delivery.metrics.steps_completed, 1);
        assert_eq!(
            h.provider.call_types(),
            vec!["analysis", "planning", "verification", "summarization"]
        );

        let stats = h.accountant.snapshot().await;
        assert_eq!(stats.tool_calls, 1);
        assert!(stats.tokens_used > 0);
        assert!(stats.estimated_cost > 0.0);
    }

    #[tokio::test]
    async fn test_offline_analyze_defers_the_goal() {
        let h = harness(vec![offline()]).await;

        let outcome = h.pipeline.process_goal("research rust agents").await.unwrap();

        let deferred = match outcome {
            GoalOutcome::Deferred(deferred) => deferred,
            other => panic!("expected deferred outcome, got {:?}", other),
        };
        assert_eq!(deferred.stage, "analyzeGoal");

        let entries = h.queue.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].goal_id, deferred.goal_id);
        match &entries[0].stage {
            QueuedStage::Analyze { goal } => assert_eq!(goal, "research rust agents"),
            other => panic!("unexpected snapshot {:?}", other),
        }

        let notices = h.notifier.notices().await;
        assert!(notices
            .iter()
            .any(|(level, message)| *level == NoticeLevel::Info && message.contains("queued")));
    }

    #[tokio::test]
    async fn test_offline_plan_defers_with_analysis_snapshot() {
        let h = harness(vec![analysis_ok(), offline()]).await;

        let outcome = h.pipeline.process_goal("research rust agents").await.unwrap();

        match outcome {
            GoalOutcome::Deferred(deferred) => assert_eq!(deferred.stage, "generatePlan"),
            other => panic!("expected deferred outcome, got {:?}", other),
        }
        let entries = h.queue.entries().await;
        match &entries[0].stage {
            QueuedStage::Plan { analysis } => assert_eq!(analysis.goal_type, "research"),
            other => panic!("unexpected snapshot {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_verify_defers_results_snapshot() {
        let h = harness(vec![analysis_ok(), plan_ok(&["quickLookup"]), offline()]).await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let outcome = h.pipeline.process_goal("research rust agents").await.unwrap();

        match outcome {
            GoalOutcome::Deferred(deferred) => assert_eq!(deferred.stage, "verifyResults"),
            other => panic!("expected deferred outcome, got {:?}", other),
        }
        let entries = h.queue.entries().await;
        match &entries[0].stage {
            QueuedStage::Verify { results, criteria } => {
                assert_eq!(results.len(), 1);
                assert!(results[0].success);
                assert_eq!(criteria, &vec!["the answer names a source".to_string()]);
            }
            other => panic!("unexpected snapshot {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generic_provider_error_is_fatal() {
        let h = harness(vec![Err(AgentError::Inference("model exploded".to_string()))]).await;

        let err = h.pipeline.process_goal("do a thing").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.to_string().contains("model exploded"));
        assert!(h.queue.is_empty().await);
        let events = h.trace.events().await;
        assert!(events.iter().any(|e| e.status == TraceStatus::Error));
    }

    #[tokio::test]
    async fn test_prose_plan_response_is_fatal() {
        let h = harness(vec![
            analysis_ok(),
            Ok(InferenceResponse::Text("I would search the web.".to_string())),
        ])
        .await;

        let err = h.pipeline.process_goal("do a thing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_forward_dependency_plan_is_fatal() {
        let h = harness(vec![
            analysis_ok(),
            Ok(InferenceResponse::Json(json!({
                "steps": [
                    {"step_number": 1, "tool": "quickLookup", "dependencies": [2]},
                    {"step_number": 2, "tool": "quickLookup", "dependencies": []}
                ]
            }))),
        ])
        .await;

        let err = h.pipeline.process_goal("do a thing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_mode_caps_bound_plan_and_execution() {
        let h = harness(vec![
            analysis_ok(),
            plan_ok(&["quickLookup"; 7]),
            verification_ok(),
            summary_ok(),
        ])
        .await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;
        h.settings
            .set_efficiency_mode("efficiency_first".to_string())
            .await
            .unwrap();

        let outcome = h.pipeline.process_goal("look things up").await.unwrap();

        let report = match outcome {
            GoalOutcome::Completed(report) => report,
            other => panic!("expected completed outcome, got {:?}", other),
        };
        // Plan truncated to the mode's max_plan_steps, execution bounded by
        // its max_tool_calls.
        assert_eq!(report.plan.steps.len(), 5);
        assert_eq!(report.results.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_criteria_skip_the_verification_call() {
        let h = harness(vec![
            Ok(InferenceResponse::Json(json!({
                "goal_type": "chat",
                "complexity": "low",
                "success_criteria": []
            }))),
            plan_ok(&["quickLookup"]),
            summary_ok(),
        ])
        .await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let outcome = h.pipeline.process_goal("small talk").await.unwrap();

        let report = match outcome {
            GoalOutcome::Completed(report) => report,
            other => panic!("expected completed outcome, got {:?}", other),
        };
        assert!(report.verification.overall_success);
        assert_eq!(report.verification.quality_score, 0);
        assert_eq!(
            h.provider.call_types(),
            vec!["analysis", "planning", "summarization"]
        );
    }

    #[tokio::test]
    async fn test_offline_summary_delivers_partial_without_queueing() {
        let h = harness(vec![
            analysis_ok(),
            plan_ok(&["quickLookup"]),
            verification_ok(),
            offline(),
        ])
        .await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let outcome = h.pipeline.process_goal("research rust agents").await.unwrap();

        let report = match outcome {
            GoalOutcome::DeliveredOffline(report) => report,
            other => panic!("expected offline delivery, got {:?}", other),
        };
        assert!(h.queue.is_empty().await);
        assert_eq!(report.verification.quality_score, 90);
        assert_eq!(report.results.len(), 1);
        assert!(report.delivery.summary.contains("Offline"));
    }

    #[tokio::test]
    async fn test_completed_reports_partial_when_goal_work_is_queued() {
        let h = harness(vec![
            analysis_ok(),
            plan_ok(&["quickLookup"]),
            verification_ok(),
            summary_ok(),
        ])
        .await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let goal_id = Uuid::new_v4();
        h.queue
            .enqueue(
                goal_id,
                QueuedStage::Verify {
                    results: vec![],
                    criteria: vec![],
                },
            )
            .await;

        let outcome = h
            .pipeline
            .process_goal_with_id(goal_id, "research rust agents")
            .await
            .unwrap();

        let report = match outcome {
            GoalOutcome::Completed(report) => report,
            other => panic!("expected completed outcome, got {:?}", other),
        };
        // Verification passed, but deferred work for the same goal means the
        // invocation is not wholly successful.
        assert!(report.verification.overall_success);
        assert!(report.partial_due_to_queue);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_replay_analyze_resumes_the_goal() {
        let h = harness(vec![offline()]).await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let outcome = h.pipeline.process_goal("research rust agents").await.unwrap();
        let goal_id = outcome.goal_id();
        assert_eq!(h.queue.len().await, 1);

        h.provider.push(vec![
            analysis_ok(),
            plan_ok(&["quickLookup"]),
            verification_ok(),
            summary_ok(),
        ]);

        let report = h.queue.drain(&h.pipeline).await;
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
        assert!(h.queue.is_empty().await);
        assert!(!h.queue.has_entries_for_goal(goal_id).await);
        // The resumed run made exactly the four remaining stage calls.
        assert_eq!(
            h.provider.call_types(),
            vec![
                "analysis",
                "analysis",
                "planning",
                "verification",
                "summarization"
            ]
        );
    }

    #[tokio::test]
    async fn test_replay_verify_surfaces_the_verdict() {
        let h = harness(vec![verification_ok()]).await;
        let step = Step {
            step_number: 1,
            action: "lookup".to_string(),
            tool: "quickLookup".to_string(),
            parameters: serde_json::Map::new(),
            expected_output: String::new(),
            dependencies: vec![],
        };
        h.queue
            .enqueue(
                Uuid::new_v4(),
                QueuedStage::Verify {
                    results: vec![StepResult::success(&step, "quickLookup", json!({"ok": true}), 5)],
                    criteria: vec!["the answer names a source".to_string()],
                },
            )
            .await;

        let report = h.queue.drain(&h.pipeline).await;

        assert_eq!(report.replayed, 1);
        assert!(h.queue.is_empty().await);
        let notices = h.notifier.notices().await;
        assert!(notices
            .iter()
            .any(|(level, message)| *level == NoticeLevel::Info
                && message.contains("verification finished")
                && message.contains("quality 90")));
    }

    #[tokio::test]
    async fn test_blank_goal_is_rejected() {
        let h = harness(vec![]).await;
        let err = h.pipeline.process_goal("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.provider.call_types().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_abort_still_verifies_partial_results() {
        let h = harness(vec![
            analysis_ok(),
            plan_ok(&["f1", "f2", "f3", "quickLookup"]),
            Ok(InferenceResponse::Json(json!({
                "overall_success": false,
                "quality_score": 20,
                "criteria_failed": ["the answer names a source"]
            }))),
            summary_ok(),
        ])
        .await;
        register_failing(&h.registry, "f1", || {
            AgentError::Tool("boom".to_string()).into()
        })
        .await;
        register_failing(&h.registry, "f2", || {
            AgentError::Tool("boom".to_string()).into()
        })
        .await;
        register_failing(&h.registry, "f3", || {
            AgentError::Tool("boom".to_string()).into()
        })
        .await;
        register_tool(&h.registry, "quickLookup", json!({"answer": 42})).await;

        let outcome = h.pipeline.process_goal("research rust agents").await.unwrap();

        let report = match outcome {
            GoalOutcome::Completed(report) => report,
            other => panic!("expected completed outcome, got {:?}", other),
        };
        // Three failures hit the abort threshold; verify still ran on the
        // partial results.
        assert_eq!(report.results.len(), 3);
        assert!(report.results.iter().all(|r| !r.success));
        assert!(!report.success);
        assert_eq!(report.delivery.metrics.steps_completed, 0);
        assert!(h
            .provider
            .call_types()
            .contains(&"verification".to_string()));
    }

    #[tokio::test]
    async fn test_critical_tool_failure_fails_the_goal() {
        let h = harness(vec![analysis_ok(), plan_ok(&["apiConnector"])]).await;
        register_failing(&h.registry, "apiConnector", || {
            AgentError::Critical("credentials revoked".to_string()).into()
        })
        .await;

        let err = h.pipeline.process_goal("sync the crm").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Critical);
        assert!(err.to_string().contains("credentials revoked"));
        let events = h.trace.events().await;
        assert!(events
            .iter()
            .any(|e| e.status == TraceStatus::Error && e.event.contains("aborted")));
    }

    #[test]
    fn test_plan_prompt_advertises_catalog_and_cap() {
        use crate::registry::{RiskLevel, ToolInfo};

        let catalog = vec![ToolInfo {
            name: "searchWeb".to_string(),
            description: "Web search returning ranked results".to_string(),
            category: ToolCategory::Search,
            risk: RiskLevel::Low,
            requires_network: true,
            module: "search".to_string(),
            call_count: 0,
        }];
        let analysis = Analysis {
            goal_type: "research".to_string(),
            complexity: "medium".to_string(),
            success_criteria: vec!["cites a source".to_string()],
            ..Analysis::default()
        };
        let mode = EfficiencyMode::default();

        let prompt = prompts::plan(&analysis, &catalog, &mode);
        assert!(prompt.contains("- searchWeb [search]: Web search returning ranked results"));
        assert!(prompt.contains("at most 10 steps"));
        assert!(prompt.contains("cites a source"));
    }
}
