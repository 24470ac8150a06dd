//! Tool catalog and execution wrapper.
//!
//! The registry owns per-tool call counters and the append-only execution
//! history. Its `execute` boundary never propagates an error: every outcome
//! comes back as a [`ToolExecution`] envelope with a success flag and, on
//! failure, the classified error kind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{classify_tool_failure, ErrorKind};
use crate::inference::InferenceProvider;
use crate::pricing::round2;
use crate::trace::{LogNotifier, LogTrace, NotificationSink, TraceSink};

/// Tool category taxonomy, used for catalog grouping and usage aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Search,
    Content,
    Analysis,
    Automation,
    Productivity,
    Security,
    Integration,
    System,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolCategory::Search => "search",
            ToolCategory::Content => "content",
            ToolCategory::Analysis => "analysis",
            ToolCategory::Automation => "automation",
            ToolCategory::Productivity => "productivity",
            ToolCategory::Security => "security",
            ToolCategory::Integration => "integration",
            ToolCategory::System => "system",
        };
        write!(f, "{}", name)
    }
}

/// Risk tier gating execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Registration metadata for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub risk: RiskLevel,
    /// Whether the body reaches over the network. Declared here so callers
    /// never infer connectivity needs from the tool's name.
    pub requires_network: bool,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            risk: RiskLevel::Low,
            requires_network: false,
        }
    }

    pub fn high_risk(mut self) -> Self {
        self.risk = RiskLevel::High;
        self
    }

    pub fn medium_risk(mut self) -> Self {
        self.risk = RiskLevel::Medium;
        self
    }

    pub fn requires_network(mut self) -> Self {
        self.requires_network = true;
        self
    }
}

/// Capabilities available to a tool body during execution. Bodies surface
/// progress through these injected sinks, never through ambient state.
#[derive(Clone)]
pub struct ToolContext {
    pub high_risk_enabled: bool,
    pub trace: Arc<dyn TraceSink>,
    pub notifications: Arc<dyn NotificationSink>,
    /// Handle for the direct-inference tool; absent in offline test wiring.
    pub provider: Option<Arc<dyn InferenceProvider>>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self {
            high_risk_enabled: false,
            trace: Arc::new(LogTrace),
            notifications: Arc::new(LogNotifier),
            provider: None,
        }
    }

    pub fn with_high_risk(mut self, enabled: bool) -> Self {
        self.high_risk_enabled = enabled;
        self
    }

    pub fn with_sinks(
        mut self,
        trace: Arc<dyn TraceSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        self.trace = trace;
        self.notifications = notifications;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool body. Bodies may fail freely; the registry wraps them and the body
/// knows nothing of caching or retry.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn execute(&self, parameters: &Value, ctx: &ToolContext) -> anyhow::Result<Value>;
}

/// One tool ready for registration.
pub struct ToolRegistration {
    pub spec: ToolSpec,
    pub body: Arc<dyn Tool>,
}

impl ToolRegistration {
    pub fn new(spec: ToolSpec, body: Arc<dyn Tool>) -> Self {
        Self { spec, body }
    }
}

/// A compile-time tool bundle. `builtin_modules` in the tools module is the
/// static registration list; there is no runtime code loading.
pub trait ToolModule: Send + Sync {
    fn name(&self) -> &'static str;
    fn tools(&self) -> Vec<ToolRegistration>;
}

/// Catalog row exposed to callers: metadata and live counters, never the
/// callable.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub risk: RiskLevel,
    pub requires_network: bool,
    pub module: String,
    pub call_count: u64,
}

/// Envelope returned by [`ToolRegistry::execute`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecution {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetadata {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub execution_time_ms: u64,
    pub call_count: u64,
}

impl ToolExecution {
    fn not_found(name: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(format!("Tool not found: {}", name)),
            error_kind: Some(ErrorKind::Tool),
            metadata: ExecutionMetadata {
                tool: name.to_string(),
                module: None,
                execution_time_ms: 0,
                call_count: 0,
            },
        }
    }

    fn permission_denied(spec: &ToolSpec, module: &str, call_count: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(format!(
                "Tool '{}' is high-risk and high-risk tools are not enabled",
                spec.name
            )),
            error_kind: Some(ErrorKind::Permission),
            metadata: ExecutionMetadata {
                tool: spec.name.clone(),
                module: Some(module.to_string()),
                execution_time_ms: 0,
                call_count,
            },
        }
    }
}

/// One line of the append-only execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool: String,
    pub module: String,
    pub category: ToolCategory,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-tool or per-category usage totals.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ToolUsage {
    pub calls: usize,
    pub errors: usize,
    pub total_time_ms: u64,
}

/// Aggregated view over the execution history. Zero/empty when nothing has
/// run yet; never an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_calls: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of invocations that succeeded; 0 with no history.
    pub success_rate: f64,
    pub avg_execution_time_ms: f64,
    pub by_tool: HashMap<String, ToolUsage>,
    pub by_category: HashMap<String, ToolUsage>,
    pub most_used_tool: Option<String>,
}

struct ToolEntry {
    spec: ToolSpec,
    module: String,
    body: Arc<dyn Tool>,
    call_count: u64,
}

/// Catalog of named tools plus the uniform execution wrapper.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolEntry>>,
    history: RwLock<Vec<ExecutionRecord>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Registry preloaded with every builtin module.
    pub async fn with_modules(modules: &[Box<dyn ToolModule>]) -> Self {
        let registry = Self::new();
        for module in modules {
            registry.register_module(module.as_ref()).await;
        }
        registry
    }

    /// Add or replace a tool entry. Idempotent by name; replacing resets the
    /// entry's call counter.
    pub async fn register(&self, module: &str, registration: ToolRegistration) {
        let mut tools = self.tools.write().await;
        let name = registration.spec.name.clone();
        let replaced = tools
            .insert(
                name.clone(),
                ToolEntry {
                    spec: registration.spec,
                    module: module.to_string(),
                    body: registration.body,
                    call_count: 0,
                },
            )
            .is_some();
        if replaced {
            tracing::debug!("Replaced tool registration '{}'", name);
        }
    }

    /// Register everything a module yields.
    pub async fn register_module(&self, module: &dyn ToolModule) {
        let registrations = module.tools();
        let count = registrations.len();
        for registration in registrations {
            self.register(module.name(), registration).await;
        }
        tracing::debug!("Registered module '{}' ({} tools)", module.name(), count);
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Whether the tool's body reaches over the network. Unknown tools
    /// report `false`; they fail at execution instead.
    pub async fn requires_network(&self, name: &str) -> bool {
        self.tools
            .read()
            .await
            .get(name)
            .map(|entry| entry.spec.requires_network)
            .unwrap_or(false)
    }

    /// Run a tool through the wrapper.
    ///
    /// Rejection paths (unknown tool, permission gate) are side-effect-free:
    /// no counter bump, no history entry, the body never runs. An invoked
    /// body always leaves exactly one history entry, success or failure.
    pub async fn execute(&self, name: &str, parameters: &Value, ctx: &ToolContext) -> ToolExecution {
        let (spec, module, body, call_count) = {
            let mut tools = self.tools.write().await;
            let Some(entry) = tools.get_mut(name) else {
                tracing::debug!("Requested unknown tool '{}'", name);
                return ToolExecution::not_found(name);
            };
            if entry.spec.risk == RiskLevel::High && !ctx.high_risk_enabled {
                tracing::debug!("Rejected high-risk tool '{}'", name);
                return ToolExecution::permission_denied(&entry.spec, &entry.module, entry.call_count);
            }
            entry.call_count += 1;
            (
                entry.spec.clone(),
                entry.module.clone(),
                entry.body.clone(),
                entry.call_count,
            )
        };

        let started = Instant::now();
        let outcome = body.execute(parameters, ctx).await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        let (record, execution) = match outcome {
            Ok(data) => (
                ExecutionRecord {
                    tool: spec.name.clone(),
                    module: module.clone(),
                    category: spec.category,
                    success: true,
                    error: None,
                    execution_time_ms,
                    timestamp: Utc::now(),
                },
                ToolExecution {
                    success: true,
                    data: Some(data),
                    error: None,
                    error_kind: None,
                    metadata: ExecutionMetadata {
                        tool: spec.name,
                        module: Some(module),
                        execution_time_ms,
                        call_count,
                    },
                },
            ),
            Err(err) => {
                let kind = classify_tool_failure(&err);
                let message = format!("{:#}", err);
                tracing::warn!("Tool '{}' failed ({}): {}", spec.name, kind, message);
                (
                    ExecutionRecord {
                        tool: spec.name.clone(),
                        module: module.clone(),
                        category: spec.category,
                        success: false,
                        error: Some(message.clone()),
                        execution_time_ms,
                        timestamp: Utc::now(),
                    },
                    ToolExecution {
                        success: false,
                        data: None,
                        error: Some(message),
                        error_kind: Some(kind),
                        metadata: ExecutionMetadata {
                            tool: spec.name,
                            module: Some(module),
                            execution_time_ms,
                            call_count,
                        },
                    },
                )
            }
        };

        self.history.write().await.push(record);
        execution
    }

    /// Catalog with live call counts, sorted by name.
    pub async fn tool_list(&self) -> Vec<ToolInfo> {
        let tools = self.tools.read().await;
        let mut list: Vec<ToolInfo> = tools
            .values()
            .map(|entry| ToolInfo {
                name: entry.spec.name.clone(),
                description: entry.spec.description.clone(),
                category: entry.spec.category,
                risk: entry.spec.risk,
                requires_network: entry.spec.requires_network,
                module: entry.module.clone(),
                call_count: entry.call_count,
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Catalog keyed by tool name.
    pub async fn all_tools(&self) -> HashMap<String, ToolInfo> {
        self.tool_list()
            .await
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Aggregate the execution history.
    pub async fn usage_stats(&self) -> UsageStats {
        let history = self.history.read().await;
        if history.is_empty() {
            return UsageStats::default();
        }

        let mut stats = UsageStats {
            total_calls: history.len(),
            ..UsageStats::default()
        };
        let mut total_time: u64 = 0;

        for record in history.iter() {
            if record.success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            total_time += record.execution_time_ms;

            let tool = stats.by_tool.entry(record.tool.clone()).or_default();
            tool.calls += 1;
            tool.total_time_ms += record.execution_time_ms;
            if !record.success {
                tool.errors += 1;
            }

            let category = stats
                .by_category
                .entry(record.category.to_string())
                .or_default();
            category.calls += 1;
            category.total_time_ms += record.execution_time_ms;
            if !record.success {
                category.errors += 1;
            }
        }

        stats.success_rate = round2(stats.successful as f64 / stats.total_calls as f64 * 100.0);
        stats.avg_execution_time_ms = round2(total_time as f64 / stats.total_calls as f64);
        stats.most_used_tool = stats
            .by_tool
            .iter()
            .max_by_key(|(name, usage)| (usage.calls, std::cmp::Reverse(name.as_str())))
            .map(|(name, _)| name.clone());
        stats
    }

    /// Read-only view of the execution history.
    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.history.read().await.clone()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
