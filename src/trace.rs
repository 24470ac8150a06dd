//! Outbound capabilities: reasoning trace, usage dashboard, and user notices.
//!
//! The core never reaches into ambient global state to surface progress.
//! These sinks are injected where execution happens (pipeline, registry,
//! accountant) and every emission is fire-and-forget: a sink failure is
//! logged and swallowed, never propagated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Status attached to a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Active,
    Completed,
    Error,
}

/// One reasoning-trace event (stage transition or tool attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Human-readable description of what is happening.
    pub event: String,
    /// Stage or tool the event belongs to.
    pub tool: String,
    pub status: TraceStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl TraceEvent {
    pub fn new(event: impl Into<String>, tool: impl Into<String>, status: TraceStatus) -> Self {
        Self {
            event: event.into(),
            tool: tool.into(),
            status,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Usage counters pushed after every stats mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageUpdate {
    pub tokens: u64,
    pub cost: f64,
    pub tool_calls: u64,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn emit(&self, event: TraceEvent) -> anyhow::Result<()>;
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn usage_updated(&self, update: UsageUpdate) -> anyhow::Result<()>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, level: NoticeLevel, message: &str) -> anyhow::Result<()>;
}

/// Emit a trace event, swallowing sink failures.
pub async fn emit_trace(sink: &Arc<dyn TraceSink>, event: TraceEvent) {
    if let Err(e) = sink.emit(event).await {
        tracing::debug!("Trace sink rejected event: {}", e);
    }
}

/// Push a usage update, swallowing sink failures.
pub async fn emit_usage(sink: &Arc<dyn UsageSink>, update: UsageUpdate) {
    if let Err(e) = sink.usage_updated(update).await {
        tracing::debug!("Usage sink rejected update: {}", e);
    }
}

/// Send a notice, swallowing sink failures.
pub async fn notify(sink: &Arc<dyn NotificationSink>, level: NoticeLevel, message: &str) {
    if let Err(e) = sink.notify(level, message).await {
        tracing::debug!("Notification sink rejected notice: {}", e);
    }
}

// ============================================================================
// Log-backed defaults
// ============================================================================

/// Default trace sink: forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogTrace;

#[async_trait]
impl TraceSink for LogTrace {
    async fn emit(&self, event: TraceEvent) -> anyhow::Result<()> {
        match event.status {
            TraceStatus::Error => {
                tracing::warn!(tool = %event.tool, "{}", event.event)
            }
            _ => tracing::info!(tool = %event.tool, status = ?event.status, "{}", event.event),
        }
        Ok(())
    }
}

/// Default usage sink: logs the running counters at debug level.
#[derive(Debug, Default)]
pub struct LogUsage;

#[async_trait]
impl UsageSink for LogUsage {
    async fn usage_updated(&self, update: UsageUpdate) -> anyhow::Result<()> {
        tracing::debug!(
            tokens = update.tokens,
            cost = update.cost,
            tool_calls = update.tool_calls,
            "usage updated"
        );
        Ok(())
    }
}

/// Default notification sink: logs notices at their severity.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, level: NoticeLevel, message: &str) -> anyhow::Result<()> {
        match level {
            NoticeLevel::Info => tracing::info!("{}", message),
            NoticeLevel::Warning => tracing::warn!("{}", message),
            NoticeLevel::Error => tracing::error!("{}", message),
        }
        Ok(())
    }
}

// ============================================================================
// In-memory sinks (embedding UIs and tests)
// ============================================================================

/// Trace sink retaining events in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryTrace {
    events: RwLock<Vec<TraceEvent>>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<TraceEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl TraceSink for MemoryTrace {
    async fn emit(&self, event: TraceEvent) -> anyhow::Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Notification sink retaining notices in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: RwLock<Vec<(NoticeLevel, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifier {
    async fn notify(&self, level: NoticeLevel, message: &str) -> anyhow::Result<()> {
        self.notices.write().await.push((level, message.to_string()));
        Ok(())
    }
}
