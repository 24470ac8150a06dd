//! Offline request queue: deferred pipeline stages awaiting reconnect.
//!
//! A connectivity failure during a reasoning stage snapshots just enough
//! state to replay that stage later. The queue lives in the CacheStore under
//! one fixed key with a long TTL, since it represents user intent that must
//! survive extended disconnection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::connectivity::ConnectivityMonitor;
use crate::error::AgentError;
use crate::plan::{Analysis, StepResult};
use crate::trace::{notify, NoticeLevel, NotificationSink};

/// Fixed CacheStore key holding the serialized queue.
pub const OFFLINE_QUEUE_KEY: &str = "offline_request_queue";

/// Replay attempts before an entry is dropped.
pub const OFFLINE_QUEUE_MAX_RETRIES: u32 = 5;

/// Queue TTL: one week.
pub const OFFLINE_QUEUE_TTL_MINUTES: i64 = 7 * 24 * 60;

/// Stage snapshot sufficient to replay the deferred inference call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "original_action")]
pub enum QueuedStage {
    #[serde(rename = "analyzeGoal")]
    Analyze { goal: String },
    #[serde(rename = "generatePlan")]
    Plan { analysis: Analysis },
    #[serde(rename = "verifyResults")]
    Verify {
        results: Vec<StepResult>,
        criteria: Vec<String>,
    },
}

impl QueuedStage {
    /// Replay entry point this snapshot belongs to.
    pub fn original_action(&self) -> &'static str {
        match self {
            QueuedStage::Analyze { .. } => "analyzeGoal",
            QueuedStage::Plan { .. } => "generatePlan",
            QueuedStage::Verify { .. } => "verifyResults",
        }
    }

    /// Call-type tag the provider receives on replay.
    pub fn call_type(&self) -> &'static str {
        match self {
            QueuedStage::Analyze { .. } => "analysis",
            QueuedStage::Plan { .. } => "planning",
            QueuedStage::Verify { .. } => "verification",
        }
    }
}

/// One deferred stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: Uuid,
    /// Correlates the entry with the `process_goal` invocation that
    /// deferred it.
    pub goal_id: Uuid,
    #[serde(rename = "type")]
    pub request_type: String,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(flatten)]
    pub stage: QueuedStage,
}

impl QueuedRequest {
    pub fn new(goal_id: Uuid, stage: QueuedStage) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal_id,
            request_type: "inference".to_string(),
            queued_at: Utc::now(),
            attempts: 0,
            stage,
        }
    }
}

/// Replays one deferred stage. Implemented by the pipeline.
#[async_trait]
pub trait StageReplayer: Send + Sync {
    async fn replay(&self, request: &QueuedRequest) -> Result<(), AgentError>;
}

/// Counters from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

/// CacheStore-backed queue of deferred stages.
pub struct OfflineQueue {
    store: Arc<CacheStore>,
    notifications: Arc<dyn NotificationSink>,
    ttl_minutes: i64,
    max_retries: u32,
    draining: AtomicBool,
}

impl OfflineQueue {
    pub fn new(store: Arc<CacheStore>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self::with_limits(
            store,
            notifications,
            OFFLINE_QUEUE_TTL_MINUTES,
            OFFLINE_QUEUE_MAX_RETRIES,
        )
    }

    pub fn with_limits(
        store: Arc<CacheStore>,
        notifications: Arc<dyn NotificationSink>,
        ttl_minutes: i64,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            notifications,
            ttl_minutes,
            max_retries,
            draining: AtomicBool::new(false),
        }
    }

    /// Append a deferred stage, refreshing the queue TTL.
    pub async fn enqueue(&self, goal_id: Uuid, stage: QueuedStage) -> QueuedRequest {
        let request = QueuedRequest::new(goal_id, stage);
        let mut entries = self.entries().await;
        entries.push(request.clone());
        self.save(entries).await;
        tracing::info!(
            action = request.stage.original_action(),
            goal_id = %goal_id,
            "Queued request for reconnect replay"
        );
        request
    }

    /// Current entries, FIFO order. An unreadable blob counts as empty.
    pub async fn entries(&self) -> Vec<QueuedRequest> {
        match self.store.get(OFFLINE_QUEUE_KEY).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Offline queue blob is unreadable ({}), treating as empty", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries().await.is_empty()
    }

    /// Whether anything belonging to this goal invocation is still queued.
    pub async fn has_entries_for_goal(&self, goal_id: Uuid) -> bool {
        self.entries().await.iter().any(|e| e.goal_id == goal_id)
    }

    pub async fn clear(&self) {
        self.store.delete(OFFLINE_QUEUE_KEY).await;
    }

    async fn save(&self, entries: Vec<QueuedRequest>) {
        if entries.is_empty() {
            self.store.delete(OFFLINE_QUEUE_KEY).await;
            return;
        }
        match serde_json::to_value(&entries) {
            Ok(blob) => self.store.set(OFFLINE_QUEUE_KEY, blob, self.ttl_minutes).await,
            Err(e) => tracing::warn!("Could not serialize offline queue: {}", e),
        }
    }

    /// Replay queued entries through `replayer`, one pass, FIFO.
    ///
    /// A successful replay removes the entry. A failed replay increments its
    /// attempt count; an entry reaching the retry cap is dropped with a
    /// terminal notification. A connectivity failure ends the pass (still
    /// offline), leaving later entries untouched. At most one pass runs at a
    /// time; an overlapping call returns without touching the queue.
    pub async fn drain(&self, replayer: &dyn StageReplayer) -> DrainReport {
        if self.draining.swap(true, Ordering::SeqCst) {
            tracing::debug!("Queue drain already in progress");
            return DrainReport {
                remaining: self.len().await,
                ..DrainReport::default()
            };
        }

        let snapshot = self.entries().await;
        let snapshot_ids: HashSet<Uuid> = snapshot.iter().map(|e| e.id).collect();
        let mut report = DrainReport::default();
        let mut kept: Vec<QueuedRequest> = Vec::new();
        let mut pending = snapshot.into_iter();

        while let Some(mut request) = pending.next() {
            let outcome = replayer.replay(&request).await;
            match outcome {
                Ok(()) => {
                    tracing::info!(
                        action = request.stage.original_action(),
                        "Replayed queued request"
                    );
                    report.replayed += 1;
                }
                Err(err) => {
                    request.attempts += 1;
                    let still_offline = err.is_connectivity();
                    if request.attempts >= self.max_retries {
                        report.dropped += 1;
                        notify(
                            &self.notifications,
                            NoticeLevel::Warning,
                            &format!(
                                "Dropped queued {} request after {} failed replays: {}",
                                request.stage.original_action(),
                                request.attempts,
                                err
                            ),
                        )
                        .await;
                    } else {
                        kept.push(request);
                    }
                    if still_offline {
                        // Pass over; the rest stays as-is.
                        kept.extend(pending);
                        break;
                    }
                }
            }
        }

        // Entries enqueued while the pass ran are preserved.
        let enqueued_meanwhile: Vec<QueuedRequest> = self
            .entries()
            .await
            .into_iter()
            .filter(|e| !snapshot_ids.contains(&e.id))
            .collect();
        kept.extend(enqueued_meanwhile);

        report.remaining = kept.len();
        self.save(kept).await;
        self.draining.store(false, Ordering::SeqCst);
        report
    }
}

/// Watch connectivity and run one drain pass per offline→online transition.
pub fn spawn_reconnect_drain(
    queue: Arc<OfflineQueue>,
    monitor: &ConnectivityMonitor,
    replayer: Arc<dyn StageReplayer>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = monitor.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if online {
                let report = queue.drain(replayer.as_ref()).await;
                if report.replayed + report.dropped > 0 {
                    tracing::info!(
                        replayed = report.replayed,
                        dropped = report.dropped,
                        remaining = report.remaining,
                        "Offline queue drained"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemoryNotifier;
    use std::sync::atomic::AtomicUsize;

    fn queue_with(
        max_retries: u32,
    ) -> (Arc<OfflineQueue>, Arc<CacheStore>, Arc<MemoryNotifier>) {
        let store = Arc::new(CacheStore::in_memory());
        let notifier = Arc::new(MemoryNotifier::new());
        let queue = Arc::new(OfflineQueue::with_limits(
            store.clone(),
            notifier.clone(),
            OFFLINE_QUEUE_TTL_MINUTES,
            max_retries,
        ));
        (queue, store, notifier)
    }

    struct ScriptedReplayer {
        // One outcome per replay call, reused last when exhausted.
        outcomes: Vec<Option<AgentError>>,
        calls: AtomicUsize,
    }

    impl ScriptedReplayer {
        fn always_ok() -> Self {
            Self {
                outcomes: vec![None],
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_with(err: AgentError) -> Self {
            Self {
                outcomes: vec![Some(err)],
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StageReplayer for ScriptedReplayer {
        async fn replay(&self, _request: &QueuedRequest) -> Result<(), AgentError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcomes
                .get(index)
                .or_else(|| self.outcomes.last())
                .cloned()
                .flatten();
            match outcome {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_enqueue_snapshots_the_stage() {
        let (queue, _store, _notifier) = queue_with(5);
        let goal_id = Uuid::new_v4();

        queue
            .enqueue(
                goal_id,
                QueuedStage::Analyze {
                    goal: "summarize rust agent crates".to_string(),
                },
            )
            .await;

        let entries = queue.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].goal_id, goal_id);
        assert_eq!(entries[0].attempts, 0);
        assert_eq!(entries[0].stage.original_action(), "analyzeGoal");
        match &entries[0].stage {
            QueuedStage::Analyze { goal } => assert_eq!(goal, "summarize rust agent crates"),
            other => panic!("unexpected stage {:?}", other),
        }
        assert!(queue.has_entries_for_goal(goal_id).await);
        assert!(!queue.has_entries_for_goal(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_queue_blob_wire_format() {
        let (queue, store, _notifier) = queue_with(5);
        queue
            .enqueue(Uuid::new_v4(), QueuedStage::Analyze { goal: "g".into() })
            .await;

        let blob = store.get(OFFLINE_QUEUE_KEY).await.unwrap();
        let first = &blob.as_array().unwrap()[0];
        assert_eq!(first["type"], "inference");
        assert_eq!(first["original_action"], "analyzeGoal");
        assert_eq!(first["goal"], "g");
    }

    #[tokio::test]
    async fn test_successful_replay_removes_entry() {
        let (queue, _store, _notifier) = queue_with(5);
        queue
            .enqueue(Uuid::new_v4(), QueuedStage::Analyze { goal: "g".into() })
            .await;

        let replayer = ScriptedReplayer::always_ok();
        let report = queue.drain(&replayer).await;

        assert_eq!(report.replayed, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.remaining, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_with_notification() {
        let (queue, _store, notifier) = queue_with(2);
        queue
            .enqueue(Uuid::new_v4(), QueuedStage::Analyze { goal: "g".into() })
            .await;

        let replayer =
            ScriptedReplayer::failing_with(AgentError::Inference("model refused".into()));

        let report = queue.drain(&replayer).await;
        assert_eq!(report.dropped, 0);
        assert_eq!(queue.entries().await[0].attempts, 1);

        let report = queue.drain(&replayer).await;
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty().await);

        let notices = notifier.notices().await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeLevel::Warning);
        assert!(notices[0].1.contains("analyzeGoal"));
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_connectivity_failure_ends_the_pass() {
        let (queue, _store, _notifier) = queue_with(5);
        let goal = Uuid::new_v4();
        queue
            .enqueue(goal, QueuedStage::Analyze { goal: "first".into() })
            .await;
        queue
            .enqueue(goal, QueuedStage::Analyze { goal: "second".into() })
            .await;

        let replayer =
            ScriptedReplayer::failing_with(AgentError::Connectivity("still offline".into()));
        let report = queue.drain(&replayer).await;

        // Only the head was attempted.
        assert_eq!(replayer.call_count(), 1);
        assert_eq!(report.replayed, 0);
        assert_eq!(report.remaining, 2);

        let entries = queue.entries().await;
        assert_eq!(entries[0].attempts, 1);
        assert_eq!(entries[1].attempts, 0);
    }

    #[tokio::test]
    async fn test_overlapping_drains_are_rejected() {
        let (queue, _store, _notifier) = queue_with(5);
        queue
            .enqueue(Uuid::new_v4(), QueuedStage::Analyze { goal: "g".into() })
            .await;

        struct YieldingReplayer;

        #[async_trait]
        impl StageReplayer for YieldingReplayer {
            async fn replay(&self, _request: &QueuedRequest) -> Result<(), AgentError> {
                tokio::task::yield_now().await;
                Ok(())
            }
        }

        let replayer = YieldingReplayer;
        let (first, second) = tokio::join!(queue.drain(&replayer), queue.drain(&replayer));

        // Exactly one pass replayed the entry; the other bounced off the guard.
        assert_eq!(first.replayed + second.replayed, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_reconnect_transition_triggers_drain() {
        let (queue, _store, _notifier) = queue_with(5);
        queue
            .enqueue(Uuid::new_v4(), QueuedStage::Analyze { goal: "g".into() })
            .await;

        let monitor = ConnectivityMonitor::new(false);
        let replayer = Arc::new(ScriptedReplayer::always_ok());
        let handle = spawn_reconnect_drain(queue.clone(), &monitor, replayer.clone());

        monitor.set_online();
        // Give the drain task a chance to observe the transition.
        for _ in 0..50 {
            if queue.is_empty().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert!(queue.is_empty().await);
        assert_eq!(replayer.call_count(), 1);
        handle.abort();
    }
}
