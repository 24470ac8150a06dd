//! goalpilot - CLI entry point
//!
//! Runs one goal through the full pipeline and prints the outcome as JSON.

use std::sync::Arc;
use std::time::Duration;

use goalpilot::cache::{spawn_sweeper, CacheStore};
use goalpilot::config::Config;
use goalpilot::connectivity::ConnectivityMonitor;
use goalpilot::executor::ExecutionPolicy;
use goalpilot::inference::gemini::GeminiClient;
use goalpilot::modes::ModeCatalog;
use goalpilot::pipeline::GoalPipeline;
use goalpilot::pricing::AUTO_ALIAS;
use goalpilot::queue::{spawn_reconnect_drain, OfflineQueue};
use goalpilot::registry::ToolRegistry;
use goalpilot::settings::SettingsStore;
use goalpilot::tools::builtin_modules;
use goalpilot::trace::{LogNotifier, LogUsage};
use goalpilot::usage::UsageAccountant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goalpilot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        anyhow::bail!("usage: goalpilot <goal text>");
    }

    // Load configuration
    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let modes = Arc::new(match &config.modes_file {
        Some(path) => ModeCatalog::from_yaml_file(path)?,
        None => ModeCatalog::builtin(),
    });
    let settings = Arc::new(SettingsStore::new(&config.data_dir).await);
    let cache = Arc::new(CacheStore::with_persistence(
        config.data_dir.join("cache.json"),
    ));
    let connectivity = Arc::new(ConnectivityMonitor::online());
    let registry = Arc::new(ToolRegistry::with_modules(&builtin_modules()).await);
    let accountant = Arc::new(UsageAccountant::new(
        settings.clone(),
        modes.clone(),
        Arc::new(LogUsage),
    ));
    let queue = Arc::new(OfflineQueue::with_limits(
        cache.clone(),
        Arc::new(LogNotifier),
        config.queue_ttl_minutes,
        config.queue_max_retries,
    ));

    // The active mode may pin a model; `auto` defers to the configured one.
    let current = settings.get().await;
    let mode = modes.get_or_default(&current.efficiency_mode);
    let model = if mode.preferred_model == AUTO_ALIAS {
        current.ai_model.clone()
    } else {
        mode.preferred_model.clone()
    };
    info!(
        "Using model {} (mode {}, {} plan steps max)",
        model, current.efficiency_mode, mode.max_plan_steps
    );
    let provider = Arc::new(GeminiClient::new(&config, model)?);

    let pipeline = Arc::new(GoalPipeline::new(
        provider,
        registry,
        cache.clone(),
        connectivity.clone(),
        queue.clone(),
        accountant.clone(),
        settings,
        modes,
        ExecutionPolicy::from_config(&config),
    ));

    spawn_sweeper(
        cache.clone(),
        Duration::from_secs(config.cache_sweep_minutes * 60),
    );
    spawn_reconnect_drain(queue.clone(), &connectivity, pipeline.clone());

    let outcome = pipeline.process_goal(&goal).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    let stats = accountant.snapshot().await;
    info!(
        "Session usage: {} tokens, {} tool calls, estimated cost {}",
        stats.tokens_used, stats.tool_calls, stats.estimated_cost
    );
    if !queue.is_empty().await {
        info!(
            "{} request(s) remain queued offline; they replay when connectivity returns",
            queue.len().await
        );
    }

    Ok(())
}
