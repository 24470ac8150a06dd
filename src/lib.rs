//! # goalpilot
//!
//! Autonomous goal agent core: turns a free-form goal into an analyzed,
//! planned, executed, verified, and summarized delivery.
//!
//! This library provides:
//! - A five-stage pipeline with offline deferral for the reasoning stages
//! - A plan executor with tool fallback, failure thresholds, and an offline
//!   cache path for repeatable tools
//! - A persistent request queue that replays deferred stages on reconnect
//! - A tool registry with per-module registration and risk gating
//!
//! ## Goal Flow
//!
//! ```text
//! ANALYZE ──► PLAN ──► EXECUTE ──► VERIFY ──► DELIVER
//!    │          │                     │          │
//!    └──────────┴── offline queue ────┘          └── partial package
//!                 (replayed on reconnect)          (summary skipped offline)
//! ```
//!
//! Connectivity loss during analyze, plan, or verify defers the stage into
//! the offline queue and the goal comes back as accepted-and-deferred.
//! Execute never needs deferral (cache or local tools cover the offline
//! case per step) and deliver ships whatever was computed.
//!
//! ## Modules
//! - `pipeline`: stage orchestration and goal outcomes
//! - `executor`: plan execution with fallback and caching
//! - `queue`: offline request queue and reconnect drain
//! - `registry` / `tools`: tool catalog and the builtin modules

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod inference;
pub mod modes;
pub mod pipeline;
pub mod plan;
pub mod pricing;
pub mod queue;
pub mod registry;
pub mod settings;
pub mod tools;
pub mod trace;
pub mod usage;

pub use config::Config;
pub use error::{AgentError, ErrorKind};
pub use pipeline::{GoalOutcome, GoalPipeline, GoalReport};
pub use settings::{Settings, SettingsStore};
