//! # Morphos Engine
//!
//! Drives the evolution cycle: reads platform state, applies one operator,
//! folds in controller feedback and periodic sweet-spot searches, and commits
//! the result back to the state store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     EvolutionCycle                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐   │
//! │  │  Operator    │  │ Hierarchical │  │ SweetSpot     │   │
//! │  │  Selector    │  │ Controller   │  │ Finder        │   │
//! │  └──────┬───────┘  └──────┬───────┘  └───────┬───────┘   │
//! │         │                 │                  │           │
//! │  ┌──────┴─────────────────┴──────────────────┴───────┐   │
//! │  │        StateStore (versioned snapshot/commit)     │   │
//! │  └───────────────────────────────────────────────────┘   │
//! │  ┌─────────────────────┐  ┌─────────────────────────┐    │
//! │  │ OperatorLog (JSONL) │  │ DiscoveryLedger (JSONL) │    │
//! │  └─────────────────────┘  └─────────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A one-shot `morphos cycle` invocation is idempotent with respect to the
//! persisted state; `morphos run` keeps the controller tiers alive between
//! cycles.

pub mod config;
pub mod domain;
pub mod infra;
pub mod runtime;

pub use config::EngineConfig;
pub use domain::cycle::{ControllerMode, CycleComponents, CycleReport, EvolutionCycle};
pub use infra::operator_log::{OperatorLog, OperatorRecord};
pub use infra::state_store::{
    retry_on_conflict, InMemoryStateStore, JsonFileStateStore, StateStore, Versioned,
};
pub use runtime::{log_filter, CycleMetrics, Daemon};
