//! Analysis modules.
//!
//! The orchestrator fans chunks out to the backend; the aggregator merges
//! what comes back.

pub mod aggregator;
pub mod orchestrator;

pub use aggregator::{AggregatorConfig, ResultAggregator};
pub use orchestrator::{AnalysisOrchestrator, OrchestratorConfig};
