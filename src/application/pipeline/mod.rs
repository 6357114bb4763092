pub mod orchestrator;
pub mod repair_loop;
pub mod runner;

pub use orchestrator::{PipelineConfig, PipelineOrchestrator, PipelineServices, RunRequest};
pub use repair_loop::{RepairContext, RepairLoop, RepairLoopConfig, RepairOutcome};
pub use runner::PipelineRunner;
