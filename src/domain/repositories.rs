//! Repository abstractions for pipeline results
//!
//! The orchestrator persists each run once, when it reaches a terminal status.
//! Implementations must store strict JSON only: callers sanitize before saving,
//! and stores sanitize again so a non-finite number can never reach disk.
//!
//! # Example
//!
//! ```rust,no_run
//! use stratforge::domain::repositories::ResultStore;
//! use stratforge::infrastructure::persistence::InMemoryResultStore;
//!
//! # async {
//! let store = InMemoryResultStore::new();
//! // store.save(&run).await?;
//! // let runs = store.list_runs(&RunFilter::default()).await?;
//! # };
//! ```

use crate::domain::pipeline::{PipelineRun, PipelineRunSummary, RunFilter, RunId};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace a run
    async fn save(&self, run: &PipelineRun) -> Result<()>;

    async fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>>;

    /// Summaries matching the filter, newest first
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<PipelineRunSummary>>;
}
