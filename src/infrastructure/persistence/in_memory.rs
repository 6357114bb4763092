use crate::domain::performance::Sanitize;
use crate::domain::pipeline::{PipelineRun, PipelineRunSummary, RunFilter, RunId};
use crate::domain::repositories::ResultStore;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store for tests and `--dry-run`; contents are lost on exit
#[derive(Clone, Default)]
pub struct InMemoryResultStore {
    runs: Arc<RwLock<HashMap<RunId, PipelineRun>>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save(&self, run: &PipelineRun) -> Result<()> {
        let mut clean = run.clone();
        clean.sanitize();
        self.runs.write().await.insert(clean.id().clone(), clean);
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<PipelineRunSummary>> {
        let summaries = self.runs.read().await.values().map(PipelineRun::summary).collect();
        Ok(filter.apply(summaries))
    }
}
