use crate::domain::pipeline::{PipelineRun, PipelineRunSummary, RunFilter, RunId};
use crate::domain::repositories::ResultStore;
use crate::infrastructure::persistence::{decode_run, encode_run};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// One pretty-printed JSON file per run under a single directory
pub struct JsonFileResultStore {
    dir: PathBuf,
}

impl JsonFileResultStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create result directory {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &RunId) -> PathBuf {
        let name: String = id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl ResultStore for JsonFileResultStore {
    async fn save(&self, run: &PipelineRun) -> Result<()> {
        let content = encode_run(run)?;
        let path = self.path_for(run.id());

        // Atomic write: unique temp file then rename
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write temp file {:?}", temp_path))?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e).with_context(|| format!("Failed to rename run file {:?}", path));
        }

        info!("JsonFileResultStore: saved run {} to {:?}", run.id(), path);
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>> {
        let path = self.path_for(id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read run file {:?}", path)),
        };
        decode_run(&content).map(Some).with_context(|| format!("Run file {:?}", path))
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<PipelineRunSummary>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {:?}", self.dir))?;

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match fs::read_to_string(&path).await {
                Ok(content) => decode_run(&content),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(run) => summaries.push(run.summary()),
                Err(e) => warn!("JsonFileResultStore: skipping unreadable {:?}: {:#}", path, e),
            }
        }
        Ok(filter.apply(summaries))
    }
}
