use crate::domain::pipeline::{PipelineRun, PipelineRunSummary, RunFilter, RunId};
use crate::domain::repositories::ResultStore;
use crate::infrastructure::persistence::{decode_run, encode_run};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

/// One row per run: a few indexed columns plus the full JSON body
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn save(&self, run: &PipelineRun) -> Result<()> {
        let body = encode_run(run)?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, ticker, status, created_at, body)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                ticker = excluded.ticker,
                status = excluded.status,
                created_at = excluded.created_at,
                body = excluded.body
            "#,
        )
        .bind(run.id().as_str())
        .bind(run.spec().map(|s| s.ticker.to_uppercase()))
        .bind(run.status().as_str())
        .bind(run.created_at().timestamp_millis())
        .bind(body)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save run {}", run.id()))?;

        debug!("SqliteResultStore: saved run {}", run.id());
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>> {
        let row = sqlx::query("SELECT body FROM pipeline_runs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load run {}", id))?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                decode_run(&body).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<PipelineRunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM pipeline_runs
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR ticker = ?2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.ticker.as_ref().map(|t| t.to_uppercase()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.try_get("body")?;
            match decode_run(&body) {
                Ok(run) => summaries.push(run.summary()),
                Err(e) => warn!("SqliteResultStore: skipping unreadable row: {:#}", e),
            }
        }
        Ok(filter.apply(summaries))
    }
}
