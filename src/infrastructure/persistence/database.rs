use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite pool with the result schema applied
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        let in_memory = db_url.contains(":memory:");

        // Ensure the directory exists if it's a file path
        if !in_memory
            && let Some(path_part) = db_url.strip_prefix("sqlite://")
            && let Some(parent) = Path::new(path_part).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let mut options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database URL {}", db_url))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` opens a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                id TEXT PRIMARY KEY,
                ticker TEXT,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create pipeline_runs table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_pipeline_runs_status_time
            ON pipeline_runs (status, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create pipeline_runs index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
