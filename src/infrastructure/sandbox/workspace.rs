use crate::application::synthesis::prompts::DATA_FILE;
use crate::domain::errors::SandboxError;
use crate::domain::market::candle::OhlcvSeries;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Fresh directory holding one artifact and its data; removed on drop
pub struct Workspace {
    dir: TempDir,
    script: PathBuf,
}

impl Workspace {
    pub async fn prepare(
        script_name: &str,
        source: &str,
        market_data: Option<&OhlcvSeries>,
    ) -> Result<Self, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("stratforge-")
            .tempdir()
            .map_err(|e| SandboxError::Workspace(format!("temp dir: {}", e)))?;

        let script = dir.path().join(script_name);
        tokio::fs::write(&script, source)
            .await
            .map_err(|e| SandboxError::Workspace(format!("writing {}: {}", script.display(), e)))?;

        if let Some(series) = market_data {
            let csv = render_csv(series)?;
            let data_path = dir.path().join(DATA_FILE);
            tokio::fs::write(&data_path, csv)
                .await
                .map_err(|e| SandboxError::Workspace(format!("writing {}: {}", data_path.display(), e)))?;
        }

        Ok(Self { dir, script })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

/// `timestamp,open,high,low,close,volume` with a header row
pub fn render_csv(series: &OhlcvSeries) -> Result<Vec<u8>, SandboxError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for candle in &series.candles {
        writer
            .serialize(candle)
            .map_err(|e| SandboxError::Workspace(format!("encoding {} bars: {}", series.ticker, e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| SandboxError::Workspace(format!("flushing {} bars: {}", series.ticker, e)))
}
