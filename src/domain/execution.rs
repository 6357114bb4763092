use crate::domain::errors::ExecutionFailure;
use crate::domain::market::candle::OhlcvSeries;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything the sandbox needs for one run of one artifact
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub run_id: String,
    pub artifact_version: u32,
    pub source: String,
    /// Written next to the source as `ohlcv.csv` when present
    pub market_data: Option<OhlcvSeries>,
    pub timeout: Duration,
}

/// Captured outcome of one sandbox run. A non-zero exit is data, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or by the timeout
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    /// Output exceeded the capture limit and was cut
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn failure(&self) -> Option<ExecutionFailure> {
        if self.timed_out {
            return Some(ExecutionFailure::Timeout);
        }
        match self.exit_code {
            Some(0) => None,
            Some(_) => Some(ExecutionFailure::NonZeroExit),
            None => Some(ExecutionFailure::Crash),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure().is_none()
    }

    /// Last `max_lines` lines of stderr followed by stdout, used as repair context
    pub fn output_tail(&self, max_lines: usize) -> String {
        let mut tail = String::new();
        for (label, stream) in [("stderr", &self.stderr), ("stdout", &self.stdout)] {
            let lines: Vec<&str> = stream.lines().collect();
            if lines.is_empty() {
                continue;
            }
            let start = lines.len().saturating_sub(max_lines);
            tail.push_str(&format!("--- {} (last {} lines) ---\n", label, lines.len() - start));
            tail.push_str(&lines[start..].join("\n"));
            tail.push('\n');
        }
        tail
    }
}
