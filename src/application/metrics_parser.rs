use crate::domain::errors::ParseError;
use crate::domain::execution::ExecutionResult;
use crate::domain::performance::{PerformanceMetrics, Sanitize};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const BLOCK_BEGIN: &str = "=== PERFORMANCE ===";
pub const BLOCK_END: &str = "=== END PERFORMANCE ===";

static LIBRARY_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Return \[%\]|Sharpe Ratio|Win Rate \[%\]|Max\. Drawdown \[%\]|# Trades|Profit Factor)\s+(\S+)\s*$")
        .expect("statistics row pattern is valid")
});

const NULL_TOKENS: [&str; 9] = ["nan", "inf", "+inf", "-inf", "infinity", "-infinity", "none", "null", "n/a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Return,
    Sharpe,
    WinRate,
    MaxDrawdown,
    Trades,
    ProfitFactor,
}

impl Field {
    fn from_block_key(key: &str) -> Option<Field> {
        match key {
            "return_pct" | "return" | "total_return_pct" => Some(Field::Return),
            "sharpe" | "sharpe_ratio" => Some(Field::Sharpe),
            "win_rate" | "win_rate_pct" => Some(Field::WinRate),
            "max_drawdown" | "max_drawdown_pct" => Some(Field::MaxDrawdown),
            "trade_count" | "trades" | "num_trades" => Some(Field::Trades),
            "profit_factor" => Some(Field::ProfitFactor),
            _ => None,
        }
    }

    fn from_library_label(label: &str) -> Option<Field> {
        match label {
            "Return [%]" => Some(Field::Return),
            "Sharpe Ratio" => Some(Field::Sharpe),
            "Win Rate [%]" => Some(Field::WinRate),
            "Max. Drawdown [%]" => Some(Field::MaxDrawdown),
            "# Trades" => Some(Field::Trades),
            "Profit Factor" => Some(Field::ProfitFactor),
            _ => None,
        }
    }
}

/// Parses a reported number. Null tokens and non-finite values become `None`.
pub fn parse_value(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').trim();
    if cleaned.is_empty() || NULL_TOKENS.contains(&cleaned.to_lowercase().as_str()) {
        return None;
    }
    cleaned
        .replace('_', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn parse_count(raw: &str) -> Option<u64> {
    let value = parse_value(raw)?;
    if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return None;
    }
    Some(value as u64)
}

fn assign(metrics: &mut PerformanceMetrics, field: Field, raw: &str) {
    match field {
        Field::Return => metrics.return_pct = parse_value(raw),
        Field::Sharpe => metrics.sharpe = parse_value(raw),
        Field::WinRate => metrics.win_rate = parse_value(raw),
        Field::MaxDrawdown => metrics.max_drawdown = parse_value(raw),
        Field::Trades => metrics.trade_count = parse_count(raw),
        Field::ProfitFactor => metrics.profit_factor = parse_value(raw),
    }
}

/// Body of the last complete marked block, if any
fn last_marked_block(stdout: &str) -> Option<&str> {
    let mut found = None;
    let mut search_from = 0;
    while let Some(begin) = stdout[search_from..].find(BLOCK_BEGIN) {
        let body_start = search_from + begin + BLOCK_BEGIN.len();
        match stdout[body_start..].find(BLOCK_END) {
            Some(end) => {
                found = Some(&stdout[body_start..body_start + end]);
                search_from = body_start + end + BLOCK_END.len();
            }
            None => break,
        }
    }
    found
}

fn parse_marked_block(body: &str) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics::default();
    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        match Field::from_block_key(&key) {
            Some(field) => assign(&mut metrics, field, value),
            None => {
                metrics.extra.insert(key, parse_value(value));
            }
        }
    }
    metrics
}

fn parse_library_table(stdout: &str) -> Option<PerformanceMetrics> {
    let mut metrics = PerformanceMetrics::default();
    let mut recognized = false;
    for line in stdout.lines() {
        let Some(caps) = LIBRARY_ROW.captures(line.trim()) else {
            continue;
        };
        if let Some(field) = Field::from_library_label(&caps[1]) {
            assign(&mut metrics, field, &caps[2]);
            recognized = true;
        }
    }
    recognized.then_some(metrics)
}

/// Extracts performance statistics from subprocess stdout.
///
/// The marked block takes precedence over the library table; when several
/// marked blocks are printed the last one wins. Missing fields stay null.
pub fn parse_stdout(stdout: &str) -> Result<PerformanceMetrics, ParseError> {
    let mut metrics = match last_marked_block(stdout) {
        Some(body) => parse_marked_block(body),
        None => parse_library_table(stdout).ok_or(ParseError::MissingStatisticsBlock {
            stdout_bytes: stdout.len(),
        })?,
    };
    metrics.sanitize();
    Ok(metrics)
}

pub fn parse(result: &ExecutionResult) -> Result<PerformanceMetrics, ParseError> {
    parse_stdout(&result.stdout)
}

/// Like `parse`, but an unparseable report degrades to all-null metrics
pub fn parse_or_degrade(result: &ExecutionResult) -> (PerformanceMetrics, Option<ParseError>) {
    match parse(result) {
        Ok(metrics) => {
            debug!("MetricsParser: parsed {:?}", metrics);
            (metrics, None)
        }
        Err(err) => {
            warn!("MetricsParser: {}; recording null metrics", err);
            (PerformanceMetrics::unavailable(), Some(err))
        }
    }
}

fn render_value(value: Option<f64>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

/// Renders metrics in the marked block format understood by `parse_stdout`
pub fn render_block(metrics: &PerformanceMetrics) -> String {
    let mut out = String::new();
    out.push_str(BLOCK_BEGIN);
    out.push('\n');
    out.push_str(&format!("return_pct: {}\n", render_value(metrics.return_pct)));
    out.push_str(&format!("sharpe: {}\n", render_value(metrics.sharpe)));
    out.push_str(&format!("win_rate: {}\n", render_value(metrics.win_rate)));
    out.push_str(&format!("max_drawdown: {}\n", render_value(metrics.max_drawdown)));
    out.push_str(&format!(
        "trade_count: {}\n",
        metrics.trade_count.map_or_else(|| "null".to_string(), |c| c.to_string())
    ));
    out.push_str(&format!("profit_factor: {}\n", render_value(metrics.profit_factor)));
    for (key, value) in &metrics.extra {
        out.push_str(&format!("{}: {}\n", key, render_value(*value)));
    }
    out.push_str(BLOCK_END);
    out.push('\n');
    out
}
