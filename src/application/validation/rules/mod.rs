pub mod data_window;
pub mod index_bounds;
pub mod ordering;
pub mod presence;
pub mod sizing;

use crate::application::validation::source::{SourceModel, call_arguments};
use crate::domain::strategy::TradeDirection;
use crate::domain::validation::ValidationFinding;
use regex::Regex;
use std::sync::LazyLock;

pub use data_window::{DataWindowRule, check_request};
pub use index_bounds::IndexBoundsRule;
pub use ordering::OrderingRule;
pub use presence::EntryExitPresenceRule;
pub use sizing::SizingRule;

/// One static check over artifact source.
///
/// Rules are pure: the same source always yields the same findings.
pub trait ValidationRule: Send + Sync {
    /// Unique name for logging and debugging
    fn name(&self) -> &str;

    fn check(&self, source: &SourceModel) -> Vec<ValidationFinding>;

    /// Disabled rules are skipped by the validator
    fn is_enabled(&self) -> bool {
        true
    }

    /// Lower runs first; findings are reported in rule order
    fn priority(&self) -> u8 {
        100
    }
}

static ORDER_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(buy|sell|enter_long|enter_short)\s*\(").expect("order call pattern is valid"));

/// An opening order call found in the source
#[derive(Debug, Clone)]
pub struct OrderCall {
    pub line: usize,
    pub indent: usize,
    pub direction: TradeDirection,
    pub args: String,
}

pub fn order_calls(source: &SourceModel) -> Vec<OrderCall> {
    let mut calls = Vec::new();
    for line in source.lines() {
        if line.text.starts_with("def ") {
            continue;
        }
        for caps in ORDER_CALL.captures_iter(&line.text) {
            let Some(whole) = caps.get(0) else { continue };
            let open = whole.end() - 1;
            let direction = match &caps[1] {
                "sell" | "enter_short" => TradeDirection::Short,
                _ => TradeDirection::Long,
            };
            calls.push(OrderCall {
                line: line.number,
                indent: line.indent,
                direction,
                args: call_arguments(&line.text, open).unwrap_or_default().to_string(),
            });
        }
    }
    calls
}

/// Stable ordering inside one rule: by line, unanchored findings last
pub(crate) fn sort_by_line(findings: &mut [ValidationFinding]) {
    findings.sort_by_key(|f| f.line.unwrap_or(usize::MAX));
}
