use super::{ValidationRule, order_calls};
use crate::application::validation::source::{LogicalLine, SourceModel};
use crate::domain::validation::{FindingCategory, ValidationFinding};
use regex::Regex;
use std::sync::LazyLock;

static ENTRY_LOGIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:buy|sell|enter_long|enter_short|open_position)\s*\(|\bentry_signal\b|\bentries\s*=")
        .expect("entry pattern is valid")
});
static EXIT_LOGIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bposition\.close\s*\(|\bclose_position\s*\(|\b(?:exit_long|exit_short)\s*\(|\bexit_signal\b|\bexits\s*=|\b(?:sl|tp)\s*=",
    )
    .expect("exit pattern is valid")
});

const CONDITION_HEADERS: [&str; 5] = ["if ", "elif ", "else:", "else ", "while "];

/// A strategy needs at least one way in and one way out
pub struct EntryExitPresenceRule;

impl EntryExitPresenceRule {
    fn is_guarded(lines: &[LogicalLine], index: usize) -> bool {
        let call = &lines[index];
        if call.text.starts_with("if ") || call.text.starts_with("elif ") || call.text.contains(" if ") {
            return true;
        }

        let mut indent = call.indent;
        for header in lines[..index].iter().rev() {
            if header.indent >= indent {
                continue;
            }
            if CONDITION_HEADERS.iter().any(|h| header.text.starts_with(h)) {
                return true;
            }
            if header.text.starts_with("def ") || header.text.starts_with("class ") {
                return false;
            }
            indent = header.indent;
        }
        false
    }
}

impl ValidationRule for EntryExitPresenceRule {
    fn name(&self) -> &str {
        "entry-exit-presence"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn check(&self, source: &SourceModel) -> Vec<ValidationFinding> {
        let lines = source.lines();
        let code = |pattern: &Regex| {
            lines
                .iter()
                .any(|l| !l.text.starts_with("def ") && pattern.is_match(&l.text))
        };

        let mut findings = Vec::new();
        if !code(&ENTRY_LOGIC) {
            findings.push(ValidationFinding::error(
                FindingCategory::MissingEntryLogic,
                "no entry order or entry signal found",
                None,
            ));
        }
        if !code(&EXIT_LOGIC) {
            findings.push(ValidationFinding::error(
                FindingCategory::MissingExitLogic,
                "no exit found: close the position, attach sl/tp, or emit an exit signal",
                None,
            ));
        }

        for call in order_calls(source) {
            let Some(index) = lines.iter().position(|l| l.number == call.line) else {
                continue;
            };
            if !Self::is_guarded(lines, index) {
                findings.push(ValidationFinding::warning(
                    FindingCategory::MissingEntryLogic,
                    "entry order is placed unconditionally on every bar",
                    Some(call.line),
                ));
            }
        }

        findings
    }
}
