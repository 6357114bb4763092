use super::{ValidationRule, order_calls, sort_by_line};
use crate::application::validation::source::{SourceModel, binding_key, keyword_arguments};
use crate::domain::validation::{FindingCategory, ValidationFinding};
use regex::Regex;
use std::sync::LazyLock;

static INTEGER_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bint\s*\(|//|\bmath\.floor\s*\(|\bnp\.floor\s*\(|\bfloor\s*\(").expect("integer count pattern is valid")
});
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w.]*$").expect("identifier pattern is valid"));

const SIZE_NAMES: [&str; 3] = ["position_size", "size", "trade_size"];

/// Position size must be a fraction of equity in `[0, 1]`, never a unit count
pub struct SizingRule;

impl SizingRule {
    fn is_size_name(name: &str) -> bool {
        SIZE_NAMES.contains(&binding_key(name))
    }

    /// Follows bare names through their bindings looking for count constructs
    fn computes_count(source: &SourceModel, expr: &str, line: usize, depth: usize) -> bool {
        if INTEGER_COUNT.is_match(expr) {
            return true;
        }
        if depth >= 4 || !IDENTIFIER.is_match(expr.trim()) {
            return false;
        }
        source
            .binding_before(expr.trim(), line)
            .is_some_and(|b| Self::computes_count(source, &b.expr, b.line, depth + 1))
    }

    fn check_expression(source: &SourceModel, expr: &str, line: usize) -> Option<ValidationFinding> {
        let category = FindingCategory::SizingInvariant;
        if Self::computes_count(source, expr, line, 0) {
            return Some(ValidationFinding::error(
                category,
                format!(
                    "position size `{}` computes an absolute unit count; size must be a fraction of equity in [0, 1]",
                    expr
                ),
                Some(line),
            ));
        }
        match source.evaluate(expr, line) {
            Some(value) if value < 0.0 => Some(ValidationFinding::error(
                category,
                format!("position size `{}` is negative ({})", expr, value),
                Some(line),
            )),
            Some(value) if value > 1.0 => Some(ValidationFinding::error(
                category,
                format!(
                    "position size `{}` resolves to {}, which is not a fraction of equity in [0, 1]",
                    expr, value
                ),
                Some(line),
            )),
            Some(_) => None,
            None => Some(ValidationFinding::warning(
                category,
                format!("position size `{}` cannot be resolved statically", expr),
                Some(line),
            )),
        }
    }
}

impl ValidationRule for SizingRule {
    fn name(&self) -> &str {
        "sizing"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn check(&self, source: &SourceModel) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();

        for name in SIZE_NAMES {
            for binding in source.assignments(name) {
                findings.extend(Self::check_expression(source, &binding.expr, binding.line));
            }
        }

        for call in order_calls(source) {
            for (key, value) in keyword_arguments(&call.args) {
                if key != "size" {
                    continue;
                }
                // Bound size names were already checked at their assignment
                if IDENTIFIER.is_match(value) && Self::is_size_name(value) && !source.assignments(value).is_empty() {
                    continue;
                }
                findings.extend(Self::check_expression(source, value, call.line));
            }
        }

        sort_by_line(&mut findings);
        findings.dedup();
        findings
    }
}
