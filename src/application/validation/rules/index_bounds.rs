use super::{ValidationRule, sort_by_line};
use crate::application::validation::source::SourceModel;
use crate::domain::validation::{FindingCategory, ValidationFinding};
use regex::Regex;
use std::sync::LazyLock;

static RANGE_LOOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^for\s+([A-Za-z_]\w*)\s+in\s+range\s*\(([^,()]+)(,)?").expect("range loop pattern is valid")
});

/// Look-backs inside `for i in range(start, ...)` must not reach before row 0
pub struct IndexBoundsRule;

impl ValidationRule for IndexBoundsRule {
    fn name(&self) -> &str {
        "index-bounds"
    }

    fn priority(&self) -> u8 {
        50
    }

    fn check(&self, source: &SourceModel) -> Vec<ValidationFinding> {
        let lines = source.lines();
        let mut findings = Vec::new();

        for (index, header) in lines.iter().enumerate() {
            let Some(caps) = RANGE_LOOP.captures(&header.text) else {
                continue;
            };
            let var = &caps[1];
            // range(n) starts at zero
            let start = if caps.get(3).is_some() {
                match source.evaluate(&caps[2], header.number) {
                    Some(start) => start,
                    None => continue,
                }
            } else {
                0.0
            };

            let lookback = match Regex::new(&format!(r"\[\s*{}\s*-\s*([^\]\s]+)\s*\]", regex::escape(var))) {
                Ok(re) => re,
                Err(_) => continue,
            };

            for line in lines[index + 1..].iter().take_while(|l| l.indent > header.indent) {
                for found in lookback.captures_iter(&line.text) {
                    let Some(offset) = source.evaluate(&found[1], line.number) else {
                        continue;
                    };
                    if offset > start {
                        findings.push(ValidationFinding::warning(
                            FindingCategory::IndexBounds,
                            format!(
                                "`[{} - {}]` reaches before the first row when the loop starts at {}",
                                var, &found[1], start
                            ),
                            Some(line.number),
                        ));
                    }
                }
            }
        }

        sort_by_line(&mut findings);
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Vec<ValidationFinding> {
        IndexBoundsRule.check(&SourceModel::parse(source))
    }

    #[test]
    fn test_lookback_past_loop_start_is_warning() {
        let source = "lookback = 20\nfor i in range(1, len(df)):\n    prev = df['close'].iloc[i - lookback]\n    cur = df['close'].iloc[i]\n";
        let findings = check(source);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(3));
        assert!(!findings[0].is_error());
    }

    #[test]
    fn test_lookback_within_start_passes() {
        let source = "for i in range(20, len(df)):\n    prev = closes[i - 20]\n    older = closes[i-5]\n";
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_zero_based_range() {
        let findings = check("for i in range(n):\n    delta = closes[i] - closes[i - 1]\n");
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_loop_body_ends_at_dedent() {
        let source = "for i in range(5, n):\n    x = a[i - 5]\ny = a[i - 50]\n";
        assert!(check(source).is_empty());
    }
}
