use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Domain defect class a finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    OrderingInvariant,
    SizingInvariant,
    DataWindow,
    MissingEntryLogic,
    MissingExitLogic,
    IndexBounds,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::OrderingInvariant => "ordering-invariant",
            FindingCategory::SizingInvariant => "sizing-invariant",
            FindingCategory::DataWindow => "data-window",
            FindingCategory::MissingEntryLogic => "missing-entry-logic",
            FindingCategory::MissingExitLogic => "missing-exit-logic",
            FindingCategory::IndexBounds => "index-bounds",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub category: FindingCategory,
    pub message: String,
    /// 1-based source line, when the finding is tied to one
    pub line: Option<usize>,
}

impl ValidationFinding {
    pub fn error(category: FindingCategory, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            message: message.into(),
            line,
        }
    }

    pub fn warning(category: FindingCategory, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            message: message.into(),
            line,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "[{}] {} (line {}): {}",
                self.severity, self.category, line, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.severity, self.category, self.message),
        }
    }
}

/// Ordered findings for one artifact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub artifact_version: u32,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    pub fn new(artifact_version: u32, findings: Vec<ValidationFinding>) -> Self {
        Self {
            artifact_version,
            findings,
        }
    }

    /// Only a report with zero errors lets the artifact reach the sandbox
    pub fn passed(&self) -> bool {
        !self.findings.iter().any(ValidationFinding::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings.len() - self.error_count()
    }

    /// Findings rendered one per line, errors first, for the repair prompt
    pub fn render_feedback(&self) -> String {
        let mut ordered: Vec<&ValidationFinding> = self.findings.iter().collect();
        ordered.sort_by(|a, b| b.severity.cmp(&a.severity));
        ordered
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_passes_with_only_warnings() {
        let report = ValidationReport::new(
            1,
            vec![ValidationFinding::warning(
                FindingCategory::IndexBounds,
                "lookback reaches before loop start",
                Some(12),
            )],
        );
        assert!(report.passed());
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_feedback_lists_errors_first() {
        let report = ValidationReport::new(
            2,
            vec![
                ValidationFinding::warning(FindingCategory::DataWindow, "unknown interval", None),
                ValidationFinding::error(FindingCategory::SizingInvariant, "size 400000 is not a fraction", Some(7)),
            ],
        );
        assert!(!report.passed());
        let feedback = report.render_feedback();
        let first = feedback.lines().next().unwrap_or_default();
        assert!(first.contains("sizing-invariant"));
        assert!(first.contains("line 7"));
    }

    #[test]
    fn test_category_serializes_kebab_case() {
        let json = serde_json::to_string(&FindingCategory::MissingEntryLogic).unwrap();
        assert_eq!(json, "\"missing-entry-logic\"");
    }
}
