pub mod rules;
pub mod source;

use crate::domain::artifact::CandidateArtifact;
use crate::domain::validation::ValidationReport;
use rules::{DataWindowRule, EntryExitPresenceRule, IndexBoundsRule, OrderingRule, SizingRule, ValidationRule};
use source::SourceModel;
use tracing::{debug, warn};

pub use rules::check_request;

/// Runs every enabled rule over artifact text and collects an ordered report.
///
/// Pure: no I/O and no randomness, so the same text always yields the same
/// report. Findings are grouped by rule priority, then ordered by line.
pub struct StaticValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl StaticValidator {
    /// Rules are sorted by priority (lower runs first); the sort is stable
    pub fn new(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        let mut sorted_rules = rules;
        sorted_rules.sort_by_key(|r| r.priority());
        Self { rules: sorted_rules }
    }

    /// Sizing, order ordering, data window, entry/exit presence, index bounds
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(SizingRule),
            Box::new(OrderingRule),
            Box::new(DataWindowRule),
            Box::new(EntryExitPresenceRule),
            Box::new(IndexBoundsRule),
        ])
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority());
    }

    pub fn validate(&self, artifact: &CandidateArtifact) -> ValidationReport {
        self.validate_source(artifact.version(), artifact.source())
    }

    pub fn validate_source(&self, artifact_version: u32, source: &str) -> ValidationReport {
        let model = SourceModel::parse(source);
        let mut findings = Vec::new();

        for rule in &self.rules {
            if !rule.is_enabled() {
                debug!("StaticValidator: skipping disabled rule {}", rule.name());
                continue;
            }
            let found = rule.check(&model);
            debug!("StaticValidator: rule {} produced {} finding(s)", rule.name(), found.len());
            findings.extend(found);
        }

        let report = ValidationReport::new(artifact_version, findings);
        if !report.passed() {
            warn!(
                "StaticValidator: artifact v{} rejected with {} error(s), {} warning(s)",
                artifact_version,
                report.error_count(),
                report.warning_count()
            );
        }
        report
    }

    /// Names of active rules in execution order
    pub fn list_active_rules(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.is_enabled())
            .map(|r| r.name())
            .collect()
    }
}

impl Default for StaticValidator {
    fn default() -> Self {
        Self::standard()
    }
}
