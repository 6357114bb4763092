pub mod data_quality;
pub mod findings;

pub use findings::{FindingCategory, Severity, ValidationFinding, ValidationReport};
