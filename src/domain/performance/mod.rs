pub mod metrics;
pub mod sanitize;

pub use metrics::PerformanceMetrics;
pub use sanitize::Sanitize;
