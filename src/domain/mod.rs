// Generated code and its lifecycle
pub mod artifact;
pub mod execution;
pub mod pipeline;
pub mod strategy;

// Market data model and provider limits
pub mod market;

// Optimization history and ranking
pub mod optimization;

// Performance statistics
pub mod performance;

// Static findings and data quality
pub mod validation;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

pub mod cancellation;

// Domain-specific error types
pub mod errors;
