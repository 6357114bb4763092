// Idea to structured spec
pub mod research;

// Code generation and static checks
pub mod synthesis;
pub mod validation;

// Statistics block parsing
pub mod metrics_parser;

// Parameter search
pub mod optimization;

// Run orchestration
pub mod pipeline;
