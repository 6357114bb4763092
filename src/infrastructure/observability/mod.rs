//! Pull-on-demand observability: counters live in a private registry and are
//! rendered as Prometheus text by the CLI. Nothing listens on a socket.

pub mod metrics;

pub use metrics::Metrics;
