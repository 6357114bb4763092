pub mod optimizer;
pub mod search_space;
pub mod tuner;

pub use optimizer::{OptimizationConfig, OptimizationLoop, OptimizationOutcome};
pub use search_space::{ParameterRange, SearchSpace};
pub use tuner::{CoordinateTuner, ParameterDelta};
