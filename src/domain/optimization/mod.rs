pub mod history;
pub mod reward;

pub use history::{OptimizationAttempt, OptimizationHistory};
pub use reward::RewardWeights;
