pub mod http_client;
pub mod openai;
pub mod retrying;

pub use openai::{OpenAiCompatibleClient, OpenAiConfig};
pub use retrying::{RetryPolicy, RetryingLanguageModel};
