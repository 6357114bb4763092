pub mod llm;
pub mod market_data;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod sandbox;

pub use market_data::{CsvDirectoryProvider, InMemoryMarketData, LimitEnforcingProvider};
pub use persistence::{InMemoryResultStore, JsonFileResultStore, SqliteResultStore};
