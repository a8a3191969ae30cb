pub mod memory;
pub mod provider;
pub mod types;

pub use memory::{CallCounts, InMemoryDataSource, MarketFixture};
pub use provider::{DataSource, HttpJsonDataSource};
