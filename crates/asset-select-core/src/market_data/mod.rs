pub mod prices;
pub mod statistics;

pub use prices::{InMemoryPriceProvider, PriceProvider, PriceTable};
pub use statistics::{compute_return_statistics, ReturnStatistics};
