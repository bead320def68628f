pub mod error;
pub mod types;

pub mod market_data;
pub mod optimizer;
pub mod program;
pub mod selection;

pub use error::AssetSelectError;
pub use types::*;

/// Standard result type for all asset-select operations
pub type AssetSelectResult<T> = Result<T, AssetSelectError>;
