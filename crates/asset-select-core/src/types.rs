use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::AssetSelectError;
use crate::AssetSelectResult;

/// Closing prices. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Risk-aversion multiplier on the variance term (the "q" factor).
pub type RiskWeight = f64;

/// Ordered set of distinct asset symbols; one binary decision per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AssetUniverse {
    symbols: Vec<String>,
}

impl AssetUniverse {
    pub fn new<I, S>(symbols: I) -> AssetSelectResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            return Err(AssetSelectError::InvalidInput {
                field: "universe".into(),
                reason: "At least one symbol is required".into(),
            });
        }
        let mut seen = HashSet::with_capacity(symbols.len());
        for s in &symbols {
            if s.trim().is_empty() {
                return Err(AssetSelectError::InvalidInput {
                    field: "universe".into(),
                    reason: "Symbols must be non-empty".into(),
                });
            }
            if !seen.insert(s.as_str()) {
                return Err(AssetSelectError::InvalidInput {
                    field: "universe".into(),
                    reason: format!("Duplicate symbol '{s}'"),
                });
            }
        }
        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn position(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

impl TryFrom<Vec<String>> for AssetUniverse {
    type Error = AssetSelectError;

    fn try_from(symbols: Vec<String>) -> Result<Self, Self::Error> {
        AssetUniverse::new(symbols)
    }
}

impl From<AssetUniverse> for Vec<String> {
    fn from(universe: AssetUniverse) -> Self {
        universe.symbols
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
