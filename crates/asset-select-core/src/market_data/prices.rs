use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::AssetSelectError;
use crate::types::{AssetUniverse, Money};
use crate::AssetSelectResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Time-ordered table of closing prices.
///
/// One row per observation date, one column per symbol. A `None` cell is a
/// missing observation (holiday on one exchange, late listing, data gap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub symbols: Vec<String>,
    /// Strictly ascending observation dates.
    pub dates: Vec<NaiveDate>,
    /// `closes[row][column]`, aligned with `dates` and `symbols`.
    pub closes: Vec<Vec<Option<Money>>>,
}

impl PriceTable {
    /// Build a table, sorting rows by date.
    ///
    /// Fails on ragged rows, duplicate symbols or duplicate dates.
    pub fn new(
        symbols: Vec<String>,
        dates: Vec<NaiveDate>,
        closes: Vec<Vec<Option<Money>>>,
    ) -> AssetSelectResult<Self> {
        if dates.len() != closes.len() {
            return Err(AssetSelectError::InvalidInput {
                field: "closes".into(),
                reason: format!(
                    "{} dates but {} rows of closing prices",
                    dates.len(),
                    closes.len()
                ),
            });
        }
        if let Some((row, _)) = closes
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != symbols.len())
        {
            return Err(AssetSelectError::InvalidInput {
                field: "closes".into(),
                reason: format!(
                    "Row {} has {} values, expected {}",
                    row,
                    closes[row].len(),
                    symbols.len()
                ),
            });
        }
        let mut seen = HashSet::with_capacity(symbols.len());
        for s in &symbols {
            if !seen.insert(s.as_str()) {
                return Err(AssetSelectError::InvalidInput {
                    field: "symbols".into(),
                    reason: format!("Duplicate column '{s}'"),
                });
            }
        }

        let mut rows: Vec<(NaiveDate, Vec<Option<Money>>)> =
            dates.into_iter().zip(closes).collect();
        rows.sort_by_key(|(d, _)| *d);
        if let Some(w) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(AssetSelectError::InvalidInput {
                field: "dates".into(),
                reason: format!("Duplicate observation date {}", w[0].0),
            });
        }

        let (dates, closes): (Vec<NaiveDate>, Vec<Vec<Option<Money>>>) = rows.into_iter().unzip();
        Ok(Self {
            symbols,
            dates,
            closes,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Reorder and restrict columns to the universe.
    pub fn select(&self, universe: &AssetUniverse) -> AssetSelectResult<PriceTable> {
        let mut indices = Vec::with_capacity(universe.len());
        for symbol in universe.symbols() {
            let idx = self
                .symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| {
                    AssetSelectError::InsufficientData(format!(
                        "No price history for symbol '{symbol}'"
                    ))
                })?;
            indices.push(idx);
        }

        let closes = self
            .closes
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();

        Ok(PriceTable {
            symbols: universe.symbols().to_vec(),
            dates: self.dates.clone(),
            closes,
        })
    }

    /// Keep the rows inside `lookback_days` calendar days of the latest date.
    pub fn trailing(&self, lookback_days: u32) -> PriceTable {
        let cutoff = self
            .last_date()
            .and_then(|last| last.checked_sub_days(Days::new(u64::from(lookback_days))));
        let Some(cutoff) = cutoff else {
            return self.clone();
        };

        let (dates, closes): (Vec<NaiveDate>, Vec<Vec<Option<Money>>>) = self
            .dates
            .iter()
            .zip(&self.closes)
            .filter(|(d, _)| **d >= cutoff)
            .map(|(d, row)| (*d, row.clone()))
            .unzip();

        PriceTable {
            symbols: self.symbols.clone(),
            dates,
            closes,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider capability
// ---------------------------------------------------------------------------

/// Source of historical closing prices.
///
/// Implementations own retrieval concerns (vendors, retries, rate limits).
/// The returned table must carry a column for every universe symbol.
pub trait PriceProvider {
    fn fetch_closes(
        &self,
        universe: &AssetUniverse,
        lookback_days: u32,
    ) -> AssetSelectResult<PriceTable>;
}

/// Serves a preloaded table; used by tests and file-backed front ends.
#[derive(Debug, Clone)]
pub struct InMemoryPriceProvider {
    table: PriceTable,
}

impl InMemoryPriceProvider {
    pub fn new(table: PriceTable) -> Self {
        Self { table }
    }
}

impl PriceProvider for InMemoryPriceProvider {
    fn fetch_closes(
        &self,
        universe: &AssetUniverse,
        lookback_days: u32,
    ) -> AssetSelectResult<PriceTable> {
        let selected = self.table.select(universe)?;
        Ok(selected.trailing(lookback_days))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_table() -> PriceTable {
        PriceTable::new(
            vec!["A".into(), "B".into()],
            vec![d(2024, 1, 3), d(2024, 1, 1), d(2024, 1, 2)],
            vec![
                vec![Some(dec!(102)), Some(dec!(51))],
                vec![Some(dec!(100)), Some(dec!(50))],
                vec![Some(dec!(101)), None],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rows_sorted_by_date() {
        let t = sample_table();
        assert_eq!(t.dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(t.closes[0][0], Some(dec!(100)));
        assert_eq!(t.closes[1][1], None);
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let err = PriceTable::new(
            vec!["A".into()],
            vec![d(2024, 1, 1), d(2024, 1, 1)],
            vec![vec![Some(dec!(1))], vec![Some(dec!(2))]],
        )
        .unwrap_err();
        assert!(matches!(err, AssetSelectError::InvalidInput { ref field, .. } if field == "dates"));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = PriceTable::new(
            vec!["A".into(), "B".into()],
            vec![d(2024, 1, 1)],
            vec![vec![Some(dec!(1))]],
        )
        .unwrap_err();
        assert!(matches!(err, AssetSelectError::InvalidInput { .. }));
    }

    #[test]
    fn test_select_reorders_columns() {
        let t = sample_table();
        let u = AssetUniverse::new(["B", "A"]).unwrap();
        let s = t.select(&u).unwrap();
        assert_eq!(s.symbols, vec!["B".to_string(), "A".to_string()]);
        assert_eq!(s.closes[0], vec![Some(dec!(50)), Some(dec!(100))]);
    }

    #[test]
    fn test_select_missing_symbol() {
        let t = sample_table();
        let u = AssetUniverse::new(["A", "Z"]).unwrap();
        let err = t.select(&u).unwrap_err();
        assert!(matches!(err, AssetSelectError::InsufficientData(_)));
    }

    #[test]
    fn test_trailing_window() {
        let t = sample_table();
        let w = t.trailing(1);
        assert_eq!(w.dates, vec![d(2024, 1, 2), d(2024, 1, 3)]);
        let all = t.trailing(365);
        assert_eq!(all.num_rows(), 3);
    }

    #[test]
    fn test_in_memory_provider() {
        let provider = InMemoryPriceProvider::new(sample_table());
        let u = AssetUniverse::new(["A"]).unwrap();
        let t = provider.fetch_closes(&u, 365).unwrap();
        assert_eq!(t.symbols, vec!["A".to_string()]);
        assert_eq!(t.num_rows(), 3);
    }
}
