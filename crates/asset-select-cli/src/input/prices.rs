use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use asset_select_core::market_data::{PriceProvider, PriceTable};
use asset_select_core::{AssetSelectError, AssetSelectResult, AssetUniverse};

use crate::input::file::resolve_path;

/// Closing prices from a CSV file with header `date,SYM1,SYM2,...`.
///
/// Dates are ISO `YYYY-MM-DD`; a blank cell is a missing observation. The
/// file is read on every fetch.
pub struct CsvPriceProvider {
    path: String,
}

impl CsvPriceProvider {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    fn load(&self) -> AssetSelectResult<PriceTable> {
        let path: PathBuf = resolve_path(&self.path).map_err(AssetSelectError::DataProvider)?;
        let file = std::fs::File::open(&path).map_err(|e| {
            AssetSelectError::DataProvider(format!("Failed to open '{}': {}", path.display(), e))
        })?;
        read_price_csv(file)
    }
}

impl PriceProvider for CsvPriceProvider {
    fn fetch_closes(
        &self,
        universe: &AssetUniverse,
        lookback_days: u32,
    ) -> AssetSelectResult<PriceTable> {
        let table = self.load()?;
        tracing::debug!(
            path = %self.path,
            rows = table.num_rows(),
            columns = table.symbols.len(),
            "loaded price csv"
        );
        Ok(table.select(universe)?.trailing(lookback_days))
    }
}

/// Parse a price CSV into a table.
pub fn read_price_csv<R: io::Read>(reader: R) -> AssetSelectResult<PriceTable> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers().map_err(csv_error)?.clone();
    let mut columns = headers.iter();
    match columns.next() {
        Some(first) if first.eq_ignore_ascii_case("date") => {}
        _ => {
            return Err(AssetSelectError::DataProvider(
                "Price CSV must start with a 'date' column".into(),
            ))
        }
    }
    let symbols: Vec<String> = columns.map(str::to_string).collect();
    if symbols.is_empty() {
        return Err(AssetSelectError::DataProvider(
            "Price CSV has no symbol columns".into(),
        ));
    }

    let mut dates = Vec::new();
    let mut closes = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let row = line + 2;

        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
            AssetSelectError::DataProvider(format!("Row {row}: bad date '{raw_date}': {e}"))
        })?;

        let values = record
            .iter()
            .skip(1)
            .zip(&symbols)
            .map(|(cell, symbol)| {
                if cell.is_empty() {
                    return Ok(None);
                }
                Decimal::from_str(cell).map(Some).map_err(|e| {
                    AssetSelectError::DataProvider(format!(
                        "Row {row}: bad price '{cell}' for {symbol}: {e}"
                    ))
                })
            })
            .collect::<AssetSelectResult<Vec<Option<Decimal>>>>()?;

        dates.push(date);
        closes.push(values);
    }

    PriceTable::new(symbols, dates, closes)
}

fn csv_error(e: csv::Error) -> AssetSelectError {
    AssetSelectError::DataProvider(format!("Malformed price CSV: {e}"))
}
