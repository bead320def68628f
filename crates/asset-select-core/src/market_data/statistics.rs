use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::AssetSelectError;
use crate::market_data::prices::PriceTable;
use crate::types::AssetUniverse;
use crate::AssetSelectResult;

const SYMMETRY_TOLERANCE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Expected periodic return and return covariance per asset.
///
/// `mu` and `sigma` are always estimated from the same fully observed
/// return rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatistics {
    pub symbols: Vec<String>,
    /// Mean simple return per period.
    pub mu: Vec<f64>,
    /// N x N sample covariance of simple returns.
    pub sigma: Vec<Vec<f64>>,
    /// Number of return rows the estimates were computed from.
    pub observations: usize,
}

impl ReturnStatistics {
    /// Assemble statistics from precomputed moments, checking shape and symmetry.
    pub fn new(
        symbols: Vec<String>,
        mu: Vec<f64>,
        sigma: Vec<Vec<f64>>,
        observations: usize,
    ) -> AssetSelectResult<Self> {
        let n = symbols.len();
        if mu.len() != n {
            return Err(AssetSelectError::InvalidInput {
                field: "mu".into(),
                reason: format!("Expected {} entries, got {}", n, mu.len()),
            });
        }
        if sigma.len() != n || sigma.iter().any(|row| row.len() != n) {
            return Err(AssetSelectError::InvalidInput {
                field: "sigma".into(),
                reason: format!("Covariance matrix must be {n} x {n}"),
            });
        }
        if mu.iter().any(|v| !v.is_finite()) || sigma.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AssetSelectError::InvalidInput {
                field: "statistics".into(),
                reason: "Moments must be finite".into(),
            });
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let scale = sigma[i][j].abs().max(sigma[j][i].abs()).max(1.0);
                if (sigma[i][j] - sigma[j][i]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(AssetSelectError::InvalidInput {
                        field: "sigma".into(),
                        reason: format!("Covariance matrix not symmetric at ({i}, {j})"),
                    });
                }
            }
        }
        Ok(Self {
            symbols,
            mu,
            sigma,
            observations,
        })
    }

    pub fn num_assets(&self) -> usize {
        self.mu.len()
    }

    /// Sum of expected returns over the selected assets.
    pub fn expected_return(&self, assignment: &[u8]) -> f64 {
        self.mu
            .iter()
            .zip(assignment)
            .filter(|(_, &x)| x == 1)
            .map(|(m, _)| *m)
            .sum()
    }

    /// x' * Sigma * x for a 0/1 selection vector.
    pub fn selection_variance(&self, assignment: &[u8]) -> f64 {
        let picked: Vec<usize> = assignment
            .iter()
            .enumerate()
            .filter(|(_, &x)| x == 1)
            .map(|(i, _)| i)
            .collect();
        picked
            .iter()
            .map(|&i| picked.iter().map(|&j| self.sigma[i][j]).sum::<f64>())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate mean returns and sample covariance from closing prices.
///
/// Simple returns `p[t] / p[t-1] - 1` are formed row by row; any return row
/// touching a missing price in any column is dropped so that every moment is
/// taken over the same dates. Covariance divides by `T_eff - 1`.
pub fn compute_return_statistics(
    table: &PriceTable,
    universe: &AssetUniverse,
) -> AssetSelectResult<ReturnStatistics> {
    let aligned = table.select(universe)?;
    let n = universe.len();

    if aligned.num_rows() < 2 {
        return Err(AssetSelectError::InsufficientData(format!(
            "At least 2 observation dates required, got {}",
            aligned.num_rows()
        )));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(aligned.num_rows()); n];
    let mut dropped = 0usize;

    for t in 1..aligned.num_rows() {
        match simple_return_row(&aligned, t)? {
            Some(row) => {
                for (col, r) in columns.iter_mut().zip(row) {
                    col.push(r);
                }
            }
            None => dropped += 1,
        }
    }

    let t_eff = columns.first().map(|c| c.len()).unwrap_or(0);
    tracing::debug!(
        assets = n,
        rows = aligned.num_rows(),
        retained = t_eff,
        dropped,
        "computed simple returns"
    );

    if t_eff < 2 {
        return Err(AssetSelectError::InsufficientData(format!(
            "At least 2 fully observed return rows required, got {t_eff}"
        )));
    }

    let mu: Vec<f64> = columns.iter().map(|c| c.iter().mean()).collect();

    let mut sigma = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let cov = columns[i].iter().covariance(columns[j].iter());
            sigma[i][j] = cov;
            sigma[j][i] = cov;
        }
    }

    ReturnStatistics::new(universe.symbols().to_vec(), mu, sigma, t_eff)
}

/// Returns for row `t`, or `None` when any price at `t` or `t - 1` is missing.
fn simple_return_row(table: &PriceTable, t: usize) -> AssetSelectResult<Option<Vec<f64>>> {
    let prev = &table.closes[t - 1];
    let curr = &table.closes[t];
    let mut row = Vec::with_capacity(curr.len());

    for (col, (p0, p1)) in prev.iter().zip(curr).enumerate() {
        let (Some(p0), Some(p1)) = (p0, p1) else {
            return Ok(None);
        };
        if *p0 <= Decimal::ZERO || *p1 <= Decimal::ZERO {
            return Err(AssetSelectError::InvalidInput {
                field: "closes".into(),
                reason: format!(
                    "Non-positive price for '{}' on {}",
                    table.symbols[col],
                    if *p1 <= Decimal::ZERO {
                        table.dates[t]
                    } else {
                        table.dates[t - 1]
                    }
                ),
            });
        }
        let r = p1
            .checked_div(*p0)
            .and_then(|ratio| ratio.checked_sub(Decimal::ONE))
            .and_then(|r| r.to_f64())
            .ok_or_else(|| AssetSelectError::InvalidInput {
                field: "closes".into(),
                reason: format!(
                    "Return for '{}' on {} not representable",
                    table.symbols[col], table.dates[t]
                ),
            })?;
        row.push(r);
    }

    Ok(Some(row))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
