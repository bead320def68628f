use crate::error::AssetSelectError;
use crate::market_data::statistics::ReturnStatistics;
use crate::program::model::{ConstraintSense, QuadraticProgram};
use crate::types::{AssetUniverse, RiskWeight};
use crate::AssetSelectResult;

/// Name given to programs produced by [`build_portfolio_program`].
pub const PORTFOLIO_PROGRAM_NAME: &str = "AssetSelection";

/// Name of the cardinality constraint.
pub const BUDGET_CONSTRAINT_NAME: &str = "budget";

/// Check budget and risk weight against a universe of `n` assets.
pub fn validate_parameters(
    n: usize,
    risk_weight: RiskWeight,
    budget: usize,
) -> AssetSelectResult<()> {
    if budget < 1 || budget > n {
        return Err(AssetSelectError::InvalidBudget {
            budget,
            universe_size: n,
        });
    }
    if !risk_weight.is_finite() || risk_weight < 0.0 {
        return Err(AssetSelectError::InvalidRiskWeight(risk_weight));
    }
    Ok(())
}

/// Build `min q * x' Sigma x - mu' x  s.t.  sum(x) == budget` over one binary
/// variable per asset, in universe order.
///
/// The return term is not rescaled against the variance term; `q` alone
/// sets the trade-off.
pub fn build_portfolio_program(
    universe: &AssetUniverse,
    stats: &ReturnStatistics,
    risk_weight: RiskWeight,
    budget: usize,
) -> AssetSelectResult<QuadraticProgram> {
    let n = universe.len();
    validate_parameters(n, risk_weight, budget)?;

    if stats.num_assets() != n || stats.symbols.as_slice() != universe.symbols() {
        return Err(AssetSelectError::InvalidInput {
            field: "statistics".into(),
            reason: format!(
                "Statistics cover {:?}, universe is {:?}",
                stats.symbols,
                universe.symbols()
            ),
        });
    }

    let mut qp = QuadraticProgram::new(PORTFOLIO_PROGRAM_NAME);
    for symbol in universe.symbols() {
        qp.binary_var(symbol.clone())?;
    }

    let linear: Vec<f64> = stats.mu.iter().map(|m| -m).collect();
    let quadratic: Vec<Vec<f64>> = stats
        .sigma
        .iter()
        .map(|row| row.iter().map(|s| risk_weight * s).collect())
        .collect();
    qp.minimize(0.0, linear, quadratic)?;

    qp.add_linear_constraint(
        BUDGET_CONSTRAINT_NAME,
        vec![1.0; n],
        ConstraintSense::Eq,
        budget as f64,
    )?;

    tracing::debug!(
        assets = n,
        budget,
        risk_weight,
        "built portfolio selection program"
    );
    Ok(qp)
}
