use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AssetSelectError;
use crate::market_data::prices::{PriceProvider, PriceTable};
use crate::market_data::statistics::{compute_return_statistics, ReturnStatistics};
use crate::optimizer::{DiscreteOptimizer, OptimizerConfig, Solution};
use crate::program::builder::{build_portfolio_program, validate_parameters};
use crate::program::model::QuadraticProgram;
use crate::selection::interpreter::{interpret_solution, SelectionResult};
use crate::types::{with_metadata, AssetUniverse, ComputationOutput, RiskWeight};
use crate::AssetSelectResult;

pub const DEFAULT_BUDGET: usize = 2;
pub const DEFAULT_RISK_WEIGHT: RiskWeight = 0.5;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 365;

/// Allowed gap between a reported objective and the recomputed one.
const OBJECTIVE_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub universe: AssetUniverse,
    /// Exact number of assets to hold.
    #[serde(default = "default_budget")]
    pub budget: usize,
    /// Weight `q` on portfolio variance.
    #[serde(default = "default_risk_weight")]
    pub risk_weight: RiskWeight,
    /// Calendar days of history ending at the latest available close.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

fn default_budget() -> usize {
    DEFAULT_BUDGET
}

fn default_risk_weight() -> RiskWeight {
    DEFAULT_RISK_WEIGHT
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

impl SelectionRequest {
    pub fn new(universe: AssetUniverse) -> Self {
        Self {
            universe,
            budget: DEFAULT_BUDGET,
            risk_weight: DEFAULT_RISK_WEIGHT,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            optimizer: OptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutput {
    pub selection: SelectionResult,
    /// Prices the statistics were estimated from.
    pub prices: PriceTable,
    pub statistics: ReturnStatistics,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the full selection with the optimizer named in the request.
pub fn select_assets(
    request: &SelectionRequest,
    provider: &dyn PriceProvider,
) -> AssetSelectResult<ComputationOutput<SelectionOutput>> {
    let optimizer = request.optimizer.build();
    select_assets_with(request, provider, optimizer.as_ref())
}

/// Run the full selection with a caller-supplied optimizer.
///
/// The request's `optimizer` field is ignored. Whatever the optimizer
/// returns is re-checked against the program; an assignment that breaks a
/// constraint is reported as [`AssetSelectError::NoFeasibleSolution`], and
/// a reported objective that does not match the assignment as
/// [`AssetSelectError::SolverBackendUnavailable`].
pub fn select_assets_with(
    request: &SelectionRequest,
    provider: &dyn PriceProvider,
    optimizer: &dyn DiscreteOptimizer,
) -> AssetSelectResult<ComputationOutput<SelectionOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let universe = &request.universe;

    // --- Validate before touching the provider ---
    validate_parameters(universe.len(), request.risk_weight, request.budget)?;

    // --- Prices and statistics ---
    let prices = provider.fetch_closes(universe, request.lookback_days)?;
    let statistics = compute_return_statistics(&prices, universe)?;
    tracing::info!(
        assets = universe.len(),
        observations = statistics.observations,
        "estimated return statistics"
    );
    check_statistics(&statistics, &mut warnings);

    // --- Optimize ---
    let program = build_portfolio_program(
        universe,
        &statistics,
        request.risk_weight,
        request.budget,
    )?;
    let solution = optimizer.solve(&program)?;
    let solution = check_solution(&program, solution)?;

    if optimizer.is_heuristic() {
        warnings.push(format!(
            "Optimizer '{}' is a heuristic; the selection is feasible but may not be optimal",
            optimizer.name()
        ));
    }

    let selection = interpret_solution(&solution, universe, &statistics);
    tracing::info!(
        selected = ?selection.selected_symbols,
        objective = selection.objective_value,
        optimizer = optimizer.name(),
        "asset selection complete"
    );

    let methodology = format!(
        "Cardinality-constrained mean-variance selection (binary QP, {})",
        optimizer.name()
    );
    let output = SelectionOutput {
        selection,
        prices,
        statistics,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        &methodology,
        request,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_statistics(stats: &ReturnStatistics, warnings: &mut Vec<String>) {
    let n = stats.num_assets();
    if stats.observations <= n {
        tracing::warn!(
            observations = stats.observations,
            assets = n,
            "covariance estimate is singular"
        );
        warnings.push(format!(
            "Only {} return observations for {} assets; the covariance matrix is singular",
            stats.observations, n
        ));
    }

    let flat: Vec<&str> = stats
        .symbols
        .iter()
        .enumerate()
        .filter(|(i, _)| stats.sigma[*i][*i] == 0.0)
        .map(|(_, s)| s.as_str())
        .collect();
    if !flat.is_empty() {
        tracing::warn!(symbols = ?flat, "zero-variance assets");
        warnings.push(format!(
            "Zero return variance for {}; the risk term cannot distinguish them",
            flat.join(", ")
        ));
    }
}

fn check_solution(program: &QuadraticProgram, solution: Solution) -> AssetSelectResult<Solution> {
    let n = program.num_variables();
    if solution.assignment.len() != n || solution.assignment.iter().any(|&b| b > 1) {
        return Err(AssetSelectError::NoFeasibleSolution(format!(
            "Optimizer '{}' returned a malformed assignment of length {} for {} assets",
            solution.optimizer,
            solution.assignment.len(),
            n
        )));
    }
    if !program.is_feasible(&solution.assignment) {
        return Err(AssetSelectError::NoFeasibleSolution(format!(
            "Optimizer '{}' returned an assignment violating the constraints by {}",
            solution.optimizer,
            program.violation(&solution.assignment)
        )));
    }
    let actual = program.evaluate(&solution.assignment);
    if (actual - solution.objective_value).abs() > OBJECTIVE_TOLERANCE * actual.abs().max(1.0) {
        return Err(AssetSelectError::SolverBackendUnavailable {
            backend: solution.optimizer.clone(),
            reason: format!(
                "Reported objective {} but the assignment scores {}",
                solution.objective_value, actual
            ),
        });
    }
    Ok(solution)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
