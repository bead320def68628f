use serde::{Deserialize, Serialize};

use crate::market_data::statistics::ReturnStatistics;
use crate::optimizer::Solution;
use crate::types::AssetUniverse;

/// The chosen assets and how the selection scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Symbols whose bit is 1, in universe order.
    pub selected_symbols: Vec<String>,
    pub assignment: Vec<u8>,
    pub objective_value: f64,
    /// Sum of mean returns of the selected assets.
    pub expected_return: f64,
    /// x' * Sigma * x of the equal-count selection.
    pub variance: f64,
    pub optimizer: String,
    pub evaluations: u64,
}

/// Map a solution back onto the universe.
pub fn interpret_solution(
    solution: &Solution,
    universe: &AssetUniverse,
    stats: &ReturnStatistics,
) -> SelectionResult {
    let selected_symbols = universe
        .symbols()
        .iter()
        .zip(&solution.assignment)
        .filter(|(_, &bit)| bit == 1)
        .map(|(s, _)| s.clone())
        .collect();

    SelectionResult {
        selected_symbols,
        assignment: solution.assignment.clone(),
        objective_value: solution.objective_value,
        expected_return: stats.expected_return(&solution.assignment),
        variance: stats.selection_variance(&solution.assignment),
        optimizer: solution.optimizer.clone(),
        evaluations: solution.evaluations,
    }
}
