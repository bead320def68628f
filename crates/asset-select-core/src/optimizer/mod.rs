//! Discrete optimizers over binary quadratic programs.
//!
//! Every optimizer honours the same contract: the returned assignment
//! satisfies all constraints of the program and its reported objective is
//! the program's objective at that assignment. Exact optimizers
//! ([`ExhaustiveSearch`], [`BranchAndBound`]) return the minimiser with ties
//! broken by the lexicographically smallest bit vector. Heuristics
//! ([`LocalSearch`], [`VariationalSampler`]) return the best feasible
//! candidate they observed.

pub mod branch_bound;
pub mod exhaustive;
#[cfg(feature = "heuristics")]
pub mod local_search;
#[cfg(feature = "heuristics")]
pub mod variational;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::program::model::QuadraticProgram;
use crate::AssetSelectResult;

pub use branch_bound::{BranchAndBound, BranchAndBoundConfig};
pub use exhaustive::{ExhaustiveConfig, ExhaustiveSearch};
#[cfg(feature = "heuristics")]
pub use local_search::{LocalSearch, LocalSearchConfig};
#[cfg(feature = "heuristics")]
pub use variational::{BernoulliBackend, SamplingBackend, VariationalConfig, VariationalSampler};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A feasible 0/1 assignment and its objective value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// One entry per program variable, each 0 or 1.
    pub assignment: Vec<u8>,
    pub objective_value: f64,
    /// Name of the optimizer that produced the assignment.
    pub optimizer: String,
    /// Objective evaluations performed.
    pub evaluations: u64,
    /// Search iterations (candidates, nodes or refinement rounds).
    pub iterations: u64,
}

impl Solution {
    pub fn num_selected(&self) -> usize {
        self.assignment.iter().filter(|&&x| x == 1).count()
    }
}

/// Finds the feasible binary assignment minimising a program's objective.
pub trait DiscreteOptimizer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the optimizer may return a suboptimal (but feasible) answer.
    fn is_heuristic(&self) -> bool {
        false
    }

    fn solve(&self, program: &QuadraticProgram) -> AssetSelectResult<Solution>;
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which optimizer to run, with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Exhaustive(ExhaustiveConfig),
    BranchAndBound(BranchAndBoundConfig),
    #[cfg(feature = "heuristics")]
    LocalSearch(LocalSearchConfig),
    #[cfg(feature = "heuristics")]
    Variational(VariationalConfig),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Exhaustive(ExhaustiveConfig::default())
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Box<dyn DiscreteOptimizer> {
        match self {
            OptimizerConfig::Exhaustive(c) => Box::new(ExhaustiveSearch::new(c.clone())),
            OptimizerConfig::BranchAndBound(c) => Box::new(BranchAndBound::new(c.clone())),
            #[cfg(feature = "heuristics")]
            OptimizerConfig::LocalSearch(c) => Box::new(LocalSearch::new(c.clone())),
            #[cfg(feature = "heuristics")]
            OptimizerConfig::Variational(c) => Box::new(VariationalSampler::new(c.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared reduction
// ---------------------------------------------------------------------------

/// Best-so-far candidate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Incumbent {
    pub assignment: Vec<u8>,
    pub objective: f64,
}

impl Incumbent {
    /// Lower objective first, then lexicographically smaller bit vector.
    pub fn cmp_rank(&self, other: &Incumbent) -> Ordering {
        self.objective
            .total_cmp(&other.objective)
            .then_with(|| self.assignment.cmp(&other.assignment))
    }

    pub fn into_solution(self, optimizer: &str, evaluations: u64, iterations: u64) -> Solution {
        Solution {
            assignment: self.assignment,
            objective_value: self.objective,
            optimizer: optimizer.to_string(),
            evaluations,
            iterations,
        }
    }
}

/// `best = min(best, candidate)` under [`Incumbent::cmp_rank`].
pub(crate) fn keep_best(best: Option<Incumbent>, candidate: Option<Incumbent>) -> Option<Incumbent> {
    match (best, candidate) {
        (Some(b), Some(c)) => {
            if c.cmp_rank(&b) == Ordering::Less {
                Some(c)
            } else {
                Some(b)
            }
        }
        (b, None) => b,
        (None, c) => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inc(bits: &[u8], objective: f64) -> Incumbent {
        Incumbent {
            assignment: bits.to_vec(),
            objective,
        }
    }

    #[test]
    fn test_keep_best_prefers_lower_objective() {
        let best = keep_best(Some(inc(&[0, 1], -1.0)), Some(inc(&[1, 0], -2.0)));
        assert_eq!(best, Some(inc(&[1, 0], -2.0)));
    }

    #[test]
    fn test_keep_best_ties_to_lexicographic_smallest() {
        let best = keep_best(Some(inc(&[1, 0], -1.0)), Some(inc(&[0, 1], -1.0)));
        assert_eq!(best, Some(inc(&[0, 1], -1.0)));
        let best = keep_best(Some(inc(&[0, 1], -1.0)), Some(inc(&[1, 0], -1.0)));
        assert_eq!(best, Some(inc(&[0, 1], -1.0)));
    }

    #[test]
    fn test_keep_best_with_empty_sides() {
        assert_eq!(keep_best(None, None), None);
        assert_eq!(keep_best(None, Some(inc(&[1], 0.0))), Some(inc(&[1], 0.0)));
    }

    #[test]
    fn test_config_default_is_exhaustive() {
        let cfg: OptimizerConfig = serde_json::from_str(r#"{"method":"exhaustive"}"#).unwrap();
        assert_eq!(cfg, OptimizerConfig::default());
        assert_eq!(cfg.build().name(), "exhaustive");
    }

    #[test]
    fn test_config_branch_and_bound() {
        let cfg: OptimizerConfig =
            serde_json::from_str(r#"{"method":"branch_and_bound","max_nodes":1000}"#).unwrap();
        let opt = cfg.build();
        assert_eq!(opt.name(), "branch_and_bound");
        assert!(!opt.is_heuristic());
    }

    #[cfg(feature = "heuristics")]
    #[test]
    fn test_config_heuristics() {
        let cfg: OptimizerConfig =
            serde_json::from_str(r#"{"method":"variational","max_iterations":10,"seed":7}"#)
                .unwrap();
        match &cfg {
            OptimizerConfig::Variational(v) => {
                assert_eq!(v.max_iterations, 10);
                assert_eq!(v.seed, Some(7));
                assert_eq!(v.shots, variational::DEFAULT_SHOTS);
            }
            other => panic!("unexpected config {other:?}"),
        }
        assert!(cfg.build().is_heuristic());

        let cfg: OptimizerConfig = serde_json::from_str(r#"{"method":"local_search"}"#).unwrap();
        assert_eq!(cfg.build().name(), "local_search");
    }
}
