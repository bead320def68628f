use serde::{Deserialize, Serialize};

use crate::error::AssetSelectError;
use crate::optimizer::{keep_best, DiscreteOptimizer, Incumbent, Solution};
use crate::program::model::QuadraticProgram;
use crate::AssetSelectResult;

/// Upper bound on the number of candidates enumerated before refusing.
pub const DEFAULT_ENUMERATION_LIMIT: u64 = 5_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhaustiveConfig {
    /// Refuse programs with more candidates than this.
    pub enumeration_limit: u64,
}

impl Default for ExhaustiveConfig {
    fn default() -> Self {
        Self {
            enumeration_limit: DEFAULT_ENUMERATION_LIMIT,
        }
    }
}

/// Reference optimizer: evaluates every candidate.
///
/// With a `sum(x) == k` constraint only the C(N, k) weight-k vectors are
/// visited; otherwise all 2^N vectors are.
#[derive(Debug, Clone, Default)]
pub struct ExhaustiveSearch {
    config: ExhaustiveConfig,
}

impl ExhaustiveSearch {
    pub fn new(config: ExhaustiveConfig) -> Self {
        Self { config }
    }
}

impl DiscreteOptimizer for ExhaustiveSearch {
    fn name(&self) -> &str {
        "exhaustive"
    }

    fn solve(&self, program: &QuadraticProgram) -> AssetSelectResult<Solution> {
        let n = program.num_variables();
        if n == 0 {
            return Err(AssetSelectError::InvalidInput {
                field: "program".into(),
                reason: "Program has no variables".into(),
            });
        }

        let cardinality = program.cardinality();
        let candidates = match cardinality {
            Some(k) => binomial(n, k),
            None => 1u64.checked_shl(n as u32).unwrap_or(u64::MAX),
        };
        if candidates > self.config.enumeration_limit {
            return Err(AssetSelectError::InvalidInput {
                field: "enumeration_limit".into(),
                reason: format!(
                    "{} candidates exceed the enumeration limit of {}",
                    candidates, self.config.enumeration_limit
                ),
            });
        }

        let evaluate = |(best, evaluations): (Option<Incumbent>, u64), x: Vec<u8>| {
            if !program.is_feasible(&x) {
                return (best, evaluations);
            }
            let objective = program.evaluate(&x);
            let candidate = Incumbent {
                assignment: x,
                objective,
            };
            (keep_best(best, Some(candidate)), evaluations + 1)
        };

        let (best, evaluations) = match cardinality {
            Some(k) => Combinations::new(n, k)
                .map(|idx| indices_to_bits(n, &idx))
                .fold((None, 0u64), evaluate),
            None => (0..candidates)
                .map(|mask| (0..n).map(|i| ((mask >> i) & 1) as u8).collect::<Vec<u8>>())
                .fold((None, 0u64), evaluate),
        };

        tracing::debug!(
            variables = n,
            candidates,
            feasible = evaluations,
            "exhaustive enumeration finished"
        );

        best.map(|b| b.into_solution(self.name(), evaluations, candidates))
            .ok_or_else(|| {
                AssetSelectError::NoFeasibleSolution(format!(
                    "None of the {candidates} enumerated assignments satisfies the constraints"
                ))
            })
    }
}

/// C(n, k), saturating at `u64::MAX`.
pub(crate) fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k) as u128;
    let n = n as u128;
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) / (i + 1);
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

pub(crate) fn indices_to_bits(n: usize, indices: &[usize]) -> Vec<u8> {
    let mut bits = vec![0u8; n];
    for &i in indices {
        bits[i] = 1;
    }
    bits
}

/// k-subsets of `0..n` as ascending index lists, in lexicographic order.
pub(crate) struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            started: false,
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }

        let k = self.indices.len();
        // Rightmost index that can still move right.
        let Some(i) = (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) else {
            self.done = true;
            return None;
        };
        self.indices[i] += 1;
        for j in (i + 1)..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::model::ConstraintSense;

    fn program(linear: Vec<f64>, quadratic: Vec<Vec<f64>>, k: Option<f64>) -> QuadraticProgram {
        let n = linear.len();
        let mut qp = QuadraticProgram::new("t");
        for i in 0..n {
            qp.binary_var(format!("x{i}")).unwrap();
        }
        qp.minimize(0.0, linear, quadratic).unwrap();
        if let Some(k) = k {
            qp.add_linear_constraint("budget", vec![1.0; n], ConstraintSense::Eq, k)
                .unwrap();
        }
        qp
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 2), 10);
        assert_eq!(binomial(5, 0), 1);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(40, 20), 137_846_528_820);
    }

    #[test]
    fn test_combinations_order() {
        let all: Vec<Vec<usize>> = Combinations::new(4, 2).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(3, 0).count(), 1);
        assert_eq!(Combinations::new(3, 3).count(), 1);
    }

    #[test]
    fn test_picks_minimum_with_cardinality() {
        let qp = program(vec![-1.0, -3.0, -2.0], vec![vec![0.0; 3]; 3], Some(2.0));
        let s = ExhaustiveSearch::default().solve(&qp).unwrap();
        assert_eq!(s.assignment, vec![0, 1, 1]);
        assert_eq!(s.objective_value, -5.0);
        assert_eq!(s.iterations, 3);
        assert_eq!(s.optimizer, "exhaustive");
    }

    #[test]
    fn test_tie_breaks_lexicographically() {
        // All 2-subsets score the same.
        let qp = program(vec![-1.0; 4], vec![vec![0.0; 4]; 4], Some(2.0));
        let s = ExhaustiveSearch::default().solve(&qp).unwrap();
        assert_eq!(s.assignment, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_unconstrained_enumerates_all() {
        let qp = program(
            vec![-1.0, 2.0, -0.5],
            vec![vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]],
            None,
        );
        let s = ExhaustiveSearch::default().solve(&qp).unwrap();
        assert_eq!(s.assignment, vec![1, 0, 0]);
        assert_eq!(s.iterations, 8);
    }

    #[test]
    fn test_infeasible_extra_constraint() {
        let mut qp = program(vec![-1.0; 3], vec![vec![0.0; 3]; 3], Some(2.0));
        qp.add_linear_constraint("at_most_one", vec![1.0; 3], ConstraintSense::Le, 1.0)
            .unwrap();
        let err = ExhaustiveSearch::default().solve(&qp).unwrap_err();
        assert!(matches!(err, AssetSelectError::NoFeasibleSolution(_)));
    }

    #[test]
    fn test_enumeration_limit() {
        let qp = program(vec![0.0; 10], vec![vec![0.0; 10]; 10], Some(5.0));
        let opt = ExhaustiveSearch::new(ExhaustiveConfig {
            enumeration_limit: 100,
        });
        let err = opt.solve(&qp).unwrap_err();
        assert!(matches!(err, AssetSelectError::InvalidInput { ref field, .. } if field == "enumeration_limit"));
    }
}
