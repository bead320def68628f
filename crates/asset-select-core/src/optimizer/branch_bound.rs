use serde::{Deserialize, Serialize};

use crate::error::AssetSelectError;
use crate::optimizer::{keep_best, DiscreteOptimizer, Incumbent, Solution};
use crate::program::model::QuadraticProgram;
use crate::AssetSelectResult;

/// Bound slack so floating-point noise never prunes an optimal subtree.
const PRUNE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchAndBoundConfig {
    /// Refuse to continue past this many search nodes. `None` = unlimited.
    pub max_nodes: Option<u64>,
}

/// Exact depth-first branch and bound over the binary variables.
///
/// Variables are fixed in index order, the 0-branch first, so leaves are
/// reached in lexicographic order and only strict improvements replace the
/// incumbent. The bound adds, to the fixed part of the objective, the most
/// optimistic contribution each free variable could still make.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBound {
    config: BranchAndBoundConfig,
}

impl BranchAndBound {
    pub fn new(config: BranchAndBoundConfig) -> Self {
        Self { config }
    }
}

impl DiscreteOptimizer for BranchAndBound {
    fn name(&self) -> &str {
        "branch_and_bound"
    }

    fn solve(&self, program: &QuadraticProgram) -> AssetSelectResult<Solution> {
        let n = program.num_variables();
        if n == 0 {
            return Err(AssetSelectError::InvalidInput {
                field: "program".into(),
                reason: "Program has no variables".into(),
            });
        }

        let mut search = Search {
            program,
            n,
            cardinality: program.cardinality(),
            max_nodes: self.config.max_nodes,
            best: None,
            nodes: 0,
            evaluations: 0,
        };
        let mut x = vec![0u8; n];
        search.descend(0, &mut x, 0, program.objective().constant)?;

        tracing::debug!(
            variables = n,
            nodes = search.nodes,
            leaves = search.evaluations,
            "branch and bound finished"
        );

        let (evaluations, nodes) = (search.evaluations, search.nodes);
        search
            .best
            .map(|b| b.into_solution(self.name(), evaluations, nodes))
            .ok_or_else(|| {
                AssetSelectError::NoFeasibleSolution(
                    "Branch and bound exhausted the search tree without a feasible leaf".into(),
                )
            })
    }
}

struct Search<'a> {
    program: &'a QuadraticProgram,
    n: usize,
    cardinality: Option<usize>,
    max_nodes: Option<u64>,
    best: Option<Incumbent>,
    nodes: u64,
    evaluations: u64,
}

impl Search<'_> {
    /// `fixed` is the objective of the variables `0..depth` as assigned in `x`.
    fn descend(
        &mut self,
        depth: usize,
        x: &mut Vec<u8>,
        ones: usize,
        fixed: f64,
    ) -> AssetSelectResult<()> {
        self.nodes += 1;
        if let Some(limit) = self.max_nodes {
            if self.nodes > limit {
                return Err(AssetSelectError::InvalidInput {
                    field: "max_nodes".into(),
                    reason: format!("Search exceeded {limit} nodes"),
                });
            }
        }

        if depth == self.n {
            if self.program.is_feasible(x) {
                self.evaluations += 1;
                let objective = self.program.evaluate(x);
                let candidate = Incumbent {
                    assignment: x.clone(),
                    objective,
                };
                self.best = keep_best(self.best.take(), Some(candidate));
            }
            return Ok(());
        }

        let Some(bound) = self.lower_bound(depth, x, ones, fixed) else {
            return Ok(());
        };
        if let Some(best) = &self.best {
            if bound > best.objective + PRUNE_EPSILON {
                return Ok(());
            }
        }

        let free_after = self.n - depth - 1;
        let (try_zero, try_one) = match self.cardinality {
            Some(k) => (ones + free_after >= k, ones < k),
            None => (true, true),
        };

        if try_zero {
            x[depth] = 0;
            self.descend(depth + 1, x, ones, fixed)?;
        }
        if try_one {
            let gain = self.marginal_fixed(depth, x);
            x[depth] = 1;
            self.descend(depth + 1, x, ones + 1, fixed + gain)?;
            x[depth] = 0;
        }
        Ok(())
    }

    /// Exact objective change from setting `x[d] = 1` given `x[0..d]`.
    fn marginal_fixed(&self, d: usize, x: &[u8]) -> f64 {
        let obj = self.program.objective();
        let q = &obj.quadratic;
        let cross: f64 = (0..d).filter(|&i| x[i] == 1).map(|i| q[i][d] + q[d][i]).sum();
        obj.linear[d] + q[d][d] + cross
    }

    /// Lower bound on any completion of `x[0..depth]`, or `None` when no
    /// completion can meet the cardinality.
    fn lower_bound(&self, depth: usize, x: &[u8], ones: usize, fixed: f64) -> Option<f64> {
        let obj = self.program.objective();
        let q = &obj.quadratic;
        let free: Vec<usize> = (depth..self.n).collect();

        let mut optimistic: Vec<f64> = free
            .iter()
            .map(|&j| {
                let with_fixed: f64 = (0..depth)
                    .filter(|&i| x[i] == 1)
                    .map(|i| q[i][j] + q[j][i])
                    .sum();
                // Each free pair is shared half and half between its members.
                let with_free: f64 = free
                    .iter()
                    .filter(|&&l| l != j)
                    .map(|&l| (0.5 * (q[j][l] + q[l][j])).min(0.0))
                    .sum();
                obj.linear[j] + q[j][j] + with_fixed + with_free
            })
            .collect();

        match self.cardinality {
            Some(k) => {
                let remaining = k.checked_sub(ones)?;
                if remaining > free.len() {
                    return None;
                }
                optimistic.sort_by(|a, b| a.total_cmp(b));
                Some(fixed + optimistic.iter().take(remaining).sum::<f64>())
            }
            None => Some(fixed + optimistic.iter().map(|v| v.min(0.0)).sum::<f64>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::exhaustive::ExhaustiveSearch;
    use crate::program::model::ConstraintSense;

    fn lcg(state: &mut u64) -> f64 {
        *state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((*state >> 11) as f64) / ((1u64 << 53) as f64)
    }

    fn random_program(n: usize, k: usize, seed: u64) -> QuadraticProgram {
        let mut state = seed;
        let mut qp = QuadraticProgram::new("random");
        for i in 0..n {
            qp.binary_var(format!("x{i}")).unwrap();
        }
        let linear: Vec<f64> = (0..n).map(|_| lcg(&mut state) - 0.5).collect();
        let mut quadratic = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let v = lcg(&mut state) - 0.5;
                quadratic[i][j] = v;
                quadratic[j][i] = v;
            }
        }
        qp.minimize(0.0, linear, quadratic).unwrap();
        qp.add_linear_constraint("budget", vec![1.0; n], ConstraintSense::Eq, k as f64)
            .unwrap();
        qp
    }

    #[test]
    fn test_matches_exhaustive_on_random_programs() {
        for seed in 1..=12u64 {
            let n = 5 + (seed as usize % 6);
            let k = 1 + (seed as usize % (n - 1));
            let qp = random_program(n, k, seed);
            let exact = ExhaustiveSearch::default().solve(&qp).unwrap();
            let bb = BranchAndBound::default().solve(&qp).unwrap();
            assert!(
                (exact.objective_value - bb.objective_value).abs() < 1e-6,
                "seed {seed}: exhaustive {} vs branch and bound {}",
                exact.objective_value,
                bb.objective_value
            );
            assert_eq!(bb.num_selected(), k);
        }
    }

    #[test]
    fn test_prunes_nodes() {
        let qp = random_program(12, 4, 99);
        let bb = BranchAndBound::default().solve(&qp).unwrap();
        // A full binary tree of depth 12 has 8191 nodes.
        assert!(bb.iterations < 8191);
    }

    #[test]
    fn test_without_cardinality() {
        let mut qp = QuadraticProgram::new("free");
        for v in ["a", "b", "c"] {
            qp.binary_var(v).unwrap();
        }
        qp.minimize(
            1.0,
            vec![-1.0, -1.0, 0.5],
            vec![vec![0.0, 2.0, 0.0], vec![2.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]],
        )
        .unwrap();
        let bb = BranchAndBound::default().solve(&qp).unwrap();
        let exact = ExhaustiveSearch::default().solve(&qp).unwrap();
        assert_eq!(bb.assignment, exact.assignment);
        assert_eq!(bb.assignment, vec![0, 1, 0]);
        assert_eq!(bb.objective_value, 0.0);
    }

    #[test]
    fn test_infeasible() {
        let mut qp = random_program(4, 2, 5);
        qp.add_linear_constraint("first_two", vec![1.0, 1.0, 0.0, 0.0], ConstraintSense::Ge, 3.0)
            .unwrap();
        let err = BranchAndBound::default().solve(&qp).unwrap_err();
        assert!(matches!(err, AssetSelectError::NoFeasibleSolution(_)));
    }

    #[test]
    fn test_node_limit() {
        let qp = random_program(10, 5, 3);
        let bb = BranchAndBound::new(BranchAndBoundConfig { max_nodes: Some(3) });
        let err = bb.solve(&qp).unwrap_err();
        assert!(matches!(err, AssetSelectError::InvalidInput { .. }));
    }
}
