use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::AssetSelectError;
use crate::optimizer::{keep_best, DiscreteOptimizer, Incumbent, Solution};
use crate::program::model::QuadraticProgram;
use crate::AssetSelectResult;

pub const DEFAULT_MAX_ITERATIONS: u64 = 2_000;
pub const DEFAULT_RESTARTS: usize = 4;
pub const DEFAULT_COOLING_RATE: f64 = 0.995;
pub const DEFAULT_TOLERANCE: f64 = 1e-9;
pub const DEFAULT_PATIENCE: u64 = 250;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchConfig {
    /// Move proposals per chain (default 2000).
    pub max_iterations: u64,
    /// Independent chains, each on its own thread (default 4).
    pub restarts: usize,
    /// Starting Metropolis temperature; derived from coefficient scale when unset.
    pub initial_temperature: Option<f64>,
    /// Geometric cooling factor applied every iteration (default 0.995).
    pub cooling_rate: f64,
    /// Minimum best-objective improvement that resets the patience counter.
    pub tolerance: f64,
    /// Stop a chain after this many iterations without improvement (default 250).
    pub patience: u64,
    /// Seed for reproducible runs; chain `r` uses `seed + r`.
    pub seed: Option<u64>,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            restarts: DEFAULT_RESTARTS,
            initial_temperature: None,
            cooling_rate: DEFAULT_COOLING_RATE,
            tolerance: DEFAULT_TOLERANCE,
            patience: DEFAULT_PATIENCE,
            seed: None,
        }
    }
}

/// Stochastic local search with simulated-annealing acceptance.
///
/// Under a `sum(x) == k` constraint moves swap one selected variable for
/// an unselected one, so every visited point keeps the cardinality.
/// Otherwise single bits are flipped and constraint violations are priced
/// with the program's default penalty.
#[derive(Debug, Clone, Default)]
pub struct LocalSearch {
    config: LocalSearchConfig,
}

impl LocalSearch {
    pub fn new(config: LocalSearchConfig) -> Self {
        Self { config }
    }

    fn validate(&self) -> AssetSelectResult<()> {
        let c = &self.config;
        if c.restarts == 0 {
            return Err(AssetSelectError::InvalidInput {
                field: "restarts".into(),
                reason: "At least one chain is required".into(),
            });
        }
        if !(c.cooling_rate > 0.0 && c.cooling_rate <= 1.0) {
            return Err(AssetSelectError::InvalidInput {
                field: "cooling_rate".into(),
                reason: format!("Must be in (0, 1], got {}", c.cooling_rate),
            });
        }
        if let Some(t) = c.initial_temperature {
            if !(t.is_finite() && t >= 0.0) {
                return Err(AssetSelectError::InvalidInput {
                    field: "initial_temperature".into(),
                    reason: format!("Must be finite and >= 0, got {t}"),
                });
            }
        }
        if !(c.tolerance.is_finite() && c.tolerance >= 0.0) {
            return Err(AssetSelectError::InvalidInput {
                field: "tolerance".into(),
                reason: format!("Must be finite and >= 0, got {}", c.tolerance),
            });
        }
        Ok(())
    }
}

struct ChainOutcome {
    best: Option<Incumbent>,
    evaluations: u64,
    iterations: u64,
}

impl DiscreteOptimizer for LocalSearch {
    fn name(&self) -> &str {
        "local_search"
    }

    fn is_heuristic(&self) -> bool {
        true
    }

    fn solve(&self, program: &QuadraticProgram) -> AssetSelectResult<Solution> {
        self.validate()?;
        if program.num_variables() == 0 {
            return Err(AssetSelectError::InvalidInput {
                field: "program".into(),
                reason: "Program has no variables".into(),
            });
        }

        let config = &self.config;
        let temperature = config
            .initial_temperature
            .unwrap_or_else(|| auto_temperature(program));

        // Chains share nothing mutable; their results are reduced after join.
        let outcomes: Vec<AssetSelectResult<ChainOutcome>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..config.restarts)
                .map(|r| {
                    let seed = config.seed.map(|s| s.wrapping_add(r as u64));
                    scope.spawn(move || run_chain(program, config, temperature, seed))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().map_err(|_| AssetSelectError::SolverBackendUnavailable {
                        backend: "local_search".into(),
                        reason: "Search thread panicked".into(),
                    })
                })
                .collect()
        });

        let mut best = None;
        let mut evaluations = 0u64;
        let mut iterations = 0u64;
        for outcome in outcomes {
            let outcome = outcome?;
            best = keep_best(best, outcome.best);
            evaluations += outcome.evaluations;
            iterations += outcome.iterations;
        }

        tracing::debug!(
            chains = config.restarts,
            evaluations,
            iterations,
            best = ?best.as_ref().map(|b| b.objective),
            "local search finished"
        );

        best.map(|b| b.into_solution(self.name(), evaluations, iterations))
            .ok_or_else(|| {
                AssetSelectError::NoFeasibleSolution(format!(
                    "Local search visited no feasible assignment in {iterations} iterations"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

fn run_chain(
    program: &QuadraticProgram,
    config: &LocalSearchConfig,
    initial_temperature: f64,
    seed: Option<u64>,
) -> ChainOutcome {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let n = program.num_variables();
    let cardinality = program.cardinality();
    let penalty = program.default_penalty();
    let energy = |x: &[u8]| program.evaluate(x) + penalty * program.violation(x);

    let mut x = random_start(n, cardinality, &mut rng);
    let mut current = energy(&x);
    let mut evaluations = 1u64;
    let mut best = feasible_incumbent(program, &x);

    let mut temperature = initial_temperature;
    let mut stall = 0u64;
    let mut iterations = 0u64;

    while iterations < config.max_iterations {
        iterations += 1;

        let Some(undo) = propose(&mut x, cardinality, &mut rng) else {
            // Nothing can move (k == 0 or k == n).
            break;
        };
        let proposed = energy(&x);
        evaluations += 1;

        let delta = proposed - current;
        let accept = delta <= 0.0
            || (temperature > 0.0 && rng.gen::<f64>() < (-delta / temperature).exp());

        let previous_best = best.as_ref().map(|b| b.objective);
        if accept {
            current = proposed;
            best = keep_best(best, feasible_incumbent(program, &x));
        } else {
            undo.apply(&mut x);
        }

        let improved = match (previous_best, best.as_ref()) {
            (Some(before), Some(after)) => before - after.objective > config.tolerance,
            (None, Some(_)) => true,
            _ => false,
        };
        if improved {
            stall = 0;
        } else {
            stall += 1;
            if stall >= config.patience {
                break;
            }
        }

        temperature *= config.cooling_rate;
    }

    ChainOutcome {
        best,
        evaluations,
        iterations,
    }
}

fn feasible_incumbent(program: &QuadraticProgram, x: &[u8]) -> Option<Incumbent> {
    program.is_feasible(x).then(|| Incumbent {
        assignment: x.to_vec(),
        objective: program.evaluate(x),
    })
}

fn random_start(n: usize, cardinality: Option<usize>, rng: &mut StdRng) -> Vec<u8> {
    match cardinality {
        Some(k) => {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(rng);
            let mut x = vec![0u8; n];
            for &i in order.iter().take(k) {
                x[i] = 1;
            }
            x
        }
        None => (0..n).map(|_| u8::from(rng.gen_bool(0.5))).collect(),
    }
}

/// How to revert a proposed move.
enum Undo {
    Flip(usize),
    Swap { out: usize, inn: usize },
}

impl Undo {
    fn apply(self, x: &mut [u8]) {
        match self {
            Undo::Flip(i) => x[i] ^= 1,
            Undo::Swap { out, inn } => {
                x[out] = 1;
                x[inn] = 0;
            }
        }
    }
}

fn propose(x: &mut [u8], cardinality: Option<usize>, rng: &mut StdRng) -> Option<Undo> {
    let n = x.len();
    match cardinality {
        Some(k) if k == 0 || k == n => None,
        Some(_) => {
            let selected: Vec<usize> = (0..n).filter(|&i| x[i] == 1).collect();
            let unselected: Vec<usize> = (0..n).filter(|&i| x[i] == 0).collect();
            let out = *selected.choose(rng)?;
            let inn = *unselected.choose(rng)?;
            x[out] = 0;
            x[inn] = 1;
            Some(Undo::Swap { out, inn })
        }
        None => {
            let i = rng.gen_range(0..n);
            x[i] ^= 1;
            Some(Undo::Flip(i))
        }
    }
}

/// A tenth of the largest single-variable coefficient mass.
fn auto_temperature(program: &QuadraticProgram) -> f64 {
    let obj = program.objective();
    let scale = obj
        .linear
        .iter()
        .zip(&obj.quadratic)
        .map(|(l, row)| l.abs() + row.iter().map(|q| q.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    0.1 * scale
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
