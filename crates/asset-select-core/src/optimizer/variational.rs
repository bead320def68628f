use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::AssetSelectError;
use crate::optimizer::{keep_best, DiscreteOptimizer, Incumbent, Solution};
use crate::program::model::QuadraticProgram;
use crate::AssetSelectResult;

pub const DEFAULT_MAX_ITERATIONS: u64 = 100;
pub const DEFAULT_SHOTS: usize = 128;
pub const DEFAULT_ELITE_FRACTION: f64 = 0.2;
pub const DEFAULT_LEARNING_RATE: f64 = 0.5;
pub const DEFAULT_PROBABILITY_FLOOR: f64 = 0.02;
pub const DEFAULT_TOLERANCE: f64 = 1e-9;
pub const DEFAULT_PATIENCE: u64 = 20;

// ---------------------------------------------------------------------------
// Sampling backend
// ---------------------------------------------------------------------------

/// Draws bitstrings from a parameterised distribution.
///
/// `probabilities[i]` is the current parameter for variable `i`; every
/// returned sample must have `probabilities.len()` entries, each 0 or 1.
pub trait SamplingBackend: Send + Sync {
    fn name(&self) -> &str;

    fn sample(
        &self,
        probabilities: &[f64],
        shots: usize,
        rng: &mut StdRng,
    ) -> AssetSelectResult<Vec<Vec<u8>>>;
}

/// Independent Bernoulli draw per variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BernoulliBackend;

impl SamplingBackend for BernoulliBackend {
    fn name(&self) -> &str {
        "bernoulli"
    }

    fn sample(
        &self,
        probabilities: &[f64],
        shots: usize,
        rng: &mut StdRng,
    ) -> AssetSelectResult<Vec<Vec<u8>>> {
        Ok((0..shots)
            .map(|_| {
                probabilities
                    .iter()
                    .map(|&p| u8::from(rng.gen::<f64>() < p))
                    .collect()
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationalConfig {
    /// Parameter refinement rounds (default 100).
    pub max_iterations: u64,
    /// Samples drawn per round (default 128).
    pub shots: usize,
    /// Share of lowest-energy samples the parameters move toward (default 0.2).
    pub elite_fraction: f64,
    /// Step toward the elite frequencies, in (0, 1] (default 0.5).
    pub learning_rate: f64,
    /// Parameters are kept inside [floor, 1 - floor] (default 0.02).
    pub probability_floor: f64,
    /// Constraint penalty; the program's default penalty when unset.
    pub penalty: Option<f64>,
    /// Minimum best-objective improvement that resets the patience counter.
    pub tolerance: f64,
    /// Stop after this many rounds without improvement (default 20).
    pub patience: u64,
    pub seed: Option<u64>,
}

impl Default for VariationalConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            shots: DEFAULT_SHOTS,
            elite_fraction: DEFAULT_ELITE_FRACTION,
            learning_rate: DEFAULT_LEARNING_RATE,
            probability_floor: DEFAULT_PROBABILITY_FLOOR,
            penalty: None,
            tolerance: DEFAULT_TOLERANCE,
            patience: DEFAULT_PATIENCE,
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Variational sampling over the penalised (QUBO) form of a program.
///
/// Each round the backend samples bitstrings from the current per-variable
/// selection probabilities; samples are scored by QUBO energy and the
/// probabilities are pulled toward the elite samples. Only feasible samples
/// can become the answer, scored by the original objective.
pub struct VariationalSampler {
    config: VariationalConfig,
    backend: Box<dyn SamplingBackend>,
}

impl VariationalSampler {
    pub fn new(config: VariationalConfig) -> Self {
        Self::with_backend(config, Box::new(BernoulliBackend))
    }

    pub fn with_backend(config: VariationalConfig, backend: Box<dyn SamplingBackend>) -> Self {
        Self { config, backend }
    }

    fn validate(&self) -> AssetSelectResult<()> {
        let c = &self.config;
        if c.shots == 0 {
            return Err(AssetSelectError::InvalidInput {
                field: "shots".into(),
                reason: "At least one shot per round is required".into(),
            });
        }
        if !(c.elite_fraction > 0.0 && c.elite_fraction <= 1.0) {
            return Err(AssetSelectError::InvalidInput {
                field: "elite_fraction".into(),
                reason: format!("Must be in (0, 1], got {}", c.elite_fraction),
            });
        }
        if !(c.learning_rate > 0.0 && c.learning_rate <= 1.0) {
            return Err(AssetSelectError::InvalidInput {
                field: "learning_rate".into(),
                reason: format!("Must be in (0, 1], got {}", c.learning_rate),
            });
        }
        if !(c.probability_floor >= 0.0 && c.probability_floor < 0.5) {
            return Err(AssetSelectError::InvalidInput {
                field: "probability_floor".into(),
                reason: format!("Must be in [0, 0.5), got {}", c.probability_floor),
            });
        }
        if !(c.tolerance.is_finite() && c.tolerance >= 0.0) {
            return Err(AssetSelectError::InvalidInput {
                field: "tolerance".into(),
                reason: format!("Must be finite and >= 0, got {}", c.tolerance),
            });
        }
        Ok(())
    }

    fn draw(
        &self,
        probabilities: &[f64],
        rng: &mut StdRng,
    ) -> AssetSelectResult<Vec<Vec<u8>>> {
        let backend = self.backend.name();
        let samples = self
            .backend
            .sample(probabilities, self.config.shots, rng)
            .map_err(|e| match e {
                AssetSelectError::SolverBackendUnavailable { .. } => e,
                other => AssetSelectError::SolverBackendUnavailable {
                    backend: backend.to_string(),
                    reason: other.to_string(),
                },
            })?;

        if samples.is_empty() {
            return Err(AssetSelectError::SolverBackendUnavailable {
                backend: backend.to_string(),
                reason: "Backend returned no samples".into(),
            });
        }
        let n = probabilities.len();
        if let Some(bad) = samples
            .iter()
            .find(|s| s.len() != n || s.iter().any(|&b| b > 1))
        {
            return Err(AssetSelectError::SolverBackendUnavailable {
                backend: backend.to_string(),
                reason: format!("Malformed sample {bad:?} for {n} variables"),
            });
        }
        Ok(samples)
    }
}

impl DiscreteOptimizer for VariationalSampler {
    fn name(&self) -> &str {
        "variational"
    }

    fn is_heuristic(&self) -> bool {
        true
    }

    fn solve(&self, program: &QuadraticProgram) -> AssetSelectResult<Solution> {
        self.validate()?;
        let n = program.num_variables();
        if n == 0 {
            return Err(AssetSelectError::InvalidInput {
                field: "program".into(),
                reason: "Program has no variables".into(),
            });
        }

        let c = &self.config;
        let penalty = c.penalty.unwrap_or_else(|| program.default_penalty());
        let qubo = program.to_qubo(penalty)?;

        let mut rng = match c.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let floor = c.probability_floor;
        let start = match program.cardinality() {
            Some(k) => k as f64 / n as f64,
            None => 0.5,
        };
        let mut probabilities = vec![start.clamp(floor, 1.0 - floor); n];

        let mut best: Option<Incumbent> = None;
        let mut evaluations = 0u64;
        let mut stall = 0u64;
        let mut rounds = 0u64;

        while rounds < c.max_iterations {
            rounds += 1;
            let samples = self.draw(&probabilities, &mut rng)?;

            let mut scored: Vec<(f64, &Vec<u8>)> = samples
                .iter()
                .map(|s| (qubo.evaluate(s), s))
                .collect();
            evaluations += scored.len() as u64;

            let previous_best = best.as_ref().map(|b| b.objective);
            best = scored
                .iter()
                .filter(|(_, s)| program.is_feasible(s))
                .map(|(_, s)| Incumbent {
                    assignment: (*s).clone(),
                    objective: program.evaluate(s),
                })
                .fold(best, |acc, cand| keep_best(acc, Some(cand)));

            // Cross-entropy step toward the elite samples.
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            let elite = ((scored.len() as f64 * c.elite_fraction).ceil() as usize)
                .clamp(1, scored.len());
            for (i, p) in probabilities.iter_mut().enumerate() {
                let freq = scored[..elite]
                    .iter()
                    .filter(|(_, s)| s[i] == 1)
                    .count() as f64
                    / elite as f64;
                *p = ((1.0 - c.learning_rate) * *p + c.learning_rate * freq)
                    .clamp(floor, 1.0 - floor);
            }

            match (previous_best, best.as_ref()) {
                (Some(before), Some(after)) if before - after.objective > c.tolerance => stall = 0,
                (None, Some(_)) => stall = 0,
                (Some(_), Some(_)) => {
                    stall += 1;
                    if stall >= c.patience {
                        tracing::debug!(rounds, "variational sampler converged");
                        break;
                    }
                }
                // Keep sampling until something feasible shows up.
                _ => {}
            }
        }

        tracing::debug!(
            backend = self.backend.name(),
            rounds,
            evaluations,
            best = ?best.as_ref().map(|b| b.objective),
            "variational sampler finished"
        );

        best.map(|b| b.into_solution(self.name(), evaluations, rounds))
            .ok_or_else(|| {
                AssetSelectError::NoFeasibleSolution(format!(
                    "No feasible sample in {rounds} rounds of {} shots",
                    c.shots
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
