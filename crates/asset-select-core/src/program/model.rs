use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::error::AssetSelectError;
use crate::AssetSelectResult;

/// Slack allowed when checking `a . x (sense) b` in floating point.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSense {
    /// a . x == b
    Eq,
    /// a . x <= b
    Le,
    /// a . x >= b
    Ge,
}

impl ConstraintSense {
    fn lp_symbol(self) -> &'static str {
        match self {
            ConstraintSense::Eq => "=",
            ConstraintSense::Le => "<=",
            ConstraintSense::Ge => ">=",
        }
    }
}

/// Dense linear constraint over all program variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub name: String,
    pub coefficients: Vec<f64>,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// a . x
    pub fn activity(&self, x: &[u8]) -> f64 {
        self.coefficients
            .iter()
            .zip(x)
            .filter(|(_, &xi)| xi == 1)
            .map(|(a, _)| *a)
            .sum()
    }

    /// Distance from satisfying the constraint; zero when satisfied.
    pub fn violation(&self, x: &[u8]) -> f64 {
        let lhs = self.activity(x);
        match self.sense {
            ConstraintSense::Eq => (lhs - self.rhs).abs(),
            ConstraintSense::Le => (lhs - self.rhs).max(0.0),
            ConstraintSense::Ge => (self.rhs - lhs).max(0.0),
        }
    }
}

/// `constant + linear . x + x' Q x`, to be minimised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub constant: f64,
    pub linear: Vec<f64>,
    /// Full (not upper-triangular) coefficient matrix.
    pub quadratic: Vec<Vec<f64>>,
}

/// Binary quadratic program: binary variables, quadratic objective,
/// linear constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticProgram {
    pub name: String,
    variables: Vec<String>,
    objective: Objective,
    constraints: Vec<LinearConstraint>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl QuadraticProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            objective: Objective {
                constant: 0.0,
                linear: Vec::new(),
                quadratic: Vec::new(),
            },
            constraints: Vec::new(),
        }
    }

    /// Declare a binary variable and return its index.
    ///
    /// Existing objective and constraint coefficients are padded with zeros.
    pub fn binary_var(&mut self, name: impl Into<String>) -> AssetSelectResult<usize> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AssetSelectError::InvalidInput {
                field: "variable".into(),
                reason: "Variable names must be non-empty".into(),
            });
        }
        if self.variables.contains(&name) {
            return Err(AssetSelectError::InvalidInput {
                field: "variable".into(),
                reason: format!("Variable '{name}' already declared"),
            });
        }
        self.variables.push(name);
        self.objective.linear.push(0.0);
        for row in &mut self.objective.quadratic {
            row.push(0.0);
        }
        self.objective.quadratic.push(vec![0.0; self.variables.len()]);
        for c in &mut self.constraints {
            c.coefficients.push(0.0);
        }
        Ok(self.variables.len() - 1)
    }

    /// Set the objective to `constant + linear . x + x' quadratic x`.
    pub fn minimize(
        &mut self,
        constant: f64,
        linear: Vec<f64>,
        quadratic: Vec<Vec<f64>>,
    ) -> AssetSelectResult<()> {
        let n = self.num_variables();
        if linear.len() != n {
            return Err(AssetSelectError::InvalidInput {
                field: "linear".into(),
                reason: format!("Expected {} coefficients, got {}", n, linear.len()),
            });
        }
        if quadratic.len() != n || quadratic.iter().any(|row| row.len() != n) {
            return Err(AssetSelectError::InvalidInput {
                field: "quadratic".into(),
                reason: format!("Quadratic coefficients must be {n} x {n}"),
            });
        }
        if !constant.is_finite()
            || linear.iter().any(|v| !v.is_finite())
            || quadratic.iter().flatten().any(|v| !v.is_finite())
        {
            return Err(AssetSelectError::InvalidInput {
                field: "objective".into(),
                reason: "Objective coefficients must be finite".into(),
            });
        }
        self.objective = Objective {
            constant,
            linear,
            quadratic,
        };
        Ok(())
    }

    pub fn add_linear_constraint(
        &mut self,
        name: impl Into<String>,
        coefficients: Vec<f64>,
        sense: ConstraintSense,
        rhs: f64,
    ) -> AssetSelectResult<()> {
        let name = name.into();
        if coefficients.len() != self.num_variables() {
            return Err(AssetSelectError::InvalidInput {
                field: "constraint".into(),
                reason: format!(
                    "Constraint '{}' has {} coefficients, expected {}",
                    name,
                    coefficients.len(),
                    self.num_variables()
                ),
            });
        }
        if !rhs.is_finite() || coefficients.iter().any(|v| !v.is_finite()) {
            return Err(AssetSelectError::InvalidInput {
                field: "constraint".into(),
                reason: format!("Constraint '{name}' has non-finite coefficients"),
            });
        }
        if self.constraints.iter().any(|c| c.name == name) {
            return Err(AssetSelectError::InvalidInput {
                field: "constraint".into(),
                reason: format!("Constraint '{name}' already declared"),
            });
        }
        self.constraints.push(LinearConstraint {
            name,
            coefficients,
            sense,
            rhs,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl QuadraticProgram {
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Objective value of a 0/1 assignment.
    pub fn evaluate(&self, x: &[u8]) -> f64 {
        debug_assert_eq!(x.len(), self.num_variables());
        let picked: Vec<usize> = x
            .iter()
            .enumerate()
            .filter(|(_, &xi)| xi == 1)
            .map(|(i, _)| i)
            .collect();

        let linear: f64 = picked.iter().map(|&i| self.objective.linear[i]).sum();
        let quadratic: f64 = picked
            .iter()
            .map(|&i| {
                let row = &self.objective.quadratic[i];
                picked.iter().map(|&j| row[j]).sum::<f64>()
            })
            .sum();

        self.objective.constant + linear + quadratic
    }

    /// Sum of absolute constraint violations.
    pub fn violation(&self, x: &[u8]) -> f64 {
        self.constraints.iter().map(|c| c.violation(x)).sum()
    }

    /// True when `x` is a binary vector of the right length satisfying
    /// every constraint.
    pub fn is_feasible(&self, x: &[u8]) -> bool {
        x.len() == self.num_variables()
            && x.iter().all(|&xi| xi <= 1)
            && self
                .constraints
                .iter()
                .all(|c| c.violation(x) <= FEASIBILITY_TOLERANCE)
    }

    /// Detect an exact-cardinality constraint `sum(x) == k`.
    pub fn cardinality(&self) -> Option<usize> {
        let n = self.num_variables();
        self.constraints.iter().find_map(|c| {
            let all_ones = c.coefficients.iter().all(|&a| a == 1.0);
            let integral = c.rhs.fract() == 0.0 && c.rhs >= 0.0 && c.rhs <= n as f64;
            (c.sense == ConstraintSense::Eq && all_ones && integral).then_some(c.rhs as usize)
        })
    }

    /// Penalty weight for [`QuadraticProgram::to_qubo`].
    ///
    /// It exceeds the objective's range over binary points. When every
    /// equality constraint has integer coefficients and right-hand side, as
    /// the budget constraint does, each violated constraint costs at least
    /// this much, so any infeasible point scores worse than any feasible one.
    /// Fractional constraints can be violated by less than 1 and lose that
    /// guarantee.
    pub fn default_penalty(&self) -> f64 {
        let linear: f64 = self.objective.linear.iter().map(|v| v.abs()).sum();
        let quadratic: f64 = self.objective.quadratic.iter().flatten().map(|v| v.abs()).sum();
        1.0 + linear + quadratic
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl QuadraticProgram {
    /// Fold equality constraints into the objective as
    /// `penalty * (a . x - b)^2`, giving an unconstrained program.
    ///
    /// Inequality constraints would need slack variables and are rejected.
    pub fn to_qubo(&self, penalty: f64) -> AssetSelectResult<QuadraticProgram> {
        if !(penalty.is_finite() && penalty > 0.0) {
            return Err(AssetSelectError::InvalidInput {
                field: "penalty".into(),
                reason: format!("Penalty must be positive and finite, got {penalty}"),
            });
        }
        if let Some(c) = self
            .constraints
            .iter()
            .find(|c| c.sense != ConstraintSense::Eq)
        {
            return Err(AssetSelectError::InvalidInput {
                field: "constraint".into(),
                reason: format!(
                    "Constraint '{}' is an inequality; only equality constraints can be folded into a QUBO",
                    c.name
                ),
            });
        }

        let n = self.num_variables();
        let mut constant = self.objective.constant;
        let mut linear = self.objective.linear.clone();
        let mut quadratic = self.objective.quadratic.clone();

        for c in &self.constraints {
            let a = &c.coefficients;
            let b = c.rhs;
            constant += penalty * b * b;
            for i in 0..n {
                linear[i] -= 2.0 * penalty * b * a[i];
                for j in 0..n {
                    quadratic[i][j] += penalty * a[i] * a[j];
                }
            }
        }

        let mut qubo = QuadraticProgram::new(format!("{}_qubo", self.name));
        for v in &self.variables {
            qubo.binary_var(v.clone())?;
        }
        qubo.minimize(constant, linear, quadratic)?;
        Ok(qubo)
    }

    /// Render in CPLEX LP format.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        let n = self.num_variables();
        let _ = writeln!(out, "\\ Problem name: {}", self.name);
        let _ = writeln!(out);
        let _ = writeln!(out, "Minimize");

        let mut obj = String::from(" obj:");
        let mut first = true;
        for (i, c) in self.objective.linear.iter().enumerate() {
            push_term(&mut obj, *c, &self.variables[i], &mut first);
        }

        // LP quadratic sections are written as [ ... ] / 2.
        let mut quad = String::new();
        let mut quad_first = true;
        for i in 0..n {
            let diag = 2.0 * self.objective.quadratic[i][i];
            push_term(
                &mut quad,
                diag,
                &format!("{}^2", self.variables[i]),
                &mut quad_first,
            );
            for j in (i + 1)..n {
                let off = 2.0 * (self.objective.quadratic[i][j] + self.objective.quadratic[j][i]);
                push_term(
                    &mut quad,
                    off,
                    &format!("{} * {}", self.variables[i], self.variables[j]),
                    &mut quad_first,
                );
            }
        }
        if !quad.is_empty() {
            obj.push_str(if first { " [" } else { " + [" });
            obj.push_str(&quad);
            obj.push_str(" ]/2");
            first = false;
        }
        if self.objective.constant != 0.0 || first {
            push_term(&mut obj, self.objective.constant, "", &mut first);
        }
        let _ = writeln!(out, "{obj}");

        let _ = writeln!(out);
        let _ = writeln!(out, "Subject To");
        for c in &self.constraints {
            let mut row = format!(" {}:", c.name);
            let mut row_first = true;
            for (i, a) in c.coefficients.iter().enumerate() {
                push_term(&mut row, *a, &self.variables[i], &mut row_first);
            }
            if row_first {
                row.push_str(" 0");
            }
            let _ = writeln!(row, " {} {}", c.sense.lp_symbol(), c.rhs);
            out.push_str(&row);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Binaries");
        if n > 0 {
            let _ = writeln!(out, " {}", self.variables.join(" "));
        }
        let _ = writeln!(out, "End");
        out
    }
}

fn push_term(out: &mut String, coef: f64, name: &str, first: &mut bool) {
    if coef == 0.0 && !name.is_empty() {
        return;
    }
    let sign = if coef < 0.0 { "-" } else { "+" };
    let mag = coef.abs();
    let body = match (name.is_empty(), mag == 1.0) {
        (true, _) => format!("{mag}"),
        (false, true) => name.to_string(),
        (false, false) => format!("{mag} {name}"),
    };
    if *first {
        if coef < 0.0 {
            let _ = write!(out, " - {body}");
        } else {
            let _ = write!(out, " {body}");
        }
        *first = false;
    } else {
        let _ = write!(out, " {sign} {body}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn three_var_program() -> QuadraticProgram {
        let mut qp = QuadraticProgram::new("test");
        for v in ["A", "B", "C"] {
            qp.binary_var(v).unwrap();
        }
        qp.minimize(
            0.0,
            vec![-1.0, -2.0, -0.5],
            vec![
                vec![0.5, 0.1, 0.0],
                vec![0.1, 0.5, 0.0],
                vec![0.0, 0.0, 0.5],
            ],
        )
        .unwrap();
        qp.add_linear_constraint("budget", vec![1.0; 3], ConstraintSense::Eq, 2.0)
            .unwrap();
        qp
    }

    #[test]
    fn test_evaluate() {
        let qp = three_var_program();
        // -1 - 2 + (0.5 + 0.1 + 0.1 + 0.5) = -1.8
        assert!((qp.evaluate(&[1, 1, 0]) - (-1.8)).abs() < 1e-12);
        assert_eq!(qp.evaluate(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn test_feasibility_and_cardinality() {
        let qp = three_var_program();
        assert_eq!(qp.cardinality(), Some(2));
        assert!(qp.is_feasible(&[1, 0, 1]));
        assert!(!qp.is_feasible(&[1, 1, 1]));
        assert!(!qp.is_feasible(&[1, 1]));
        assert!(!qp.is_feasible(&[1, 2, 0]));
        assert_eq!(qp.violation(&[1, 1, 1]), 1.0);
    }

    #[test]
    fn test_inequality_is_not_cardinality() {
        let mut qp = QuadraticProgram::new("ineq");
        qp.binary_var("A").unwrap();
        qp.binary_var("B").unwrap();
        qp.add_linear_constraint("cap", vec![1.0, 1.0], ConstraintSense::Le, 1.0)
            .unwrap();
        assert_eq!(qp.cardinality(), None);
        assert!(qp.is_feasible(&[0, 0]));
        assert!(!qp.is_feasible(&[1, 1]));
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let mut qp = QuadraticProgram::new("dup");
        qp.binary_var("A").unwrap();
        assert!(qp.binary_var("A").is_err());
    }

    #[test]
    fn test_dimension_checks() {
        let mut qp = QuadraticProgram::new("dims");
        qp.binary_var("A").unwrap();
        qp.binary_var("B").unwrap();
        assert!(qp.minimize(0.0, vec![1.0], vec![vec![0.0; 2]; 2]).is_err());
        assert!(qp.minimize(0.0, vec![1.0, 1.0], vec![vec![0.0; 2]]).is_err());
        assert!(qp
            .add_linear_constraint("c", vec![1.0], ConstraintSense::Eq, 1.0)
            .is_err());
    }

    #[test]
    fn test_late_variable_pads_coefficients() {
        let mut qp = QuadraticProgram::new("pad");
        qp.binary_var("A").unwrap();
        qp.add_linear_constraint("c", vec![1.0], ConstraintSense::Ge, 1.0)
            .unwrap();
        qp.binary_var("B").unwrap();
        assert_eq!(qp.constraints()[0].coefficients, vec![1.0, 0.0]);
        assert_eq!(qp.objective().quadratic, vec![vec![0.0; 2]; 2]);
    }

    #[test]
    fn test_qubo_matches_objective_on_feasible_points() {
        let qp = three_var_program();
        let penalty = qp.default_penalty();
        let qubo = qp.to_qubo(penalty).unwrap();
        assert!(qubo.constraints().is_empty());

        for x in [[1, 1, 0], [1, 0, 1], [0, 1, 1]] {
            assert!((qubo.evaluate(&x) - qp.evaluate(&x)).abs() < 1e-12);
        }
        // Infeasible points pay penalty * violation^2.
        let x = [1, 1, 1];
        assert!((qubo.evaluate(&x) - (qp.evaluate(&x) + penalty)).abs() < 1e-9);
        let x = [0, 0, 0];
        assert!((qubo.evaluate(&x) - 4.0 * penalty).abs() < 1e-9);
    }

    #[test]
    fn test_qubo_penalty_dominates() {
        let qp = three_var_program();
        let qubo = qp.to_qubo(qp.default_penalty()).unwrap();
        let worst_feasible = [[1, 1, 0], [1, 0, 1], [0, 1, 1]]
            .iter()
            .map(|x| qubo.evaluate(x))
            .fold(f64::MIN, f64::max);
        for x in [[0, 0, 0], [1, 0, 0], [0, 1, 0], [0, 0, 1], [1, 1, 1]] {
            assert!(qubo.evaluate(&x) > worst_feasible);
        }
    }

    #[test]
    fn test_qubo_penalty_dominates_integer_weighted_constraint() {
        let mut qp = QuadraticProgram::new("weighted");
        for v in ["A", "B", "C", "D"] {
            qp.binary_var(v).unwrap();
        }
        qp.minimize(
            0.3,
            vec![-4.0, 1.5, -2.0, 0.5],
            vec![
                vec![1.0, -2.0, 0.0, 0.5],
                vec![-2.0, 0.0, 1.0, 0.0],
                vec![0.0, 1.0, -1.5, 0.0],
                vec![0.5, 0.0, 0.0, 2.0],
            ],
        )
        .unwrap();
        qp.add_linear_constraint("weighted", vec![2.0, 1.0, 1.0, 3.0], ConstraintSense::Eq, 3.0)
            .unwrap();
        let qubo = qp.to_qubo(qp.default_penalty()).unwrap();

        let points: Vec<Vec<u8>> = (0u8..16)
            .map(|m| (0..4).map(|i| (m >> i) & 1).collect())
            .collect();
        let worst_feasible = points
            .iter()
            .filter(|x| qp.is_feasible(x))
            .map(|x| qubo.evaluate(x))
            .fold(f64::MIN, f64::max);
        assert!(worst_feasible > f64::MIN);
        for x in points.iter().filter(|x| !qp.is_feasible(x)) {
            assert!(qubo.evaluate(x) > worst_feasible, "{x:?}");
        }
    }

    #[test]
    fn test_qubo_rejects_inequalities() {
        let mut qp = three_var_program();
        qp.add_linear_constraint("cap", vec![1.0, 0.0, 0.0], ConstraintSense::Le, 1.0)
            .unwrap();
        assert!(qp.to_qubo(1.0).is_err());
        assert!(three_var_program().to_qubo(0.0).is_err());
    }

    #[test]
    fn test_lp_string() {
        let lp = three_var_program().to_lp_string();
        assert!(lp.starts_with("\\ Problem name: test"));
        assert!(lp.contains(" obj: - A - 2 B - 0.5 C + [ A^2 + 0.4 A * B + B^2 + C^2 ]/2"));
        assert!(lp.contains(" budget: A + B + C = 2"));
        assert!(lp.contains("Binaries\n A B C\nEnd"));
    }
}
