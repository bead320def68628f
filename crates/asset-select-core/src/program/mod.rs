pub mod builder;
pub mod model;

pub use builder::{build_portfolio_program, validate_parameters};
pub use model::{ConstraintSense, LinearConstraint, Objective, QuadraticProgram};
