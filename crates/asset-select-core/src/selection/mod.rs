//! Turning optimizer output into a portfolio decision, and the end-to-end
//! pipeline from prices to selection.

pub mod interpreter;
pub mod pipeline;

pub use interpreter::{interpret_solution, SelectionResult};
pub use pipeline::{select_assets, select_assets_with, SelectionOutput, SelectionRequest};
