pub mod balanced;
pub mod engine;
pub mod minimize;
pub mod primitives;

pub use engine::{calculate, SolverInput, SolverOutput, Strategy};
