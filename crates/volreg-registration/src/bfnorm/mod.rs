//! Nonlinear refinement: a smooth displacement field over the "to" volume,
//! expanded in a separable cosine basis, and the solver that fits it.

pub mod mapping;
pub mod solver;

pub use mapping::{CosineBasis, DeformationField};
pub use solver::{BfnormSolver, FieldSolver};
