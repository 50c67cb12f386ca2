//! Registration orchestrator.
//!
//! [`Normalization`] owns at most one background run of the
//! [`StageRunner`] pipeline: two affine passes, then an optional nonlinear
//! field fit. [`CompositeMapper`] maps "from" voxel indices into the "to"
//! volume through whatever the latest run has produced, and stays usable
//! while a run is in flight.

pub mod state;
pub mod runner;
pub mod session;
pub mod mapper;

pub use state::{RegistrationState, TransformState};
pub use runner::StageRunner;
pub use session::Normalization;
pub use mapper::CompositeMapper;
