//! Two-stage volumetric registration: a global affine search followed by an
//! optional smooth nonlinear field, run in a cancellable background session.

pub mod error;
pub mod config;
pub mod progress;
pub mod metric;
pub mod linear;
pub mod bfnorm;
pub mod normalization;

pub use error::{RegistrationError, Result};
pub use config::{FieldConfig, MutualInformationConfig, NormalizationConfig, RunRequest, SearchConfig};
pub use progress::{CancellationToken, RegistrationProgress};
pub use normalization::{CompositeMapper, Normalization, RegistrationState, StageRunner, TransformState};
