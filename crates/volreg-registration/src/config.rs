//! Configuration of the registration pipeline.

use serde::{Deserialize, Serialize};
use volreg_core::transform::AffineParameters;
use crate::error::{RegistrationError, Result};
use crate::linear::RegType;
use crate::metric::CostType;

/// Settings for the derivative-free affine search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Initial translation step, in voxels of the "to" image.
    pub translation_step: f64,
    /// Initial rotation step in radians.
    pub rotation_step: f64,
    /// Initial scaling step.
    pub scaling_step: f64,
    /// Initial shear step.
    pub shear_step: f64,
    /// The search stops once steps shrink below this fraction of their start.
    pub min_step_ratio: f64,
    /// Upper bound on sweeps over the active parameters.
    pub max_sweeps: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            translation_step: 4.0,
            rotation_step: 0.1,
            scaling_step: 0.05,
            shear_step: 0.05,
            min_step_ratio: 1.0 / 64.0,
            max_sweeps: 50,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation_step(mut self, voxels: f64) -> Self {
        self.translation_step = voxels;
        self
    }

    pub fn with_rotation_step(mut self, radians: f64) -> Self {
        self.rotation_step = radians;
        self
    }

    pub fn with_scaling_step(mut self, step: f64) -> Self {
        self.scaling_step = step;
        self
    }

    pub fn with_shear_step(mut self, step: f64) -> Self {
        self.shear_step = step;
        self
    }

    pub fn with_min_step_ratio(mut self, ratio: f64) -> Self {
        self.min_step_ratio = ratio;
        self
    }

    pub fn with_max_sweeps(mut self, sweeps: usize) -> Self {
        self.max_sweeps = sweeps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let steps = [
            ("translation_step", self.translation_step),
            ("rotation_step", self.rotation_step),
            ("scaling_step", self.scaling_step),
            ("shear_step", self.shear_step),
        ];
        for (name, step) in steps {
            if !(step.is_finite() && step > 0.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{} must be positive, got {}",
                    name, step
                )));
            }
        }
        if !(self.min_step_ratio > 0.0 && self.min_step_ratio < 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "min_step_ratio must lie in (0, 1), got {}",
                self.min_step_ratio
            )));
        }
        Ok(())
    }
}

/// Settings for the nonlinear field solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Solver iterations. Progress reports saturate at 15.
    pub iterations: usize,
    /// Weight of the smoothness penalty relative to the image gradient energy.
    pub regularization: f64,
    /// Conjugate-gradient steps spent solving each Gauss-Newton system.
    pub inner_iterations: usize,
    /// Step halvings tried before an iteration gives up.
    pub max_backtracks: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            iterations: 15,
            regularization: 0.01,
            inner_iterations: 8,
            max_backtracks: 4,
        }
    }
}

impl FieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn with_inner_iterations(mut self, iterations: usize) -> Self {
        self.inner_iterations = iterations;
        self
    }

    pub fn with_max_backtracks(mut self, backtracks: usize) -> Self {
        self.max_backtracks = backtracks;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

/// Settings for the mutual information cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutualInformationConfig {
    /// Histogram bins per image.
    pub bins: usize,
    /// Parzen kernel width, in bins.
    pub sigma: f64,
}

impl Default for MutualInformationConfig {
    fn default() -> Self {
        Self { bins: 32, sigma: 1.0 }
    }
}

impl MutualInformationConfig {
    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bins < 2 {
            return Err(RegistrationError::invalid_configuration(format!(
                "mutual information needs at least 2 bins, got {}",
                self.bins
            )));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "Parzen sigma must be positive, got {}",
                self.sigma
            )));
        }
        Ok(())
    }
}

/// Everything a `Normalization` session needs beyond the images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    pub search: SearchConfig,
    pub field: FieldConfig,
    pub mutual_information: MutualInformationConfig,
}

impl NormalizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_field(mut self, field: FieldConfig) -> Self {
        self.field = field;
        self
    }

    pub fn with_mutual_information(mut self, mutual_information: MutualInformationConfig) -> Self {
        self.mutual_information = mutual_information;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.field.validate()?;
        self.mutual_information.validate()
    }
}

/// Parameters of a single registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Resolution factor of the deformation field; zero skips the nonlinear stage.
    pub factor: usize,
    pub cost: CostType,
    pub reg_type: RegType,
    /// Worker threads for the nonlinear solver.
    pub thread_count: usize,
    /// Starting affine parameters; identity when absent.
    pub initial: Option<AffineParameters>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            factor: 1,
            cost: CostType::default(),
            reg_type: RegType::default(),
            thread_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            initial: None,
        }
    }
}

impl RunRequest {
    pub fn new(factor: usize, cost: CostType, reg_type: RegType) -> Self {
        Self {
            factor,
            cost,
            reg_type,
            ..Self::default()
        }
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_initial(mut self, initial: AffineParameters) -> Self {
        self.initial = Some(initial);
        self
    }
}
