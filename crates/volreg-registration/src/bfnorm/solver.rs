//! Gauss-Newton fit of the cosine-basis field.

use burn::tensor::backend::Backend;
use rayon::prelude::*;
use volreg_core::image::{Image, VoxelBuffer};
use crate::config::FieldConfig;
use crate::error::{RegistrationError, Result};
use crate::progress::{CancellationToken, RegistrationProgress};
use super::mapping::DeformationField;

/// Nonlinear stage of the pipeline.
///
/// `fit` refines `field` so that `aligned_from` sampled at `x + u(x)` matches
/// `to` at `x`. It reports each iteration through `progress`, hands a
/// snapshot of the field to `publish` after every iteration, and stops at the
/// next iteration boundary once `cancel` is set.
pub trait FieldSolver: Send + Sync + 'static {
    #[allow(clippy::too_many_arguments)]
    fn fit<B: Backend>(
        &self,
        field: &mut DeformationField,
        aligned_from: &Image<B, 3>,
        to: &Image<B, 3>,
        thread_count: usize,
        cancel: &CancellationToken,
        progress: &RegistrationProgress,
        publish: &(dyn Fn(&DeformationField) + Sync),
    ) -> Result<()>;
}

/// Gauss-Newton with a Jacobi-preconditioned conjugate-gradient inner solve
/// and a backtracking line search.
///
/// Minimises `½ Σ (F(x + u(x)) − G(x))² + ½ λ Σ_k w_k C_k²`, where
/// `w_k = a² + b² + g²` and `λ = regularization · mean |∇F|²`.
#[derive(Debug, Clone, Default)]
pub struct BfnormSolver {
    config: FieldConfig,
}

impl BfnormSolver {
    pub fn new(config: FieldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }
}

/// Voxel data and penalty shared by every evaluation of one fit.
struct Problem {
    from: VoxelBuffer,
    to: VoxelBuffer,
    gradient: [VoxelBuffer; 3],
    weights: Vec<f64>,
    lambda: f64,
}

/// Energy of a field together with what the next step needs.
struct Evaluation {
    energy: f64,
    residual: Vec<f64>,
    warped_gradient: [Vec<f64>; 3],
}

impl Problem {
    fn new(from: VoxelBuffer, to: VoxelBuffer, field: &DeformationField, regularization: f64) -> Self {
        let gradient = from.gradient();
        let voxels = from.len().max(1) as f64;
        let mean_squared_gradient = (0..from.len())
            .map(|o| gradient.iter().map(|g| g.data()[o].powi(2)).sum::<f64>())
            .sum::<f64>()
            / voxels;

        Self {
            from,
            to,
            gradient,
            weights: field.frequency_weights(),
            lambda: regularization * mean_squared_gradient,
        }
    }

    fn penalty(&self, coefficients: &[Vec<f64>; 3]) -> f64 {
        coefficients
            .iter()
            .map(|block| block.iter().zip(&self.weights).map(|(c, w)| w * c * c).sum::<f64>())
            .sum::<f64>()
            * 0.5
            * self.lambda
    }

    fn evaluate(&self, field: &DeformationField) -> Evaluation {
        let [nx, ny, _] = self.to.geometry();
        let displacement = [field.synthesize(0), field.synthesize(1), field.synthesize(2)];
        let target = self.to.data();

        let samples: Vec<(f64, [f64; 3])> = (0..self.to.len())
            .into_par_iter()
            .map(|o| {
                let x = o % nx;
                let y = (o / nx) % ny;
                let z = o / (nx * ny);
                let position = [
                    x as f64 + displacement[0][o],
                    y as f64 + displacement[1][o],
                    z as f64 + displacement[2][o],
                ];
                let residual = self.from.sample(position) - target[o];
                let gradient = [
                    self.gradient[0].sample(position),
                    self.gradient[1].sample(position),
                    self.gradient[2].sample(position),
                ];
                (residual, gradient)
            })
            .collect();

        let mut residual = Vec::with_capacity(samples.len());
        let mut warped_gradient = [
            Vec::with_capacity(samples.len()),
            Vec::with_capacity(samples.len()),
            Vec::with_capacity(samples.len()),
        ];
        for (r, g) in samples {
            residual.push(r);
            for axis in 0..3 {
                warped_gradient[axis].push(g[axis]);
            }
        }

        let data_term = 0.5 * residual.iter().map(|r| r * r).sum::<f64>();
        Evaluation {
            energy: data_term + self.penalty(field.coefficients()),
            residual,
            warped_gradient,
        }
    }

    /// `(JᵀJ + λW) v` for a coefficient set `v`, with `J` linearised at
    /// `current`.
    fn apply_normal(&self, field: &DeformationField, current: &Evaluation, v: &Coefficients) -> Coefficients {
        let mut jv = vec![0.0; current.residual.len()];
        for (component, block) in v.iter().enumerate() {
            let dense = field.synthesize_block(block);
            for ((acc, g), d) in jv.iter_mut().zip(&current.warped_gradient[component]).zip(dense) {
                *acc += g * d;
            }
        }

        let mut out: Coefficients = Default::default();
        for component in 0..3 {
            let weighted: Vec<f64> = jv
                .iter()
                .zip(&current.warped_gradient[component])
                .map(|(j, g)| j * g)
                .collect();
            let projected = field.project(&weighted, false);
            out[component] = projected
                .iter()
                .zip(&v[component])
                .zip(&self.weights)
                .map(|((p, c), w)| p + self.lambda * w * c)
                .collect();
        }
        out
    }

    /// Gauss-Newton step, solved approximately by conjugate gradients with
    /// the Jacobi preconditioner `diag(JᵀJ) + λW`.
    fn step(&self, field: &DeformationField, current: &Evaluation, inner_iterations: usize) -> Coefficients {
        let mut rhs: Coefficients = Default::default();
        let mut diagonal: Coefficients = Default::default();
        for component in 0..3 {
            let g = &current.warped_gradient[component];
            let weighted: Vec<f64> = current.residual.iter().zip(g).map(|(r, g)| r * g).collect();
            let squared: Vec<f64> = g.iter().map(|g| g * g).collect();

            let gradient = field.project(&weighted, false);
            let coefficients = &field.coefficients()[component];
            rhs[component] = gradient
                .iter()
                .zip(coefficients)
                .zip(&self.weights)
                .map(|((g, c), w)| -(g + self.lambda * w * c))
                .collect();
            diagonal[component] = field
                .project(&squared, true)
                .iter()
                .zip(&self.weights)
                .map(|(d, w)| d + self.lambda * w + 1e-12)
                .collect();
        }

        let precondition = |r: &Coefficients| -> Coefficients {
            let mut z: Coefficients = Default::default();
            for component in 0..3 {
                z[component] = r[component].iter().zip(&diagonal[component]).map(|(r, d)| r / d).collect();
            }
            z
        };

        let mut x: Coefficients = Default::default();
        for component in 0..3 {
            x[component] = vec![0.0; rhs[component].len()];
        }
        let mut r = rhs;
        let mut z = precondition(&r);
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        for _ in 0..inner_iterations {
            if rz <= f64::EPSILON * f64::EPSILON {
                break;
            }
            let hp = self.apply_normal(field, current, &p);
            let curvature = dot(&p, &hp);
            if curvature <= 0.0 {
                break;
            }
            let alpha = rz / curvature;
            axpy(&mut x, alpha, &p);
            axpy(&mut r, -alpha, &hp);

            z = precondition(&r);
            let rz_next = dot(&r, &z);
            let beta = rz_next / rz;
            for component in 0..3 {
                for (pk, zk) in p[component].iter_mut().zip(&z[component]) {
                    *pk = zk + beta * *pk;
                }
            }
            rz = rz_next;
        }
        x
    }
}

type Coefficients = [Vec<f64>; 3];

fn dot(a: &Coefficients, b: &Coefficients) -> f64 {
    a.iter()
        .zip(b)
        .map(|(a, b)| a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>())
        .sum()
}

/// `y += alpha · x`
fn axpy(y: &mut Coefficients, alpha: f64, x: &Coefficients) {
    for (yc, xc) in y.iter_mut().zip(x) {
        for (yk, xk) in yc.iter_mut().zip(xc) {
            *yk += alpha * xk;
        }
    }
}

impl BfnormSolver {
    fn iterate(
        &self,
        field: &mut DeformationField,
        problem: &Problem,
        cancel: &CancellationToken,
        progress: &RegistrationProgress,
        publish: &(dyn Fn(&DeformationField) + Sync),
    ) -> Result<()> {
        let mut current = problem.evaluate(field);
        tracing::debug!(energy = current.energy, lambda = problem.lambda, "field fit started");

        for iteration in 0..self.config.iterations {
            if cancel.is_cancelled() {
                tracing::warn!(iteration, "field fit cancelled");
                break;
            }
            if !current.energy.is_finite() {
                return Err(RegistrationError::numerical_instability(format!(
                    "field energy became {} at iteration {}",
                    current.energy, iteration
                )));
            }

            let step = problem.step(field, &current, self.config.inner_iterations);
            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..=self.config.max_backtracks {
                let mut candidate = field.clone();
                for (block, delta) in candidate.coefficients_mut().iter_mut().zip(&step) {
                    for (c, d) in block.iter_mut().zip(delta) {
                        *c += scale * d;
                    }
                }
                let evaluation = problem.evaluate(&candidate);
                if evaluation.energy < current.energy {
                    accepted = Some((candidate, evaluation));
                    break;
                }
                scale *= 0.5;
            }

            let Some((candidate, evaluation)) = accepted else {
                tracing::debug!(iteration, energy = current.energy, "field fit converged");
                break;
            };

            tracing::debug!(iteration, energy = evaluation.energy, scale, "field iteration");
            *field = candidate;
            current = evaluation;
            progress.set_field_iteration(iteration);
            publish(field);
        }

        Ok(())
    }
}

impl FieldSolver for BfnormSolver {
    fn fit<B: Backend>(
        &self,
        field: &mut DeformationField,
        aligned_from: &Image<B, 3>,
        to: &Image<B, 3>,
        thread_count: usize,
        cancel: &CancellationToken,
        progress: &RegistrationProgress,
        publish: &(dyn Fn(&DeformationField) + Sync),
    ) -> Result<()> {
        let geometry = field.geometry();
        for image in [aligned_from, to] {
            if image.geometry() != geometry {
                return Err(RegistrationError::shape_mismatch(&geometry, &image.geometry()));
            }
        }

        let problem = Problem::new(
            VoxelBuffer::from_image(aligned_from)?,
            VoxelBuffer::from_image(to)?,
            field,
            self.config.regularization,
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count.max(1))
            .build()
            .map_err(|e| RegistrationError::invalid_configuration(format!("solver thread pool: {}", e)))?;

        pool.install(|| self.iterate(field, &problem, cancel, progress, publish))
    }
}
