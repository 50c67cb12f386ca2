//! The registration pipeline.

use std::sync::Arc;
use burn::tensor::backend::Backend;
use volreg_core::filter::ResampleImageFilter;
use volreg_core::image::Image;
use volreg_core::interpolation::LinearInterpolator;
use volreg_core::transform::Frame;
use crate::bfnorm::{DeformationField, FieldSolver};
use crate::config::{MutualInformationConfig, RunRequest};
use crate::error::Result;
use crate::linear::{AffineSearch, RegType};
use crate::metric::{CostType, Metric, MutualInformation, NormalizedCorrelation};
use crate::progress::{CancellationToken, RegistrationProgress};
use super::state::RegistrationState;

/// Runs one registration against a shared [`RegistrationState`].
///
/// Progress moves through `-2` (started), `-1` (second affine pass, only for
/// the correlation cost), `0` (affine done), `1..=15` (field iterations) and
/// ends at `16`. A cancelled run stops after the affine stage or at the next
/// field iteration.
pub struct StageRunner<S, F> {
    state: Arc<RegistrationState>,
    search: Arc<S>,
    solver: Arc<F>,
    mutual_information: MutualInformationConfig,
}

impl<S, F> Clone for StageRunner<S, F> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            search: Arc::clone(&self.search),
            solver: Arc::clone(&self.solver),
            mutual_information: self.mutual_information.clone(),
        }
    }
}

impl<S: AffineSearch, F: FieldSolver> StageRunner<S, F> {
    pub fn new(
        state: Arc<RegistrationState>,
        search: S,
        solver: F,
        mutual_information: MutualInformationConfig,
    ) -> Self {
        Self {
            state,
            search: Arc::new(search),
            solver: Arc::new(solver),
            mutual_information,
        }
    }

    pub fn state(&self) -> &Arc<RegistrationState> {
        &self.state
    }

    /// Reset the shared state for a new run and execute it.
    pub fn run<B: Backend>(
        &self,
        from: &Image<B, 3>,
        to: &Image<B, 3>,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) {
        self.prepare(from, to, request);
        self.execute(from, to, request, cancel);
    }

    /// Put the shared state into its start-of-run shape: progress `-2`, the
    /// request's frame and initial parameters, and an empty, unusable field
    /// for the request's factor.
    ///
    /// After this returns, mappers see only the new run.
    pub fn prepare<B: Backend>(&self, from: &Image<B, 3>, to: &Image<B, 3>, request: &RunRequest) {
        let transform = self.state.transform();

        // Field first: a mapper never pairs the new affine with the old field.
        self.state.reset_field(DeformationField::for_factor(to.geometry(), request.factor));
        transform.set_frame(Frame::new(from.geometry(), *from.spacing(), to.geometry(), *to.spacing()));
        transform.set_parameters(request.initial.unwrap_or_default());
        self.state.progress().set(RegistrationProgress::INITIALIZING);
    }

    /// The pipeline proper, on state already set up by [`StageRunner::prepare`].
    pub(crate) fn execute<B: Backend>(
        &self,
        from: &Image<B, 3>,
        to: &Image<B, 3>,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) {
        let transform = self.state.transform();
        let progress = self.state.progress();

        tracing::info!(
            from = ?from.geometry(),
            to = ?to.geometry(),
            factor = request.factor,
            cost = ?request.cost,
            reg_type = ?request.reg_type,
            "registration started"
        );

        match request.cost {
            CostType::Correlation => {
                self.affine_passes(from, to, request, &NormalizedCorrelation::new(), cancel, true)
            }
            CostType::MutualInformation => {
                let metric = MutualInformation::from_config(&self.mutual_information);
                self.affine_passes(from, to, request, &metric, cancel, false)
            }
        }

        transform.refresh();
        progress.set(RegistrationProgress::AFFINE_COMPLETE);
        tracing::info!(parameters = ?transform.parameters(), "affine stage complete");

        if cancel.is_cancelled() {
            tracing::warn!("registration cancelled after affine stage");
            return;
        }

        if request.factor == 0 || request.reg_type == RegType::RigidBody {
            tracing::info!(factor = request.factor, reg_type = ?request.reg_type, "nonlinear stage skipped");
            progress.set(RegistrationProgress::DONE);
            return;
        }

        match self.fit_field(from, to, request, cancel) {
            Ok(()) => tracing::info!(cancelled = cancel.is_cancelled(), "nonlinear stage complete"),
            Err(err) => {
                self.state.set_field_usable(false);
                tracing::error!(error = %err, "nonlinear stage failed, keeping affine result");
            }
        }
        progress.set(RegistrationProgress::DONE);
    }

    fn affine_passes<B: Backend, M: Metric<B, 3>>(
        &self,
        from: &Image<B, 3>,
        to: &Image<B, 3>,
        request: &RunRequest,
        metric: &M,
        cancel: &CancellationToken,
        report_second_pass: bool,
    ) {
        let transform = self.state.transform();
        let mut parameters = transform.parameters();

        for pass in 0..2 {
            if pass == 1 && report_second_pass {
                self.state.progress().set(RegistrationProgress::AFFINE_SECOND_PASS);
            }
            self.search.search(from, to, &mut parameters, request.reg_type, metric, cancel);
            transform.set_parameters(parameters);
            tracing::debug!(pass, metric = metric.name(), ?parameters, "affine pass finished");
        }
    }

    fn fit_field<B: Backend>(
        &self,
        from: &Image<B, 3>,
        to: &Image<B, 3>,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let inverse = self.state.transform().inverse();
        let aligned = ResampleImageFilter::new_from_reference(to, inverse, LinearInterpolator::new()).apply(from);

        let mut field = DeformationField::clone(&self.state.field());
        self.state.set_field_usable(true);

        let state = &self.state;
        let publish = |snapshot: &DeformationField| {
            if !cancel.is_cancelled() {
                state.publish_field(snapshot.clone());
            }
        };

        self.solver.fit(
            &mut field,
            &aligned,
            to,
            request.thread_count,
            cancel,
            self.state.progress(),
            &publish,
        )?;

        if !cancel.is_cancelled() {
            self.state.publish_field(field);
        }
        Ok(())
    }
}
