//! Cancellable registration session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use burn::tensor::backend::Backend;
use volreg_core::image::Image;
use volreg_core::spatial::Point3;
use crate::bfnorm::{BfnormSolver, FieldSolver};
use crate::config::{MutualInformationConfig, NormalizationConfig, RunRequest};
use crate::error::Result;
use crate::linear::{AffineSearch, CoordinateSearch};
use crate::progress::CancellationToken;
use super::mapper::CompositeMapper;
use super::runner::StageRunner;
use super::state::RegistrationState;

/// A background run and the token that stops it.
struct Worker {
    handle: Option<JoinHandle<()>>,
    cancel: Arc<CancellationToken>,
}

impl Worker {
    fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("registration thread panicked");
            }
        }
    }
}

/// Registration session owning at most one run at a time.
///
/// Starting a run always cancels and joins the previous one first, then
/// resets the shared state before returning or running. Dropping the session
/// cancels and joins as well. Progress, the mapping and the run status are
/// readable from any thread while a run is in flight.
///
/// # Examples
/// ```rust,no_run
/// use volreg_core::Image;
/// use volreg_core::spatial::{Point3, Spacing3};
/// use volreg_registration::config::RunRequest;
/// use volreg_registration::linear::RegType;
/// use volreg_registration::metric::CostType;
/// use volreg_registration::Normalization;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let from = Image::<Backend, 3>::from_vec(vec![0.0; 4096], [16, 16, 16], Spacing3::uniform(1.0), &device);
/// let to = from.clone();
///
/// let session = Normalization::new();
/// session.run_async(from, to, RunRequest::new(1, CostType::Correlation, RegType::Affine));
/// while session.is_running() {
///     println!("progress {}/18", session.current_progress());
///     std::thread::sleep(std::time::Duration::from_millis(100));
/// }
/// let mapped = session.map(Point3::new([8.0, 8.0, 8.0]));
/// ```
pub struct Normalization<S: AffineSearch = CoordinateSearch, F: FieldSolver = BfnormSolver> {
    runner: StageRunner<S, F>,
    worker: Mutex<Option<Worker>>,
    /// Held for the whole of a synchronous run.
    gate: Mutex<()>,
}

impl Normalization {
    /// Session with the default search and solver settings.
    pub fn new() -> Self {
        let config = NormalizationConfig::default();
        Self::with_collaborators(
            CoordinateSearch::new(config.search),
            BfnormSolver::new(config.field),
            config.mutual_information,
        )
    }

    pub fn from_config(config: NormalizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_collaborators(
            CoordinateSearch::new(config.search),
            BfnormSolver::new(config.field),
            config.mutual_information,
        ))
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AffineSearch, F: FieldSolver> Normalization<S, F> {
    pub fn with_collaborators(search: S, solver: F, mutual_information: MutualInformationConfig) -> Self {
        let state = Arc::new(RegistrationState::new());
        Self {
            runner: StageRunner::new(state, search, solver, mutual_information),
            worker: Mutex::new(None),
            gate: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<RegistrationState> {
        self.runner.state()
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the previous run and wait until it has fully ended. A synchronous
    /// run on another thread has no handle, so its end is awaited on the gate.
    fn stop_previous(&self, worker: &mut Option<Worker>) -> MutexGuard<'_, ()> {
        if let Some(previous) = worker.take() {
            previous.stop();
        }
        self.gate()
    }

    /// Cancel and join the previous run, then run on the calling thread.
    ///
    /// The session lock is released before the pipeline starts, so status
    /// queries from other threads answer immediately. Starting another run
    /// meanwhile cancels this one and waits for it to return.
    pub fn run_sync<B: Backend>(&self, from: &Image<B, 3>, to: &Image<B, 3>, request: &RunRequest) {
        let (cancel, _gate) = {
            let mut worker = self.worker();
            let gate = self.stop_previous(&mut worker);
            self.runner.prepare(from, to, request);

            let cancel = Arc::new(CancellationToken::new());
            *worker = Some(Worker {
                handle: None,
                cancel: Arc::clone(&cancel),
            });
            (cancel, gate)
        };
        self.runner.execute(from, to, request, &cancel);
    }

    /// Cancel and join the previous run, then start this one on a new thread
    /// and return immediately.
    pub fn run_async<B: Backend>(&self, from: Image<B, 3>, to: Image<B, 3>, request: RunRequest)
    where
        Image<B, 3>: Send,
    {
        let mut worker = self.worker();
        drop(self.stop_previous(&mut worker));
        self.runner.prepare(&from, &to, &request);

        let cancel = Arc::new(CancellationToken::new());
        let token = Arc::clone(&cancel);
        let runner = self.runner.clone();
        let handle = thread::spawn(move || {
            runner.execute(&from, &to, &request, &token);
        });

        *worker = Some(Worker {
            handle: Some(handle),
            cancel,
        });
    }

    /// Block until the current run, if any, has finished.
    pub fn wait(&self) {
        {
            let mut worker = self.worker();
            if let Some(handle) = worker.as_mut().and_then(|w| w.handle.take()) {
                if handle.join().is_err() {
                    tracing::error!("registration thread panicked");
                }
            }
        }
        drop(self.gate());
    }

    pub fn is_running(&self) -> bool {
        let background = self
            .worker()
            .as_ref()
            .and_then(|w| w.handle.as_ref())
            .is_some_and(|handle| !handle.is_finished());
        background || matches!(self.gate.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Token of the current run, if one was started.
    pub fn cancellation_token(&self) -> Option<Arc<CancellationToken>> {
        self.worker().as_ref().map(|w| Arc::clone(&w.cancel))
    }

    /// Progress in `0..=18`.
    pub fn current_progress(&self) -> u8 {
        self.state().progress().external()
    }

    pub fn mapper(&self) -> CompositeMapper {
        CompositeMapper::new(Arc::clone(self.state()))
    }

    pub fn map(&self, from_index: Point3) -> Point3 {
        self.mapper().map(from_index)
    }

    pub fn map_in_place(&self, point: &mut Point3) {
        self.mapper().map_in_place(point)
    }
}

impl<S: AffineSearch, F: FieldSolver> Drop for Normalization<S, F> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker().take() {
            worker.stop();
        }
    }
}
