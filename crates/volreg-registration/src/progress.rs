//! Coarse run progress and cooperative cancellation.
//!
//! Both cells are plain atomics shared between the thread running a
//! registration and any number of observers.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Progress code of a registration run.
///
/// Internal values run from [`RegistrationProgress::INITIALIZING`] to
/// [`RegistrationProgress::DONE`]; [`RegistrationProgress::external`] shifts
/// them into `0..=18` for callers.
#[derive(Debug)]
pub struct RegistrationProgress(AtomicI32);

impl RegistrationProgress {
    /// Run started, first affine pass in flight.
    pub const INITIALIZING: i32 = -2;
    /// Second affine pass in flight (correlation cost only).
    pub const AFFINE_SECOND_PASS: i32 = -1;
    /// Affine stage finished.
    pub const AFFINE_COMPLETE: i32 = 0;
    /// Highest code reported by nonlinear iterations.
    pub const LAST_FIELD_ITERATION: i32 = 15;
    /// Run finished.
    pub const DONE: i32 = 16;

    pub fn new() -> Self {
        Self(AtomicI32::new(Self::AFFINE_COMPLETE))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, value: i32) {
        self.0.store(value, Ordering::Release);
    }

    /// Report nonlinear iteration `iteration` (zero based).
    pub fn set_field_iteration(&self, iteration: usize) {
        let code = (iteration + 1).min(Self::LAST_FIELD_ITERATION as usize) as i32;
        self.set(code);
    }

    /// Progress in `0..=18`.
    pub fn external(&self) -> u8 {
        (self.get() - Self::INITIALIZING).clamp(0, Self::DONE - Self::INITIALIZING) as u8
    }
}

impl Default for RegistrationProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative stop request for one run.
///
/// A run never resets its token; each run gets a fresh one.
#[derive(Debug, Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
