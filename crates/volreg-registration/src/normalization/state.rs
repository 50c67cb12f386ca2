//! Shared state read by the mapper and written by the pipeline.

use std::sync::{Arc, PoisonError, RwLock};
use volreg_core::transform::{AffineParameters, Frame, TransformationMatrix};
use crate::bfnorm::DeformationField;
use crate::progress::RegistrationProgress;

#[derive(Debug, Clone)]
struct Matrices {
    parameters: AffineParameters,
    frame: Frame,
    forward: TransformationMatrix,
    inverse: TransformationMatrix,
    fresh: bool,
}

impl Matrices {
    fn recompute(&mut self) {
        self.forward = TransformationMatrix::from_affine(&self.parameters, &self.frame);
        self.inverse = self.forward.inverse().unwrap_or_else(|| {
            tracing::warn!(parameters = ?self.parameters, "singular affine matrix, using identity inverse");
            TransformationMatrix::identity()
        });
        self.fresh = true;
    }
}

/// Affine parameters plus the forward and inverse index matrices derived
/// from them.
///
/// Matrices are recomputed lazily, always as a pair, the first time they are
/// read after the parameters or the frame change.
#[derive(Debug)]
pub struct TransformState {
    inner: RwLock<Matrices>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Matrices {
                parameters: AffineParameters::identity(),
                frame: Frame::default(),
                forward: TransformationMatrix::identity(),
                inverse: TransformationMatrix::identity(),
                fresh: true,
            }),
        }
    }

    pub fn set_parameters(&self, parameters: AffineParameters) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.parameters = parameters;
        inner.fresh = false;
    }

    pub fn set_frame(&self, frame: Frame) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.frame = frame;
        inner.fresh = false;
    }

    pub fn parameters(&self) -> AffineParameters {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).parameters
    }

    pub fn frame(&self) -> Frame {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).frame
    }

    /// Whether the cached matrices match the current parameters.
    pub fn is_fresh(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).fresh
    }

    /// Recompute both matrices now.
    pub fn refresh(&self) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).recompute();
    }

    /// Forward and inverse matrices, recomputed first if stale.
    pub fn matrices(&self) -> (TransformationMatrix, TransformationMatrix) {
        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if inner.fresh {
                return (inner.forward, inner.inverse);
            }
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.fresh {
            inner.recompute();
        }
        (inner.forward, inner.inverse)
    }

    /// "from" index → "to" index.
    pub fn forward(&self) -> TransformationMatrix {
        self.matrices().0
    }

    /// "to" index → "from" index.
    pub fn inverse(&self) -> TransformationMatrix {
        self.matrices().1
    }
}

#[derive(Debug)]
struct FieldSlot {
    field: Arc<DeformationField>,
    usable: bool,
}

/// Everything a session shares between its runs and its mappers.
#[derive(Debug)]
pub struct RegistrationState {
    transform: TransformState,
    progress: RegistrationProgress,
    field: RwLock<FieldSlot>,
}

impl Default for RegistrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationState {
    pub fn new() -> Self {
        Self {
            transform: TransformState::new(),
            progress: RegistrationProgress::new(),
            field: RwLock::new(FieldSlot {
                field: Arc::new(DeformationField::for_factor([0; 3], 0)),
                usable: false,
            }),
        }
    }

    pub fn transform(&self) -> &TransformState {
        &self.transform
    }

    pub fn progress(&self) -> &RegistrationProgress {
        &self.progress
    }

    /// Latest field snapshot, usable or not.
    pub fn field(&self) -> Arc<DeformationField> {
        Arc::clone(&self.field.read().unwrap_or_else(PoisonError::into_inner).field)
    }

    pub fn field_usable(&self) -> bool {
        self.field.read().unwrap_or_else(PoisonError::into_inner).usable
    }

    /// Field snapshot when the mapper should apply it.
    pub fn usable_field(&self) -> Option<Arc<DeformationField>> {
        let slot = self.field.read().unwrap_or_else(PoisonError::into_inner);
        slot.usable.then(|| Arc::clone(&slot.field))
    }

    /// Install a fresh field for a new run; it is not usable yet.
    pub(crate) fn reset_field(&self, field: DeformationField) {
        let mut slot = self.field.write().unwrap_or_else(PoisonError::into_inner);
        slot.field = Arc::new(field);
        slot.usable = false;
    }

    pub(crate) fn set_field_usable(&self, usable: bool) {
        self.field.write().unwrap_or_else(PoisonError::into_inner).usable = usable;
    }

    pub(crate) fn publish_field(&self, field: DeformationField) {
        self.field.write().unwrap_or_else(PoisonError::into_inner).field = Arc::new(field);
    }
}
