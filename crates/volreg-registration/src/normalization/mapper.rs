//! Public point-mapping operator.

use std::sync::Arc;
use volreg_core::spatial::Point3;
use super::state::RegistrationState;

/// Maps a "from" voxel index to a position in the "to" volume.
///
/// The affine matrix is always applied. When the current run has a usable
/// nonlinear field, the affine position is rounded to the nearest voxel and
/// displaced by the field there. Cloning is cheap and every clone observes
/// the same session.
#[derive(Debug, Clone)]
pub struct CompositeMapper {
    state: Arc<RegistrationState>,
}

impl CompositeMapper {
    pub fn new(state: Arc<RegistrationState>) -> Self {
        Self { state }
    }

    pub fn map(&self, from_index: Point3) -> Point3 {
        let position = self.state.transform().forward().apply(&from_index);

        match self.state.usable_field() {
            Some(field) => {
                // +0.5 then truncation toward zero.
                let voxel = [
                    (position[0] + 0.5) as i64,
                    (position[1] + 0.5) as i64,
                    (position[2] + 0.5) as i64,
                ];
                Point3::new(field.map_voxel(voxel))
            }
            None => position,
        }
    }

    pub fn map_in_place(&self, point: &mut Point3) {
        *point = self.map(*point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfnorm::DeformationField;
    use volreg_core::spatial::Spacing3;
    use proptest::prelude::*;
    use volreg_core::transform::{AffineParameters, Frame};

    fn state() -> Arc<RegistrationState> {
        let state = Arc::new(RegistrationState::new());
        state.transform().set_frame(Frame::new(
            [8, 8, 8],
            Spacing3::uniform(1.0),
            [8, 8, 8],
            Spacing3::uniform(1.0),
        ));
        state.transform().set_parameters(AffineParameters::from_translation([0.3, -0.7, 0.0]));
        state
    }

    #[test]
    fn test_identity_before_any_run() {
        let mapper = CompositeMapper::new(Arc::new(RegistrationState::new()));
        let p = Point3::new([1.25, -3.0, 7.5]);
        assert_eq!(mapper.map(p), p);
    }

    #[test]
    fn test_affine_only_without_usable_field() {
        let mapper = CompositeMapper::new(state());
        let mapped = mapper.map(Point3::new([2.0, 2.0, 2.0]));
        assert!(mapped.distance(&Point3::new([2.3, 1.3, 2.0])) < 1e-12);
    }

    #[test]
    fn test_usable_field_rounds_then_displaces() {
        let state = state();
        let mut field = DeformationField::for_factor([8, 8, 8], 1);
        // Φ_000 = 8^{-3/2}; this coefficient shifts x by 0.5 everywhere.
        field.coefficients_mut()[0][0] = 0.5 * 8f64.powf(1.5);
        state.reset_field(field);
        state.set_field_usable(true);

        let mapper = CompositeMapper::new(Arc::clone(&state));
        // Affine position (2.3, 1.3, 2.0) rounds to voxel (2, 1, 2).
        let mapped = mapper.map(Point3::new([2.0, 2.0, 2.0]));
        assert!(mapped.distance(&Point3::new([2.5, 1.0, 2.0])) < 1e-9, "{:?}", mapped);

        // -0.7 + 0.5 truncates to 0, not -1.
        let mapped = mapper.map(Point3::new([0.0, 0.0, 0.0]));
        assert!(mapped.distance(&Point3::new([0.5, 0.0, 0.0])) < 1e-9, "{:?}", mapped);

        let mut p = Point3::new([2.0, 2.0, 2.0]);
        mapper.map_in_place(&mut p);
        assert!(p.distance(&Point3::new([2.5, 1.0, 2.0])) < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_mapping_is_repeatable(
            x in -4.0f64..12.0,
            y in -4.0f64..12.0,
            z in -4.0f64..12.0,
            shift in -3.0f64..3.0,
        ) {
            let state = state();
            let mut field = DeformationField::for_factor([8, 8, 8], 1);
            field.coefficients_mut()[1][3] = shift;
            state.reset_field(field);
            state.set_field_usable(true);

            let mapper = CompositeMapper::new(state);
            let p = Point3::new([x, y, z]);
            let first = mapper.map(p);
            let second = mapper.clone().map(p);
            prop_assert_eq!(first, second);

            let mut in_place = p;
            mapper.map_in_place(&mut in_place);
            prop_assert_eq!(in_place, first);
        }
    }
}
