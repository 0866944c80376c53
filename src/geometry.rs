use glam::{Mat3, Quat, Vec3};

use crate::types::Landmark;

// Face-mesh topology indices of the points the cells are anchored to.
pub const LEFT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_OUTER: usize = 263;
pub const FOREHEAD_TOP: usize = 10;
pub const CHIN_BOTTOM: usize = 152;
pub const NOSE_BRIDGE: usize = 168;

/// Local frame of one face in scene space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceFrame {
    pub center: Vec3,
    pub width: f32,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub z_axis: Vec3,
}

impl FaceFrame {
    /// Builds the frame from already converted scene-space points.
    pub fn from_points(left: Vec3, right: Vec3, top: Vec3, bottom: Vec3, center: Vec3) -> Self {
        let width = left.distance(right);

        let x_axis = (right - left).normalize_or_zero();
        let y_axis = (top - bottom).normalize_or_zero();
        let z_axis = x_axis.cross(y_axis).normalize_or_zero();
        // Re-orthogonalize: the eye line and the forehead-chin line are rarely
        // perpendicular.
        let y_axis = z_axis.cross(x_axis).normalize_or_zero();

        Self {
            center,
            width,
            x_axis,
            y_axis,
            z_axis,
        }
    }

    pub fn basis(&self) -> Mat3 {
        Mat3::from_cols(self.x_axis, self.y_axis, self.z_axis)
    }

    pub fn orientation(&self) -> Quat {
        let basis = self.basis();
        if basis.determinant().abs() < 1e-4 {
            return Quat::IDENTITY;
        }
        Quat::from_mat3(&basis).normalize()
    }
}

/// Normalized image space to scene space: centered, y up, depth toward the
/// viewer.
pub fn to_scene(point: &Landmark) -> Vec3 {
    Vec3::new(point.x - 0.5, -(point.y - 0.5), -point.z)
}

/// Resolves the frame of one face, or `None` when any anchor landmark is
/// missing.
pub fn resolve_face(landmarks: &[Landmark]) -> Option<FaceFrame> {
    let left = landmarks.get(LEFT_EYE_OUTER).map(to_scene)?;
    let right = landmarks.get(RIGHT_EYE_OUTER).map(to_scene)?;
    let top = landmarks.get(FOREHEAD_TOP).map(to_scene)?;
    let bottom = landmarks.get(CHIN_BOTTOM).map(to_scene)?;
    let center = landmarks.get(NOSE_BRIDGE).map(to_scene)?;
    Some(FaceFrame::from_points(left, right, top, bottom, center))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A 468-point landmark set with the anchor points of an upright face
    /// centered at (`cx`, `cy`) whose eyes are `eye_span` apart.
    pub fn upright_face(cx: f32, cy: f32, eye_span: f32) -> Vec<Landmark> {
        let mut points = vec![Landmark::new(cx, cy, 0.0); 468];
        points[LEFT_EYE_OUTER] = Landmark::new(cx - eye_span / 2.0, cy - 0.02, 0.0);
        points[RIGHT_EYE_OUTER] = Landmark::new(cx + eye_span / 2.0, cy - 0.02, 0.0);
        points[FOREHEAD_TOP] = Landmark::new(cx, cy - 0.15, 0.0);
        points[CHIN_BOTTOM] = Landmark::new(cx, cy + 0.15, 0.0);
        points[NOSE_BRIDGE] = Landmark::new(cx, cy - 0.01, -0.02);
        points
    }
}
