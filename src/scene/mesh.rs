use glam::{Mat4, Quat, Vec3};

use super::{Geometry, Shape, StandardMaterial};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// Axis the accumulated spin of a mesh turns around, in its local frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpinAxis {
    /// Yaw.
    Y,
    /// Pitch.
    X,
}

impl SpinAxis {
    fn vector(&self) -> Vec3 {
        match self {
            SpinAxis::Y => Vec3::Y,
            SpinAxis::X => Vec3::X,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    id: MeshId,
    geometry: Geometry,
    pub material: StandardMaterial,
    pub position: Vec3,
    /// Orientation set from the tracked face every frame.
    pub orientation: Quat,
    pub scale: Vec3,
    spin_axis: SpinAxis,
    spin: f32,
}

impl Mesh {
    pub fn new(id: MeshId, geometry: Geometry, material: StandardMaterial, spin_axis: SpinAxis) -> Self {
        Self {
            id,
            geometry,
            material,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
            spin_axis,
            spin: 0.0,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn shape(&self) -> Shape {
        self.geometry.shape()
    }

    /// Swaps in new geometry; the previous buffers are dropped here.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    pub fn spin(&self) -> f32 {
        self.spin
    }

    pub fn add_spin(&mut self, delta: f32) {
        self.spin = (self.spin + delta) % std::f32::consts::TAU;
    }

    /// Final rotation: face orientation, then the accumulated spin in the
    /// mesh's local frame.
    pub fn rotation(&self) -> Quat {
        self.orientation * Quat::from_axis_angle(self.spin_axis.vector(), self.spin)
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.position)
    }
}
