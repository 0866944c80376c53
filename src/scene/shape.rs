use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::random::RandomSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    Sphere,
    Cone,
    Cylinder,
    Torus,
    Icosahedron,
    Box,
}

impl Shape {
    pub const ALL: [Shape; 6] = [
        Shape::Sphere,
        Shape::Cone,
        Shape::Cylinder,
        Shape::Torus,
        Shape::Icosahedron,
        Shape::Box,
    ];

    pub fn random<R: RandomSource + ?Sized>(rng: &mut R) -> Shape {
        Shape::ALL[rng.next_index(Shape::ALL.len())]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Shape::Sphere => "sphere",
            Shape::Cone => "cone",
            Shape::Cylinder => "cylinder",
            Shape::Torus => "torus",
            Shape::Icosahedron => "icosahedron",
            Shape::Box => "box",
        }
    }

    fn tessellate(&self) -> MeshBuffers {
        match self {
            Shape::Sphere => sphere(0.5, 16, 16),
            Shape::Cone => cylinder(0.0, 0.5, 1.0, 4),
            Shape::Cylinder => cylinder(0.3, 0.3, 0.7, 12),
            Shape::Torus => torus(0.3, 0.1, 8, 16),
            Shape::Icosahedron => icosahedron(0.5),
            Shape::Box => cuboid(0.5),
        }
    }
}

/// Triangle soup in model space, centered on the origin.
#[derive(Clone, Debug, Default)]
pub struct MeshBuffers {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshBuffers {
    fn push(&mut self, p: Vec3) -> u32 {
        self.positions.push(p);
        (self.positions.len() - 1) as u32
    }

    fn quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.triangles.push([a, b, d]);
        self.triangles.push([b, c, d]);
    }
}

/// Tessellated geometry owned by exactly one mesh. Dropping it releases the
/// buffers.
#[derive(Clone, Debug)]
pub struct Geometry {
    shape: Shape,
    buffers: MeshBuffers,
}

impl Geometry {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            buffers: shape.tessellate(),
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn buffers(&self) -> &MeshBuffers {
        &self.buffers
    }
}

fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshBuffers {
    let mut out = MeshBuffers::default();
    let row = width_segments + 1;
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            out.push(Vec3::new(
                -radius * (u * TAU).cos() * (v * PI).sin(),
                radius * (v * PI).cos(),
                radius * (u * TAU).sin() * (v * PI).sin(),
            ));
        }
    }
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            // The pole rows collapse to a point; skip their degenerate halves.
            if iy != 0 {
                out.triangles.push([a, b, d]);
            }
            if iy != height_segments - 1 {
                out.triangles.push([b, c, d]);
            }
        }
    }
    out
}

fn cylinder(radius_top: f32, radius_bottom: f32, height: f32, radial_segments: u32) -> MeshBuffers {
    let mut out = MeshBuffers::default();
    let half = height / 2.0;
    let ring = |radius: f32, y: f32, out: &mut MeshBuffers| -> Vec<u32> {
        (0..=radial_segments)
            .map(|x| {
                let theta = x as f32 / radial_segments as f32 * TAU;
                out.push(Vec3::new(radius * theta.sin(), y, radius * theta.cos()))
            })
            .collect()
    };

    let top = ring(radius_top, half, &mut out);
    let bottom = ring(radius_bottom, -half, &mut out);
    for x in 0..radial_segments as usize {
        out.quad(top[x], bottom[x], bottom[x + 1], top[x + 1]);
    }

    for (radius, y, rim) in [(radius_top, half, &top), (radius_bottom, -half, &bottom)] {
        if radius <= 0.0 {
            continue;
        }
        let center = out.push(Vec3::new(0.0, y, 0.0));
        for x in 0..radial_segments as usize {
            out.triangles.push([center, rim[x], rim[x + 1]]);
        }
    }
    out
}

fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> MeshBuffers {
    let mut out = MeshBuffers::default();
    let row = tubular_segments + 1;
    for j in 0..=radial_segments {
        let v = j as f32 / radial_segments as f32 * TAU;
        for i in 0..=tubular_segments {
            let u = i as f32 / tubular_segments as f32 * TAU;
            out.push(Vec3::new(
                (radius + tube * v.cos()) * u.cos(),
                (radius + tube * v.cos()) * u.sin(),
                tube * v.sin(),
            ));
        }
    }
    for j in 1..=radial_segments {
        for i in 1..=tubular_segments {
            let a = row * j + i - 1;
            let b = row * (j - 1) + i - 1;
            let c = row * (j - 1) + i;
            let d = row * j + i;
            out.quad(a, b, c, d);
        }
    }
    out
}

fn icosahedron(radius: f32) -> MeshBuffers {
    let t = (1.0 + 5.0_f32.sqrt()) / 2.0;
    let raw = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ];
    let positions = raw
        .iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalize() * radius)
        .collect();
    let triangles = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    MeshBuffers {
        positions,
        triangles,
    }
}

fn cuboid(size: f32) -> MeshBuffers {
    let h = size / 2.0;
    let mut out = MeshBuffers::default();
    for i in 0..8u32 {
        out.push(Vec3::new(
            if i & 1 == 0 { -h } else { h },
            if i & 2 == 0 { -h } else { h },
            if i & 4 == 0 { -h } else { h },
        ));
    }
    // Corner index bits: x = 1, y = 2, z = 4.
    let faces = [
        [0, 2, 3, 1],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 4, 6, 2],
        [1, 3, 7, 5],
    ];
    for [a, b, c, d] in faces {
        out.quad(a, b, c, d);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::testing::ScriptedRandom;

    fn extent(buffers: &MeshBuffers) -> Vec3 {
        let (min, max) = buffers.positions.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        );
        max - min
    }

    #[test]
    fn every_shape_has_valid_triangles() {
        for shape in Shape::ALL {
            let geometry = Geometry::new(shape);
            let buffers = geometry.buffers();
            assert!(!buffers.triangles.is_empty(), "{} has no triangles", shape.label());
            let count = buffers.positions.len() as u32;
            for tri in &buffers.triangles {
                assert!(tri.iter().all(|&i| i < count), "{} index out of range", shape.label());
            }
        }
    }

    #[test]
    fn shapes_keep_their_dimensions() {
        let sphere = extent(Geometry::new(Shape::Sphere).buffers());
        assert!(sphere.abs_diff_eq(Vec3::splat(1.0), 1e-3), "{sphere:?}");

        let cube = extent(Geometry::new(Shape::Box).buffers());
        assert!(cube.abs_diff_eq(Vec3::splat(0.5), 1e-6));

        let cylinder = extent(Geometry::new(Shape::Cylinder).buffers());
        assert!((cylinder.y - 0.7).abs() < 1e-6);

        let torus = extent(Geometry::new(Shape::Torus).buffers());
        assert!((torus.x - 0.8).abs() < 1e-3);
        assert!((torus.z - 0.2).abs() < 1e-3);
    }

    #[test]
    fn counts_match_segment_parameters() {
        assert_eq!(Geometry::new(Shape::Icosahedron).buffers().triangles.len(), 20);
        assert_eq!(Geometry::new(Shape::Box).buffers().triangles.len(), 12);
        // 4 sides, bottom cap only.
        assert_eq!(Geometry::new(Shape::Cone).buffers().triangles.len(), 4 * 2 + 4);
        assert_eq!(Geometry::new(Shape::Torus).buffers().triangles.len(), 8 * 16 * 2);
    }

    #[test]
    fn random_pick_follows_the_source() {
        let mut rng = ScriptedRandom::new(&[0.0, 0.2, 0.99]);
        assert_eq!(Shape::random(&mut rng), Shape::Sphere);
        assert_eq!(Shape::random(&mut rng), Shape::Cone);
        assert_eq!(Shape::random(&mut rng), Shape::Box);
    }

    #[test]
    fn cloned_geometry_is_independent() {
        let original = Geometry::new(Shape::Torus);
        let copy = original.clone();
        drop(original);
        assert_eq!(copy.shape(), Shape::Torus);
        assert!(!copy.buffers().positions.is_empty());
    }
}
