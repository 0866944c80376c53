use std::{collections::HashSet, time::Instant};

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use rayon::prelude::*;

use crate::{
    scene::{Color, Mesh, MeshId, SceneGraph, StandardMaterial},
    types::Frame,
};

const FOV_Y_DEGREES: f32 = 75.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 1000.0;
const CAMERA_Z: f32 = 2.0;
const LIGHT_COLOR: u32 = 0x88ccff;
const AMBIENT_INTENSITY: f32 = 0.7;
const DIRECTIONAL_INTENSITY: f32 = 1.0;
const DEFAULT_SIZE: (u32, u32) = (640, 480);

#[derive(Clone, Debug)]
pub struct Lighting {
    pub ambient: Vec3,
    pub directional: Vec3,
    /// Unit vector pointing from the surface toward the light.
    pub direction: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        let light = Color::from_hex(LIGHT_COLOR).0;
        Self {
            ambient: light * AMBIENT_INTENSITY,
            directional: light * DIRECTIONAL_INTENSITY,
            direction: Vec3::new(0.0, 1.0, 1.0).normalize(),
        }
    }
}

/// Fixed perspective camera on the +z axis looking at the origin.
#[derive(Clone, Copy, Debug)]
struct CameraRig {
    eye: Vec3,
    view: Mat4,
    view_proj: Mat4,
}

impl CameraRig {
    fn new(aspect: f32) -> Self {
        let eye = Vec3::new(0.0, 0.0, CAMERA_Z);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(FOV_Y_DEGREES.to_radians(), aspect, NEAR, FAR);
        Self {
            eye,
            view,
            view_proj: proj * view,
        }
    }
}

/// Color and depth buffers of one frame.
struct Target<'a> {
    rgba: &'a mut [u8],
    depth: &'a mut [f32],
    width: usize,
    height: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Blend {
    Opaque,
    Alpha(f32),
}

/// Rasterizes meshes over the camera frame on the CPU. Flat shaded, double
/// sided, opaque meshes first and translucent ones blended back to front
/// without writing depth.
pub struct SoftwareRenderer {
    registered: HashSet<MeshId>,
    lighting: Lighting,
    canvas: Option<Frame>,
    rendered: bool,
    depth: Vec<f32>,
    last_size: (u32, u32),
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new(Lighting::default())
    }
}

impl SoftwareRenderer {
    pub fn new(lighting: Lighting) -> Self {
        Self {
            registered: HashSet::new(),
            lighting,
            canvas: None,
            rendered: false,
            depth: Vec::new(),
            last_size: DEFAULT_SIZE,
        }
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Frame the next `render` draws over. Its buffer is reused as the output.
    pub fn set_background(&mut self, frame: Frame) {
        self.last_size = (frame.width, frame.height);
        self.canvas = Some(frame);
        self.rendered = false;
    }

    /// The frame produced by the last `render`, if not taken yet.
    pub fn take_output(&mut self) -> Option<Frame> {
        if !self.rendered {
            return None;
        }
        self.rendered = false;
        self.canvas.take()
    }

    fn blank_canvas(&self) -> Frame {
        let (width, height) = self.last_size;
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        rgba.par_chunks_mut(4).for_each(|px| px[3] = 255);
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

impl SceneGraph for SoftwareRenderer {
    fn add(&mut self, mesh: &Mesh) {
        self.registered.insert(mesh.id());
    }

    fn remove(&mut self, id: MeshId) {
        self.registered.remove(&id);
    }

    fn render(&mut self, meshes: &[&Mesh]) {
        let mut canvas = match self.canvas.take() {
            Some(frame) if !self.rendered => frame,
            _ => self.blank_canvas(),
        };

        let (width, height) = (canvas.width as usize, canvas.height as usize);
        self.depth.clear();
        self.depth.resize(width * height, f32::INFINITY);
        let camera = CameraRig::new(canvas.aspect_ratio());

        let visible: Vec<&Mesh> = meshes
            .iter()
            .copied()
            .filter(|m| self.registered.contains(&m.id()))
            .collect();
        let (opaque, mut translucent): (Vec<&Mesh>, Vec<&Mesh>) =
            visible.into_iter().partition(|m| !m.material.transparent);
        // Farthest first; view space looks down -z.
        translucent.sort_by(|a, b| {
            let za = camera.view.transform_point3(a.position).z;
            let zb = camera.view.transform_point3(b.position).z;
            za.total_cmp(&zb)
        });

        let mut target = Target {
            rgba: &mut canvas.rgba,
            depth: &mut self.depth,
            width,
            height,
        };
        for mesh in opaque {
            draw_mesh(&mut target, mesh, &camera, &self.lighting, Blend::Opaque);
        }
        for mesh in translucent {
            let blend = Blend::Alpha(mesh.material.effective_opacity());
            draw_mesh(&mut target, mesh, &camera, &self.lighting, blend);
        }

        self.canvas = Some(canvas);
        self.rendered = true;
    }
}

fn draw_mesh(target: &mut Target<'_>, mesh: &Mesh, camera: &CameraRig, lighting: &Lighting, blend: Blend) {
    if matches!(blend, Blend::Alpha(a) if a <= 0.0) {
        return;
    }

    let model = mesh.model_matrix();
    let buffers = mesh.geometry().buffers();
    let viewport = (target.width as f32, target.height as f32);

    // World and clip-space position of every vertex.
    let vertices: Vec<(Vec3, Vec4)> = buffers
        .positions
        .par_iter()
        .map(|p| {
            let world = model.transform_point3(*p);
            (world, camera.view_proj * world.extend(1.0))
        })
        .collect();

    for tri in &buffers.triangles {
        let [a, b, c] = tri.map(|i| vertices[i as usize]);

        let mut normal = (b.0 - a.0).cross(c.0 - a.0).normalize_or_zero();
        if normal == Vec3::ZERO {
            continue;
        }
        let centroid = (a.0 + b.0 + c.0) / 3.0;
        let view_dir = (camera.eye - centroid).normalize_or_zero();
        if normal.dot(view_dir) < 0.0 {
            normal = -normal;
        }

        let polygon = clip_near([a.1, b.1, c.1]);
        if polygon.len() < 3 {
            continue;
        }
        let screen: Vec<Vec3> = polygon.iter().map(|clip| to_screen(*clip, viewport)).collect();
        let color = shade(&mesh.material, normal, view_dir, lighting);
        for i in 1..screen.len() - 1 {
            raster_triangle(target, [screen[0], screen[i], screen[i + 1]], color, blend);
        }
    }
}

/// Clips a clip-space triangle against the near plane (`z >= -w`). Returns
/// the visible polygon: nothing, the triangle itself, or up to four vertices.
fn clip_near(triangle: [Vec4; 3]) -> Vec<Vec4> {
    let distance = |v: Vec4| v.z + v.w;
    let mut out = Vec::with_capacity(4);
    for i in 0..3 {
        let current = triangle[i];
        let next = triangle[(i + 1) % 3];
        let (dc, dn) = (distance(current), distance(next));
        if dc >= 0.0 {
            out.push(current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            let t = dc / (dc - dn);
            out.push(current.lerp(next, t));
        }
    }
    out
}

/// Clip space to pixel x/y plus NDC depth.
fn to_screen(clip: Vec4, (width, height): (f32, f32)) -> Vec3 {
    let ndc = clip.xyz() / clip.w.max(f32::EPSILON);
    Vec3::new((ndc.x + 1.0) * 0.5 * width, (1.0 - ndc.y) * 0.5 * height, ndc.z)
}

/// Flat-shaded approximation of a metal/roughness standard material.
fn shade(material: &StandardMaterial, normal: Vec3, view_dir: Vec3, lighting: &Lighting) -> Vec3 {
    let base = material.color.0;
    let metalness = material.metalness.clamp(0.0, 1.0);
    let n_dot_l = normal.dot(lighting.direction).max(0.0);

    let diffuse = base * (1.0 - metalness) * (lighting.ambient + lighting.directional * n_dot_l);

    let specular_color = Vec3::splat(0.04).lerp(base, metalness);
    let shininess = 2.0 + (1.0 - material.roughness.clamp(0.0, 1.0)).powi(2) * 126.0;
    let half = (lighting.direction + view_dir).normalize_or_zero();
    let highlight = if n_dot_l > 0.0 {
        normal.dot(half).max(0.0).powf(shininess)
    } else {
        0.0
    };
    let specular = specular_color * (lighting.directional * highlight + lighting.ambient * 0.5);

    let emissive = material.emissive.0 * material.emissive_intensity.max(0.0);
    diffuse + specular + emissive
}

fn edge(a: Vec3, b: Vec3, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn raster_triangle(target: &mut Target<'_>, v: [Vec3; 3], color: Vec3, blend: Blend) {
    let area = edge(v[0], v[1], v[2].x, v[2].y);
    if area.abs() < 1e-8 {
        return;
    }

    let max_x = target.width as f32 - 1.0;
    let max_y = target.height as f32 - 1.0;
    let min_px = v.iter().map(|p| p.x).fold(f32::MAX, f32::min).floor().max(0.0);
    let max_px = v.iter().map(|p| p.x).fold(f32::MIN, f32::max).ceil().min(max_x);
    let min_py = v.iter().map(|p| p.y).fold(f32::MAX, f32::min).floor().max(0.0);
    let max_py = v.iter().map(|p| p.y).fold(f32::MIN, f32::max).ceil().min(max_y);
    if min_px > max_px || min_py > max_py {
        return;
    }

    let rgb = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    let rgb = [rgb.x, rgb.y, rgb.z];

    for py in min_py as usize..=max_py as usize {
        let sy = py as f32 + 0.5;
        for px in min_px as usize..=max_px as usize {
            let sx = px as f32 + 0.5;
            let w0 = edge(v[1], v[2], sx, sy) / area;
            let w1 = edge(v[2], v[0], sx, sy) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * v[0].z + w1 * v[1].z + w2 * v[2].z;
            let idx = py * target.width + px;
            if !(-1.0..=1.0).contains(&z) || z >= target.depth[idx] {
                continue;
            }

            let dst = &mut target.rgba[idx * 4..idx * 4 + 3];
            match blend {
                Blend::Opaque => {
                    target.depth[idx] = z;
                    for (d, s) in dst.iter_mut().zip(rgb) {
                        *d = s as u8;
                    }
                }
                Blend::Alpha(alpha) => {
                    for (d, s) in dst.iter_mut().zip(rgb) {
                        *d = (s * alpha + *d as f32 * (1.0 - alpha)).round() as u8;
                    }
                }
            }
        }
    }
}
