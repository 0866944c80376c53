mod material;
mod mesh;
mod shape;

pub use material::{Color, StandardMaterial};
pub use mesh::{Mesh, MeshId, SpinAxis};
pub use shape::{Geometry, MeshBuffers, Shape};

/// Renderer-side scene. It only keeps registrations: meshes are owned by the
/// cell pool and lent to `render` every frame.
pub trait SceneGraph {
    fn add(&mut self, mesh: &Mesh);

    fn remove(&mut self, id: MeshId);

    /// Draws one frame. Meshes that were never added (or already removed) are
    /// ignored.
    fn render(&mut self, meshes: &[&Mesh]);
}
