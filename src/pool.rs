use crate::{
    random::RandomSource,
    scene::{Color, Geometry, Mesh, MeshId, SceneGraph, Shape, SpinAxis, StandardMaterial},
};

/// Core and shell meshes drawn for one tracked face.
#[derive(Debug)]
pub struct Cell {
    pub core: Mesh,
    pub shell: Mesh,
}

impl Cell {
    fn new(core_id: MeshId, shell_id: MeshId, shape: Shape, base: Color) -> Self {
        let geometry = Geometry::new(shape);
        let shell_geometry = geometry.clone();
        Self {
            core: Mesh::new(core_id, geometry, StandardMaterial::core(base), SpinAxis::Y),
            shell: Mesh::new(shell_id, shell_geometry, StandardMaterial::shell(base), SpinAxis::X),
        }
    }

    pub fn shape(&self) -> Shape {
        self.core.shape()
    }

    /// Replaces both geometries with a fresh `shape`; the old buffers are
    /// released.
    pub fn mutate(&mut self, shape: Shape) {
        let geometry = Geometry::new(shape);
        self.shell.set_geometry(geometry.clone());
        self.core.set_geometry(geometry);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolDelta {
    pub added: usize,
    pub removed: usize,
}

/// Growable set of cells, index `i` belonging to face `i` of the current frame.
#[derive(Debug, Default)]
pub struct CellPool {
    cells: Vec<Cell>,
    next_id: u64,
}

impl CellPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    /// Core then shell of every cell, in pool order.
    pub fn meshes(&self) -> Vec<&Mesh> {
        self.cells
            .iter()
            .flat_map(|cell| [&cell.core, &cell.shell])
            .collect()
    }

    /// Grows or shrinks the pool to exactly `target` cells. New cells get a
    /// random shape and materials derived from `base`; removed cells are taken
    /// from the end and detached from `scene`.
    pub fn reconcile<S, R>(
        &mut self,
        target: usize,
        scene: &mut S,
        rng: &mut R,
        base: Color,
    ) -> PoolDelta
    where
        S: SceneGraph + ?Sized,
        R: RandomSource + ?Sized,
    {
        let mut delta = PoolDelta::default();

        while self.cells.len() < target {
            let shape = Shape::random(rng);
            let core_id = self.allocate_id();
            let shell_id = self.allocate_id();
            let cell = Cell::new(core_id, shell_id, shape, base);
            scene.add(&cell.core);
            scene.add(&cell.shell);
            log::debug!("cell {} created as {}", self.cells.len(), shape.label());
            self.cells.push(cell);
            delta.added += 1;
        }

        while self.cells.len() > target {
            if self.pop_cell(scene) {
                delta.removed += 1;
            }
        }

        delta
    }

    /// Removes every cell, last first. Returns how many were removed.
    pub fn clear_all<S>(&mut self, scene: &mut S) -> usize
    where
        S: SceneGraph + ?Sized,
    {
        let mut removed = 0;
        while self.pop_cell(scene) {
            removed += 1;
        }
        removed
    }

    fn pop_cell<S>(&mut self, scene: &mut S) -> bool
    where
        S: SceneGraph + ?Sized,
    {
        let Some(cell) = self.cells.pop() else {
            return false;
        };
        scene.remove(cell.core.id());
        scene.remove(cell.shell.id());
        log::debug!("cell {} removed", self.cells.len());
        true
    }

    fn allocate_id(&mut self) -> MeshId {
        let id = MeshId(self.next_id);
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{random::testing::ScriptedRandom, scene::testing::RecordingScene};

    const BASE: Color = Color::rgb(0.2, 0.7, 1.0);

    fn assert_paired(pool: &CellPool) {
        for cell in pool.cells() {
            assert_eq!(cell.core.shape(), cell.shell.shape());
            assert_ne!(cell.core.id(), cell.shell.id());
        }
    }

    #[test]
    fn pool_follows_face_counts() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut rng = ScriptedRandom::new(&[0.1, 0.4, 0.7]);

        let mut previous = 0usize;
        for target in [0, 1, 2, 2, 1, 0] {
            scene.reset_counts();
            let delta = pool.reconcile(target, &mut scene, &mut rng, BASE);
            assert_eq!(pool.len(), target);
            assert_eq!(scene.registered.len(), target * 2);

            let grow = target.saturating_sub(previous);
            let shrink = previous.saturating_sub(target);
            assert_eq!(delta, PoolDelta { added: grow, removed: shrink });
            assert_eq!(scene.adds, grow * 2);
            assert_eq!(scene.removes, shrink * 2);
            assert_paired(&pool);
            previous = target;
        }
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut rng = ScriptedRandom::constant(0.5);

        pool.reconcile(3, &mut scene, &mut rng, BASE);
        scene.reset_counts();
        let delta = pool.reconcile(3, &mut scene, &mut rng, BASE);

        assert_eq!(delta, PoolDelta::default());
        assert_eq!((scene.adds, scene.removes), (0, 0));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn shrinking_removes_from_the_end() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut rng = ScriptedRandom::new(&[0.0, 0.2, 0.99]);

        pool.reconcile(3, &mut scene, &mut rng, BASE);
        let first_two: Vec<MeshId> = pool.cells()[..2].iter().map(|c| c.core.id()).collect();
        pool.reconcile(2, &mut scene, &mut rng, BASE);

        let kept: Vec<MeshId> = pool.cells().iter().map(|c| c.core.id()).collect();
        assert_eq!(kept, first_two);
        assert_eq!(pool.cells()[0].shape(), Shape::Sphere);
        assert_eq!(pool.cells()[1].shape(), Shape::Cone);
    }

    #[test]
    fn clear_all_detaches_every_mesh() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut rng = ScriptedRandom::constant(0.3);

        pool.reconcile(3, &mut scene, &mut rng, BASE);
        scene.reset_counts();
        assert_eq!(pool.clear_all(&mut scene), 3);
        assert!(pool.is_empty());
        assert_eq!(scene.removes, 6);
        assert!(scene.registered.is_empty());
        assert_eq!(pool.clear_all(&mut scene), 0);
    }

    #[test]
    fn mutation_keeps_core_and_shell_in_step() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut rng = ScriptedRandom::constant(0.0);

        pool.reconcile(1, &mut scene, &mut rng, BASE);
        let cell = pool.get_mut(0).expect("one cell");
        cell.mutate(Shape::Icosahedron);
        assert_eq!(cell.core.shape(), Shape::Icosahedron);
        assert_eq!(cell.shell.shape(), Shape::Icosahedron);
    }

    #[test]
    fn new_cells_draw_their_shape_from_any_source() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut scripted = ScriptedRandom::new(&[0.99, 0.6]);
        let rng: &mut dyn RandomSource = &mut scripted;

        pool.reconcile(2, &mut scene, rng, BASE);

        assert_eq!(pool.cells()[0].shape(), Shape::Box);
        assert_eq!(pool.cells()[1].shape(), Shape::Torus);
        assert_eq!(scripted.draws(), 2);
        assert_paired(&pool);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut pool = CellPool::new();
        let mut scene = RecordingScene::default();
        let mut rng = ScriptedRandom::constant(0.5);

        pool.reconcile(1, &mut scene, &mut rng, BASE);
        let before = pool.meshes().iter().map(|m| m.id()).max();
        pool.clear_all(&mut scene);
        pool.reconcile(1, &mut scene, &mut rng, BASE);
        let after = pool.meshes().iter().map(|m| m.id()).min();
        assert!(after > before);
    }
}
