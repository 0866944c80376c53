use glam::Vec3;

use crate::{
    audio::{AudioFeatureExtractor, AudioFeatures},
    geometry::resolve_face,
    pool::CellPool,
    random::RandomSource,
    scene::{Color, SceneGraph, Shape},
    types::DetectionResults,
};

/// Phase advance per processed frame.
pub const TIME_STEP: f32 = 0.02;

const MAX_JITTER: f32 = 0.12;
const SHELL_SCALE: f32 = 1.3;
const FLICKER_LIMIT: f32 = 0.5;
const MUTATION_MIN_VOLUME: f32 = 0.3;
const MUTATION_RATE: f32 = 0.4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackingState {
    #[default]
    Idle,
    Tracking,
}

impl TrackingState {
    pub fn label(&self) -> &'static str {
        match self {
            TrackingState::Idle => "idle",
            TrackingState::Tracking => "tracking",
        }
    }
}

/// What one call to [`Session::process_frame`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub state: TrackingState,
    pub faces: usize,
    pub cells: usize,
    /// Faces whose anchor landmarks were missing this frame.
    pub skipped: usize,
    pub mutations: usize,
    pub audio: AudioFeatures,
    pub time: f32,
}

pub fn jitter_amount(volume: f32) -> f32 {
    (volume * 0.1).min(MAX_JITTER)
}

pub fn breath(time: f32, index: usize) -> f32 {
    (time * 2.0 + index as f32).sin() * 0.03
}

/// Core scale `(xz, y, xz)`; taller than wide and swelling with volume.
pub fn cell_scale(width: f32, volume: f32, breath: f32) -> Vec3 {
    let y = width * 6.0 * (1.0 + volume * 3.5 + breath);
    let xz = width * 5.0 * (1.0 + volume * 2.5 + breath);
    Vec3::new(xz, y, xz)
}

pub fn flicker(time: f32, index: usize, treble: f32, volume: f32) -> f32 {
    let raw = (time * 30.0 + index as f32 * 1.2).sin() * (treble + volume) * 0.8;
    raw.clamp(-FLICKER_LIMIT, FLICKER_LIMIT)
}

pub fn core_emissive_intensity(volume: f32) -> f32 {
    0.6 + volume.max(0.0).powf(2.2) * 5.0
}

pub fn shell_emissive_intensity(volume: f32) -> f32 {
    0.2 + volume.max(0.0).powf(2.5) * 3.0
}

pub fn base_color(volume: f32) -> Color {
    Color::from_hsv(200.0 + volume * 40.0, 0.8, 1.0)
}

/// All mutable state of one running visualisation: the scene it draws into,
/// the cell pool, the phase clock and the random source.
pub struct Session<S, R> {
    scene: S,
    pool: CellPool,
    rng: R,
    audio: AudioFeatureExtractor,
    time: f32,
    state: TrackingState,
}

impl<S, R> Session<S, R>
where
    S: SceneGraph,
    R: RandomSource,
{
    pub fn new(scene: S, rng: R, audio: AudioFeatureExtractor) -> Self {
        log::debug!("session created (audio source: {})", audio.has_source());
        Self {
            scene,
            pool: CellPool::new(),
            rng,
            audio,
            time: 0.0,
            state: TrackingState::Idle,
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn pool(&self) -> &CellPool {
        &self.pool
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Applies one detector result: updates the cells and issues exactly one
    /// render. Never fails; missing data degrades to defaults.
    pub fn process_frame(&mut self, results: &DetectionResults) -> FrameReport {
        let next_state = if results.multi_face_landmarks.is_empty() {
            TrackingState::Idle
        } else {
            TrackingState::Tracking
        };
        if next_state != self.state {
            log::debug!(
                "{} -> {} ({} faces)",
                self.state.label(),
                next_state.label(),
                results.face_count()
            );
            self.state = next_state;
        }

        let report = match next_state {
            TrackingState::Idle => self.idle_tick(),
            TrackingState::Tracking => self.tracking_tick(results),
        };

        self.time += TIME_STEP;
        report
    }

    fn idle_tick(&mut self) -> FrameReport {
        // Keep the analyser current so the first tracked face sees live levels.
        let audio = self.audio.sample();
        self.pool.clear_all(&mut self.scene);
        self.scene.render(&[]);

        FrameReport {
            state: TrackingState::Idle,
            audio,
            time: self.time,
            ..Default::default()
        }
    }

    fn tracking_tick(&mut self, results: &DetectionResults) -> FrameReport {
        let faces = &results.multi_face_landmarks;
        let audio = self.audio.sample();
        let AudioFeatures { volume, treble } = audio;
        let jitter = jitter_amount(volume);
        let base = base_color(volume);
        let core_intensity = core_emissive_intensity(volume);
        let shell_intensity = shell_emissive_intensity(volume);

        let delta = self
            .pool
            .reconcile(faces.len(), &mut self.scene, &mut self.rng, base);
        if delta.added > 0 || delta.removed > 0 {
            log::debug!(
                "pool now {} cells (+{} -{})",
                self.pool.len(),
                delta.added,
                delta.removed
            );
        }

        let mut skipped = 0;
        let mut mutations = 0;
        for (i, landmarks) in faces.iter().enumerate() {
            let Some(frame) = resolve_face(landmarks) else {
                skipped += 1;
                continue;
            };
            let Some(cell) = self.pool.get_mut(i) else {
                continue;
            };

            let center = frame.center
                + Vec3::new(
                    self.rng.next_centered(jitter),
                    self.rng.next_centered(jitter),
                    self.rng.next_centered(jitter),
                );
            cell.core.position = center;
            cell.shell.position = center;

            let scale = cell_scale(frame.width, volume, breath(self.time, i));
            cell.core.scale = scale;
            cell.shell.scale = scale * SHELL_SCALE;

            let orientation = frame.orientation();
            cell.core.orientation = orientation;
            cell.shell.orientation = orientation;
            let spin = flicker(self.time, i, treble, volume);
            cell.core.add_spin(spin);
            cell.shell.add_spin(spin);

            cell.core.material.emissive = base;
            cell.shell.material.emissive = base;
            cell.core.material.emissive_intensity = core_intensity;
            cell.shell.material.emissive_intensity = shell_intensity;

            if volume > MUTATION_MIN_VOLUME && self.rng.next_unit() < volume * MUTATION_RATE {
                let shape = Shape::random(&mut self.rng);
                log::debug!("cell {i} mutates {} -> {}", cell.shape().label(), shape.label());
                cell.mutate(shape);
                mutations += 1;
            }
        }

        let meshes = self.pool.meshes();
        self.scene.render(&meshes);

        FrameReport {
            state: TrackingState::Tracking,
            faces: faces.len(),
            cells: self.pool.len(),
            skipped,
            mutations,
            audio,
            time: self.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        f32::consts::TAU,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use glam::Quat;

    use super::*;
    use crate::{
        audio::FrequencySource,
        geometry::testing::upright_face,
        random::testing::ScriptedRandom,
        scene::testing::RecordingScene,
        types::FaceLandmarks,
    };

    struct ConstantSpectrum(u8);

    impl FrequencySource for ConstantSpectrum {
        fn bin_count(&self) -> usize {
            64
        }

        fn byte_frequency_data(&mut self, out: &mut [u8]) {
            out.fill(self.0);
        }
    }

    struct CountingSpectrum(Arc<AtomicUsize>);

    impl FrequencySource for CountingSpectrum {
        fn bin_count(&self) -> usize {
            16
        }

        fn byte_frequency_data(&mut self, out: &mut [u8]) {
            self.0.fetch_add(1, Ordering::Relaxed);
            out.fill(128);
        }
    }

    fn results(faces: usize) -> DetectionResults {
        DetectionResults {
            multi_face_landmarks: (0..faces)
                .map(|i| upright_face(0.2 + 0.3 * i as f32, 0.5, 0.2))
                .collect(),
        }
    }

    fn quiet_session(rng: ScriptedRandom) -> Session<RecordingScene, ScriptedRandom> {
        Session::new(RecordingScene::default(), rng, AudioFeatureExtractor::silent())
    }

    fn loud_session(level: u8, rng: ScriptedRandom) -> Session<RecordingScene, ScriptedRandom> {
        let audio = AudioFeatureExtractor::new(Some(Box::new(ConstantSpectrum(level))));
        Session::new(RecordingScene::default(), rng, audio)
    }

    #[test]
    fn pool_tracks_face_counts_frame_by_frame() {
        let mut session = quiet_session(ScriptedRandom::constant(0.5));
        let mut previous = 0usize;
        for faces in [0, 1, 2, 2, 1, 0] {
            session.scene_mut().reset_counts();
            let report = session.process_frame(&results(faces));

            assert_eq!(session.pool().len(), faces);
            assert_eq!(report.cells, faces);
            let scene = session.scene();
            assert_eq!(scene.adds, faces.saturating_sub(previous) * 2);
            assert_eq!(scene.removes, previous.saturating_sub(faces) * 2);
            assert_eq!(scene.renders, 1);
            assert_eq!(scene.last_drawn, faces * 2);
            previous = faces;
        }
    }

    #[test]
    fn losing_all_faces_drains_the_pool_and_still_renders() {
        let mut session = quiet_session(ScriptedRandom::constant(0.5));
        session.process_frame(&results(3));
        assert_eq!(session.state(), TrackingState::Tracking);

        session.scene_mut().reset_counts();
        let report = session.process_frame(&DetectionResults::empty());

        assert_eq!(report.state, TrackingState::Idle);
        assert_eq!(session.state(), TrackingState::Idle);
        assert!(session.pool().is_empty());
        assert_eq!(session.scene().removes, 6);
        assert_eq!(session.scene().renders, 1);
        assert_eq!(session.scene().last_drawn, 0);
    }

    #[test]
    fn time_advances_once_per_frame() {
        let mut session = quiet_session(ScriptedRandom::constant(0.5));
        for faces in [0, 1, 0, 2] {
            session.process_frame(&results(faces));
        }
        assert!((session.time() - 4.0 * TIME_STEP).abs() < 1e-6);
    }

    #[test]
    fn quiet_frame_places_cell_on_the_face() {
        let mut session = quiet_session(ScriptedRandom::constant(0.0));
        let report = session.process_frame(&results(1));
        assert_eq!(report.audio, AudioFeatures::SILENT);

        let cell = &session.pool().cells()[0];
        // No volume: no jitter, no breath at t = 0, no spin.
        assert!(cell.core.position.abs_diff_eq(Vec3::new(-0.3, 0.01, 0.02), 1e-5));
        assert_eq!(cell.core.position, cell.shell.position);
        assert!(cell.core.scale.abs_diff_eq(Vec3::new(1.0, 1.2, 1.0), 1e-5));
        assert!(cell.shell.scale.abs_diff_eq(Vec3::new(1.3, 1.56, 1.3), 1e-5));
        assert!(cell.core.rotation().abs_diff_eq(Quat::IDENTITY, 1e-4));
        assert!((cell.core.material.emissive_intensity - 0.6).abs() < 1e-6);
        assert!((cell.shell.material.emissive_intensity - 0.2).abs() < 1e-6);
    }

    #[test]
    fn loud_frame_jitters_swells_and_glows() {
        // Draws: shape pick, jitter x/y/z, mutation roll (declined).
        let rng = ScriptedRandom::new(&[0.0, 0.0, 0.5, 0.75, 0.9]);
        let mut session = loud_session(255, rng);
        let report = session.process_frame(&results(1));

        assert!((report.audio.volume - 1.0).abs() < 1e-6);
        assert_eq!(report.mutations, 0);
        let cell = &session.pool().cells()[0];
        let expected = Vec3::new(-0.3, 0.01, 0.02) + Vec3::new(-0.05, 0.0, 0.025);
        assert!(cell.core.position.abs_diff_eq(expected, 1e-5), "{:?}", cell.core.position);
        assert!(cell.core.scale.abs_diff_eq(Vec3::new(3.5, 5.4, 3.5), 1e-4));
        assert!((cell.core.material.emissive_intensity - 5.6).abs() < 1e-5);
        assert!((cell.shell.material.emissive_intensity - 3.2).abs() < 1e-5);
        assert_eq!(cell.core.material.emissive, base_color(1.0));
        assert_eq!(cell.shape(), Shape::Sphere);
        assert_eq!(session.rng.draws(), 5);
    }

    #[test]
    fn loud_frame_can_mutate_geometry() {
        // Draws: shape pick, jitter x/y/z, mutation roll (accepted), new shape.
        let rng = ScriptedRandom::new(&[0.0, 0.5, 0.5, 0.5, 0.1, 0.99]);
        let mut session = loud_session(255, rng);
        let report = session.process_frame(&results(1));

        assert_eq!(report.mutations, 1);
        let cell = &session.pool().cells()[0];
        assert_eq!(cell.core.shape(), Shape::Box);
        assert_eq!(cell.shell.shape(), Shape::Box);
    }

    #[test]
    fn moderate_volume_never_rolls_for_mutation() {
        // 0.2 volume is under the mutation threshold: shape pick + 3 jitter draws only.
        let mut session = loud_session(51, ScriptedRandom::constant(0.0));
        let report = session.process_frame(&results(1));
        assert_eq!(report.mutations, 0);
        assert_eq!(session.rng.draws(), 4);
    }

    #[test]
    fn loud_frames_accumulate_core_yaw_and_shell_pitch() {
        // Shape pick, then jitter x/y/z and a declined mutation roll per frame.
        let mut session = loud_session(255, ScriptedRandom::constant(0.9));
        session.process_frame(&results(1));
        session.process_frame(&results(1));

        let expected = (flicker(0.0, 0, 1.0, 1.0) + flicker(TIME_STEP, 0, 1.0, 1.0)) % TAU;
        assert!(expected.abs() > 0.1);

        let cell = &session.pool().cells()[0];
        assert!((cell.core.spin() - expected).abs() < 1e-6);
        assert!((cell.shell.spin() - expected).abs() < 1e-6);

        let yawed = cell.core.orientation * Quat::from_rotation_y(expected);
        let pitched = cell.shell.orientation * Quat::from_rotation_x(expected);
        assert!(cell.core.rotation().abs_diff_eq(yawed, 1e-5));
        assert!(cell.shell.rotation().abs_diff_eq(pitched, 1e-5));
        assert!(!cell.core.rotation().abs_diff_eq(cell.shell.rotation(), 1e-3));
    }

    #[test]
    fn idle_frames_keep_sampling_audio() {
        let calls = Arc::new(AtomicUsize::new(0));
        let audio = AudioFeatureExtractor::new(Some(Box::new(CountingSpectrum(calls.clone()))));
        let mut session = Session::new(RecordingScene::default(), ScriptedRandom::constant(0.5), audio);

        for _ in 0..3 {
            let report = session.process_frame(&DetectionResults::empty());
            assert_eq!(report.state, TrackingState::Idle);
            assert!((report.audio.volume - 128.0 / 255.0).abs() < 1e-6);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert!(session.pool().is_empty());

        session.process_frame(&results(1));
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn face_with_missing_landmarks_keeps_previous_transform() {
        let mut session = quiet_session(ScriptedRandom::constant(0.5));
        session.process_frame(&results(2));
        let before = session.pool().cells()[1].core.position;

        let mut faces = results(2);
        faces.multi_face_landmarks[1] = FaceLandmarks::new();
        faces.multi_face_landmarks[0] = upright_face(0.6, 0.6, 0.2);
        let report = session.process_frame(&faces);

        assert_eq!(report.skipped, 1);
        assert_eq!(session.pool().len(), 2);
        assert_eq!(session.pool().cells()[1].core.position, before);
        assert!(session.pool().cells()[0].core.position.x > 0.09);
    }

    #[test]
    fn flicker_is_always_clamped() {
        for step in 0..500 {
            let time = step as f32 * 0.37;
            for index in 0..4 {
                for (treble, volume) in [(0.0, 0.0), (1.0, 1.0), (10.0, 10.0), (-10.0, 10.0)] {
                    let f = flicker(time, index, treble, volume);
                    assert!((-0.5..=0.5).contains(&f), "flicker {f} out of range");
                }
            }
        }
    }

    #[test]
    fn jitter_is_capped() {
        assert_eq!(jitter_amount(0.0), 0.0);
        assert!((jitter_amount(0.5) - 0.05).abs() < 1e-6);
        assert!((jitter_amount(5.0) - 0.12).abs() < 1e-6);
    }

    #[test]
    fn breath_is_phase_shifted_per_cell() {
        assert_eq!(breath(0.0, 0), 0.0);
        assert!((breath(0.0, 1) - 1.0f32.sin() * 0.03).abs() < 1e-6);
        assert!(breath(1.3, 2).abs() <= 0.03);
    }

    #[test]
    fn emissive_grows_superlinearly() {
        let quiet = core_emissive_intensity(0.25) - core_emissive_intensity(0.0);
        let loud = core_emissive_intensity(0.5) - core_emissive_intensity(0.25);
        assert!(loud > quiet);
        assert!((shell_emissive_intensity(1.0) - 3.2).abs() < 1e-6);
    }
}
