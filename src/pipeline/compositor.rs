use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::{detector::FaceLandmarker, renderer::SoftwareRenderer};
use crate::{
    random::RandomSource,
    session::Session,
    types::{CompositedFrame, DetectionResults, Frame},
};

/// Blocks for the next frame, then skips to the newest one queued.
pub(crate) fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

/// Runs detection, the session update and rendering for one frame.
pub(crate) fn composite_frame<L, R>(
    landmarker: &mut L,
    session: &mut Session<SoftwareRenderer, R>,
    frame: Frame,
) -> Option<CompositedFrame>
where
    L: FaceLandmarker,
    R: RandomSource,
{
    let results = match landmarker.detect(&frame) {
        Ok(results) => results,
        Err(err) => {
            log::warn!("face landmark inference failed: {err:?}");
            landmarker.reset();
            DetectionResults::empty()
        }
    };

    session.scene_mut().set_background(frame);
    let report = session.process_frame(&results);
    let frame = session.scene_mut().take_output()?;
    Some(CompositedFrame { frame, report })
}

/// Starts the session worker: the only thread that touches the session.
/// Exits when the camera side hangs up or the UI drops its receiver.
pub fn start_frame_compositor<L, R>(
    mut landmarker: L,
    mut session: Session<SoftwareRenderer, R>,
    frame_rx: Receiver<Frame>,
    output_tx: Sender<CompositedFrame>,
) -> Result<thread::JoinHandle<()>>
where
    L: FaceLandmarker,
    R: RandomSource + Send + 'static,
{
    thread::Builder::new()
        .name("frame-compositor".into())
        .spawn(move || {
            while let Some(frame) = recv_latest_frame(&frame_rx) {
                let Some(composited) = composite_frame(&mut landmarker, &mut session, frame) else {
                    continue;
                };
                if let Err(TrySendError::Disconnected(_)) = output_tx.try_send(composited) {
                    break;
                }
            }
            log::info!(
                "frame compositor stopped at t = {:.2} ({}, {} cells, {} meshes attached)",
                session.time(),
                session.state().label(),
                session.pool().len(),
                session.scene().registered_count()
            );
        })
        .context("failed to spawn frame compositor thread")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;
    use crossbeam_channel::bounded;

    use super::*;
    use crate::{
        audio::AudioFeatureExtractor, geometry::testing::upright_face,
        pipeline::detector::testing::solid_frame, random::testing::ScriptedRandom,
        session::TrackingState,
    };

    /// Replays a face count per call; `None` fails the call.
    struct ScriptedLandmarker {
        script: Vec<Option<usize>>,
        calls: usize,
        resets: usize,
    }

    impl ScriptedLandmarker {
        fn new(script: &[Option<usize>]) -> Self {
            Self {
                script: script.to_vec(),
                calls: 0,
                resets: 0,
            }
        }
    }

    impl FaceLandmarker for ScriptedLandmarker {
        fn detect(&mut self, _frame: &Frame) -> Result<DetectionResults> {
            let step = self.script.get(self.calls).copied().flatten();
            self.calls += 1;
            let faces = step.ok_or_else(|| anyhow!("scripted failure"))?;
            Ok(DetectionResults {
                multi_face_landmarks: (0..faces)
                    .map(|i| upright_face(0.3 + 0.3 * i as f32, 0.5, 0.2))
                    .collect(),
            })
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn session() -> Session<SoftwareRenderer, ScriptedRandom> {
        Session::new(
            SoftwareRenderer::default(),
            ScriptedRandom::constant(0.5),
            AudioFeatureExtractor::silent(),
        )
    }

    #[test]
    fn frame_with_a_face_is_composited() {
        let mut landmarker = ScriptedLandmarker::new(&[Some(1)]);
        let mut session = session();
        let background = solid_frame(64, 48, [0, 0, 0]);

        let out = composite_frame(&mut landmarker, &mut session, background.clone())
            .expect("composited frame");
        assert_eq!(out.report.faces, 1);
        assert_eq!(out.report.state, TrackingState::Tracking);
        assert_eq!(session.scene().registered_count(), 2);
        assert_ne!(out.frame.rgba, background.rgba);
    }

    #[test]
    fn inference_failure_renders_an_idle_frame() {
        let mut landmarker = ScriptedLandmarker::new(&[Some(2), None]);
        let mut session = session();

        composite_frame(&mut landmarker, &mut session, solid_frame(32, 24, [9, 9, 9]));
        let out = composite_frame(&mut landmarker, &mut session, solid_frame(32, 24, [9, 9, 9]))
            .expect("idle frame still rendered");

        assert_eq!(out.report.state, TrackingState::Idle);
        assert_eq!(landmarker.resets, 1);
        assert_eq!(session.scene().registered_count(), 0);
        assert_eq!(out.frame.rgba, solid_frame(32, 24, [9, 9, 9]).rgba);
    }

    #[test]
    fn worker_only_processes_the_newest_frame() {
        let (frame_tx, frame_rx) = bounded(4);
        frame_tx.send(solid_frame(8, 8, [1, 1, 1])).expect("queue");
        frame_tx.send(solid_frame(8, 8, [2, 2, 2])).expect("queue");

        let latest = recv_latest_frame(&frame_rx).expect("frame");
        assert_eq!(latest.rgba[0], 2);
        assert!(frame_rx.is_empty());
    }

    #[test]
    fn worker_stops_when_the_camera_hangs_up() {
        let (frame_tx, frame_rx) = bounded(1);
        let (out_tx, out_rx) = bounded(1);
        let handle = start_frame_compositor(
            ScriptedLandmarker::new(&[Some(1)]),
            session(),
            frame_rx,
            out_tx,
        )
        .expect("spawn worker");

        frame_tx.send(solid_frame(32, 24, [0, 0, 0])).expect("send frame");
        let out = out_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("composited frame");
        assert_eq!(out.report.faces, 1);

        drop(frame_tx);
        handle.join().expect("worker exits cleanly");
    }
}
