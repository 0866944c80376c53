use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use thiserror::Error;

use crate::{
    audio::{AudioFeatureExtractor, MicrophoneInput, SpectrumAnalyser, SpectrumConfig, start_microphone},
    config::AppConfig,
    model_download::{ModelDownloadEvent, ModelKind, ModelSource, ensure_model_ready},
    pipeline::{
        CameraStream, OrtFaceMesh, SoftwareRenderer, start_camera_stream, start_frame_compositor,
    },
    random::session_rng,
    session::Session,
    types::CompositedFrame,
};

/// Terminal start-up failures. None of them is retried.
#[derive(Clone, Debug, Error)]
pub enum BootstrapError {
    #[error("camera unavailable: {0}")]
    Camera(String),
    #[error("{model} model unavailable: {reason}")]
    Model { model: &'static str, reason: String },
    #[error("failed to load the face landmark models: {0}")]
    Detector(String),
    #[error("failed to start the session worker: {0}")]
    Worker(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapStage {
    Camera,
    Microphone,
    Models,
    Detector,
    Worker,
}

/// Devices and threads of a running session. Dropping it stops capture,
/// which in turn ends the worker.
pub struct SessionHandles {
    pub camera: CameraStream,
    pub microphone: Option<MicrophoneInput>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SessionHandles {
    pub fn camera_label(&self) -> &str {
        self.camera.label()
    }

    pub fn microphone_label(&self) -> Option<&str> {
        self.microphone.as_ref().map(MicrophoneInput::device_name)
    }

    pub fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }
}

pub enum BootstrapMessage {
    Stage(BootstrapStage),
    Download(ModelDownloadEvent),
    Ready(SessionHandles),
    Failed(BootstrapError),
}

/// Acquires everything a session needs on a background thread, reporting
/// progress on the returned channel. Composited frames go to `output_tx`.
pub fn spawn_bootstrap(config: AppConfig, output_tx: Sender<CompositedFrame>) -> Receiver<BootstrapMessage> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("bootstrap".into())
        .spawn({
            let tx = tx.clone();
            move || {
                let message = match run_bootstrap(&config, output_tx, &tx) {
                    Ok(handles) => BootstrapMessage::Ready(handles),
                    Err(err) => {
                        log::error!("{err}");
                        BootstrapMessage::Failed(err)
                    }
                };
                let _ = tx.send(message);
            }
        });

    if let Err(err) = spawned {
        let _ = tx.send(BootstrapMessage::Failed(BootstrapError::Worker(err.to_string())));
    }
    rx
}

fn run_bootstrap(
    config: &AppConfig,
    output_tx: Sender<CompositedFrame>,
    progress: &Sender<BootstrapMessage>,
) -> Result<SessionHandles, BootstrapError> {
    let stage = |stage: BootstrapStage| {
        let _ = progress.send(BootstrapMessage::Stage(stage));
    };
    log::info!(
        "starting {} variant (max faces {}, audio {})",
        config.variant.label(),
        config.detector.max_faces,
        config.audio
    );

    stage(BootstrapStage::Camera);
    let (frame_tx, frame_rx) = bounded(1);
    let camera = start_camera_stream(config.camera_index, frame_tx)
        .map_err(|err| BootstrapError::Camera(format!("{err:#}")))?;
    log::info!("camera ready: {}", camera.label());

    let (microphone, audio) = if config.audio {
        stage(BootstrapStage::Microphone);
        open_audio()
    } else {
        (None, AudioFeatureExtractor::silent())
    };

    stage(BootstrapStage::Models);
    let sources = ModelKind::ALL.map(|kind| {
        let url = match kind {
            ModelKind::FaceDetector => config.detector_model_url.clone(),
            ModelKind::FaceLandmarker => config.landmark_model_url.clone(),
        };
        ModelSource::new(kind, &config.models_dir, url)
    });
    for source in &sources {
        ensure_model_ready(source, |event| {
            let _ = progress.send(BootstrapMessage::Download(event));
        })
        .map_err(|err| BootstrapError::Model {
            model: source.kind.label(),
            reason: format!("{err:#}"),
        })?;
    }
    log::info!("models ready in {}", config.models_dir.display());

    stage(BootstrapStage::Detector);
    let [detector, landmarker] = &sources;
    let face_mesh = OrtFaceMesh::new(&detector.path, &landmarker.path, config.detector.clone())
        .map_err(|err| BootstrapError::Detector(format!("{err:#}")))?;
    log::info!("face landmarker ready ({:?})", config.detector);

    stage(BootstrapStage::Worker);
    let session = Session::new(SoftwareRenderer::default(), session_rng(config.seed), audio);
    let worker = start_frame_compositor(face_mesh, session, frame_rx, output_tx)
        .map_err(|err| BootstrapError::Worker(format!("{err:#}")))?;

    Ok(SessionHandles {
        camera,
        microphone,
        worker: Some(worker),
    })
}

/// Microphone plus analyser, or silence when no input can be opened.
fn open_audio() -> (Option<MicrophoneInput>, AudioFeatureExtractor) {
    match start_microphone() {
        Ok((microphone, samples_rx)) => {
            log::info!("microphone ready: {}", microphone.device_name());
            let analyser = SpectrumAnalyser::new(SpectrumConfig::default(), Some(samples_rx));
            (Some(microphone), AudioFeatureExtractor::new(Some(Box::new(analyser))))
        }
        Err(err) => {
            log::warn!("microphone unavailable, continuing without audio: {err:#}");
            (None, AudioFeatureExtractor::silent())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_read_as_terminal_messages() {
        let err = BootstrapError::Model {
            model: ModelKind::FaceDetector.label(),
            reason: "not found".into(),
        };
        assert_eq!(err.to_string(), "face detector model unavailable: not found");
        assert_eq!(
            BootstrapError::Camera("busy".into()).to_string(),
            "camera unavailable: busy"
        );
    }
}
