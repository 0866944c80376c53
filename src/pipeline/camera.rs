use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, TrySendError, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

use super::rgba_converter::FrameDecoder;
use crate::types::Frame;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_FPS: u32 = 30;
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

// Prefer formats that decode cheaply; built-in macOS cameras often reject
// YUYV even though it is reported.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::MJPEG,
    FrameFormat::NV12,
    FrameFormat::YUYV,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
];

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    let preferred = CameraFormat::new(
        Resolution::new(CAPTURE_WIDTH, CAPTURE_HEIGHT),
        FrameFormat::MJPEG,
        CAPTURE_FPS,
    );
    [
        RequestedFormat::with_formats(
            RequestedFormatType::Closest(preferred),
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Running capture thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    label: String,
}

impl CameraStream {
    pub fn label(&self) -> &str {
        &self.label
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no supported capture format")))
}

/// Opens camera `index` on its own thread and forwards decoded frames to
/// `frame_tx`, dropping them while the receiver is busy. Returns once the
/// device is streaming, or with the open error.
pub fn start_camera_stream(index: u32, frame_tx: Sender<Frame>) -> Result<CameraStream> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let (ready_tx, ready_rx) = bounded::<Result<String, String>>(1);

    let handle = thread::Builder::new()
        .name("camera-capture".into())
        .spawn(move || {
            let mut camera = match open_camera(CameraIndex::Index(index)) {
                Ok(camera) => camera,
                Err(err) => {
                    let _ = ready_tx.send(Err(format!("{err:#}")));
                    return;
                }
            };

            let format = camera.camera_format();
            log::info!(
                "camera {index} streaming {}x{} {:?} @ {} fps",
                format.width(),
                format.height(),
                format.format(),
                format.frame_rate()
            );
            let _ = ready_tx.send(Ok(camera.info().human_name()));

            let mut decoder = FrameDecoder::new();
            while !stop_flag.load(Ordering::Relaxed) {
                let buffer = match camera.frame() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        log::warn!("camera frame read failed: {err:?}");
                        continue;
                    }
                };

                let Some(frame) = decoder.decode(&buffer) else {
                    continue;
                };
                if let Err(TrySendError::Disconnected(_)) = frame_tx.try_send(frame) {
                    log::info!("frame consumer hung up, stopping camera {index}");
                    break;
                }
            }

            if let Err(err) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        })
        .context("failed to spawn camera thread")?;

    let mut stream = CameraStream {
        stop,
        handle: Some(handle),
        label: String::new(),
    };

    match ready_rx.recv_timeout(OPEN_TIMEOUT) {
        Ok(Ok(label)) => {
            stream.label = label;
            Ok(stream)
        }
        Ok(Err(message)) => Err(anyhow!("failed to open camera {index}: {message}")),
        Err(_) => {
            // The open call may never return; leave the thread behind.
            stream.stop.store(true, Ordering::SeqCst);
            stream.handle = None;
            Err(anyhow!("camera {index} did not start within {OPEN_TIMEOUT:?}"))
        }
    }
}
