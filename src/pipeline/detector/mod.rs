mod common;
mod face_detection;
mod ort;
mod roi;

pub use ort::OrtFaceMesh;

use crate::types::{DetectionResults, Frame};

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorOptions {
    pub max_faces: usize,
    /// Keep the 10 iris points the landmark model adds after the 468 mesh
    /// points.
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    /// Presence score below which a tracked face is dropped and the detector
    /// has to find it again.
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

/// Per-frame face landmark source.
pub trait FaceLandmarker: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<DetectionResults>;

    /// Forgets any faces carried over from previous frames.
    fn reset(&mut self) {}
}

#[cfg(test)]
pub(crate) use common::testing;
