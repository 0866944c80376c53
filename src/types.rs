use std::time::Instant;

use crate::session::FrameReport;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// A normalized face landmark: `x`/`y` in [0, 1] image space, `z` relative
/// depth on roughly the same scale as `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

pub type FaceLandmarks = Vec<Landmark>;

/// Everything the landmarker reports for one frame. Empty when no face is found.
#[derive(Clone, Debug, Default)]
pub struct DetectionResults {
    pub multi_face_landmarks: Vec<FaceLandmarks>,
}

impl DetectionResults {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn face_count(&self) -> usize {
        self.multi_face_landmarks.len()
    }
}

#[derive(Clone, Debug)]
pub struct CompositedFrame {
    pub frame: Frame,
    pub report: FrameReport,
}
