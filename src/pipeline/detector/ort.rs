use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};

use super::{
    DetectorOptions, FaceLandmarker,
    common::{PixelRange, prepare_rotated_crop, sigmoid},
    face_detection::{FaceDetector, FaceDetectorConfig},
    roi::{FaceRoi, merge_detections},
};
use crate::types::{DetectionResults, FaceLandmarks, Frame, Landmark};

pub const LANDMARK_INPUT_SIZE: u32 = 192;
pub const MESH_LANDMARKS: usize = 468;
pub const REFINED_LANDMARKS: usize = 478;
/// New detections overlapping a tracked face by more than this are dropped.
const TRACKED_OVERLAP: f32 = 0.5;

/// Landmarks of one crop, in frame pixels, plus the model's presence score.
struct CropLandmarks {
    points: Vec<[f32; 3]>,
    presence: f32,
}

/// Two-stage face mesh: a face detector seeds crops, a landmark model refines
/// them, and the landmarks of each frame seed the next frame's crops.
pub struct OrtFaceMesh {
    detector: FaceDetector,
    landmarker: Session,
    options: DetectorOptions,
    tracked: Vec<FaceRoi>,
}

impl OrtFaceMesh {
    pub fn new(detector_path: &Path, landmark_path: &Path, options: DetectorOptions) -> Result<Self> {
        let detector = FaceDetector::new(
            detector_path,
            FaceDetectorConfig {
                score_threshold: options.min_detection_confidence,
                ..FaceDetectorConfig::default()
            },
        )?;

        let landmarker = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(landmark_path)
            .with_context(|| format!("failed to load face landmarker from {}", landmark_path.display()))?;

        Ok(Self {
            detector,
            landmarker,
            options,
            tracked: Vec::new(),
        })
    }

    fn run_landmarker(&mut self, frame: &Frame, roi: &FaceRoi) -> Result<CropLandmarks> {
        let (input, transform) = prepare_rotated_crop(
            frame,
            roi.center,
            roi.side,
            roi.angle,
            LANDMARK_INPUT_SIZE,
            PixelRange::Unit,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .landmarker
            .run(ort::inputs![tensor])
            .context("failed to run face landmarker session")?;

        let mut coords: Vec<f32> = Vec::new();
        let mut presence_logit = None;
        for i in 0..outputs.len() {
            let values = outputs[i].try_extract_array::<f32>()?;
            match values.len() {
                1 => presence_logit = values.iter().next().copied(),
                n if n >= MESH_LANDMARKS * 3 && n > coords.len() => {
                    coords = values.iter().copied().collect();
                }
                _ => {}
            }
        }

        let count = landmark_count(coords.len(), self.options.refine_landmarks)
            .ok_or_else(|| anyhow!("face landmarker returned {} coordinates", coords.len()))?;
        let depth_scale = transform.pixel_scale();
        let points = coords
            .chunks_exact(3)
            .take(count)
            .map(|c| {
                let (x, y) = transform.project(c[0], c[1]);
                [x, y, c[2] * depth_scale]
            })
            .collect();

        Ok(CropLandmarks {
            points,
            presence: presence_logit.map(sigmoid).unwrap_or(1.0),
        })
    }
}

fn landmark_count(coords: usize, refine: bool) -> Option<usize> {
    if refine && coords >= REFINED_LANDMARKS * 3 {
        Some(REFINED_LANDMARKS)
    } else if coords >= MESH_LANDMARKS * 3 {
        Some(MESH_LANDMARKS)
    } else {
        None
    }
}

/// Frame pixels to normalized image coordinates; depth shares the x scale.
fn normalize(points: &[[f32; 3]], width: u32, height: u32) -> FaceLandmarks {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    points
        .iter()
        .map(|&[x, y, z]| Landmark::new(x / w, y / h, z / w))
        .collect()
}

impl FaceLandmarker for OrtFaceMesh {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResults> {
        let max_faces = self.options.max_faces;
        let mut rois = std::mem::take(&mut self.tracked);

        if rois.len() < max_faces {
            let detections = self.detector.detect(frame)?;
            rois = merge_detections(rois, &detections, max_faces, TRACKED_OVERLAP);
        }

        let mut results = DetectionResults::empty();
        for roi in &rois {
            let crop = self.run_landmarker(frame, roi)?;
            if crop.presence < self.options.min_tracking_confidence {
                continue;
            }

            let projected: Vec<(f32, f32)> = crop.points.iter().map(|p| (p[0], p[1])).collect();
            if let Some(next) = FaceRoi::from_landmarks(&projected) {
                self.tracked.push(next);
            }
            results
                .multi_face_landmarks
                .push(normalize(&crop.points, frame.width, frame.height));
        }

        Ok(results)
    }

    fn reset(&mut self) {
        self.tracked.clear();
    }
}
