use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result, anyhow, ensure};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};

use super::common::{LetterboxInfo, PixelRange, iou, prepare_letterboxed, sigmoid};
use crate::types::Frame;

pub const DETECTOR_INPUT_SIZE: u32 = 128;
pub const NUM_KEYPOINTS: usize = 6;
const NUM_COORDS: usize = 4 + NUM_KEYPOINTS * 2;
const SCORE_CLIP: f32 = 100.0;

/// Short-range SSD layout: one stride-8 layer, three stride-16 layers that
/// share a grid, two anchors per layer and cell.
const ANCHOR_STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;

#[derive(Clone, Debug)]
pub struct FaceDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for FaceDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 16,
        }
    }
}

/// One detected face in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: [f32; 4],
    /// Right eye, left eye, nose tip, mouth, right ear, left ear (subject's
    /// sides).
    pub keypoints: [(f32, f32); NUM_KEYPOINTS],
    pub score: f32,
}

impl FaceDetection {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }
}

/// Anchor centers in normalized input coordinates, row-major per grid, in
/// the order the model emits its predictions.
pub fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut per_cell = 0;
        while layer < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let grid = input_size.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

pub struct FaceDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: FaceDetectorConfig,
}

impl FaceDetector {
    pub fn new(model_path: &Path, cfg: FaceDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load face detector from {}", model_path.display()))?;

        Ok(Self {
            session,
            anchors: generate_anchors(DETECTOR_INPUT_SIZE),
            cfg,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>> {
        let (input, letterbox) = prepare_letterboxed(frame, DETECTOR_INPUT_SIZE, PixelRange::Signed)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run face detector session")?;
        ensure!(
            outputs.len() >= 2,
            "face detector returned {} outputs, expected 2",
            outputs.len()
        );

        let first = outputs[0].try_extract_array::<f32>()?;
        let second = outputs[1].try_extract_array::<f32>()?;
        // Output order differs between exports; the regressors are the wide one.
        let (regressors, scores) = if first.shape().last() >= second.shape().last() {
            (first, second)
        } else {
            (second, first)
        };

        let regressor_width = regressors.shape().last().copied().unwrap_or(0);
        let score_width = scores.shape().last().copied().unwrap_or(0);
        let regressors: Vec<f32> = regressors.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        decode_detections(
            &regressors,
            regressor_width,
            &scores,
            score_width,
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Turns raw SSD outputs into frame-space detections after thresholding and
/// non-maximum suppression, best first.
pub fn decode_detections(
    regressors: &[f32],
    regressor_width: usize,
    scores: &[f32],
    score_width: usize,
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &FaceDetectorConfig,
) -> Result<Vec<FaceDetection>> {
    ensure!(
        regressor_width >= NUM_COORDS,
        "face detector regressor width {regressor_width} is below {NUM_COORDS}"
    );
    ensure!(score_width >= 1, "face detector returned empty scores");

    let count = anchors
        .len()
        .min(regressors.len() / regressor_width)
        .min(scores.len() / score_width);
    if count < anchors.len() {
        return Err(anyhow!(
            "face detector produced {count} predictions for {} anchors",
            anchors.len()
        ));
    }

    let input = letterbox.input_size as f32;
    let mut candidates = Vec::new();
    for (i, anchor) in anchors.iter().enumerate() {
        let score = sigmoid(scores[i * score_width].clamp(-SCORE_CLIP, SCORE_CLIP));
        if score < cfg.score_threshold {
            continue;
        }

        let raw = &regressors[i * regressor_width..i * regressor_width + NUM_COORDS];
        let point = |dx: f32, dy: f32| letterbox.to_frame(dx / input + anchor[0], dy / input + anchor[1]);

        let (cx, cy) = (raw[0] / input + anchor[0], raw[1] / input + anchor[1]);
        let (hw, hh) = (raw[2] / input / 2.0, raw[3] / input / 2.0);
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }
        let (x1, y1) = letterbox.to_frame(cx - hw, cy - hh);
        let (x2, y2) = letterbox.to_frame(cx + hw, cy + hh);

        let keypoints = std::array::from_fn(|k| point(raw[4 + k * 2], raw[4 + k * 2 + 1]));
        candidates.push(FaceDetection {
            bbox: [x1, y1, x2, y2],
            keypoints,
            score,
        });
    }

    Ok(non_max_suppression(candidates, cfg.nms_threshold, cfg.top_k))
}

fn non_max_suppression(
    mut candidates: Vec<FaceDetection>,
    threshold: f32,
    top_k: usize,
) -> Vec<FaceDetection> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<FaceDetection> = Vec::new();
    for candidate in candidates {
        if keep.iter().any(|k| iou(&k.bbox, &candidate.bbox) >= threshold) {
            continue;
        }
        keep.push(candidate);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIT_HIGH: f32 = 5.0;
    const LOGIT_LOW: f32 = -5.0;

    fn square_letterbox() -> LetterboxInfo {
        LetterboxInfo {
            input_size: DETECTOR_INPUT_SIZE,
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 128,
            orig_h: 128,
        }
    }

    struct Raw {
        anchors: Vec<[f32; 2]>,
        regressors: Vec<f32>,
        scores: Vec<f32>,
    }

    impl Raw {
        fn new() -> Self {
            let anchors = generate_anchors(DETECTOR_INPUT_SIZE);
            Self {
                regressors: vec![0.0; anchors.len() * NUM_COORDS],
                scores: vec![LOGIT_LOW; anchors.len()],
                anchors,
            }
        }

        fn set(&mut self, anchor: usize, logit: f32, dx: f32, dy: f32, size: f32) {
            let row = &mut self.regressors[anchor * NUM_COORDS..(anchor + 1) * NUM_COORDS];
            row[..4].copy_from_slice(&[dx, dy, size, size]);
            row[4..6].copy_from_slice(&[dx - 10.0, dy - 5.0]);
            row[6..8].copy_from_slice(&[dx + 10.0, dy - 5.0]);
            self.scores[anchor] = logit;
        }

        fn decode(&self) -> Vec<FaceDetection> {
            decode_detections(
                &self.regressors,
                NUM_COORDS,
                &self.scores,
                1,
                &self.anchors,
                &square_letterbox(),
                &FaceDetectorConfig::default(),
            )
            .expect("decode")
        }
    }

    #[test]
    fn anchor_layout_matches_the_short_range_model() {
        let anchors = generate_anchors(DETECTOR_INPUT_SIZE);
        assert_eq!(anchors.len(), 896);
        assert_eq!(anchors[0], [0.5 / 16.0, 0.5 / 16.0]);
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[2], [1.5 / 16.0, 0.5 / 16.0]);
        assert_eq!(anchors[512], [0.5 / 8.0, 0.5 / 8.0]);
        assert_eq!(anchors[517], anchors[512]);
        assert_eq!(anchors[518], [1.5 / 8.0, 0.5 / 8.0]);
    }

    #[test]
    fn confident_anchor_becomes_a_box() {
        let mut raw = Raw::new();
        // Anchor 0 sits at (4, 4) in input pixels.
        raw.set(0, LOGIT_HIGH, 20.0, 30.0, 40.0);
        let detections = raw.decode();

        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert!(det.score > 0.99);
        let expected = [4.0, 14.0, 44.0, 54.0];
        for (got, want) in det.bbox.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{:?}", det.bbox);
        }
        assert_eq!(det.center(), (24.0, 34.0));
        assert!((det.keypoints[0].0 - 14.0).abs() < 1e-3);
        assert!((det.keypoints[1].0 - 34.0).abs() < 1e-3);
    }

    #[test]
    fn low_scores_are_dropped() {
        let mut raw = Raw::new();
        raw.set(10, -0.5, 0.0, 0.0, 20.0);
        assert!(raw.decode().is_empty());
    }

    #[test]
    fn overlapping_boxes_are_suppressed() {
        let mut raw = Raw::new();
        raw.set(0, 3.0, 20.0, 20.0, 30.0);
        raw.set(1, 4.0, 21.0, 20.0, 30.0);
        // Far away, must survive.
        raw.set(600, 2.0, 0.0, 0.0, 20.0);
        let detections = raw.decode();

        assert_eq!(detections.len(), 2);
        assert!((detections[0].score - sigmoid(4.0)).abs() < 1e-6);
        assert!((detections[1].score - sigmoid(2.0)).abs() < 1e-6);
    }

    #[test]
    fn short_outputs_are_an_error() {
        let anchors = generate_anchors(DETECTOR_INPUT_SIZE);
        let result = decode_detections(
            &[0.0; NUM_COORDS * 10],
            NUM_COORDS,
            &[0.0; 10],
            1,
            &anchors,
            &square_letterbox(),
            &FaceDetectorConfig::default(),
        );
        assert!(result.is_err());
    }
}
