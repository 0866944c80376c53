use super::{common::iou, face_detection::FaceDetection};
use crate::geometry::{LEFT_EYE_OUTER, RIGHT_EYE_OUTER};

/// Crop side relative to the tight face box.
const ROI_SCALE: f32 = 1.5;

/// Region the landmark model is run on, in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRoi {
    pub center: (f32, f32),
    pub side: f32,
    /// Rotation of the eye line, image coordinates.
    pub angle: f32,
    /// Tight axis-aligned box around the face, used to match new detections.
    pub bounds: [f32; 4],
}

impl FaceRoi {
    pub fn from_detection(detection: &FaceDetection) -> Self {
        let [x1, y1, x2, y2] = detection.bbox;
        let (right_eye, left_eye) = (detection.keypoints[0], detection.keypoints[1]);
        Self {
            center: detection.center(),
            side: (x2 - x1).max(y2 - y1) * ROI_SCALE,
            angle: (left_eye.1 - right_eye.1).atan2(left_eye.0 - right_eye.0),
            bounds: detection.bbox,
        }
    }

    /// Next-frame region from projected landmarks (frame pixels). `None` when
    /// the eye corners are missing or the points are degenerate.
    pub fn from_landmarks(points: &[(f32, f32)]) -> Option<Self> {
        let left = *points.get(LEFT_EYE_OUTER)?;
        let right = *points.get(RIGHT_EYE_OUTER)?;

        let (min_x, min_y, max_x, max_y) = points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(ax, ay, bx, by), &(x, y)| (ax.min(x), ay.min(y), bx.max(x), by.max(y)),
        );
        let side = (max_x - min_x).max(max_y - min_y) * ROI_SCALE;
        if !side.is_finite() || side <= 1.0 {
            return None;
        }

        Some(Self {
            center: ((min_x + max_x) * 0.5, (min_y + max_y) * 0.5),
            side,
            angle: (right.1 - left.1).atan2(right.0 - left.0),
            bounds: [min_x, min_y, max_x, max_y],
        })
    }

    pub fn overlaps(&self, detection: &FaceDetection, threshold: f32) -> bool {
        iou(&self.bounds, &detection.bbox) > threshold
    }
}

/// Adds detections to the tracked regions until `max_faces`, skipping the
/// ones that cover a face already being tracked.
pub fn merge_detections(
    mut tracked: Vec<FaceRoi>,
    detections: &[FaceDetection],
    max_faces: usize,
    overlap_threshold: f32,
) -> Vec<FaceRoi> {
    let tracked_count = tracked.len();
    for detection in detections {
        if tracked.len() >= max_faces {
            break;
        }
        if tracked[..tracked_count]
            .iter()
            .any(|roi| roi.overlaps(detection, overlap_threshold))
        {
            continue;
        }
        tracked.push(FaceRoi::from_detection(detection));
    }
    tracked.truncate(max_faces);
    tracked
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;

    use super::*;

    fn detection(x: f32, y: f32, size: f32) -> FaceDetection {
        let mut keypoints = [(x + size / 2.0, y + size / 2.0); 6];
        keypoints[0] = (x + size * 0.3, y + size * 0.4);
        keypoints[1] = (x + size * 0.7, y + size * 0.4);
        FaceDetection {
            bbox: [x, y, x + size, y + size],
            keypoints,
            score: 0.9,
        }
    }

    #[test]
    fn detection_roi_is_enlarged_and_level() {
        let roi = FaceRoi::from_detection(&detection(100.0, 50.0, 80.0));
        assert_eq!(roi.center, (140.0, 90.0));
        assert!((roi.side - 120.0).abs() < 1e-4);
        assert!(roi.angle.abs() < 1e-6);
    }

    #[test]
    fn tilted_eyes_rotate_the_roi() {
        let mut det = detection(0.0, 0.0, 100.0);
        det.keypoints[0] = (30.0, 30.0);
        det.keypoints[1] = (60.0, 60.0);
        let roi = FaceRoi::from_detection(&det);
        assert!((roi.angle - FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn landmark_roi_uses_eye_corners() {
        let mut points = vec![(50.0, 50.0); 468];
        points[0] = (0.0, 0.0);
        points[1] = (100.0, 60.0);
        points[LEFT_EYE_OUTER] = (30.0, 40.0);
        points[RIGHT_EYE_OUTER] = (70.0, 40.0);
        let roi = FaceRoi::from_landmarks(&points).expect("roi");

        assert_eq!(roi.center, (50.0, 30.0));
        assert!((roi.side - 150.0).abs() < 1e-4);
        assert!(roi.angle.abs() < 1e-6);
        assert_eq!(roi.bounds, [0.0, 0.0, 100.0, 60.0]);
    }

    #[test]
    fn collapsed_landmarks_give_no_roi() {
        assert!(FaceRoi::from_landmarks(&vec![(5.0, 5.0); 468]).is_none());
        assert!(FaceRoi::from_landmarks(&[(0.0, 0.0); 10]).is_none());
    }

    #[test]
    fn detections_fill_up_to_the_face_limit() {
        let detections = [
            detection(0.0, 0.0, 50.0),
            detection(200.0, 0.0, 50.0),
            detection(400.0, 0.0, 50.0),
        ];
        let merged = merge_detections(Vec::new(), &detections, 2, 0.5);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].bounds, detections[1].bbox);
    }

    #[test]
    fn tracked_faces_are_not_detected_twice() {
        let tracked = vec![FaceRoi::from_detection(&detection(0.0, 0.0, 50.0))];
        let detections = [detection(2.0, 1.0, 50.0), detection(300.0, 0.0, 50.0)];
        let merged = merge_detections(tracked, &detections, 3, 0.5);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].bounds, detections[1].bbox);
    }
}
