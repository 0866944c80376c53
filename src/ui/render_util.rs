use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::types::Frame;

/// Wraps a composited frame for GPUI, which wants BGRA rather than RGBA.
pub(super) fn frame_to_image(frame: Frame) -> Option<Arc<RenderImage>> {
    let Frame {
        mut rgba,
        width,
        height,
        ..
    } = frame;
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

/// Fixed-width meter for a level in [0, 1].
pub(super) fn level_meter(level: f32) -> String {
    const METER_LEN: usize = 12;
    let filled = ((level.clamp(0.0, 1.0) * METER_LEN as f32).round() as usize).min(METER_LEN);
    format!("{}{}", "█".repeat(filled), "░".repeat(METER_LEN - filled))
}
