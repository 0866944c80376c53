use anyhow::{Context, Result, anyhow, ensure};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::Frame;

/// Value range a model expects its RGB input in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelRange {
    /// `[0, 1]`
    Unit,
    /// `[-1, 1]`
    Signed,
}

impl PixelRange {
    fn normalize(self, value: u8) -> f32 {
        let unit = value as f32 / 255.0;
        match self {
            PixelRange::Unit => unit,
            PixelRange::Signed => unit * 2.0 - 1.0,
        }
    }
}

/// How a frame was fitted into a square model input.
#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub input_size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    /// Maps a point normalized to the model input back to frame pixels.
    pub fn to_frame(&self, nx: f32, ny: f32) -> (f32, f32) {
        let size = self.input_size as f32;
        (
            (nx * size - self.pad_x) / self.scale,
            (ny * size - self.pad_y) / self.scale,
        )
    }
}

/// Square region of a frame, rotated by `angle` (radians, image coordinates)
/// around `center`, sampled into an `output_size` model input.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
}

impl CropTransform {
    /// Crop pixel to frame pixel. Points outside the frame are not clamped.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Ratio between frame pixels and crop pixels.
    pub fn pixel_scale(&self) -> f32 {
        self.side / self.output_size as f32
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    ensure!(
        frame.rgba.len() == expected && expected > 0,
        "frame buffer size mismatch: got {}, expected {expected}",
        frame.rgba.len()
    );
    Ok(())
}

/// Resizes the whole frame into a `target_size` square keeping the aspect
/// ratio, padding the remainder with black.
pub fn prepare_letterboxed(
    frame: &Frame,
    target_size: u32,
    range: PixelRange,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src = fir::images::ImageRef::new(frame.width, frame.height, &frame.rgba, fir::PixelType::U8x4)
        .context("invalid source frame")?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let size = target_size as usize;
    let pad_x = (size - new_w as usize) / 2;
    let pad_y = (size - new_h as usize) / 2;
    let black = range.normalize(0);
    let mut data = vec![black; size * size * 3];

    let src_stride = new_w as usize * 4;
    data.par_chunks_mut(size * 3)
        .skip(pad_y)
        .take(new_h as usize)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let src_row = &resized[row * src_stride..(row + 1) * src_stride];
            for (dst_px, src_px) in dst_row[pad_x * 3..]
                .chunks_exact_mut(3)
                .zip(src_row.chunks_exact(4))
            {
                dst_px[0] = range.normalize(src_px[0]);
                dst_px[1] = range.normalize(src_px[1]);
                dst_px[2] = range.normalize(src_px[2]);
            }
        });

    let input = Array4::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;
    let letterbox = LetterboxInfo {
        input_size: target_size,
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };
    Ok((input, letterbox))
}

/// Samples a rotated square crop with bilinear filtering. Pixels outside the
/// frame read as black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
    range: PixelRange,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;
    ensure!(side > 0.0 && side.is_finite(), "invalid crop side {side}");

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
    };
    let size = output_size as usize;
    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let (sx, sy) = transform.project(x as f32 + 0.5, y as f32 + 0.5);
                let rgb = sample_bilinear(frame, sx - 0.5, sy - 0.5);
                for (dst, value) in px.iter_mut().zip(rgb) {
                    *dst = match range {
                        PixelRange::Unit => value,
                        PixelRange::Signed => value * 2.0 - 1.0,
                    };
                }
            }
        });

    let input = Array4::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;
    Ok((input, transform))
}

fn sample_bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let (w, h) = (frame.width as i64, frame.height as i64);
    let fetch = |ix: i64, iy: i64| -> [f32; 3] {
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);
    let c00 = fetch(ix, iy);
    let c10 = fetch(ix + 1, iy);
    let c01 = fetch(ix, iy + 1);
    let c11 = fetch(ix + 1, iy + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}
