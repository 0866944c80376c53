use std::time::Instant;

use anyhow::{Context, Result, anyhow, ensure};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Consecutive decode failures between two warnings.
const FAILURE_LOG_INTERVAL: u32 = 30;

/// Turns raw capture buffers into RGBA frames. Lives on the capture thread
/// for the whole stream.
pub struct FrameDecoder {
    jpeg_options: DecoderOptions,
    failures: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            jpeg_options: DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA),
            failures: 0,
        }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one buffer, logging (rate-limited) and returning `None` on
    /// failure so the capture loop can simply skip it.
    pub fn decode(&mut self, buffer: &Buffer) -> Option<Frame> {
        let resolution = buffer.resolution();
        let result = self.decode_pixels(
            buffer.source_frame_format(),
            buffer.buffer(),
            resolution.width_x,
            resolution.height_y,
        );

        match result {
            Ok(pixels) => {
                self.failures = 0;
                Some(Frame {
                    rgba: pixels.rgba,
                    width: pixels.width,
                    height: pixels.height,
                    timestamp: Instant::now(),
                })
            }
            Err(err) => {
                if self.failures % FAILURE_LOG_INTERVAL == 0 {
                    log::warn!("failed to decode camera frame: {err:?}");
                }
                self.failures = self.failures.wrapping_add(1);
                None
            }
        }
    }

    /// Converts raw capture bytes to RGBA. The returned size is the size of
    /// the decoded image, which for MJPEG may differ from the one the device
    /// reports.
    pub fn decode_pixels(
        &self,
        format: FrameFormat,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DecodedPixels> {
        let rgba = match format {
            FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
            FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
            FrameFormat::MJPEG => return self.mjpeg_to_rgba(data),
            FrameFormat::RAWRGB => expand_pixels(data, width, height, PackedLayout::Rgb)?,
            FrameFormat::RAWBGR => expand_pixels(data, width, height, PackedLayout::Bgr)?,
            FrameFormat::GRAY => expand_pixels(data, width, height, PackedLayout::Gray)?,
        };
        Ok(DecodedPixels {
            rgba,
            width,
            height,
        })
    }

    fn mjpeg_to_rgba(&self, data: &[u8]) -> Result<DecodedPixels> {
        let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), self.jpeg_options);
        let mut rgba = decoder
            .decode()
            .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
        let info = decoder
            .info()
            .context("MJPEG decoder reported no image info")?;

        let (width, height) = (u32::from(info.width), u32::from(info.height));
        let expected = pixel_count(width, height)? * 4;
        ensure!(
            rgba.len() >= expected,
            "MJPEG decode produced {} bytes, expected {expected}",
            rgba.len()
        );
        rgba.truncate(expected);
        Ok(DecodedPixels {
            rgba,
            width,
            height,
        })
    }
}

#[derive(Debug)]
pub struct DecodedPixels {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn pixel_count(width: u32, height: u32) -> Result<usize> {
    usize::try_from(width)
        .ok()
        .zip(usize::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h))
        .context("frame dimensions do not fit usize")
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_len = pixel_count(width, height)?;
    let uv_len = y_len / 2;
    ensure!(
        data.len() >= y_len + uv_len,
        "NV12 buffer too small: got {}, expected {}",
        data.len(),
        y_len + uv_len
    );

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgba = vec![0u8; y_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = pixel_count(width, height)?;
    ensure!(
        data.len() >= pixels * 2,
        "YUYV buffer too small: got {}, expected {}",
        data.len(),
        pixels * 2
    );

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PackedLayout {
    Rgb,
    Bgr,
    Gray,
}

impl PackedLayout {
    fn bytes_per_pixel(self) -> usize {
        match self {
            PackedLayout::Rgb | PackedLayout::Bgr => 3,
            PackedLayout::Gray => 1,
        }
    }
}

fn expand_pixels(data: &[u8], width: u32, height: u32, layout: PackedLayout) -> Result<Vec<u8>> {
    let pixels = pixel_count(width, height)?;
    let stride = layout.bytes_per_pixel();
    ensure!(
        data.len() >= pixels * stride,
        "{layout:?} buffer too small: got {}, expected {}",
        data.len(),
        pixels * stride
    );

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(stride))
        .for_each(|(dst, src)| {
            let [r, g, b] = match layout {
                PackedLayout::Rgb => [src[0], src[1], src[2]],
                PackedLayout::Bgr => [src[2], src[1], src[0]],
                PackedLayout::Gray => [src[0]; 3],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
    use nokhwa::utils::Resolution;

    use super::*;

    #[test]
    fn bgr_is_swapped_into_rgba() {
        let decoder = FrameDecoder::new();
        let bgr = [10, 20, 30, 40, 50, 60];
        let rgba = decoder
            .decode_pixels(FrameFormat::RAWBGR, &bgr, 2, 1)
            .expect("valid buffer");
        assert_eq!(rgba.rgba, vec![30, 20, 10, 255, 60, 50, 40, 255]);
        assert_eq!((rgba.width, rgba.height), (2, 1));
    }

    #[test]
    fn gray_fills_every_channel() {
        let decoder = FrameDecoder::new();
        let rgba = decoder
            .decode_pixels(FrameFormat::GRAY, &[7, 200], 1, 2)
            .expect("valid buffer");
        assert_eq!(rgba.rgba, vec![7, 7, 7, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let decoder = FrameDecoder::new();
        assert!(decoder.decode_pixels(FrameFormat::RAWRGB, &[0; 5], 2, 1).is_err());
        assert!(decoder.decode_pixels(FrameFormat::YUYV, &[0; 7], 2, 2).is_err());
        assert!(decoder.decode_pixels(FrameFormat::NV12, &[0; 5], 2, 2).is_err());
    }

    #[test]
    fn garbage_jpeg_is_an_error() {
        let decoder = FrameDecoder::new();
        assert!(decoder.decode_pixels(FrameFormat::MJPEG, &[0, 1, 2, 3], 2, 2).is_err());
    }

    fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
        let rgb = vec![128u8; (width * height * 3) as usize];
        let mut jpeg = Vec::new();
        JpegEncoder::new(&mut jpeg)
            .encode(&rgb, width, height, ExtendedColorType::Rgb8)
            .expect("encode jpeg");
        jpeg
    }

    #[test]
    fn mjpeg_keeps_its_own_size_when_the_device_reports_another() {
        let decoder = FrameDecoder::new();
        let jpeg = encode_jpeg(16, 8);

        let pixels = decoder
            .decode_pixels(FrameFormat::MJPEG, &jpeg, 8, 4)
            .expect("valid jpeg");
        assert_eq!((pixels.width, pixels.height), (16, 8));
        assert_eq!(pixels.rgba.len(), 16 * 8 * 4);
    }

    #[test]
    fn decoded_frame_matches_its_buffer() {
        let mut decoder = FrameDecoder::new();
        let jpeg = encode_jpeg(16, 8);
        let buffer = Buffer::new(Resolution::new(8, 4), &jpeg, FrameFormat::MJPEG);

        let frame = decoder.decode(&buffer).expect("frame decoded");
        assert_eq!((frame.width, frame.height), (16, 8));
        assert_eq!(frame.rgba.len(), frame.width as usize * frame.height as usize * 4);
    }
}
