use crate::frame::{FramePayload, PixelFormat, RawFrame};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use tracing::{debug, trace};

/// Default JPEG quality, favouring bandwidth over fidelity
pub const DEFAULT_JPEG_QUALITY: u8 = 50;

/// Converts one raw frame into a wire payload.
///
/// Implementations are stateless per call. `None` means the frame is dropped; the next frame
/// supersedes it, so there is no retry and no error propagation.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &RawFrame) -> Option<FramePayload>;
}

/// JPEG encoder with a fixed quality factor
#[derive(Debug, Clone)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn encode_rgb(&self, rgb: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(rgb.len() / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        match encoder.encode(rgb, width, height, ColorType::Rgb8) {
            Ok(()) => Some(buf),
            Err(e) => {
                debug!("JPEG encoding failed for {}x{} frame: {}", width, height, e);
                None
            }
        }
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &RawFrame) -> Option<FramePayload> {
        if !frame.validate_size() {
            debug!(
                "Dropping malformed frame {} ({} bytes for {}x{} {:?})",
                frame.sequence,
                frame.data.len(),
                frame.width,
                frame.height,
                frame.format
            );
            return None;
        }

        let jpeg = match frame.format {
            PixelFormat::Mjpeg => {
                if !frame.data.starts_with(&[0xFF, 0xD8]) {
                    debug!("Dropping frame {}: missing JPEG SOI marker", frame.sequence);
                    return None;
                }
                frame.data.as_ref().clone()
            }
            PixelFormat::Rgb24 => self.encode_rgb(&frame.data, frame.width, frame.height)?,
            PixelFormat::Rgba32 => {
                let rgb = strip_alpha(&frame.data, [0, 1, 2]);
                self.encode_rgb(&rgb, frame.width, frame.height)?
            }
            PixelFormat::Bgra32 => {
                let rgb = strip_alpha(&frame.data, [2, 1, 0]);
                self.encode_rgb(&rgb, frame.width, frame.height)?
            }
            PixelFormat::Yuyv => {
                if frame.width % 2 != 0 {
                    debug!("Dropping YUYV frame {} with odd width", frame.sequence);
                    return None;
                }
                let rgb = yuyv_to_rgb24(&frame.data);
                self.encode_rgb(&rgb, frame.width, frame.height)?
            }
        };

        trace!(
            "Encoded frame {} ({} -> {} bytes)",
            frame.sequence,
            frame.data.len(),
            jpeg.len()
        );

        Some(FramePayload::new(frame.sequence, frame.captured_at, jpeg))
    }
}

/// Drop the alpha channel of a 4-byte-per-pixel buffer, picking RGB by index
fn strip_alpha(data: &[u8], order: [usize; 3]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
    for px in data.chunks_exact(4) {
        rgb.push(px[order[0]]);
        rgb.push(px[order[1]]);
        rgb.push(px[order[2]]);
    }
    rgb
}

/// Convert packed YUYV (Y0 U Y1 V) to RGB24 using BT.601 integer coefficients
fn yuyv_to_rgb24(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let u = chunk[1] as i32 - 128;
        let v = chunk[3] as i32 - 128;
        for y in [chunk[0], chunk[2]] {
            let c = (y as i32 - 16).max(0) * 298;
            rgb.push(clamp_channel((c + 409 * v + 128) >> 8));
            rgb.push(clamp_channel((c - 100 * u - 208 * v + 128) >> 8));
            rgb.push(clamp_channel((c + 516 * u + 128) >> 8));
        }
    }
    rgb
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
