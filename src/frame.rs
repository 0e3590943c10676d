use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Media type tag attached to every buffer delivered by a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    /// Screen video sample
    Video,
    /// Application audio sample
    AppAudio,
    /// Microphone audio sample
    MicAudio,
}

impl MediaType {
    pub fn is_video(&self) -> bool {
        matches!(self, MediaType::Video)
    }
}

/// Pixel layout of a raw video buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit RGBA
    Rgba32,
    /// Packed 8-bit BGRA, the usual screen capture layout
    Bgra32,
    /// YUV 4:2:2, two bytes per pixel
    Yuyv,
    /// Already compressed JPEG
    Mjpeg,
}

impl PixelFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4,
            PixelFormat::Yuyv => 2,
            PixelFormat::Mjpeg => 0, // Variable size, compressed
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Mjpeg)
    }
}

/// One buffer as delivered by the capture source
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Source-assigned sequence number
    pub sequence: u64,
    /// Monotonic capture time relative to the source's start
    pub captured_at: Duration,
    /// Raw buffer contents (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub media: MediaType,
}

impl RawFrame {
    /// Create a video frame
    pub fn video(
        sequence: u64,
        captured_at: Duration,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            sequence,
            captured_at,
            data: Arc::new(data),
            width,
            height,
            format,
            media: MediaType::Video,
        }
    }

    /// Create a non-video buffer carrying the given media tag
    pub fn audio(sequence: u64, captured_at: Duration, data: Vec<u8>, media: MediaType) -> Self {
        Self {
            sequence,
            captured_at,
            data: Arc::new(data),
            width: 0,
            height: 0,
            format: PixelFormat::Mjpeg,
            media,
        }
    }

    /// Get the expected buffer size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate buffer size against dimensions and format
    pub fn validate_size(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => !self.data.is_empty(),
        }
    }
}

/// Encoded frame ready for the wire; sent at most once
#[derive(Debug, Clone, PartialEq)]
pub struct FramePayload {
    pub sequence: u64,
    pub captured_at: Duration,
    pub data: Bytes,
}

impl FramePayload {
    pub fn new(sequence: u64, captured_at: Duration, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            captured_at,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_properties() {
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Bgra32.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Yuyv.bytes_per_pixel(), 2);

        assert!(PixelFormat::Mjpeg.is_compressed());
        assert!(!PixelFormat::Bgra32.is_compressed());
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = RawFrame::video(1, Duration::ZERO, vec![0u8; 4 * 2 * 4], 4, 2, PixelFormat::Bgra32);
        assert!(valid.validate_size());

        let truncated = RawFrame::video(2, Duration::ZERO, vec![0u8; 10], 4, 2, PixelFormat::Bgra32);
        assert!(!truncated.validate_size());

        let zero_sized = RawFrame::video(3, Duration::ZERO, Vec::new(), 0, 0, PixelFormat::Rgb24);
        assert!(!zero_sized.validate_size());

        let jpeg = RawFrame::video(4, Duration::ZERO, vec![0xFF, 0xD8, 0xFF, 0xD9], 4, 2, PixelFormat::Mjpeg);
        assert!(jpeg.validate_size());
    }

    #[test]
    fn test_audio_frames_are_not_video() {
        let frame = RawFrame::audio(1, Duration::ZERO, vec![0u8; 64], MediaType::AppAudio);
        assert!(!frame.media.is_video());
        assert!(MediaType::Video.is_video());
    }
}
