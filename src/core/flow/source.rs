//! Collaborator contracts: where frames come from and how captures are encoded.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::error::FlowError;
use super::frame::Frame;

/// A seekable video. Calls may arrive at any timestamp in `[0, duration)`,
/// in any order. The driver bounds every call with its own timeout, so an
/// implementation may simply wait until the frame is ready.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Seconds.
    fn duration(&self) -> f64;

    /// Native width and height.
    fn dimensions(&self) -> (u32, u32);

    async fn frame_at(&mut self, timestamp: f64, width: u32, height: u32)
        -> Result<Frame, FlowError>;
}

/// Turns a raw frame into a compressed still.
pub trait FrameEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, FlowError>;

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

/// 有损 JPEG 导出（丢弃 alpha 通道）
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// `quality` in (0, 1], as in the export config.
    pub fn new(quality: f32) -> Self {
        Self {
            quality: (quality * 100.0).round().clamp(1.0, 100.0) as u8,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(0.92)
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, FlowError> {
        if !frame.is_well_formed() {
            return Err(FlowError::InvalidInput(format!(
                "cannot encode malformed {}x{} frame",
                frame.width, frame.height
            )));
        }

        let rgb = frame.to_rgb();
        let mut buffer = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, self.quality);
        encoder.encode(&rgb, frame.width, frame.height, image::ColorType::Rgb8)?;
        Ok(buffer)
    }
}

/// Frames already decoded into memory, each shown from its timestamp until
/// the next one.
pub struct ImageSequenceSource {
    frames: Vec<(f64, RgbaImage)>,
    duration: f64,
}

impl ImageSequenceSource {
    pub fn new(mut frames: Vec<(f64, RgbaImage)>, duration: f64) -> Self {
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { frames, duration }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn image_at(&self, timestamp: f64) -> Option<&RgbaImage> {
        let idx = self.frames.partition_point(|(ts, _)| *ts <= timestamp);
        self.frames
            .get(idx.saturating_sub(1))
            .map(|(_, image)| image)
    }
}

impl FrameSource for ImageSequenceSource {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|(_, image)| image.dimensions())
            .unwrap_or((0, 0))
    }

    async fn frame_at(
        &mut self,
        timestamp: f64,
        width: u32,
        height: u32,
    ) -> Result<Frame, FlowError> {
        let image = self
            .image_at(timestamp)
            .ok_or_else(|| FlowError::FrameSource("image sequence is empty".into()))?;

        let data = if image.dimensions() == (width, height) {
            image.as_raw().clone()
        } else {
            imageops::resize(image, width, height, FilterType::Triangle).into_raw()
        };

        Ok(Frame::new(width, height, data, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, level: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([level, level, level, 255]))
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(JpegEncoder::new(0.92).quality(), 92);
        assert_eq!(JpegEncoder::new(0.0).quality(), 1);
        assert_eq!(JpegEncoder::new(2.0).quality(), 100);
    }

    #[test]
    fn test_jpeg_encode_produces_jpeg() {
        let frame = Frame::filled(16, 8, [200, 40, 40, 255], 0.0);
        let bytes = JpegEncoder::default().encode(&frame).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
    }

    #[test]
    fn test_jpeg_rejects_malformed() {
        let frame = Frame::new(16, 16, vec![0; 3], 0.0);
        assert!(JpegEncoder::default().encode(&frame).is_err());
    }

    #[tokio::test]
    async fn test_sequence_picks_latest_frame() {
        let mut source = ImageSequenceSource::new(
            vec![(2.0, solid(8, 8, 200)), (0.0, solid(8, 8, 10))],
            4.0,
        );
        assert_eq!(source.dimensions(), (8, 8));
        assert_eq!(source.duration(), 4.0);

        let early = source.frame_at(1.9, 8, 8).await.unwrap();
        assert_eq!(early.data[0], 10);
        assert_eq!(early.timestamp, 1.9);

        let late = source.frame_at(2.0, 8, 8).await.unwrap();
        assert_eq!(late.data[0], 200);
    }

    #[tokio::test]
    async fn test_sequence_scales_on_request() {
        let mut source = ImageSequenceSource::new(vec![(0.0, solid(40, 20, 50))], 1.0);
        let frame = source.frame_at(0.0, 10, 5).await.unwrap();

        assert_eq!((frame.width, frame.height), (10, 5));
        assert!(frame.is_well_formed());
    }

    #[tokio::test]
    async fn test_empty_sequence_errors() {
        let mut source = ImageSequenceSource::new(Vec::new(), 1.0);
        assert_eq!(source.dimensions(), (0, 0));
        assert!(source.frame_at(0.0, 1, 1).await.is_err());
    }
}
