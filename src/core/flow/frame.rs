use super::error::FlowError;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    /// Source position in seconds.
    pub timestamp: f64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: f64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
        }
    }

    /// Single-colour frame, mostly useful for synthetic sources.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4], timestamp: f64) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, data, timestamp)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_well_formed(&self) -> bool {
        self.pixel_count() > 0 && self.data.len() == self.pixel_count() * 4
    }

    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for chunk in self.data.chunks_exact(4) {
            rgb.push(chunk[0]); // R
            rgb.push(chunk[1]); // G
            rgb.push(chunk[2]); // B
        }
        rgb
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Result<Frame, FlowError> {
        if self.width == target_width && self.height == target_height {
            return Ok(self.clone());
        }

        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                FlowError::InvalidInput(format!(
                    "frame buffer of {} bytes does not match {}x{}",
                    self.data.len(),
                    self.width,
                    self.height
                ))
            })?;
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        Ok(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            timestamp: self.timestamp,
        })
    }
}

/// Single-channel intensity samples reduced from one RGBA frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LumaBuffer {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u8>,
}

impl LumaBuffer {
    pub fn from_frame(frame: &Frame) -> Self {
        let mut luma = LumaBuffer::default();
        luma.reduce_from(frame);
        luma
    }

    /// Rebuild this buffer from `frame`, reusing the existing allocation.
    pub fn reduce_from(&mut self, frame: &Frame) {
        self.width = frame.width;
        self.height = frame.height;
        self.samples.clear();
        self.samples.reserve(frame.pixel_count());
        self.samples
            .extend(frame.data.chunks_exact(4).map(|rgba| luma(rgba[0], rgba[1], rgba[2])));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// BT.601 权重
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}
