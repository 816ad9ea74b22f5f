use super::error::FlowError;
use super::frame::{Frame, LumaBuffer};

/// Mean absolute difference over every `stride`-th sample.
///
/// Both buffers must come from frames of the same size; the driver keeps
/// that true by reducing at one fixed detection size per run.
pub fn diff_score(a: &LumaBuffer, b: &LumaBuffer, stride: usize) -> Result<f32, FlowError> {
    if a.len() != b.len() {
        return Err(FlowError::InvalidInput(format!(
            "luma buffers differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let stride = stride.max(1);
    let n = a.len();
    if n == 0 {
        return Ok(0.0);
    }

    let total: u32 = a
        .samples
        .iter()
        .zip(b.samples.iter())
        .step_by(stride)
        .map(|(&x, &y)| x.abs_diff(y) as u32)
        .sum();

    Ok(total as f32 / (n as f32 / stride as f32))
}

/// 帧差过滤器：保存最近一次被采纳的帧作为比较基准
pub struct FrameDiffFilter {
    stride: usize,
    baseline: Option<LumaBuffer>,
    // 复用的灰度缓冲区
    scratch: LumaBuffer,
}

impl FrameDiffFilter {
    pub fn new() -> Self {
        Self::with_stride(20)
    }

    pub fn with_stride(stride: usize) -> Self {
        Self {
            stride,
            baseline: None,
            scratch: LumaBuffer::default(),
        }
    }

    /// Reduce `frame` into the scratch buffer and score it against the
    /// baseline. `None` means there is nothing to compare against yet.
    pub fn score(&mut self, frame: &Frame) -> Result<Option<f32>, FlowError> {
        self.scratch.reduce_from(frame);

        match &self.baseline {
            None => Ok(None),
            Some(baseline) => {
                if baseline.width != self.scratch.width || baseline.height != self.scratch.height {
                    return Err(FlowError::FrameSource(format!(
                        "frame is {}x{}, baseline is {}x{}",
                        self.scratch.width, self.scratch.height, baseline.width, baseline.height
                    )));
                }
                diff_score(baseline, &self.scratch, self.stride).map(Some)
            }
        }
    }

    /// Promote the most recently scored frame to baseline.
    pub fn accept(&mut self) {
        match &mut self.baseline {
            Some(baseline) => std::mem::swap(baseline, &mut self.scratch),
            None => self.baseline = Some(self.scratch.clone()),
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn reset(&mut self) {
        self.baseline = None;
        self.scratch.samples.clear();
    }
}

impl Default for FrameDiffFilter {
    fn default() -> Self {
        Self::new()
    }
}
