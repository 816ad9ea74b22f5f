use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::FlowError;

/// 状态机所需的阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConfig {
    pub hard_threshold: f32,
    pub soft_threshold: f32,
    pub low_threshold: f32,
    pub min_capture_gap: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        FlowConfig::default().policy()
    }
}

/// Tunables for one detection run. Every field has a default, so a partial
/// JSON document is enough to override a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Seconds between sampled timestamps.
    pub time_step: f64,
    /// Factor applied to both dimensions of the detection frame.
    pub detection_scale: f64,
    pub diff_stride: usize,
    pub hard_threshold: f32,
    pub soft_threshold: f32,
    pub low_threshold: f32,
    /// Minimum seconds between two emitted captures.
    pub min_capture_gap: f64,
    pub frame_wait_timeout_ms: u64,
    /// Lossy quality in (0, 1].
    pub export_quality: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            time_step: 0.4,
            detection_scale: 0.25,
            diff_stride: 20,
            hard_threshold: 6.0,
            soft_threshold: 3.0,
            low_threshold: 2.0,
            min_capture_gap: 0.3,
            frame_wait_timeout_ms: 250,
            export_quality: 0.92,
        }
    }
}

impl FlowConfig {
    /// 动画较多的界面：采样更密，阈值更宽松
    pub fn for_animated_ui() -> Self {
        Self {
            time_step: 0.25,
            hard_threshold: 8.0,
            soft_threshold: 4.0,
            low_threshold: 2.5,
            min_capture_gap: 0.5,
            ..Default::default()
        }
    }

    /// 静态界面：采样更稀，对细小变化更敏感
    pub fn for_static_ui() -> Self {
        Self {
            time_step: 0.8,
            hard_threshold: 5.0,
            soft_threshold: 2.0,
            low_threshold: 1.0,
            min_capture_gap: 0.6,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        let config: FlowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(FlowError::InvalidInput(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if !(self.detection_scale > 0.0 && self.detection_scale <= 1.0) {
            return Err(FlowError::InvalidInput(format!(
                "detection_scale must be in (0, 1], got {}",
                self.detection_scale
            )));
        }
        if self.diff_stride == 0 {
            return Err(FlowError::InvalidInput("diff_stride must be non-zero".into()));
        }
        if !(self.low_threshold <= self.soft_threshold && self.soft_threshold <= self.hard_threshold)
        {
            return Err(FlowError::InvalidInput(format!(
                "thresholds must satisfy low <= soft <= hard, got {} / {} / {}",
                self.low_threshold, self.soft_threshold, self.hard_threshold
            )));
        }
        if !(self.min_capture_gap >= 0.0) {
            return Err(FlowError::InvalidInput(format!(
                "min_capture_gap must not be negative, got {}",
                self.min_capture_gap
            )));
        }
        if !(self.export_quality > 0.0 && self.export_quality <= 1.0) {
            return Err(FlowError::InvalidInput(format!(
                "export_quality must be in (0, 1], got {}",
                self.export_quality
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            hard_threshold: self.hard_threshold,
            soft_threshold: self.soft_threshold,
            low_threshold: self.low_threshold,
            min_capture_gap: self.min_capture_gap,
        }
    }

    pub fn frame_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_wait_timeout_ms)
    }

    /// Detection frame size for a video of the given native size. Never
    /// collapses a dimension to zero.
    pub fn detection_size(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| ((v as f64 * self.detection_scale).floor() as u32).max(1);
        (scale(width), scale(height))
    }
}
