use super::config::FlowConfig;
use super::diff_filter::FrameDiffFilter;
use super::error::FlowError;
use super::frame::Frame;
use super::state_machine::{CaptureDecision, CapturePolicy, PolicyState};

/// 变化检测：灰度 -> 帧差 -> 状态机
///
/// The baseline luma and the capture timestamp only move on `confirm`, so a
/// proposal that is never exported leaves the comparison where it was.
pub struct ChangeDetector {
    diff_filter: FrameDiffFilter,
    policy: CapturePolicy,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::with_config(&FlowConfig::default())
    }

    pub fn with_config(config: &FlowConfig) -> Self {
        Self {
            diff_filter: FrameDiffFilter::with_stride(config.diff_stride),
            policy: CapturePolicy::with_config(config.policy()),
        }
    }

    pub fn propose(&mut self, timestamp: f64, frame: &Frame) -> Result<CaptureDecision, FlowError> {
        let score = self.diff_filter.score(frame)?;
        Ok(self.policy.propose(timestamp, score))
    }

    pub fn confirm(&mut self, timestamp: f64) {
        self.diff_filter.accept();
        self.policy.confirm(timestamp);
    }

    /// `propose` + `confirm` in one step.
    pub fn process_frame(
        &mut self,
        timestamp: f64,
        frame: &Frame,
    ) -> Result<CaptureDecision, FlowError> {
        let decision = self.propose(timestamp, frame)?;
        if decision.should_capture {
            self.confirm(timestamp);
        }
        Ok(decision)
    }

    pub fn current_state(&self) -> PolicyState {
        self.policy.current_state()
    }

    pub fn frame_count(&self) -> u64 {
        self.policy.evaluated_count()
    }

    pub fn reset(&mut self) {
        self.diff_filter.reset();
        self.policy.reset();
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}
