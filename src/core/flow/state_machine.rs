use super::config::PolicyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    NoPriorFrame,
    Steady,
    Burst,
}

/// 触发（或抑制）截图的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureReason {
    FirstFrame,
    HardCut,
    BurstStart,
    BurstSettled,
    Unchanged,
    GapSuppressed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureDecision {
    pub should_capture: bool,
    pub starts_new_flow: bool,
    pub reason: CaptureReason,
    pub score: Option<f32>,
}

impl CaptureDecision {
    fn capture(reason: CaptureReason, starts_new_flow: bool, score: Option<f32>) -> Self {
        Self {
            should_capture: true,
            starts_new_flow,
            reason,
            score,
        }
    }

    fn skip(reason: CaptureReason, score: Option<f32>) -> Self {
        Self {
            should_capture: false,
            starts_new_flow: false,
            reason,
            score,
        }
    }
}

impl PolicyState {
    pub fn new() -> Self {
        PolicyState::NoPriorFrame
    }

    /// Pure hysteresis step over one diff score. `None` means there is no
    /// baseline to compare against, which is always a capture.
    ///
    /// The burst update runs on every scored sample whether or not anything
    /// is captured, so a hard cut also opens a burst window.
    pub fn transition(
        &self,
        score: Option<f32>,
        config: &PolicyConfig,
    ) -> (PolicyState, CaptureDecision) {
        let d = match (self, score) {
            (PolicyState::NoPriorFrame, _) | (_, None) => {
                return (
                    PolicyState::Steady,
                    CaptureDecision::capture(CaptureReason::FirstFrame, false, score),
                );
            }
            (_, Some(d)) => d,
        };

        let in_burst = *self == PolicyState::Burst;
        let decision = if d > config.hard_threshold {
            CaptureDecision::capture(CaptureReason::HardCut, true, score)
        } else if d > config.soft_threshold && !in_burst {
            CaptureDecision::capture(CaptureReason::BurstStart, false, score)
        } else if d < config.low_threshold && in_burst {
            CaptureDecision::capture(CaptureReason::BurstSettled, false, score)
        } else {
            CaptureDecision::skip(CaptureReason::Unchanged, score)
        };

        let next = if d > config.soft_threshold {
            PolicyState::Burst
        } else if d < config.low_threshold {
            PolicyState::Steady
        } else {
            *self
        };

        (next, decision)
    }
}

impl Default for PolicyState {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture policy: the hysteresis state plus the dwell-gap gate.
pub struct CapturePolicy {
    state: PolicyState,
    config: PolicyConfig,
    last_capture_ts: f64,
    evaluated: u64,
}

impl CapturePolicy {
    pub fn new() -> Self {
        Self::with_config(PolicyConfig::default())
    }

    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            state: PolicyState::new(),
            config,
            last_capture_ts: f64::NEG_INFINITY,
            evaluated: 0,
        }
    }

    /// Evaluate one sampled timestamp and commit it straight away when it
    /// says capture.
    pub fn evaluate(&mut self, timestamp: f64, score: Option<f32>) -> CaptureDecision {
        let decision = self.propose(timestamp, score);
        if decision.should_capture {
            self.confirm(timestamp);
        }
        decision
    }

    /// Run the hysteresis step and the dwell-gap gate. The burst state moves
    /// here; the capture timestamp does not move until `confirm`.
    pub fn propose(&mut self, timestamp: f64, score: Option<f32>) -> CaptureDecision {
        self.evaluated += 1;

        let (next, decision) = self.state.transition(score, &self.config);
        self.state = next;

        if decision.should_capture && timestamp - self.last_capture_ts <= self.config.min_capture_gap
        {
            return CaptureDecision::skip(CaptureReason::GapSuppressed, score);
        }
        decision
    }

    /// Record that a proposed capture was actually emitted.
    pub fn confirm(&mut self, timestamp: f64) {
        self.last_capture_ts = timestamp;
    }

    pub fn current_state(&self) -> PolicyState {
        self.state
    }

    pub fn last_capture_timestamp(&self) -> Option<f64> {
        self.last_capture_ts.is_finite().then_some(self.last_capture_ts)
    }

    pub fn evaluated_count(&self) -> u64 {
        self.evaluated
    }

    pub fn reset(&mut self) {
        self.state = PolicyState::new();
        self.last_capture_ts = f64::NEG_INFINITY;
        self.evaluated = 0;
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::new()
    }
}
