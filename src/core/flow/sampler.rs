//! Sampling driver: walks the video at a fixed step and turns accepted
//! timestamps into captures.
//!
//! Everything runs on the caller's task, one timestamp at a time. Each frame
//! request is bounded by `frame_wait_timeout`; on expiry the driver goes on
//! with whatever frame it already has instead of failing the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::assembler::{Capture, Flow, FlowAssembler};
use super::config::FlowConfig;
use super::detector::ChangeDetector;
use super::error::FlowError;
use super::frame::Frame;
use super::source::{FrameEncoder, FrameSource, JpegEncoder};

/// Progress after one sampled timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingProgress {
    pub completed: usize,
    pub total: usize,
    pub fraction: f32,
    pub captures: usize,
}

/// Cooperative stop flag, checked between timestamps.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunStatus {
    Completed,
    /// Ran to the end without a single capture.
    Empty,
    Cancelled,
    InvalidInput(String),
    /// No frame ever arrived.
    SourceUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub flows: Vec<Flow>,
    pub status: RunStatus,
    pub sampled_steps: usize,
    pub total_steps: usize,
    pub timeouts: usize,
}

impl ExtractionReport {
    fn rejected(reason: String) -> Self {
        Self {
            flows: Vec::new(),
            status: RunStatus::InvalidInput(reason),
            sampled_steps: 0,
            total_steps: 0,
            timeouts: 0,
        }
    }

    pub fn capture_count(&self) -> usize {
        self.flows.iter().map(Flow::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn summary(&self) -> String {
        match &self.status {
            RunStatus::Completed => format!(
                "{} screenshots in {} flows",
                self.capture_count(),
                self.flows.len()
            ),
            RunStatus::Empty => "no screenshots were captured".to_string(),
            RunStatus::Cancelled => format!(
                "cancelled after {}/{} steps with {} screenshots",
                self.sampled_steps,
                self.total_steps,
                self.capture_count()
            ),
            RunStatus::InvalidInput(reason) => format!("invalid input: {}", reason),
            RunStatus::SourceUnavailable => {
                format!("no frame became ready in {} attempts", self.total_steps)
            }
        }
    }
}

/// Number of timestamps `i * step` strictly below `duration`.
pub fn step_count(duration: f64, step: f64) -> usize {
    if !(duration.is_finite() && duration > 0.0 && step.is_finite() && step > 0.0) {
        return 0;
    }
    let mut count = (duration / step).ceil().min(usize::MAX as f64) as usize;
    // ceil 可能因浮点误差偏差一位
    if count > 0 && (count - 1) as f64 * step >= duration {
        count -= 1;
    }
    if count < usize::MAX && count as f64 * step < duration {
        count += 1;
    }
    count
}

/// Timestamps `0, step, 2*step, ...` strictly below `duration`, produced
/// lazily.
pub fn sample_timestamps(duration: f64, step: f64) -> impl Iterator<Item = f64> {
    (0..step_count(duration, step)).map(move |i| i as f64 * step)
}

pub struct SamplingDriver<E: FrameEncoder = JpegEncoder> {
    config: FlowConfig,
    encoder: E,
    cancel: CancelHandle,
}

impl SamplingDriver<JpegEncoder> {
    pub fn new(config: FlowConfig) -> Self {
        let encoder = JpegEncoder::new(config.export_quality);
        Self::with_encoder(config, encoder)
    }
}

impl Default for SamplingDriver<JpegEncoder> {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}

impl<E: FrameEncoder> SamplingDriver<E> {
    pub fn with_encoder(config: FlowConfig, encoder: E) -> Self {
        Self {
            config,
            encoder,
            cancel: CancelHandle::new(),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn run<S: FrameSource>(&self, source: &mut S) -> ExtractionReport {
        self.run_with_progress(source, |_| {}).await
    }

    /// Each run starts uncancelled; a `cancel` issued before the run begins
    /// is discarded.
    pub async fn run_with_progress<S, P>(&self, source: &mut S, mut on_progress: P) -> ExtractionReport
    where
        S: FrameSource,
        P: FnMut(SamplingProgress),
    {
        self.cancel.reset();

        if let Err(e) = self.config.validate() {
            warn!("⚠️ Rejecting run: {}", e);
            return ExtractionReport::rejected(e.to_string());
        }

        let duration = source.duration();
        if !(duration.is_finite() && duration > 0.0) {
            warn!("⚠️ Rejecting run: video duration is {}", duration);
            return ExtractionReport::rejected(format!("video duration is {}", duration));
        }

        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            warn!("⚠️ Rejecting run: video is {}x{}", width, height);
            return ExtractionReport::rejected(format!("video is {}x{}", width, height));
        }

        let (detect_w, detect_h) = self.config.detection_size(width, height);
        let total = step_count(duration, self.config.time_step);
        info!(
            "🎬 Sampling {:.2}s video: {} steps, detect at {}x{}, export at {}x{}",
            duration, total, detect_w, detect_h, width, height
        );

        let mut detector = ChangeDetector::with_config(&self.config);
        let mut assembler = FlowAssembler::new();
        let mut last_detection: Option<Frame> = None;
        let mut frames_received = 0usize;
        let mut timeouts = 0usize;
        let mut sampled = 0usize;
        let mut cancelled = false;

        for ts in sample_timestamps(duration, self.config.time_step) {
            if self.cancel.is_cancelled() {
                info!("🛑 Sampling cancelled at {:.2}s", ts);
                cancelled = true;
                break;
            }

            match self.wait_for_frame(source, ts, detect_w, detect_h).await {
                Ok(frame) => {
                    frames_received += 1;
                    last_detection = Some(frame);
                }
                Err(e) => {
                    if matches!(e, FlowError::FrameTimeout { .. }) {
                        timeouts += 1;
                    }
                    warn!("⚠️ {}; reusing last frame", e);
                }
            }

            if let Some(frame) = last_detection.as_ref() {
                self.process_timestamp(source, ts, frame, &mut detector, &mut assembler)
                    .await;
            }

            sampled += 1;
            on_progress(SamplingProgress {
                completed: sampled,
                total,
                fraction: sampled as f32 / total as f32,
                captures: assembler.capture_count(),
            });
        }

        let flows = assembler.finish();
        let status = if cancelled {
            RunStatus::Cancelled
        } else if frames_received == 0 {
            RunStatus::SourceUnavailable
        } else if flows.is_empty() {
            RunStatus::Empty
        } else {
            RunStatus::Completed
        };

        let report = ExtractionReport {
            flows,
            status,
            sampled_steps: sampled,
            total_steps: total,
            timeouts,
        };
        info!("✅ Sampling finished: {}", report.summary());
        report
    }

    async fn process_timestamp<S: FrameSource>(
        &self,
        source: &mut S,
        ts: f64,
        frame: &Frame,
        detector: &mut ChangeDetector,
        assembler: &mut FlowAssembler,
    ) {
        let decision = match detector.propose(ts, frame) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("⚠️ Skipping {:.2}s: {}", ts, e);
                return;
            }
        };
        if !decision.should_capture {
            return;
        }

        let (width, height) = source.dimensions();
        let image = match self.wait_for_frame(source, ts, width, height).await {
            Ok(full) => self.encoder.encode(&full),
            Err(e) => {
                warn!("⚠️ Export frame at {:.2}s unavailable ({}); using detection frame", ts, e);
                self.encoder.encode(frame)
            }
        };
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                warn!("⚠️ Dropping capture at {:.2}s: {}", ts, e);
                return;
            }
        };

        detector.confirm(ts);
        if decision.starts_new_flow {
            assembler.start_new_flow();
        }
        assembler.push(Capture::new(ts, image));
        debug!(
            "📸 Capture at {:.2}s ({:?}, score {:?}) -> flow {}",
            ts,
            decision.reason,
            decision.score,
            assembler.current_flow_id()
        );
    }

    async fn wait_for_frame<S: FrameSource>(
        &self,
        source: &mut S,
        ts: f64,
        width: u32,
        height: u32,
    ) -> Result<Frame, FlowError> {
        let frame = tokio::time::timeout(
            self.config.frame_wait_timeout(),
            source.frame_at(ts, width, height),
        )
        .await
        .map_err(|_| FlowError::FrameTimeout { timestamp: ts })??;

        if !frame.is_well_formed() || frame.width != width || frame.height != height {
            return Err(FlowError::FrameSource(format!(
                "expected {}x{} frame at {:.2}s, got {}x{} with {} bytes",
                width,
                height,
                ts,
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const WIDTH: u32 = 160;
    const HEIGHT: u32 = 90;

    /// Synthetic recording: a uniform grey whose level is a function of time.
    struct ScriptedSource {
        duration: f64,
        level_at: fn(f64) -> u8,
        hang_when: fn(f64, u32) -> bool,
        requests: Vec<(f64, u32, u32)>,
    }

    impl ScriptedSource {
        fn new(duration: f64, level_at: fn(f64) -> u8) -> Self {
            Self {
                duration,
                level_at,
                hang_when: |_, _| false,
                requests: Vec::new(),
            }
        }

        fn hanging(mut self, hang_when: fn(f64, u32) -> bool) -> Self {
            self.hang_when = hang_when;
            self
        }
    }

    impl FrameSource for ScriptedSource {
        fn duration(&self) -> f64 {
            self.duration
        }

        fn dimensions(&self) -> (u32, u32) {
            (WIDTH, HEIGHT)
        }

        async fn frame_at(
            &mut self,
            timestamp: f64,
            width: u32,
            height: u32,
        ) -> Result<Frame, FlowError> {
            self.requests.push((timestamp, width, height));
            if (self.hang_when)(timestamp, width) {
                std::future::pending::<()>().await;
            }
            let level = (self.level_at)(timestamp);
            Ok(Frame::filled(width, height, [level, level, level, 255], timestamp))
        }
    }

    fn fast_config() -> FlowConfig {
        FlowConfig {
            frame_wait_timeout_ms: 20,
            ..Default::default()
        }
    }

    fn timestamps_of(report: &ExtractionReport) -> Vec<Vec<f64>> {
        report
            .flows
            .iter()
            .map(|f| f.captures.iter().map(|c| c.timestamp).collect())
            .collect()
    }

    fn assert_gap_invariant(report: &ExtractionReport, gap: f64) {
        let all: Vec<f64> = timestamps_of(report).into_iter().flatten().collect();
        for pair in all.windows(2) {
            assert!(pair[1] - pair[0] > gap, "captures {:?} too close", pair);
        }
    }

    #[test]
    fn test_sample_timestamps() {
        assert_eq!(
            sample_timestamps(1.0, 0.4).collect::<Vec<_>>(),
            vec![0.0, 0.4, 0.8]
        );
        assert_eq!(sample_timestamps(10.0, 0.4).count(), 25);
        assert_eq!(step_count(10.0, 0.4), 25);
        assert_eq!(step_count(1.2, 0.4), 3);
        assert_eq!(step_count(0.0, 0.4), 0);
        assert_eq!(step_count(-3.0, 0.4), 0);
        assert_eq!(step_count(f64::NAN, 0.4), 0);
        assert_eq!(step_count(f64::INFINITY, 0.4), 0);
    }

    #[test]
    fn test_step_count_matches_timestamps() {
        for (duration, step) in [(4.0, 0.4), (0.5, 0.4), (7.3, 0.1), (3.0, 1.0), (0.01, 0.4)] {
            let timestamps: Vec<f64> = sample_timestamps(duration, step).collect();
            assert_eq!(timestamps.len(), step_count(duration, step));
            assert!(timestamps.iter().all(|&ts| ts < duration));
            assert!(timestamps.len() as f64 * step >= duration);
        }
    }

    #[test]
    fn test_long_duration_is_not_materialized() {
        let total = step_count(1.0e12, 0.4);
        assert_eq!(total, 2_500_000_000_000);

        let head: Vec<f64> = sample_timestamps(1.0e12, 0.4).take(3).collect();
        assert_eq!(head, vec![0.0, 0.4, 0.8]);
    }

    #[tokio::test]
    async fn test_constant_video_single_capture() {
        let mut source = ScriptedSource::new(10.0, |_| 128);
        let report = SamplingDriver::new(fast_config()).run(&mut source).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.total_steps, 25);
        assert_eq!(report.flows.len(), 1);
        assert_eq!(report.flows[0].id, 1);
        assert_eq!(report.capture_count(), 1);
        assert_eq!(report.flows[0].captures[0].timestamp, 0.0);
        assert_eq!(report.flows[0].captures[0].formatted_time, "0:00");
    }

    #[tokio::test]
    async fn test_hard_cut_opens_new_flow() {
        let mut source = ScriptedSource::new(4.0, |ts| if ts >= 1.99 { 108 } else { 100 });
        let report = SamplingDriver::new(fast_config()).run(&mut source).await;

        let flows = timestamps_of(&report);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0], vec![0.0]);
        assert!((flows[1][0] - 2.0).abs() < 1e-9);
        // 突发结束后的稳定帧
        assert_eq!(flows[1].len(), 2);
        assert!((flows[1][1] - 2.4).abs() < 1e-9);
        assert_eq!(report.flows[1].id, 2);
    }

    #[tokio::test]
    async fn test_sawtooth_does_not_capture_every_tick() {
        let mut source = ScriptedSource::new(4.0, |ts| {
            if ((ts / 0.4).round() as u64) % 2 == 0 {
                100
            } else {
                104
            }
        });
        let config = fast_config();
        let report = SamplingDriver::new(config.clone()).run(&mut source).await;

        assert_eq!(report.total_steps, 10);
        assert_eq!(report.flows.len(), 1);
        assert_eq!(report.capture_count(), 7);
        assert!(report.capture_count() < report.total_steps);
        assert_gap_invariant(&report, config.min_capture_gap);
    }

    #[tokio::test]
    async fn test_non_positive_duration_is_empty() {
        for duration in [0.0, -1.0] {
            let mut source = ScriptedSource::new(duration, |_| 0);
            let report = SamplingDriver::new(FlowConfig::default()).run(&mut source).await;

            assert!(report.flows.is_empty());
            assert!(matches!(report.status, RunStatus::InvalidInput(_)));
            assert!(source.requests.is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_config_never_starts() {
        let config = FlowConfig {
            time_step: 0.0,
            ..Default::default()
        };
        let mut source = ScriptedSource::new(2.0, |_| 0);
        let report = SamplingDriver::new(config).run(&mut source).await;

        assert!(matches!(report.status, RunStatus::InvalidInput(_)));
        assert!(source.requests.is_empty());
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let level = |ts: f64| ((ts * 10.0) as u32 % 7 * 3 + 90) as u8;
        let driver = SamplingDriver::new(fast_config());

        let first = driver.run(&mut ScriptedSource::new(6.0, level)).await;
        let second = driver.run(&mut ScriptedSource::new(6.0, level)).await;

        assert_eq!(first.flows, second.flows);
        assert_eq!(first.status, second.status);
    }

    #[tokio::test]
    async fn test_flow_ordering() {
        let level = |ts: f64| match ts {
            t if t < 1.0 => 20,
            t if t < 2.0 => 120,
            t if t < 3.0 => 125,
            _ => 240,
        };
        let mut source = ScriptedSource::new(4.0, level);
        let report = SamplingDriver::new(fast_config()).run(&mut source).await;

        let flows = timestamps_of(&report);
        assert!(flows.len() >= 2);
        for flow in &flows {
            assert!(flow.windows(2).all(|p| p[1] > p[0]));
        }
        for pair in flows.windows(2) {
            assert!(pair[1][0] >= *pair[0].last().unwrap());
        }
        let ids: Vec<u32> = report.flows.iter().map(|f| f.id).collect();
        assert_eq!(ids, (1..=flows.len() as u32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_detection_and_export_sizes() {
        let mut source = ScriptedSource::new(0.5, |_| 50);
        let report = SamplingDriver::new(fast_config()).run(&mut source).await;

        assert_eq!(
            source.requests,
            vec![(0.0, 40, 22), (0.0, WIDTH, HEIGHT), (0.4, 40, 22)]
        );
        let image = image::load_from_memory(&report.flows[0].captures[0].image).unwrap();
        assert_eq!((image.width(), image.height()), (WIDTH, HEIGHT));
    }

    #[tokio::test]
    async fn test_detection_timeout_reuses_last_frame() {
        let mut source = ScriptedSource::new(4.0, |_| 128)
            .hanging(|ts, width| width != WIDTH && (1.1..1.7).contains(&ts));
        let report = SamplingDriver::new(fast_config()).run(&mut source).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.timeouts, 2);
        assert_eq!(report.sampled_steps, report.total_steps);
        assert_eq!(report.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_export_timeout_falls_back_to_detection_frame() {
        let mut source = ScriptedSource::new(0.4, |_| 128).hanging(|_, width| width == WIDTH);
        let report = SamplingDriver::new(fast_config()).run(&mut source).await;

        assert_eq!(report.capture_count(), 1);
        let image = image::load_from_memory(&report.flows[0].captures[0].image).unwrap();
        assert_eq!((image.width(), image.height()), (40, 22));
    }

    #[tokio::test]
    async fn test_source_never_ready() {
        let mut source = ScriptedSource::new(1.0, |_| 0).hanging(|_, _| true);
        let report = SamplingDriver::new(FlowConfig {
            frame_wait_timeout_ms: 5,
            ..Default::default()
        })
        .run(&mut source)
        .await;

        assert_eq!(report.status, RunStatus::SourceUnavailable);
        assert!(report.flows.is_empty());
        assert_eq!(report.timeouts, 3);
        assert!(report.summary().contains("no frame"));
    }

    #[tokio::test]
    async fn test_progress_and_cancel() {
        let driver = SamplingDriver::new(fast_config());
        let cancel = driver.cancel_handle();
        let mut seen = Vec::new();

        let mut source = ScriptedSource::new(4.0, |_| 128);
        let report = driver
            .run_with_progress(&mut source, |progress| {
                seen.push(progress);
                if progress.completed == 3 {
                    cancel.cancel();
                }
            })
            .await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.sampled_steps, 3);
        assert_eq!(report.capture_count(), 1);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].total, 10);
        assert!((seen[2].fraction - 0.3).abs() < 1e-6);

        let mut seen = 0;
        let report = driver
            .run_with_progress(&mut ScriptedSource::new(4.0, |_| 128), |p| {
                seen += 1;
                if p.completed == p.total {
                    assert_eq!(p.fraction, 1.0);
                }
            })
            .await;
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(seen, 10);
    }

    #[tokio::test]
    async fn test_cancelled_run_does_not_stick() {
        let driver = SamplingDriver::new(fast_config());
        let cancel = driver.cancel_handle();

        let first = driver
            .run_with_progress(&mut ScriptedSource::new(4.0, |_| 128), |progress| {
                if progress.completed == 1 {
                    cancel.cancel();
                }
            })
            .await;
        assert_eq!(first.status, RunStatus::Cancelled);
        assert_eq!(first.sampled_steps, 1);

        let second = driver.run(&mut ScriptedSource::new(4.0, |_| 128)).await;
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.sampled_steps, 10);
        assert_eq!(second.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_very_long_video_cancels_early() {
        let driver = SamplingDriver::new(fast_config());
        let cancel = driver.cancel_handle();

        let report = driver
            .run_with_progress(&mut ScriptedSource::new(1.0e9, |_| 128), |progress| {
                if progress.completed == 2 {
                    cancel.cancel();
                }
            })
            .await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.sampled_steps, 2);
        assert_eq!(report.total_steps, 2_500_000_000);
    }

    struct FlakyEncoder {
        calls: Cell<usize>,
    }

    impl FrameEncoder for FlakyEncoder {
        fn encode(&self, frame: &Frame) -> Result<Vec<u8>, FlowError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == 0 {
                return Err(FlowError::InvalidInput("encoder warming up".into()));
            }
            JpegEncoder::default().encode(frame)
        }
    }

    #[tokio::test]
    async fn test_failed_export_does_not_move_baseline() {
        let driver = SamplingDriver::with_encoder(
            fast_config(),
            FlakyEncoder {
                calls: Cell::new(0),
            },
        );
        let mut source = ScriptedSource::new(2.0, |_| 128);
        let report = driver.run(&mut source).await;

        let flows = timestamps_of(&report);
        assert_eq!(flows, vec![vec![0.4]]);
        assert_eq!(driver.encoder().calls.get(), 2);
    }
}
