//! UI 流程截图提取
//!
//! 核心策略：
//! 1. 定步长采样 - 每个时间点取一张缩小的检测帧
//! 2. 帧差打分 - 灰度化后按步长抽样求平均绝对差
//! 3. 状态机驱动 - 硬切开新流程，突发变化的开始和结束各截一次
//! 4. 全分辨率导出 - 仅对被采纳的时间点取原尺寸帧并编码

pub mod assembler;
pub mod config;
pub mod detector;
pub mod diff_filter;
pub mod error;
pub mod export;
pub mod frame;
pub mod sampler;
pub mod source;
pub mod state_machine;

pub use assembler::{format_time, Capture, Flow, FlowAssembler};
pub use config::{FlowConfig, PolicyConfig};
pub use detector::ChangeDetector;
pub use diff_filter::{diff_score, FrameDiffFilter};
pub use error::FlowError;
pub use export::{ArchiveLayout, ArchivePackager, ZipPackager};
pub use frame::{Frame, LumaBuffer};
pub use sampler::{
    CancelHandle, ExtractionReport, RunStatus, SamplingDriver, SamplingProgress,
};
pub use source::{FrameEncoder, FrameSource, ImageSequenceSource, JpegEncoder};
pub use state_machine::{CaptureDecision, CapturePolicy, CaptureReason, PolicyState};
