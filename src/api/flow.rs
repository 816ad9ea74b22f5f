//! UI 流程提取器

use log::{info, warn};

use crate::core::flow::export::{ArchiveLayout, ArchivePackager, ZipPackager};
use crate::core::flow::{
    CancelHandle, ExtractionReport, Flow, FlowConfig, FlowError, FrameEncoder, FrameSource,
    SamplingDriver, SamplingProgress,
};

/// How captures are laid out in the downloaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// `flow_{id}/step_{n}_{M-SS}.jpg` in `ui_flows.zip`
    #[default]
    ByFlow,
    /// `screenshot_{n}_{M-SS}.jpg` in `video_screenshots.zip`
    Flat,
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A finished run and its archive. The report survives a packaging failure.
#[derive(Debug)]
pub struct PackagedFlows {
    pub report: ExtractionReport,
    /// `None` when the run produced no captures.
    pub archive: Option<Result<Archive, FlowError>>,
}

impl PackagedFlows {
    pub fn packaging_error(&self) -> Option<&FlowError> {
        self.archive.as_ref().and_then(|archive| archive.as_ref().err())
    }

    /// The archive, or the error that kept it from being built.
    pub fn into_archive(self) -> Result<Option<Archive>, FlowError> {
        self.archive.transpose()
    }
}

/// 录屏 -> 流程截图 -> 压缩包
///
/// ```ignore
/// let extractor = FlowExtractor::create();
/// let packaged = extractor.extract_and_package(&mut source, ExportMode::ByFlow).await;
/// let archive = packaged.into_archive()?;
/// ```
pub struct FlowExtractor {
    driver: SamplingDriver,
}

impl FlowExtractor {
    pub fn create() -> Self {
        info!("🎬 FlowExtractor: created");
        Self {
            driver: SamplingDriver::default(),
        }
    }

    pub fn with_config(config: FlowConfig) -> Result<Self, FlowError> {
        config.validate()?;
        info!("🎬 FlowExtractor: created with {:?}", config);
        Ok(Self {
            driver: SamplingDriver::new(config),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Self::with_config(FlowConfig::from_json(json)?)
    }

    pub fn config(&self) -> &FlowConfig {
        self.driver.config()
    }

    /// Stops an in-progress `extract` before its next timestamp.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.driver.cancel_handle()
    }

    pub async fn extract<S: FrameSource>(&self, source: &mut S) -> ExtractionReport {
        self.driver.run(source).await
    }

    pub async fn extract_with_progress<S, P>(&self, source: &mut S, on_progress: P) -> ExtractionReport
    where
        S: FrameSource,
        P: FnMut(SamplingProgress),
    {
        self.driver.run_with_progress(source, on_progress).await
    }

    pub fn package(&self, flows: &[Flow], mode: ExportMode) -> Result<Archive, FlowError> {
        package_with(&ZipPackager, flows, mode, self.driver.encoder().extension())
    }

    pub async fn extract_and_package<S: FrameSource>(
        &self,
        source: &mut S,
        mode: ExportMode,
    ) -> PackagedFlows {
        self.extract_and_package_with(source, &ZipPackager, mode).await
    }

    pub async fn extract_and_package_with<S, P>(
        &self,
        source: &mut S,
        packager: &P,
        mode: ExportMode,
    ) -> PackagedFlows
    where
        S: FrameSource,
        P: ArchivePackager,
    {
        let report = self.extract(source).await;
        if report.is_empty() {
            return PackagedFlows {
                report,
                archive: None,
            };
        }

        let extension = self.driver.encoder().extension();
        let archive = package_with(packager, &report.flows, mode, extension);
        if let Err(e) = &archive {
            warn!("⚠️ Packaging failed, keeping {} flows: {}", report.flows.len(), e);
        }
        PackagedFlows {
            report,
            archive: Some(archive),
        }
    }
}

impl Default for FlowExtractor {
    fn default() -> Self {
        Self::create()
    }
}

impl Drop for FlowExtractor {
    fn drop(&mut self) {
        info!("🗑️ FlowExtractor: released");
    }
}

/// Lay out `flows` per `mode` and bundle them with `packager`.
pub fn package_with<P: ArchivePackager>(
    packager: &P,
    flows: &[Flow],
    mode: ExportMode,
    extension: &str,
) -> Result<Archive, FlowError> {
    let layout = match mode {
        ExportMode::ByFlow => ArchiveLayout::by_flow(flows, extension),
        ExportMode::Flat => ArchiveLayout::flat(flows, extension),
    };
    let bytes = packager.package(&layout)?;
    Ok(Archive {
        file_name: layout.file_name.to_string(),
        bytes,
    })
}
