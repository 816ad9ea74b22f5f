//! Archive layout for exported captures.
//!
//! Flow archives put each flow in `flow_{id}/` with files named
//! `step_{index}_{M-SS}.{ext}`. The flat variant drops the directories.

use std::io::{Cursor, Write};
use std::path::Path;

use log::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::assembler::Flow;
use super::error::FlowError;

pub const FLOW_ARCHIVE_NAME: &str = "ui_flows.zip";
pub const FLAT_ARCHIVE_NAME: &str = "video_screenshots.zip";

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Path -> payload mapping, in the order entries are written.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveLayout {
    pub file_name: &'static str,
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveLayout {
    /// Flows are numbered by position, so ids in the archive always run 1..=n.
    pub fn by_flow(flows: &[Flow], extension: &str) -> Self {
        let entries = flows
            .iter()
            .filter(|flow| !flow.is_empty())
            .enumerate()
            .flat_map(|(flow_idx, flow)| {
                flow.captures
                    .iter()
                    .enumerate()
                    .map(move |(step_idx, capture)| ArchiveEntry {
                        path: format!(
                            "flow_{}/step_{}_{}.{}",
                            flow_idx + 1,
                            step_idx + 1,
                            file_time(&capture.formatted_time),
                            extension
                        ),
                        bytes: capture.image.clone(),
                    })
            })
            .collect();

        Self {
            file_name: FLOW_ARCHIVE_NAME,
            entries,
        }
    }

    pub fn flat(flows: &[Flow], extension: &str) -> Self {
        let entries = flows
            .iter()
            .flat_map(|flow| flow.captures.iter())
            .enumerate()
            .map(|(idx, capture)| ArchiveEntry {
                path: format!(
                    "screenshot_{}_{}.{}",
                    idx + 1,
                    file_time(&capture.formatted_time),
                    extension
                ),
                bytes: capture.image.clone(),
            })
            .collect();

        Self {
            file_name: FLAT_ARCHIVE_NAME,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }
}

/// `1:05` -> `1-05`
fn file_time(formatted: &str) -> String {
    formatted.replace(':', "-")
}

/// Bundles a layout into one downloadable payload.
pub trait ArchivePackager {
    fn package(&self, layout: &ArchiveLayout) -> Result<Vec<u8>, FlowError>;
}

/// Zip 打包；图片已是压缩格式，直接存储
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl ArchivePackager for ZipPackager {
    fn package(&self, layout: &ArchiveLayout) -> Result<Vec<u8>, FlowError> {
        if layout.is_empty() {
            return Err(FlowError::Packaging(format!(
                "{} would contain no screenshots",
                layout.file_name
            )));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &layout.entries {
            writer.start_file(entry.path.as_str(), options)?;
            writer.write_all(&entry.bytes)?;
        }
        let bytes = writer.finish()?.into_inner();

        info!(
            "📦 Packaged {} files into {} ({} bytes)",
            layout.len(),
            layout.file_name,
            bytes.len()
        );
        Ok(bytes)
    }
}

/// Package `layout` and write it under `dir` using the layout's file name.
pub fn write_archive<P: ArchivePackager>(
    packager: &P,
    layout: &ArchiveLayout,
    dir: impl AsRef<Path>,
) -> Result<std::path::PathBuf, FlowError> {
    let bytes = packager.package(layout)?;
    let path = dir.as_ref().join(layout.file_name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}
