//! Classification reports printed by `classify` and `scan`.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use strata_config::LayoutConfig;
use strata_storefile::{is_valid_store_file, FileSystem, StoreFileInfo, StoreFileKind};

/// Default worker count: min(cpu/2, 4), at least 1
fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).clamp(1, 4))
        .unwrap_or(1)
}

fn create_thread_pool(threads: Option<usize>) -> Result<ThreadPool> {
    let num_threads = threads.unwrap_or_else(default_thread_count);
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("strata-scan-{}", i))
        .build()?)
}

/// What one path turned out to be
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// `plain`, `reference`, `link`, or `other` when not a store file
    pub kind: &'static str,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    /// Candidate locations of the link this file reads through
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub link_locations: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn other(path: &Path, size: u64, error: String) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: "other",
            size,
            half: None,
            target: None,
            link_locations: Vec::new(),
            error: Some(error),
        }
    }

    fn from_info(info: &StoreFileInfo) -> Self {
        let kind = match info.kind() {
            StoreFileKind::Plain => "plain",
            StoreFileKind::Reference { .. } => "reference",
            StoreFileKind::Link { .. } => "link",
        };
        Self {
            path: info.path().to_path_buf(),
            kind,
            size: info.size(),
            half: info.reference().map(|r| r.half().as_str()),
            target: info.referenced_path().map(Path::to_path_buf),
            link_locations: info
                .link()
                .map(|link| link.locations().to_vec())
                .unwrap_or_default(),
            error: None,
        }
    }

    /// Classify a single path, recording failures in the report.
    pub fn classify(layout: &LayoutConfig, fs: &dyn FileSystem, path: &Path) -> Self {
        match StoreFileInfo::from_path(layout, fs, path) {
            Ok(info) => Self::from_info(&info),
            Err(e) => Self::other(path, 0, e.to_string()),
        }
    }

    /// Like [`classify`](Self::classify), but first applies the listing
    /// filter that skips directories, empty data files and reserved names.
    fn scan_one(layout: &LayoutConfig, fs: &dyn FileSystem, path: &Path) -> Self {
        let status = match fs.status(path) {
            Ok(status) => status,
            Err(e) => return Self::other(path, 0, e.to_string()),
        };
        if !is_valid_store_file(&status) {
            return Self::other(path, status.len, "not a valid store file".to_string());
        }
        let size = status.len;
        match StoreFileInfo::new(layout, fs, status) {
            Ok(info) => Self::from_info(&info),
            Err(e) => Self::other(path, size, e.to_string()),
        }
    }

    pub fn is_store_file(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10} {}", self.kind, self.path.display())?;
        if let (Some(target), Some(half)) = (&self.target, self.half) {
            write!(f, " -> {} ({})", target.display(), half)?;
        } else if let Some(origin) = self.link_locations.first() {
            write!(f, " -> {}", origin.display())?;
        }
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

/// Classify `files` on a worker pool; reports keep the input order.
pub fn scan(
    layout: &LayoutConfig,
    fs: &dyn FileSystem,
    files: &[PathBuf],
    threads: Option<usize>,
) -> Result<Vec<FileReport>> {
    let pool = create_thread_pool(threads)?;
    Ok(pool.install(|| {
        files
            .par_iter()
            .map(|path| FileReport::scan_one(layout, fs, path))
            .collect()
    }))
}

/// Per-kind totals of a scan
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub plain: usize,
    pub reference: usize,
    pub link: usize,
    pub other: usize,
    pub total_bytes: u64,
}

impl ScanSummary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.kind {
                "plain" => summary.plain += 1,
                "reference" => summary.reference += 1,
                "link" => summary.link += 1,
                _ => summary.other += 1,
            }
            if report.is_store_file() {
                summary.total_bytes += report.size;
            }
        }
        summary
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} plain, {} reference, {} link, {} other ({} bytes)",
            self.plain, self.reference, self.link, self.other, self.total_bytes
        )
    }
}

/// Path of the file whose bytes `path` reads.
pub fn resolve_source(layout: &LayoutConfig, fs: &dyn FileSystem, path: &Path) -> Result<PathBuf> {
    let info = StoreFileInfo::from_path(layout, fs, path)?;
    Ok(info.source_status(fs)?.path)
}
