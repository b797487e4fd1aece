//! Filesystem accessor abstraction.
//!
//! Store file identity only needs four things from the underlying storage:
//! file status, a seekable input stream, an output stream, and the block
//! locations backing a byte range. [`FileSystem`] captures exactly that so a
//! distributed filesystem client can stand in for [`LocalFileSystem`].
//!
//! Retries and timeouts belong to the implementation, never to callers here.

use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use strata_config::LocalFsConfig;

use crate::{Result, StoreFileError};

/// Metadata snapshot of a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    /// Length in bytes
    pub len: u64,
    /// Milliseconds since the Unix epoch
    pub modification_time: u64,
    pub is_dir: bool,
}

impl FileStatus {
    /// Status of a regular file
    pub fn file(path: impl Into<PathBuf>, len: u64, modification_time: u64) -> Self {
        Self {
            path: path.into(),
            len,
            modification_time,
            is_dir: false,
        }
    }

    /// Status of a directory
    pub fn directory(path: impl Into<PathBuf>, modification_time: u64) -> Self {
        Self {
            path: path.into(),
            len: 0,
            modification_time,
            is_dir: true,
        }
    }
}

/// A contiguous block of a file and the hosts holding a replica of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    pub offset: u64,
    pub length: u64,
    pub hosts: Vec<String>,
}

/// Readable, seekable byte stream
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub type InputStream = Box<dyn ReadSeek>;

pub type OutputStream = Box<dyn Write + Send>;

/// Storage the store files live on
pub trait FileSystem: Send + Sync {
    /// Stat a path. A missing path is an `Io` error of kind `NotFound`.
    fn status(&self, path: &Path) -> Result<FileStatus>;

    /// Open a path for reading
    fn open(&self, path: &Path) -> Result<InputStream>;

    /// Create (or truncate) a file for writing, creating parent directories
    fn create(&self, path: &Path) -> Result<OutputStream>;

    /// Block locations overlapping `[offset, offset + len)` of a file
    fn block_locations(&self, status: &FileStatus, offset: u64, len: u64)
        -> Result<Vec<BlockLocation>>;
}

/// [`FileSystem`] over the local disk.
///
/// Local files have no real block structure, so block locations are
/// synthesized by tiling each file with `block_size` blocks, all reported on
/// the configured hosts.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    block_size: u64,
    hosts: Vec<String>,
}

impl LocalFileSystem {
    pub fn new(config: &LocalFsConfig) -> Self {
        Self {
            block_size: config.block_size.max(1),
            hosts: config.hosts.clone(),
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new(&LocalFsConfig::default())
    }
}

impl FileSystem for LocalFileSystem {
    fn status(&self, path: &Path) -> Result<FileStatus> {
        let meta = fs::metadata(path).map_err(|e| StoreFileError::io(path, e))?;
        let modification_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        if meta.is_dir() {
            Ok(FileStatus::directory(path, modification_time))
        } else {
            Ok(FileStatus::file(path, meta.len(), modification_time))
        }
    }

    fn open(&self, path: &Path) -> Result<InputStream> {
        let file = File::open(path).map_err(|e| StoreFileError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn create(&self, path: &Path) -> Result<OutputStream> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreFileError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| StoreFileError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn block_locations(
        &self,
        status: &FileStatus,
        offset: u64,
        len: u64,
    ) -> Result<Vec<BlockLocation>> {
        if status.is_dir || len == 0 || offset >= status.len {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(len).min(status.len);

        let mut locations = Vec::new();
        let mut block_start = (offset / self.block_size) * self.block_size;
        while block_start < end {
            let block_len = self.block_size.min(status.len - block_start);
            locations.push(BlockLocation {
                offset: block_start,
                length: block_len,
                hosts: self.hosts.clone(),
            });
            block_start += self.block_size;
        }
        Ok(locations)
    }
}
