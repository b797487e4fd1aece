//! Split references.
//!
//! When a region splits, each daughter gets a small reference file per parent
//! store file instead of a copy of the data. The reference is named
//! `<referenced file>.<parent region>` and its content records the split key
//! and which half of the parent file the daughter owns.
//!
//! ## Reference File Format
//!
//! ```text
//! +----------------+
//! | Magic (8B)     |  "SFREF\0\0\x01"
//! +----------------+
//! | Body           |  bincode { split_key, half }
//! +----------------+
//! ```

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_config::log_storefile_warn;
use tracing::debug;

use crate::fs::FileSystem;
use crate::naming::{file_name, parse_reference_name};
use crate::{Result, StoreFileError};

/// Magic bytes opening every reference file
const REFERENCE_MAGIC: &[u8; 8] = b"SFREF\0\0\x01";

/// Which side of the split key a reference covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitHalf {
    /// Keys at or after the split key
    Top,
    /// Keys before the split key
    Bottom,
}

impl SplitHalf {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitHalf::Top => "top",
            SplitHalf::Bottom => "bottom",
        }
    }
}

impl fmt::Display for SplitHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of a reference file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    split_key: Vec<u8>,
    half: SplitHalf,
}

impl Reference {
    pub fn new(split_key: impl Into<Vec<u8>>, half: SplitHalf) -> Self {
        Self {
            split_key: split_key.into(),
            half,
        }
    }

    pub fn top(split_key: impl Into<Vec<u8>>) -> Self {
        Self::new(split_key, SplitHalf::Top)
    }

    pub fn bottom(split_key: impl Into<Vec<u8>>) -> Self {
        Self::new(split_key, SplitHalf::Bottom)
    }

    pub fn split_key(&self) -> &[u8] {
        &self.split_key
    }

    pub fn half(&self) -> SplitHalf {
        self.half
    }

    pub fn is_top(&self) -> bool {
        self.half == SplitHalf::Top
    }

    /// Serialized form, magic included
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| StoreFileError::CorruptReference {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        let mut bytes = Vec::with_capacity(REFERENCE_MAGIC.len() + body.len());
        bytes.extend_from_slice(REFERENCE_MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Parse the serialized form; `path` is only used for error reporting.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: String| StoreFileError::CorruptReference {
            path: path.to_path_buf(),
            reason,
        };
        let body = bytes
            .strip_prefix(REFERENCE_MAGIC.as_slice())
            .ok_or_else(|| corrupt("bad magic bytes".to_string()))?;
        bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))
    }

    /// Read a reference file.
    pub fn read(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        fs.open(path)?
            .read_to_end(&mut bytes)
            .map_err(|e| StoreFileError::io(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    /// Write this reference to `path`, replacing any existing file.
    pub fn write(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut out = fs.create(path)?;
        out.write_all(&bytes)
            .and_then(|_| out.flush())
            .map_err(|e| StoreFileError::io(path, e))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.half, f)
    }
}

/// Name of the reference a daughter region writes for `referenced` in `parent_region`.
pub fn reference_file_name(referenced: &str, parent_region: &str) -> String {
    format!("{}.{}", referenced, parent_region)
}

/// Path of the file a reference points at.
///
/// With the layout `<table>/<region>/<family>/<file>`, the table directory is
/// `table_dir_depth` parents above the reference, and the referenced file is
/// `<table>/<parent region>/<family>/<referenced file>`. Pure path algebra:
/// the result is not checked for existence.
pub fn referred_to_file(path: &Path, table_dir_depth: usize) -> Result<PathBuf> {
    let malformed = |reason| StoreFileError::MalformedReferenceName {
        path: path.to_path_buf(),
        reason,
    };

    let Some(parsed) = file_name(path).and_then(parse_reference_name) else {
        log_storefile_warn!(
            "Failed match of store file name",
            path = display(path.display())
        );
        return Err(malformed("name is not <file>.<region>"));
    };

    let family = path
        .parent()
        .and_then(file_name)
        .ok_or_else(|| malformed("no family directory"))?;
    let table_dir = path
        .ancestors()
        .nth(table_dir_depth)
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| malformed("path is shallower than the table directory"))?;

    debug!(
        reference = %path.display(),
        region = parsed.parent_region,
        file = parsed.referenced,
        "Resolved reference"
    );

    Ok(table_dir
        .join(parsed.parent_region)
        .join(family)
        .join(parsed.referenced))
}
