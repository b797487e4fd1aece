//! # strata-storefile
//!
//! Identity of the data files ("store files") of a region-based LSM store.
//!
//! A store file found on disk is one of:
//!
//! - a **plain** immutable data file, named by a hex id;
//! - a **reference** written when a region splits, pointing at the top or
//!   bottom half of a file in the parent region;
//! - a **link** aliasing a file owned by another region or a snapshot.
//!
//! [`StoreFileInfo`] classifies a path into exactly one of these at
//! construction, resolves what a reference points at, estimates block
//! locality, and opens a reader over the right bytes.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/data/<namespace>/<table>/<region>/<family>/<file>
//!
//! 1234abcd                      plain store file
//! 1234abcd_SeqId_42_            bulk-loaded plain store file
//! 1234abcd.<parent-region>      reference into <table>/<parent-region>/<family>/1234abcd
//! t1=<region>-1234abcd          link to <table t1>/<region>/<family>/1234abcd
//! ```

pub mod fs;
pub mod hooks;
pub mod info;
pub mod link;
pub mod locality;
pub mod naming;
pub mod reader;
pub mod reference;

pub use fs::{BlockLocation, FileStatus, FileSystem, InputStream, LocalFileSystem};
pub use hooks::{HookChain, OpenContext, ReaderHook};
pub use info::{is_valid_store_file, StoreFileInfo, StoreFileKind};
pub use link::{link_name, StoreFileLink};
pub use locality::{BlockDistribution, ByteRange};
pub use naming::{
    classify_name, is_link_name, is_reference_name, is_store_file_name,
    is_valid_store_file_name, NameKind,
};
pub use reader::{FullFileReader, HalfFileReader, StoreFileReader};
pub use reference::{referred_to_file, reference_file_name, Reference, SplitHalf};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while identifying or opening store files
#[derive(Error, Debug)]
pub enum StoreFileError {
    #[error("path={path} doesn't look like a valid store file")]
    NotAStoreFile { path: PathBuf },

    #[error("failed match of reference file name {path}: {reason}")]
    MalformedReferenceName { path: PathBuf, reason: &'static str },

    #[error("failed match of link file name {path}")]
    MalformedLinkName { path: PathBuf },

    #[error("corrupt reference file {path}: {reason}")]
    CorruptReference { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reader hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },
}

impl StoreFileError {
    /// Annotate an I/O error with the path it concerned.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreFileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is an I/O error of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreFileError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }

    /// The path this error is about, when it carries one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreFileError::NotAStoreFile { path }
            | StoreFileError::MalformedReferenceName { path, .. }
            | StoreFileError::MalformedLinkName { path }
            | StoreFileError::CorruptReference { path, .. }
            | StoreFileError::Io { path, .. } => Some(path),
            StoreFileError::Hook { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreFileError>;
