//! Store file descriptor.
//!
//! [`StoreFileInfo`] classifies a path once, at construction, into exactly
//! one [`StoreFileKind`]. Classification order matters because link and
//! reference names can be textually similar:
//!
//! 1. link name → [`StoreFileKind::Link`]
//! 2. reference name → read the reference file, resolve its target, and
//!    check whether that target is itself a link
//! 3. plain store file name → [`StoreFileKind::Plain`]
//! 4. anything else → [`StoreFileError::NotAStoreFile`]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use strata_config::{log_storefile_trace, log_storefile_warn, CacheConfig, LayoutConfig};
use tracing::instrument;

use crate::fs::{FileStatus, FileSystem, InputStream};
use crate::hooks::{HookChain, OpenContext};
use crate::link::StoreFileLink;
use crate::locality::{compute_distribution, estimate_reference, BlockDistribution};
use crate::naming::{file_name, is_link_name, is_reference_name, is_store_file_name};
use crate::reader::{FullFileReader, HalfFileReader, StoreFileReader};
use crate::reference::{referred_to_file, Reference};
use crate::{Result, StoreFileError};

/// What a store file is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFileKind {
    /// Self-contained data file
    Plain,
    /// One half of a file in the parent region
    Reference {
        reference: Reference,
        /// Path of the referenced file
        target: PathBuf,
        /// Present iff the referenced file is itself a link
        target_link: Option<StoreFileLink>,
    },
    /// Alias of a file owned by another region or a snapshot
    Link { link: StoreFileLink },
}

/// A store file and what it resolves to
pub struct StoreFileInfo {
    status: FileStatus,
    kind: StoreFileKind,
    /// Last computed distribution; concurrent opens may race, last write wins
    block_distribution: RwLock<Option<BlockDistribution>>,
    hooks: Option<Arc<HookChain>>,
}

impl StoreFileInfo {
    /// Stat `path` and classify it.
    pub fn from_path(layout: &LayoutConfig, fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let status = fs.status(path)?;
        Self::new(layout, fs, status)
    }

    /// Classify a file whose status is already known.
    ///
    /// Reads the reference file when `status` names a reference.
    #[instrument(skip(layout, fs, status), fields(path = %status.path.display()), level = "debug")]
    pub fn new(layout: &LayoutConfig, fs: &dyn FileSystem, status: FileStatus) -> Result<Self> {
        let path = status.path.as_path();
        let not_a_store_file = || StoreFileError::NotAStoreFile {
            path: path.to_path_buf(),
        };
        let name = file_name(path).ok_or_else(not_a_store_file)?;

        let kind = if is_link_name(name) {
            log_storefile_trace!("Classified as link", path = display(path.display()));
            StoreFileKind::Link {
                link: StoreFileLink::from_path(layout, path)?,
            }
        } else if is_reference_name(name) {
            let reference = Reference::read(fs, path)?;
            let target = referred_to_file(path, layout.table_dir_depth)?;
            let target_link = match file_name(&target) {
                Some(target_name) if is_link_name(target_name) => {
                    Some(StoreFileLink::from_path(layout, &target)?)
                }
                _ => None,
            };
            log_storefile_trace!(
                "Classified as reference",
                path = display(path.display()),
                half = reference.half().as_str(),
                target = display(target.display()),
            );
            StoreFileKind::Reference {
                reference,
                target,
                target_link,
            }
        } else if is_store_file_name(name) {
            StoreFileKind::Plain
        } else {
            return Err(not_a_store_file());
        };

        Ok(Self {
            status,
            kind,
            block_distribution: RwLock::new(None),
            hooks: None,
        })
    }

    /// Attach the hook chain consulted by [`open`](Self::open).
    pub fn set_hooks(&mut self, hooks: Arc<HookChain>) {
        self.hooks = Some(hooks);
    }

    pub fn path(&self) -> &Path {
        &self.status.path
    }

    /// Status captured at construction (this path's, not the target's)
    pub fn status(&self) -> &FileStatus {
        &self.status
    }

    pub fn size(&self) -> u64 {
        self.status.len
    }

    pub fn modification_time(&self) -> u64 {
        self.status.modification_time
    }

    pub fn kind(&self) -> &StoreFileKind {
        &self.kind
    }

    pub fn reference(&self) -> Option<&Reference> {
        match &self.kind {
            StoreFileKind::Reference { reference, .. } => Some(reference),
            _ => None,
        }
    }

    /// The link this file resolves through: its own, or its reference target's.
    pub fn link(&self) -> Option<&StoreFileLink> {
        match &self.kind {
            StoreFileKind::Link { link } => Some(link),
            StoreFileKind::Reference { target_link, .. } => target_link.as_ref(),
            StoreFileKind::Plain => None,
        }
    }

    /// Path of the referenced file, for references
    pub fn referenced_path(&self) -> Option<&Path> {
        match &self.kind {
            StoreFileKind::Reference { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, StoreFileKind::Reference { .. })
    }

    pub fn is_top_reference(&self) -> bool {
        self.reference().is_some_and(Reference::is_top)
    }

    /// True only for a bare link; a reference to a link is a reference.
    pub fn is_link(&self) -> bool {
        matches!(self.kind, StoreFileKind::Link { .. })
    }

    /// Distribution cached by the last [`open`](Self::open), if any
    pub fn block_distribution(&self) -> Option<BlockDistribution> {
        self.block_distribution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Compute the block distribution without opening a reader.
    ///
    /// Returns `Ok(None)` when the status of the file backing this store file
    /// cannot be obtained, for whatever reason. Does not update the cached
    /// distribution.
    pub fn compute_block_distribution(
        &self,
        fs: &dyn FileSystem,
    ) -> Result<Option<BlockDistribution>> {
        let status = match self.source_status(fs) {
            Ok(status) => status,
            Err(e) => {
                log_storefile_warn!(
                    "No locality for unresolvable store file",
                    path = display(self.path().display()),
                    error = display(&e),
                );
                return Ok(None);
            }
        };

        match self.reference() {
            Some(reference) => estimate_reference(fs, reference.half(), Some(&status)),
            None => compute_distribution(fs, &status, 0, status.len).map(Some),
        }
    }

    /// Open a reader over this store file's bytes.
    ///
    /// Resolves the physical source, caches its block distribution, gives
    /// the hook chain a chance to supply the reader, falls back to a half
    /// reader for references and a full reader otherwise, and finally lets
    /// the hook chain wrap the result.
    #[instrument(skip(self, fs, cache), fields(path = %self.path().display()), level = "debug")]
    pub fn open(
        &self,
        fs: &dyn FileSystem,
        cache: &CacheConfig,
    ) -> Result<Box<dyn StoreFileReader>> {
        let (input, status) = self.resolve_source(fs)?;
        let length = status.len;

        let distribution = match self.reference() {
            Some(reference) => estimate_reference(fs, reference.half(), Some(&status))?,
            None => Some(compute_distribution(fs, &status, 0, length)?),
        };
        *self
            .block_distribution
            .write()
            .unwrap_or_else(PoisonError::into_inner) = distribution;

        let ctx = OpenContext {
            fs,
            path: self.path(),
            source: &status.path,
            length,
            cache,
            reference: self.reference(),
        };

        let mut input = Some(input);
        let supplied = match &self.hooks {
            Some(hooks) => hooks.pre_open(&ctx, &mut input)?,
            None => None,
        };

        let reader: Box<dyn StoreFileReader> = match (supplied, self.reference()) {
            (Some(reader), _) => reader,
            (None, reference) => {
                // A hook may have consumed the stream without producing a reader
                let input = match input {
                    Some(input) => input,
                    None => fs.open(&status.path)?,
                };
                match reference {
                    Some(reference) => Box::new(HalfFileReader::new(
                        self.path(),
                        input,
                        length,
                        cache,
                        reference,
                    )?),
                    None => Box::new(FullFileReader::new(self.path(), input, length, cache)),
                }
            }
        };

        match &self.hooks {
            Some(hooks) => hooks.post_open(&ctx, reader),
            None => Ok(reader),
        }
    }

    /// Stream and status of the bytes behind this store file.
    fn resolve_source(&self, fs: &dyn FileSystem) -> Result<(InputStream, FileStatus)> {
        if let Some(link) = self.link() {
            return Ok((link.open(fs)?, link.file_status(fs)?));
        }
        match &self.kind {
            StoreFileKind::Reference { target, .. } => Ok((fs.open(target)?, fs.status(target)?)),
            _ => Ok((fs.open(self.path())?, self.status.clone())),
        }
    }

    /// Status of the file whose bytes this store file reads.
    ///
    /// For a link this is the first existing location; for a reference, the
    /// referenced file (resolved through its link when it is one).
    pub fn source_status(&self, fs: &dyn FileSystem) -> Result<FileStatus> {
        if let Some(link) = self.link() {
            return link.file_status(fs);
        }
        match &self.kind {
            StoreFileKind::Reference { target, .. } => fs.status(target),
            _ => Ok(self.status.clone()),
        }
    }
}

impl fmt::Debug for StoreFileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreFileInfo")
            .field("status", &self.status)
            .field("kind", &self.kind)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl fmt::Display for StoreFileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())?;
        if let StoreFileKind::Reference {
            reference, target, ..
        } = &self.kind
        {
            write!(f, "-{}-{}", target.display(), reference)?;
        }
        Ok(())
    }
}

/// Whether a listed file can be a store file.
///
/// Directories never are. Empty files are rejected unless they are links,
/// which are legitimately zero bytes; an empty data file means data loss.
pub fn is_valid_store_file(status: &FileStatus) -> bool {
    if status.is_dir {
        return false;
    }
    let Some(name) = file_name(&status.path) else {
        return false;
    };
    if !is_link_name(name) && status.len == 0 {
        log_storefile_warn!(
            "Skipping empty store file, possible data loss",
            path = display(status.path.display())
        );
        return false;
    }
    crate::naming::is_valid_store_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{BlockLocation, LocalFileSystem, OutputStream};
    use crate::hooks::ReaderHook;
    use std::io::{self, Cursor, Read};
    use strata_config::testing::TestLayout;

    fn read_to_string(mut reader: Box<dyn StoreFileReader>) -> String {
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        out
    }

    /// Writes a top reference `1234.parent` in `t1/daughter` to `t1/parent/cf/1234`.
    fn top_reference(env: &TestLayout, fs: &dyn FileSystem) -> PathBuf {
        let path = env
            .family_dir("t1", "daughter", "cf")
            .unwrap()
            .join("1234.parent");
        Reference::top(b"row5".to_vec()).write(fs, &path).unwrap();
        path
    }

    #[test]
    fn test_plain_classification() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .create_store_file("t1", "aaaa", "cf", "1234abcd", b"data")
            .unwrap();

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert_eq!(info.kind(), &StoreFileKind::Plain);
        assert!(!info.is_reference());
        assert!(!info.is_link());
        assert_eq!(info.size(), 4);
        assert!(info.block_distribution().is_none());
        assert_eq!(info.to_string(), path.display().to_string());
    }

    #[test]
    fn test_bulk_loaded_plain_classification() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .create_store_file("t1", "aaaa", "cf", "1234abcd_SeqId_42_", b"data")
            .unwrap();

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert_eq!(info.kind(), &StoreFileKind::Plain);
    }

    #[test]
    fn test_not_a_store_file() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        for name in ["abc-def", ".regioninfo", "1234abcdXYZ"] {
            let path = env
                .create_store_file("t1", "aaaa", "cf", name, b"x")
                .unwrap();
            let err = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap_err();
            match err {
                StoreFileError::NotAStoreFile { path: p } => assert_eq!(p, path),
                other => panic!("unexpected error for {name}: {other}"),
            }
        }
    }

    #[test]
    fn test_link_classification() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .create_empty_file("clone", "cccc", "cf", "t1=aaaa-1234")
            .unwrap();

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert!(info.is_link());
        assert!(!info.is_reference());
        assert_eq!(
            info.link().unwrap().origin_path(),
            env.layout
                .family_dir("default", "t1", "aaaa", "cf")
                .join("1234")
        );
    }

    #[test]
    fn test_reference_to_plain_file() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let target = env
            .create_store_file("t1", "parent", "cf", "1234", b"0123456789")
            .unwrap();
        let path = top_reference(&env, &fs);

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert!(info.is_reference());
        assert!(info.is_top_reference());
        assert!(!info.is_link());
        assert!(info.link().is_none());
        assert_eq!(info.referenced_path(), Some(target.as_path()));
        assert_eq!(
            info.to_string(),
            format!("{}-{}-top", path.display(), target.display())
        );
    }

    #[test]
    fn test_reference_to_link() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .family_dir("clone", "daughter", "cf")
            .unwrap()
            .join("t1=aaaa-1234.parent");
        Reference::bottom(b"k".to_vec()).write(&fs, &path).unwrap();

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert!(info.is_reference());
        assert!(!info.is_link());
        match info.kind() {
            StoreFileKind::Reference { target_link, .. } => {
                let link = target_link.as_ref().unwrap();
                assert_eq!(link.name().table, "t1");
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_reference_with_missing_descriptor_fails() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .family_dir("t1", "daughter", "cf")
            .unwrap()
            .join("1234.parent");
        let status = FileStatus::file(&path, 10, 0);

        let err = StoreFileInfo::new(&env.layout, &fs, status).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_plain_reads_all_and_caches_distribution() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .create_store_file("t1", "aaaa", "cf", "1234", b"hello world")
            .unwrap();
        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();

        let reader = info.open(&fs, &CacheConfig::default()).unwrap();
        assert!(!reader.is_half());
        assert_eq!(read_to_string(reader), "hello world");

        let dist = info.block_distribution().unwrap();
        assert_eq!(dist.unique_blocks_total_weight(), 11);
        assert_eq!(dist.weight("localhost"), 11);
    }

    #[test]
    fn test_open_top_reference_reads_upper_half() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        env.create_store_file("t1", "parent", "cf", "1234", b"0123456789")
            .unwrap();
        let path = top_reference(&env, &fs);
        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();

        let reader = info.open(&fs, &CacheConfig::default()).unwrap();
        assert!(reader.is_half());
        assert_eq!(reader.path(), path.as_path());
        assert_eq!(read_to_string(reader), "56789");

        let dist = info.block_distribution().unwrap();
        assert_eq!(dist.unique_blocks_total_weight(), 10);
    }

    struct Swallowing;

    impl ReaderHook for Swallowing {
        fn name(&self) -> &str {
            "swallowing"
        }

        fn pre_open(
            &self,
            _ctx: &OpenContext<'_>,
            input: &mut Option<InputStream>,
        ) -> Result<Option<Box<dyn StoreFileReader>>> {
            input.take();
            Ok(None)
        }
    }

    /// Supplies a whole-file reader over fixed bytes, ignoring the source
    struct Replacing;

    impl ReaderHook for Replacing {
        fn name(&self) -> &str {
            "replacing"
        }

        fn pre_open(
            &self,
            ctx: &OpenContext<'_>,
            _input: &mut Option<InputStream>,
        ) -> Result<Option<Box<dyn StoreFileReader>>> {
            let data = b"from hook".to_vec();
            let len = data.len() as u64;
            Ok(Some(Box::new(FullFileReader::new(
                ctx.path,
                Box::new(Cursor::new(data)),
                len,
                ctx.cache,
            ))))
        }
    }

    struct Rejecting;

    impl ReaderHook for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn pre_open(
            &self,
            _ctx: &OpenContext<'_>,
            _input: &mut Option<InputStream>,
        ) -> Result<Option<Box<dyn StoreFileReader>>> {
            Err(StoreFileError::Hook {
                hook: self.name().to_string(),
                message: "access denied".to_string(),
            })
        }
    }

    #[test]
    fn test_open_reopens_stream_taken_by_hook() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = env
            .create_store_file("t1", "aaaa", "cf", "1234", b"payload")
            .unwrap();
        let mut info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        info.set_hooks(Arc::new(HookChain::new().with(Arc::new(Swallowing))));

        let reader = info.open(&fs, &CacheConfig::default()).unwrap();
        assert_eq!(read_to_string(reader), "payload");
    }

    #[test]
    fn test_pre_open_hook_replaces_half_reader() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        env.create_store_file("t1", "parent", "cf", "1234", b"0123456789")
            .unwrap();
        let path = top_reference(&env, &fs);
        let mut info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        info.set_hooks(Arc::new(HookChain::new().with(Arc::new(Replacing))));

        let reader = info.open(&fs, &CacheConfig::default()).unwrap();
        assert!(!reader.is_half());
        assert_eq!(reader.path(), path.as_path());
        assert_eq!(read_to_string(reader), "from hook");
        // Locality is still computed before the hook runs
        assert!(info.block_distribution().is_some());
    }

    #[test]
    fn test_failing_pre_open_hook_fails_open() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        env.create_store_file("t1", "parent", "cf", "1234", b"0123456789")
            .unwrap();
        let path = top_reference(&env, &fs);
        let mut info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        info.set_hooks(Arc::new(
            HookChain::new()
                .with(Arc::new(Rejecting))
                .with(Arc::new(Replacing)),
        ));

        let result = info.open(&fs, &CacheConfig::default());
        match result {
            Err(StoreFileError::Hook { hook, .. }) => assert_eq!(hook, "rejecting"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("open succeeded despite a failing hook"),
        }
    }

    #[test]
    fn test_compute_distribution_for_missing_target_is_none() {
        let env = TestLayout::new().unwrap();
        let fs = LocalFileSystem::default();
        let path = top_reference(&env, &fs);

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert!(info.compute_block_distribution(&fs).unwrap().is_none());
        // Opening still reports the missing target
        let result = info.open(&fs, &CacheConfig::default());
        assert!(matches!(result, Err(e) if e.is_not_found()));
    }

    /// Local disk that refuses to stat one path
    struct DenyStatus {
        inner: LocalFileSystem,
        denied: PathBuf,
    }

    impl FileSystem for DenyStatus {
        fn status(&self, path: &Path) -> Result<FileStatus> {
            if path == self.denied {
                return Err(StoreFileError::io(
                    path,
                    io::Error::from(io::ErrorKind::PermissionDenied),
                ));
            }
            self.inner.status(path)
        }

        fn open(&self, path: &Path) -> Result<InputStream> {
            self.inner.open(path)
        }

        fn create(&self, path: &Path) -> Result<OutputStream> {
            self.inner.create(path)
        }

        fn block_locations(
            &self,
            status: &FileStatus,
            offset: u64,
            len: u64,
        ) -> Result<Vec<BlockLocation>> {
            self.inner.block_locations(status, offset, len)
        }
    }

    #[test]
    fn test_compute_distribution_when_target_status_is_denied_is_none() {
        let env = TestLayout::new().unwrap();
        let target = env
            .create_store_file("t1", "parent", "cf", "1234", b"0123456789")
            .unwrap();
        let fs = DenyStatus {
            inner: LocalFileSystem::default(),
            denied: target,
        };
        let path = top_reference(&env, &fs);

        let info = StoreFileInfo::from_path(&env.layout, &fs, &path).unwrap();
        assert!(info.compute_block_distribution(&fs).unwrap().is_none());
    }

    #[test]
    fn test_is_valid_store_file() {
        assert!(!is_valid_store_file(&FileStatus::directory("/t/r/cf", 0)));
        assert!(!is_valid_store_file(&FileStatus::file("/t/r/cf/1234", 0, 0)));
        assert!(is_valid_store_file(&FileStatus::file(
            "/t/r/cf/t1=aaaa-1234",
            0,
            0
        )));
        assert!(is_valid_store_file(&FileStatus::file("/t/r/cf/1234", 10, 0)));
        assert!(!is_valid_store_file(&FileStatus::file(
            "/t/r/cf/abc-def",
            10,
            0
        )));
    }
}
