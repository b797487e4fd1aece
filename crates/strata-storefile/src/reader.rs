//! Readers over store file bytes.
//!
//! Decoding the data file's internal block format happens above this layer;
//! a reader here only knows which bytes of which source it may hand out.

use std::io::{self, BufReader, Read, Seek, SeekFrom, Take};
use std::path::{Path, PathBuf};

use strata_config::CacheConfig;

use crate::fs::InputStream;
use crate::locality::ByteRange;
use crate::reference::Reference;
use crate::{Result, StoreFileError};

/// An opened store file
pub trait StoreFileReader: Read + Send {
    /// Path of the store file this reader was opened for (the reference or
    /// link path, not the resolved source)
    fn path(&self) -> &Path;

    /// Length of the resolved source file
    fn length(&self) -> u64;

    /// Bytes of the source this reader exposes
    fn range(&self) -> ByteRange;

    /// Whether this reader covers only one half of a referenced file
    fn is_half(&self) -> bool {
        false
    }

    fn cache_config(&self) -> &CacheConfig;
}

/// Reader over a whole file
pub struct FullFileReader {
    path: PathBuf,
    length: u64,
    cache: CacheConfig,
    input: BufReader<InputStream>,
}

impl FullFileReader {
    pub fn new(path: &Path, input: InputStream, length: u64, cache: &CacheConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            length,
            cache: cache.clone(),
            input: BufReader::with_capacity(cache.read_buffer_size.max(1), input),
        }
    }
}

impl Read for FullFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl StoreFileReader for FullFileReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn range(&self) -> ByteRange {
        ByteRange::whole(self.length)
    }

    fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }
}

/// Reader restricted to the estimated half of a referenced file
pub struct HalfFileReader {
    path: PathBuf,
    length: u64,
    cache: CacheConfig,
    reference: Reference,
    range: ByteRange,
    input: Take<BufReader<InputStream>>,
}

impl HalfFileReader {
    /// Position `input` at the start of the reference's half.
    pub fn new(
        path: &Path,
        mut input: InputStream,
        length: u64,
        cache: &CacheConfig,
        reference: &Reference,
    ) -> Result<Self> {
        let range = ByteRange::for_half(length, reference.half());
        input
            .seek(SeekFrom::Start(range.start))
            .map_err(|e| StoreFileError::io(path, e))?;
        let input =
            BufReader::with_capacity(cache.read_buffer_size.max(1), input).take(range.length);

        Ok(Self {
            path: path.to_path_buf(),
            length,
            cache: cache.clone(),
            reference: reference.clone(),
            range,
            input,
        })
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }
}

impl Read for HalfFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl StoreFileReader for HalfFileReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn range(&self) -> ByteRange {
        self.range
    }

    fn is_half(&self) -> bool {
        true
    }

    fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }
}
