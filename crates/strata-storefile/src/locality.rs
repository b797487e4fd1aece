//! Block locality of store files.
//!
//! A [`BlockDistribution`] records, per host, how many bytes of a file range
//! that host holds a replica of. It is a scheduling hint only: readers never
//! depend on it for correctness, and "no distribution" is a normal answer.

use std::collections::HashMap;

use serde::Serialize;
use strata_config::log_locality_debug;
use tracing::instrument;

use crate::fs::{FileStatus, FileSystem};
use crate::reference::SplitHalf;
use crate::Result;

/// Host → replicated weight for a byte range of a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockDistribution {
    host_weights: HashMap<String, u64>,
    unique_blocks_total_weight: u64,
}

impl BlockDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one block of `weight` bytes replicated on `hosts`.
    ///
    /// A block with no known hosts still counts towards the total.
    pub fn add_hosts_and_block_weight(&mut self, hosts: &[String], weight: u64) {
        self.unique_blocks_total_weight += weight;
        for host in hosts {
            *self.host_weights.entry(host.clone()).or_insert(0) += weight;
        }
    }

    /// Fold another distribution into this one
    pub fn merge(&mut self, other: &BlockDistribution) {
        for (host, weight) in &other.host_weights {
            *self.host_weights.entry(host.clone()).or_insert(0) += weight;
        }
        self.unique_blocks_total_weight += other.unique_blocks_total_weight;
    }

    /// Bytes of the range held by `host`
    pub fn weight(&self, host: &str) -> u64 {
        self.host_weights.get(host).copied().unwrap_or(0)
    }

    /// Total size of the distinct blocks accounted
    pub fn unique_blocks_total_weight(&self) -> u64 {
        self.unique_blocks_total_weight
    }

    /// Fraction of the range local to `host`, 0.0 when nothing was accounted
    pub fn locality_index(&self, host: &str) -> f32 {
        if self.unique_blocks_total_weight == 0 {
            return 0.0;
        }
        self.weight(host) as f32 / self.unique_blocks_total_weight as f32
    }

    /// Hosts ordered by descending weight (ties by name)
    pub fn top_hosts_with_weights(&self) -> Vec<(String, u64)> {
        let mut hosts: Vec<_> = self
            .host_weights
            .iter()
            .map(|(h, w)| (h.clone(), *w))
            .collect();
        hosts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hosts
    }

    pub fn top_hosts(&self) -> Vec<String> {
        self.top_hosts_with_weights()
            .into_iter()
            .map(|(h, _)| h)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.unique_blocks_total_weight == 0 && self.host_weights.is_empty()
    }
}

/// A `[start, start + length)` byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// The whole of a `len`-byte file
    pub fn whole(len: u64) -> Self {
        Self::new(0, len)
    }

    /// Estimated range of one half of a `len`-byte file.
    ///
    /// The key-space split point of a reference is not known without reading
    /// the file's index, so the file is assumed to split at its byte midpoint:
    /// bottom is `[0, len/2)`, top is `[len/2, len)`.
    pub fn for_half(len: u64, half: SplitHalf) -> Self {
        let mid = len / 2;
        match half {
            SplitHalf::Top => Self::new(mid, len - mid),
            SplitHalf::Bottom => Self::new(0, mid),
        }
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// Block distribution of `[start, start + len)` of a file.
///
/// Every block overlapping the range contributes its full length.
#[instrument(skip(fs, status), fields(path = %status.path.display()), level = "debug")]
pub fn compute_distribution(
    fs: &dyn FileSystem,
    status: &FileStatus,
    start: u64,
    len: u64,
) -> Result<BlockDistribution> {
    let mut distribution = BlockDistribution::new();
    for block in fs.block_locations(status, start, len)? {
        distribution.add_hosts_and_block_weight(&block.hosts, block.length);
    }
    Ok(distribution)
}

/// Estimated block distribution of one half of a referenced file.
///
/// Returns `Ok(None)` when the referenced file's status is unavailable.
pub fn estimate_reference(
    fs: &dyn FileSystem,
    half: SplitHalf,
    status: Option<&FileStatus>,
) -> Result<Option<BlockDistribution>> {
    let Some(status) = status else {
        return Ok(None);
    };
    let range = ByteRange::for_half(status.len, half);
    log_locality_debug!(
        "Estimating reference locality",
        half = half.as_str(),
        start = range.start,
        length = range.length,
    );
    compute_distribution(fs, status, range.start, range.length).map(Some)
}
