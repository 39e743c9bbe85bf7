//! Deterministic shard partitioning.
//!
//! Every batch stage splits its ordered work list the same way, so
//! independent workers agree on ownership without talking to each other.
//! Shard `r` of `n` over `total` items owns the contiguous index range
//! `[r * ceil(total / n), min(total, (r + 1) * ceil(total / n)))`.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::output::write_atomic;

/// Invalid shard configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("nshard must be at least 1")]
    ZeroShards,

    #[error("rank {rank} is out of range for {nshard} shards")]
    RankOutOfRange { rank: usize, nshard: usize },
}

/// Contiguous index range owned by `rank` out of `nshard` over `total` items.
///
/// Ranks past the end of the list get an empty range.
pub fn partition(total: usize, rank: usize, nshard: usize) -> Range<usize> {
    if nshard == 0 {
        return 0..0;
    }
    let per_shard = total.div_ceil(nshard);
    let start = rank.saturating_mul(per_shard).min(total);
    let end = rank
        .saturating_add(1)
        .saturating_mul(per_shard)
        .min(total);
    start..end
}

/// Identity of one worker: `(rank, nshard)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardSpec {
    rank: usize,
    nshard: usize,
}

impl ShardSpec {
    /// Validate and create a shard spec.
    pub fn new(rank: usize, nshard: usize) -> Result<Self, PartitionError> {
        if nshard == 0 {
            return Err(PartitionError::ZeroShards);
        }
        if rank >= nshard {
            return Err(PartitionError::RankOutOfRange { rank, nshard });
        }
        Ok(Self { rank, nshard })
    }

    /// The single-shard spec `(0, 1)`.
    pub fn single() -> Self {
        Self { rank: 0, nshard: 1 }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn nshard(&self) -> usize {
        self.nshard
    }

    /// Contiguous range this shard owns.
    pub fn range(&self, total: usize) -> Range<usize> {
        partition(total, self.rank, self.nshard)
    }

    /// Assignment record for `total` items.
    pub fn assign(&self, total: usize) -> ShardAssignment {
        ShardAssignment {
            rank: self.rank,
            nshard: self.nshard,
            range: self.range(total),
        }
    }

    /// Items this shard owns, in input order.
    pub fn select<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }

    /// Per-rank file name: `name.<rank>`.
    pub fn suffixed(&self, name: &str) -> String {
        format!("{}.{}", name, self.rank)
    }

    /// Human readable label: `shard-<rank>-of-<nshard>`.
    pub fn label(&self) -> String {
        format!("shard-{}-of-{}", self.rank, self.nshard)
    }
}

impl std::fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.rank, self.nshard)
    }
}

/// Range of the global work list owned by one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardAssignment {
    pub rank: usize,
    pub nshard: usize,
    pub range: Range<usize>,
}

impl ShardAssignment {
    /// Number of items owned.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the shard owns nothing.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Errors from merging per-rank files.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("missing shard file: {0}")]
    MissingShard(PathBuf),

    #[error("nshard must be at least 1")]
    ZeroShards,

    #[error("I/O error while merging {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Concatenate `dir/name.<rank>` for every rank into `dir/name`.
///
/// All rank files must exist. The merged file is written atomically.
/// Returns the number of lines in the merged file.
pub fn merge_shard_files(dir: &Path, name: &str, nshard: usize) -> Result<usize, MergeError> {
    if nshard == 0 {
        return Err(MergeError::ZeroShards);
    }

    let mut merged = String::new();
    let mut lines = 0;
    for rank in 0..nshard {
        let path = dir.join(format!("{}.{}", name, rank));
        if !path.is_file() {
            return Err(MergeError::MissingShard(path));
        }
        let content = fs::read_to_string(&path).map_err(|source| MergeError::Io {
            path: path.clone(),
            source,
        })?;
        for line in content.lines() {
            merged.push_str(line);
            merged.push('\n');
            lines += 1;
        }
    }

    let target = dir.join(name);
    write_atomic(&target, merged.as_bytes()).map_err(|source| MergeError::Io {
        path: target.clone(),
        source,
    })?;

    tracing::info!(
        "[Shard] Merged {} shards of '{}' ({} lines)",
        nshard,
        name,
        lines
    );
    Ok(lines)
}
