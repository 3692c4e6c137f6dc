//! Capability resolution
//!
//! Determines which parameters the connected vehicle supports. The answer is
//! resolved once from the three "supported PIDs" bitmask blocks and cached on
//! disk as one id per line, so later boots skip the queries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::link::{CapabilityBlock, DiagnosticLink, LinkError, ParameterId};

/// Name of the cache file inside the data directory
pub const CACHE_FILE_NAME: &str = "supported.txt";

/// Bits per bitmask block
const BLOCK_BITS: usize = 32;

/// Errors raised while resolving capabilities
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Link error while querying supported parameters: {0}")]
    Link(#[from] LinkError),

    #[error("Failed to write capability cache {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Immutable, ordered set of supported parameter ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    ids: Vec<ParameterId>,
}

impl CapabilitySet {
    /// Build a set from any ids; order and duplicates are normalised
    pub fn from_ids<I: IntoIterator<Item = ParameterId>>(ids: I) -> Self {
        let mut ids: Vec<ParameterId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        Self { ids }
    }

    /// Build a set from concatenated bitmask blocks. Bit `i` (1-indexed)
    /// set means parameter `i` is supported.
    pub fn from_bits(bits: &[bool]) -> Self {
        let ids = bits
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .filter_map(|(i, _)| u8::try_from(i + 1).ok())
            .map(ParameterId);
        Self::from_ids(ids)
    }

    pub fn contains(&self, pid: ParameterId) -> bool {
        self.ids.binary_search(&pid).is_ok()
    }

    pub fn ids(&self) -> &[ParameterId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids formatted as `0xHH`
    pub fn to_strings(&self) -> Vec<String> {
        self.ids.iter().map(|id| id.to_string()).collect()
    }

    /// Parse the newline-delimited cache format; unparsable lines are skipped
    pub fn parse(content: &str) -> Self {
        let ids = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match line.parse::<ParameterId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(line, "ignoring malformed capability cache entry");
                    None
                }
            });
        Self::from_ids(ids)
    }

    /// Serialise to the cache format, one id per line
    pub fn to_cache_string(&self) -> String {
        let mut out = self.to_strings().join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Resolves the capability set, preferring the on-disk cache
#[derive(Debug, Clone)]
pub struct CapabilityResolver {
    cache_path: PathBuf,
}

impl CapabilityResolver {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
        }
    }

    /// Resolver caching into `data_dir/supported.txt`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CACHE_FILE_NAME))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Read the cache; a missing, unreadable or empty cache yields `None`
    pub fn load_cached(&self) -> Option<CapabilitySet> {
        let content = fs::read_to_string(&self.cache_path).ok()?;
        let set = CapabilitySet::parse(&content);
        (!set.is_empty()).then_some(set)
    }

    /// Return the cached set, or query the vehicle and persist the result
    pub fn resolve(&self, link: &mut dyn DiagnosticLink) -> Result<CapabilitySet, CapabilityError> {
        if let Some(set) = self.load_cached() {
            info!(count = set.len(), path = %self.cache_path.display(), "capabilities loaded from cache");
            return Ok(set);
        }

        let set = query_capabilities(link)?;
        info!(count = set.len(), link = %link.describe(), "capabilities queried from vehicle");
        self.store(&set)?;
        Ok(set)
    }

    fn store(&self, set: &CapabilitySet) -> Result<(), CapabilityError> {
        let to_err = |source: io::Error| CapabilityError::Cache {
            path: self.cache_path.clone(),
            source,
        };
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
        fs::write(&self.cache_path, set.to_cache_string()).map_err(to_err)?;
        debug!(path = %self.cache_path.display(), "capability cache written");
        Ok(())
    }
}

/// Query blocks A, B and C and concatenate their bits in order. A block the
/// vehicle does not answer contributes 32 unset bits so later blocks keep
/// their positions.
pub fn query_capabilities(link: &mut dyn DiagnosticLink) -> Result<CapabilitySet, LinkError> {
    let mut bits = Vec::with_capacity(BLOCK_BITS * CapabilityBlock::ALL.len());
    for block in CapabilityBlock::ALL {
        let mut block_bits = link.supported_bitmask(block)?;
        if block_bits.is_empty() {
            debug!(block = ?block, "bitmask block not answered");
        }
        block_bits.resize(BLOCK_BITS, false);
        bits.extend(block_bits);
    }
    Ok(CapabilitySet::from_bits(&bits))
}
