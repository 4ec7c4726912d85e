//! Analyzer-wide knobs, gathered once at startup and threaded through
//! [crate::context::AnalyzerContext] — no hidden globals (§9).

use std::path::PathBuf;

/// Join-chain depth beyond which a method's arguments are widened
/// wholesale and analysis of that method stops (§4.4 `MaxBranchDepth`).
/// Not numerically specified by the original; chosen generously enough
/// that realistic methods never hit it while still bounding pathological
/// ones.
pub const DEFAULT_MAX_BRANCH_DEPTH: usize = 64;

/// Receiver-set size beyond which a virtual/interface call site widens
/// instead of enumerating dispatch targets (§4.4 `MaxSubCount`).
pub const DEFAULT_MAX_SUB_COUNT: usize = 32;

/// Environment variable naming the base directory for on-disk artifacts
/// (§6). Defaults to `/data/data` when unset, matching the original's
/// hard-coded Android path.
pub const PARSE_CACHE_ENV: &str = "OFFLOAD_PARSE_CACHE";

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub max_branch_depth: usize,
    pub max_sub_count: usize,
    pub cache_dir: PathBuf,
}

impl AnalyzerConfig {
    pub fn new(cache_dir: PathBuf) -> AnalyzerConfig {
        AnalyzerConfig {
            max_branch_depth: DEFAULT_MAX_BRANCH_DEPTH,
            max_sub_count: DEFAULT_MAX_SUB_COUNT,
            cache_dir,
        }
    }

    /// Reads [PARSE_CACHE_ENV], falling back to `/data/data`.
    pub fn from_env() -> AnalyzerConfig {
        let cache_dir = std::env::var_os(PARSE_CACHE_ENV).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/data/data"));
        AnalyzerConfig::new(cache_dir)
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig::new(PathBuf::from("/data/data"))
    }
}
