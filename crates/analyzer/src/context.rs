//! `AnalyzerContext` — the single explicit bag of analyzer-wide state
//! (linked classpath, configuration, in-progress call chain, and the
//! in-memory memoization index) passed through every entry point. The
//! original exposes this as process globals; §9 asks for it to be
//! encapsulated instead, with no hidden singletons.

use ahash::AHashMap;

use offload_dex::link::{Linker, MethodId};

use crate::config::AnalyzerConfig;
use crate::errors::AnalyzerError;
use crate::persist_bridge::Persistence;
use crate::value::MethodAccess;

pub struct AnalyzerContext {
    pub linker: Linker,
    pub config: AnalyzerConfig,
    /// Methods currently being analyzed on the active call path, used
    /// by the inter-procedural driver's recursion guard (§4.5 step 4a).
    pub call_chain: Vec<MethodId>,
    /// In-memory cache of already-analyzed methods for this run,
    /// consulted before falling back to on-disk memoization (§4.6).
    pub parsed_method_index: AHashMap<MethodId, MethodAccess>,
    /// On-disk memoization store. `None` for passes that never cross a
    /// process boundary (the global reachability pass, unit tests).
    pub persistence: Option<Persistence>,
}

impl AnalyzerContext {
    pub fn new(linker: Linker, config: AnalyzerConfig) -> AnalyzerContext {
        AnalyzerContext {
            linker,
            config,
            call_chain: Vec::new(),
            parsed_method_index: AHashMap::new(),
            persistence: None,
        }
    }

    /// Opens the on-disk cache at `config.cache_dir` and attaches it.
    pub fn with_persistence(mut self) -> Result<AnalyzerContext, AnalyzerError> {
        self.persistence = Some(Persistence::open(&self.config.cache_dir)?);
        Ok(self)
    }

    pub fn is_on_call_chain(&self, method: MethodId) -> bool {
        self.call_chain.contains(&method)
    }
}
