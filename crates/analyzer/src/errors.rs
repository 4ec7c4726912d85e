//! Errors returned by this crate.
//!
//! Resolution failures along a single execution path are not modeled
//! here — they terminate that path and the analysis continues on the
//! rest (§7 "the branch is treated as dead code"). [AnalyzerError] is
//! reserved for conditions the original treats as fatal: the process
//! has no sensible way to keep going.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("bootstrap classpath entry could not be opened: {0}")]
    BootstrapUnavailable(String),

    #[error("required primitive class {0} could not be linked")]
    PrimitiveClassMissing(String),

    #[error(transparent)]
    Link(#[from] offload_dex::LinkError),

    #[error(transparent)]
    Dex(#[from] offload_dex::DexError),

    #[error(transparent)]
    Persist(#[from] offload_persist::PersistError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
