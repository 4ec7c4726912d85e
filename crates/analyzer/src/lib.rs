//! Path-sensitive, inter-procedural static analysis of dex methods:
//! which fields of which objects a method touches, and therefore what
//! has to travel with it if the method is offloaded off-device.
//!
//! [value] is the abstract-value model the rest of the crate operates
//! over. [config] and [context] hold the knobs and shared state each
//! entry point needs. [interp] decodes one instruction's effect on a
//! [value::MethodAccess]; [path] drives an individual method's
//! worklist of execution paths; [driver] resolves call sites and
//! recurses across methods, memoizing through `offload-persist`;
//! [reachability] runs the simplified whole-program pass.

pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod interp;
pub mod path;
pub mod persist_bridge;
pub mod reachability;
pub mod value;

pub use config::AnalyzerConfig;
pub use context::AnalyzerContext;
pub use errors::AnalyzerError;
pub use persist_bridge::Persistence;
pub use value::{Arena, MethodAccess, NodeId, ObjectAccess};
