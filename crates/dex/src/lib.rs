//! Parsing and linking for the Android dex bytecode container.
//!
//! [`dex`] parses a single dex file's tables (strings, types, protos,
//! fields, methods, class defs, class data, code items). [`link`] resolves
//! references across a loaded classpath (virtual/interface dispatch,
//! subclass and implementer lookups). [`instr`] decodes the Dalvik
//! instruction stream one instruction at a time.

pub mod dex;
pub mod errors;
pub mod instr;
pub mod leb128;
pub mod link;

pub use dex::Dex;
pub use errors::{DexError, LinkError};
