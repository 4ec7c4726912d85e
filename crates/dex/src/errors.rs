//! Errors returned by this crate.
//!
//! This module contains the definitions for all error types returned by this crate.

use thiserror::Error;

/// Errors that may occur while parsing a dex file.
#[derive(Error, Debug)]
pub enum DexError {
    #[error("got unknown dex version: {0}")]
    UnknownVersion(u16),

    #[error("invalid header")]
    InvalidHeader,

    #[error("header checksum mismatch")]
    ChecksumMismatch,

    #[error("got error while parsing string_ids")]
    StringError,

    #[error("got error while parsing type_ids")]
    TypeError,

    #[error("got error while parsing proto_ids")]
    ProtoError,

    #[error("got error while parsing field_ids")]
    FieldError,

    #[error("got error while parsing method_ids")]
    MethodError,

    #[error("got error while parsing class_defs")]
    ClassError,

    #[error("got error while parsing a type_list")]
    TypeListError,

    #[error("got error while parsing a class_data_item")]
    ClassDataError,

    #[error("got error while parsing a code_item")]
    CodeItemError,

    #[error("got error while parsing an instruction stream")]
    InstructionError,

    #[error("got unknown type item: {0}")]
    UnknownTypeItem(u16),

    #[error("got error while parsing map_list")]
    MapListError,

    #[error("leb128 value overflowed")]
    Leb128Overflow,
}

/// Errors raised while linking (resolving classes/methods/fields across a
/// loaded classpath).
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("method not found: {class}->{name} in {method_idx}")]
    MethodNotFound { class: String, name: String, method_idx: u32 },

    #[error("instance field not found: field_idx {0}")]
    InstanceFieldNotFound(u32),

    #[error("static field not found: field_idx {0}")]
    StaticFieldNotFound(u32),

    #[error("interface method resolution failed for method_idx {0}")]
    InterfaceMethodNotFound(u32),

    #[error("classpath entry could not be opened: {0}")]
    ClasspathUnreadable(String),

    #[error(transparent)]
    Dex(#[from] DexError),
}
