//! Errors returned by this crate.
//!
//! This module contains the definitions for all error types returned by this crate.

use thiserror::Error;

/// Errors that may occur while parsing or rewriting a dex file.
#[derive(Error, Debug)]
pub enum DexError {
    #[error("got unknown dex version: {0}")]
    UnknownVersion(u16),

    #[error("invalid header")]
    InvalidHeader,

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

    #[error("got error while parsing class_data_item at offset {0:#x}")]
    ClassDataError(u32),

    #[error("got error while parsing code_item at offset {0:#x}")]
    CodeItemError(u32),

    #[error("instruction at unit {unit:#x} overruns code_item of {insns_size:#x} units")]
    InstructionOverrun { unit: usize, insns_size: usize },
}
