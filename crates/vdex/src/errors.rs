//! Errors returned by this crate.
//!
//! This module contains the definitions for all error types returned by this crate.

use thiserror::Error;
use vdex_extract_dex::DexError;

/// Errors that may occur while parsing a vdex container or reverting its
/// quickened bytecode.
#[derive(Error, Debug)]
pub enum VdexError {
    #[error("invalid vdex magic")]
    InvalidMagic,

    #[error("unsupported vdex version: {0:?}")]
    UnsupportedVersion(String),

    #[error("truncated container: {0}")]
    Truncated(&'static str),

    #[error("dex file #{0} overruns the dex section")]
    TruncatedDex(usize),

    #[error("got error while parsing quickening info")]
    QuickeningError,

    #[error("quickening data exhausted at code item {code_off:#x}")]
    TruncatedQuickening { code_off: u32 },

    #[error("got error while parsing verifier dependencies")]
    DepsError,

    #[error("verifier dependencies consumed {consumed} bytes, section declares {declared}")]
    DepsSizeMismatch { consumed: usize, declared: usize },

    #[error(transparent)]
    Dex(#[from] DexError),
}
