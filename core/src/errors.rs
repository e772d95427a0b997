use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vdex_extract_dex::DexError;
use vdex_extract_vdex::VdexError;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Generic I/O error while trying to read or write data
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// Got invalid input (for example, empty file or not a vdex)
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Error occurred while parsing the vdex container
    #[error("got error while parsing vdex container")]
    VdexError(#[from] VdexError),

    /// Error occurred while parsing an embedded dex file
    #[error("got error while parsing dex file")]
    DexError(#[from] DexError),

    /// Sidecar line count disagrees with the container's dex count
    #[error("{loaded} checksums loaded from file, although vdex has {expected} dex entries")]
    ChecksumCountMismatch { loaded: usize, expected: u32 },

    /// Sidecar line that is neither decimal nor 0x-prefixed hex
    #[error("invalid checksum on line {line}: {value:?}")]
    ChecksumParse { line: usize, value: String },

    /// Output already exists and overwriting was not requested
    #[error("output file {0:?} already exists (pass the overwrite flag to replace it)")]
    OutputExists(PathBuf),
}
