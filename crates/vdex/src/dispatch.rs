use crate::container::Vdex;
use crate::deps::{self, VerifierDeps};
use crate::errors::VdexError;
use crate::quicken::v6::V6Stream;
use crate::quicken::v10::V10Table;
use crate::quicken::QuickeningInfo;

/// Supported container format revisions.
///
/// Version 006 shipped with Android O, version 010 with O-MR1. The two differ
/// in how quickening info is laid out; anything else is rejected up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdexVersion {
    V6,
    V10,
}

impl VdexVersion {
    /// Parse the NUL-terminated ascii decimal version field, e.g. `b"006\0"`.
    pub fn from_bytes(raw: &[u8; 4]) -> Result<VdexVersion, VdexError> {
        let unsupported = || VdexError::UnsupportedVersion(
            String::from_utf8_lossy(&raw[..3]).into_owned(),
        );

        if raw[3] != 0 {
            return Err(unsupported());
        }

        let text = std::str::from_utf8(&raw[..3]).map_err(|_| unsupported())?;
        match text.parse::<u32>() {
            Ok(6) => Ok(VdexVersion::V6),
            Ok(10) => Ok(VdexVersion::V10),
            _ => Err(unsupported()),
        }
    }

    pub const fn number(self) -> u32 {
        match self {
            VdexVersion::V6 => 6,
            VdexVersion::V10 => 10,
        }
    }
}

/// Per-file binding of the version-specific readers.
///
/// Bound once per container right after validation and dropped with the file;
/// there is no state shared across files.
#[derive(Debug)]
pub struct Backend {
    pub version: VdexVersion,
}

impl Backend {
    pub fn new(version: VdexVersion) -> Backend {
        log::debug!("vdex backend bound to version {:03}", version.number());
        Backend { version }
    }

    /// Build the quickening index over the container's quickening section.
    pub fn quickening_index<'a>(&self, vdex: &Vdex<'a>) -> Result<QuickeningInfo<'a>, VdexError> {
        let data = vdex.quickening_data();
        if data.is_empty() {
            return Ok(QuickeningInfo::Empty);
        }

        match self.version {
            VdexVersion::V6 => Ok(QuickeningInfo::V6(V6Stream::new(data))),
            VdexVersion::V10 => Ok(QuickeningInfo::V10(V10Table::parse(
                data,
                vdex.header.number_of_dex_files as usize,
            )?)),
        }
    }

    /// Decode the verifier dependencies section.
    ///
    /// Both revisions serialize dependencies the same way; the binding exists
    /// so a future revision can diverge without touching callers.
    pub fn decode_deps(&self, vdex: &Vdex<'_>) -> Result<VerifierDeps, VdexError> {
        deps::decode(
            vdex.deps_data(),
            vdex.header.number_of_dex_files as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!(VdexVersion::from_bytes(b"006\0").unwrap(), VdexVersion::V6);
        assert_eq!(VdexVersion::from_bytes(b"010\0").unwrap(), VdexVersion::V10);
    }

    #[test]
    fn unknown_versions_are_fatal_for_the_file() {
        for raw in [b"019\0", b"011\0", b"abc\0", b"0100"] {
            assert!(matches!(
                VdexVersion::from_bytes(raw),
                Err(VdexError::UnsupportedVersion(_))
            ));
        }
    }
}
