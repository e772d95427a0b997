use winnow::binary::le_u32;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::dispatch::VdexVersion;
use crate::errors::VdexError;

/// 4-byte file magic
pub const VDEX_MAGIC: &[u8; 4] = b"vdex";

/// Fixed header length: magic, version and four u32 section sizes
pub const HEADER_SIZE: usize = 24;

/// One location checksum per embedded dex file
pub const CHECKSUM_SIZE: usize = 4;

/// Byte offset of the `file_size` field inside an embedded dex header
const DEX_FILE_SIZE_OFFSET: usize = 32;

/// Decoded vdex header.
///
/// File layout after it: `checksums[number_of_dex_files]`, the concatenated
/// dex files, the verifier dependencies and the quickening info, in that
/// order, sized by the fields below.
#[derive(Debug, Clone)]
pub struct VdexHeader {
    /// Container format revision
    pub version: VdexVersion,

    /// Raw version bytes, kept for diagnostics
    pub version_raw: [u8; 4],

    /// Count of embedded dex files
    pub number_of_dex_files: u32,

    /// Aggregate byte length of all embedded dex files
    pub dex_size: u32,

    /// Byte length of the verifier dependencies section
    pub verifier_deps_size: u32,

    /// Byte length of the quickening info section
    pub quickening_info_size: u32,
}

/// A validated view over a vdex buffer.
///
/// All returned slices borrow the underlying buffer; nothing is copied until
/// a dex file is handed to the unquickener.
#[derive(Debug)]
pub struct Vdex<'a> {
    data: &'a [u8],
    pub header: VdexHeader,
}

impl<'a> Vdex<'a> {
    /// Validate the header and section layout of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Vdex<'a>, VdexError> {
        if data.len() < HEADER_SIZE {
            return Err(VdexError::Truncated("header"));
        }

        if &data[..4] != VDEX_MAGIC {
            return Err(VdexError::InvalidMagic);
        }

        let mut version_raw = [0u8; 4];
        version_raw.copy_from_slice(&data[4..8]);
        let version = VdexVersion::from_bytes(&version_raw)?;

        let mut input = &data[8..HEADER_SIZE];
        let (number_of_dex_files, dex_size, verifier_deps_size, quickening_info_size) =
            (le_u32, le_u32, le_u32, le_u32)
                .parse_next(&mut input)
                .map_err(|_: ContextError| VdexError::Truncated("header"))?;

        let header = VdexHeader {
            version,
            version_raw,
            number_of_dex_files,
            dex_size,
            verifier_deps_size,
            quickening_info_size,
        };

        // every section is declared up front and they must tile the file exactly
        let expected = HEADER_SIZE as u64
            + number_of_dex_files as u64 * CHECKSUM_SIZE as u64
            + dex_size as u64
            + verifier_deps_size as u64
            + quickening_info_size as u64;
        if expected != data.len() as u64 {
            return Err(VdexError::Truncated("section sizes"));
        }

        Ok(Vdex { data, header })
    }

    /// The raw buffer this view was parsed from
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn dex_begin(&self) -> usize {
        HEADER_SIZE + self.header.number_of_dex_files as usize * CHECKSUM_SIZE
    }

    #[inline]
    pub fn dex_end(&self) -> usize {
        self.dex_begin() + self.header.dex_size as usize
    }

    /// Offset and length of a section within the container
    pub fn section(&self, which: Section) -> (usize, usize) {
        let header = &self.header;
        match which {
            Section::Checksums => (
                HEADER_SIZE,
                header.number_of_dex_files as usize * CHECKSUM_SIZE,
            ),
            Section::DexFiles => (self.dex_begin(), header.dex_size as usize),
            Section::VerifierDeps => (self.dex_end(), header.verifier_deps_size as usize),
            Section::QuickeningInfo => (
                self.dex_end() + header.verifier_deps_size as usize,
                header.quickening_info_size as usize,
            ),
        }
    }

    /// The verifier dependencies section
    pub fn deps_data(&self) -> &'a [u8] {
        let (offset, length) = self.section(Section::VerifierDeps);
        &self.data[offset..offset + length]
    }

    /// The quickening info section
    pub fn quickening_data(&self) -> &'a [u8] {
        let (offset, length) = self.section(Section::QuickeningInfo);
        &self.data[offset..offset + length]
    }

    /// Location checksum of dex file `idx`, `None` when out of range
    pub fn location_checksum(&self, idx: usize) -> Option<u32> {
        if idx >= self.header.number_of_dex_files as usize {
            return None;
        }
        let off = HEADER_SIZE + idx * CHECKSUM_SIZE;
        let bytes = self.data.get(off..off + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Iterate over the embedded dex files, each self-delimited by its own
    /// `file_size` header field.
    pub fn dex_files(&self) -> DexFileIter<'a> {
        DexFileIter {
            data: self.data,
            cursor: self.dex_begin(),
            end: self.dex_end(),
            index: 0,
        }
    }

    /// Trace the header the way the original extractor dumps it.
    pub fn log_header(&self) {
        let header = &self.header;
        log::debug!("------ vdex header info ------");
        log::debug!(
            "magic & version             : vdex-{}",
            String::from_utf8_lossy(&header.version_raw[..3])
        );
        log::debug!(
            "number of dex files         : {0:#x} ({0})",
            header.number_of_dex_files
        );
        log::debug!("dex size (overall)          : {0:#x} ({0})", header.dex_size);
        log::debug!(
            "verifier dependencies size  : {0:#x} ({0})",
            header.verifier_deps_size
        );
        log::debug!(
            "verifier dependencies offset: {0:#x} ({0})",
            self.dex_end()
        );
        log::debug!(
            "quickening info size        : {0:#x} ({0})",
            header.quickening_info_size
        );
        log::debug!(
            "quickening info offset      : {0:#x} ({0})",
            self.dex_end() + header.verifier_deps_size as usize
        );
        for idx in 0..header.number_of_dex_files as usize {
            let checksum = self.location_checksum(idx).unwrap_or(0);
            log::debug!("  [{}] location checksum : {1:#x} ({1})", idx, checksum);
        }
    }
}

/// The four regions following the header, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Checksums,
    DexFiles,
    VerifierDeps,
    QuickeningInfo,
}

/// Overwrite the location checksum of dex file `idx` in a writable container.
pub fn set_location_checksum(data: &mut [u8], idx: usize, value: u32) -> Result<(), VdexError> {
    let off = HEADER_SIZE + idx * CHECKSUM_SIZE;
    let slot = data
        .get_mut(off..off + 4)
        .ok_or(VdexError::Truncated("checksum table"))?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// A single embedded dex file
#[derive(Debug)]
pub struct DexSlice<'a> {
    /// Ordinal within the container, 0-based
    pub index: usize,

    /// Byte offset within the container
    pub offset: usize,

    /// The dex file bytes
    pub data: &'a [u8],
}

/// Lazy walk over the dex section, one header read per step.
///
/// The iterator fuses after the first error; a well-formed section ends with
/// the last slice flush against the verifier dependencies.
#[derive(Debug)]
pub struct DexFileIter<'a> {
    data: &'a [u8],
    cursor: usize,
    end: usize,
    index: usize,
}

impl<'a> Iterator for DexFileIter<'a> {
    type Item = Result<DexSlice<'a>, VdexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        let size_off = self.cursor + DEX_FILE_SIZE_OFFSET;
        let Some(bytes) = self.data.get(size_off..size_off + 4) else {
            self.cursor = self.end;
            return Some(Err(VdexError::TruncatedDex(self.index)));
        };
        let file_size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

        let next = self.cursor + file_size;
        if file_size < 0x70 || next > self.end {
            log::error!(
                "dex file #{} at offset {:#x} declares {} bytes, section ends at {:#x}",
                self.index,
                self.cursor,
                file_size,
                self.end
            );
            self.cursor = self.end;
            return Some(Err(VdexError::TruncatedDex(self.index)));
        }

        let slice = DexSlice {
            index: self.index,
            offset: self.cursor,
            data: &self.data[self.cursor..next],
        };

        log::debug!(
            "processing dex file #{} at offset {:#x} ({} bytes)",
            self.index,
            self.cursor,
            file_size
        );

        self.cursor = next;
        self.index += 1;
        Some(Ok(slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{build_vdex, V10, V6};
    use vdex_extract_dex::test_fixtures::build_test_dex;

    #[test]
    fn header_invariant_holds() {
        let dex = build_test_dex();
        let data = build_vdex(V6, &[dex.clone()], &[0xA], &[], &[]);

        let vdex = Vdex::parse(&data).unwrap();
        assert_eq!(vdex.header.number_of_dex_files, 1);
        assert_eq!(vdex.header.dex_size as usize, dex.len());
        assert_eq!(vdex.dex_end(), data.len());
        assert_eq!(vdex.location_checksum(0), Some(0xA));
        assert_eq!(vdex.location_checksum(1), None);

        // sections tile the file exactly
        let (checksums_off, checksums_len) = vdex.section(Section::Checksums);
        let (dex_off, dex_len) = vdex.section(Section::DexFiles);
        let (deps_off, deps_len) = vdex.section(Section::VerifierDeps);
        let (quick_off, quick_len) = vdex.section(Section::QuickeningInfo);
        assert_eq!(checksums_off, HEADER_SIZE);
        assert_eq!(checksums_off + checksums_len, dex_off);
        assert_eq!(dex_off + dex_len, deps_off);
        assert_eq!(deps_off + deps_len, quick_off);
        assert_eq!(quick_off + quick_len, data.len());
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let data = build_vdex(V10, &[build_test_dex()], &[0], &[], &[]);

        let mut bad_magic = data.clone();
        bad_magic[0] = b'x';
        assert!(matches!(
            Vdex::parse(&bad_magic),
            Err(VdexError::InvalidMagic)
        ));

        let mut bad_version = data.clone();
        bad_version[4..8].copy_from_slice(b"019\0");
        assert!(matches!(
            Vdex::parse(&bad_version),
            Err(VdexError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn rejects_section_sum_mismatch() {
        let mut data = build_vdex(V6, &[build_test_dex()], &[0], &[], &[]);
        data.push(0);
        assert!(matches!(
            Vdex::parse(&data),
            Err(VdexError::Truncated(_))
        ));
    }

    #[test]
    fn dex_iteration_is_exact() {
        let one = build_test_dex();
        let two = build_test_dex();
        let data = build_vdex(V10, &[one.clone(), two.clone()], &[1, 2], &[], &[]);

        let vdex = Vdex::parse(&data).unwrap();
        let slices: Vec<_> = vdex.dex_files().collect::<Result<_, _>>().unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].data, &one[..]);
        assert_eq!(slices[1].data, &two[..]);
        assert_eq!(slices[1].offset + slices[1].data.len(), vdex.dex_end());
    }

    #[test]
    fn dex_overrun_is_truncated() {
        let dex = build_test_dex();
        let mut data = build_vdex(V10, &[dex.clone()], &[1], &[], &[]);

        // inflate the embedded dex's own file_size past the section end
        let size_off = HEADER_SIZE + CHECKSUM_SIZE + 32;
        data[size_off..size_off + 4].copy_from_slice(&(dex.len() as u32 + 8).to_le_bytes());

        let vdex = Vdex::parse(&data).unwrap();
        let mut iter = vdex.dex_files();
        assert!(matches!(iter.next(), Some(Err(VdexError::TruncatedDex(0)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn checksum_rewrite_in_place() {
        let data = build_vdex(V6, &[build_test_dex()], &[0xAB], &[], &[]);
        let mut out = data.clone();
        set_location_checksum(&mut out, 0, 0x11111111).unwrap();

        assert_eq!(&out[HEADER_SIZE..HEADER_SIZE + 4], &[0x11, 0x11, 0x11, 0x11]);
        // everything else untouched
        assert_eq!(&out[..HEADER_SIZE], &data[..HEADER_SIZE]);
        assert_eq!(&out[HEADER_SIZE + 4..], &data[HEADER_SIZE + 4..]);
    }
}
