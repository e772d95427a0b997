use vdex_extract_dex::leb128::uleb128;

use crate::errors::VdexError;

/// Random-access reader over the v10 quickening section.
///
/// Layout, back to front: the last `4 * number_of_dex_files` bytes are start
/// offsets (from the section begin) of one offset table per dex file. Each
/// table is a run of packed, unaligned `(code_item_offset, data_offset)`
/// u32 pairs sorted by code item offset; `data_offset` points at a
/// uleb128-length-prefixed operand blob earlier in the section.
#[derive(Debug)]
pub struct V10Table<'a> {
    data: &'a [u8],
    starts: Vec<u32>,
}

const ENTRY_SIZE: usize = 8;

#[inline]
fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl<'a> V10Table<'a> {
    /// Parse the trailer of per-dex table starts.
    pub fn parse(data: &'a [u8], number_of_dex_files: usize) -> Result<V10Table<'a>, VdexError> {
        let trailer_off = data
            .len()
            .checked_sub(number_of_dex_files * 4)
            .ok_or(VdexError::QuickeningError)?;

        let mut starts = Vec::with_capacity(number_of_dex_files);
        for idx in 0..number_of_dex_files {
            let start =
                read_u32(data, trailer_off + idx * 4).ok_or(VdexError::QuickeningError)?;
            starts.push(start);
        }

        Ok(V10Table { data, starts })
    }

    /// Byte range of the offset table for dex file `dex_index`.
    ///
    /// Tables are laid out back to back; a table ends where the next one
    /// begins, the last one at the trailer.
    fn table_range(&self, dex_index: usize) -> Result<std::ops::Range<usize>, VdexError> {
        let start = *self
            .starts
            .get(dex_index)
            .ok_or(VdexError::QuickeningError)? as usize;
        let end = match self.starts.get(dex_index + 1) {
            Some(next) => *next as usize,
            None => self.data.len() - self.starts.len() * 4,
        };

        if start > end || end > self.data.len() || (end - start) % ENTRY_SIZE != 0 {
            return Err(VdexError::QuickeningError);
        }

        Ok(start..end)
    }

    /// Look up the operand blob for the code item at `code_off`, binary
    /// searching the sorted per-dex table. `None` means no quickening.
    pub fn blob_for(&self, dex_index: usize, code_off: u32) -> Result<Option<&'a [u8]>, VdexError> {
        let range = self.table_range(dex_index)?;
        let entries = range.len() / ENTRY_SIZE;

        let mut lo = 0usize;
        let mut hi = entries;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry_off = range.start + mid * ENTRY_SIZE;
            let entry_code =
                read_u32(self.data, entry_off).ok_or(VdexError::QuickeningError)?;

            if entry_code == code_off {
                let data_off =
                    read_u32(self.data, entry_off + 4).ok_or(VdexError::QuickeningError)? as usize;

                let mut blob = self
                    .data
                    .get(data_off..)
                    .ok_or(VdexError::QuickeningError)?;
                let length = uleb128(&mut blob).map_err(|_| VdexError::QuickeningError)? as usize;
                let blob = blob.get(..length).ok_or(VdexError::QuickeningError)?;
                return Ok(Some(blob));
            } else if entry_code < code_off {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::build_v10_quickening;

    #[test]
    fn lookup_by_code_offset() {
        let section = build_v10_quickening(&[&[
            (0x100, vec![0x00, 0x2a, 0x00]),
            (0x200, vec![0x01, 0x07, 0x00]),
            (0x300, vec![0x00]),
        ]]);
        let table = V10Table::parse(&section, 1).unwrap();

        assert_eq!(
            table.blob_for(0, 0x200).unwrap(),
            Some(&[0x01, 0x07, 0x00][..])
        );
        assert_eq!(
            table.blob_for(0, 0x100).unwrap(),
            Some(&[0x00, 0x2a, 0x00][..])
        );
        assert_eq!(table.blob_for(0, 0x180).unwrap(), None);
        assert_eq!(table.blob_for(0, 0x400).unwrap(), None);
    }

    #[test]
    fn tables_are_per_dex() {
        let section = build_v10_quickening(&[
            &[(0x40, vec![0x00, 0x11, 0x00])],
            &[(0x40, vec![0x00, 0x22, 0x00])],
        ]);
        let table = V10Table::parse(&section, 2).unwrap();

        assert_eq!(
            table.blob_for(0, 0x40).unwrap(),
            Some(&[0x00, 0x11, 0x00][..])
        );
        assert_eq!(
            table.blob_for(1, 0x40).unwrap(),
            Some(&[0x00, 0x22, 0x00][..])
        );
        assert!(table.blob_for(2, 0x40).is_err());
    }

    #[test]
    fn undersized_section_is_rejected() {
        assert!(matches!(
            V10Table::parse(&[0x00, 0x00], 1),
            Err(VdexError::QuickeningError)
        ));
    }
}
