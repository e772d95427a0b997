//! Version-specific readers for the quickening info section.
//!
//! The two revisions store the same payload (a 16-bit operand per quickened
//! instruction) behind very different access patterns: v6 is a sequential
//! stream consumed in code-item traversal order, v10 a random-access offset
//! table. Both answer the same question - "operands for the code item at
//! offset O" - through [QuickeningInfo::operands_for].

pub mod v6;
pub mod v10;

use vdex_extract_dex::leb128::uleb128;

use crate::errors::VdexError;

/// The per-file quickening index, bound by the version dispatcher.
#[derive(Debug)]
pub enum QuickeningInfo<'a> {
    /// The container declares no quickening info at all
    Empty,
    V6(v6::V6Stream<'a>),
    V10(v10::V10Table<'a>),
}

impl<'a> QuickeningInfo<'a> {
    /// Operand stream for the code item at `code_off` of dex file `dex_index`.
    ///
    /// Callers must request code items in canonical traversal order: the v6
    /// stream is positional and consumes one entry per call while it lasts.
    /// `None` means the code item has no quickening.
    pub fn operands_for(
        &mut self,
        dex_index: usize,
        code_off: u32,
    ) -> Result<Option<OperandStream<'a>>, VdexError> {
        match self {
            QuickeningInfo::Empty => Ok(None),
            QuickeningInfo::V6(stream) => Ok(stream.next_blob()?.map(OperandStream::v6)),
            QuickeningInfo::V10(table) => match table.blob_for(dex_index, code_off)? {
                Some(blob) => Ok(Some(OperandStream::v10(blob)?)),
                None => Ok(None),
            },
        }
    }
}

/// An ordered sequence of 16-bit operands for one code item.
#[derive(Debug)]
pub struct OperandStream<'a> {
    data: &'a [u8],

    /// How many nops in this code item are former check-casts.
    ///
    /// v10 blobs declare the count up front; v6 carries no such count and
    /// never reverts nops.
    nop_budget: u64,
}

impl<'a> OperandStream<'a> {
    fn v6(data: &'a [u8]) -> OperandStream<'a> {
        OperandStream {
            data,
            nop_budget: 0,
        }
    }

    fn v10(mut data: &'a [u8]) -> Result<OperandStream<'a>, VdexError> {
        let nop_budget = uleb128(&mut data).map_err(|_| VdexError::QuickeningError)?;
        Ok(OperandStream { data, nop_budget })
    }

    /// Consume the next operand, `None` once the blob is exhausted
    pub fn next_operand(&mut self) -> Option<u16> {
        let (bytes, rest) = self.data.split_first_chunk::<2>()?;
        self.data = rest;
        Some(u16::from_le_bytes(*bytes))
    }

    /// Claim one unit of the check-cast budget; false when none is left
    pub fn take_nop_budget(&mut self) -> bool {
        if self.nop_budget > 0 {
            self.nop_budget -= 1;
            true
        } else {
            false
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v6_streams_have_no_nop_budget() {
        let mut ops = OperandStream::v6(&[0x2a, 0x00, 0x07, 0x00]);
        assert!(!ops.take_nop_budget());
        assert_eq!(ops.next_operand(), Some(0x002a));
        assert_eq!(ops.next_operand(), Some(0x0007));
        assert_eq!(ops.next_operand(), None);
    }

    #[test]
    fn v10_blob_declares_its_budget() {
        // uleb128 2, then two operands
        let mut ops = OperandStream::v10(&[0x02, 0x07, 0x00, 0x08, 0x00]).unwrap();
        assert!(ops.take_nop_budget());
        assert!(ops.take_nop_budget());
        assert!(!ops.take_nop_budget());
        assert_eq!(ops.next_operand(), Some(0x0007));
        assert_eq!(ops.remaining(), 2);
    }

    #[test]
    fn odd_tail_yields_no_operand() {
        let mut ops = OperandStream::v6(&[0x2a]);
        assert_eq!(ops.next_operand(), None);
        assert_eq!(ops.remaining(), 1);
    }
}
