use winnow::binary::{le_u16, le_u32};
use winnow::prelude::*;

use crate::dex::Dex;
use crate::errors::DexError;

/// Size of the fixed `code_item` header preceding the instruction stream.
pub const CODE_ITEM_HEADER_SIZE: u32 = 16;

/// Decoded `code_item` header.
///
/// The instruction stream itself stays in the file buffer; `insns_off` points
/// at its first byte so the rewriter can address it in place.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#code-item>
#[derive(Debug)]
pub struct CodeItem {
    /// Number of registers used by this code
    pub registers_size: u16,

    /// Number of words of incoming arguments
    pub ins_size: u16,

    /// Number of words of outgoing argument space
    pub outs_size: u16,

    /// Number of try items
    pub tries_size: u16,

    /// Offset to the debug info sequence, 0 if absent
    pub debug_info_off: u32,

    /// Instruction stream length in 16-bit code units
    pub insns_size: u32,

    /// Byte offset of the instruction stream within the file
    pub insns_off: u32,
}

impl CodeItem {
    /// Parse the `code_item` header at `offset` inside `dex`.
    pub fn parse(dex: &Dex, offset: u32) -> Result<CodeItem, DexError> {
        let mut input = dex
            .data()
            .get(offset as usize..)
            .ok_or(DexError::CodeItemError(offset))?;

        let (registers_size, ins_size, outs_size, tries_size, debug_info_off, insns_size) =
            (le_u16, le_u16, le_u16, le_u16, le_u32, le_u32)
                .parse_next(&mut input)
                .map_err(|_: winnow::error::ContextError| DexError::CodeItemError(offset))?;

        let insns_off = offset + CODE_ITEM_HEADER_SIZE;
        let insns_end = insns_off as usize + insns_size as usize * 2;
        if insns_end > dex.data().len() {
            return Err(DexError::CodeItemError(offset));
        }

        Ok(CodeItem {
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns_size,
            insns_off,
        })
    }

    /// The instruction stream as a byte range within the file
    #[inline]
    pub fn insns_range(&self) -> std::ops::Range<usize> {
        let start = self.insns_off as usize;
        start..start + self.insns_size as usize * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::Dex;
    use crate::test_fixtures::build_dex_with_insns;

    #[test]
    fn parse_code_item() {
        let (data, code_off) = build_dex_with_insns(&[0x000e]);
        let dex = Dex::new(data).unwrap();

        let code = CodeItem::parse(&dex, code_off).unwrap();
        assert_eq!(code.registers_size, 2);
        assert_eq!(code.insns_size, 1);
        assert_eq!(code.insns_off, code_off + CODE_ITEM_HEADER_SIZE);
        assert_eq!(&dex.data()[code.insns_range()], &[0x0e, 0x00]);
    }

    #[test]
    fn truncated_insns_are_rejected() {
        let (mut data, code_off) = build_dex_with_insns(&[0x000e]);
        // inflate the declared instruction count past the end of the file
        let insns_size_off = code_off as usize + 12;
        data[insns_size_off..insns_size_off + 4].copy_from_slice(&0x1000_0000u32.to_le_bytes());
        let dex = Dex::new(data).unwrap();

        assert!(matches!(
            CodeItem::parse(&dex, code_off),
            Err(DexError::CodeItemError(_))
        ));
    }
}
