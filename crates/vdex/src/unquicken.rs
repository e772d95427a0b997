//! In-place reversal of quickened dalvik bytecode.
//!
//! The walk mirrors the compiler's: class defs in file order, direct then
//! virtual methods, every code item scanned linearly with the operand stream
//! consumed alongside the instruction stream. Every substitution preserves the
//! instruction width, so code item lengths never change.

use vdex_extract_dex::class_data::ClassData;
use vdex_extract_dex::code::CodeItem;
use vdex_extract_dex::dex::Dex;
use vdex_extract_dex::insns;

use crate::errors::VdexError;
use crate::quicken::{OperandStream, QuickeningInfo};

const NOP: u8 = 0x00;
const CHECK_CAST: u8 = 0x1f;
const RETURN_VOID_NO_BARRIER: u8 = 0x73;

/// Revert every quickened instruction of `dex` in place.
///
/// Returns the number of rewritten instructions; 0 means the emitted file can
/// keep its original checksum.
pub fn unquicken_dex(
    dex: &mut Dex,
    info: &mut QuickeningInfo<'_>,
    dex_index: usize,
) -> Result<usize, VdexError> {
    // canonical code item order, collected first so the buffer can be mutated
    let mut code_offsets = Vec::new();
    for class in &dex.class_defs {
        if class.class_data_off == 0 {
            continue;
        }
        let class_data = ClassData::parse(dex, class.class_data_off)?;
        for method in class_data.methods() {
            if method.code_off != 0 {
                code_offsets.push(method.code_off);
            }
        }
    }

    let mut rewritten = 0;
    for code_off in code_offsets {
        let code = CodeItem::parse(dex, code_off)?;

        let Some(mut ops) = info.operands_for(dex_index, code_off)? else {
            continue;
        };

        rewritten += unquicken_code_item(dex, &code, &mut ops, code_off)?;

        if ops.remaining() > 0 {
            log::warn!(
                "code item {:#x}: {} quickening bytes left unconsumed",
                code_off,
                ops.remaining()
            );
        }
    }

    Ok(rewritten)
}

fn unquicken_code_item(
    dex: &mut Dex,
    code: &CodeItem,
    ops: &mut OperandStream<'_>,
    code_off: u32,
) -> Result<usize, VdexError> {
    let insns_size = code.insns_size as usize;
    let base = code.insns_off as usize;

    let mut rewritten = 0;
    let mut unit = 0;
    while unit < insns_size {
        let byte_off = base + unit * 2;
        let opcode = dex.data()[byte_off];
        let high = dex.data()[byte_off + 1];
        let width = insns::insn_units(&dex.data()[code.insns_range()], unit)?;

        // statically provable check-casts were compiled down to a pair of
        // nops; the blob's budget says how many to restore, in order
        if opcode == NOP && high == 0x00 && ops.take_nop_budget() {
            let type_idx = ops
                .next_operand()
                .ok_or(VdexError::TruncatedQuickening { code_off })?;
            if unit + 2 > insns_size {
                return Err(VdexError::TruncatedQuickening { code_off });
            }

            let data = dex.data_mut();
            data[byte_off] = CHECK_CAST;
            data[byte_off + 2..byte_off + 4].copy_from_slice(&type_idx.to_le_bytes());

            rewritten += 1;
            unit += 2;
            continue;
        }

        if let Some(reverted) = insns::unquickened_opcode(opcode) {
            let operand = if opcode == RETURN_VOID_NO_BARRIER {
                None
            } else {
                Some(
                    ops.next_operand()
                        .ok_or(VdexError::TruncatedQuickening { code_off })?,
                )
            };

            let data = dex.data_mut();
            data[byte_off] = reverted;
            if let Some(operand) = operand {
                data[byte_off + 2..byte_off + 4].copy_from_slice(&operand.to_le_bytes());
            }

            rewritten += 1;
        }

        unit += width;
    }

    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Vdex;
    use crate::dispatch::Backend;
    use crate::test_fixtures::{build_v6_quickening, build_v10_quickening, build_vdex, V10, V6};
    use vdex_extract_dex::test_fixtures::build_dex_with_insns;

    fn unquickened_bytes(
        version: &[u8; 4],
        insns: &[u16],
        quickening: impl Fn(u32) -> Vec<u8>,
    ) -> (Vec<u8>, u32, usize) {
        let (dex_bytes, code_off) = build_dex_with_insns(insns);
        let section = quickening(code_off);
        let data = build_vdex(version, &[dex_bytes], &[0], &[], &section);

        let vdex = Vdex::parse(&data).unwrap();
        let backend = Backend::new(vdex.header.version);
        let mut info = backend.quickening_index(&vdex).unwrap();

        let slice = vdex.dex_files().next().unwrap().unwrap();
        let mut dex = Dex::new(slice.data.to_vec()).unwrap();
        let rewritten = unquicken_dex(&mut dex, &mut info, 0).unwrap();
        (dex.data().to_vec(), code_off, rewritten)
    }

    #[test]
    fn v10_iget_quick_reverts_to_iget() {
        // iget-quick v0, v1, [obj+0x0004] ; return-void
        let insns = [0x10e3, 0x0004, 0x000e];
        let (out, code_off, rewritten) = unquickened_bytes(V10, &insns, |code_off| {
            build_v10_quickening(&[&[(code_off, vec![0x00, 0x2a, 0x00])]])
        });

        assert_eq!(rewritten, 1);
        let insns_base = code_off as usize + 16;
        assert_eq!(out[insns_base], 0x52); // iget
        assert_eq!(out[insns_base + 1], 0x10); // registers untouched
        assert_eq!(&out[insns_base + 2..insns_base + 4], &[0x2a, 0x00]); // field@0x002a
        assert_eq!(out[insns_base + 4], 0x0e); // trailing return-void untouched
    }

    #[test]
    fn v10_check_cast_restores_budgeted_nops_only() {
        // nop pair (a compiled-out check-cast), a plain nop, return-void
        let insns = [0x0000, 0x0000, 0x0000, 0x000e];
        let (out, code_off, rewritten) = unquickened_bytes(V10, &insns, |code_off| {
            build_v10_quickening(&[&[(code_off, vec![0x01, 0x07, 0x00])]])
        });

        assert_eq!(rewritten, 1);
        let insns_base = code_off as usize + 16;
        assert_eq!(out[insns_base], 0x1f); // check-cast v0
        assert_eq!(out[insns_base + 1], 0x00);
        assert_eq!(&out[insns_base + 2..insns_base + 4], &[0x07, 0x00]); // type@0x0007
        assert_eq!(&out[insns_base + 4..insns_base + 6], &[0x00, 0x00]); // nop untouched
    }

    #[test]
    fn v10_invoke_virtual_quick_reverts() {
        // invoke-virtual-quick {v1}, vtable@0x0004 ; return-void
        let insns = [0x10e9, 0x0004, 0x0001, 0x000e];
        let (out, code_off, _) = unquickened_bytes(V10, &insns, |code_off| {
            build_v10_quickening(&[&[(code_off, vec![0x00, 0x00, 0x00])]])
        });

        let insns_base = code_off as usize + 16;
        assert_eq!(out[insns_base], 0x6e); // invoke-virtual
        assert_eq!(&out[insns_base + 2..insns_base + 4], &[0x00, 0x00]); // method@0
    }

    #[test]
    fn v6_stream_is_consumed_positionally() {
        let insns = [0x10e3, 0x0004, 0x000e];
        let (out, code_off, rewritten) = unquickened_bytes(V6, &insns, |_| {
            build_v6_quickening(&[&[0x2a, 0x00]])
        });

        assert_eq!(rewritten, 1);
        let insns_base = code_off as usize + 16;
        assert_eq!(out[insns_base], 0x52);
        assert_eq!(&out[insns_base + 2..insns_base + 4], &[0x2a, 0x00]);
    }

    #[test]
    fn v6_never_reverts_nops() {
        let insns = [0x0000, 0x0000, 0x000e];
        let (out, code_off, rewritten) = unquickened_bytes(V6, &insns, |_| {
            build_v6_quickening(&[&[]])
        });

        assert_eq!(rewritten, 0);
        let insns_base = code_off as usize + 16;
        assert_eq!(&out[insns_base..insns_base + 4], &[0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn return_void_no_barrier_needs_no_operand() {
        let insns = [0x0073];
        let (out, code_off, rewritten) = unquickened_bytes(V10, &insns, |code_off| {
            build_v10_quickening(&[&[(code_off, vec![0x00])]])
        });

        assert_eq!(rewritten, 1);
        assert_eq!(out[code_off as usize + 16], 0x0e);
    }

    #[test]
    fn exhausted_operands_are_a_truncation_error() {
        let insns = [0x10e3, 0x0004, 0x000e];
        let (dex_bytes, code_off) = build_dex_with_insns(&insns);
        let section = build_v10_quickening(&[&[(code_off, vec![0x00])]]); // budget 0, no operands
        let data = build_vdex(V10, &[dex_bytes], &[0], &[], &section);

        let vdex = Vdex::parse(&data).unwrap();
        let backend = Backend::new(vdex.header.version);
        let mut info = backend.quickening_index(&vdex).unwrap();
        let slice = vdex.dex_files().next().unwrap().unwrap();
        let mut dex = Dex::new(slice.data.to_vec()).unwrap();

        assert!(matches!(
            unquicken_dex(&mut dex, &mut info, 0),
            Err(VdexError::TruncatedQuickening { .. })
        ));
    }

    #[test]
    fn output_contains_no_quickened_opcodes_and_keeps_length() {
        let insns = [0x10e3, 0x0004, 0x10e9, 0x0004, 0x0001, 0x0073, 0x000e];
        let (dex_bytes, code_off) = build_dex_with_insns(&insns);
        let original_len = dex_bytes.len();
        let (out, _, rewritten) = unquickened_bytes(V10, &insns, |code_off_| {
            build_v10_quickening(&[&[(code_off_, vec![0x00, 0x2a, 0x00, 0x01, 0x00])]])
        });

        assert_eq!(rewritten, 3);
        assert_eq!(out.len(), original_len);

        let insns_base = code_off as usize + 16;
        let insns_bytes = &out[insns_base..insns_base + insns.len() * 2];
        let mut unit = 0;
        while unit < insns.len() {
            let opcode = insns_bytes[unit * 2];
            assert!(
                !vdex_extract_dex::insns::is_quickened(opcode),
                "opcode {:#x} at unit {} still quickened",
                opcode,
                unit
            );
            unit += vdex_extract_dex::insns::insn_units(insns_bytes, unit).unwrap();
        }
    }
}
