use std::fmt::Write;

use crate::class_data::ClassData;
use crate::code::CodeItem;
use crate::dex::Dex;
use crate::errors::DexError;
use crate::{insns, resolver};

/// Render a per-method dalvik listing of every class in `dex` into `out`.
///
/// Classes and methods appear in class-data order, the same order the
/// unquickener visits them.
pub fn disassemble_into(dex: &Dex, out: &mut String) -> Result<(), DexError> {
    for class in &dex.class_defs {
        let _ = writeln!(
            out,
            "class {} ({})",
            resolver::type_name(dex, class.class_idx),
            class.access_flags.names(),
        );

        if class.class_data_off == 0 {
            continue;
        }
        let class_data = ClassData::parse(dex, class.class_data_off)?;

        for method in class_data.methods() {
            let _ = writeln!(
                out,
                " method {}",
                resolver::method_signature(dex, method.method_idx)
            );

            if method.code_off == 0 {
                continue;
            }
            let code = CodeItem::parse(dex, method.code_off)?;
            let insns = &dex.data()[code.insns_range()];

            let mut unit = 0;
            let insns_size = code.insns_size as usize;
            while unit < insns_size {
                let width = insns::insn_units(insns, unit)?;
                let _ = writeln!(out, "  {}", insns::render(dex, insns, unit));
                unit += width;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::build_dex_with_insns;

    #[test]
    fn listing_covers_every_instruction() {
        // iget v0, v1, field@0000 then return-void
        let (data, _) = build_dex_with_insns(&[0x1052, 0x0000, 0x000e]);
        let dex = Dex::new(data).unwrap();

        let mut out = String::new();
        disassemble_into(&dex, &mut out).unwrap();

        assert!(out.contains("class LFoo; (public)"), "{}", out);
        assert!(out.contains("method LFoo;.run(I)V"), "{}", out);
        assert!(out.contains("0000: iget v0, v1"), "{}", out);
        assert!(out.contains("0002: return-void"), "{}", out);
    }
}
