use winnow::prelude::*;

use crate::dex::Dex;
use crate::errors::DexError;
use crate::leb128::uleb128;

/// Decoded `class_data_item` - the per-class list of fields and methods.
///
/// Field and method indexes are stored on disk as deltas; they are accumulated
/// here so every entry carries its absolute index.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#class-data-item>
#[derive(Debug, Default)]
pub struct ClassData {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

#[derive(Debug)]
pub struct EncodedField {
    /// Absolute index into [Dex::field_ids]
    pub field_idx: u32,

    /// Raw access flags
    pub access_flags: u32,
}

#[derive(Debug)]
pub struct EncodedMethod {
    /// Absolute index into [Dex::method_ids]
    pub method_idx: u32,

    /// Raw access flags
    pub access_flags: u32,

    /// Offset from the start of the file to the `code_item`
    ///
    /// `0` - abstract or native method, no code
    pub code_off: u32,
}

impl ClassData {
    /// Parse the `class_data_item` at `offset` inside `dex`.
    pub fn parse(dex: &Dex, offset: u32) -> Result<ClassData, DexError> {
        let mut input = dex
            .data()
            .get(offset as usize..)
            .ok_or(DexError::ClassDataError(offset))?;

        Self::parse_inner(&mut input).map_err(|_| DexError::ClassDataError(offset))
    }

    fn parse_inner(input: &mut &[u8]) -> ModalResult<ClassData> {
        let static_fields_size = uleb128(input)?;
        let instance_fields_size = uleb128(input)?;
        let direct_methods_size = uleb128(input)?;
        let virtual_methods_size = uleb128(input)?;

        Ok(ClassData {
            static_fields: Self::parse_fields(input, static_fields_size as usize)?,
            instance_fields: Self::parse_fields(input, instance_fields_size as usize)?,
            direct_methods: Self::parse_methods(input, direct_methods_size as usize)?,
            virtual_methods: Self::parse_methods(input, virtual_methods_size as usize)?,
        })
    }

    fn parse_fields(input: &mut &[u8], count: usize) -> ModalResult<Vec<EncodedField>> {
        let mut fields = Vec::with_capacity(count);
        let mut field_idx = 0u32;

        for _ in 0..count {
            field_idx = field_idx.wrapping_add(uleb128(input)? as u32);
            let access_flags = uleb128(input)? as u32;
            fields.push(EncodedField {
                field_idx,
                access_flags,
            });
        }

        Ok(fields)
    }

    fn parse_methods(input: &mut &[u8], count: usize) -> ModalResult<Vec<EncodedMethod>> {
        let mut methods = Vec::with_capacity(count);
        let mut method_idx = 0u32;

        for _ in 0..count {
            method_idx = method_idx.wrapping_add(uleb128(input)? as u32);
            let access_flags = uleb128(input)? as u32;
            let code_off = uleb128(input)? as u32;
            methods.push(EncodedMethod {
                method_idx,
                access_flags,
                code_off,
            });
        }

        Ok(methods)
    }

    /// Direct methods followed by virtual methods, the canonical code item order
    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::Dex;
    use crate::test_fixtures::build_dex_with_insns;

    #[test]
    fn parse_class_data() {
        let (data, code_off) = build_dex_with_insns(&[0x000e]);
        let dex = Dex::new(data).unwrap();

        let class_data = ClassData::parse(&dex, dex.class_defs[0].class_data_off).unwrap();
        assert_eq!(class_data.static_fields.len(), 0);
        assert_eq!(class_data.instance_fields.len(), 1);
        assert_eq!(class_data.instance_fields[0].field_idx, 0);
        assert_eq!(class_data.direct_methods.len(), 0);
        assert_eq!(class_data.virtual_methods.len(), 1);

        let method = &class_data.virtual_methods[0];
        assert_eq!(method.method_idx, 0);
        assert_eq!(method.code_off, code_off);
    }

    #[test]
    fn bad_offset_is_rejected() {
        let (data, _) = build_dex_with_insns(&[0x000e]);
        let len = data.len() as u32;
        let dex = Dex::new(data).unwrap();

        assert!(matches!(
            ClassData::parse(&dex, len + 1),
            Err(DexError::ClassDataError(_))
        ));
    }
}
