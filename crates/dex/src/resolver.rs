//! Stringification of dex constant-pool indexes.
//!
//! Every lookup is bounds-checked; an index outside its table renders as a
//! synthetic `<invalid-idx-N>` token instead of failing, so that reports over
//! hostile files always complete.

use winnow::binary::{le_u16, le_u32};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::dex::Dex;

fn invalid(idx: u32) -> String {
    format!("<invalid-idx-{}>", idx)
}

/// Type descriptor for `type_ids[idx]`, e.g. `Lfoo/Bar;`
pub fn type_name(dex: &Dex, idx: u32) -> String {
    dex.get_type(idx as usize)
        .map(|name| name.into_owned())
        .unwrap_or_else(|| invalid(idx))
}

/// String pool entry, `<invalid-idx-N>` when out of range
pub fn string_value(dex: &Dex, idx: u32) -> String {
    dex.get_string(idx as usize)
        .map(|s| s.into_owned())
        .unwrap_or_else(|| invalid(idx))
}

/// Canonical field signature: `Lfoo/Bar;.name:Ltype;`
pub fn field_signature(dex: &Dex, idx: u32) -> String {
    let Some(field) = dex.field_ids.get(idx as usize) else {
        return invalid(idx);
    };

    format!(
        "{}.{}:{}",
        type_name(dex, field.class_idx as u32),
        string_value(dex, field.name_idx),
        type_name(dex, field.type_idx as u32),
    )
}

/// Canonical method signature: `Lfoo/Bar;.name(Lparams;)Lret;`
pub fn method_signature(dex: &Dex, idx: u32) -> String {
    let Some(method) = dex.method_ids.get(idx as usize) else {
        return invalid(idx);
    };

    format!(
        "{}.{}{}",
        type_name(dex, method.class_idx as u32),
        string_value(dex, method.name_idx),
        proto_signature(dex, method.proto_idx as u32),
    )
}

/// Prototype rendered as `(Lparams;)Lret;`
///
/// Parameters come from the `type_list` side table referenced by the proto.
pub fn proto_signature(dex: &Dex, idx: u32) -> String {
    let Some(proto) = dex.proto_ids.get(idx as usize) else {
        return invalid(idx);
    };

    let mut params = String::new();
    for type_idx in type_list(dex, proto.parameters_off) {
        params.push_str(&type_name(dex, type_idx as u32));
    }

    format!("({}){}", params, type_name(dex, proto.return_type_idx))
}

/// Read the `type_list` at `offset`, empty when `offset` is 0 or out of range
fn type_list(dex: &Dex, offset: u32) -> Vec<u16> {
    if offset == 0 {
        return Vec::new();
    }

    let Some(mut input) = dex.data().get(offset as usize..) else {
        return Vec::new();
    };

    let Ok(size) = le_u32::<&[u8], ContextError>.parse_next(&mut input) else {
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(size as usize);
    for _ in 0..size {
        match le_u16::<&[u8], ContextError>.parse_next(&mut input) {
            Ok(idx) => entries.push(idx),
            Err(_) => break,
        }
    }
    entries
}
