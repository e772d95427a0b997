//! Decoder for the verifier dependencies section.
//!
//! The section is one record per embedded dex file, back to back, each a
//! fixed sequence of uleb128 sub-streams: extra strings, assignable and
//! unassignable type sets, class/field/method resolutions and unverified
//! classes. String indexes form a union table: values below the dex's own
//! string count hit its pool, everything above lands in the extra strings.

use std::fmt::Write;

use winnow::prelude::*;
use winnow::token::take;

use vdex_extract_dex::dex::Dex;
use vdex_extract_dex::leb128::uleb128;
use vdex_extract_dex::resolver;

use crate::errors::VdexError;

/// Sentinel `declaring_class_idx` for members the verifier could not resolve.
pub const UNRESOLVED_MARKER: u32 = u32::MAX;

/// Decoded dependencies of a whole container
#[derive(Debug, Default)]
pub struct VerifierDeps {
    pub per_dex: Vec<DexDeps>,
}

/// Dependencies recorded for one dex file
#[derive(Debug, Default)]
pub struct DexDeps {
    /// Strings not present in the dex's own pool, indexed from
    /// `dex_strings_count` upward
    pub extra_strings: Vec<String>,

    /// Pairs the verifier proved assignable
    pub assignable_types: Vec<TypeAssignability>,

    /// Pairs the verifier proved unassignable
    pub unassignable_types: Vec<TypeAssignability>,

    pub classes: Vec<ClassResolution>,
    pub fields: Vec<FieldResolution>,
    pub methods: Vec<MethodResolution>,

    /// Type indexes of classes left for runtime verification
    pub unverified_classes: Vec<u16>,
}

/// `src` is (or is not) assignable to `dst`; both index the union string table
#[derive(Debug)]
pub struct TypeAssignability {
    pub dst_idx: u32,
    pub src_idx: u32,
}

#[derive(Debug)]
pub struct ClassResolution {
    pub type_idx: u16,
    pub access_flags: u16,
}

#[derive(Debug)]
pub struct FieldResolution {
    pub field_idx: u32,
    pub access_flags: u16,

    /// Union string table index of the declaring class, [UNRESOLVED_MARKER]
    /// when the field did not resolve
    pub declaring_class_idx: u32,
}

#[derive(Debug)]
pub struct MethodResolution {
    pub method_idx: u32,
    pub access_flags: u16,

    /// Union string table index of the declaring class, [UNRESOLVED_MARKER]
    /// when the method did not resolve
    pub declaring_class_idx: u32,
}

/// Decode `dex_count` back-to-back dependency records.
///
/// The records must consume the section exactly; a zero-length section stands
/// for "no dependencies recorded".
pub fn decode(data: &[u8], dex_count: usize) -> Result<VerifierDeps, VdexError> {
    if data.is_empty() {
        return Ok(VerifierDeps::default());
    }

    let declared = data.len();
    let mut input = data;

    let mut per_dex = Vec::with_capacity(dex_count);
    for _ in 0..dex_count {
        per_dex.push(decode_dex_deps(&mut input).map_err(|_| VdexError::DepsError)?);
    }

    if !input.is_empty() {
        return Err(VdexError::DepsSizeMismatch {
            consumed: declared - input.len(),
            declared,
        });
    }

    Ok(VerifierDeps { per_dex })
}

fn decode_dex_deps(input: &mut &[u8]) -> ModalResult<DexDeps> {
    let string_count = uleb128(input)? as usize;
    let mut extra_strings = Vec::with_capacity(string_count);
    for _ in 0..string_count {
        let length = uleb128(input)? as usize;
        let bytes = take(length).parse_next(input)?;
        extra_strings.push(String::from_utf8_lossy(bytes).into_owned());
    }

    let assignable_types = decode_type_sets(input)?;
    let unassignable_types = decode_type_sets(input)?;

    let class_count = uleb128(input)? as usize;
    let mut classes = Vec::with_capacity(class_count);
    for _ in 0..class_count {
        classes.push(ClassResolution {
            type_idx: uleb128(input)? as u16,
            access_flags: uleb128(input)? as u16,
        });
    }

    let field_count = uleb128(input)? as usize;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        fields.push(FieldResolution {
            field_idx: uleb128(input)? as u32,
            access_flags: uleb128(input)? as u16,
            declaring_class_idx: uleb128(input)? as u32,
        });
    }

    let method_count = uleb128(input)? as usize;
    let mut methods = Vec::with_capacity(method_count);
    for _ in 0..method_count {
        methods.push(MethodResolution {
            method_idx: uleb128(input)? as u32,
            access_flags: uleb128(input)? as u16,
            declaring_class_idx: uleb128(input)? as u32,
        });
    }

    let unverified_count = uleb128(input)? as usize;
    let mut unverified_classes = Vec::with_capacity(unverified_count);
    for _ in 0..unverified_count {
        unverified_classes.push(uleb128(input)? as u16);
    }

    Ok(DexDeps {
        extra_strings,
        assignable_types,
        unassignable_types,
        classes,
        fields,
        methods,
        unverified_classes,
    })
}

fn decode_type_sets(input: &mut &[u8]) -> ModalResult<Vec<TypeAssignability>> {
    let count = uleb128(input)? as usize;
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        sets.push(TypeAssignability {
            dst_idx: uleb128(input)? as u32,
            src_idx: uleb128(input)? as u32,
        });
    }
    Ok(sets)
}

/// Union string table lookup: the dex pool below its string count, the
/// record's extra strings above it.
fn dep_string(dex: &Dex, extra: &[String], idx: u32) -> String {
    let pool_size = dex.string_ids.len();
    if (idx as usize) < pool_size {
        resolver::string_value(dex, idx)
    } else {
        extra
            .get(idx as usize - pool_size)
            .cloned()
            .unwrap_or_else(|| format!("<invalid-idx-{}>", idx))
    }
}

/// Pretty-print the decoded dependencies, one tree per dex file.
///
/// `dexes` must hold the parsed dex files in container order; names resolve
/// through each file's own tables.
pub fn render(deps: &VerifierDeps, dexes: &[Dex]) -> String {
    let mut out = String::new();

    for (idx, record) in deps.per_dex.iter().enumerate() {
        let _ = writeln!(out, "dex file #{}", idx);
        let Some(dex) = dexes.get(idx) else {
            let _ = writeln!(out, " (dex file not available, skipping)");
            continue;
        };

        let _ = writeln!(out, " extra strings: {}", record.extra_strings.len());
        for (n, value) in record.extra_strings.iter().enumerate() {
            let _ = writeln!(out, "  {:04}: '{}'", n, value);
        }

        let _ = writeln!(
            out,
            " assignable type sets: {}",
            record.assignable_types.len()
        );
        for set in &record.assignable_types {
            let _ = writeln!(
                out,
                "  '{}' must be assignable to '{}'",
                dep_string(dex, &record.extra_strings, set.src_idx),
                dep_string(dex, &record.extra_strings, set.dst_idx),
            );
        }

        let _ = writeln!(
            out,
            " unassignable type sets: {}",
            record.unassignable_types.len()
        );
        for set in &record.unassignable_types {
            let _ = writeln!(
                out,
                "  '{}' must not be assignable to '{}'",
                dep_string(dex, &record.extra_strings, set.src_idx),
                dep_string(dex, &record.extra_strings, set.dst_idx),
            );
        }

        let _ = writeln!(out, " class dependencies: {}", record.classes.len());
        for class in &record.classes {
            let _ = writeln!(
                out,
                "  {} must be resolved with access flags {:#x}",
                resolver::type_name(dex, class.type_idx as u32),
                class.access_flags,
            );
        }

        let _ = writeln!(out, " field dependencies: {}", record.fields.len());
        for field in &record.fields {
            let _ = writeln!(
                out,
                "  {} {}",
                resolver::field_signature(dex, field.field_idx),
                resolution_note(dex, record, field.access_flags, field.declaring_class_idx),
            );
        }

        let _ = writeln!(out, " method dependencies: {}", record.methods.len());
        for method in &record.methods {
            let _ = writeln!(
                out,
                "  {} {}",
                resolver::method_signature(dex, method.method_idx),
                resolution_note(dex, record, method.access_flags, method.declaring_class_idx),
            );
        }

        let _ = writeln!(
            out,
            " unverified classes: {}",
            record.unverified_classes.len()
        );
        for type_idx in &record.unverified_classes {
            let _ = writeln!(out, "  {}", resolver::type_name(dex, *type_idx as u32));
        }
    }

    out
}

fn resolution_note(
    dex: &Dex,
    record: &DexDeps,
    access_flags: u16,
    declaring_class_idx: u32,
) -> String {
    if declaring_class_idx == UNRESOLVED_MARKER {
        "is unresolved".to_owned()
    } else {
        format!(
            "is resolved in '{}' with access flags {:#x}",
            dep_string(dex, &record.extra_strings, declaring_class_idx),
            access_flags,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::push_uleb;
    use vdex_extract_dex::test_fixtures::build_test_dex;

    /// One record: a single extra string, one unverified class, nothing else.
    fn minimal_record(extra: &str, unverified_type_idx: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        push_uleb(&mut buf, 1); // extra strings
        push_uleb(&mut buf, extra.len() as u32);
        buf.extend_from_slice(extra.as_bytes());
        push_uleb(&mut buf, 0); // assignable sets
        push_uleb(&mut buf, 0); // unassignable sets
        push_uleb(&mut buf, 0); // classes
        push_uleb(&mut buf, 0); // fields
        push_uleb(&mut buf, 0); // methods
        push_uleb(&mut buf, 1); // unverified classes
        push_uleb(&mut buf, unverified_type_idx);
        buf
    }

    #[test]
    fn decode_consumes_the_section_exactly() {
        let record = minimal_record("Lbar/Baz;", 1);
        let deps = decode(&record, 1).unwrap();

        assert_eq!(deps.per_dex.len(), 1);
        assert_eq!(deps.per_dex[0].extra_strings, vec!["Lbar/Baz;".to_owned()]);
        assert_eq!(deps.per_dex[0].unverified_classes, vec![1]);
    }

    #[test]
    fn trailing_bytes_are_a_size_mismatch() {
        let mut record = minimal_record("Lbar/Baz;", 1);
        record.push(0x00);
        assert!(matches!(
            decode(&record, 1),
            Err(VdexError::DepsSizeMismatch { .. })
        ));
    }

    #[test]
    fn empty_section_means_no_deps() {
        let deps = decode(&[], 2).unwrap();
        assert!(deps.per_dex.is_empty());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let record = minimal_record("Lbar/Baz;", 1);
        assert!(matches!(
            decode(&record[..4], 1),
            Err(VdexError::DepsError)
        ));
    }

    #[test]
    fn report_names_unverified_classes() {
        let dex = vdex_extract_dex::dex::Dex::new(build_test_dex()).unwrap();
        let record = minimal_record("Lbar/Baz;", 1);
        let deps = decode(&record, 1).unwrap();

        let report = render(&deps, std::slice::from_ref(&dex));
        // type 1 of the fixture dex is LFoo;
        assert_eq!(
            report.lines().filter(|l| l.trim() == "LFoo;").count(),
            1,
            "{}",
            report
        );
        assert!(report.contains("unverified classes: 1"), "{}", report);
    }

    #[test]
    fn union_string_table_spans_pool_and_extras() {
        let dex = vdex_extract_dex::dex::Dex::new(build_test_dex()).unwrap();
        let extras = vec!["Lbar/Baz;".to_owned()];
        let pool_size = dex.string_ids.len() as u32;

        assert_eq!(dep_string(&dex, &extras, 1), "LFoo;");
        assert_eq!(dep_string(&dex, &extras, pool_size), "Lbar/Baz;");
        assert_eq!(
            dep_string(&dex, &extras, pool_size + 1),
            format!("<invalid-idx-{}>", pool_size + 1)
        );
    }

    #[test]
    fn unresolved_members_render_as_such() {
        let dex = vdex_extract_dex::dex::Dex::new(build_test_dex()).unwrap();

        let mut buf = Vec::new();
        push_uleb(&mut buf, 0); // extra strings
        push_uleb(&mut buf, 0); // assignable
        push_uleb(&mut buf, 0); // unassignable
        push_uleb(&mut buf, 0); // classes
        push_uleb(&mut buf, 1); // fields
        push_uleb(&mut buf, 0); // field_idx
        push_uleb(&mut buf, 0); // access_flags
        push_uleb(&mut buf, UNRESOLVED_MARKER); // declaring class: unresolved
        push_uleb(&mut buf, 0); // methods
        push_uleb(&mut buf, 0); // unverified

        let deps = decode(&buf, 1).unwrap();
        let report = render(&deps, std::slice::from_ref(&dex));
        assert!(report.contains("LFoo;.x:I is unresolved"), "{}", report);
    }
}
