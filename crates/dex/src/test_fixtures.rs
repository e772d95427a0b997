//! Hand-assembled dex buffers for unit tests.
//!
//! The builder lays sections out in the exact order the parser consumes them:
//! header, id tables, then a data section holding the parameter type list, one
//! code item, the class data and the string pool.

use simd_adler32::Adler32;

const HEADER_SIZE: usize = 112;

/// Sorted string pool shared by every fixture.
///
/// 0:"I" 1:"LFoo;" 2:"Ljava/lang/Object;" 3:"V" 4:"VI" 5:"run" 6:"x"
const STRINGS: [&str; 7] = ["I", "LFoo;", "Ljava/lang/Object;", "V", "VI", "run", "x"];

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_uleb(buf: &mut Vec<u8>, mut v: u32) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Build a one-class dex file (`LFoo;` with a single virtual method
/// `run(I)V` and one instance field `x:I`) whose code item holds `insns`.
///
/// Returns the file bytes and the code item offset.
pub fn build_dex_with_insns(insns: &[u16]) -> (Vec<u8>, u32) {
    let string_ids_off = HEADER_SIZE;
    let type_ids_off = string_ids_off + STRINGS.len() * 4;
    let proto_ids_off = type_ids_off + 4 * 4;
    let field_ids_off = proto_ids_off + 12;
    let method_ids_off = field_ids_off + 8;
    let class_defs_off = method_ids_off + 8;
    let data_off = class_defs_off + 32;

    // data section layout: type_list (padded to 4), code item, class_data, strings
    let type_list_off = data_off;
    let code_off = type_list_off + 8;

    let mut data_section = Vec::new();

    // type_list: one parameter of type I, padded back to 4-byte alignment
    push_u32(&mut data_section, 1);
    push_u16(&mut data_section, 0);
    push_u16(&mut data_section, 0);

    // code_item: 2 registers, 1 in, 1 out, no tries
    push_u16(&mut data_section, 2);
    push_u16(&mut data_section, 1);
    push_u16(&mut data_section, 1);
    push_u16(&mut data_section, 0);
    push_u32(&mut data_section, 0);
    push_u32(&mut data_section, insns.len() as u32);
    for unit in insns {
        push_u16(&mut data_section, *unit);
    }

    // class_data: 0 static fields, 1 instance field, 0 direct methods, 1 virtual method
    let class_data_off = data_off + data_section.len();
    push_uleb(&mut data_section, 0);
    push_uleb(&mut data_section, 1);
    push_uleb(&mut data_section, 0);
    push_uleb(&mut data_section, 1);
    push_uleb(&mut data_section, 0); // field 0
    push_uleb(&mut data_section, 0x2); // private
    push_uleb(&mut data_section, 0); // method 0
    push_uleb(&mut data_section, 0x1); // public
    push_uleb(&mut data_section, code_off as u32);

    // string data items, offsets recorded for the id table
    let mut string_offsets = Vec::new();
    for s in STRINGS {
        string_offsets.push((data_off + data_section.len()) as u32);
        push_uleb(&mut data_section, s.len() as u32);
        data_section.extend_from_slice(s.as_bytes());
        data_section.push(0);
    }

    let file_size = (data_off + data_section.len()) as u32;

    let mut buf = Vec::with_capacity(file_size as usize);
    buf.extend_from_slice(b"dex\n035\0");
    push_u32(&mut buf, 0); // checksum, patched below
    buf.extend_from_slice(&[0u8; 20]); // signature left blank
    push_u32(&mut buf, file_size);
    push_u32(&mut buf, HEADER_SIZE as u32);
    push_u32(&mut buf, crate::dex::ENDIAN_CONSTANT);
    push_u32(&mut buf, 0); // link_size
    push_u32(&mut buf, 0); // link_off
    push_u32(&mut buf, 0); // map_off
    push_u32(&mut buf, STRINGS.len() as u32);
    push_u32(&mut buf, string_ids_off as u32);
    push_u32(&mut buf, 4);
    push_u32(&mut buf, type_ids_off as u32);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, proto_ids_off as u32);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, field_ids_off as u32);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, method_ids_off as u32);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, class_defs_off as u32);
    push_u32(&mut buf, data_section.len() as u32);
    push_u32(&mut buf, data_off as u32);
    assert_eq!(buf.len(), HEADER_SIZE);

    // string_ids
    for off in &string_offsets {
        push_u32(&mut buf, *off);
    }

    // type_ids: I, LFoo;, Ljava/lang/Object;, V
    for string_idx in [0u32, 1, 2, 3] {
        push_u32(&mut buf, string_idx);
    }

    // proto_ids: run(I)V -> shorty "VI", return V, params [I]
    push_u32(&mut buf, 4);
    push_u32(&mut buf, 3);
    push_u32(&mut buf, type_list_off as u32);

    // field_ids: LFoo;.x:I
    push_u16(&mut buf, 1);
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 6);

    // method_ids: LFoo;.run(I)V
    push_u16(&mut buf, 1);
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 5);

    // class_defs: public LFoo; extends Ljava/lang/Object;
    push_u32(&mut buf, 1);
    push_u32(&mut buf, 0x1);
    push_u32(&mut buf, 2);
    push_u32(&mut buf, 0);
    push_u32(&mut buf, crate::dex::NO_INDEX);
    push_u32(&mut buf, 0);
    push_u32(&mut buf, class_data_off as u32);
    push_u32(&mut buf, 0);

    buf.extend_from_slice(&data_section);
    assert_eq!(buf.len(), file_size as usize);

    let mut adler = Adler32::new();
    adler.write(&buf[12..]);
    let checksum = adler.finish();
    buf[8..12].copy_from_slice(&checksum.to_le_bytes());

    (buf, code_off as u32)
}

/// A fixture whose method body is a single `return-void`.
pub fn build_test_dex() -> Vec<u8> {
    build_dex_with_insns(&[0x000e]).0
}
