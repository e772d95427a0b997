//! Dalvik instruction table: mnemonics, encoding formats, widths and the
//! quickened-to-symbolic opcode mapping.
//!
//! See: <https://source.android.com/docs/core/runtime/dalvik-bytecode>

use crate::dex::Dex;
use crate::errors::DexError;
use crate::resolver;

/// Instruction encoding formats, named after the dalvik convention:
/// digit = code units, letters = operand shape.
///
/// See: <https://source.android.com/docs/core/runtime/instruction-formats>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Format10x,
    Format12x,
    Format11n,
    Format11x,
    Format10t,
    Format20t,
    Format22x,
    Format21t,
    Format21s,
    Format21h,
    Format21c,
    Format23x,
    Format22b,
    Format22t,
    Format22s,
    Format22c,
    /// Quickened field access, operand is an object offset
    Format22cs,
    Format30t,
    Format32x,
    Format31i,
    Format31t,
    Format31c,
    Format35c,
    /// Quickened invoke, operand is a vtable index
    Format35ms,
    Format3rc,
    /// Quickened range invoke, operand is a vtable index
    Format3rms,
    Format45cc,
    Format4rcc,
    Format51l,
}

impl Format {
    /// Instruction width in 16-bit code units
    pub const fn units(self) -> usize {
        match self {
            Format::Format10x
            | Format::Format12x
            | Format::Format11n
            | Format::Format11x
            | Format::Format10t => 1,
            Format::Format20t
            | Format::Format22x
            | Format::Format21t
            | Format::Format21s
            | Format::Format21h
            | Format::Format21c
            | Format::Format23x
            | Format::Format22b
            | Format::Format22t
            | Format::Format22s
            | Format::Format22c
            | Format::Format22cs => 2,
            Format::Format30t
            | Format::Format32x
            | Format::Format31i
            | Format::Format31t
            | Format::Format31c
            | Format::Format35c
            | Format::Format35ms
            | Format::Format3rc
            | Format::Format3rms => 3,
            Format::Format45cc | Format::Format4rcc => 4,
            Format::Format51l => 5,
        }
    }
}

/// What the constant-pool index of a `c`-format instruction refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexKind {
    None,
    String,
    Type,
    Field,
    Method,
}

#[derive(Debug)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub format: Format,
}

const fn op(name: &'static str, format: Format) -> OpcodeInfo {
    OpcodeInfo { name, format }
}

use Format::*;

/// One entry per opcode byte. Unused slots keep their byte value in the name
/// so malformed input still renders something traceable.
#[rustfmt::skip]
pub static OPCODES: [OpcodeInfo; 256] = [
    op("nop", Format10x),                       // 0x00
    op("move", Format12x),                      // 0x01
    op("move/from16", Format22x),               // 0x02
    op("move/16", Format32x),                   // 0x03
    op("move-wide", Format12x),                 // 0x04
    op("move-wide/from16", Format22x),          // 0x05
    op("move-wide/16", Format32x),              // 0x06
    op("move-object", Format12x),               // 0x07
    op("move-object/from16", Format22x),        // 0x08
    op("move-object/16", Format32x),            // 0x09
    op("move-result", Format11x),               // 0x0a
    op("move-result-wide", Format11x),          // 0x0b
    op("move-result-object", Format11x),        // 0x0c
    op("move-exception", Format11x),            // 0x0d
    op("return-void", Format10x),               // 0x0e
    op("return", Format11x),                    // 0x0f
    op("return-wide", Format11x),               // 0x10
    op("return-object", Format11x),             // 0x11
    op("const/4", Format11n),                   // 0x12
    op("const/16", Format21s),                  // 0x13
    op("const", Format31i),                     // 0x14
    op("const/high16", Format21h),              // 0x15
    op("const-wide/16", Format21s),             // 0x16
    op("const-wide/32", Format31i),             // 0x17
    op("const-wide", Format51l),                // 0x18
    op("const-wide/high16", Format21h),         // 0x19
    op("const-string", Format21c),              // 0x1a
    op("const-string/jumbo", Format31c),        // 0x1b
    op("const-class", Format21c),               // 0x1c
    op("monitor-enter", Format11x),             // 0x1d
    op("monitor-exit", Format11x),              // 0x1e
    op("check-cast", Format21c),                // 0x1f
    op("instance-of", Format22c),               // 0x20
    op("array-length", Format12x),              // 0x21
    op("new-instance", Format21c),              // 0x22
    op("new-array", Format22c),                 // 0x23
    op("filled-new-array", Format35c),          // 0x24
    op("filled-new-array/range", Format3rc),    // 0x25
    op("fill-array-data", Format31t),           // 0x26
    op("throw", Format11x),                     // 0x27
    op("goto", Format10t),                      // 0x28
    op("goto/16", Format20t),                   // 0x29
    op("goto/32", Format30t),                   // 0x2a
    op("packed-switch", Format31t),             // 0x2b
    op("sparse-switch", Format31t),             // 0x2c
    op("cmpl-float", Format23x),                // 0x2d
    op("cmpg-float", Format23x),                // 0x2e
    op("cmpl-double", Format23x),               // 0x2f
    op("cmpg-double", Format23x),               // 0x30
    op("cmp-long", Format23x),                  // 0x31
    op("if-eq", Format22t),                     // 0x32
    op("if-ne", Format22t),                     // 0x33
    op("if-lt", Format22t),                     // 0x34
    op("if-ge", Format22t),                     // 0x35
    op("if-gt", Format22t),                     // 0x36
    op("if-le", Format22t),                     // 0x37
    op("if-eqz", Format21t),                    // 0x38
    op("if-nez", Format21t),                    // 0x39
    op("if-ltz", Format21t),                    // 0x3a
    op("if-gez", Format21t),                    // 0x3b
    op("if-gtz", Format21t),                    // 0x3c
    op("if-lez", Format21t),                    // 0x3d
    op("unused-3e", Format10x),                 // 0x3e
    op("unused-3f", Format10x),                 // 0x3f
    op("unused-40", Format10x),                 // 0x40
    op("unused-41", Format10x),                 // 0x41
    op("unused-42", Format10x),                 // 0x42
    op("unused-43", Format10x),                 // 0x43
    op("aget", Format23x),                      // 0x44
    op("aget-wide", Format23x),                 // 0x45
    op("aget-object", Format23x),               // 0x46
    op("aget-boolean", Format23x),              // 0x47
    op("aget-byte", Format23x),                 // 0x48
    op("aget-char", Format23x),                 // 0x49
    op("aget-short", Format23x),                // 0x4a
    op("aput", Format23x),                      // 0x4b
    op("aput-wide", Format23x),                 // 0x4c
    op("aput-object", Format23x),               // 0x4d
    op("aput-boolean", Format23x),              // 0x4e
    op("aput-byte", Format23x),                 // 0x4f
    op("aput-char", Format23x),                 // 0x50
    op("aput-short", Format23x),                // 0x51
    op("iget", Format22c),                      // 0x52
    op("iget-wide", Format22c),                 // 0x53
    op("iget-object", Format22c),               // 0x54
    op("iget-boolean", Format22c),              // 0x55
    op("iget-byte", Format22c),                 // 0x56
    op("iget-char", Format22c),                 // 0x57
    op("iget-short", Format22c),                // 0x58
    op("iput", Format22c),                      // 0x59
    op("iput-wide", Format22c),                 // 0x5a
    op("iput-object", Format22c),               // 0x5b
    op("iput-boolean", Format22c),              // 0x5c
    op("iput-byte", Format22c),                 // 0x5d
    op("iput-char", Format22c),                 // 0x5e
    op("iput-short", Format22c),                // 0x5f
    op("sget", Format21c),                      // 0x60
    op("sget-wide", Format21c),                 // 0x61
    op("sget-object", Format21c),               // 0x62
    op("sget-boolean", Format21c),              // 0x63
    op("sget-byte", Format21c),                 // 0x64
    op("sget-char", Format21c),                 // 0x65
    op("sget-short", Format21c),                // 0x66
    op("sput", Format21c),                      // 0x67
    op("sput-wide", Format21c),                 // 0x68
    op("sput-object", Format21c),               // 0x69
    op("sput-boolean", Format21c),              // 0x6a
    op("sput-byte", Format21c),                 // 0x6b
    op("sput-char", Format21c),                 // 0x6c
    op("sput-short", Format21c),                // 0x6d
    op("invoke-virtual", Format35c),            // 0x6e
    op("invoke-super", Format35c),              // 0x6f
    op("invoke-direct", Format35c),             // 0x70
    op("invoke-static", Format35c),             // 0x71
    op("invoke-interface", Format35c),          // 0x72
    op("return-void-no-barrier", Format10x),    // 0x73
    op("invoke-virtual/range", Format3rc),      // 0x74
    op("invoke-super/range", Format3rc),        // 0x75
    op("invoke-direct/range", Format3rc),       // 0x76
    op("invoke-static/range", Format3rc),       // 0x77
    op("invoke-interface/range", Format3rc),    // 0x78
    op("unused-79", Format10x),                 // 0x79
    op("unused-7a", Format10x),                 // 0x7a
    op("neg-int", Format12x),                   // 0x7b
    op("not-int", Format12x),                   // 0x7c
    op("neg-long", Format12x),                  // 0x7d
    op("not-long", Format12x),                  // 0x7e
    op("neg-float", Format12x),                 // 0x7f
    op("neg-double", Format12x),                // 0x80
    op("int-to-long", Format12x),               // 0x81
    op("int-to-float", Format12x),              // 0x82
    op("int-to-double", Format12x),             // 0x83
    op("long-to-int", Format12x),               // 0x84
    op("long-to-float", Format12x),             // 0x85
    op("long-to-double", Format12x),            // 0x86
    op("float-to-int", Format12x),              // 0x87
    op("float-to-long", Format12x),             // 0x88
    op("float-to-double", Format12x),           // 0x89
    op("double-to-int", Format12x),             // 0x8a
    op("double-to-long", Format12x),            // 0x8b
    op("double-to-float", Format12x),           // 0x8c
    op("int-to-byte", Format12x),               // 0x8d
    op("int-to-char", Format12x),               // 0x8e
    op("int-to-short", Format12x),              // 0x8f
    op("add-int", Format23x),                   // 0x90
    op("sub-int", Format23x),                   // 0x91
    op("mul-int", Format23x),                   // 0x92
    op("div-int", Format23x),                   // 0x93
    op("rem-int", Format23x),                   // 0x94
    op("and-int", Format23x),                   // 0x95
    op("or-int", Format23x),                    // 0x96
    op("xor-int", Format23x),                   // 0x97
    op("shl-int", Format23x),                   // 0x98
    op("shr-int", Format23x),                   // 0x99
    op("ushr-int", Format23x),                  // 0x9a
    op("add-long", Format23x),                  // 0x9b
    op("sub-long", Format23x),                  // 0x9c
    op("mul-long", Format23x),                  // 0x9d
    op("div-long", Format23x),                  // 0x9e
    op("rem-long", Format23x),                  // 0x9f
    op("and-long", Format23x),                  // 0xa0
    op("or-long", Format23x),                   // 0xa1
    op("xor-long", Format23x),                  // 0xa2
    op("shl-long", Format23x),                  // 0xa3
    op("shr-long", Format23x),                  // 0xa4
    op("ushr-long", Format23x),                 // 0xa5
    op("add-float", Format23x),                 // 0xa6
    op("sub-float", Format23x),                 // 0xa7
    op("mul-float", Format23x),                 // 0xa8
    op("div-float", Format23x),                 // 0xa9
    op("rem-float", Format23x),                 // 0xaa
    op("add-double", Format23x),                // 0xab
    op("sub-double", Format23x),                // 0xac
    op("mul-double", Format23x),                // 0xad
    op("div-double", Format23x),                // 0xae
    op("rem-double", Format23x),                // 0xaf
    op("add-int/2addr", Format12x),             // 0xb0
    op("sub-int/2addr", Format12x),             // 0xb1
    op("mul-int/2addr", Format12x),             // 0xb2
    op("div-int/2addr", Format12x),             // 0xb3
    op("rem-int/2addr", Format12x),             // 0xb4
    op("and-int/2addr", Format12x),             // 0xb5
    op("or-int/2addr", Format12x),              // 0xb6
    op("xor-int/2addr", Format12x),             // 0xb7
    op("shl-int/2addr", Format12x),             // 0xb8
    op("shr-int/2addr", Format12x),             // 0xb9
    op("ushr-int/2addr", Format12x),            // 0xba
    op("add-long/2addr", Format12x),            // 0xbb
    op("sub-long/2addr", Format12x),            // 0xbc
    op("mul-long/2addr", Format12x),            // 0xbd
    op("div-long/2addr", Format12x),            // 0xbe
    op("rem-long/2addr", Format12x),            // 0xbf
    op("and-long/2addr", Format12x),            // 0xc0
    op("or-long/2addr", Format12x),             // 0xc1
    op("xor-long/2addr", Format12x),            // 0xc2
    op("shl-long/2addr", Format12x),            // 0xc3
    op("shr-long/2addr", Format12x),            // 0xc4
    op("ushr-long/2addr", Format12x),           // 0xc5
    op("add-float/2addr", Format12x),           // 0xc6
    op("sub-float/2addr", Format12x),           // 0xc7
    op("mul-float/2addr", Format12x),           // 0xc8
    op("div-float/2addr", Format12x),           // 0xc9
    op("rem-float/2addr", Format12x),           // 0xca
    op("add-double/2addr", Format12x),          // 0xcb
    op("sub-double/2addr", Format12x),          // 0xcc
    op("mul-double/2addr", Format12x),          // 0xcd
    op("div-double/2addr", Format12x),          // 0xce
    op("rem-double/2addr", Format12x),          // 0xcf
    op("add-int/lit16", Format22s),             // 0xd0
    op("rsub-int", Format22s),                  // 0xd1
    op("mul-int/lit16", Format22s),             // 0xd2
    op("div-int/lit16", Format22s),             // 0xd3
    op("rem-int/lit16", Format22s),             // 0xd4
    op("and-int/lit16", Format22s),             // 0xd5
    op("or-int/lit16", Format22s),              // 0xd6
    op("xor-int/lit16", Format22s),             // 0xd7
    op("add-int/lit8", Format22b),              // 0xd8
    op("rsub-int/lit8", Format22b),             // 0xd9
    op("mul-int/lit8", Format22b),              // 0xda
    op("div-int/lit8", Format22b),              // 0xdb
    op("rem-int/lit8", Format22b),              // 0xdc
    op("and-int/lit8", Format22b),              // 0xdd
    op("or-int/lit8", Format22b),               // 0xde
    op("xor-int/lit8", Format22b),              // 0xdf
    op("shl-int/lit8", Format22b),              // 0xe0
    op("shr-int/lit8", Format22b),              // 0xe1
    op("ushr-int/lit8", Format22b),             // 0xe2
    op("iget-quick", Format22cs),               // 0xe3
    op("iget-wide-quick", Format22cs),          // 0xe4
    op("iget-object-quick", Format22cs),        // 0xe5
    op("iput-quick", Format22cs),               // 0xe6
    op("iput-wide-quick", Format22cs),          // 0xe7
    op("iput-object-quick", Format22cs),        // 0xe8
    op("invoke-virtual-quick", Format35ms),     // 0xe9
    op("invoke-virtual/range-quick", Format3rms), // 0xea
    op("iput-boolean-quick", Format22cs),       // 0xeb
    op("iput-byte-quick", Format22cs),          // 0xec
    op("iput-char-quick", Format22cs),          // 0xed
    op("iput-short-quick", Format22cs),         // 0xee
    op("iget-boolean-quick", Format22cs),       // 0xef
    op("iget-byte-quick", Format22cs),          // 0xf0
    op("iget-char-quick", Format22cs),          // 0xf1
    op("iget-short-quick", Format22cs),         // 0xf2
    op("unused-f3", Format10x),                 // 0xf3
    op("unused-f4", Format10x),                 // 0xf4
    op("unused-f5", Format10x),                 // 0xf5
    op("unused-f6", Format10x),                 // 0xf6
    op("unused-f7", Format10x),                 // 0xf7
    op("unused-f8", Format10x),                 // 0xf8
    op("unused-f9", Format10x),                 // 0xf9
    op("invoke-polymorphic", Format45cc),       // 0xfa
    op("invoke-polymorphic/range", Format4rcc), // 0xfb
    op("invoke-custom", Format35c),             // 0xfc
    op("invoke-custom/range", Format3rc),       // 0xfd
    op("const-method-handle", Format21c),       // 0xfe
    op("const-method-type", Format21c),         // 0xff
];

/// Payload idents stored in the high byte of a `nop` code unit.
pub const PACKED_SWITCH_PAYLOAD: u8 = 0x01;
pub const SPARSE_SWITCH_PAYLOAD: u8 = 0x02;
pub const FILL_ARRAY_DATA_PAYLOAD: u8 = 0x03;

/// The symbolic opcode a quickened opcode decompiles back to.
///
/// The `nop`/`check-cast` pair is not listed here: reverting a nop needs the
/// operand-stream budget and is handled by the rewriter itself.
pub const fn unquickened_opcode(opcode: u8) -> Option<u8> {
    match opcode {
        0x73 => Some(0x0e), // return-void-no-barrier -> return-void
        0xe3 => Some(0x52), // iget-quick -> iget
        0xe4 => Some(0x53), // iget-wide-quick -> iget-wide
        0xe5 => Some(0x54), // iget-object-quick -> iget-object
        0xe6 => Some(0x59), // iput-quick -> iput
        0xe7 => Some(0x5a), // iput-wide-quick -> iput-wide
        0xe8 => Some(0x5b), // iput-object-quick -> iput-object
        0xe9 => Some(0x6e), // invoke-virtual-quick -> invoke-virtual
        0xea => Some(0x74), // invoke-virtual/range-quick -> invoke-virtual/range
        0xeb => Some(0x5c), // iput-boolean-quick -> iput-boolean
        0xec => Some(0x5d), // iput-byte-quick -> iput-byte
        0xed => Some(0x5e), // iput-char-quick -> iput-char
        0xee => Some(0x5f), // iput-short-quick -> iput-short
        0xef => Some(0x55), // iget-boolean-quick -> iget-boolean
        0xf0 => Some(0x56), // iget-byte-quick -> iget-byte
        0xf1 => Some(0x57), // iget-char-quick -> iget-char
        0xf2 => Some(0x58), // iget-short-quick -> iget-short
        _ => None,
    }
}

/// True for every opcode [unquickened_opcode] maps, plus nothing else
pub const fn is_quickened(opcode: u8) -> bool {
    unquickened_opcode(opcode).is_some()
}

#[inline]
fn read_u16(insns: &[u8], byte_off: usize) -> Option<u16> {
    let bytes = insns.get(byte_off..byte_off + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
fn read_u32(insns: &[u8], byte_off: usize) -> Option<u32> {
    let bytes = insns.get(byte_off..byte_off + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Width in 16-bit code units of the instruction starting at unit `unit`.
///
/// Switch and array payloads declare their own size; everything else comes
/// from the format table.
pub fn insn_units(insns: &[u8], unit: usize) -> Result<usize, DexError> {
    let insns_size = insns.len() / 2;
    let overrun = DexError::InstructionOverrun { unit, insns_size };

    let byte_off = unit * 2;
    let opcode = *insns.get(byte_off).ok_or(DexError::InstructionOverrun {
        unit,
        insns_size,
    })?;
    let high = *insns.get(byte_off + 1).ok_or(overrun)?;

    let units = if opcode == 0x00 && high != 0 {
        match high {
            PACKED_SWITCH_PAYLOAD => {
                let size = read_u16(insns, byte_off + 2).ok_or(DexError::InstructionOverrun {
                    unit,
                    insns_size,
                })? as usize;
                size * 2 + 4
            }
            SPARSE_SWITCH_PAYLOAD => {
                let size = read_u16(insns, byte_off + 2).ok_or(DexError::InstructionOverrun {
                    unit,
                    insns_size,
                })? as usize;
                size * 4 + 2
            }
            FILL_ARRAY_DATA_PAYLOAD => {
                let element_width = read_u16(insns, byte_off + 2).ok_or(
                    DexError::InstructionOverrun { unit, insns_size },
                )? as usize;
                let size = read_u32(insns, byte_off + 4).ok_or(DexError::InstructionOverrun {
                    unit,
                    insns_size,
                })? as usize;
                (size * element_width + 1) / 2 + 4
            }
            // nop with a meaningless high byte, treat as a plain nop
            _ => 1,
        }
    } else {
        OPCODES[opcode as usize].format.units()
    };

    if unit + units > insns_size {
        return Err(DexError::InstructionOverrun { unit, insns_size });
    }

    Ok(units)
}

fn index_kind(opcode: u8) -> IndexKind {
    match opcode {
        0x1a | 0x1b => IndexKind::String,
        0x1c | 0x1f | 0x20 | 0x22..=0x25 => IndexKind::Type,
        0x52..=0x6d => IndexKind::Field,
        0x6e..=0x72 | 0x74..=0x78 | 0xfa..=0xfd => IndexKind::Method,
        _ => IndexKind::None,
    }
}

fn index_comment(dex: &Dex, opcode: u8, idx: u32) -> String {
    match index_kind(opcode) {
        IndexKind::String => format!(
            "\"{}\" // string@{:04x}",
            dex.get_string(idx as usize).unwrap_or_default(),
            idx
        ),
        IndexKind::Type => format!("{} // type@{:04x}", resolver::type_name(dex, idx), idx),
        IndexKind::Field => format!(
            "{} // field@{:04x}",
            resolver::field_signature(dex, idx),
            idx
        ),
        IndexKind::Method => format!(
            "{} // method@{:04x}",
            resolver::method_signature(dex, idx),
            idx
        ),
        IndexKind::None => format!("@{:04x}", idx),
    }
}

/// Render the instruction at unit `unit` as one line of dalvik disassembly.
///
/// `insns` is the full instruction stream of a single method; branch targets
/// print as absolute unit offsets within it.
pub fn render(dex: &Dex, insns: &[u8], unit: usize) -> String {
    let byte_off = unit * 2;
    let opcode = insns[byte_off];
    let b1 = insns[byte_off + 1];
    let info = &OPCODES[opcode as usize];

    // switch/array payloads masquerade as nop
    if opcode == 0x00 && b1 != 0 {
        let what = match b1 {
            PACKED_SWITCH_PAYLOAD => "packed-switch-payload",
            SPARSE_SWITCH_PAYLOAD => "sparse-switch-payload",
            FILL_ARRAY_DATA_PAYLOAD => "fill-array-data-payload",
            _ => "nop",
        };
        return format!("{:04x}: {}", unit, what);
    }

    let va = (b1 & 0x0f) as u32;
    let vb = (b1 >> 4) as u32;
    let vaa = b1 as u32;
    let u1 = read_u16(insns, byte_off + 2).unwrap_or(0);
    let u2 = read_u16(insns, byte_off + 4).unwrap_or(0);

    let operands = match info.format {
        Format10x => String::new(),
        Format12x => format!(" v{}, v{}", va, vb),
        Format11n => format!(" v{}, #{}", va, ((b1 as i8) >> 4) as i32),
        Format11x => format!(" v{}", vaa),
        Format10t => format!(" -> {:04x}", unit as i64 + (b1 as i8) as i64),
        Format20t => format!(" -> {:04x}", unit as i64 + (u1 as i16) as i64),
        Format22x => format!(" v{}, v{}", vaa, u1),
        Format21t => format!(" v{}, -> {:04x}", vaa, unit as i64 + (u1 as i16) as i64),
        Format21s => format!(" v{}, #{}", vaa, u1 as i16),
        Format21h => format!(" v{}, #0x{:04x}0000", vaa, u1),
        Format21c => format!(" v{}, {}", vaa, index_comment(dex, opcode, u1 as u32)),
        Format23x => format!(" v{}, v{}, v{}", vaa, u1 & 0xff, u1 >> 8),
        Format22b => format!(" v{}, v{}, #{}", vaa, u1 & 0xff, (u1 >> 8) as u8 as i8),
        Format22t => format!(" v{}, v{}, -> {:04x}", va, vb, unit as i64 + (u1 as i16) as i64),
        Format22s => format!(" v{}, v{}, #{}", va, vb, u1 as i16),
        Format22c => format!(" v{}, v{}, {}", va, vb, index_comment(dex, opcode, u1 as u32)),
        Format22cs => format!(" v{}, v{}, [obj+{:04x}]", va, vb, u1),
        Format30t => {
            let target = read_u32(insns, byte_off + 2).unwrap_or(0) as i32;
            format!(" -> {:04x}", unit as i64 + target as i64)
        }
        Format32x => format!(" v{}, v{}", u1, u2),
        Format31i => format!(" v{}, #{}", vaa, read_u32(insns, byte_off + 2).unwrap_or(0) as i32),
        Format31t => {
            let target = read_u32(insns, byte_off + 2).unwrap_or(0) as i32;
            format!(" v{}, -> {:04x}", vaa, unit as i64 + target as i64)
        }
        Format31c => {
            let idx = read_u32(insns, byte_off + 2).unwrap_or(0);
            format!(" v{}, {}", vaa, index_comment(dex, opcode, idx))
        }
        Format35c | Format35ms => {
            let count = (vb & 0x0f) as usize;
            let regs = [
                (u2 & 0x000f) as u32,
                ((u2 >> 4) & 0x000f) as u32,
                ((u2 >> 8) & 0x000f) as u32,
                ((u2 >> 12) & 0x000f) as u32,
                va,
            ];
            let list = regs[..count.min(5)]
                .iter()
                .map(|r| format!("v{}", r))
                .collect::<Vec<_>>()
                .join(", ");
            if info.format == Format35ms {
                format!(" {{{}}}, vtable@{:04x}", list, u1)
            } else {
                format!(" {{{}}}, {}", list, index_comment(dex, opcode, u1 as u32))
            }
        }
        Format3rc | Format3rms => {
            let count = vaa;
            let first = u2 as u32;
            let last = first + count.saturating_sub(1);
            if info.format == Format3rms {
                format!(" {{v{}..v{}}}, vtable@{:04x}", first, last, u1)
            } else {
                format!(
                    " {{v{}..v{}}}, {}",
                    first,
                    last,
                    index_comment(dex, opcode, u1 as u32)
                )
            }
        }
        Format45cc | Format4rcc => {
            let proto = read_u16(insns, byte_off + 6).unwrap_or(0);
            format!(
                " {}, proto@{:04x}",
                index_comment(dex, opcode, u1 as u32),
                proto
            )
        }
        Format51l => {
            let lo = read_u32(insns, byte_off + 2).unwrap_or(0) as u64;
            let hi = read_u32(insns, byte_off + 6).unwrap_or(0) as u64;
            format!(" v{}, #{}", vaa, ((hi << 32) | lo) as i64)
        }
    };

    format!("{:04x}: {}{}", unit, info.name, operands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::Dex;
    use crate::test_fixtures::build_dex_with_insns;

    #[test]
    fn format_widths() {
        assert_eq!(OPCODES[0x0e].format.units(), 1); // return-void
        assert_eq!(OPCODES[0x52].format.units(), 2); // iget
        assert_eq!(OPCODES[0x6e].format.units(), 3); // invoke-virtual
        assert_eq!(OPCODES[0x18].format.units(), 5); // const-wide
    }

    #[test]
    fn quickened_mapping_is_width_preserving() {
        for opcode in 0u8..=255 {
            if let Some(reverted) = unquickened_opcode(opcode) {
                assert_eq!(
                    OPCODES[opcode as usize].format.units(),
                    OPCODES[reverted as usize].format.units(),
                    "{} -> {}",
                    OPCODES[opcode as usize].name,
                    OPCODES[reverted as usize].name,
                );
            }
        }
    }

    #[test]
    fn packed_switch_payload_width() {
        // payload with 2 targets: ident, size, first_key (2), targets (2 * 2)
        let insns: &[u8] = &[
            0x00, 0x01, // packed-switch-payload
            0x02, 0x00, // size = 2
            0x00, 0x00, 0x00, 0x00, // first_key
            0x05, 0x00, 0x00, 0x00, // target 0
            0x07, 0x00, 0x00, 0x00, // target 1
        ];
        assert_eq!(insn_units(insns, 0).unwrap(), 8);
    }

    #[test]
    fn fill_array_payload_width_rounds_up() {
        // 3 byte-wide elements: (3 * 1 + 1) / 2 + 4 = 6 units
        let mut insns = vec![0x00, 0x03, 0x01, 0x00];
        insns.extend_from_slice(&3u32.to_le_bytes());
        insns.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0x00]);
        assert_eq!(insn_units(&insns, 0).unwrap(), 6);
    }

    #[test]
    fn overrun_is_detected() {
        // invoke-virtual needs 3 units but only 1 is present
        let insns: &[u8] = &[0x6e, 0x10];
        assert!(matches!(
            insn_units(insns, 0),
            Err(DexError::InstructionOverrun { .. })
        ));
    }

    #[test]
    fn render_field_access() {
        let (data, _) = build_dex_with_insns(&[0x000e]);
        let dex = Dex::new(data).unwrap();

        // iget v0, v1, field@0000
        let insns: &[u8] = &[0x52, 0x10, 0x00, 0x00];
        let line = render(&dex, insns, 0);
        assert!(line.contains("iget v0, v1"), "{}", line);
        assert!(line.contains("LFoo;.x:I"), "{}", line);
    }

    #[test]
    fn render_quickened_invoke() {
        let (data, _) = build_dex_with_insns(&[0x000e]);
        let dex = Dex::new(data).unwrap();

        // invoke-virtual-quick {v1}, vtable@0004
        let insns: &[u8] = &[0xe9, 0x10, 0x04, 0x00, 0x01, 0x00];
        let line = render(&dex, insns, 0);
        assert!(line.contains("invoke-virtual-quick"), "{}", line);
        assert!(line.contains("vtable@0004"), "{}", line);
    }
}
