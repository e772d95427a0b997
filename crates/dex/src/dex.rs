use std::borrow::Cow;
use std::sync::Arc;

use bitflags::bitflags;
use simd_adler32::Adler32;
use winnow::binary::{be_u16, be_u32, le_u16, le_u32, u8};
use winnow::combinator::repeat;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::DexError;
use crate::leb128::uleb128;

/// The constant is used to indicate the endiannes of the file in whic it is found.
///
/// This constant means - little-endian.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#endian-constant>
pub const ENDIAN_CONSTANT: u32 = 0x12345678;

/// The constant is used to indicate the endiannes of the file in whic it is found.
///
/// This constant means - big-endian.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#endian-constant>
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

/// The constant is used to indicate that an index value is absent.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#no-index>
pub const NO_INDEX: u32 = u32::MAX;

/// Byte offset of the adler32 checksum field inside the dex header.
pub const CHECKSUM_OFFSET: usize = 8;

/// First byte covered by the adler32 checksum (everything after the checksum itself).
pub const CHECKSUM_DATA_START: usize = 12;

#[derive(Debug)]
pub struct Dex {
    /// Private copy of the dex file, mutated in place by the unquickener
    data: Vec<u8>,

    /// Information about dex header
    pub header: DexHeader,

    /// Dex strings
    pub string_ids: Vec<u32>,

    /// Dex types
    pub type_ids: Vec<u32>,

    /// Dex prototype items
    pub proto_ids: Vec<ProtoItem>,

    /// Dex field items
    pub field_ids: Vec<FieldItem>,

    /// Dex method items
    pub method_ids: Vec<MethodItem>,

    /// Dex class items
    pub class_defs: Vec<ClassItem>,
}

impl Dex {
    /// Parse given dex file
    ///
    /// ```ignore
    /// let dex = Dex::new(data).expect("can't parse dex file");
    /// ```
    pub fn new(data: Vec<u8>) -> Result<Dex, DexError> {
        let input = &mut &data[..];

        let header = Self::parse_dex_header(input).map_err(|_| DexError::InvalidHeader)?;

        let string_ids = repeat(header.string_ids_size as usize, le_u32)
            .parse_next(input)
            .map_err(|_: ContextError| DexError::StringError)?;

        let type_ids = repeat(header.type_ids_size as usize, le_u32)
            .parse_next(input)
            .map_err(|_: ContextError| DexError::TypeError)?;

        let proto_ids = repeat(header.proto_ids_size as usize, ProtoItem::parse)
            .parse_next(input)
            .map_err(|_| DexError::ProtoError)?;

        let field_ids = repeat(header.field_ids_size as usize, FieldItem::parse)
            .parse_next(input)
            .map_err(|_| DexError::FieldError)?;

        let method_ids = repeat(header.method_ids_size as usize, MethodItem::parse)
            .parse_next(input)
            .map_err(|_| DexError::MethodError)?;

        let class_defs = repeat(header.class_defs_size as usize, ClassItem::parse)
            .parse_next(input)
            .map_err(|_| DexError::ClassError)?;

        log::debug!(
            "parsed dex: {} strings, {} types, {} methods, {} classes",
            header.string_ids_size,
            header.type_ids_size,
            header.method_ids_size,
            header.class_defs_size
        );

        Ok(Dex {
            data,
            header,
            string_ids,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
        })
    }

    fn parse_dex_header(input: &mut &[u8]) -> ModalResult<DexHeader> {
        let (magic, _, version, _) = (
            be_u32.verify(|magic| *magic == 0x6465780A),
            u8.verify(|v| *v == 0x30),
            be_u16.try_map(DexVersion::try_from),
            u8.verify(|v| *v == 0x00),
        )
            .parse_next(input)?;

        let (
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        ) = (
            le_u32,                                                                         // checksum
            take(20usize).map(Arc::from), // signature
            le_u32,                       // file_size
            le_u32,                       // header_size
            le_u32.verify(|&tag| tag == ENDIAN_CONSTANT || tag == REVERSE_ENDIAN_CONSTANT), // endian_tag
            le_u32,                                         // link_size
            le_u32,                                         // link_off
            le_u32,                                         // map_off
            le_u32,                                         // string_ids_size
            le_u32,                                         // string_ids_off
            le_u32.verify(|&size| size <= u16::MAX.into()), // type_ids_size
            le_u32,                                         // type_ids_off
            le_u32.verify(|&size| size <= u16::MAX.into()), // proto_ids_size
            le_u32,                                         // proto_ids_off
            le_u32,                                         // field_ids_size
            le_u32,                                         // field_ids_off
            le_u32,                                         // method_ids_size
            le_u32,                                         // method_ids_off
            le_u32,                                         // class_defs_size
            le_u32,                                         // class_defs_off
            le_u32,                                         // data_size
            le_u32,                                         // data_off
        )
            .parse_next(input)?;

        Ok(DexHeader {
            magic,
            version,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        })
    }

    /// Borrow the underlying file bytes
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for in-place bytecode rewrites
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get_string(&self, idx: usize) -> Option<Cow<'_, str>> {
        let offset = *self.string_ids.get(idx)? as usize;
        let mut data = self.data.get(offset..)?;

        let utf16size = uleb128(&mut data).ok()?;
        let bytes = take::<usize, &[u8], ContextError>(utf16size as usize)
            .parse_next(&mut data)
            .ok()?;

        Some(simd_cesu8::mutf8::decode_lossy(bytes))
    }

    #[inline]
    pub fn get_type(&self, idx: usize) -> Option<Cow<'_, str>> {
        let idx = *self.type_ids.get(idx)?;
        self.get_string(idx as usize)
    }

    /// Compute the adler32 checksum over everything after the checksum field
    pub fn compute_checksum(&self) -> u32 {
        let mut adler = Adler32::new();
        adler.write(&self.data[CHECKSUM_DATA_START..]);
        adler.finish()
    }

    /// Recompute and store the header checksum.
    ///
    /// Rewritten bytecode invalidates the original value, so this must run after
    /// every unquicken pass before the file is emitted.
    pub fn repair_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        self.header.checksum = checksum;
    }
}

/// Known dex versions
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#dex-file-magic>
#[derive(Default, Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum DexVersion {
    #[default]
    DEX35,
    DEX36,
    DEX37,
    DEX38,
    DEX39,
}

impl TryFrom<u16> for DexVersion {
    type Error = DexError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x3335 => Ok(DexVersion::DEX35),
            0x3336 => Ok(DexVersion::DEX36),
            0x3337 => Ok(DexVersion::DEX37),
            0x3338 => Ok(DexVersion::DEX38),
            0x3339 => Ok(DexVersion::DEX39),
            _ => Err(DexError::UnknownVersion(value)),
        }
    }
}

impl From<DexVersion> for u32 {
    fn from(value: DexVersion) -> Self {
        match value {
            DexVersion::DEX35 => 35,
            DexVersion::DEX36 => 36,
            DexVersion::DEX37 => 37,
            DexVersion::DEX38 => 38,
            DexVersion::DEX39 => 39,
        }
    }
}

/// Abstraction over dex header
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#header-item>
#[derive(Default, Debug, Clone)]
pub struct DexHeader {
    /// Magic value
    pub magic: u32,

    /// Known dex version
    pub version: DexVersion,

    /// Adler32 checksum of the file
    ///
    /// Used to detect file corruption
    pub checksum: u32,

    /// SHA-1 signature of the file
    ///
    /// Used to uniquely identify files
    pub signature: Arc<[u8]>,

    /// Size of the entire file (including the header) in bytes
    pub file_size: u32,

    /// Size of the header (this entire section) in bytes
    pub header_size: u32,

    /// Endiannes tag - [ENDIAN_CONSTANT] or [REVERSE_ENDIAN_CONSTANT]
    pub endian_tag: u32,

    /// Size of the link section
    ///
    /// 0 - if this file isn't statically linked
    pub link_size: u32,

    /// Offset from the start of the file to the link section
    ///
    /// 0 - if `link_size == 0`
    pub link_off: u32,

    /// Offset from the start of the file to the map item
    pub map_off: u32,

    /// Count of strings in the string identifiers list
    pub string_ids_size: u32,

    /// Offset from the start of the file to the string identifiers list
    ///
    /// 0 - if `string_ids_size == 0`
    pub string_ids_off: u32,

    /// Count of elements in the type identifiers list, at most 65535
    pub type_ids_size: u32,

    /// Offset from the start of the file to the type identifiers list
    ///
    /// 0 - if `type_ids_size == 0`
    pub type_ids_off: u32,

    /// Count of elements in the prototype identifiers list, at most 65535
    pub proto_ids_size: u32,

    /// Offset from the start of the file to the prototype identifiers list
    ///
    /// 0 - if `proto_ids_size == 0`
    pub proto_ids_off: u32,

    /// Count of elements in the field identifiers list
    pub field_ids_size: u32,

    /// Offset from the start of the file to the field identifiers list
    ///
    /// 0 - if `field_ids_size == 0`
    pub field_ids_off: u32,

    /// Count of elements in the method identifiers list
    pub method_ids_size: u32,

    /// Offset from the start of the file to the method identifiers list
    ///
    /// 0 - if `method_ids_size == 0`
    pub method_ids_off: u32,

    /// Count of elements in the class definitions list
    pub class_defs_size: u32,

    /// Offset from the start of the file to the class definitions list
    ///
    /// 0 - if `class_defs_size == 0`
    pub class_defs_off: u32,

    /// Size of `data` section in bytes
    pub data_size: u32,

    /// Offset from the start of the file to the start of the `data` section
    pub data_off: u32,
}

/// Abstraction over `proto_id_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#proto-id-item>
#[derive(Debug)]
pub struct ProtoItem {
    /// Index into the [Dex::string_ids] list for the short-form descriptor string of this prototype
    pub shorty_idx: u32,

    /// Index into the [Dex::type_ids] list for the return type of this prototype
    pub return_type_idx: u32,

    /// Offset from the start of the file to the list of parameter types for this prototype
    ///
    /// 0 - if this prototype has no parameters
    pub parameters_off: u32,
}

impl ProtoItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<ProtoItem> {
        (le_u32, le_u32, le_u32)
            .map(|(shorty_idx, return_type_idx, parameters_off)| ProtoItem {
                shorty_idx,
                return_type_idx,
                parameters_off,
            })
            .parse_next(input)
    }
}

/// Abstraction over `field_id_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#field-id-item>
#[derive(Debug)]
pub struct FieldItem {
    /// Index into the [Dex::type_ids] list for the definer of this field
    pub class_idx: u16,

    /// Index into the [Dex::type_ids] list for the type of this field
    pub type_idx: u16,

    /// Index into the [Dex::string_ids] list for the name of this field
    pub name_idx: u32,
}

impl FieldItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<FieldItem> {
        (le_u16, le_u16, le_u32)
            .map(|(class_idx, type_idx, name_idx)| FieldItem {
                class_idx,
                type_idx,
                name_idx,
            })
            .parse_next(input)
    }
}

/// Abstraction over `method_id_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#method-id-item>
#[derive(Debug)]
pub struct MethodItem {
    /// Index into the [Dex::type_ids] list for the definer of this method
    pub class_idx: u16,

    /// Index into the [Dex::proto_ids] list for the prototype of this method
    pub proto_idx: u16,

    /// Index into the [Dex::string_ids] list for the name of this method
    pub name_idx: u32,
}

impl MethodItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<MethodItem> {
        (le_u16, le_u16, le_u32)
            .map(|(class_idx, proto_idx, name_idx)| MethodItem {
                class_idx,
                proto_idx,
                name_idx,
            })
            .parse_next(input)
    }
}

/// Abstraction over `class_def_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#class-def-item>
#[derive(Debug)]
pub struct ClassItem {
    /// Index into the [Dex::type_ids] list for this class
    pub class_idx: u32,

    /// Access flags for the class
    pub access_flags: AccessFlags,

    /// Index into the [Dex::type_ids] list for the superclass
    ///
    /// [NO_INDEX] - if this class has no superclass  (i.e., it is a root class such as `Object`)
    pub superclass_idx: u32,

    /// Offset from the start of the file to the list of interfaces
    ///
    /// `0` - if there are none
    pub interfaces_off: u32,

    /// Index into the [Dex::string_ids] list for the name of the file containing
    /// the original source for (at least most of) this class
    ///
    /// [NO_INDEX] - lack of this information
    pub source_file_idx: u32,

    /// Offset from the start of the file to the annotations structure for this class
    ///
    /// `0` - if there are no annotations on this class
    pub annotations_off: u32,

    /// Offset from the start of the file to the associated class data for this item
    ///
    /// `0` - if there is no class data for this class
    pub class_data_off: u32,

    /// Offset from the start of the file to the list of initial values for `static` fields
    ///
    /// `0` - if there are none (and all `static` fields are to be initialized with `0` or `null`)
    pub static_values_off: u32,
}

impl ClassItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<ClassItem> {
        (
            le_u32,
            le_u32.map(AccessFlags::from_bits_truncate),
            le_u32,
            le_u32,
            le_u32,
            le_u32,
            le_u32,
            le_u32,
        )
            .map(
                |(
                    class_idx,
                    access_flags,
                    superclass_idx,
                    interfaces_off,
                    source_file_idx,
                    annotations_off,
                    class_data_off,
                    static_values_off,
                )| ClassItem {
                    class_idx,
                    access_flags,
                    superclass_idx,
                    interfaces_off,
                    source_file_idx,
                    annotations_off,
                    class_data_off,
                    static_values_off,
                },
            )
            .parse_next(input)
    }
}

bitflags! {
    /// Represents the access flags used in Android class files for classes, fields, and methods.
    ///
    /// Each flag corresponds to a bitmask defined by the Android/Java class file format.
    ///
    /// See: <https://source.android.com/docs/core/runtime/dex-format#access-flags>
    #[derive(Debug, Clone, Copy)]
    pub struct AccessFlags: u32 {
        /// `ACC_PUBLIC (0x0001)`: Visible everywhere for classes, fields, and methods.
        const PUBLIC = 0x0001;

        /// `ACC_PRIVATE (0x0002)`: Visible only to the defining class.
        const PRIVATE = 0x0002;

        /// `ACC_PROTECTED (0x0004)`: Visible to the package and subclasses.
        const PROTECTED = 0x0004;

        /// `ACC_STATIC (0x0008)`: Static modifier.
        const STATIC = 0x0008;

        /// `ACC_FINAL (0x0010)`: Final modifier.
        const FINAL = 0x0010;

        /// `ACC_SYNCHRONIZED (0x0020)`: For methods only.
        const SYNCHRONIZED = 0x0020;

        /// `ACC_VOLATILE (0x0040)`: For fields only.
        const VOLATILE = 0x0040;

        /// `ACC_BRIDGE (0x0040)`: For methods only.
        const BRIDGE = 0x0040;

        /// `ACC_TRANSIENT (0x0080)`: For fields only.
        const TRANSIENT = 0x0080;

        /// `ACC_VARARGS (0x0080)`: For methods only.
        const VARARGS = 0x0080;

        /// `ACC_NATIVE (0x0100)`: For methods only.
        const NATIVE = 0x0100;

        /// `ACC_INTERFACE (0x0200)`: Class is an interface.
        const INTERFACE = 0x0200;

        /// `ACC_ABSTRACT (0x0400)`: Not directly instantiable / unimplemented.
        const ABSTRACT = 0x0400;

        /// `ACC_STRICT (0x0800)`: For methods only (`strictfp`).
        const STRICT = 0x0800;

        /// `ACC_SYNTHETIC (0x1000)`: Not directly defined in source code.
        const SYNTHETIC = 0x1000;

        /// `ACC_ANNOTATION (0x2000)`: Declares an annotation class.
        const ANNOTATION = 0x2000;

        /// `ACC_ENUM (0x4000)`: Enum type or enum field.
        const ENUM = 0x4000;

        /// `ACC_CONSTRUCTOR (0x10000)`: Marks a constructor or initializer method.
        const CONSTRUCTOR = 0x10000;

        /// `ACC_DECLARED_SYNCHRONIZED (0x20000)`: Explicitly declared synchronized.
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    /// Lowercase space-joined flag names, as printed in disassembly headers
    pub fn names(self) -> String {
        let mut out = Vec::new();
        for (name, flag) in [
            ("public", Self::PUBLIC),
            ("private", Self::PRIVATE),
            ("protected", Self::PROTECTED),
            ("static", Self::STATIC),
            ("final", Self::FINAL),
            ("synchronized", Self::SYNCHRONIZED),
            ("volatile", Self::VOLATILE),
            ("native", Self::NATIVE),
            ("interface", Self::INTERFACE),
            ("abstract", Self::ABSTRACT),
            ("synthetic", Self::SYNTHETIC),
            ("annotation", Self::ANNOTATION),
            ("enum", Self::ENUM),
            ("constructor", Self::CONSTRUCTOR),
        ] {
            if self.contains(flag) {
                out.push(name);
            }
        }
        out.join(" ")
    }
}
