//! Object and class layout
//!
//! Object Layout:
//! ```text
//! +0   mark word      (forwarding pointer | 0b11 once evacuated)
//! +8   klass address
//! +16  first field    (the referent in reference classes)
//! ```
//!
//! Klass Layout:
//! ```text
//! +0   reference type byte (0 = ordinary class)
//! +4   instance size, u32
//! ```

use serde::{Deserialize, Serialize};

pub const MARK_WORD_OFFSET: u64 = 0;
pub const KLASS_OFFSET: u64 = 8;
pub const HEADER_SIZE: u64 = 16;
pub const REFERENT_OFFSET: u64 = HEADER_SIZE;

pub const KLASS_REFERENCE_TYPE_OFFSET: u64 = 0;
pub const KLASS_INSTANCE_SIZE_OFFSET: u64 = 4;
/// Bytes reserved per class in the klass area
pub const KLASS_SLOT_SIZE: u64 = 64;

/// Mark word tag of a forwarded object
pub const FORWARDED_TAG: u64 = 0b11;

pub const OBJECT_ALIGNMENT: u64 = 8;

/// Reference type recorded in the klass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReferenceType {
    None = 0,
    Soft = 1,
    Weak = 2,
    Final = 3,
    Phantom = 4,
}

impl ReferenceType {
    pub fn is_reference(self) -> bool {
        self != ReferenceType::None
    }
}

/// Class description registered with the heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    /// Header included
    pub instance_size: u32,
    pub reference_type: ReferenceType,
}

impl ClassInfo {
    /// Ordinary class with `fields` reference-sized fields
    pub fn plain(name: impl Into<String>, fields: u32) -> Self {
        Self {
            name: name.into(),
            instance_size: HEADER_SIZE as u32 + fields * 8,
            reference_type: ReferenceType::None,
        }
    }

    /// Reference class whose first field is the referent
    pub fn reference(name: impl Into<String>, reference_type: ReferenceType) -> Self {
        Self {
            name: name.into(),
            instance_size: HEADER_SIZE as u32 + 16,
            reference_type,
        }
    }
}

/// Mark word of an object forwarded to `to`
pub fn forwarding_word(to: u64) -> u64 {
    to | FORWARDED_TAG
}

/// Forwardee encoded in a mark word, if any
pub fn decode_forwarding(mark: u64) -> Option<u64> {
    if mark & FORWARDED_TAG == FORWARDED_TAG {
        Some(mark & !FORWARDED_TAG)
    } else {
        None
    }
}

pub fn align_up(size: u64) -> u64 {
    (size + OBJECT_ALIGNMENT - 1) & !(OBJECT_ALIGNMENT - 1)
}
