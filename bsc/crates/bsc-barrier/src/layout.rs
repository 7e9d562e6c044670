//! Runtime layout the barrier fragments are compiled against
//!
//! Thread-local offsets are relative to the current thread register. Table
//! addresses are absolute.

use serde::{Deserialize, Serialize};

/// Bits of the per-thread gc-state byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GcStateFlags(pub u8);

impl GcStateFlags {
    pub const HAS_FORWARDED_BIT: u8 = 0;
    pub const MARKING_BIT: u8 = 1;
    pub const EVACUATION_BIT: u8 = 2;
    pub const UPDATE_REFS_BIT: u8 = 3;
    pub const WEAK_ROOTS_BIT: u8 = 4;
    pub const YOUNG_MARKING_BIT: u8 = 5;
    pub const OLD_MARKING_BIT: u8 = 6;

    pub const STABLE: GcStateFlags = GcStateFlags(0);
    pub const HAS_FORWARDED: GcStateFlags = GcStateFlags(1 << Self::HAS_FORWARDED_BIT);
    pub const MARKING: GcStateFlags = GcStateFlags(1 << Self::MARKING_BIT);
    pub const EVACUATION: GcStateFlags = GcStateFlags(1 << Self::EVACUATION_BIT);
    pub const UPDATE_REFS: GcStateFlags = GcStateFlags(1 << Self::UPDATE_REFS_BIT);
    pub const WEAK_ROOTS: GcStateFlags = GcStateFlags(1 << Self::WEAK_ROOTS_BIT);
    pub const YOUNG_MARKING: GcStateFlags = GcStateFlags(1 << Self::YOUNG_MARKING_BIT);
    pub const OLD_MARKING: GcStateFlags = GcStateFlags(1 << Self::OLD_MARKING_BIT);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: GcStateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: GcStateFlags) -> GcStateFlags {
        GcStateFlags(self.0 | other.0)
    }

    pub const fn difference(self, other: GcStateFlags) -> GcStateFlags {
        GcStateFlags(self.0 & !other.0)
    }

    pub const fn is_stable(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for GcStateFlags {
    type Output = GcStateFlags;

    fn bitor(self, rhs: GcStateFlags) -> GcStateFlags {
        self.union(rhs)
    }
}

/// Card value written by post-write barriers
pub const DIRTY_CARD: u8 = 0;
/// Card value of an untouched card
pub const CLEAN_CARD: u8 = 0xff;

/// Byte offsets and table addresses consumed by barrier fragments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierLayout {
    /// gc-state byte, thread-relative
    pub gc_state_offset: i32,
    /// SATB marking-active byte, thread-relative
    pub satb_marking_active_offset: i32,
    /// SATB buffer base pointer, thread-relative
    pub satb_buffer_offset: i32,
    /// SATB index (byte offset into the buffer), thread-relative
    pub satb_index_offset: i32,

    /// Collection-set table: one byte per region
    pub cset_table_address: u64,
    /// `log2(region size)`
    pub region_size_shift: u8,

    /// Card table base, present when card marking is available
    pub card_table_address: Option<u64>,
    /// `log2(card size)`
    pub card_shift: u8,

    /// Word holding the total number of completed collections
    pub gc_total_collections_address: u64,

    /// Offset of the referent field within reference objects
    pub referent_offset: i64,
    /// Offset of the class pointer within every object
    pub klass_offset: i64,
    /// Offset of the reference-type byte within class metadata; nonzero marks reference classes
    pub klass_reference_type_offset: i64,

    /// Machine word size in bytes
    pub word_size: u8,
}

impl BarrierLayout {
    /// Machine word size as an immediate
    pub fn word(&self) -> i64 {
        i64::from(self.word_size)
    }
}
