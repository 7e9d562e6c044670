//! Mutator thread blocks
//!
//! Each attached thread owns a block in the thread area that compiled code reaches
//! through the thread register, and a private SATB buffer.
//!
//! Thread Block:
//! ```text
//! +0   gc-state byte
//! +1   SATB marking-active byte
//! +8   SATB buffer address
//! +16  SATB index, a byte offset into the buffer counting down to 0
//! ```

use bsc_barrier::{BarrierLayout, GcStateFlags};

use crate::config::{HeapConfig, SATB_AREA_BASE, TLS_AREA_BASE, TLS_BLOCK_SIZE};
use crate::error::Result;
use crate::heap::Heap;

pub const GC_STATE_OFFSET: i32 = 0;
pub const SATB_MARKING_ACTIVE_OFFSET: i32 = 1;
pub const SATB_BUFFER_OFFSET: i32 = 8;
pub const SATB_INDEX_OFFSET: i32 = 16;

/// Handle to an attached mutator thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutatorThread {
    pub id: usize,
    /// Address of the thread block
    pub tls: u64,
    pub satb_buffer: u64,
    /// Buffer capacity in bytes; the index of an empty buffer
    pub satb_capacity: u64,
}

impl MutatorThread {
    pub(crate) fn new(id: usize, config: &HeapConfig) -> Self {
        let capacity = config.satb_buffer_bytes();
        Self {
            id,
            tls: TLS_AREA_BASE + id as u64 * TLS_BLOCK_SIZE,
            satb_buffer: SATB_AREA_BASE + id as u64 * capacity,
            satb_capacity: capacity,
        }
    }

    fn field(&self, offset: i32) -> u64 {
        self.tls.wrapping_add(offset as u64)
    }

    /// Write a fresh thread block
    pub(crate) fn initialize(&self, heap: &Heap, state: GcStateFlags, marking: bool) -> Result<()> {
        self.publish(heap, state, marking)?;
        heap.write_u64(self.field(SATB_BUFFER_OFFSET), self.satb_buffer)?;
        self.set_satb_index(heap, self.satb_capacity)
    }

    /// Store the collector's state into this thread's block
    pub(crate) fn publish(&self, heap: &Heap, state: GcStateFlags, marking: bool) -> Result<()> {
        heap.write_u8(self.field(GC_STATE_OFFSET), state.bits())?;
        heap.write_u8(self.field(SATB_MARKING_ACTIVE_OFFSET), u8::from(marking))
    }

    pub fn gc_state(&self, heap: &Heap) -> Result<GcStateFlags> {
        Ok(GcStateFlags(heap.read_u8(self.field(GC_STATE_OFFSET))?))
    }

    pub fn marking_active(&self, heap: &Heap) -> Result<bool> {
        Ok(heap.read_u8(self.field(SATB_MARKING_ACTIVE_OFFSET))? != 0)
    }

    pub fn satb_index(&self, heap: &Heap) -> Result<u64> {
        heap.read_u64(self.field(SATB_INDEX_OFFSET))
    }

    pub(crate) fn set_satb_index(&self, heap: &Heap, index: u64) -> Result<()> {
        heap.write_u64(self.field(SATB_INDEX_OFFSET), index)
    }

    /// Entries currently logged in the buffer
    pub fn satb_len(&self, heap: &Heap) -> Result<usize> {
        Ok(((self.satb_capacity - self.satb_index(heap)?) / 8) as usize)
    }

    /// Logged entries, oldest first
    pub fn satb_entries(&self, heap: &Heap) -> Result<Vec<u64>> {
        let index = self.satb_index(heap)?;
        let mut entries = Vec::new();
        let mut slot = self.satb_capacity;
        while slot > index {
            slot -= 8;
            entries.push(heap.read_u64(self.satb_buffer + slot)?);
        }
        Ok(entries)
    }
}

/// Layout handed to the barrier set so compiled code matches these blocks
pub fn barrier_layout(config: &HeapConfig) -> BarrierLayout {
    use crate::config::{CARD_TABLE_BASE, CSET_TABLE_BASE, TOTAL_COLLECTIONS_ADDRESS};
    use crate::object::{KLASS_OFFSET, KLASS_REFERENCE_TYPE_OFFSET, REFERENT_OFFSET};

    BarrierLayout {
        gc_state_offset: GC_STATE_OFFSET,
        satb_marking_active_offset: SATB_MARKING_ACTIVE_OFFSET,
        satb_buffer_offset: SATB_BUFFER_OFFSET,
        satb_index_offset: SATB_INDEX_OFFSET,
        cset_table_address: CSET_TABLE_BASE,
        region_size_shift: config.region_size_shift,
        card_table_address: Some(CARD_TABLE_BASE),
        card_shift: config.card_shift,
        gc_total_collections_address: TOTAL_COLLECTIONS_ADDRESS,
        referent_offset: REFERENT_OFFSET as i64,
        klass_offset: KLASS_OFFSET as i64,
        klass_reference_type_offset: KLASS_REFERENCE_TYPE_OFFSET as i64,
        word_size: 8,
    }
}
