//! Simulated region heap
//!
//! Owns the whole simulated address space: side tables, class metadata, thread
//! blocks, SATB buffers and the region-partitioned heap. Objects are bump-allocated
//! into one allocation region at a time; regions are never reclaimed.
//!
//! # Locking
//!
//! `state` (allocation, object registry, marks, collection set) is always taken
//! before `memory`. Memory accesses from mutators take only `memory`.

use std::collections::BTreeMap;

use bsc_barrier::{CLEAN_CARD, DIRTY_CARD};
use bsc_ir::ClassRef;
use bsc_lir::Width;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;

use crate::config::{
    HeapConfig, CARD_TABLE_BASE, CSET_TABLE_BASE, HEAP_BASE, KLASS_AREA_BASE, MAX_CLASSES,
    SATB_AREA_BASE, TLS_AREA_BASE, TLS_BLOCK_SIZE, TOTAL_COLLECTIONS_ADDRESS,
};
use crate::error::{Result, SimError};
use crate::memory::Memory;
use crate::object::{
    align_up, decode_forwarding, forwarding_word, ClassInfo, HEADER_SIZE, KLASS_INSTANCE_SIZE_OFFSET,
    KLASS_OFFSET, KLASS_REFERENCE_TYPE_OFFSET, KLASS_SLOT_SIZE, MARK_WORD_OFFSET,
};

#[derive(Debug, Clone, Copy, Default)]
struct RegionInfo {
    /// Bytes allocated
    used: u64,
    in_cset: bool,
}

#[derive(Debug)]
struct HeapState {
    regions: Vec<RegionInfo>,
    alloc_region: Option<usize>,
    /// Object start -> size
    objects: BTreeMap<u64, u64>,
    marked: FxHashSet<u64>,
}

/// Result of an evacuation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evacuation {
    /// This call made the copy
    Copied(u64),
    /// Another caller got there first
    AlreadyForwarded(u64),
}

impl Evacuation {
    pub fn to(self) -> u64 {
        match self {
            Evacuation::Copied(to) | Evacuation::AlreadyForwarded(to) => to,
        }
    }
}

pub struct Heap {
    config: HeapConfig,
    state: Mutex<HeapState>,
    memory: Mutex<Memory>,
    classes: RwLock<Vec<ClassInfo>>,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Result<Self> {
        config.validate().map_err(SimError::Config)?;

        let heap_end = config.heap_end();
        let mut memory = Memory::new();
        memory.map("cset-table", CSET_TABLE_BASE, heap_end >> config.region_size_shift)?;
        let card_bytes = heap_end >> config.card_shift;
        memory.map("card-table", CARD_TABLE_BASE, card_bytes)?;
        memory.fill(CARD_TABLE_BASE, card_bytes as usize, CLEAN_CARD)?;
        memory.map("collections", TOTAL_COLLECTIONS_ADDRESS, 8)?;
        memory.map("klass-area", KLASS_AREA_BASE, MAX_CLASSES as u64 * KLASS_SLOT_SIZE)?;
        memory.map("thread-blocks", TLS_AREA_BASE, config.max_threads as u64 * TLS_BLOCK_SIZE)?;
        memory.map(
            "satb-buffers",
            SATB_AREA_BASE,
            config.max_threads as u64 * config.satb_buffer_bytes(),
        )?;
        memory.map("heap", HEAP_BASE, heap_end - HEAP_BASE)?;

        log::debug!(
            "heap: {} regions of {}KB at {:#x}",
            config.region_count,
            config.region_size() >> 10,
            HEAP_BASE
        );

        Ok(Self {
            state: Mutex::new(HeapState {
                regions: vec![RegionInfo::default(); config.region_count],
                alloc_region: None,
                objects: BTreeMap::new(),
                marked: FxHashSet::default(),
            }),
            memory: Mutex::new(memory),
            classes: RwLock::new(Vec::new()),
            config,
        })
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn contains(&self, addr: u64) -> bool {
        (HEAP_BASE..self.config.heap_end()).contains(&addr)
    }

    /// Heap region holding `addr`
    pub fn region_of(&self, addr: u64) -> Option<usize> {
        if self.contains(addr) {
            Some(((addr - HEAP_BASE) >> self.config.region_size_shift) as usize)
        } else {
            None
        }
    }

    pub fn region_base(&self, region: usize) -> u64 {
        HEAP_BASE + ((region as u64) << self.config.region_size_shift)
    }

    /// ========================================================================
    /// RAW MEMORY
    /// ========================================================================

    pub fn read(&self, addr: u64, width: Width) -> Result<u64> {
        self.memory.lock().read(addr, width)
    }

    pub fn write(&self, addr: u64, width: Width, value: u64) -> Result<()> {
        self.memory.lock().write(addr, width, value)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        self.memory.lock().read_u8(addr)
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32> {
        self.memory.lock().read_u32(addr)
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        self.memory.lock().read_u64(addr)
    }

    pub fn write_u8(&self, addr: u64, value: u8) -> Result<()> {
        self.memory.lock().write_u8(addr, value)
    }

    pub fn write_u64(&self, addr: u64, value: u64) -> Result<()> {
        self.memory.lock().write_u64(addr, value)
    }

    /// Atomic compare-and-swap; true when `new` was stored
    pub fn compare_and_swap(&self, addr: u64, width: Width, expected: u64, new: u64) -> Result<bool> {
        let mut memory = self.memory.lock();
        if memory.read(addr, width)? != expected {
            return Ok(false);
        }
        memory.write(addr, width, new)?;
        Ok(true)
    }

    /// Atomic exchange returning the previous contents
    pub fn swap(&self, addr: u64, width: Width, value: u64) -> Result<u64> {
        let mut memory = self.memory.lock();
        let old = memory.read(addr, width)?;
        memory.write(addr, width, value)?;
        Ok(old)
    }

    pub fn copy(&self, dst: u64, src: u64, len: usize) -> Result<()> {
        self.memory.lock().copy(dst, src, len)
    }

    pub fn total_collections(&self) -> Result<u64> {
        self.read_u64(TOTAL_COLLECTIONS_ADDRESS)
    }

    pub(crate) fn increment_collections(&self) -> Result<u64> {
        let mut memory = self.memory.lock();
        let next = memory.read_u64(TOTAL_COLLECTIONS_ADDRESS)? + 1;
        memory.write_u64(TOTAL_COLLECTIONS_ADDRESS, next)?;
        Ok(next)
    }

    /// ========================================================================
    /// CLASSES
    /// ========================================================================

    /// Register a class and write its klass metadata
    pub fn define_class(&self, info: ClassInfo) -> Result<ClassRef> {
        let mut classes = self.classes.write();
        if classes.len() >= MAX_CLASSES {
            return Err(SimError::Config(format!("more than {} classes", MAX_CLASSES)));
        }
        if u64::from(info.instance_size) < HEADER_SIZE {
            return Err(SimError::Config(format!(
                "class {} is smaller than an object header",
                info.name
            )));
        }
        let klass = KLASS_AREA_BASE + classes.len() as u64 * KLASS_SLOT_SIZE;
        {
            let mut memory = self.memory.lock();
            memory.write_u8(klass + KLASS_REFERENCE_TYPE_OFFSET, info.reference_type as u8)?;
            memory.write_u32(klass + KLASS_INSTANCE_SIZE_OFFSET, info.instance_size)?;
        }
        log::debug!("class {} at {:#x} ({:?})", info.name, klass, info.reference_type);
        classes.push(info);
        Ok(ClassRef(klass))
    }

    pub fn class_info(&self, klass: u64) -> Result<ClassInfo> {
        let offset = klass.wrapping_sub(KLASS_AREA_BASE);
        if offset % KLASS_SLOT_SIZE != 0 {
            return Err(SimError::UnknownClass(klass));
        }
        self.classes
            .read()
            .get((offset / KLASS_SLOT_SIZE) as usize)
            .cloned()
            .ok_or(SimError::UnknownClass(klass))
    }

    pub fn class_of(&self, obj: u64) -> Result<ClassInfo> {
        let klass = self.read_u64(obj + KLASS_OFFSET)?;
        self.class_info(klass)
    }

    /// ========================================================================
    /// ALLOCATION AND EVACUATION
    /// ========================================================================

    /// Allocate a zeroed instance of `class`, at least `size` bytes
    pub fn allocate(&self, class: ClassRef, size: u32) -> Result<u64> {
        let info = self.class_info(class.0)?;
        let size = align_up(u64::from(size.max(info.instance_size)));
        let mut state = self.state.lock();
        let addr = self.bump(&mut state, size)?;
        {
            let mut memory = self.memory.lock();
            memory.fill(addr, size as usize, 0)?;
            memory.write_u64(addr + KLASS_OFFSET, class.0)?;
        }
        state.objects.insert(addr, size);
        log::trace!("allocated {} at {:#x}, {} bytes", info.name, addr, size);
        Ok(addr)
    }

    fn bump(&self, state: &mut HeapState, size: u64) -> Result<u64> {
        let region_size = self.config.region_size();
        if size > region_size {
            return Err(SimError::OutOfMemory { requested: size });
        }
        if let Some(current) = state.alloc_region {
            let region = &mut state.regions[current];
            if region.used + size <= region_size {
                let addr = self.region_base(current) + region.used;
                region.used += size;
                return Ok(addr);
            }
        }
        let next = state
            .regions
            .iter()
            .position(|r| r.used == 0 && !r.in_cset)
            .ok_or(SimError::OutOfMemory { requested: size })?;
        log::trace!("allocation region {} -> {}", state.alloc_region.map_or(-1, |r| r as i64), next);
        state.alloc_region = Some(next);
        state.regions[next].used = size;
        Ok(self.region_base(next))
    }

    pub fn is_object(&self, addr: u64) -> bool {
        self.state.lock().objects.contains_key(&addr)
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn forwardee(&self, obj: u64) -> Result<Option<u64>> {
        Ok(decode_forwarding(self.read_u64(obj + MARK_WORD_OFFSET)?))
    }

    /// The current copy of `obj`
    pub fn resolve(&self, obj: u64) -> Result<u64> {
        Ok(self.forwardee(obj)?.unwrap_or(obj))
    }

    /// Copy `obj` out of its region and install a forwarding pointer
    ///
    /// Idempotent: an object that is already forwarded returns its forwardee.
    pub fn evacuate(&self, obj: u64) -> Result<Evacuation> {
        let mut state = self.state.lock();
        let size = *state
            .objects
            .get(&obj)
            .ok_or_else(|| SimError::trap(format!("evacuating {:#x}, not an object", obj)))?;
        if let Some(to) = decode_forwarding(self.memory.lock().read_u64(obj + MARK_WORD_OFFSET)?) {
            return Ok(Evacuation::AlreadyForwarded(to));
        }
        let to = self.bump(&mut state, size)?;
        {
            let mut memory = self.memory.lock();
            memory.copy(to, obj, size as usize)?;
            memory.write_u64(to + MARK_WORD_OFFSET, 0)?;
            memory.write_u64(obj + MARK_WORD_OFFSET, forwarding_word(to))?;
        }
        state.objects.insert(to, size);
        if state.marked.contains(&obj) {
            state.marked.insert(to);
        }
        log::trace!("evacuated {:#x} -> {:#x}", obj, to);
        Ok(Evacuation::Copied(to))
    }

    /// ========================================================================
    /// COLLECTION SET
    /// ========================================================================

    pub fn in_collection_set(&self, addr: u64) -> bool {
        match self.region_of(addr) {
            Some(region) => self.state.lock().regions[region].in_cset,
            None => false,
        }
    }

    /// Add regions to the collection set and publish them in the table
    pub fn add_to_collection_set(&self, regions: &[usize]) -> Result<()> {
        let mut state = self.state.lock();
        let mut memory = self.memory.lock();
        for &region in regions {
            let info = state
                .regions
                .get_mut(region)
                .ok_or_else(|| SimError::Config(format!("no region {}", region)))?;
            info.in_cset = true;
            let base = self.region_base(region);
            memory.write_u8(CSET_TABLE_BASE + (base >> self.config.region_size_shift), 1)?;
            if state.alloc_region == Some(region) {
                state.alloc_region = None;
            }
        }
        Ok(())
    }

    pub fn clear_collection_set(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut memory = self.memory.lock();
        for (region, info) in state.regions.iter_mut().enumerate() {
            if info.in_cset {
                info.in_cset = false;
                let base = self.region_base(region);
                memory.write_u8(CSET_TABLE_BASE + (base >> self.config.region_size_shift), 0)?;
            }
        }
        Ok(())
    }

    pub fn collection_set(&self) -> Vec<usize> {
        let state = self.state.lock();
        (0..state.regions.len())
            .filter(|&r| state.regions[r].in_cset)
            .collect()
    }

    /// Objects in collection-set regions that have not been forwarded yet
    pub fn unforwarded_in_collection_set(&self) -> Result<Vec<u64>> {
        let candidates: Vec<u64> = {
            let state = self.state.lock();
            state
                .objects
                .keys()
                .copied()
                .filter(|&obj| {
                    self.region_of(obj)
                        .map_or(false, |region| state.regions[region].in_cset)
                })
                .collect()
        };
        let mut live = Vec::with_capacity(candidates.len());
        for obj in candidates {
            if self.forwardee(obj)?.is_none() {
                live.push(obj);
            }
        }
        Ok(live)
    }

    /// ========================================================================
    /// MARKING
    /// ========================================================================

    /// Returns true when newly marked
    pub fn mark(&self, obj: u64) -> bool {
        self.state.lock().marked.insert(obj)
    }

    pub fn is_marked(&self, obj: u64) -> bool {
        self.state.lock().marked.contains(&obj)
    }

    pub fn marked_count(&self) -> usize {
        self.state.lock().marked.len()
    }

    pub fn clear_marks(&self) {
        self.state.lock().marked.clear();
    }

    /// ========================================================================
    /// CARDS
    /// ========================================================================

    pub fn card_address(&self, addr: u64) -> u64 {
        CARD_TABLE_BASE + (addr >> self.config.card_shift)
    }

    pub fn is_card_dirty(&self, addr: u64) -> Result<bool> {
        Ok(self.read_u8(self.card_address(addr))? == DIRTY_CARD)
    }

    /// Number of dirty cards covering the heap
    pub fn dirty_card_count(&self) -> Result<usize> {
        let first = self.card_address(HEAP_BASE);
        let last = self.card_address(self.config.heap_end());
        let memory = self.memory.lock();
        let mut dirty = 0;
        for card in first..last {
            if memory.read_u8(card)? == DIRTY_CARD {
                dirty += 1;
            }
        }
        Ok(dirty)
    }

    pub fn clear_cards(&self) -> Result<()> {
        let first = self.card_address(HEAP_BASE);
        let last = self.card_address(self.config.heap_end());
        self.memory.lock().fill(first, (last - first) as usize, CLEAN_CARD)
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("regions", &self.config.region_count)
            .field("objects", &self.object_count())
            .finish()
    }
}
