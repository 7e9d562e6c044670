//! Simulator configuration
//!
//! Heap geometry, SATB buffer capacity and thread limits. The fixed address map
//! below is shared by every configuration; only the sizes vary.
//!
//! Address map:
//! ```text
//! 0x0010_0000  collection-set table   one byte per region, indexed by addr >> region shift
//! 0x0020_0000  card table             one byte per card, indexed by addr >> card shift
//! 0x0030_0000  total collections      u64
//! 0x0040_0000  klass area             KLASS_SLOT_SIZE bytes per class
//! 0x0050_0000  thread blocks          TLS_BLOCK_SIZE bytes per thread
//! 0x0060_0000  SATB buffers           satb_buffer_words words per thread
//! 0x0100_0000  heap                   region_count regions
//! ```

use serde::{Deserialize, Serialize};

pub const CSET_TABLE_BASE: u64 = 0x10_0000;
pub const CARD_TABLE_BASE: u64 = 0x20_0000;
pub const TOTAL_COLLECTIONS_ADDRESS: u64 = 0x30_0000;
pub const KLASS_AREA_BASE: u64 = 0x40_0000;
pub const TLS_AREA_BASE: u64 = 0x50_0000;
pub const TLS_BLOCK_SIZE: u64 = 0x100;
pub const SATB_AREA_BASE: u64 = 0x60_0000;
pub const HEAP_BASE: u64 = 0x100_0000;

/// Size of each table area
const TABLE_AREA_SIZE: u64 = 0x10_0000;

pub const MAX_CLASSES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Number of heap regions
    ///
    /// Default: 64
    pub region_count: usize,

    /// `log2(region size)`
    ///
    /// Default: 16 (64KB)
    pub region_size_shift: u8,

    /// `log2(card size)`
    ///
    /// Default: 9 (512 bytes)
    pub card_shift: u8,

    /// SATB buffer capacity per thread, in words
    ///
    /// Default: 64
    pub satb_buffer_words: usize,

    /// Default: 8
    pub max_threads: usize,

    /// Instruction budget for one interpreted unit
    ///
    /// Default: 1_000_000
    pub step_limit: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            region_count: 64,
            region_size_shift: 16,
            card_shift: 9,
            satb_buffer_words: 64,
            max_threads: 8,
            step_limit: 1_000_000,
        }
    }
}

impl HeapConfig {
    pub fn region_size(&self) -> u64 {
        1 << self.region_size_shift
    }

    pub fn heap_end(&self) -> u64 {
        HEAP_BASE + self.region_count as u64 * self.region_size()
    }

    pub fn satb_buffer_bytes(&self) -> u64 {
        self.satb_buffer_words as u64 * 8
    }

    /// Validate configuration
    ///
    /// Checks that every table and per-thread area fits its slot in the address map.
    pub fn validate(&self) -> Result<(), String> {
        if !(12..=24).contains(&self.region_size_shift) {
            return Err(format!(
                "region_size_shift {} outside 12..=24",
                self.region_size_shift
            ));
        }
        if self.card_shift < 4 || self.card_shift >= self.region_size_shift {
            return Err(format!(
                "card_shift {} must be in 4..{}",
                self.card_shift, self.region_size_shift
            ));
        }
        if self.region_count < 2 {
            return Err("at least two regions are needed to evacuate".into());
        }
        let heap_end = self.heap_end();
        if heap_end >> self.region_size_shift > TABLE_AREA_SIZE {
            return Err("collection-set table does not fit its area".into());
        }
        if heap_end >> self.card_shift > TABLE_AREA_SIZE {
            return Err(format!(
                "card table for heap end {:#x} does not fit its area",
                heap_end
            ));
        }
        if self.satb_buffer_words == 0 {
            return Err("satb_buffer_words must be non-zero".into());
        }
        if self.max_threads == 0 || self.max_threads as u64 * TLS_BLOCK_SIZE > TABLE_AREA_SIZE {
            return Err(format!("max_threads {} out of range", self.max_threads));
        }
        if self.max_threads as u64 * self.satb_buffer_bytes() > HEAP_BASE - SATB_AREA_BASE {
            return Err("SATB buffers do not fit their area".into());
        }
        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - BSC_SIM_REGIONS
    /// - BSC_SIM_REGION_SHIFT
    /// - BSC_SIM_SATB_BUFFER_WORDS
    /// - BSC_SIM_THREADS
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("BSC_SIM_REGIONS") {
            match val.parse() {
                Ok(count) => config.region_count = count,
                Err(_) => log::warn!("ignoring BSC_SIM_REGIONS={}", val),
            }
        }
        if let Some(val) = lookup("BSC_SIM_REGION_SHIFT") {
            match val.parse() {
                Ok(shift) => config.region_size_shift = shift,
                Err(_) => log::warn!("ignoring BSC_SIM_REGION_SHIFT={}", val),
            }
        }
        if let Some(val) = lookup("BSC_SIM_SATB_BUFFER_WORDS") {
            match val.parse() {
                Ok(words) => config.satb_buffer_words = words,
                Err(_) => log::warn!("ignoring BSC_SIM_SATB_BUFFER_WORDS={}", val),
            }
        }
        if let Some(val) = lookup("BSC_SIM_THREADS") {
            match val.parse() {
                Ok(threads) => config.max_threads = threads,
                Err(_) => log::warn!("ignoring BSC_SIM_THREADS={}", val),
            }
        }

        config
    }
}
