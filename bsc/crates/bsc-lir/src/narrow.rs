//! Narrow (compressed) reference encoding
//!
//! `narrow = (address - base) >> shift`, with null mapping to zero in both directions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompressEncoding {
    pub base: u64,
    pub shift: u8,
}

impl CompressEncoding {
    pub const fn new(base: u64, shift: u8) -> Self {
        Self { base, shift }
    }

    pub fn compress(&self, address: u64) -> u32 {
        if address == 0 {
            return 0;
        }
        (address.wrapping_sub(self.base) >> self.shift) as u32
    }

    pub fn uncompress(&self, narrow: u32) -> u64 {
        if narrow == 0 {
            return 0;
        }
        self.base.wrapping_add(u64::from(narrow) << self.shift)
    }

    /// Whether `address` survives a compress/uncompress round trip
    pub fn can_encode(&self, address: u64) -> bool {
        address == 0 || self.uncompress(self.compress(address)) == address
    }
}
