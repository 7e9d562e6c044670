//! Segmented byte memory
//!
//! A sparse address space made of named, non-overlapping segments. Every access
//! must fall entirely inside one segment; anything else is a [`SimError::Fault`].
//! Values are little-endian.

use bsc_lir::Width;

use crate::error::{Result, SimError};

#[derive(Debug)]
struct Segment {
    name: &'static str,
    base: u64,
    bytes: Vec<u8>,
}

impl Segment {
    fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }
}

#[derive(Debug, Default)]
pub struct Memory {
    /// Sorted by base
    segments: Vec<Segment>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `size` zeroed bytes at `base`
    pub fn map(&mut self, name: &'static str, base: u64, size: u64) -> Result<()> {
        let end = base
            .checked_add(size)
            .ok_or_else(|| SimError::Config(format!("segment {} wraps the address space", name)))?;
        if let Some(other) = self.segments.iter().find(|s| base < s.end() && s.base < end) {
            return Err(SimError::Config(format!(
                "segment {} [{:#x}, {:#x}) overlaps {}",
                name, base, end, other.name
            )));
        }
        let pos = self.segments.partition_point(|s| s.base < base);
        self.segments.insert(
            pos,
            Segment {
                name,
                base,
                bytes: vec![0; size as usize],
            },
        );
        log::debug!("mapped {} at {:#x}..{:#x}", name, base, end);
        Ok(())
    }

    pub fn is_mapped(&self, addr: u64, len: usize) -> bool {
        self.locate(addr, len).is_ok()
    }

    fn locate(&self, addr: u64, len: usize) -> Result<(usize, usize)> {
        let fault = || SimError::Fault { addr, len };
        let pos = self.segments.partition_point(|s| s.base <= addr);
        let index = pos.checked_sub(1).ok_or_else(fault)?;
        let segment = &self.segments[index];
        let offset = addr - segment.base;
        match offset.checked_add(len as u64) {
            Some(end) if end <= segment.bytes.len() as u64 => Ok((index, offset as usize)),
            _ => Err(fault()),
        }
    }

    pub fn read_bytes(&self, addr: u64, out: &mut [u8]) -> Result<()> {
        let (index, offset) = self.locate(addr, out.len())?;
        out.copy_from_slice(&self.segments[index].bytes[offset..offset + out.len()]);
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let (index, offset) = self.locate(addr, data.len())?;
        self.segments[index].bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        let mut buf = [0; 1];
        self.read_bytes(addr, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32> {
        let mut buf = [0; 4];
        self.read_bytes(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        let mut buf = [0; 8];
        self.read_bytes(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<()> {
        self.write_bytes(addr, &[value])
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Zero-extended load of `width` bytes
    pub fn read(&self, addr: u64, width: Width) -> Result<u64> {
        Ok(match width {
            Width::W8 => u64::from(self.read_u8(addr)?),
            Width::W32 => u64::from(self.read_u32(addr)?),
            Width::W64 => self.read_u64(addr)?,
        })
    }

    /// Store the low `width` bytes of `value`
    pub fn write(&mut self, addr: u64, width: Width, value: u64) -> Result<()> {
        match width {
            Width::W8 => self.write_u8(addr, value as u8),
            Width::W32 => self.write_u32(addr, value as u32),
            Width::W64 => self.write_u64(addr, value),
        }
    }

    /// `memmove` semantics
    pub fn copy(&mut self, dst: u64, src: u64, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let mut buf = vec![0; len];
        self.read_bytes(src, &mut buf)?;
        self.write_bytes(dst, &buf)
    }

    pub fn fill(&mut self, addr: u64, len: usize, byte: u8) -> Result<()> {
        let (index, offset) = self.locate(addr, len)?;
        self.segments[index].bytes[offset..offset + len].fill(byte);
        Ok(())
    }
}
