use crate::constants::{BLOCK_SIZE, MAX_SLOTS, reserved_blocks};
use crate::error::{Result, SlotFsError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub slot_count: usize,
    pub start_address: u64,
    pub end_address: u64,
}

impl Config {
    pub const LEN: usize = 24;

    pub fn new(slot_count: usize, start_address: u64, end_address: u64) -> Self {
        Self {
            slot_count,
            start_address,
            end_address,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 || self.slot_count > MAX_SLOTS {
            return Err(SlotFsError::InvalidConfig(format!(
                "slot count {} outside 1..={}",
                self.slot_count, MAX_SLOTS
            )));
        }
        if self.start_address % BLOCK_SIZE as u64 != 0 {
            return Err(SlotFsError::InvalidConfig(format!(
                "start address {:#x} is not block aligned",
                self.start_address
            )));
        }
        let reserved = (reserved_blocks(self.slot_count) * BLOCK_SIZE) as u64;
        let total = self.end_address.saturating_sub(self.start_address);
        if total <= reserved {
            return Err(SlotFsError::InvalidConfig(format!(
                "{} bytes cannot hold {} reserved bytes",
                total, reserved
            )));
        }
        if (total - reserved) / (self.slot_count as u64) < BLOCK_SIZE as u64 {
            return Err(SlotFsError::InvalidConfig(format!(
                "slots would be smaller than one block ({} bytes for {} slots)",
                total - reserved,
                self.slot_count
            )));
        }
        Ok(())
    }

    pub fn to_block(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..8].copy_from_slice(&(self.slot_count as u64).to_le_bytes());
        buf[8..16].copy_from_slice(&self.start_address.to_le_bytes());
        buf[16..24].copy_from_slice(&self.end_address.to_le_bytes());
        buf
    }

    pub fn from_block(buf: &[u8; BLOCK_SIZE]) -> Self {
        let slot_count = u64::from_le_bytes(buf[0..8].try_into().unwrap_or_default());
        Self {
            slot_count: usize::try_from(slot_count).unwrap_or(usize::MAX),
            start_address: u64::from_le_bytes(buf[8..16].try_into().unwrap_or_default()),
            end_address: u64::from_le_bytes(buf[16..24].try_into().unwrap_or_default()),
        }
    }
}
