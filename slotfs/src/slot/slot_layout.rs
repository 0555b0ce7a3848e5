use crate::constants::{BLOCK_SIZE, reserved_blocks};
use crate::error::{Result, SlotFsError};
use crate::meta::config_block::Config;
use crate::meta::meta_block::MetaBlock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    config: Config,
    data_start: u64,
    slot_size: u64,
}

impl SlotLayout {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let reserved = (reserved_blocks(config.slot_count) * BLOCK_SIZE) as u64;
        let fs_data_size = (config.end_address - config.start_address) - reserved;
        let block = BLOCK_SIZE as u64;
        let slot_size = ((fs_data_size / config.slot_count as u64) / block) * block;
        Ok(Self {
            config,
            data_start: config.start_address + reserved,
            slot_size,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slot_count(&self) -> usize {
        self.config.slot_count
    }

    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    pub fn config_address(&self) -> u64 {
        self.config.start_address
    }

    pub fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.config.slot_count {
            return Err(SlotFsError::Assert("slot index out of range"));
        }
        Ok(())
    }

    pub fn slot_range(&self, slot: usize) -> (u64, u64) {
        let start = self.data_start + self.slot_size * slot as u64;
        (start, start + self.slot_size)
    }

    pub fn meta_address(&self, slot: usize, idx: usize) -> u64 {
        debug_assert!(idx < 2);
        self.config.start_address + (BLOCK_SIZE * (slot * 2 + 1 + idx)) as u64
    }

    pub fn empty_meta(&self, slot: usize) -> MetaBlock {
        let (start, max) = self.slot_range(slot);
        MetaBlock::empty(start, max)
    }

    pub fn matches(&self, slot: usize, md: &MetaBlock) -> bool {
        let (start, max) = self.slot_range(slot);
        md.start_address == start && md.max_address == max && md.file_size <= max - start
    }
}
