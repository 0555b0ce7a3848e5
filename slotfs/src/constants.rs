pub const BLOCK_SIZE: usize = 512;

pub const MAX_SLOTS: usize = 128;

pub const DEFAULT_PAGE_BLOCKS: usize = 4;

pub const CRC_LEN: usize = 4;

pub const fn reserved_blocks(slot_count: usize) -> usize {
    1 + slot_count * 2
}
