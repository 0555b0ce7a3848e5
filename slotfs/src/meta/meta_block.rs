use crate::constants::{BLOCK_SIZE, CRC_LEN};
use crc32fast::Hasher;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MetaBlock {
    pub start_address: u64,
    pub max_address: u64,
    pub file_size: u64,
    pub revision: u8,
}

impl MetaBlock {
    pub const LEN: usize = 25;
    const CRC_OFFSET: usize = BLOCK_SIZE - CRC_LEN;

    pub fn empty(start_address: u64, max_address: u64) -> Self {
        Self {
            start_address,
            max_address,
            file_size: 0,
            revision: 0,
        }
    }

    pub fn created(start_address: u64, max_address: u64) -> Self {
        Self {
            revision: 1,
            ..Self::empty(start_address, max_address)
        }
    }

    pub fn capacity(&self) -> u64 {
        self.max_address - self.start_address
    }

    pub fn has_file(&self) -> bool {
        self.revision != 0
    }

    // 0 means "no file", so the counter wraps 255 -> 1
    pub fn next_revision(&self) -> u8 {
        match self.revision.wrapping_add(1) {
            0 => 1,
            r => r,
        }
    }

    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..8].copy_from_slice(&self.start_address.to_le_bytes());
        buf[8..16].copy_from_slice(&self.max_address.to_le_bytes());
        buf[16..24].copy_from_slice(&self.file_size.to_le_bytes());
        buf[24] = self.revision;
        let sum = checksum(&buf);
        buf[Self::CRC_OFFSET..].copy_from_slice(&sum.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; BLOCK_SIZE]) -> Option<Self> {
        if !verify_checksum(buf) {
            return None;
        }
        Some(Self {
            start_address: read_u64(buf, 0),
            max_address: read_u64(buf, 8),
            file_size: read_u64(buf, 16),
            revision: buf[24],
        })
    }
}

fn read_u64(buf: &[u8; BLOCK_SIZE], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn checksum(buf: &[u8; BLOCK_SIZE]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&buf[..MetaBlock::CRC_OFFSET]);
    hasher.finalize()
}

pub fn verify_checksum(buf: &[u8; BLOCK_SIZE]) -> bool {
    let mut stored = [0u8; CRC_LEN];
    stored.copy_from_slice(&buf[MetaBlock::CRC_OFFSET..]);
    checksum(buf) == u32::from_le_bytes(stored)
}
