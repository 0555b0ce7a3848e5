use crate::constants::BLOCK_SIZE;

#[derive(Clone, Debug)]
pub struct PageBuffer {
    buf: Box<[u8]>,
    offset: usize,
    loaded: bool,
}

impl PageBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity % BLOCK_SIZE == 0,
            "page capacity {} must be a non-zero multiple of {}",
            capacity,
            BLOCK_SIZE
        );
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            offset: 0,
            loaded: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn available(&self) -> usize {
        self.capacity() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    pub fn is_full(&self) -> bool {
        self.offset == self.capacity()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    // Bytes are kept; a later whole-page write carries them as stale tail.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.loaded = false;
    }

    pub fn stage(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.available());
        self.buf[self.offset..self.offset + n].copy_from_slice(&data[..n]);
        self.offset += n;
        n
    }

    pub fn unstage(&mut self, n: usize) {
        debug_assert!(n <= self.offset);
        self.offset -= n.min(self.offset);
    }

    pub fn take(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.available());
        out[..n].copy_from_slice(&self.buf[self.offset..self.offset + n]);
        self.offset += n;
        n
    }

    pub fn mark_loaded(&mut self, offset: usize) {
        debug_assert!(offset < self.capacity());
        self.offset = offset;
        self.loaded = true;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

pub fn page_block_address(start_address: u64, cursor: u64, capacity: usize) -> (u64, usize) {
    let capacity = capacity as u64;
    let block_address = start_address + (cursor / capacity) * capacity;
    (block_address, (cursor % capacity) as usize)
}
