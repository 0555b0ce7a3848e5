use crate::meta::meta_block::MetaBlock;
use crate::page::page_buffer::PageBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    WriteCreate,
    Read,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    Success,
    SuccessEof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes: usize,
    pub status: ReadStatus,
}

impl ReadOutcome {
    pub fn is_eof(&self) -> bool {
        self.status == ReadStatus::SuccessEof
    }
}

#[derive(Debug)]
pub struct SlotFile {
    pub(crate) slot: usize,
    pub(crate) meta: MetaBlock,
    pub(crate) mode: Mode,
    pub(crate) cursor: u64,
    pub(crate) page: Option<PageBuffer>,
}

impl SlotFile {
    pub(crate) fn new(slot: usize, meta: MetaBlock, mode: Mode, page: PageBuffer) -> Self {
        Self {
            slot,
            meta,
            mode,
            cursor: 0,
            page: Some(page),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.page.is_some()
    }

    pub fn size(&self) -> u64 {
        self.meta.file_size
    }

    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn meta(&self) -> &MetaBlock {
        &self.meta
    }

    pub fn page_capacity(&self) -> Option<usize> {
        self.page.as_ref().map(PageBuffer::capacity)
    }
}

impl Drop for SlotFile {
    fn drop(&mut self) {
        if self.is_open() {
            log::warn!(
                "handle for slot {} dropped without close; its open reference is leaked",
                self.slot
            );
        }
    }
}
