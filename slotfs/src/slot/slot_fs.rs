use crate::constants::{BLOCK_SIZE, DEFAULT_PAGE_BLOCKS};
use crate::disk::block_device::BlockDevice;
use crate::error::{Result, SlotFsError};
use crate::meta::config_block::Config;
use crate::meta::meta_block::MetaBlock;
use crate::meta::recovery::{most_recent, stale_index};
use crate::page::page_buffer::{PageBuffer, page_block_address};
use crate::slot::slot_file::{Mode, ReadOutcome, ReadStatus, SlotFile};
use crate::slot::slot_layout::SlotLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotReport {
    pub slot: usize,
    pub copies: [Option<MetaBlock>; 2],
    pub authoritative: Option<usize>,
    pub open_count: u32,
}

impl SlotReport {
    pub fn meta(&self) -> Option<MetaBlock> {
        self.authoritative.and_then(|idx| self.copies[idx])
    }

    pub fn exists(&self) -> bool {
        self.meta().is_some_and(|md| md.has_file())
    }

    pub fn is_corrupt(&self) -> bool {
        self.authoritative.is_none()
    }

    pub fn is_degraded(&self) -> bool {
        self.copies.iter().any(Option::is_none)
    }
}

pub struct SlotFs<D: BlockDevice> {
    device: D,
    layout: SlotLayout,
    open_counts: Vec<u32>,
    page_blocks: usize,
}

impl<D: BlockDevice> SlotFs<D> {
    pub fn init(device: D, config: Config) -> Result<Self> {
        let layout = SlotLayout::new(config)?;
        if device.capacity() < config.end_address {
            return Err(SlotFsError::InvalidConfig(format!(
                "end address {:#x} beyond device capacity {:#x}",
                config.end_address,
                device.capacity()
            )));
        }

        let mut fs = Self {
            device,
            layout,
            open_counts: vec![0; config.slot_count],
            page_blocks: DEFAULT_PAGE_BLOCKS,
        };

        let mut buf = [0u8; BLOCK_SIZE];
        fs.read_device(layout.config_address(), &mut buf)?;
        let existing = Config::from_block(&buf);
        if existing != config {
            log::info!(
                "config on device {:?} differs from {:?}, formatting",
                existing,
                config
            );
            fs.format()?;
        } else {
            log::debug!("reusing formatted file system {:?}", config);
        }
        Ok(fs)
    }

    pub fn mount(mut device: D, start_address: u64) -> Result<Self> {
        if start_address % BLOCK_SIZE as u64 != 0 {
            return Err(SlotFsError::InvalidConfig(format!(
                "start address {:#x} is not block aligned",
                start_address
            )));
        }
        let mut buf = [0u8; BLOCK_SIZE];
        device
            .read(start_address, &mut buf)
            .map_err(|source| SlotFsError::Read {
                address: start_address,
                source,
            })?;
        let config = Config::from_block(&buf);
        if config.start_address != start_address {
            return Err(SlotFsError::InvalidConfig(format!(
                "no file system at {:#x}",
                start_address
            )));
        }
        config.validate()?;
        Self::init(device, config)
    }

    pub fn format(&mut self) -> Result<()> {
        if self.open_counts.iter().any(|&c| c > 0) {
            return Err(SlotFsError::Assert("format with open files"));
        }
        let config = *self.layout.config();
        let address = self.layout.config_address();
        self.write_device(address, &config.to_block())?;
        for slot in 0..config.slot_count {
            let md = self.layout.empty_meta(slot);
            self.write_meta(slot, 0, &md)?;
            self.write_meta(slot, 1, &md)?;
        }
        self.sync()?;
        log::info!(
            "formatted {} slots of {} bytes at {:#x}",
            config.slot_count,
            self.layout.slot_size(),
            config.start_address
        );
        Ok(())
    }

    pub fn deinit(self) -> D {
        let open: u32 = self.open_counts.iter().sum();
        if open > 0 {
            log::warn!("deinit with {} open handles", open);
        }
        self.device
    }

    pub fn config(&self) -> &Config {
        self.layout.config()
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn slot_count(&self) -> usize {
        self.layout.slot_count()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn open_count(&self, slot: usize) -> u32 {
        self.open_counts.get(slot).copied().unwrap_or(0)
    }

    pub fn set_page_blocks(&mut self, blocks: usize) -> Result<()> {
        if blocks == 0 {
            return Err(SlotFsError::Assert("page must hold at least one block"));
        }
        self.page_blocks = blocks;
        Ok(())
    }

    pub fn page_capacity(&self) -> usize {
        let page = (self.page_blocks * BLOCK_SIZE) as u64;
        page.min(self.layout.slot_size()) as usize
    }

    pub fn exists(&mut self, slot: usize) -> Result<bool> {
        Ok(self.inspect(slot)?.exists())
    }

    pub fn inspect(&mut self, slot: usize) -> Result<SlotReport> {
        self.layout.check_slot(slot)?;
        let copies = self.read_meta_pair(slot)?;
        Ok(SlotReport {
            slot,
            copies,
            authoritative: most_recent(&copies),
            open_count: self.open_counts[slot],
        })
    }

    pub fn open(&mut self, slot: usize, mode: Mode) -> Result<SlotFile> {
        self.layout.check_slot(slot)?;
        let meta = match mode {
            Mode::Read => {
                let md = self.recover(slot)?;
                if !md.has_file() {
                    return Err(SlotFsError::FileNotFound(slot));
                }
                md
            }
            Mode::WriteCreate => {
                if self.open_counts[slot] != 0 {
                    return Err(SlotFsError::Assert("slot is already open"));
                }
                let (start, max) = self.layout.slot_range(slot);
                let md = MetaBlock::created(start, max);
                self.write_meta(slot, 0, &md)?;
                self.write_meta(slot, 1, &md)?;
                md
            }
        };

        let page = PageBuffer::new(self.page_capacity());
        self.open_counts[slot] += 1;
        log::debug!(
            "opened slot {} {:?} (size {}, revision {})",
            slot,
            mode,
            meta.file_size,
            meta.revision
        );
        Ok(SlotFile::new(slot, meta, mode, page))
    }

    pub fn close(&mut self, file: &mut SlotFile) -> Result<()> {
        if !file.is_open() {
            return Err(SlotFsError::Assert("file is not open"));
        }
        // a failed flush leaves the handle open so close can be retried
        if file.mode == Mode::WriteCreate {
            self.flush(file)?;
            self.sync()?;
        }
        let count = &mut self.open_counts[file.slot];
        *count = count.saturating_sub(1);
        file.page = None;
        log::debug!("closed slot {} at size {}", file.slot, file.meta.file_size);
        Ok(())
    }

    pub fn size(&self, file: &SlotFile) -> Result<u64> {
        if !file.is_open() {
            return Err(SlotFsError::Assert("file is not open"));
        }
        Ok(file.meta.file_size)
    }

    pub fn write(&mut self, file: &mut SlotFile, data: &[u8]) -> Result<usize> {
        check_mode(file, Mode::WriteCreate)?;
        let remaining = file.meta.capacity() - file.cursor;
        if data.len() as u64 > remaining {
            return Err(SlotFsError::SlotFull {
                requested: data.len() as u64,
                remaining,
            });
        }

        let mut written = 0;
        while written < data.len() {
            let page = page_of(&mut file.page)?;
            let (address, _) =
                page_block_address(file.meta.start_address, file.cursor, page.capacity());
            let staged = page.stage(&data[written..]);
            let full = page.is_full();
            if full {
                let span = page_span(&file.meta, address, page.capacity());
                if let Err(e) = self.write_device(address, &page.as_bytes()[..span]) {
                    page.unstage(staged);
                    return Err(e);
                }
                page.clear();
            }
            file.cursor += staged as u64;
            written += staged;
            if full {
                let cursor = file.cursor;
                self.commit(file, cursor)?;
            }
        }
        Ok(written)
    }

    pub fn read(&mut self, file: &mut SlotFile, out: &mut [u8]) -> Result<ReadOutcome> {
        check_mode(file, Mode::Read)?;
        let mut read = 0;
        while read < out.len() {
            if file.cursor >= file.meta.file_size {
                return Ok(ReadOutcome {
                    bytes: read,
                    status: ReadStatus::SuccessEof,
                });
            }
            let page = page_of(&mut file.page)?;
            if !page.is_loaded() || page.available() == 0 {
                let (address, offset) =
                    page_block_address(file.meta.start_address, file.cursor, page.capacity());
                let span = page_span(&file.meta, address, page.capacity());
                self.read_device(address, &mut page.as_bytes_mut()[..span])?;
                page.mark_loaded(offset);
            }
            let want = (out.len() - read).min((file.meta.file_size - file.cursor) as usize);
            let n = page.take(&mut out[read..read + want]);
            file.cursor += n as u64;
            read += n;
        }
        Ok(ReadOutcome {
            bytes: read,
            status: ReadStatus::Success,
        })
    }

    pub fn flush(&mut self, file: &mut SlotFile) -> Result<()> {
        check_mode(file, Mode::WriteCreate)?;
        self.write_pending_page(file)?;
        let cursor = file.cursor;
        self.commit(file, cursor)
    }

    pub fn seek(&mut self, file: &mut SlotFile, offset: u64) -> Result<()> {
        check_mode(file, Mode::Read)?;
        if offset >= file.meta.file_size {
            return Err(SlotFsError::Assert("seek beyond end of file"));
        }
        file.cursor = offset;
        page_of(&mut file.page)?.clear();
        Ok(())
    }

    pub fn allocate(&mut self, file: &mut SlotFile, size: u64) -> Result<()> {
        check_mode(file, Mode::WriteCreate)?;
        if size > file.meta.capacity() {
            return Err(SlotFsError::SlotFull {
                requested: size,
                remaining: file.meta.capacity(),
            });
        }
        self.write_pending_page(file)?;

        // Writes continue mid-page after this, so the head of that page has to
        // come from the device. Cursor and page only move once nothing can fail.
        let capacity = page_of(&mut file.page)?.capacity();
        let (address, offset) = page_block_address(file.meta.start_address, size, capacity);
        let mut head = Vec::new();
        if offset > 0 {
            head.resize(page_span(&file.meta, address, capacity), 0);
            self.read_device(address, &mut head)?;
        }
        self.commit(file, size)?;

        file.cursor = size;
        let page = page_of(&mut file.page)?;
        page.clear();
        if offset > 0 {
            page.as_bytes_mut()[..head.len()].copy_from_slice(&head);
            page.mark_loaded(offset);
        }
        Ok(())
    }

    fn write_pending_page(&mut self, file: &mut SlotFile) -> Result<()> {
        let page = page_of(&mut file.page)?;
        if page.is_empty() {
            return Ok(());
        }
        let (address, _) = page_block_address(file.meta.start_address, file.cursor, page.capacity());
        let span = page_span(&file.meta, address, page.capacity());
        self.write_device(address, &page.as_bytes()[..span])
    }

    fn commit(&mut self, file: &mut SlotFile, file_size: u64) -> Result<()> {
        let md = MetaBlock {
            file_size,
            revision: file.meta.next_revision(),
            ..file.meta
        };
        let copies = self.read_meta_pair(file.slot)?;
        let current = most_recent(&copies).ok_or(SlotFsError::CorruptData(file.slot))?;
        let target = stale_index(current);
        self.write_meta(file.slot, target, &md)?;
        file.meta = md;
        log::trace!(
            "slot {} committed size {} revision {} to copy {}",
            file.slot,
            md.file_size,
            md.revision,
            target
        );
        Ok(())
    }

    fn recover(&mut self, slot: usize) -> Result<MetaBlock> {
        let copies = self.read_meta_pair(slot)?;
        let idx = most_recent(&copies).ok_or(SlotFsError::CorruptData(slot))?;
        if copies.iter().any(Option::is_none) {
            log::warn!("slot {} recovered from metadata copy {}", slot, idx);
        }
        copies[idx].ok_or(SlotFsError::CorruptData(slot))
    }

    fn read_meta_pair(&mut self, slot: usize) -> Result<[Option<MetaBlock>; 2]> {
        let mut copies = [None, None];
        let mut buf = [0u8; BLOCK_SIZE];
        for (idx, copy) in copies.iter_mut().enumerate() {
            let address = self.layout.meta_address(slot, idx);
            self.read_device(address, &mut buf)?;
            *copy = MetaBlock::decode(&buf).filter(|md| self.layout.matches(slot, md));
        }
        Ok(copies)
    }

    fn write_meta(&mut self, slot: usize, idx: usize, md: &MetaBlock) -> Result<()> {
        let address = self.layout.meta_address(slot, idx);
        self.write_device(address, &md.encode())
    }

    fn read_device(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        log::trace!("block_device read {:#x} +{}", address, buf.len());
        self.device
            .read(address, buf)
            .map_err(|source| SlotFsError::Read { address, source })
    }

    fn write_device(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        log::trace!("block_device write {:#x} +{}", address, buf.len());
        self.device
            .write(address, buf)
            .map_err(|source| SlotFsError::Write { address, source })
    }

    fn sync(&mut self) -> Result<()> {
        self.device.sync().map_err(SlotFsError::Sync)
    }
}

fn check_mode(file: &SlotFile, mode: Mode) -> Result<()> {
    if !file.is_open() {
        return Err(SlotFsError::Assert("file is not open"));
    }
    if file.mode != mode {
        return Err(SlotFsError::Assert("operation not allowed in this mode"));
    }
    Ok(())
}

fn page_of(page: &mut Option<PageBuffer>) -> Result<&mut PageBuffer> {
    page.as_mut().ok_or(SlotFsError::Assert("file is not open"))
}

// Slots are whole blocks but not whole pages, so the last page of a slot may be short.
fn page_span(meta: &MetaBlock, address: u64, capacity: usize) -> usize {
    (capacity as u64).min(meta.max_address - address) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::mem_device::MemDevice;
    use crate::error::ErrorKind;

    fn ten_slot_fs() -> SlotFs<MemDevice> {
        SlotFs::init(MemDevice::new(1000), Config::new(10, 0, 512 * 100)).unwrap()
    }

    #[test]
    fn init_writes_config_and_metadata() {
        let fs = ten_slot_fs();
        assert_eq!(fs.config(), &Config::new(10, 0, 512 * 100));

        let dev = fs.deinit();
        let on_disk = Config::from_block(dev.block(0).try_into().unwrap());
        assert_eq!(on_disk, Config::new(10, 0, 512 * 100));

        let md_a = MetaBlock::decode(dev.block(1).try_into().unwrap()).unwrap();
        assert_eq!(md_a.revision, 0);
        assert_eq!(md_a.start_address, 10 * 512 * 2 + 512);
        assert!(md_a.max_address > md_a.start_address);
        assert_eq!(md_a.file_size, 0);
        assert_eq!(dev.block(1), dev.block(2));
    }

    #[test]
    fn init_on_formatted_device_keeps_metadata() {
        let fs = ten_slot_fs();
        let mut dev = fs.deinit();
        dev.block_mut(1)[0] = 0xCD;

        let fs = SlotFs::init(dev, Config::new(10, 0, 512 * 100)).unwrap();
        assert_eq!(fs.device().block(1)[0], 0xCD);
    }

    #[test]
    fn init_rejects_device_too_small() {
        let err = SlotFs::init(MemDevice::new(10), Config::new(1, 0, 512 * 20))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Assert);
    }

    #[test]
    fn file_size_changes_only_on_flush() {
        let mut fs = ten_slot_fs();
        let mut file = fs.open(0, Mode::WriteCreate).unwrap();
        assert_eq!(fs.size(&file).unwrap(), 0);

        assert_eq!(fs.write(&mut file, &0i32.to_le_bytes()).unwrap(), 4);
        assert_eq!(fs.size(&file).unwrap(), 0);
        assert_eq!(file.position(), 4);

        fs.flush(&mut file).unwrap();
        assert_eq!(fs.size(&file).unwrap(), 4);
        fs.close(&mut file).unwrap();
    }

    #[test]
    fn write_create_is_exclusive() {
        let mut fs = ten_slot_fs();
        let mut file = fs.open(0, Mode::WriteCreate).unwrap();
        assert_eq!(fs.open_count(0), 1);

        let err = fs.open(0, Mode::WriteCreate).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Assert);
        assert_eq!(fs.open_count(0), 1);

        fs.close(&mut file).unwrap();
        assert_eq!(fs.open_count(0), 0);

        let mut again = fs.open(0, Mode::WriteCreate).unwrap();
        assert_eq!(fs.open_count(0), 1);
        fs.close(&mut again).unwrap();
    }

    #[test]
    fn readers_share_a_slot_and_block_writers() {
        let mut fs = ten_slot_fs();
        let mut writer = fs.open(9, Mode::WriteCreate).unwrap();
        let mut reader = fs.open(9, Mode::Read).unwrap();
        assert_eq!(fs.open_count(9), 2);

        fs.close(&mut reader).unwrap();
        assert_eq!(fs.open_count(9), 1);
        fs.close(&mut writer).unwrap();

        let mut r1 = fs.open(9, Mode::Read).unwrap();
        let mut r2 = fs.open(9, Mode::Read).unwrap();
        assert_eq!(
            fs.open(9, Mode::WriteCreate).unwrap_err().kind(),
            ErrorKind::Assert
        );
        fs.close(&mut r1).unwrap();
        fs.close(&mut r2).unwrap();
    }

    #[test]
    fn open_missing_and_out_of_range() {
        let mut fs = ten_slot_fs();
        let err = fs.open(1, Mode::Read).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(fs.open_count(1), 0);

        assert_eq!(
            fs.open(10, Mode::Read).unwrap_err().kind(),
            ErrorKind::Assert
        );
        assert_eq!(
            fs.open(100, Mode::WriteCreate).unwrap_err().kind(),
            ErrorKind::Assert
        );
    }

    #[test]
    fn closed_handle_is_rejected() {
        let mut fs = ten_slot_fs();
        let mut file = fs.open(2, Mode::WriteCreate).unwrap();
        fs.close(&mut file).unwrap();

        assert!(!file.is_open());
        assert_eq!(fs.close(&mut file).unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(fs.write(&mut file, b"x").unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(fs.flush(&mut file).unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(fs.size(&file).unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(fs.open_count(2), 0);
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let mut fs = ten_slot_fs();
        let mut writer = fs.open(3, Mode::WriteCreate).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            fs.read(&mut writer, &mut buf).unwrap_err().kind(),
            ErrorKind::Assert
        );
        assert_eq!(fs.seek(&mut writer, 0).unwrap_err().kind(), ErrorKind::Assert);
        fs.write(&mut writer, b"abcd").unwrap();
        fs.close(&mut writer).unwrap();

        let mut reader = fs.open(3, Mode::Read).unwrap();
        assert_eq!(fs.write(&mut reader, b"x").unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(fs.flush(&mut reader).unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(
            fs.allocate(&mut reader, 10).unwrap_err().kind(),
            ErrorKind::Assert
        );
        fs.close(&mut reader).unwrap();
    }

    #[test]
    fn seek_bounds() {
        let mut fs = ten_slot_fs();
        let mut writer = fs.open(0, Mode::WriteCreate).unwrap();
        fs.write(&mut writer, &[7u8; 513]).unwrap();
        fs.close(&mut writer).unwrap();

        let mut file = fs.open(0, Mode::Read).unwrap();
        let mut buf = [0u8; 3];
        fs.read(&mut file, &mut buf).unwrap();
        assert_eq!(file.position(), 3);

        assert_eq!(fs.seek(&mut file, 513).unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(fs.seek(&mut file, 600).unwrap_err().kind(), ErrorKind::Assert);
        assert_eq!(file.position(), 3);

        fs.seek(&mut file, 10).unwrap();
        assert_eq!(file.position(), 10);
        fs.seek(&mut file, 512).unwrap();
        assert_eq!(file.position(), 512);
        fs.close(&mut file).unwrap();
    }

    #[test]
    fn flush_alternates_metadata_copies() {
        let mut fs = ten_slot_fs();
        let mut file = fs.open(4, Mode::WriteCreate).unwrap();

        let report = fs.inspect(4).unwrap();
        assert_eq!(report.copies[0].unwrap().revision, 1);
        assert_eq!(report.copies[1].unwrap().revision, 1);

        fs.write(&mut file, b"hello").unwrap();
        fs.flush(&mut file).unwrap();
        let report = fs.inspect(4).unwrap();
        assert_eq!(report.copies[0].unwrap().revision, 1);
        assert_eq!(report.copies[1].unwrap().revision, 2);
        assert_eq!(report.authoritative, Some(1));
        assert_eq!(report.meta().unwrap().file_size, 5);

        fs.flush(&mut file).unwrap();
        let report = fs.inspect(4).unwrap();
        assert_eq!(report.copies[0].unwrap().revision, 3);
        assert_eq!(report.authoritative, Some(0));
        fs.close(&mut file).unwrap();
    }

    #[test]
    fn exists_follows_create_and_format() {
        let mut fs = ten_slot_fs();
        assert!(!fs.exists(5).unwrap());

        let mut file = fs.open(5, Mode::WriteCreate).unwrap();
        assert!(fs.exists(5).unwrap());
        fs.close(&mut file).unwrap();
        assert!(fs.exists(5).unwrap());

        fs.format().unwrap();
        assert!(!fs.exists(5).unwrap());
        assert_eq!(fs.exists(10).unwrap_err().kind(), ErrorKind::Assert);
    }

    #[test]
    fn mount_uses_config_on_device() {
        let mut fs = ten_slot_fs();
        let mut file = fs.open(3, Mode::WriteCreate).unwrap();
        fs.write(&mut file, b"keep").unwrap();
        fs.close(&mut file).unwrap();

        let mut fs = SlotFs::mount(fs.deinit(), 0).unwrap();
        assert_eq!(fs.config(), &Config::new(10, 0, 512 * 100));
        assert!(fs.exists(3).unwrap());
    }

    #[test]
    fn mount_never_formats() {
        let blank = MemDevice::new(100);
        let err = SlotFs::mount(blank.clone(), 0).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Assert);

        let dev = ten_slot_fs().deinit();
        let err = SlotFs::mount(dev.clone(), 512).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Assert);
        let err = SlotFs::mount(dev, 100).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Assert);
    }

    #[test]
    fn format_refused_while_open() {
        let mut fs = ten_slot_fs();
        let mut file = fs.open(0, Mode::WriteCreate).unwrap();
        assert_eq!(fs.format().unwrap_err().kind(), ErrorKind::Assert);
        fs.close(&mut file).unwrap();
        fs.format().unwrap();
    }

    #[test]
    fn page_capacity_clamped_to_slot() {
        let mut fs = SlotFs::init(MemDevice::new(5), Config::new(1, 0, 512 * 5)).unwrap();
        assert_eq!(fs.page_capacity(), 1024);

        fs.set_page_blocks(1).unwrap();
        assert_eq!(fs.page_capacity(), 512);
        assert_eq!(fs.set_page_blocks(0).unwrap_err().kind(), ErrorKind::Assert);

        let mut file = fs.open(0, Mode::WriteCreate).unwrap();
        assert_eq!(file.page_capacity(), Some(512));
        fs.close(&mut file).unwrap();
        assert_eq!(file.page_capacity(), None);
    }
}
