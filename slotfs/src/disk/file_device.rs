use crate::disk::block_device::{BlockDevice, DeviceError, check_access};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct FsImageDevice {
    path: PathBuf,
    file: File,
    capacity: u64,
}

impl FsImageDevice {
    pub fn open<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = Self::open_rw(path)?;
        if file.metadata()?.len() < capacity {
            file.set_len(capacity)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            capacity,
        })
    }

    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let capacity = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_rw(path: &Path) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
    }
}

impl BlockDevice for FsImageDevice {
    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_access(address, buf.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(address))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), DeviceError> {
        check_access(address, buf.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(address))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn sync(&mut self) -> Result<(), DeviceError> {
        self.file.sync_all()?;
        Ok(())
    }
}
