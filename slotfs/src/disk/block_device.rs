use crate::constants::BLOCK_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("access at {address:#x} of {len} bytes is not block aligned")]
    Misaligned { address: u64, len: usize },
    #[error("access at {address:#x} of {len} bytes exceeds device capacity {capacity:#x}")]
    OutOfRange {
        address: u64,
        len: usize,
        capacity: u64,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait BlockDevice {
    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<(), DeviceError>;
    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), DeviceError>;
    fn capacity(&self) -> u64;
    fn sync(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), DeviceError> {
        (**self).write(address, buf)
    }

    fn capacity(&self) -> u64 {
        (**self).capacity()
    }

    fn sync(&mut self) -> Result<(), DeviceError> {
        (**self).sync()
    }
}

pub fn check_access(address: u64, len: usize, capacity: u64) -> Result<(), DeviceError> {
    if address % BLOCK_SIZE as u64 != 0 || len % BLOCK_SIZE != 0 {
        return Err(DeviceError::Misaligned { address, len });
    }
    match address.checked_add(len as u64) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(DeviceError::OutOfRange {
            address,
            len,
            capacity,
        }),
    }
}
