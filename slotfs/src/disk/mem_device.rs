use crate::disk::block_device::{BlockDevice, DeviceError, check_access};
use crate::constants::BLOCK_SIZE;

#[derive(Clone, Debug)]
pub struct MemDevice {
    buf: Vec<u8>,
}

impl MemDevice {
    pub fn new(blocks: usize) -> Self {
        Self {
            buf: vec![0u8; blocks * BLOCK_SIZE],
        }
    }

    pub fn block_count(&self) -> usize {
        self.buf.len() / BLOCK_SIZE
    }

    pub fn block(&self, index: usize) -> &[u8] {
        &self.buf[index * BLOCK_SIZE..(index + 1) * BLOCK_SIZE]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.buf[index * BLOCK_SIZE..(index + 1) * BLOCK_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl BlockDevice for MemDevice {
    fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_access(address, buf.len(), self.capacity())?;
        let off = address as usize;
        buf.copy_from_slice(&self.buf[off..off + buf.len()]);
        Ok(())
    }

    fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), DeviceError> {
        check_access(address, buf.len(), self.capacity())?;
        let off = address as usize;
        self.buf[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.buf.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_creation() {
        let dev = MemDevice::new(8);
        assert_eq!(dev.block_count(), 8);
        assert_eq!(dev.capacity(), 8 * 512);
        assert!(dev.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn block_write_read_round_trip() {
        let mut dev = MemDevice::new(4);
        let mut data = [0u8; 1024];
        data[0] = 0xAB;
        data[1023] = 0xCD;
        dev.write(512, &data).unwrap();

        let mut back = [0u8; 1024];
        dev.read(512, &mut back).unwrap();
        assert_eq!(back, data);
        assert_eq!(dev.block(1)[0], 0xAB);
        assert_eq!(dev.block(2)[511], 0xCD);
        assert!(dev.block(0).iter().all(|&b| b == 0));
    }

    #[test]
    fn unaligned_and_out_of_range_access_fail() {
        let mut dev = MemDevice::new(2);
        let mut buf = [0u8; 512];
        assert!(matches!(
            dev.read(10, &mut buf),
            Err(DeviceError::Misaligned { .. })
        ));
        assert!(matches!(
            dev.write(1024, &buf),
            Err(DeviceError::OutOfRange { .. })
        ));
        assert!(matches!(
            dev.write(0, &buf[..100]),
            Err(DeviceError::Misaligned { .. })
        ));
    }

    #[test]
    fn block_mut_edits_are_visible_to_reads() {
        let mut dev = MemDevice::new(2);
        dev.block_mut(1)[5] = 0x42;
        let mut buf = [0u8; 512];
        dev.read(512, &mut buf).unwrap();
        assert_eq!(buf[5], 0x42);
    }
}
