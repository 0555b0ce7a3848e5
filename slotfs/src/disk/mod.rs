pub mod block_device;
pub mod file_device;
pub mod mem_device;
