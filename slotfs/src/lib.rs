pub mod constants;
pub mod disk;
pub mod error;
pub mod meta;
pub mod page;
pub mod slot;

pub use constants::BLOCK_SIZE;
pub use disk::block_device::{BlockDevice, DeviceError};
pub use disk::file_device::FsImageDevice;
pub use disk::mem_device::MemDevice;
pub use error::{ErrorKind, Result, SlotFsError};
pub use meta::config_block::Config;
pub use meta::meta_block::MetaBlock;
pub use slot::slot_file::{Mode, ReadOutcome, ReadStatus, SlotFile};
pub use slot::slot_fs::{SlotFs, SlotReport};
