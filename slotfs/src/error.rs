use crate::disk::block_device::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Read,
    Write,
    CorruptData,
    Assert,
    FileNotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum SlotFsError {
    #[error("device read failed at {address:#x}")]
    Read {
        address: u64,
        #[source]
        source: DeviceError,
    },
    #[error("device write failed at {address:#x}")]
    Write {
        address: u64,
        #[source]
        source: DeviceError,
    },
    #[error("device sync failed")]
    Sync(#[source] DeviceError),
    #[error("write of {requested} bytes exceeds slot capacity ({remaining} bytes left)")]
    SlotFull { requested: u64, remaining: u64 },
    #[error("both metadata copies of slot {0} are corrupt")]
    CorruptData(usize),
    #[error("no file in slot {0}")]
    FileNotFound(usize),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("contract violation: {0}")]
    Assert(&'static str),
}

impl SlotFsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SlotFsError::Read { .. } => ErrorKind::Read,
            SlotFsError::Write { .. } | SlotFsError::Sync(_) | SlotFsError::SlotFull { .. } => {
                ErrorKind::Write
            }
            SlotFsError::CorruptData(_) => ErrorKind::CorruptData,
            SlotFsError::FileNotFound(_) => ErrorKind::FileNotFound,
            SlotFsError::InvalidConfig(_) | SlotFsError::Assert(_) => ErrorKind::Assert,
        }
    }
}

pub type Result<T> = std::result::Result<T, SlotFsError>;
