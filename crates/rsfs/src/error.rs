use rsfs_io::DiskError;

use crate::structures::raw::constants::MAX_NAME_LEN;

/// Errors reported by a [`crate::Volume`].
///
/// Every failure leaves the in-memory tables as they were, except for
/// [`FsError::InsufficientSpace`] after a partial write, where the bytes
/// counted in `written` are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("volume is not formatted")]
    NotFormatted,
    #[error("file already exists")]
    AlreadyExists,
    #[error("directory is full")]
    DirectoryFull,
    #[error("name is {len} bytes long, at most {max} are allowed", max = MAX_NAME_LEN)]
    NameTooLong { len: usize },
    #[error("name is empty or contains a NUL byte")]
    InvalidName,
    #[error("file not found")]
    NotFound,
    #[error("file is already open")]
    AlreadyOpen,
    #[error("file is not open")]
    NotOpen,
    /// The volume ran out of space; `written` bytes made it to disk before that.
    #[error("insufficient space on volume ({written} bytes written)")]
    InsufficientSpace { written: usize },
    #[error("invalid open mode for this operation")]
    InvalidMode,
    #[error("device error: {0}")]
    Device(#[from] DiskError),
    /// A FAT chain loops, leaves the table or runs into a reserved cluster.
    #[error("allocation table is inconsistent at cluster {cluster}")]
    ConsistencyViolation { cluster: u16 },
    #[error("device has {sectors} sectors, too small to hold a volume")]
    DeviceTooSmall { sectors: u32 },
}

pub type Result<T, E = FsError> = core::result::Result<T, E>;
