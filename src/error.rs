//! Error types for ntfslink
//!
//! One error enum covers every operation in the crate, from path validation
//! through device-control transport up to on-disk corruption.

use thiserror::Error;

/// Main error type for ntfslink operations
#[derive(Error, Debug)]
pub enum NtfsLinkError {
    #[error("Failed to open volume '{0}': {1}")]
    VolumeOpenError(String, std::io::Error),

    #[error("Volume '{0}' is not an NTFS filesystem")]
    NotNtfs(String),

    #[error("Invalid or nonexistent target path: {0}")]
    InvalidTarget(String),

    #[error("Invalid link path: {0}")]
    InvalidLink(String),

    #[error("Target '{0}' is not a directory")]
    TargetNotDirectory(String),

    #[error("Link path '{0}' already exists")]
    LinkExists(String),

    #[error("'{0}' is not a junction")]
    NotAJunction(String),

    #[error("'{0}' is not a reparse point")]
    NotAReparsePoint(String),

    #[error("Failed to open '{0}' for reparse access: {1}")]
    ReparseOpenError(String, std::io::Error),

    #[error("Reparse tag 0x{0:08X} is not supported for this operation")]
    UnsupportedTag(u32),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed reparse buffer: {0}")]
    MalformedBuffer(String),

    #[error("Reparse data exceeds the {limit}-byte maximum ({got} bytes)")]
    BufferTooLarge { limit: usize, got: usize },

    #[error("MFT record {0} not found or not in use")]
    RecordNotFound(u64),

    #[error("Corrupt MFT record {0}: {1}")]
    CorruptRecord(u64, String),

    #[error("Path resolution exceeded {0} directory levels")]
    ResolveTooDeep(usize),

    #[error("Expected {expected} hard links, found {found}")]
    IncompleteLinkSet { expected: u16, found: usize },

    #[error("DeviceIoControl(0x{code:08X}) failed: {source}")]
    DeviceIo { code: u32, source: std::io::Error },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ntfslink operations
pub type Result<T> = std::result::Result<T, NtfsLinkError>;

impl NtfsLinkError {
    /// Check whether this error is recoverable: corruption confined to one
    /// file's metadata, which an enumeration may report and then skip.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NtfsLinkError::CorruptRecord(_, _)
                | NtfsLinkError::MalformedBuffer(_)
                | NtfsLinkError::IncompleteLinkSet { .. }
                | NtfsLinkError::ResolveTooDeep(_)
        )
    }
}
