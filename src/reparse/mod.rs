//! Reparse-point support
//!
//! - `buffer`: binary codec for the mount-point, symlink and GUID-tagged
//!   reparse buffer shapes
//! - `junction`: junction (mount point) lifecycle
//! - `point`: tag-agnostic reparse operations and symbolic links

pub mod buffer;
pub mod junction;
pub mod point;

pub use buffer::{ReparseBuffer, ReparseGuid, IO_REPARSE_TAG_MOUNT_POINT, IO_REPARSE_TAG_SYMLINK};
pub use junction::{
    create_junction, delete_junction, delete_junction_record, directory_state, is_junction,
    read_junction, DirectoryState,
};
pub use point::{
    create_custom_reparse_point, create_symlink, delete_reparse_point, read_reparse_point,
};
