//! ntfslink - NTFS junction, reparse point and hard-link toolkit
//!
//! Works below the normal file API, talking straight to the NTFS
//! device-control interface:
//!
//! - **Junctions**: create, inspect, read and delete directory junctions
//!   (mount-point reparse points)
//! - **Reparse points**: tag-agnostic read/delete plus vendor-tagged create,
//!   with a bit-exact codec for the mount-point, symlink and GUID buffer
//!   shapes
//! - **Hard links**: enumerate every name of a file by walking its MFT
//!   record's $FILE_NAME attributes and each parent-directory chain
//!
//! # Example
//!
//! ```no_run
//! use ntfslink::{create_junction, is_junction, read_junction};
//!
//! fn main() -> ntfslink::Result<()> {
//!     create_junction("C:\\j", "C:\\target")?;
//!     assert!(is_junction("C:\\j"));
//!     println!("-> {}", read_junction("C:\\j")?);
//!     Ok(())
//! }
//! ```
//!
//! Creating and deleting reparse points, and reading MFT records, both
//! require administrative rights on most systems; the crate acquires the
//! backup/restore privileges best-effort before opening protected paths.

#![cfg(windows)]

pub mod error;
pub mod mft;
pub mod reparse;
pub mod volume;
pub mod winapi;

// Re-export main types
pub use error::{NtfsLinkError, Result};
pub use mft::{enumerate_links, LinkSet, MftRecordReader, RecordSource, ResolvedPath};
pub use reparse::{
    create_custom_reparse_point, create_junction, create_symlink, delete_junction,
    delete_junction_record, delete_reparse_point, directory_state, is_junction, read_junction,
    read_reparse_point, DirectoryState, ReparseBuffer, ReparseGuid,
};
pub use volume::VolumeContext;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Enumerate the hard links of an ordinary path.
///
/// Convenience entry point: resolves the path, opens its volume through the
/// supplied context, obtains the file reference number, and walks the MFT.
/// Returns the drive letter alongside the link set for display.
pub fn links_of_path(context: &mut VolumeContext, path: &str) -> Result<(char, LinkSet)> {
    let absolute = winapi::full_path_name(path)?;
    if !winapi::path_exists(&absolute) {
        return Err(NtfsLinkError::InvalidTarget(absolute));
    }

    let (frn, _link_count) = winapi::file_reference_number(&absolute)?;
    let drive = volume::drive_letter_of(&absolute)?;

    context.open(drive)?;
    let record_size = context.file_record_size();
    let handle = context.open(drive)?;
    let reader = MftRecordReader::new(handle, record_size);
    let set = enumerate_links(&reader, frn)?;
    Ok((drive, set))
}
