//! Junction lifecycle
//!
//! Create, inspect and remove directory junctions (mount-point reparse
//! points). Creation validates both paths up front, builds the `\??\` native
//! target form, and rolls the link directory back if the set call fails.

use crate::error::{NtfsLinkError, Result};
use crate::reparse::buffer::{ReparseBuffer, IO_REPARSE_TAG_MOUNT_POINT};
use crate::reparse::point::{get_raw_reparse_buffer, set_reparse_point};
use crate::volume::{drive_letter_of, is_ntfs};
use crate::winapi::{
    create_directory, device_io_control, file_attributes, full_path_name, is_directory,
    open_reparse_point, path_exists, remove_directory, FILE_ATTRIBUTE_DIRECTORY,
    FILE_ATTRIBUTE_REPARSE_POINT, FSCTL_DELETE_REPARSE_POINT,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Kernel namespace prefix for mount-point targets
pub const NATIVE_PREFIX: &str = "\\??\\";

/// Classic tag-only mount-point delete header: tag(4) + dataLength(4), zeroed
const MOUNT_POINT_HEADER_SIZE: usize = 8;

// ============================================================================
// Directory State
// ============================================================================

/// What a path is, as far as the junction operations are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    NotExisting,
    PlainDirectory,
    Junction,
    OtherReparsePoint,
}

/// Classify a path without following any reparse point on it
pub fn directory_state(path: &str) -> DirectoryState {
    let attrs = match file_attributes(path) {
        Some(a) => a,
        None => return DirectoryState::NotExisting,
    };
    if attrs & FILE_ATTRIBUTE_DIRECTORY == 0 {
        return DirectoryState::NotExisting;
    }
    if attrs & FILE_ATTRIBUTE_REPARSE_POINT == 0 {
        return DirectoryState::PlainDirectory;
    }
    if reparse_tag_of(path) == Some(IO_REPARSE_TAG_MOUNT_POINT) {
        DirectoryState::Junction
    } else {
        DirectoryState::OtherReparsePoint
    }
}

fn reparse_tag_of(path: &str) -> Option<u32> {
    let handle = open_reparse_point(path, false).ok()?;
    let raw = get_raw_reparse_buffer(&handle).ok()?;
    Cursor::new(raw).read_u32::<LittleEndian>().ok()
}

/// Check whether `path` is a junction.
///
/// Pure query: false for nonexistent paths, files, plain directories and
/// reparse points of any other tag. Never errors and never mutates.
pub fn is_junction(path: &str) -> bool {
    directory_state(path) == DirectoryState::Junction
}

// ============================================================================
// Create
// ============================================================================

/// Build the native target form: `\??\` + absolute path, with a single
/// trailing separator stripped unless it directly follows the drive colon.
fn native_target_form(absolute_target: &str) -> String {
    let mut native = format!("{}{}", NATIVE_PREFIX, absolute_target);
    if native.ends_with('\\') {
        let chars: Vec<char> = native.chars().collect();
        if chars.len() >= 2 && chars[chars.len() - 2] != ':' {
            native.pop();
        }
    }
    native
}

/// Create a junction at `link_path` pointing to the directory `target_path`.
///
/// Both paths are resolved to absolute form first; nothing is created unless
/// validation passes. If the reparse data cannot be set after the link
/// directory was created, the directory is removed again (best effort) and
/// the set failure is what the caller sees.
pub fn create_junction(link_path: &str, target_path: &str) -> Result<()> {
    let target =
        full_path_name(target_path).map_err(|_| NtfsLinkError::InvalidTarget(target_path.into()))?;
    let link =
        full_path_name(link_path).map_err(|_| NtfsLinkError::InvalidLink(link_path.into()))?;

    if !path_exists(&target) {
        return Err(NtfsLinkError::InvalidTarget(target));
    }
    if !is_directory(&target) {
        return Err(NtfsLinkError::TargetNotDirectory(target));
    }

    let drive = drive_letter_of(&link)?;
    if !is_ntfs(drive)? {
        return Err(NtfsLinkError::NotNtfs(format!("{}:", drive)));
    }

    let native = native_target_form(&target);

    // Idempotent: an existing (empty) directory is acceptable as the link
    let created = match create_directory(&link) {
        Ok(()) => true,
        Err(_) if is_directory(&link) => false,
        Err(e) => return Err(NtfsLinkError::InvalidLink(format!("{}: {}", link, e))),
    };

    let result = (|| {
        let handle = open_reparse_point(&link, true)?;
        let encoded = ReparseBuffer::mount_point(&native, "").encode()?;
        set_reparse_point(&handle, &encoded)
    })();

    if let Err(e) = result {
        if created {
            // Roll back the directory we just made; its own failure is logged
            // but the set error stays the primary one.
            if let Err(rm) = remove_directory(&link) {
                log::warn!("rollback of '{}' failed: {}", link, rm);
            }
        }
        return Err(e);
    }

    log::info!("created junction '{}' -> '{}'", link, native);
    Ok(())
}

// ============================================================================
// Read
// ============================================================================

/// Read the target path of the junction at `path`, with the `\??\` prefix
/// stripped.
pub fn read_junction(path: &str) -> Result<String> {
    if !is_junction(path) {
        return Err(NtfsLinkError::NotAJunction(path.to_string()));
    }

    let handle = open_reparse_point(path, false)?;
    let raw = get_raw_reparse_buffer(&handle)?;
    match ReparseBuffer::decode(&raw)? {
        ReparseBuffer::MountPoint {
            substitute_name, ..
        } => Ok(substitute_name
            .strip_prefix(NATIVE_PREFIX)
            .unwrap_or(&substitute_name)
            .to_string()),
        other => Err(NtfsLinkError::UnsupportedTag(other.tag())),
    }
}

// ============================================================================
// Delete
// ============================================================================

/// Remove the reparse data from a junction, leaving an ordinary empty
/// directory behind.
pub fn delete_junction_record(path: &str) -> Result<()> {
    if !is_junction(path) {
        return Err(NtfsLinkError::NotAJunction(path.to_string()));
    }

    let handle = open_reparse_point(path, true)?;

    let mut header = Vec::with_capacity(MOUNT_POINT_HEADER_SIZE);
    header
        .write_u32::<LittleEndian>(IO_REPARSE_TAG_MOUNT_POINT)
        .unwrap();
    header.write_u32::<LittleEndian>(0).unwrap();

    device_io_control(&handle, FSCTL_DELETE_REPARSE_POINT, Some(&header), None)?;
    Ok(())
}

/// Remove a junction entirely: reparse data first, then the directory
pub fn delete_junction(path: &str) -> Result<()> {
    delete_junction_record(path)?;
    remove_directory(path)?;
    log::info!("deleted junction '{}'", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_form_prefixes_and_strips() {
        assert_eq!(native_target_form("C:\\target\\"), "\\??\\C:\\target");
        assert_eq!(native_target_form("C:\\target"), "\\??\\C:\\target");
    }

    #[test]
    fn native_form_keeps_root_separator() {
        // The separator right after the drive colon stays
        assert_eq!(native_target_form("C:\\"), "\\??\\C:\\");
    }
}
