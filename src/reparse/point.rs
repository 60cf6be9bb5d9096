//! Generic reparse-point operations
//!
//! Tag-agnostic read/delete/create built on the open → control-call →
//! codec pattern. The junction module layers the mount-point specific
//! protocol on top of these.

use crate::error::{NtfsLinkError, Result};
use crate::reparse::buffer::{
    is_microsoft_tag, ReparseBuffer, ReparseGuid, MAX_REPARSE_SIZE, REPARSE_GUID_HEADER_SIZE,
};
use crate::winapi::{
    device_io_control, file_attributes, is_directory, open_reparse_point, path_exists, to_wide,
    SafeHandle, FILE_ATTRIBUTE_REPARSE_POINT, FSCTL_DELETE_REPARSE_POINT, FSCTL_GET_REPARSE_POINT,
    FSCTL_SET_REPARSE_POINT,
};
use byteorder::{LittleEndian, WriteBytesExt};

/// True if the path exists and carries the reparse-point attribute
pub fn has_reparse_attribute(path: &str) -> bool {
    file_attributes(path)
        .map(|a| a & FILE_ATTRIBUTE_REPARSE_POINT != 0)
        .unwrap_or(false)
}

/// Fetch the raw reparse buffer through an already-open handle
pub fn get_raw_reparse_buffer(handle: &SafeHandle) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; MAX_REPARSE_SIZE];
    let returned = device_io_control(handle, FSCTL_GET_REPARSE_POINT, None, Some(&mut buffer))?;
    buffer.truncate(returned as usize);
    Ok(buffer)
}

/// Read and decode the reparse point at `path`, whatever its tag
pub fn read_reparse_point(path: &str) -> Result<ReparseBuffer> {
    if !has_reparse_attribute(path) {
        return Err(NtfsLinkError::NotAReparsePoint(path.to_string()));
    }

    let handle = open_reparse_point(path, false)?;
    let raw = get_raw_reparse_buffer(&handle)?;
    ReparseBuffer::decode(&raw)
}

/// Serialize a GUID-qualified delete header: tag + zero length + GUID
fn guid_delete_header(tag: u32, guid: &ReparseGuid) -> Vec<u8> {
    let mut out = Vec::with_capacity(REPARSE_GUID_HEADER_SIZE);
    out.write_u32::<LittleEndian>(tag).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    guid.write_to(&mut out);
    out
}

/// Delete the reparse point at `path`, leaving the underlying file or
/// directory in place.
///
/// Two-step protocol: a tag-only delete is attempted first; if the driver
/// rejects it, the point's own tag and GUID are read back and the delete is
/// retried with them. Some reparse-point kinds require the GUID match to
/// authorize deletion, so the retry is part of the protocol rather than a
/// fallback. Only the retry's failure is reported.
pub fn delete_reparse_point(path: &str) -> Result<()> {
    if !has_reparse_attribute(path) {
        return Err(NtfsLinkError::NotAReparsePoint(path.to_string()));
    }

    let handle = open_reparse_point(path, true)?;
    let raw = get_raw_reparse_buffer(&handle)?;
    let decoded = ReparseBuffer::decode(&raw)?;
    let tag = decoded.tag();

    let header = guid_delete_header(tag, &ReparseGuid::default());
    let first = device_io_control(
        &handle,
        FSCTL_DELETE_REPARSE_POINT,
        Some(&header),
        None,
    );
    if first.is_ok() {
        return Ok(());
    }

    log::debug!(
        "tag-only delete of 0x{:08X} on '{}' rejected, retrying with GUID",
        tag,
        path
    );
    let guid = match decoded {
        ReparseBuffer::Generic {
            guid: Some(guid), ..
        } => guid,
        _ => ReparseGuid::default(),
    };
    let header = guid_delete_header(tag, &guid);
    device_io_control(
        &handle,
        FSCTL_DELETE_REPARSE_POINT,
        Some(&header),
        None,
    )?;
    Ok(())
}

/// Issue the set call with an already-encoded reparse buffer
pub fn set_reparse_point(handle: &SafeHandle, encoded: &[u8]) -> Result<()> {
    device_io_control(handle, FSCTL_SET_REPARSE_POINT, Some(encoded), None)?;
    Ok(())
}

/// Attach vendor-tagged reparse data to an existing file or directory.
///
/// Third-party tags (bit 31 clear) must supply the GUID that qualifies them.
pub fn create_custom_reparse_point(
    path: &str,
    tag: u32,
    guid: Option<ReparseGuid>,
    payload: &[u8],
) -> Result<()> {
    if !path_exists(path) {
        return Err(NtfsLinkError::InvalidLink(path.to_string()));
    }
    if !is_microsoft_tag(tag) && guid.is_none() {
        return Err(NtfsLinkError::InvalidArgument(format!(
            "third-party reparse tag 0x{:08X} requires a GUID",
            tag
        )));
    }

    let buffer = ReparseBuffer::Generic {
        tag,
        guid,
        data: payload.to_vec(),
    };
    let encoded = buffer.encode()?;

    let handle = open_reparse_point(path, true)?;
    set_reparse_point(&handle, &encoded)
}

// ============================================================================
// Symbolic Links
// ============================================================================

pub const SYMBOLIC_LINK_FLAG_FILE: u32 = 0x0;
pub const SYMBOLIC_LINK_FLAG_DIRECTORY: u32 = 0x1;

/// Create an NT symbolic link at `link_path` pointing to `target_path`.
///
/// The file/directory flavor follows the target's current kind. Absolute
/// targets must exist; relative targets are taken as given.
pub fn create_symlink(link_path: &str, target_path: &str) -> Result<()> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{CreateSymbolicLinkW, SYMBOLIC_LINK_FLAGS};

    let target = crate::winapi::full_path_name(target_path)
        .map_err(|_| NtfsLinkError::InvalidTarget(target_path.to_string()))?;
    if !path_exists(&target) {
        return Err(NtfsLinkError::InvalidTarget(target_path.to_string()));
    }
    let link = crate::winapi::full_path_name(link_path)
        .map_err(|_| NtfsLinkError::InvalidLink(link_path.to_string()))?;
    if path_exists(&link) {
        return Err(NtfsLinkError::LinkExists(link));
    }

    let flags = if is_directory(&target) {
        SYMBOLIC_LINK_FLAG_DIRECTORY
    } else {
        SYMBOLIC_LINK_FLAG_FILE
    };

    let wide_link = to_wide(&link);
    let wide_target = to_wide(&target);
    let created = unsafe {
        CreateSymbolicLinkW(
            PCWSTR::from_raw(wide_link.as_ptr()),
            PCWSTR::from_raw(wide_target.as_ptr()),
            SYMBOLIC_LINK_FLAGS(flags),
        )
    };

    if created.as_bool() {
        log::info!("created symlink '{}' -> '{}'", link, target);
        Ok(())
    } else {
        Err(NtfsLinkError::Io(std::io::Error::last_os_error()))
    }
}
