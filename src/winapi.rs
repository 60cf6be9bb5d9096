//! Windows API bindings for reparse-point and MFT operations
//!
//! Safe wrappers around the Win32 surface this crate consumes: volume and
//! directory handles, DeviceIoControl, path/attribute queries, and the
//! backup/restore privilege adjustment needed to open protected directories.

use crate::error::{NtfsLinkError, Result};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::sync::Once;

// ============================================================================
// IOCTL Control Codes (from winioctl.h)
// ============================================================================

pub const FSCTL_GET_NTFS_VOLUME_DATA: u32 = 0x00090064;
pub const FSCTL_GET_NTFS_FILE_RECORD: u32 = 0x00090068;
pub const FSCTL_SET_REPARSE_POINT: u32 = 0x000900A4;
pub const FSCTL_GET_REPARSE_POINT: u32 = 0x000900A8;
pub const FSCTL_DELETE_REPARSE_POINT: u32 = 0x000900AC;

// File access and attribute flags for CreateFile
pub const GENERIC_READ: u32 = 0x80000000;
pub const GENERIC_WRITE: u32 = 0x40000000;
pub const FILE_SHARE_READ: u32 = 0x00000001;
pub const FILE_SHARE_WRITE: u32 = 0x00000002;
pub const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x02000000;
pub const FILE_FLAG_OPEN_REPARSE_POINT: u32 = 0x00200000;
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x00000080;

pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x00000010;
pub const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x00000400;
pub const INVALID_FILE_ATTRIBUTES: u32 = u32::MAX;

pub const INVALID_HANDLE_VALUE: isize = -1;

// ============================================================================
// Safe Handle Wrapper
// ============================================================================

/// RAII wrapper for Windows HANDLE
pub struct SafeHandle {
    handle: isize,
}

impl SafeHandle {
    /// Create from raw handle
    pub fn new(handle: isize) -> Option<Self> {
        if handle == INVALID_HANDLE_VALUE || handle == 0 {
            None
        } else {
            Some(Self { handle })
        }
    }

    /// Get raw handle value
    pub fn as_raw(&self) -> isize {
        self.handle
    }

    fn as_win32(&self) -> windows::Win32::Foundation::HANDLE {
        windows::Win32::Foundation::HANDLE(self.handle as *mut std::ffi::c_void)
    }

    /// Check if handle is valid
    pub fn is_valid(&self) -> bool {
        self.handle != INVALID_HANDLE_VALUE && self.handle != 0
    }
}

impl Drop for SafeHandle {
    fn drop(&mut self) {
        if self.is_valid() {
            unsafe {
                let _ = windows::Win32::Foundation::CloseHandle(self.as_win32());
            }
        }
    }
}

// ============================================================================
// Wide-String Helpers
// ============================================================================

/// Encode a path as a NUL-terminated UTF-16 buffer
pub fn to_wide(path: &str) -> Vec<u16> {
    OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Decode a UTF-16 buffer, stopping at the first NUL
pub fn from_wide(buffer: &[u16]) -> String {
    let end = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..end])
}

// ============================================================================
// Privilege Elevation
// ============================================================================

const SE_BACKUP_NAME: &str = "SeBackupPrivilege";
const SE_RESTORE_NAME: &str = "SeRestorePrivilege";

static PRIVILEGES: Once = Once::new();

/// Best-effort acquisition of the backup and restore privileges.
///
/// Opening a protected directory with backup semantics requires these on most
/// systems. Failure is ignored: the subsequent CreateFile reports the real
/// access error if the privileges were actually needed.
pub fn enable_backup_privileges() {
    PRIVILEGES.call_once(|| {
        for name in [SE_BACKUP_NAME, SE_RESTORE_NAME] {
            if !enable_privilege(name) {
                log::debug!("could not enable {}", name);
            }
        }
    });
}

fn enable_privilege(name: &str) -> bool {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{HANDLE, LUID};
    use windows::Win32::Security::{
        AdjustTokenPrivileges, LookupPrivilegeValueW, LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED,
        TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    let wide_name = to_wide(name);
    unsafe {
        let mut token = HANDLE::default();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_ADJUST_PRIVILEGES, &mut token).is_err() {
            return false;
        }
        let token = match SafeHandle::new(token.0 as isize) {
            Some(t) => t,
            None => return false,
        };

        let mut luid = LUID::default();
        if LookupPrivilegeValueW(PCWSTR::null(), PCWSTR::from_raw(wide_name.as_ptr()), &mut luid)
            .is_err()
        {
            return false;
        }

        let privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };

        AdjustTokenPrivileges(
            token.as_win32(),
            false,
            Some(&privileges),
            std::mem::size_of::<TOKEN_PRIVILEGES>() as u32,
            None,
            None,
        )
        .is_ok()
    }
}

// ============================================================================
// Open Operations
// ============================================================================

/// Open a volume control handle to `\\.\<letter>:`
pub fn open_volume(drive_letter: char) -> Result<SafeHandle> {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
    };

    let path = format!("\\\\.\\{}:", drive_letter);
    let wide_path = to_wide(&path);

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            GENERIC_READ,
            FILE_SHARE_MODE(FILE_SHARE_READ | FILE_SHARE_WRITE),
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(FILE_ATTRIBUTE_NORMAL),
            HANDLE::default(),
        )
    };

    match handle {
        Ok(h) => SafeHandle::new(h.0 as isize)
            .ok_or_else(|| NtfsLinkError::VolumeOpenError(path, std::io::Error::last_os_error())),
        Err(e) => Err(NtfsLinkError::VolumeOpenError(
            path,
            std::io::Error::from_raw_os_error(e.code().0 as i32),
        )),
    }
}

/// Open a file or directory with reparse-point and backup semantics.
///
/// `write` selects GENERIC_READ|GENERIC_WRITE (set/delete operations) versus
/// GENERIC_READ (inspection). The open never follows the reparse point itself.
pub fn open_reparse_point(path: &str, write: bool) -> Result<SafeHandle> {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
    };

    enable_backup_privileges();

    let access = if write {
        GENERIC_READ | GENERIC_WRITE
    } else {
        GENERIC_READ
    };
    let wide_path = to_wide(path);

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            access,
            FILE_SHARE_MODE(0),
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(FILE_FLAG_OPEN_REPARSE_POINT | FILE_FLAG_BACKUP_SEMANTICS),
            HANDLE::default(),
        )
    };

    match handle {
        Ok(h) => SafeHandle::new(h.0 as isize).ok_or_else(|| {
            NtfsLinkError::ReparseOpenError(path.to_string(), std::io::Error::last_os_error())
        }),
        Err(e) => Err(NtfsLinkError::ReparseOpenError(
            path.to_string(),
            std::io::Error::from_raw_os_error(e.code().0 as i32),
        )),
    }
}

/// Open a path read-only for metadata queries (GetFileInformationByHandle)
pub fn open_for_metadata(path: &str) -> Result<SafeHandle> {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
    };

    // Directories can only be opened with backup semantics
    let flags = if is_directory(path) {
        FILE_FLAG_BACKUP_SEMANTICS
    } else {
        FILE_ATTRIBUTE_NORMAL
    };
    let wide_path = to_wide(path);

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            GENERIC_READ,
            FILE_SHARE_MODE(FILE_SHARE_READ | FILE_SHARE_WRITE),
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(flags),
            HANDLE::default(),
        )
    };

    match handle {
        Ok(h) => SafeHandle::new(h.0 as isize)
            .ok_or_else(|| NtfsLinkError::Io(std::io::Error::last_os_error())),
        Err(e) => Err(NtfsLinkError::Io(std::io::Error::from_raw_os_error(
            e.code().0 as i32,
        ))),
    }
}

// ============================================================================
// IOCTL Operations
// ============================================================================

/// Send a DeviceIoControl request
pub fn device_io_control(
    handle: &SafeHandle,
    control_code: u32,
    in_buffer: Option<&[u8]>,
    out_buffer: Option<&mut [u8]>,
) -> Result<u32> {
    use windows::Win32::System::IO::DeviceIoControl;

    let mut bytes_returned: u32 = 0;

    let (in_ptr, in_size) = match in_buffer {
        Some(buf) => (buf.as_ptr() as *const std::ffi::c_void, buf.len() as u32),
        None => (ptr::null(), 0),
    };
    let (out_ptr, out_size) = match out_buffer {
        Some(buf) => (buf.as_mut_ptr() as *mut std::ffi::c_void, buf.len() as u32),
        None => (ptr::null_mut(), 0),
    };

    let result = unsafe {
        DeviceIoControl(
            handle.as_win32(),
            control_code,
            Some(in_ptr),
            in_size,
            Some(out_ptr),
            out_size,
            Some(&mut bytes_returned),
            None,
        )
    };

    if result.is_ok() {
        Ok(bytes_returned)
    } else {
        Err(NtfsLinkError::DeviceIo {
            code: control_code,
            source: std::io::Error::last_os_error(),
        })
    }
}

// ============================================================================
// Path Queries
// ============================================================================

/// Raw GetFileAttributes, None if the path does not exist
pub fn file_attributes(path: &str) -> Option<u32> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetFileAttributesW;

    let wide_path = to_wide(path);
    let attrs = unsafe { GetFileAttributesW(PCWSTR::from_raw(wide_path.as_ptr())) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        None
    } else {
        Some(attrs)
    }
}

pub fn path_exists(path: &str) -> bool {
    file_attributes(path).is_some()
}

pub fn is_directory(path: &str) -> bool {
    file_attributes(path)
        .map(|a| a & FILE_ATTRIBUTE_DIRECTORY != 0)
        .unwrap_or(false)
}

/// Resolve a possibly-relative path to its absolute form.
///
/// Resolution is lexical (the path need not exist); existence is checked
/// separately by the callers that require it.
pub fn full_path_name(path: &str) -> Result<String> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetFullPathNameW;

    let wide_path = to_wide(path);
    let mut buffer = vec![0u16; 1024];
    let len = unsafe {
        GetFullPathNameW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            Some(&mut buffer),
            None,
        )
    };

    if len == 0 {
        return Err(NtfsLinkError::Io(std::io::Error::last_os_error()));
    }
    if len as usize > buffer.len() {
        buffer.resize(len as usize, 0);
        let len = unsafe {
            GetFullPathNameW(
                PCWSTR::from_raw(wide_path.as_ptr()),
                Some(&mut buffer),
                None,
            )
        };
        if len == 0 {
            return Err(NtfsLinkError::Io(std::io::Error::last_os_error()));
        }
    }

    Ok(from_wide(&buffer))
}

/// Name of the filesystem backing the volume root, e.g. "NTFS"
pub fn volume_filesystem_name(drive_letter: char) -> Result<String> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetVolumeInformationW;

    let root = format!("{}:\\", drive_letter);
    let wide_root = to_wide(&root);
    let mut fs_name = [0u16; 64];

    let result = unsafe {
        GetVolumeInformationW(
            PCWSTR::from_raw(wide_root.as_ptr()),
            None,
            None,
            None,
            None,
            Some(&mut fs_name),
        )
    };

    match result {
        Ok(()) => Ok(from_wide(&fs_name)),
        Err(e) => Err(NtfsLinkError::Io(std::io::Error::from_raw_os_error(
            e.code().0 as i32,
        ))),
    }
}

// ============================================================================
// Directory Operations
// ============================================================================

/// CreateDirectory; a pre-existing directory is reported as `already_exists`
pub fn create_directory(path: &str) -> std::io::Result<()> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::CreateDirectoryW;

    let wide_path = to_wide(path);
    unsafe { CreateDirectoryW(PCWSTR::from_raw(wide_path.as_ptr()), None) }
        .map_err(|e| std::io::Error::from_raw_os_error(e.code().0 as i32))
}

pub fn remove_directory(path: &str) -> std::io::Result<()> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::RemoveDirectoryW;

    let wide_path = to_wide(path);
    unsafe { RemoveDirectoryW(PCWSTR::from_raw(wide_path.as_ptr())) }
        .map_err(|e| std::io::Error::from_raw_os_error(e.code().0 as i32))
}

// ============================================================================
// File Reference Numbers
// ============================================================================

/// Fetch the 64-bit file reference number and link count of a path
pub fn file_reference_number(path: &str) -> Result<(u64, u32)> {
    use windows::Win32::Storage::FileSystem::{
        GetFileInformationByHandle, BY_HANDLE_FILE_INFORMATION,
    };

    let handle = open_for_metadata(path)?;
    let mut info = BY_HANDLE_FILE_INFORMATION::default();

    unsafe { GetFileInformationByHandle(handle.as_win32(), &mut info) }
        .map_err(|e| NtfsLinkError::Io(std::io::Error::from_raw_os_error(e.code().0 as i32)))?;

    let frn = ((info.nFileIndexHigh as u64) << 32) | info.nFileIndexLow as u64;
    Ok((frn, info.nNumberOfLinks))
}
