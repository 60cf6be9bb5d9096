//! Volume handle management
//!
//! `VolumeContext` holds at most one open volume control handle and replaces
//! it when a different drive letter is requested. The context is owned by the
//! caller: two contexts never share state, so concurrent use means one
//! context (and one handle) per caller.

use crate::error::{NtfsLinkError, Result};
use crate::winapi::{
    device_io_control, open_volume, volume_filesystem_name, SafeHandle, FSCTL_GET_NTFS_VOLUME_DATA,
};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Standard MFT file record segment size, used when the volume query fails
pub const DEFAULT_FILE_RECORD_SIZE: u32 = 1024;

// ============================================================================
// NTFS Volume Data (from FSCTL_GET_NTFS_VOLUME_DATA)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NtfsVolumeData {
    pub volume_serial_number: u64,
    pub number_sectors: u64,
    pub total_clusters: u64,
    pub free_clusters: u64,
    pub total_reserved: u64,
    pub bytes_per_sector: u32,
    pub bytes_per_cluster: u32,
    pub bytes_per_file_record_segment: u32,
    pub clusters_per_file_record_segment: u32,
    pub mft_valid_data_length: u64,
    pub mft_start_lcn: u64,
    pub mft2_start_lcn: u64,
    pub mft_zone_start: u64,
    pub mft_zone_end: u64,
}

impl NtfsVolumeData {
    /// Parse from raw buffer (0x60 bytes from FSCTL_GET_NTFS_VOLUME_DATA)
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 0x60 {
            return None;
        }

        let mut cursor = Cursor::new(data);

        Some(Self {
            volume_serial_number: cursor.read_u64::<LittleEndian>().ok()?,
            number_sectors: cursor.read_u64::<LittleEndian>().ok()?,
            total_clusters: cursor.read_u64::<LittleEndian>().ok()?,
            free_clusters: cursor.read_u64::<LittleEndian>().ok()?,
            total_reserved: cursor.read_u64::<LittleEndian>().ok()?,
            bytes_per_sector: cursor.read_u32::<LittleEndian>().ok()?,
            bytes_per_cluster: cursor.read_u32::<LittleEndian>().ok()?,
            bytes_per_file_record_segment: cursor.read_u32::<LittleEndian>().ok()?,
            clusters_per_file_record_segment: cursor.read_u32::<LittleEndian>().ok()?,
            mft_valid_data_length: cursor.read_u64::<LittleEndian>().ok()?,
            mft_start_lcn: cursor.read_u64::<LittleEndian>().ok()?,
            mft2_start_lcn: cursor.read_u64::<LittleEndian>().ok()?,
            mft_zone_start: cursor.read_u64::<LittleEndian>().ok()?,
            mft_zone_end: cursor.read_u64::<LittleEndian>().ok()?,
        })
    }
}

/// Fetch NTFS volume data for an open volume handle
pub fn get_ntfs_volume_data(handle: &SafeHandle) -> Result<NtfsVolumeData> {
    let mut buffer = [0u8; 0x60];
    device_io_control(handle, FSCTL_GET_NTFS_VOLUME_DATA, None, Some(&mut buffer))?;

    NtfsVolumeData::from_bytes(&buffer).ok_or_else(|| {
        NtfsLinkError::MalformedBuffer("short FSCTL_GET_NTFS_VOLUME_DATA response".to_string())
    })
}

// ============================================================================
// Volume Context
// ============================================================================

/// Caller-owned, single-slot volume handle cache.
///
/// `open` returns the cached handle when the same drive letter is requested
/// again; a different letter closes the previous handle and opens the new
/// volume.
#[derive(Default)]
pub struct VolumeContext {
    slot: Option<(char, SafeHandle)>,
}

impl VolumeContext {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Open (or reuse) the control handle for a drive letter
    pub fn open(&mut self, drive_letter: char) -> Result<&SafeHandle> {
        let letter = drive_letter.to_ascii_uppercase();

        let reuse = matches!(&self.slot, Some((cached, _)) if *cached == letter);
        if !reuse {
            // Replacing the slot drops (closes) any previous handle
            let handle = open_volume(letter)?;
            log::debug!("opened volume handle for {}:", letter);
            self.slot = Some((letter, handle));
        }

        Ok(&self.slot.as_ref().unwrap().1)
    }

    /// Open the volume containing an absolute path
    pub fn open_for_path(&mut self, path: &str) -> Result<&SafeHandle> {
        let letter = drive_letter_of(path)?;
        self.open(letter)
    }

    /// Drive letter of the currently cached handle, if any
    pub fn current(&self) -> Option<char> {
        self.slot.as_ref().map(|(letter, _)| *letter)
    }

    /// File record segment size of the cached volume, with the NTFS default
    /// as fallback when the query is denied.
    pub fn file_record_size(&self) -> u32 {
        match &self.slot {
            Some((_, handle)) => get_ntfs_volume_data(handle)
                .map(|v| v.bytes_per_file_record_segment)
                .unwrap_or(DEFAULT_FILE_RECORD_SIZE),
            None => DEFAULT_FILE_RECORD_SIZE,
        }
    }
}

/// Extract the drive letter from an absolute path like `C:\dir\file`
pub fn drive_letter_of(path: &str) -> Result<char> {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            Ok(letter.to_ascii_uppercase())
        }
        _ => Err(NtfsLinkError::InvalidArgument(format!(
            "path '{}' has no drive letter",
            path
        ))),
    }
}

/// Check whether the volume holding `drive_letter` is NTFS
pub fn is_ntfs(drive_letter: char) -> Result<bool> {
    let name = volume_filesystem_name(drive_letter)?;
    Ok(name.eq_ignore_ascii_case("NTFS"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_letter_extraction() {
        assert_eq!(drive_letter_of("C:\\Windows").unwrap(), 'C');
        assert_eq!(drive_letter_of("d:\\").unwrap(), 'D');
        assert!(drive_letter_of("\\\\server\\share").is_err());
        assert!(drive_letter_of("").is_err());
    }

    #[test]
    fn volume_data_rejects_short_buffer() {
        assert!(NtfsVolumeData::from_bytes(&[0u8; 0x40]).is_none());
    }

    #[test]
    fn volume_data_parses_record_size() {
        let mut buf = [0u8; 0x60];
        // bytes_per_file_record_segment lives at offset 0x30
        buf[0x30..0x34].copy_from_slice(&1024u32.to_le_bytes());
        let data = NtfsVolumeData::from_bytes(&buf).unwrap();
        assert_eq!(data.bytes_per_file_record_segment, 1024);
    }
}
