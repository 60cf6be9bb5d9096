//! Reparse buffer codec
//!
//! Binary encode/decode of the three reparse-buffer shapes exchanged with
//! FSCTL_GET/SET/DELETE_REPARSE_POINT: mount points (junctions), symbolic
//! links, and GUID-tagged generic data. Pure byte manipulation, no I/O.

use crate::error::{NtfsLinkError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::Cursor;

// ============================================================================
// Reparse Tags and Size Limits
// ============================================================================

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA0000003;
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000000C;
pub const IO_REPARSE_TAG_HSM: u32 = 0xC0000004;
pub const IO_REPARSE_TAG_SIS: u32 = 0x80000007;

/// Maximum total reparse buffer: 16 KiB of user data plus header slack
pub const MAX_REPARSE_SIZE: usize = 17000;

/// Maximum user-defined reparse data
pub const MAX_REPARSE_DATA: usize = 16 * 1024;

/// Common header: tag(4) + dataLength(2) + reserved(2)
pub const REPARSE_HEADER_SIZE: usize = 8;

/// GUID-qualified header: common header + guid(16)
pub const REPARSE_GUID_HEADER_SIZE: usize = REPARSE_HEADER_SIZE + 16;

/// Flags value marking a relative symbolic link target
pub const SYMLINK_FLAG_RELATIVE: u32 = 0x0000_0001;

/// Microsoft-defined tags carry bit 31; third-party tags carry a GUID instead
pub fn is_microsoft_tag(tag: u32) -> bool {
    tag & 0x8000_0000 != 0
}

// ============================================================================
// GUID
// ============================================================================

/// 16-byte reparse GUID, stored in on-disk field order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReparseGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl ReparseGuid {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 16 {
            return None;
        }
        let mut cursor = Cursor::new(data);
        let data1 = cursor.read_u32::<LittleEndian>().ok()?;
        let data2 = cursor.read_u16::<LittleEndian>().ok()?;
        let data3 = cursor.read_u16::<LittleEndian>().ok()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&data[8..16]);
        Some(Self {
            data1,
            data2,
            data3,
            data4,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.write_u32::<LittleEndian>(self.data1).unwrap();
        out.write_u16::<LittleEndian>(self.data2).unwrap();
        out.write_u16::<LittleEndian>(self.data3).unwrap();
        out.extend_from_slice(&self.data4);
    }

    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }
}

impl std::fmt::Display for ReparseGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

// ============================================================================
// Reparse Buffer
// ============================================================================

/// Decoded reparse point data, keyed by the 32-bit reparse tag.
///
/// `decode(encode(x))` returns a value equal to `x` for every representable
/// value; padding inside the wire form is not observable through the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReparseBuffer {
    /// Directory junction / volume mount point
    MountPoint {
        substitute_name: String,
        print_name: String,
    },
    /// NT symbolic link
    SymbolicLink {
        substitute_name: String,
        print_name: String,
        flags: u32,
    },
    /// Any other tag: raw payload, GUID-qualified for third-party tags
    Generic {
        tag: u32,
        guid: Option<ReparseGuid>,
        data: Vec<u8>,
    },
}

impl ReparseBuffer {
    /// The reparse tag identifying this buffer's shape
    pub fn tag(&self) -> u32 {
        match self {
            ReparseBuffer::MountPoint { .. } => IO_REPARSE_TAG_MOUNT_POINT,
            ReparseBuffer::SymbolicLink { .. } => IO_REPARSE_TAG_SYMLINK,
            ReparseBuffer::Generic { tag, .. } => *tag,
        }
    }

    /// Build a mount-point buffer for a native (`\??\`-prefixed) target
    pub fn mount_point(substitute_name: &str, print_name: &str) -> Self {
        ReparseBuffer::MountPoint {
            substitute_name: substitute_name.to_string(),
            print_name: print_name.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Encode
    // ------------------------------------------------------------------

    /// Serialize into the exact wire layout expected by the set call
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            ReparseBuffer::MountPoint {
                substitute_name,
                print_name,
            } => encode_mount_point(substitute_name, print_name),
            ReparseBuffer::SymbolicLink {
                substitute_name,
                print_name,
                flags,
            } => encode_symlink(substitute_name, print_name, *flags),
            ReparseBuffer::Generic { tag, guid, data } => encode_generic(*tag, guid, data),
        }
    }

    // ------------------------------------------------------------------
    // Decode
    // ------------------------------------------------------------------

    /// Deserialize a buffer returned by the get call, dispatching on its tag.
    /// Unknown tags decode to `Generic` with the raw payload preserved.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < REPARSE_HEADER_SIZE {
            return Err(NtfsLinkError::MalformedBuffer(format!(
                "{} bytes is shorter than the reparse header",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let tag = cursor.read_u32::<LittleEndian>().unwrap();
        let data_length = cursor.read_u16::<LittleEndian>().unwrap() as usize;
        let _reserved = cursor.read_u16::<LittleEndian>().unwrap();

        match tag {
            IO_REPARSE_TAG_MOUNT_POINT => decode_mount_point(data, data_length),
            IO_REPARSE_TAG_SYMLINK => decode_symlink(data, data_length),
            _ => decode_generic(tag, data, data_length),
        }
    }
}

// ============================================================================
// Wire-Format Helpers
// ============================================================================

fn utf16_bytes(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.write_u16::<LittleEndian>(unit).unwrap();
    }
    out
}

fn utf16_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Slice `offset..offset + length` out of a path buffer, with bounds checks
fn name_slice(path_buffer: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
    if offset + length > path_buffer.len() {
        return Err(NtfsLinkError::MalformedBuffer(format!(
            "name at offset {} with length {} exceeds {}-byte path buffer",
            offset,
            length,
            path_buffer.len()
        )));
    }
    Ok(&path_buffer[offset..offset + length])
}

fn check_total_size(total: usize) -> Result<()> {
    if total > MAX_REPARSE_SIZE {
        return Err(NtfsLinkError::BufferTooLarge {
            limit: MAX_REPARSE_SIZE,
            got: total,
        });
    }
    Ok(())
}

// ============================================================================
// Mount Point
// ============================================================================

// Layout: tag(4) dataLength(2) reserved(2)
//         substOffset(2) substLength(2) printOffset(2) printLength(2)
//         PathBuffer = substitute \0 print \0
//
// dataLength never exceeds 16 KiB, so the 2-byte dataLength plus zero
// reserved word is byte-identical to the 4-byte dataLength of the classic
// mount-point set buffer; with an empty print name the name fields coincide
// with that form's target-length/target-max-length/reserved fields and
// dataLength = substLength + 12.
fn encode_mount_point(substitute_name: &str, print_name: &str) -> Result<Vec<u8>> {
    let subst = utf16_bytes(substitute_name);
    let print = utf16_bytes(print_name);

    let data_length = 8 + subst.len() + 2 + print.len() + 2;
    check_total_size(REPARSE_HEADER_SIZE + data_length)?;

    let mut out = Vec::with_capacity(REPARSE_HEADER_SIZE + data_length);
    out.write_u32::<LittleEndian>(IO_REPARSE_TAG_MOUNT_POINT)
        .unwrap();
    out.write_u16::<LittleEndian>(data_length as u16).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap(); // substitute name offset
    out.write_u16::<LittleEndian>(subst.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(subst.len() as u16 + 2).unwrap(); // print name offset
    out.write_u16::<LittleEndian>(print.len() as u16).unwrap();
    out.extend_from_slice(&subst);
    out.write_u16::<LittleEndian>(0).unwrap();
    out.extend_from_slice(&print);
    out.write_u16::<LittleEndian>(0).unwrap();

    Ok(out)
}

fn decode_mount_point(data: &[u8], data_length: usize) -> Result<ReparseBuffer> {
    const FIXED: usize = REPARSE_HEADER_SIZE + 8;
    if data.len() < FIXED || data_length < 8 {
        return Err(NtfsLinkError::MalformedBuffer(
            "mount-point buffer shorter than its fixed fields".to_string(),
        ));
    }

    let mut cursor = Cursor::new(&data[REPARSE_HEADER_SIZE..FIXED]);
    let subst_offset = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let subst_length = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let print_offset = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let print_length = cursor.read_u16::<LittleEndian>().unwrap() as usize;

    let path_buffer = &data[FIXED..];
    let substitute_name = utf16_string(name_slice(path_buffer, subst_offset, subst_length)?);
    let print_name = utf16_string(name_slice(path_buffer, print_offset, print_length)?);

    Ok(ReparseBuffer::MountPoint {
        substitute_name,
        print_name,
    })
}

// ============================================================================
// Symbolic Link
// ============================================================================

// Same name fields as the mount point plus a flags word before the path
// buffer. The print name precedes the substitute name in the path buffer and
// neither carries a terminator.
fn encode_symlink(substitute_name: &str, print_name: &str, flags: u32) -> Result<Vec<u8>> {
    let subst = utf16_bytes(substitute_name);
    let print = utf16_bytes(print_name);

    let data_length = 12 + print.len() + subst.len();
    check_total_size(REPARSE_HEADER_SIZE + data_length)?;

    let mut out = Vec::with_capacity(REPARSE_HEADER_SIZE + data_length);
    out.write_u32::<LittleEndian>(IO_REPARSE_TAG_SYMLINK).unwrap();
    out.write_u16::<LittleEndian>(data_length as u16).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(print.len() as u16).unwrap(); // substitute name offset
    out.write_u16::<LittleEndian>(subst.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap(); // print name offset
    out.write_u16::<LittleEndian>(print.len() as u16).unwrap();
    out.write_u32::<LittleEndian>(flags).unwrap();
    out.extend_from_slice(&print);
    out.extend_from_slice(&subst);

    Ok(out)
}

fn decode_symlink(data: &[u8], data_length: usize) -> Result<ReparseBuffer> {
    const FIXED: usize = REPARSE_HEADER_SIZE + 12;
    if data.len() < FIXED || data_length < 12 {
        return Err(NtfsLinkError::MalformedBuffer(
            "symlink buffer shorter than its fixed fields".to_string(),
        ));
    }

    let mut cursor = Cursor::new(&data[REPARSE_HEADER_SIZE..FIXED]);
    let subst_offset = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let subst_length = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let print_offset = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let print_length = cursor.read_u16::<LittleEndian>().unwrap() as usize;
    let flags = cursor.read_u32::<LittleEndian>().unwrap();

    let path_buffer = &data[FIXED..];
    let substitute_name = utf16_string(name_slice(path_buffer, subst_offset, subst_length)?);
    let print_name = utf16_string(name_slice(path_buffer, print_offset, print_length)?);

    Ok(ReparseBuffer::SymbolicLink {
        substitute_name,
        print_name,
        flags,
    })
}

// ============================================================================
// Generic / GUID-Tagged
// ============================================================================

fn encode_generic(tag: u32, guid: &Option<ReparseGuid>, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_REPARSE_DATA {
        return Err(NtfsLinkError::BufferTooLarge {
            limit: MAX_REPARSE_DATA,
            got: payload.len(),
        });
    }
    // The GUID qualifies third-party tags only; Microsoft tags never carry one
    match (is_microsoft_tag(tag), guid) {
        (false, None) => {
            return Err(NtfsLinkError::InvalidArgument(format!(
                "third-party reparse tag 0x{:08X} requires a GUID",
                tag
            )))
        }
        (true, Some(_)) => {
            return Err(NtfsLinkError::InvalidArgument(format!(
                "Microsoft reparse tag 0x{:08X} does not take a GUID",
                tag
            )))
        }
        _ => {}
    }

    let header = if guid.is_some() {
        REPARSE_GUID_HEADER_SIZE
    } else {
        REPARSE_HEADER_SIZE
    };
    check_total_size(header + payload.len())?;

    let mut out = Vec::with_capacity(header + payload.len());
    out.write_u32::<LittleEndian>(tag).unwrap();
    out.write_u16::<LittleEndian>(payload.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    if let Some(guid) = guid {
        guid.write_to(&mut out);
    }
    out.extend_from_slice(payload);

    Ok(out)
}

fn decode_generic(tag: u32, data: &[u8], data_length: usize) -> Result<ReparseBuffer> {
    let (guid, payload_start) = if is_microsoft_tag(tag) {
        (None, REPARSE_HEADER_SIZE)
    } else {
        if data.len() < REPARSE_GUID_HEADER_SIZE {
            return Err(NtfsLinkError::MalformedBuffer(
                "GUID reparse buffer shorter than its header".to_string(),
            ));
        }
        (
            ReparseGuid::from_bytes(&data[REPARSE_HEADER_SIZE..REPARSE_GUID_HEADER_SIZE]),
            REPARSE_GUID_HEADER_SIZE,
        )
    };

    if payload_start + data_length > data.len() {
        return Err(NtfsLinkError::MalformedBuffer(format!(
            "declared data length {} exceeds {}-byte buffer",
            data_length,
            data.len()
        )));
    }

    Ok(ReparseBuffer::Generic {
        tag,
        guid,
        data: data[payload_start..payload_start + data_length].to_vec(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_point_round_trip() {
        let original = ReparseBuffer::MountPoint {
            substitute_name: "\\??\\C:\\Program Files".to_string(),
            print_name: "C:\\Program Files".to_string(),
        };
        let encoded = original.encode().unwrap();
        assert_eq!(ReparseBuffer::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn mount_point_classic_form_when_print_empty() {
        // With an empty print name the wire bytes must match the classic
        // mount-point set buffer: 4-byte dataLength = targetLen + 12,
        // target-max-length = targetLen + 2, trailing reserved word zero.
        let target = "\\??\\C:\\target";
        let encoded = ReparseBuffer::mount_point(target, "").encode().unwrap();

        let target_len = target.encode_utf16().count() * 2;
        let data_length = u32::from_le_bytes(encoded[4..8].try_into().unwrap());
        assert_eq!(data_length as usize, target_len + 12);

        let stored_target_len = u16::from_le_bytes(encoded[10..12].try_into().unwrap());
        assert_eq!(stored_target_len as usize, target_len);
        let target_max_len = u16::from_le_bytes(encoded[12..14].try_into().unwrap());
        assert_eq!(target_max_len as usize, target_len + 2);
        assert_eq!(&encoded[14..16], &[0, 0]);

        assert_eq!(encoded.len(), REPARSE_HEADER_SIZE + data_length as usize);
    }

    #[test]
    fn symlink_round_trip() {
        let original = ReparseBuffer::SymbolicLink {
            substitute_name: "\\??\\C:\\tools".to_string(),
            print_name: "C:\\tools".to_string(),
            flags: 0,
        };
        let encoded = original.encode().unwrap();
        assert_eq!(ReparseBuffer::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn relative_symlink_keeps_flags() {
        let original = ReparseBuffer::SymbolicLink {
            substitute_name: "..\\shared".to_string(),
            print_name: "..\\shared".to_string(),
            flags: SYMLINK_FLAG_RELATIVE,
        };
        let encoded = original.encode().unwrap();
        match ReparseBuffer::decode(&encoded).unwrap() {
            ReparseBuffer::SymbolicLink { flags, .. } => {
                assert_eq!(flags, SYMLINK_FLAG_RELATIVE)
            }
            other => panic!("decoded to {:?}", other),
        }
    }

    #[test]
    fn generic_guid_round_trip() {
        let original = ReparseBuffer::Generic {
            tag: 0x0000_9001,
            guid: Some(ReparseGuid {
                data1: 0xDEADBEEF,
                data2: 0x1234,
                data3: 0x5678,
                data4: [1, 2, 3, 4, 5, 6, 7, 8],
            }),
            data: vec![0xAA; 64],
        };
        let encoded = original.encode().unwrap();
        assert_eq!(ReparseBuffer::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn unknown_microsoft_tag_decodes_as_generic() {
        let original = ReparseBuffer::Generic {
            tag: IO_REPARSE_TAG_HSM,
            guid: None,
            data: vec![1, 2, 3, 4],
        };
        let encoded = original.encode().unwrap();
        assert_eq!(ReparseBuffer::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn third_party_tag_requires_guid() {
        let buffer = ReparseBuffer::Generic {
            tag: 0x0000_9001,
            guid: None,
            data: vec![0u8; 4],
        };
        assert!(matches!(
            buffer.encode(),
            Err(NtfsLinkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn oversized_payload_rejected() {
        let buffer = ReparseBuffer::Generic {
            tag: IO_REPARSE_TAG_HSM,
            guid: None,
            data: vec![0u8; MAX_REPARSE_DATA + 1],
        };
        assert!(matches!(
            buffer.encode(),
            Err(NtfsLinkError::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn truncated_name_fields_rejected() {
        let mut encoded = ReparseBuffer::mount_point("\\??\\C:\\x", "")
            .encode()
            .unwrap();
        // Declare a substitute name longer than the path buffer actually is
        encoded[10..12].copy_from_slice(&0x4000u16.to_le_bytes());
        assert!(matches!(
            ReparseBuffer::decode(&encoded),
            Err(NtfsLinkError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(matches!(
            ReparseBuffer::decode(&[0u8; 4]),
            Err(NtfsLinkError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn guid_display_is_canonical() {
        let guid = ReparseGuid {
            data1: 0x00112233,
            data2: 0x4455,
            data3: 0x6677,
            data4: [0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        };
        assert_eq!(guid.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
    }
}
