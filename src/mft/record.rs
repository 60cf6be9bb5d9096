//! MFT record fetching and attribute iteration
//!
//! Records are fetched one at a time through FSCTL_GET_NTFS_FILE_RECORD and
//! never cached. `AttributeCursor` walks a record's embedded attribute list
//! with every on-disk length validated against the buffer bound before use.

use crate::error::{NtfsLinkError, Result};
use crate::mft::structs::*;
use crate::winapi::{device_io_control, SafeHandle, FSCTL_GET_NTFS_FILE_RECORD};

/// Lower 48 bits of a file reference number address the record; the upper 16
/// carry the record's sequence number.
pub const RECORD_NUMBER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

// ============================================================================
// MFT Record
// ============================================================================

/// One file record segment, owned, with its parsed header
#[derive(Debug, Clone)]
pub struct MftRecord {
    pub frn: u64,
    pub header: MftRecordHeader,
    data: Vec<u8>,
}

impl MftRecord {
    /// Validate the signature and header of a raw record buffer
    pub fn parse(frn: u64, data: Vec<u8>) -> Result<Self> {
        let header = MftRecordHeader::from_bytes(&data).ok_or_else(|| {
            NtfsLinkError::CorruptRecord(frn, "record shorter than its header".to_string())
        })?;

        if !header.is_valid() {
            return Err(NtfsLinkError::CorruptRecord(
                frn,
                format!("bad signature 0x{:08X}", header.signature),
            ));
        }

        Ok(Self { frn, header, data })
    }

    pub fn hard_link_count(&self) -> u16 {
        self.header.hard_link_count
    }

    pub fn is_directory(&self) -> bool {
        self.header.is_directory()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Iterate the attribute list embedded in this record
    pub fn attributes(&self) -> AttributeCursor<'_> {
        let bound = (self.header.used_size as usize).min(self.data.len());
        AttributeCursor {
            data: &self.data,
            offset: self.header.first_attribute_offset as usize,
            bound,
            used_size: self.header.used_size as usize,
            done: false,
        }
    }
}

// ============================================================================
// Record Source
// ============================================================================

/// Anything that can produce the MFT record for a file reference number.
///
/// The resolvers in `mft::links` are written against this seam, so they work
/// with a live volume reader or any other record store.
pub trait RecordSource {
    fn read_record(&self, file_reference: u64) -> Result<MftRecord>;
}

/// Fetches records from an open volume handle via FSCTL_GET_NTFS_FILE_RECORD
pub struct MftRecordReader<'a> {
    volume: &'a SafeHandle,
    record_size: u32,
}

impl<'a> MftRecordReader<'a> {
    /// `record_size` is the volume's file record segment size (1024 on
    /// default-formatted volumes; see `VolumeContext::file_record_size`).
    pub fn new(volume: &'a SafeHandle, record_size: u32) -> Self {
        Self {
            volume,
            record_size,
        }
    }
}

impl RecordSource for MftRecordReader<'_> {
    fn read_record(&self, file_reference: u64) -> Result<MftRecord> {
        let record_number = file_reference & RECORD_NUMBER_MASK;

        // Input: the 8-byte reference number.
        // Output: 8-byte returned FRN + 4-byte record length + record data.
        let input = file_reference.to_le_bytes();
        let mut buffer = vec![0u8; 12 + self.record_size as usize];

        let bytes_returned = device_io_control(
            self.volume,
            FSCTL_GET_NTFS_FILE_RECORD,
            Some(&input),
            Some(&mut buffer),
        )?;

        if bytes_returned < 12 {
            return Err(NtfsLinkError::CorruptRecord(
                record_number,
                format!("{}-byte response", bytes_returned),
            ));
        }

        // The call returns the nearest in-use record at or below the request;
        // a different number back means the requested record is not in use.
        let returned_frn = u64::from_le_bytes(buffer[0..8].try_into().unwrap());
        if returned_frn & RECORD_NUMBER_MASK != record_number {
            return Err(NtfsLinkError::RecordNotFound(record_number));
        }

        let record_length = u32::from_le_bytes(buffer[8..12].try_into().unwrap()) as usize;
        if record_length == 0 || 12 + record_length > buffer.len() {
            return Err(NtfsLinkError::CorruptRecord(
                record_number,
                format!("invalid record length {}", record_length),
            ));
        }

        MftRecord::parse(record_number, buffer[12..12 + record_length].to_vec())
    }
}

// ============================================================================
// Attribute Cursor
// ============================================================================

/// One attribute as positioned inside a record
#[derive(Debug, Clone)]
pub struct Attribute<'a> {
    pub header: AttributeHeader,
    pub offset: usize,
    data: &'a [u8],
}

impl<'a> Attribute<'a> {
    pub fn attribute_type(&self) -> Option<AttributeType> {
        AttributeType::from_u32(self.header.attribute_type)
    }

    pub fn is_file_name(&self) -> bool {
        self.header.attribute_type == AttributeType::FileName as u32
    }

    /// The resident value bytes, when the attribute is resident and its
    /// declared value range lies inside the attribute
    pub fn resident_value(&self) -> Option<&'a [u8]> {
        let header = ResidentAttributeHeader::from_bytes(self.data)?;
        let start = header.value_offset as usize;
        let end = start.checked_add(header.value_length as usize)?;
        if end > self.data.len() {
            return None;
        }
        Some(&self.data[start..end])
    }
}

/// Bounds-checked walk over one record's attribute list.
///
/// The sequence is finite and tied to its record: it ends at the end-of-list
/// marker, at any type above the highest known attribute type, at a zero or
/// oversized resident length, and at any advance that would leave the
/// record's used bytes. A corrupt length field can cut the walk short but
/// can never push a read out of bounds.
pub struct AttributeCursor<'a> {
    data: &'a [u8],
    offset: usize,
    bound: usize,
    used_size: usize,
    done: bool,
}

impl<'a> Iterator for AttributeCursor<'a> {
    type Item = Attribute<'a>;

    fn next(&mut self) -> Option<Attribute<'a>> {
        if self.done || self.offset + 16 > self.bound {
            self.done = true;
            return None;
        }

        let header = match AttributeHeader::from_bytes(&self.data[self.offset..self.bound]) {
            Some(h) => h,
            None => {
                self.done = true;
                return None;
            }
        };

        if header.attribute_type == ATTRIBUTE_END_MARKER
            || header.attribute_type > HIGHEST_ATTRIBUTE_TYPE
        {
            self.done = true;
            return None;
        }

        let declared = header.length as usize;
        let span = if header.non_resident {
            self.offset + NONRESIDENT_HEADER_SIZE
        } else if declared > 0 {
            self.offset + declared
        } else {
            self.bound
        };
        let end = span.min(self.bound);

        let attribute = Attribute {
            header: header.clone(),
            offset: self.offset,
            data: &self.data[self.offset..end],
        };

        // Advance, or end the walk when the declared length cannot be trusted
        if header.non_resident {
            self.offset += NONRESIDENT_HEADER_SIZE;
        } else if declared > 0 && declared < self.used_size {
            self.offset += declared;
        } else {
            self.done = true;
        }

        Some(attribute)
    }
}

// ============================================================================
// Synthetic Records (test support)
// ============================================================================

#[cfg(test)]
pub(crate) mod synth {
    use crate::mft::structs::{AttributeType, ATTRIBUTE_END_MARKER, MFT_RECORD_IN_USE};

    pub const RECORD_SIZE: usize = 1024;
    const HEADER_SIZE: usize = 56;

    /// Assemble a resident $FILE_NAME attribute
    pub fn file_name_attribute(parent: u64, name: &str, namespace: u8) -> Vec<u8> {
        let name_units: Vec<u16> = name.encode_utf16().collect();
        let value_len = 66 + name_units.len() * 2;
        let total = (24 + value_len + 7) & !7;

        let mut attr = vec![0u8; total];
        attr[0..4].copy_from_slice(&(AttributeType::FileName as u32).to_le_bytes());
        attr[4..8].copy_from_slice(&(total as u32).to_le_bytes());
        // resident, unnamed
        attr[16..20].copy_from_slice(&(value_len as u32).to_le_bytes());
        attr[20..22].copy_from_slice(&24u16.to_le_bytes());

        let value = &mut attr[24..];
        value[0..8].copy_from_slice(&parent.to_le_bytes());
        value[64] = name_units.len() as u8;
        value[65] = namespace;
        for (i, unit) in name_units.iter().enumerate() {
            value[66 + i * 2..68 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        attr
    }

    /// Assemble a nonresident attribute header of the given type
    pub fn nonresident_attribute(attribute_type: u32) -> Vec<u8> {
        let mut attr = vec![0u8; 64];
        attr[0..4].copy_from_slice(&attribute_type.to_le_bytes());
        attr[4..8].copy_from_slice(&64u32.to_le_bytes());
        attr[8] = 1; // nonresident
        attr
    }

    /// Assemble a whole record buffer around a list of attribute blobs
    pub fn record(link_count: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0u8; RECORD_SIZE];
        data[0..4].copy_from_slice(b"FILE");
        data[16..18].copy_from_slice(&1u16.to_le_bytes()); // sequence number
        data[18..20].copy_from_slice(&link_count.to_le_bytes());
        data[20..22].copy_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
        data[22..24].copy_from_slice(&MFT_RECORD_IN_USE.to_le_bytes());

        let mut offset = HEADER_SIZE;
        for attr in attributes {
            data[offset..offset + attr.len()].copy_from_slice(attr);
            offset += attr.len();
        }
        data[offset..offset + 4].copy_from_slice(&ATTRIBUTE_END_MARKER.to_le_bytes());
        offset += 8;

        data[24..28].copy_from_slice(&(offset as u32).to_le_bytes());
        data[28..32].copy_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::synth::*;
    use super::*;

    #[test]
    fn parse_rejects_bad_signature() {
        let mut data = record(1, &[]);
        data[0..4].copy_from_slice(b"BAAD");
        assert!(matches!(
            MftRecord::parse(7, data),
            Err(NtfsLinkError::CorruptRecord(7, _))
        ));
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(MftRecord::parse(7, vec![0u8; 16]).is_err());
    }

    #[test]
    fn cursor_yields_until_end_marker() {
        let data = record(
            1,
            &[
                file_name_attribute(5, "one.txt", 1),
                file_name_attribute(5, "two.txt", 1),
            ],
        );
        let rec = MftRecord::parse(7, data).unwrap();
        let names: Vec<u32> = rec
            .attributes()
            .map(|a| a.header.attribute_type)
            .collect();
        assert_eq!(names, vec![0x30, 0x30]);
    }

    #[test]
    fn cursor_stops_on_zero_length() {
        let mut bad = file_name_attribute(5, "x.txt", 1);
        bad[4..8].copy_from_slice(&0u32.to_le_bytes());
        let data = record(1, &[bad, file_name_attribute(5, "y.txt", 1)]);
        let rec = MftRecord::parse(7, data).unwrap();
        // The zero-length attribute is yielded, then the walk ends
        assert_eq!(rec.attributes().count(), 1);
    }

    #[test]
    fn cursor_stops_on_oversized_length() {
        let mut bad = file_name_attribute(5, "x.txt", 1);
        let oversized = RECORD_SIZE as u32 * 2;
        bad[4..8].copy_from_slice(&oversized.to_le_bytes());
        let data = record(1, &[bad]);
        let rec = MftRecord::parse(7, data).unwrap();
        assert_eq!(rec.attributes().count(), 1);
    }

    #[test]
    fn cursor_stops_above_highest_known_type() {
        let mut odd = file_name_attribute(5, "x.txt", 1);
        odd[0..4].copy_from_slice(&0x200u32.to_le_bytes());
        let data = record(1, &[odd, file_name_attribute(5, "y.txt", 1)]);
        let rec = MftRecord::parse(7, data).unwrap();
        assert_eq!(rec.attributes().count(), 0);
    }

    #[test]
    fn cursor_advances_over_nonresident_header() {
        let data = record(
            1,
            &[
                nonresident_attribute(AttributeType::Data as u32),
                file_name_attribute(5, "z.txt", 1),
            ],
        );
        let rec = MftRecord::parse(7, data).unwrap();
        let types: Vec<u32> = rec
            .attributes()
            .map(|a| a.header.attribute_type)
            .collect();
        assert_eq!(types, vec![0x80, 0x30]);
    }

    #[test]
    fn cursor_never_reads_past_truncated_record() {
        let full = record(1, &[file_name_attribute(5, "deep.txt", 1)]);
        // Truncate mid-attribute but leave used_size claiming more
        let rec = MftRecord::parse(7, full[..60].to_vec()).unwrap();
        assert_eq!(rec.attributes().count(), 0);
    }

    #[test]
    fn resident_value_bounds_checked() {
        let mut attr = file_name_attribute(5, "v.txt", 1);
        // Declare a value length past the end of the attribute
        attr[16..20].copy_from_slice(&2048u32.to_le_bytes());
        let data = record(1, &[attr]);
        let rec = MftRecord::parse(7, data).unwrap();
        let first = rec.attributes().next().unwrap();
        assert!(first.resident_value().is_none());
    }

    #[test]
    fn file_name_value_round_trips_through_cursor() {
        let data = record(2, &[file_name_attribute(42, "hello.rs", 1)]);
        let rec = MftRecord::parse(7, data).unwrap();
        let attr = rec.attributes().find(|a| a.is_file_name()).unwrap();
        let value = attr.resident_value().unwrap();
        let parsed = FileNameAttribute::from_bytes(value).unwrap();
        assert_eq!(parsed.name, "hello.rs");
        assert_eq!(parsed.parent_record_number(), 42);
        assert_eq!(parsed.namespace, FilenameNamespace::Win32);
    }
}
