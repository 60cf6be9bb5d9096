//! Hard-link resolution
//!
//! Every hard link of a file is one $FILE_NAME attribute in its MFT record.
//! The resolver walks each attribute's parent-directory chain up to the
//! volume root to rebuild the full path, one record fetch per level.

use crate::error::{NtfsLinkError, Result};
use crate::mft::record::{MftRecord, RecordSource};
use crate::mft::structs::{FileNameAttribute, FilenameNamespace, ROOT_FILE_REFERENCE};
use serde::Serialize;

/// Hard ceiling on parent-walk depth. Real directory trees sit far below
/// this; a chain that reaches it is cyclic or corrupt.
pub const MAX_RESOLVE_DEPTH: usize = 128;

// ============================================================================
// Resolved Path
// ============================================================================

/// Path components in root-to-leaf order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub components: Vec<String>,
}

impl ResolvedPath {
    /// Number of components, root child first
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Render with a drive prefix, e.g. `C:\dir\file.txt`
    pub fn with_drive(&self, drive_letter: char) -> String {
        format!("{}:\\{}", drive_letter, self)
    }
}

impl std::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.components.join("\\"))
    }
}

// ============================================================================
// File Name Resolution
// ============================================================================

/// Pick the record's own link name: the first $FILE_NAME whose namespace is a
/// real link name (Win32, POSIX, or combined), skipping pure DOS aliases.
fn link_name_of(record: &MftRecord) -> Result<FileNameAttribute> {
    for attribute in record.attributes() {
        if !attribute.is_file_name() {
            continue;
        }
        let value = attribute.resident_value().ok_or_else(|| {
            NtfsLinkError::CorruptRecord(record.frn, "unreadable $FILE_NAME attribute".to_string())
        })?;
        let parsed = FileNameAttribute::from_bytes(value).ok_or_else(|| {
            NtfsLinkError::CorruptRecord(record.frn, "malformed $FILE_NAME attribute".to_string())
        })?;
        if parsed.namespace.is_link_name() {
            return Ok(parsed);
        }
    }
    Err(NtfsLinkError::CorruptRecord(
        record.frn,
        "no usable $FILE_NAME attribute".to_string(),
    ))
}

/// Resolve one $FILE_NAME attribute to a full path.
///
/// Accumulates leaf-first, fetching each parent record in turn, and stops at
/// the volume root (reference 5). A pure DOS alias is a leaf: its name is
/// taken but its parent chain is not expanded. The walk is iterative and
/// capped at `MAX_RESOLVE_DEPTH` levels so a cyclic parent chain on a corrupt
/// volume fails instead of spinning.
pub fn resolve_full_path<S: RecordSource>(
    source: &S,
    attribute: &FileNameAttribute,
) -> Result<ResolvedPath> {
    let mut components = vec![attribute.name.clone()];
    let mut parent = attribute.parent_record_number();
    let mut namespace = attribute.namespace;

    for _depth in 0..MAX_RESOLVE_DEPTH {
        if parent == ROOT_FILE_REFERENCE || namespace == FilenameNamespace::Dos {
            components.reverse();
            return Ok(ResolvedPath { components });
        }

        let record = source.read_record(parent)?;
        let parent_name = link_name_of(&record)?;
        components.push(parent_name.name.clone());
        parent = parent_name.parent_record_number();
        namespace = parent_name.namespace;
    }

    Err(NtfsLinkError::ResolveTooDeep(MAX_RESOLVE_DEPTH))
}

// ============================================================================
// Hard Link Enumeration
// ============================================================================

/// One resolved hard link with the timestamps its $FILE_NAME carries
#[derive(Debug, Clone, Serialize)]
pub struct LinkEntry {
    pub path: ResolvedPath,
    pub creation_time: u64,
    pub modification_time: u64,
}

/// The complete set of resolved link paths for one file
#[derive(Debug, Clone, Serialize)]
pub struct LinkSet {
    pub file_reference: u64,
    pub link_count: u16,
    pub links: Vec<LinkEntry>,
}

/// Enumerate every hard-link name of the file behind `file_reference`.
///
/// The record's own link count bounds the collection; each collected
/// $FILE_NAME (Win32, POSIX or combined namespace) is resolved to a full path
/// independently. Collecting fewer names than the header's link count is an
/// inconsistency and is reported, not papered over.
pub fn enumerate_links<S: RecordSource>(source: &S, file_reference: u64) -> Result<LinkSet> {
    let record = source.read_record(file_reference)?;
    let link_count = record.hard_link_count();

    let mut names: Vec<FileNameAttribute> = Vec::with_capacity(link_count as usize);
    for attribute in record.attributes() {
        if names.len() >= link_count as usize {
            break;
        }
        if !attribute.is_file_name() {
            continue;
        }
        let value = attribute.resident_value().ok_or_else(|| {
            NtfsLinkError::CorruptRecord(record.frn, "unreadable $FILE_NAME attribute".to_string())
        })?;
        let parsed = FileNameAttribute::from_bytes(value).ok_or_else(|| {
            NtfsLinkError::CorruptRecord(record.frn, "malformed $FILE_NAME attribute".to_string())
        })?;
        if parsed.namespace.is_link_name() {
            names.push(parsed);
        }
    }

    if names.len() < link_count as usize {
        return Err(NtfsLinkError::IncompleteLinkSet {
            expected: link_count,
            found: names.len(),
        });
    }

    let links = names
        .iter()
        .map(|name| {
            resolve_full_path(source, name).map(|path| LinkEntry {
                path,
                creation_time: name.creation_time,
                modification_time: name.modification_time,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LinkSet {
        file_reference: record.frn,
        link_count,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mft::record::synth::{file_name_attribute, record};
    use std::collections::HashMap;

    /// Record store backed by a map of prebuilt record buffers
    struct FakeVolume {
        records: HashMap<u64, Vec<u8>>,
    }

    impl FakeVolume {
        fn new() -> Self {
            Self {
                records: HashMap::new(),
            }
        }

        fn insert(&mut self, frn: u64, data: Vec<u8>) {
            self.records.insert(frn, data);
        }
    }

    impl RecordSource for FakeVolume {
        fn read_record(&self, file_reference: u64) -> Result<MftRecord> {
            let data = self
                .records
                .get(&file_reference)
                .ok_or(NtfsLinkError::RecordNotFound(file_reference))?;
            MftRecord::parse(file_reference, data.clone())
        }
    }

    fn directory(parent: u64, name: &str) -> Vec<u8> {
        record(1, &[file_name_attribute(parent, name, 1)])
    }

    #[test]
    fn resolves_ancestry_to_component_sequence() {
        // 5 (root) <- 10 "a" <- 11 "b", file "x.txt" under 11: 3 components
        let mut volume = FakeVolume::new();
        volume.insert(10, directory(5, "a"));
        volume.insert(11, directory(10, "b"));
        volume.insert(20, record(1, &[file_name_attribute(11, "x.txt", 1)]));

        let set = enumerate_links(&volume, 20).unwrap();
        assert_eq!(set.links.len(), 1);
        assert_eq!(set.links[0].path.components, vec!["a", "b", "x.txt"]);
        assert_eq!(set.links[0].path.depth(), 3);
        assert_eq!(set.links[0].path.with_drive('C'), "C:\\a\\b\\x.txt");
    }

    #[test]
    fn file_directly_under_root() {
        let mut volume = FakeVolume::new();
        volume.insert(20, record(1, &[file_name_attribute(5, "top.txt", 1)]));

        let set = enumerate_links(&volume, 20).unwrap();
        assert_eq!(set.links[0].path.components, vec!["top.txt"]);
    }

    #[test]
    fn cyclic_ancestry_fails_instead_of_hanging() {
        // 10 and 11 are each other's parent
        let mut volume = FakeVolume::new();
        volume.insert(10, directory(11, "ping"));
        volume.insert(11, directory(10, "pong"));
        volume.insert(20, record(1, &[file_name_attribute(10, "trapped.txt", 1)]));

        assert!(matches!(
            enumerate_links(&volume, 20),
            Err(NtfsLinkError::ResolveTooDeep(MAX_RESOLVE_DEPTH))
        ));
    }

    #[test]
    fn three_links_resolve_to_distinct_paths() {
        let mut volume = FakeVolume::new();
        volume.insert(10, directory(5, "A"));
        volume.insert(11, directory(5, "B"));
        volume.insert(12, directory(5, "C"));
        volume.insert(
            20,
            record(
                3,
                &[
                    file_name_attribute(10, "x.txt", 1),
                    file_name_attribute(11, "x.txt", 1),
                    file_name_attribute(12, "x.txt", 1),
                ],
            ),
        );

        let set = enumerate_links(&volume, 20).unwrap();
        assert_eq!(set.link_count, 3);
        let mut rendered: Vec<String> = set.links.iter().map(|l| l.path.to_string()).collect();
        rendered.sort();
        assert_eq!(rendered, vec!["A\\x.txt", "B\\x.txt", "C\\x.txt"]);
    }

    #[test]
    fn dos_alias_skipped_during_collection() {
        let mut volume = FakeVolume::new();
        volume.insert(10, directory(5, "Program Files"));
        volume.insert(
            20,
            record(
                1,
                &[
                    file_name_attribute(10, "PROGRA~1.TXT", 2),
                    file_name_attribute(10, "longer name.txt", 1),
                ],
            ),
        );

        let set = enumerate_links(&volume, 20).unwrap();
        assert_eq!(set.links.len(), 1);
        assert_eq!(
            set.links[0].path.components,
            vec!["Program Files", "longer name.txt"]
        );
    }

    #[test]
    fn short_link_set_is_reported() {
        let mut volume = FakeVolume::new();
        volume.insert(10, directory(5, "A"));
        volume.insert(
            20,
            record(3, &[file_name_attribute(10, "only.txt", 1)]),
        );

        match enumerate_links(&volume, 20) {
            Err(NtfsLinkError::IncompleteLinkSet { expected, found }) => {
                assert_eq!(expected, 3);
                assert_eq!(found, 1);
            }
            other => panic!("expected IncompleteLinkSet, got {:?}", other.map(|s| s.links)),
        }
    }

    #[test]
    fn incomplete_link_set_is_recoverable() {
        let err = NtfsLinkError::IncompleteLinkSet {
            expected: 2,
            found: 1,
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn dos_alias_parent_is_a_leaf_stop() {
        // The parent directory only has a DOS name; its chain is not expanded
        let mut volume = FakeVolume::new();
        volume.insert(10, record(1, &[file_name_attribute(2, "DOSDIR~1", 2)]));
        volume.insert(20, record(1, &[file_name_attribute(10, "file.txt", 1)]));

        let err = enumerate_links(&volume, 20);
        // The parent's only name is a DOS alias, which link_name_of refuses
        assert!(matches!(err, Err(NtfsLinkError::CorruptRecord(10, _))));
    }

    #[test]
    fn dos_leaf_attribute_stops_without_walking() {
        // Resolving a DOS-namespace attribute directly: name taken, chain not walked
        let attr_value_owner = record(1, &[file_name_attribute(77, "SHORT~1.TXT", 2)]);
        let rec = MftRecord::parse(30, attr_value_owner).unwrap();
        let attr = rec.attributes().find(|a| a.is_file_name()).unwrap();
        let parsed = FileNameAttribute::from_bytes(attr.resident_value().unwrap()).unwrap();

        let volume = FakeVolume::new();
        let path = resolve_full_path(&volume, &parsed).unwrap();
        assert_eq!(path.components, vec!["SHORT~1.TXT"]);
    }
}
