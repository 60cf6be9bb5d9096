//! Master File Table access
//!
//! - `structs`: on-disk record and attribute structures
//! - `record`: per-record fetch (FSCTL_GET_NTFS_FILE_RECORD) and the
//!   bounds-checked attribute cursor
//! - `links`: $FILE_NAME resolution and hard-link enumeration

pub mod links;
pub mod record;
pub mod structs;

pub use links::{enumerate_links, resolve_full_path, LinkSet, ResolvedPath, MAX_RESOLVE_DEPTH};
pub use record::{Attribute, AttributeCursor, MftRecord, MftRecordReader, RecordSource};
pub use structs::{
    AttributeType, FileNameAttribute, FilenameNamespace, MftRecordHeader, ROOT_FILE_REFERENCE,
};
