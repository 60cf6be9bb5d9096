//! Junction lifecycle, end to end against a real NTFS volume.
//!
//! These tests mutate the filesystem inside a temporary directory and need an
//! NTFS volume plus the rights to set reparse points (typically an elevated
//! shell, or a developer-mode machine).

#![cfg(windows)]

use ntfslink::{
    create_junction, delete_junction, delete_junction_record, is_junction, read_junction,
    read_reparse_point, NtfsLinkError, ReparseBuffer,
};
use tempfile::TempDir;

fn path_str(path: &std::path::Path) -> String {
    path.to_str().unwrap().to_string()
}

#[test]
fn create_inspect_read_delete() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("target");
    std::fs::create_dir(&target).unwrap();
    let link = path_str(&root.path().join("j"));
    let target = path_str(&target);

    create_junction(&link, &target).unwrap();

    assert!(is_junction(&link));
    // Inspection is a pure query; asking again changes nothing
    assert!(is_junction(&link));

    assert_eq!(read_junction(&link).unwrap(), target);

    match read_reparse_point(&link).unwrap() {
        ReparseBuffer::MountPoint {
            substitute_name, ..
        } => assert_eq!(substitute_name, format!("\\??\\{}", target)),
        other => panic!("unexpected buffer {:?}", other),
    }

    delete_junction(&link).unwrap();
    assert!(!is_junction(&link));
    assert!(!std::path::Path::new(&link).exists());
}

#[test]
fn create_with_missing_target_leaves_nothing_behind() {
    let root = TempDir::new().unwrap();
    let link = root.path().join("j");
    let missing = root.path().join("no-such-dir");

    let result = create_junction(path_str(&link).as_str(), path_str(&missing).as_str());
    assert!(matches!(result, Err(NtfsLinkError::InvalidTarget(_))));
    assert!(!link.exists());
}

#[test]
fn create_with_file_target_is_rejected() {
    let root = TempDir::new().unwrap();
    let file_target = root.path().join("file.txt");
    std::fs::write(&file_target, b"not a directory").unwrap();
    let link = root.path().join("j");

    let result = create_junction(path_str(&link).as_str(), path_str(&file_target).as_str());
    assert!(matches!(result, Err(NtfsLinkError::TargetNotDirectory(_))));
    assert!(!link.exists());
}

#[test]
fn delete_record_on_plain_directory_is_invalid() {
    let root = TempDir::new().unwrap();
    let plain = root.path().join("plain");
    std::fs::create_dir(&plain).unwrap();
    let plain = path_str(&plain);

    let result = delete_junction_record(&plain);
    assert!(matches!(result, Err(NtfsLinkError::NotAJunction(_))));

    // Untouched: still a plain directory
    assert!(std::path::Path::new(&plain).is_dir());
    assert!(!is_junction(&plain));
}

#[test]
fn delete_record_leaves_plain_empty_directory() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("target");
    std::fs::create_dir(&target).unwrap();
    let link = path_str(&root.path().join("j"));

    create_junction(&link, path_str(&target).as_str()).unwrap();
    delete_junction_record(&link).unwrap();

    assert!(!is_junction(&link));
    assert!(std::path::Path::new(&link).is_dir());
    assert_eq!(std::fs::read_dir(&link).unwrap().count(), 0);

    std::fs::remove_dir(&link).unwrap();
}

#[test]
fn is_junction_false_for_missing_and_file_paths() {
    let root = TempDir::new().unwrap();
    assert!(!is_junction(path_str(&root.path().join("absent")).as_str()));

    let file = root.path().join("f.txt");
    std::fs::write(&file, b"x").unwrap();
    assert!(!is_junction(path_str(&file).as_str()));
}
