use longship_core::formats::{parse_file_list, Announcement, FormatError};
use longship_core::{EntryKind, ScanStatus};

#[test]
fn parses_completed_list_and_normalizes_paths() {
    let body = br#"{"status":40,"files":[
        {"path":"/BepInEx","type":2,"hash":""},
        {"path":"/BepInEx\\plugins\\Mod.dll","type":1,"hash":"D41D8CD98F00B204E9800998ECF8427E"},
        {"path":"/doorstop_libs/link","type":3,"hash":"abc"}
    ]}"#;

    let manifest = parse_file_list(body).unwrap();

    assert_eq!(manifest.status, ScanStatus::Completed);
    assert_eq!(manifest.entries.len(), 3);
    assert_eq!(manifest.entries[0].relative_path, "BepInEx");
    assert_eq!(manifest.entries[0].kind, EntryKind::Directory);
    assert_eq!(manifest.entries[1].relative_path, "BepInEx/plugins/Mod.dll");
    assert_eq!(
        manifest.entries[1].content_hash,
        "d41d8cd98f00b204e9800998ecf8427e"
    );
    assert_eq!(manifest.entries[2].kind, EntryKind::Symlink);
}

#[test]
fn scanning_list_with_null_files_is_empty() {
    let manifest = parse_file_list(br#"{"status":20,"files":null}"#).unwrap();
    assert_eq!(manifest.status, ScanStatus::Scanning);
    assert!(manifest.entries.is_empty());
}

#[test]
fn bom_and_whitespace_are_tolerated() {
    let mut body = vec![0xEF, 0xBB, 0xBF, b'\n', b' '];
    body.extend_from_slice(br#"{"status":10,"files":[]}"#);
    let manifest = parse_file_list(&body).unwrap();
    assert_eq!(manifest.status, ScanStatus::Waiting);
}

#[test]
fn unknown_codes_are_rejected() {
    let err = parse_file_list(br#"{"status":99,"files":[]}"#).unwrap_err();
    assert!(matches!(err, FormatError::Status(_)));

    let err = parse_file_list(br#"{"status":40,"files":[{"path":"a","type":7,"hash":""}]}"#)
        .unwrap_err();
    assert!(matches!(err, FormatError::Entry { .. }));

    assert!(matches!(
        parse_file_list(b"<html>busy</html>").unwrap_err(),
        FormatError::Json(_)
    ));
}

#[test]
fn announcement_fields_default_when_missing() {
    let a = Announcement::parse(br#"{"hash":"h"}"#).unwrap();
    assert_eq!(a.content, "");
    assert_eq!(a.hash, "h");
}
