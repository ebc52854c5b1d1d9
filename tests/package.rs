// tests/package.rs

//! Package wrap, validate, update and regenerate workflows.

mod common;

use archivist::hash::{hash_bytes, HashAlgorithm};
use archivist::media::{ClassFilter, PreservationProfile};
use archivist::package::{
    package_tree, validate, validate_tree, FileListing, Package, PackageOutcome, PackageScope,
    Problem, LISTING_FILE, METADATA_FILE,
};
use archivist::pipeline::{Pipeline, RunRequest};
use archivist::progress::SilentProgress;
use common::{list_files, test_config, write_file, FakeEncoder, QuietSink};
use std::fs;
use std::path::Path;

fn sample_item(root: &Path) {
    write_file(&root.join("photo_tiff.tiff"), b"tiff bytes");
    write_file(&root.join("sub/notes_pdfa.pdf"), b"pdf bytes");
    write_file(&root.join("metadata.json"), b"{}");
}

#[test]
fn test_wrap_validates_clean() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);

    let package = Package::wrap(&item, HashAlgorithm::Sha256).unwrap();

    assert_eq!(
        list_files(package.root()),
        vec![
            "bag-info.txt",
            "bagit.txt",
            "data/photo_tiff.tiff",
            "data/sub/notes_pdfa.pdf",
            "file-listing.json",
            "manifest-sha256.txt",
            "metadata.json",
        ]
    );
    let manifest = fs::read_to_string(item.join("manifest-sha256.txt")).unwrap();
    assert_eq!(
        manifest,
        format!(
            "{}  photo_tiff.tiff\n{}  sub/notes_pdfa.pdf\n",
            hash_bytes(HashAlgorithm::Sha256, b"tiff bytes"),
            hash_bytes(HashAlgorithm::Sha256, b"pdf bytes")
        )
    );
    let info = fs::read_to_string(item.join("bag-info.txt")).unwrap();
    assert!(info.contains("External-Identifier: item\n"));
    assert!(info.contains("Payload-Oxum: 19.2\n"));
    assert!(info.contains("Checksum-Algorithm: sha256\n"));

    let report = validate(&item);
    assert!(report.is_valid(), "problems: {:?}", report.problems);
    assert_eq!(report.files_checked, 2);
}

#[test]
fn test_wrap_twice_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);

    Package::wrap(&item, HashAlgorithm::Sha256).unwrap();
    let err = Package::wrap(&item, HashAlgorithm::Sha256).unwrap_err();
    assert!(matches!(err, archivist::Error::AlreadyPackaged(_)));
}

#[test]
fn test_tampered_file_is_one_mismatch() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);
    Package::wrap(&item, HashAlgorithm::Sha256).unwrap();

    fs::write(item.join("data/photo_tiff.tiff"), b"bit rot").unwrap();
    let report = validate(&item);

    assert!(!report.is_valid());
    assert_eq!(report.problems.len(), 1);
    assert_eq!(report.mismatches(), 1);
    match &report.problems[0] {
        Problem::ChecksumMismatch {
            path,
            expected,
            found,
            ..
        } => {
            assert_eq!(path, "photo_tiff.tiff");
            assert_eq!(expected, &hash_bytes(HashAlgorithm::Sha256, b"tiff bytes"));
            assert_eq!(found, &hash_bytes(HashAlgorithm::Sha256, b"bit rot"));
        }
        other => panic!("unexpected problem: {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_unlistable_entry_does_not_hide_other_problems() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    write_file(&item.join("a.txt"), b"alpha");
    write_file(&item.join("b.txt"), b"beta");
    Package::wrap(&item, HashAlgorithm::Sha256).unwrap();

    fs::write(item.join("data/a.txt"), b"tampered").unwrap();
    fs::write(item.join("data").join(OsStr::from_bytes(b"bad\xff.txt")), b"x").unwrap();
    let report = validate(&item);

    assert_eq!(report.files_checked, 2);
    assert_eq!(report.problems.len(), 2, "problems: {:?}", report.problems);
    assert_eq!(report.mismatches(), 1);
    assert!(report.problems.iter().any(|p| matches!(
        p,
        Problem::Unreadable { path, .. } if path == "bad\u{FFFD}.txt"
    )));
    assert!(report.problems.iter().any(|p| matches!(
        p,
        Problem::ChecksumMismatch { path, .. } if path == "a.txt"
    )));
}

#[test]
fn test_missing_and_untracked_files() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);
    Package::wrap(&item, HashAlgorithm::Sha256).unwrap();

    fs::remove_file(item.join("data/sub/notes_pdfa.pdf")).unwrap();
    fs::write(item.join("data/stray.txt"), b"stray").unwrap();
    let report = validate(&item);

    assert_eq!(report.problems.len(), 2);
    assert!(report.problems.contains(&Problem::MissingFile {
        path: "sub/notes_pdfa.pdf".to_string()
    }));
    assert!(report.problems.contains(&Problem::UntrackedFile {
        path: "stray.txt".to_string()
    }));
}

#[test]
fn test_update_appends_only_new_entries() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);
    let package = Package::wrap(&item, HashAlgorithm::Sha256).unwrap();
    let before = fs::read(item.join("manifest-sha256.txt")).unwrap();

    write_file(&item.join("data/later/clip_ffv1.mkv"), b"video bytes");
    let added = package.update(HashAlgorithm::Sha256).unwrap();

    assert_eq!(added, vec!["later/clip_ffv1.mkv"]);
    let after = fs::read(item.join("manifest-sha256.txt")).unwrap();
    assert!(after.starts_with(&before));
    assert_eq!(
        String::from_utf8(after[before.len()..].to_vec()).unwrap(),
        format!(
            "{}  later/clip_ffv1.mkv\n",
            hash_bytes(HashAlgorithm::Sha256, b"video bytes")
        )
    );

    let info = fs::read_to_string(item.join("bag-info.txt")).unwrap();
    assert!(info.contains("--- Update "));
    assert!(info.contains("Added: later/clip_ffv1.mkv\n"));
    assert!(info.contains("Payload-File-Count: 3\n"));
    assert!(validate(&item).is_valid());

    // Nothing new: manifest untouched
    assert!(package.update(HashAlgorithm::Sha256).unwrap().is_empty());
    assert_eq!(fs::read(item.join("manifest-sha256.txt")).unwrap(), after);
}

#[test]
fn test_update_paths_appends_only_untracked_paths() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);
    let package = Package::wrap(&item, HashAlgorithm::Sha256).unwrap();
    let before = fs::read_to_string(item.join("manifest-sha256.txt")).unwrap();
    write_file(&item.join("data/new.txt"), b"new");

    let added = package
        .update_paths(&["photo_tiff.tiff".to_string(), "new.txt".to_string()])
        .unwrap();

    assert_eq!(added, vec!["new.txt"]);
    let after = fs::read_to_string(item.join("manifest-sha256.txt")).unwrap();
    assert_eq!(after.lines().count(), before.lines().count() + 1);
    assert_eq!(
        after,
        format!(
            "{}{}  new.txt\n",
            before,
            hash_bytes(HashAlgorithm::Sha256, b"new")
        )
    );
    assert!(validate(&item).is_valid());

    // Paths outside the payload, or not there at all, are refused
    for bad in ["../escape.txt", "ghost.txt"] {
        let err = package.update_paths(&[bad.to_string()]).unwrap_err();
        assert!(matches!(err, archivist::Error::InvalidPath(_)), "{bad}: {err}");
    }
    assert_eq!(fs::read_to_string(item.join("manifest-sha256.txt")).unwrap(), after);
}

#[test]
fn test_item_metadata_merged_and_listed() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    write_file(&item.join("metadata.json"), br#"{"title": "Trip"}"#);
    write_file(&item.join("day1/metadata.json"), br#"{"weather": "rain"}"#);
    write_file(&item.join("day1/a_tiff.tiff"), b"aaaa");

    let package = Package::wrap(&item, HashAlgorithm::Sha256).unwrap();

    assert_eq!(list_files(&item.join("data")), vec!["day1/a_tiff.tiff"]);
    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(item.join(METADATA_FILE)).unwrap()).unwrap();
    assert_eq!(
        metadata,
        serde_json::json!({"title": "Trip", "day1": {"weather": "rain"}})
    );
    let listing = FileListing::read(&item.join(LISTING_FILE)).unwrap();
    assert_eq!(listing.item, "item");
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].name, "day1/a_tiff.tiff");
    assert_eq!(listing.files[0].size, 4);

    // Metadata arriving later is folded in on update, not tracked
    write_file(&item.join("data/day2/metadata.json"), br#"{"weather": "sun"}"#);
    write_file(&item.join("data/day2/b_tiff.tiff"), b"bb");
    let added = package.update(HashAlgorithm::Sha256).unwrap();

    assert_eq!(added, vec!["day2/b_tiff.tiff"]);
    assert!(!item.join("data/day2/metadata.json").exists());
    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(item.join(METADATA_FILE)).unwrap()).unwrap();
    assert_eq!(metadata["day2"], serde_json::json!({"weather": "sun"}));
    let listing = FileListing::read(&item.join(LISTING_FILE)).unwrap();
    assert_eq!(listing.files.len(), 2);
    assert!(validate(&item).is_valid());
}

#[test]
fn test_regenerate_is_byte_identical_for_unchanged_tree() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);
    let package = Package::wrap(&item, HashAlgorithm::Sha256).unwrap();
    let before = fs::read(item.join("manifest-sha256.txt")).unwrap();

    package.regenerate(HashAlgorithm::Sha256).unwrap();

    assert_eq!(fs::read(item.join("manifest-sha256.txt")).unwrap(), before);
    assert!(validate(&item).is_valid());
}

#[test]
fn test_legacy_md5_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let item = temp.path().join("item");
    sample_item(&item);

    let package = Package::wrap(&item, HashAlgorithm::Md5).unwrap();
    assert!(item.join("manifest-md5.txt").is_file());
    assert_eq!(package.primary_algorithm(), Some(HashAlgorithm::Md5));

    // New entries go to the existing manifest, whatever the requested default
    write_file(&item.join("data/extra.txt"), b"extra");
    package.update(HashAlgorithm::Sha256).unwrap();
    assert!(!item.join("manifest-sha256.txt").exists());

    let report = validate(&item);
    assert!(report.is_valid(), "problems: {:?}", report.problems);
    assert_eq!(report.files_checked, 3);
}

#[test]
fn test_package_tree_wraps_items_then_updates() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("AIP_collection");
    write_file(&root.join("trip/a_tiff.tiff"), b"a");
    write_file(&root.join("party/b_tiff.tiff"), b"b");
    write_file(&root.join("loose_pdfa.pdf"), b"loose");

    let report = package_tree(
        &root,
        PackageScope::Items,
        HashAlgorithm::Sha256,
        false,
        &SilentProgress::new(),
    )
    .unwrap();
    assert_eq!(report.wrapped(), 2);
    assert!(report.errors.is_empty());
    assert!(root.join("loose_pdfa.pdf").is_file());

    write_file(&root.join("trip/data/c_tiff.tiff"), b"c");
    let report = package_tree(
        &root,
        PackageScope::Items,
        HashAlgorithm::Sha256,
        false,
        &SilentProgress::new(),
    )
    .unwrap();
    assert_eq!(report.updated(), 2);
    let trip = report
        .outcomes
        .iter()
        .find(|(path, _)| path.ends_with("trip"))
        .map(|(_, outcome)| outcome.clone())
        .unwrap();
    assert_eq!(
        trip,
        PackageOutcome::Updated {
            added: vec!["c_tiff.tiff".to_string()]
        }
    );

    let reports = validate_tree(&root);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_valid()));
}

#[test]
fn test_validate_tree_reports_each_item() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    sample_item(&root.join("good"));
    sample_item(&root.join("bad"));
    write_file(&root.join("plain/file.txt"), b"not wrapped");
    Package::wrap(&root.join("good"), HashAlgorithm::Sha256).unwrap();
    Package::wrap(&root.join("bad"), HashAlgorithm::Sha256).unwrap();
    fs::write(root.join("bad/data/photo_tiff.tiff"), b"changed").unwrap();

    let reports = validate_tree(root);

    assert_eq!(reports.len(), 3);
    let by_name = |name: &str| {
        reports
            .iter()
            .find(|r| r.package.ends_with(name))
            .unwrap()
    };
    assert!(by_name("good").is_valid());
    assert_eq!(by_name("bad").mismatches(), 1);
    assert!(by_name("plain").problems.contains(&Problem::MissingTagFile));

    let single = validate_tree(&root.join("good"));
    assert_eq!(single.len(), 1);
    assert!(single[0].is_valid());
}

#[test]
fn test_process_with_packaging_and_rerun() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("SIP_album");
    let dest = temp.path().join("AIP_album");
    write_file(&source.join("trip/a.jpg"), b"a");

    let config = test_config();
    let encoder = FakeEncoder::new();
    let pipeline = Pipeline::new(&config, &encoder);
    let request = RunRequest {
        source: source.clone(),
        destination: None,
        profile: PreservationProfile::Archival,
        filter: ClassFilter::all(),
        package: Some(PackageScope::Items),
    };

    let summary = pipeline.run(&request, &QuietSink).unwrap();
    assert_eq!(summary.destination, dest);
    assert_eq!(summary.packaging.as_ref().unwrap().wrapped(), 1);
    assert!(dest.join("trip/data/a_tiff.tiff").is_file());

    // New material lands inside the payload of the existing package
    write_file(&source.join("trip/b.jpg"), b"b");
    let summary = pipeline.run(&request, &QuietSink).unwrap();

    assert_eq!(summary.mirror.copied(), 1);
    assert_eq!(summary.conversion.converted(), 1);
    assert_eq!(summary.packaging.as_ref().unwrap().updated(), 1);
    assert_eq!(
        list_files(&dest.join("trip/data")),
        vec!["a_tiff.tiff", "b_tiff.tiff"]
    );
    let report = validate(&dest.join("trip"));
    assert!(report.is_valid(), "problems: {:?}", report.problems);
    assert_eq!(report.files_checked, 2);
}
