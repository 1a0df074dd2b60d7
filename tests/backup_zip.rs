#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("facultyd-backup-src");
    let workspace2 = temp_dir("facultyd-backup-dst");
    let out_dir = temp_dir("facultyd-backup-out");

    let data = workspace.join("data");
    std::fs::create_dir_all(&data).expect("data dir");
    let users = data.join("users.json");
    let sessions = data.join("sessions.json");
    std::fs::write(&users, br#"{"admin":{"password":"x"}}"#).expect("write users");
    std::fs::write(&sessions, br#"{"SES0001":{"batch":"A"}}"#).expect("write sessions");
    // Listed but never written: must be skipped.
    let counters = data.join("counters.json");

    let bundle_path = out_dir.join("workspace.facultyd.zip");
    let export = backup::export_workspace_bundle(
        &workspace,
        &[users.clone(), sessions.clone(), counters.clone()],
        &bundle_path,
    )
    .expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.documents, vec!["data/users.json", "data/sessions.json"]);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));
    archive
        .by_name("documents/data/users.json")
        .expect("users entry in bundle");

    let import =
        backup::import_workspace_bundle(&bundle_path, &workspace2, &[]).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(import.restored.len(), 2);

    let restored = std::fs::read(workspace2.join("data").join("sessions.json"))
        .expect("read restored sessions");
    assert_eq!(restored, br#"{"SES0001":{"batch":"A"}}"#);
    assert!(!workspace2.join("data").join("counters.json").exists());
    assert!(!workspace2
        .join("data")
        .join("sessions.json.importing")
        .exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn import_overwrites_existing_documents() {
    let workspace = temp_dir("facultyd-backup-overwrite");
    let out_dir = temp_dir("facultyd-backup-overwrite-out");
    let doc = workspace.join("facultyd.sqlite3");
    std::fs::write(&doc, b"before").expect("write db");

    let bundle = out_dir.join("b.zip");
    backup::export_workspace_bundle(&workspace, &[doc.clone()], &bundle).expect("export");
    std::fs::write(&doc, b"after-edit").expect("edit db");

    backup::import_workspace_bundle(&bundle, &workspace, &[doc.clone()]).expect("import");
    assert_eq!(std::fs::read(&doc).expect("read db"), b"before");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn non_zip_and_foreign_bundles_are_rejected() {
    let out_dir = temp_dir("facultyd-backup-reject");
    let workspace = temp_dir("facultyd-backup-reject-dst");

    let plain = out_dir.join("plain.sqlite3");
    std::fs::write(&plain, b"not a zip file").expect("write plain file");
    let e = backup::import_workspace_bundle(&plain, &workspace, &[]).expect_err("plain file");
    assert!(e.to_string().contains("not a workspace bundle"));

    let foreign = out_dir.join("foreign.zip");
    {
        let f = File::create(&foreign).expect("create foreign zip");
        let mut zip = zip::ZipWriter::new(f);
        zip.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("start manifest");
        zip.write_all(br#"{"format":"something-else-v9","documents":[]}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }
    let e = backup::import_workspace_bundle(&foreign, &workspace, &[]).expect_err("foreign zip");
    assert!(e.to_string().contains("unsupported bundle format"));

    let escaping = out_dir.join("escaping.zip");
    {
        let f = File::create(&escaping).expect("create escaping zip");
        let mut zip = zip::ZipWriter::new(f);
        zip.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("start manifest");
        zip.write_all(br#"{"format":"facultyd-workspace-v1","documents":["../evil.json"]}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }
    let e = backup::import_workspace_bundle(&escaping, &workspace, &[]).expect_err("escaping zip");
    assert!(e.to_string().contains("unsafe document name"));

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn documents_missing_from_the_bundle_are_removed() {
    let workspace = temp_dir("facultyd-backup-stale");
    let out_dir = temp_dir("facultyd-backup-stale-out");
    let data = workspace.join("data");
    std::fs::create_dir_all(&data).expect("data dir");
    let users = data.join("users.json");
    let faculties = data.join("faculties.json");
    let counters = data.join("counters.json");
    let owned = vec![users.clone(), faculties.clone(), counters.clone()];
    std::fs::write(&users, br#"{"admin":{}}"#).expect("write users");

    let bundle = out_dir.join("fresh.zip");
    let export = backup::export_workspace_bundle(&workspace, &owned, &bundle).expect("export");
    assert_eq!(export.documents, vec!["data/users.json"]);

    // Work done after the backup.
    std::fs::write(&faculties, br#"{"FAC0001":{"name":"Dr. Later"}}"#).expect("write faculties");
    std::fs::write(&counters, br#"{"faculties":1}"#).expect("write counters");

    let import = backup::import_workspace_bundle(&bundle, &workspace, &owned).expect("import");
    assert_eq!(import.restored, vec!["data/users.json"]);
    assert_eq!(import.removed, vec!["data/faculties.json", "data/counters.json"]);
    assert!(users.is_file());
    assert!(!faculties.exists());
    assert!(!counters.exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}
