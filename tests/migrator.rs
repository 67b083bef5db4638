//! End-to-end orchestration over SQLite and a changeset directory

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tern::adapter::{self, Adapter};
use tern::{codec, AdapterConfig, Changeset, Tern, TernConfig, TernError};

struct Fixture {
    dir: TempDir,
    tern: Tern<Box<dyn Adapter>>,
}

impl Fixture {
    fn changesets(&self) -> std::path::PathBuf {
        self.dir.path().join("changesets")
    }
}

fn sqlite_config(dir: &Path) -> AdapterConfig {
    AdapterConfig {
        backend: "sqlite".to_string(),
        host: Some(dir.join("tern.db").to_string_lossy().into_owned()),
        ..AdapterConfig::default()
    }
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let changesets = dir.path().join("changesets");
    fs::create_dir(&changesets).unwrap();

    let mut adapter = adapter::create_adapter(&sqlite_config(dir.path())).unwrap();
    Tern::initialize(&mut adapter).unwrap();
    let tern = Tern::new(adapter, &changesets).unwrap();
    Fixture { dir, tern }
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_construction_requires_initialized_database() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = adapter::create_adapter(&sqlite_config(dir.path())).unwrap();
    assert!(matches!(
        Tern::new(adapter, dir.path()),
        Err(TernError::NotInitialized { .. })
    ));
}

#[test]
fn test_apply_saves_file_by_final_hash() {
    let mut f = fixture();
    let mut changeset = Changeset::new("create table foo (id integer);", "drop table foo;");

    let path = f.tern.apply(&mut changeset).unwrap();

    assert_eq!(changeset.order(), Some(1));
    assert_eq!(path, f.changesets().join(changeset.hex_hash().unwrap()));
    assert_eq!(codec::read_file(&path).unwrap(), changeset);
    assert!(f.tern.diff().unwrap().is_in_sync());
}

#[test]
fn test_sequential_applies_are_ordered() {
    let mut f = fixture();
    let mut orders = Vec::new();
    for table in ["a", "b", "c"] {
        let mut changeset = Changeset::new(
            format!("create table {table} (id integer);"),
            format!("drop table {table};"),
        );
        f.tern.apply(&mut changeset).unwrap();
        orders.push(changeset.order().unwrap());
    }
    assert_eq!(orders, vec![1, 2, 3]);
    assert_eq!(file_count(&f.changesets()), 3);
}

#[test]
fn test_diff_detects_drift() {
    let mut f = fixture();
    let mut a = Changeset::from_parts(1_700_000_000, None, "create table a (id integer);", "drop table a;");
    let mut c = Changeset::from_parts(1_700_000_000, None, "create table c (id integer);", "drop table c;");
    f.tern.apply(&mut a).unwrap();
    f.tern.apply(&mut c).unwrap();

    codec::remove_file(&f.changesets(), &c).unwrap();
    let b = Changeset::from_parts(1_700_000_000, Some(2), "create table b (id integer);", "drop table b;");
    codec::write_file(&f.changesets(), &b).unwrap();

    let diff = f.tern.diff().unwrap();
    assert_eq!(diff.to_teardown, vec![c]);
    assert_eq!(diff.to_apply, vec![b]);
}

#[test]
fn test_update_converges() {
    let mut f = fixture();
    let mut a = Changeset::from_parts(1_700_000_000, None, "create table a (id integer);", "drop table a;");
    let mut c = Changeset::from_parts(1_700_000_000, None, "create table c (id integer);", "drop table c;");
    f.tern.apply(&mut a).unwrap();
    f.tern.apply(&mut c).unwrap();

    codec::remove_file(&f.changesets(), &c).unwrap();
    let b = Changeset::from_parts(1_700_000_000, Some(2), "create table b (id integer);", "drop table b;");
    let d = Changeset::from_parts(1_700_000_000, Some(3), "create table d (id integer);", "drop table d;");
    codec::write_file(&f.changesets(), &b).unwrap();
    codec::write_file(&f.changesets(), &d).unwrap();

    let acted = f.tern.update().unwrap();
    assert_eq!(acted.to_teardown, vec![c]);
    assert_eq!(acted.to_apply, vec![b, d]);
    assert!(f.tern.diff().unwrap().is_in_sync());
    assert_eq!(file_count(&f.changesets()), 3);
}

#[test]
fn test_update_stops_at_failing_changeset() {
    let mut f = fixture();
    let broken = Changeset::from_parts(1_700_000_000, Some(1), "insert into nowhere values (1);", "");
    codec::write_file(&f.changesets(), &broken).unwrap();

    assert!(matches!(f.tern.update(), Err(TernError::Backend(_))));
    let diff = f.tern.diff().unwrap();
    assert_eq!(diff.to_apply, vec![broken]);
}

#[test]
fn test_revert_removes_record_and_file() {
    let mut f = fixture();
    let mut changeset = Changeset::new("create table foo (id integer);", "drop table foo;");
    let path = f.tern.apply(&mut changeset).unwrap();

    let found = f.tern.find_applied(&changeset.hex_hash().unwrap()).unwrap();
    assert!(f.tern.revert(&found).unwrap());

    assert!(!path.exists());
    assert!(f.tern.diff().unwrap().is_in_sync());
    // Reapplying the same changeset is possible once it is reverted
    let mut again = changeset.clone();
    f.tern.apply(&mut again).unwrap();
    assert_eq!(again, changeset);
}

#[test]
fn test_test_is_isolated() {
    let mut f = fixture();
    let changeset = Changeset::new("create table foo (id integer);", "drop table foo;");
    f.tern.test(&changeset).unwrap();
    f.tern.test(&changeset).unwrap();

    assert_eq!(file_count(&f.changesets()), 0);
    assert!(f.tern.diff().unwrap().is_in_sync());

    // The table does not exist, so applying works
    let mut changeset = changeset;
    f.tern.apply(&mut changeset).unwrap();
}

#[test]
fn test_malformed_file_fails_diff() {
    let mut f = fixture();
    fs::write(f.changesets().join("a".repeat(64)), "--- Created at: 1\n--- Begin setup\nselect 1;\n--- End\n").unwrap();
    // Files with other names are ignored
    fs::write(f.changesets().join("README.md"), "not a changeset").unwrap();

    match f.tern.diff() {
        Err(TernError::InvalidChangesetFile(msg)) => assert!(msg.contains("order"), "{msg}"),
        other => panic!("expected InvalidChangesetFile, got {other:?}"),
    }
}

#[test]
fn test_config_file_drives_setup() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("migrations")).unwrap();
    let config_path = dir.path().join("tern.toml");
    fs::write(
        &config_path,
        format!(
            "directory = \"migrations\"\n\n[adapter]\nbackend = \"sqlite\"\nhost = {:?}\ntable = \"changes\"\n",
            dir.path().join("app.db").to_string_lossy()
        ),
    )
    .unwrap();

    let config = TernConfig::load(Some(&config_path)).unwrap();
    assert_eq!(config.directory, dir.path().join("migrations"));

    let mut adapter = adapter::create_adapter(&config.adapter).unwrap();
    Tern::initialize(&mut adapter).unwrap();
    let mut tern = Tern::new(adapter, &config.directory).unwrap();
    assert_eq!(tern.adapter().table(), "changes");

    let mut changeset = Changeset::new("create table foo (id integer);", "");
    let path = tern.apply(&mut changeset).unwrap();
    assert!(path.starts_with(dir.path().join("migrations")));
}
