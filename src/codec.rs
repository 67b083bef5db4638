//! Changeset file format: parsing, rendering and directory discovery
//!
//! A changeset file looks like this:
//!
//! ```text
//! --- Created at: 1700000000
//! --- Order: 3
//! --- Begin setup
//! create table foo (id integer primary key);
//! --- End
//! --- Begin teardown
//! drop table foo;
//! --- End
//! ```
//!
//! Markers start with two or more dashes and are matched case-insensitively.
//! Lines outside a marker or a block are ignored, so files may carry comments.
//! Each file is named by the lowercase hex hash of the changeset it holds.

use crate::changeset::Changeset;
use crate::error::{Result, TernError};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::Lines;
use std::sync::LazyLock;

/// Compiled marker patterns
struct Markers {
    created_at: Regex,
    order: Regex,
    begin_setup: Regex,
    begin_teardown: Regex,
    end: Regex,
}

static MARKERS: LazyLock<Markers> = LazyLock::new(|| {
    let compile = |pattern: &str| Regex::new(pattern).expect("marker pattern is valid");
    Markers {
        created_at: compile(r"(?i)^-{2,}\s*created[\s_]*at\s*:?\s*([0-9]+)$"),
        order: compile(r"(?i)^-{2,}\s*order\s*:?\s*([0-9]+)$"),
        begin_setup: compile(r"(?i)^-{2,}\s*begin\s+setup$"),
        begin_teardown: compile(r"(?i)^-{2,}\s*begin\s+teardown$"),
        end: compile(r"(?i)^-{2,}\s*end$"),
    }
});

impl Markers {
    /// Collect lines up to the next end marker, or to end of input
    fn read_block(&self, lines: &mut Lines<'_>) -> String {
        let mut block = Vec::new();
        for line in lines.by_ref() {
            if self.end.is_match(line.trim()) {
                break;
            }
            block.push(line);
        }
        block.join("\n")
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| TernError::InvalidChangesetFile(format!("{what} '{value}' is out of range")))
}

/// Parse a changeset from the text of a changeset file
///
/// # Errors
///
/// Returns `TernError::InvalidChangesetFile` if the order, setup, teardown or
/// created-at marker is never found (checked in that order).
pub fn decode(text: &str) -> Result<Changeset> {
    let markers = &*MARKERS;

    let mut created_at: Option<i64> = None;
    let mut order: Option<u32> = None;
    let mut setup: Option<String> = None;
    let mut teardown: Option<String> = None;

    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim();

        if let Some(caps) = markers.order.captures(line) {
            order = Some(parse_number(&caps[1], "Order")?);
        } else if let Some(caps) = markers.created_at.captures(line) {
            created_at = Some(parse_number(&caps[1], "Created at")?);
        } else if markers.begin_setup.is_match(line) {
            setup = Some(markers.read_block(&mut lines));
        } else if markers.begin_teardown.is_match(line) {
            teardown = Some(markers.read_block(&mut lines));
        }
    }

    let missing = |what: &str| TernError::InvalidChangesetFile(format!("File did not define {what}."));
    let order = order.ok_or_else(|| missing("order"))?;
    let setup = setup.ok_or_else(|| missing("setup SQL"))?;
    let teardown = teardown.ok_or_else(|| missing("teardown SQL"))?;
    let created_at = created_at.ok_or_else(|| missing("created at"))?;

    Ok(Changeset::from_parts(created_at, Some(order), setup, teardown))
}

/// Check that a changeset's SQL can be written to a file and read back
///
/// # Errors
///
/// Returns `TernError::InvalidChangesetFile` if setup or teardown contains a
/// line that reads as an end marker.
pub fn check_encodable(changeset: &Changeset) -> Result<()> {
    for (what, block) in [("setup", changeset.setup()), ("teardown", changeset.teardown())] {
        if block.lines().any(|line| MARKERS.end.is_match(line.trim())) {
            return Err(TernError::InvalidChangesetFile(format!(
                "{what} SQL contains a line that reads as an end marker"
            )));
        }
    }
    Ok(())
}

/// Render a changeset in the canonical file format
///
/// # Errors
///
/// - `TernError::Unordered` if the changeset has no order yet
/// - `TernError::InvalidChangesetFile` if setup or teardown contains a line
///   that reads as an end marker (see [`check_encodable`])
pub fn encode(changeset: &Changeset) -> Result<String> {
    let order = changeset.order().ok_or(TernError::Unordered)?;
    check_encodable(changeset)?;

    Ok(format!(
        "--- Created at: {}\n\
         --- Order: {}\n\
         --- Begin setup\n\
         {}\n\
         --- End\n\
         --- Begin teardown\n\
         {}\n\
         --- End\n",
        changeset.created_at(),
        order,
        changeset.setup(),
        changeset.teardown(),
    ))
}

/// Whether a file name looks like a changeset identity hash
pub fn is_changeset_file_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Read and parse a single changeset file
pub fn read_file(path: &Path) -> Result<Changeset> {
    let text = fs::read_to_string(path)?;
    decode(&text).map_err(|e| match e {
        TernError::InvalidChangesetFile(msg) => {
            TernError::InvalidChangesetFile(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Write a changeset into `directory`, named by its hex hash
///
/// Returns the path written.
pub fn write_file(directory: &Path, changeset: &Changeset) -> Result<PathBuf> {
    let path = directory.join(changeset.hex_hash()?);
    let text = encode(changeset)?;
    fs::write(&path, text)?;
    log::debug!("Wrote changeset file {}", path.display());
    Ok(path)
}

/// Remove a changeset's file from `directory`
///
/// Returns `false` if there was no such file.
pub fn remove_file(directory: &Path, changeset: &Changeset) -> Result<bool> {
    let path = directory.join(changeset.hex_hash()?);
    match fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("Removed changeset file {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Parse every changeset file in `directory`
///
/// Non-recursive. Entries that are not regular files, or whose names are not
/// hex hashes, are skipped. Results are sorted by path.
pub fn scan_directory(directory: &Path) -> Result<Vec<(PathBuf, Changeset)>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_changeset = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_changeset_file_name);
        if !is_changeset {
            continue;
        }
        let changeset = read_file(&path)?;
        found.push((path, changeset));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Build the local changeset set from `directory`
///
/// A file whose name does not match its content hash is still loaded; the
/// mismatch is logged.
pub fn load_directory(directory: &Path) -> Result<HashSet<Changeset>> {
    let mut changesets = HashSet::new();
    for (path, changeset) in scan_directory(directory)? {
        if !file_name_matches(&path, &changeset)? {
            log::warn!(
                "Changeset file {} does not match its content hash; was it edited?",
                path.display()
            );
        }
        changesets.insert(changeset);
    }
    Ok(changesets)
}

pub(crate) fn file_name_matches(path: &Path, changeset: &Changeset) -> Result<bool> {
    let hash = changeset.hex_hash()?;
    Ok(path.file_name().and_then(|n| n.to_str()) == Some(hash.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "\
--- Created at: 123123
--- Order: 12
--- Begin setup
create table foo(id primary key);
--- End
--- Begin teardown
drop table foo;
--- End
";

    #[test]
    fn test_decode_fixture() {
        let changeset = decode(FIXTURE).unwrap();
        assert_eq!(changeset.created_at(), 123123);
        assert_eq!(changeset.order(), Some(12));
        assert_eq!(changeset.setup(), "create table foo(id primary key);");
        assert_eq!(changeset.teardown(), "drop table foo;");
    }

    #[test]
    fn test_encode_is_canonical() {
        let changeset = Changeset::from_parts(123123, Some(12), "create table foo(id primary key);", "drop table foo;");
        assert_eq!(encode(&changeset).unwrap(), FIXTURE);
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            Changeset::from_parts(1, Some(1), "select 1;", "select 2;"),
            Changeset::from_parts(1_700_000_000, Some(24), "foo", ""),
            Changeset::from_parts(
                42,
                Some(7),
                "create table a (id int);\n\ncreate index a_id on a (id);",
                "-- comment inside\ndrop table a;",
            ),
            Changeset::from_parts(
                5,
                Some(2),
                "create table b (id int);\r\ncreate index b_id on b (id);\r\n",
                "drop table b;\r\n",
            ),
        ];
        for changeset in cases {
            let decoded = decode(&encode(&changeset).unwrap()).unwrap();
            assert_eq!(decoded, changeset);
            assert_eq!(decoded.hex_hash().unwrap(), changeset.hex_hash().unwrap());
        }
    }

    #[test]
    fn test_decode_is_tolerant() {
        let text = "\
# free-form notes before anything
------ ORDER : 3
-- some comment
---created_at:99
ignored line
--- BEGIN TEARDOWN
drop table t;
  ---   end
--- begin   setup
create table t (x int);
--End
trailing noise
";
        let changeset = decode(text).unwrap();
        assert_eq!(changeset.order(), Some(3));
        assert_eq!(changeset.created_at(), 99);
        assert_eq!(changeset.setup(), "create table t (x int);");
        assert_eq!(changeset.teardown(), "drop table t;");
    }

    #[test]
    fn test_decode_rejects_missing_markers() {
        let drop_line = |needle: &str| -> String {
            let mut skipping = false;
            FIXTURE
                .lines()
                .filter(|line| {
                    if line.contains(needle) {
                        skipping = needle.contains("Begin");
                        return false;
                    }
                    if skipping {
                        if line.contains("End") {
                            skipping = false;
                        }
                        return false;
                    }
                    true
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        for (needle, expected) in [
            ("Order", "order"),
            ("Created at", "created at"),
            ("Begin setup", "setup"),
            ("Begin teardown", "teardown"),
        ] {
            let text = drop_line(needle);
            match decode(&text) {
                Err(TernError::InvalidChangesetFile(msg)) => {
                    assert!(msg.contains(expected), "{needle}: {msg}")
                }
                other => panic!("{needle}: expected InvalidChangesetFile, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_empty_teardown() {
        let text = "--- Created at: 1\n--- Order: 1\n--- Begin setup\nselect 1;\n--- End\n--- Begin teardown\n\n--- End\n";
        let changeset = decode(text).unwrap();
        assert_eq!(changeset.teardown(), "");
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        let text = "--- Created at: 1\n--- Order: 1\n--- Begin teardown\n--- End\n--- Begin setup\nselect 1;\nselect 2;\n";
        let changeset = decode(text).unwrap();
        assert_eq!(changeset.setup(), "select 1;\nselect 2;");
    }

    #[test]
    fn test_decode_rejects_out_of_range_order() {
        let text = "--- Created at: 1\n--- Order: 99999999999\n--- Begin setup\nx\n--- End\n--- Begin teardown\n--- End\n";
        assert!(matches!(decode(text), Err(TernError::InvalidChangesetFile(_))));
    }

    #[test]
    fn test_encode_requires_order() {
        let changeset = Changeset::new("select 1;", "");
        assert!(matches!(encode(&changeset), Err(TernError::Unordered)));
    }

    #[test]
    fn test_encode_rejects_embedded_end_marker() {
        let changeset = Changeset::from_parts(1, Some(1), "select 1;\n-- END\nselect 2;", "");
        assert!(matches!(encode(&changeset), Err(TernError::InvalidChangesetFile(_))));
    }

    #[test]
    fn test_is_changeset_file_name() {
        let hash = Changeset::from_parts(1, Some(1), "a", "b").hex_hash().unwrap();
        assert!(is_changeset_file_name(&hash));
        assert!(!is_changeset_file_name(&hash.to_uppercase()));
        assert!(!is_changeset_file_name(&hash[..40]));
        assert!(!is_changeset_file_name("setup.sql"));
    }

    #[test]
    fn test_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let a = Changeset::from_parts(1, Some(1), "create table a (id int);", "drop table a;");
        let b = Changeset::from_parts(2, Some(2), "create table b (id int);", "drop table b;");

        let path = write_file(dir.path(), &a).unwrap();
        assert_eq!(path, dir.path().join(a.hex_hash().unwrap()));
        write_file(dir.path(), &b).unwrap();

        // Unrelated files and directories are ignored
        fs::write(dir.path().join("README"), "not a changeset").unwrap();
        fs::create_dir(dir.path().join("f".repeat(64))).unwrap();

        let loaded = load_directory(dir.path()).unwrap();
        assert_eq!(loaded, HashSet::from([a.clone(), b]));

        assert!(remove_file(dir.path(), &a).unwrap());
        assert!(!remove_file(dir.path(), &a).unwrap());
        assert_eq!(load_directory(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_read_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a".repeat(64));
        fs::write(&path, "--- Order: 1\n").unwrap();
        match read_file(&path) {
            Err(TernError::InvalidChangesetFile(msg)) => assert!(msg.contains(&"a".repeat(64))),
            other => panic!("expected InvalidChangesetFile, got {other:?}"),
        }
    }

    #[test]
    fn test_file_name_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let changeset = Changeset::from_parts(1, Some(1), "select 1;", "");
        let path = dir.path().join("0".repeat(64));
        fs::write(&path, encode(&changeset).unwrap()).unwrap();

        assert!(!file_name_matches(&path, &changeset).unwrap());
        // Still part of the local set
        assert!(load_directory(dir.path()).unwrap().contains(&changeset));
    }
}
