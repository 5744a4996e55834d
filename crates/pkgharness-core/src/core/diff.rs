//! Structural delta between two snapshots.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::snapshot::{FileRecord, Snapshot};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub deleted: BTreeMap<Utf8PathBuf, FileRecord>,
    pub created: BTreeMap<Utf8PathBuf, FileRecord>,
    /// Files present on both sides whose size changed; holds the later record.
    pub updated: BTreeMap<Utf8PathBuf, FileRecord>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deleted.len() + self.created.len() + self.updated.len()
    }

    /// Groups in report order.
    pub fn groups(&self) -> [(&'static str, &BTreeMap<Utf8PathBuf, FileRecord>); 3] {
        [
            ("deleted", &self.deleted),
            ("created", &self.created),
            ("updated", &self.updated),
        ]
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, entries) in self.groups() {
            let paths: Vec<&str> = entries.keys().map(|path| path.as_str()).collect();
            writeln!(f, "{label}: {}", paths.join(", "))?;
        }
        Ok(())
    }
}

/// Lexically normalizes a relative path: drops `.` and empty components and
/// folds `..` into its parent.
pub(crate) fn normalize_relative(path: &Utf8Path) -> Utf8PathBuf {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {}
            Utf8Component::ParentDir => {
                parts.pop();
            }
            Utf8Component::Normal(part) => parts.push(part),
        }
    }
    parts.into_iter().collect()
}

/// Component-wise prefix match: `lib` matches `lib` and `lib/x`, never `lib2`.
/// An empty prefix matches nothing.
pub fn prefix_match(path: &Utf8Path, prefix: &Utf8Path) -> bool {
    if prefix.as_str().is_empty() {
        return false;
    }
    path.starts_with(prefix)
}

fn filtered<'a>(
    snapshot: &'a Snapshot,
    ignore: &'a [Utf8PathBuf],
) -> impl Iterator<Item = (&'a Utf8PathBuf, &'a FileRecord)> {
    snapshot
        .entries()
        .iter()
        .filter(move |(path, _)| !ignore.iter().any(|prefix| prefix_match(path, prefix)))
}

/// Differences two snapshots, skipping anything at or below an ignore prefix.
///
/// Directories are compared by presence only. A path whose kind changed is
/// reported as deleted and created, never updated.
pub fn diff<P: AsRef<Utf8Path>>(before: &Snapshot, after: &Snapshot, ignore: &[P]) -> ChangeSet {
    let ignore: Vec<Utf8PathBuf> = ignore
        .iter()
        .map(|prefix| normalize_relative(prefix.as_ref()))
        .collect();
    let mut changes = ChangeSet::default();

    for (path, old) in filtered(before, &ignore) {
        match after.get(path) {
            None => {
                changes.deleted.insert(path.clone(), old.clone());
            }
            Some(new) if new.kind != old.kind => {
                changes.deleted.insert(path.clone(), old.clone());
                changes.created.insert(path.clone(), new.clone());
            }
            Some(new) if new.is_file() && new.size != old.size => {
                changes.updated.insert(path.clone(), new.clone());
            }
            Some(_) => {}
        }
    }
    for (path, new) in filtered(after, &ignore) {
        if !before.contains(path) {
            changes.created.insert(path.clone(), new.clone());
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    fn sample_before() -> Snapshot {
        Snapshot::from_records([
            FileRecord::dir("lib"),
            FileRecord::file("lib/a.py", 10),
            FileRecord::file("lib/b.py", 5),
            FileRecord::dir("lib2"),
            FileRecord::file("lib2/c.py", 1),
            FileRecord::file("swap", 3),
        ])
    }

    fn sample_after() -> Snapshot {
        Snapshot::from_records([
            FileRecord::dir("lib"),
            FileRecord::file("lib/a.py", 12),
            FileRecord::dir("lib2"),
            FileRecord::file("lib2/c.py", 1),
            FileRecord::file("lib2/d.py", 4),
            FileRecord::dir("swap"),
        ])
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let snap = sample_before();
        assert!(diff(&snap, &snap, NONE).is_empty());
    }

    #[test]
    fn classifies_created_deleted_updated() {
        let changes = diff(&sample_before(), &sample_after(), NONE);
        let keys = |map: &BTreeMap<Utf8PathBuf, FileRecord>| {
            map.keys().map(|k| k.as_str().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(keys(&changes.deleted), vec!["lib/b.py", "swap"]);
        assert_eq!(keys(&changes.created), vec!["lib2/d.py", "swap"]);
        assert_eq!(keys(&changes.updated), vec!["lib/a.py"]);
        assert_eq!(changes.updated[Utf8Path::new("lib/a.py")].size, 12);
        assert!(changes.created[Utf8Path::new("swap")].is_dir());
        assert!(changes.deleted[Utf8Path::new("swap")].is_file());
    }

    #[test]
    fn swapping_sides_swaps_created_and_deleted() {
        let forward = diff(&sample_before(), &sample_after(), &["lib"]);
        let backward = diff(&sample_after(), &sample_before(), &["lib"]);
        assert_eq!(forward.created, backward.deleted);
        assert_eq!(forward.deleted, backward.created);
    }

    #[test]
    fn ignore_prefix_respects_path_boundaries() {
        let changes = diff(&sample_before(), &sample_after(), &["lib"]);
        assert!(changes.updated.is_empty());
        assert!(!changes.deleted.contains_key(Utf8Path::new("lib/b.py")));
        assert!(changes.created.contains_key(Utf8Path::new("lib2/d.py")));
    }

    #[test]
    fn ignore_prefixes_are_normalized() {
        let changes = diff(&sample_before(), &sample_after(), &["./lib2/", "swap"]);
        assert!(!changes.created.contains_key(Utf8Path::new("lib2/d.py")));
        assert!(changes.deleted.contains_key(Utf8Path::new("lib/b.py")));
        assert!(!changes.created.contains_key(Utf8Path::new("swap")));
    }

    #[test]
    fn adding_prefixes_never_grows_results() {
        let before = sample_before();
        let after = sample_after();
        let mut prefixes: Vec<&str> = Vec::new();
        let mut previous = diff(&before, &after, &prefixes);
        for prefix in ["lib/a.py", "lib2", "swap", "lib"] {
            prefixes.push(prefix);
            let next = diff(&before, &after, &prefixes);
            assert!(next.deleted.len() <= previous.deleted.len());
            assert!(next.created.len() <= previous.created.len());
            assert!(next.updated.len() <= previous.updated.len());
            previous = next;
        }
        assert!(previous.is_empty());
    }

    #[test]
    fn directories_are_presence_only() {
        let mut before = Snapshot::default();
        before.insert(FileRecord::dir("site"));
        let mut after = Snapshot::default();
        after.insert(FileRecord {
            size: 4096,
            ..FileRecord::dir("site")
        });
        assert!(diff(&before, &after, NONE).is_empty());
    }

    #[test]
    fn empty_prefix_ignores_nothing() {
        let changes = diff(&Snapshot::default(), &sample_after(), &[""]);
        assert_eq!(changes.created.len(), sample_after().len());
    }

    #[test]
    fn display_groups_by_kind() {
        let changes = diff(&sample_before(), &sample_after(), &["lib2", "swap"]);
        let rendered = changes.to_string();
        assert_eq!(rendered, "deleted: lib/b.py\ncreated: \nupdated: lib/a.py\n");
    }

    #[test]
    fn normalize_relative_folds_components() {
        assert_eq!(
            normalize_relative(Utf8Path::new("./a/b/../c/")),
            Utf8PathBuf::from("a/c")
        );
        assert_eq!(normalize_relative(Utf8Path::new(".")), Utf8PathBuf::new());
    }
}
