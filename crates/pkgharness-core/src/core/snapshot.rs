//! Point-in-time listings of a sandbox tree.
//!
//! A [`Snapshot`] records presence, kind, and size for every entry below a
//! root. Contents are never read, so two snapshots of a file rewritten with the
//! same length compare equal.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: Utf8PathBuf,
    pub kind: EntryKind,
    /// Byte length for files; always zero for directories.
    pub size: u64,
}

impl FileRecord {
    pub fn file(path: impl Into<Utf8PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn dir(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
            size: 0,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    root: PathBuf,
    entries: BTreeMap<Utf8PathBuf, FileRecord>,
}

impl Snapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Builds a snapshot with no root from in-memory records.
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.entries.insert(record.path.clone(), record);
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn get(&self, path: impl AsRef<Utf8Path>) -> Option<&FileRecord> {
        self.entries.get(path.as_ref())
    }

    #[must_use]
    pub fn contains(&self, path: impl AsRef<Utf8Path>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.entries.keys()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Utf8PathBuf, FileRecord> {
        &self.entries
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Skip entries whose name starts with a dot.
    pub ignore_hidden: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("[PH301] failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("[PH302] failed to stat {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("[PH303] path {} is not valid UTF-8", .0.display())]
    NonUtf8(PathBuf),
}

impl SnapshotError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Walk { .. } => "PH301",
            Self::Metadata { .. } => "PH302",
            Self::NonUtf8(_) => "PH303",
        }
    }
}

/// Bytecode caches written as a side effect of interpreter startup.
pub(crate) fn is_bytecode_artifact(name: &str) -> bool {
    name == "__pycache__"
        || Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pyc") || ext.eq_ignore_ascii_case("pyo"))
}

fn keep_entry(entry: &DirEntry, options: SnapshotOptions) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let Some(name) = entry.file_name().to_str() else {
        // surfaces as NonUtf8 once the record is built
        return true;
    };
    if options.ignore_hidden && name.starts_with('.') {
        return false;
    }
    !is_bytecode_artifact(name)
}

/// Walks `root` and records every file and directory below it.
///
/// A missing root produces an empty snapshot.
///
/// # Errors
///
/// Returns a [`SnapshotError`] when any part of the tree cannot be read.
pub fn snapshot(root: &Path, options: SnapshotOptions) -> Result<Snapshot, SnapshotError> {
    let mut snapshot = Snapshot::new(root);
    match fs::symlink_metadata(root) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(snapshot),
        Err(source) => {
            return Err(SnapshotError::Metadata {
                path: root.to_path_buf(),
                source,
            })
        }
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, options));
    for entry in walker {
        let entry = entry.map_err(|source| SnapshotError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path);
        let rel = Utf8PathBuf::from_path_buf(rel.to_path_buf()).map_err(SnapshotError::NonUtf8)?;
        snapshot.insert(record_for(&entry, rel)?);
    }
    Ok(snapshot)
}

fn record_for(entry: &DirEntry, rel: Utf8PathBuf) -> Result<FileRecord, SnapshotError> {
    let path = entry.path();
    let file_type = entry.file_type();
    if file_type.is_symlink() {
        return match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(FileRecord::dir(rel)),
            Ok(meta) => Ok(FileRecord::file(rel, meta.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(FileRecord::file(rel, 0)),
            Err(source) => Err(SnapshotError::Metadata {
                path: path.to_path_buf(),
                source,
            }),
        };
    }
    if file_type.is_dir() {
        return Ok(FileRecord::dir(rel));
    }
    let meta = entry.metadata().map_err(|source| SnapshotError::Walk {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FileRecord::file(rel, meta.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_root_is_empty() {
        let temp = tempdir().expect("tempdir");
        let snap = snapshot(&temp.path().join("absent"), SnapshotOptions::default())
            .expect("snapshot");
        assert!(snap.is_empty());
    }

    #[test]
    fn records_files_dirs_and_sizes() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("pkg/sub")).expect("dirs");
        fs::write(root.join("pkg/__init__.py"), b"x = 1\n").expect("write");
        fs::write(root.join("top.txt"), b"").expect("write");

        let snap = snapshot(root, SnapshotOptions::default()).expect("snapshot");
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.get("pkg"), Some(&FileRecord::dir("pkg")));
        assert_eq!(snap.get("pkg/sub"), Some(&FileRecord::dir("pkg/sub")));
        assert_eq!(
            snap.get("pkg/__init__.py"),
            Some(&FileRecord::file("pkg/__init__.py", 6))
        );
        assert_eq!(snap.get("top.txt").map(|r| r.size), Some(0));
        assert_eq!(snap.root(), root);
    }

    #[test]
    fn bytecode_caches_are_filtered() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("lib/__pycache__")).expect("dirs");
        fs::write(root.join("lib/__pycache__/mod.cpython-312.pyc"), b"00").expect("write");
        fs::write(root.join("lib/mod.py"), b"").expect("write");
        fs::write(root.join("lib/legacy.pyc"), b"00").expect("write");

        let snap = snapshot(root, SnapshotOptions::default()).expect("snapshot");
        let paths: Vec<&str> = snap.paths().map(|path| path.as_str()).collect();
        assert_eq!(paths, vec!["lib", "lib/mod.py"]);
    }

    #[test]
    fn hidden_entries_follow_options() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join(".virtualenv/bin")).expect("dirs");
        fs::write(root.join(".marker"), b"1").expect("write");

        let all = snapshot(root, SnapshotOptions::default()).expect("snapshot");
        assert!(all.contains(".marker"));
        assert!(all.contains(".virtualenv/bin"));

        let visible = snapshot(
            root,
            SnapshotOptions {
                ignore_hidden: true,
            },
        )
        .expect("snapshot");
        assert!(visible.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recorded_but_not_followed() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("root");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&root).expect("root");
        fs::create_dir_all(&outside).expect("outside");
        fs::write(outside.join("big.bin"), vec![0u8; 32]).expect("write");
        symlink(&outside, root.join("linked")).expect("dir link");
        symlink(outside.join("big.bin"), root.join("file-link")).expect("file link");
        symlink(temp.path().join("gone"), root.join("dangling")).expect("dangling link");

        let snap = snapshot(&root, SnapshotOptions::default()).expect("snapshot");
        assert_eq!(snap.get("linked"), Some(&FileRecord::dir("linked")));
        assert!(!snap.contains("linked/big.bin"));
        assert_eq!(snap.get("file-link").map(|r| r.size), Some(32));
        assert_eq!(snap.get("dangling").map(|r| r.size), Some(0));
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let snap = Snapshot::from_records([FileRecord::file("a.txt", 3), FileRecord::dir("d")]);
        let encoded = serde_json::to_string(&snap).expect("encode");
        let decoded: Snapshot = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, snap);
        assert!(encoded.contains("\"kind\":\"dir\""));
    }
}
