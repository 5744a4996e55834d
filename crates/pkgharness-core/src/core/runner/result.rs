use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use camino::Utf8PathBuf;

use crate::core::{
    diff::{diff, ChangeSet},
    snapshot::{FileRecord, Snapshot},
};

/// Outcome of one command run inside a sandbox.
///
/// Line endings are normalized and updated directories dropped when the
/// result is built; nothing changes afterwards.
#[derive(Clone, Debug)]
pub struct RunResult {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    exit_code: i32,
    stdout: String,
    stderr: String,
    files_before: Snapshot,
    files_after: Snapshot,
    changes: ChangeSet,
}

impl RunResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        cwd: impl Into<PathBuf>,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
        files_before: Snapshot,
        files_after: Snapshot,
    ) -> Self {
        let mut changes = diff(&files_before, &files_after, &[] as &[&str]);
        changes.updated.retain(|_, record| !record.is_dir());
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
            exit_code,
            stdout: normalize_newlines(stdout),
            stderr: normalize_newlines(stderr),
            files_before,
            files_after,
            changes,
        }
    }

    /// A result with no process behind it, for asserting on two snapshots.
    #[must_use]
    pub fn from_states(files_before: Snapshot, files_after: Snapshot) -> Self {
        let cwd = files_after.root().to_path_buf();
        Self::new("", Vec::new(), cwd, 0, "", "", files_before, files_after)
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    #[must_use]
    pub fn files_before(&self) -> &Snapshot {
        &self.files_before
    }

    #[must_use]
    pub fn files_after(&self) -> &Snapshot {
        &self.files_after
    }

    #[must_use]
    pub fn files_created(&self) -> &BTreeMap<Utf8PathBuf, FileRecord> {
        &self.changes.created
    }

    #[must_use]
    pub fn files_deleted(&self) -> &BTreeMap<Utf8PathBuf, FileRecord> {
        &self.changes.deleted
    }

    #[must_use]
    pub fn files_updated(&self) -> &BTreeMap<Utf8PathBuf, FileRecord> {
        &self.changes.updated
    }

    #[must_use]
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Script result: {}", self.command_line())?;
        writeln!(f, "  return code: {}", self.exit_code)?;
        for (label, text) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            if !text.is_empty() {
                writeln!(f, "-- {label}: --------------------")?;
                write!(f, "{text}")?;
                if !text.ends_with('\n') {
                    writeln!(f)?;
                }
            }
        }
        for (label, group) in self.changes.groups() {
            if group.is_empty() {
                continue;
            }
            writeln!(f, "-- {label}: -------------------")?;
            for path in group.keys() {
                writeln!(f, "  {path}")?;
            }
        }
        Ok(())
    }
}
