//! Checks over observed filesystem changes.
//!
//! Both entry points collect every mismatch they find and report them
//! together; nothing is skipped after the first failure.

mod changes;
mod installed;

use std::fmt;

use camino::Utf8PathBuf;

use crate::core::diff::ChangeSet;

pub use changes::{assert_all_changes, StateSource};
pub use installed::{assert_installed, InstallExpectation};

#[derive(thiserror::Error, Debug)]
pub enum AssertionFailure {
    #[error("[PH201] unexpected changes:\n{changes}")]
    UnexpectedChanges { changes: ChangeSet },
    #[error("[PH202] package '{package}' was not installed as expected:\n{}", render_violations(.violations))]
    Install {
        package: String,
        violations: Vec<InstallViolation>,
    },
}

impl AssertionFailure {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnexpectedChanges { .. } => "PH201",
            Self::Install { .. } => "PH202",
        }
    }
}

fn render_violations(violations: &[InstallViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!("  - {violation}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_paths(paths: &[Utf8PathBuf]) -> String {
    if paths.is_empty() {
        return "(none)".to_string();
    }
    paths
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One way an install differed from its [`InstallExpectation`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallViolation {
    UnexpectedLink { path: Utf8PathBuf },
    MissingLink { path: Utf8PathBuf },
    LinkUnreadable { path: Utf8PathBuf, error: String },
    LinkContents {
        path: Utf8PathBuf,
        expected_ending: String,
        actual: String,
    },
    PthFile {
        path: Utf8PathBuf,
        expected_updated: bool,
    },
    PackageDir {
        path: Utf8PathBuf,
        expected_created: bool,
        created: Vec<Utf8PathBuf>,
    },
    MissingFile { path: Utf8PathBuf },
    UnexpectedFile { path: Utf8PathBuf },
}

impl fmt::Display for InstallViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedLink { path } => write!(f, "unexpected egg-link {path}"),
            Self::MissingLink { path } => write!(f, "egg-link {path} was not created"),
            Self::LinkUnreadable { path, error } => {
                write!(f, "egg-link {path} could not be read: {error}")
            }
            Self::LinkContents {
                path,
                expected_ending,
                actual,
            } => write!(
                f,
                "egg-link {path} should point at {expected_ending:?} and end with '.', found {actual:?}"
            ),
            Self::PthFile {
                path,
                expected_updated: true,
            } => write!(f, "{path} was not updated"),
            Self::PthFile {
                path,
                expected_updated: false,
            } => write!(f, "{path} was unexpectedly updated"),
            Self::PackageDir {
                path,
                expected_created: true,
                created,
            } => write!(
                f,
                "package directory {path} was not created; created: {}",
                render_paths(created)
            ),
            Self::PackageDir {
                path,
                expected_created: false,
                ..
            } => write!(f, "package directory {path} was unexpectedly created"),
            Self::MissingFile { path } => write!(f, "expected {path} to be created"),
            Self::UnexpectedFile { path } => write!(f, "{path} should not have been created"),
        }
    }
}
