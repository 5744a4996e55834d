use std::{io, path::PathBuf};

use crate::core::{
    assertions::AssertionFailure, runner::RunResult, sandbox::ProvisioningFailure,
    snapshot::SnapshotError,
};

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningFailure),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("[PH401] failed to start '{program}': {detail}")]
    Spawn { program: String, detail: String },
    #[error("[PH402] '{}' exited with code {}\n{result}", .result.command_line(), .result.exit_code())]
    UnexpectedExit { result: Box<RunResult> },
    #[error("[PH403] '{}' wrote to stderr\n{result}", .result.command_line())]
    UnexpectedStderr { result: Box<RunResult> },
    #[error("[PH404] '{}' left temporary files behind: {}\n{result}", .result.command_line(), .paths.join(", "))]
    TempFilesLeft {
        result: Box<RunResult>,
        paths: Vec<String>,
    },
    #[error("[PH405] failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("[PH900] {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for HarnessError {
    fn from(source: anyhow::Error) -> Self {
        Self::Internal {
            message: format!("{source:#}"),
            source,
        }
    }
}

impl HarnessError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Provisioning(err) => err.code(),
            Self::Assertion(err) => err.code(),
            Self::Snapshot(err) => err.code(),
            Self::Spawn { .. } => "PH401",
            Self::UnexpectedExit { .. } => "PH402",
            Self::UnexpectedStderr { .. } => "PH403",
            Self::TempFilesLeft { .. } => "PH404",
            Self::Io { .. } => "PH405",
            Self::Internal { .. } => "PH900",
        }
    }

    /// Provisioning failures leave no usable sandbox, so the whole run stops.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Provisioning(_))
    }

    /// The run an expectation failure was raised for.
    #[must_use]
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            Self::UnexpectedExit { result }
            | Self::UnexpectedStderr { result }
            | Self::TempFilesLeft { result, .. } => Some(result),
            _ => None,
        }
    }
}
