//! Runs commands inside a sandbox and records what they changed.

mod process;
mod result;

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::core::{
    errors::HarnessError,
    fs::remove_best_effort,
    sandbox::Sandbox,
    snapshot::snapshot,
};
use process::{run_captured, ProcessError};

pub use result::RunResult;

/// Per-run knobs. The defaults expect a clean run: exit code zero, nothing on
/// stderr, and an empty temp dir afterwards.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Working directory; defaults to the sandbox scratch dir.
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub env_remove: Vec<String>,
    pub expect_error: bool,
    pub expect_stderr: bool,
    pub allow_temp_files: bool,
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    #[must_use]
    pub fn expect_error(mut self) -> Self {
        self.expect_error = true;
        self
    }

    #[must_use]
    pub fn expect_stderr(mut self) -> Self {
        self.expect_stderr = true;
        self
    }

    #[must_use]
    pub fn allow_temp_files(mut self) -> Self {
        self.allow_temp_files = true;
        self
    }
}

/// Runs `program` synchronously in `sandbox`, snapshotting the sandbox root
/// before and after.
///
/// # Errors
///
/// Returns [`HarnessError::Spawn`] when the program cannot be started, a
/// snapshot error when the tree cannot be walked, and
/// `UnexpectedExit`/`UnexpectedStderr`/`TempFilesLeft` when the run breaks an
/// expectation in `options`. Expectation errors carry the full result.
pub fn run<I, S>(
    sandbox: &Sandbox,
    program: &str,
    args: I,
    options: &RunOptions,
) -> Result<RunResult, HarnessError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let layout = sandbox.layout();
    let cwd = options
        .cwd
        .clone()
        .unwrap_or_else(|| layout.scratch_path());
    let mut env = sandbox.env().clone();
    env.extend(options.env.clone());
    for key in &options.env_remove {
        env.remove(key);
    }
    let envs: Vec<(String, String)> = env.into_iter().collect();

    if sandbox.verbose() {
        info!(program, args = ?args, cwd = %cwd.display(), "running");
    } else {
        debug!(program, args = ?args, cwd = %cwd.display(), "running");
    }

    let before = snapshot(layout.root(), sandbox.snapshot_options())?;
    let output = run_captured(program, &args, &envs, &cwd, sandbox.max_capture_bytes()).map_err(
        |err| match err {
            ProcessError::Spawn { program, source } => HarnessError::Spawn {
                program,
                detail: source.to_string(),
            },
            ProcessError::Capture(err) => HarnessError::from(err),
        },
    )?;
    let after = snapshot(layout.root(), sandbox.snapshot_options())?;
    let result = RunResult::new(
        program,
        args,
        cwd,
        output.code,
        &output.stdout,
        &output.stderr,
        before,
        after,
    );

    if sandbox.verbose() {
        debug!(
            code = result.exit_code(),
            stdout = result.stdout(),
            stderr = result.stderr(),
            "finished"
        );
    } else {
        debug!(
            code = result.exit_code(),
            created = result.files_created().len(),
            deleted = result.files_deleted().len(),
            updated = result.files_updated().len(),
            "finished"
        );
    }

    check_expectations(result, &layout.temp_path(), options)
}

fn check_expectations(
    result: RunResult,
    temp: &Path,
    options: &RunOptions,
) -> Result<RunResult, HarnessError> {
    if !result.success() && !options.expect_error {
        return Err(HarnessError::UnexpectedExit {
            result: Box::new(result),
        });
    }
    if !result.stderr().is_empty() && !options.expect_stderr && !options.expect_error {
        return Err(HarnessError::UnexpectedStderr {
            result: Box::new(result),
        });
    }
    if !options.allow_temp_files {
        let leftovers = temp_entries(temp);
        if !leftovers.is_empty() {
            let paths = leftovers
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            for path in &leftovers {
                remove_best_effort(path, "leftover temp file");
            }
            return Err(HarnessError::TempFilesLeft {
                result: Box::new(result),
                paths,
            });
        }
    }
    Ok(result)
}

fn temp_entries(temp: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(temp) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    paths
}
