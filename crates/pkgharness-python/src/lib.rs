use std::{
    env,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context, Result};

const EXECUTABLE_SCRIPT: &str = "import sys; print(sys.executable)";
const VERSION_SCRIPT: &str = "import sys; print('%d.%d' % sys.version_info[:2])";

/// Finds the host interpreter used to build sandboxes.
///
/// # Errors
///
/// Returns an error when no interpreter is on `PATH` and `PKGHARNESS_PYTHON`
/// is unset.
pub fn detect_interpreter() -> Result<String> {
    if let Ok(explicit) = env::var("PKGHARNESS_PYTHON") {
        if !explicit.trim().is_empty() {
            return Ok(explicit);
        }
    }

    for candidate in ["python3", "python"] {
        if let Ok(path) = which::which(candidate) {
            return path
                .into_os_string()
                .into_string()
                .map_err(|_| anyhow!("non-utf8 path"));
        }
    }

    bail!("no python interpreter found; set PKGHARNESS_PYTHON");
}

/// Runs a one-line script and returns its trimmed stdout.
///
/// # Errors
///
/// Returns an error when the interpreter cannot be started or exits non-zero.
pub fn run_script(
    python: &Path,
    script: &str,
    envs: &[(String, String)],
    cwd: &Path,
) -> Result<String> {
    let mut command = Command::new(python);
    command.arg("-c").arg(script);
    command.env_clear();
    for (key, value) in envs {
        command.env(key, value);
    }
    command.current_dir(cwd);
    command.stdin(Stdio::null());
    let output = command
        .output()
        .with_context(|| format!("failed to start {}", python.display()))?;
    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            python.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Reports the `major.minor` version of an interpreter.
///
/// # Errors
///
/// Returns an error when the interpreter cannot be probed.
pub fn python_version(python: &Path) -> Result<String> {
    let cwd = env::temp_dir();
    let inherited: Vec<(String, String)> = env::vars().collect();
    let version = run_script(python, VERSION_SCRIPT, &inherited, &cwd)?;
    if version.split('.').count() != 2 {
        bail!("unexpected python version output {version:?}");
    }
    Ok(version)
}

/// The script whose output identifies which interpreter `PATH` resolved.
#[must_use]
pub fn executable_probe() -> &'static str {
    EXECUTABLE_SCRIPT
}

/// File name of the interpreter inside a virtual environment's bin dir.
#[must_use]
pub fn interpreter_file_name() -> &'static str {
    if cfg!(windows) {
        "python.exe"
    } else {
        "python"
    }
}

/// Directory layout of a virtual environment rooted at `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenvLayout {
    pub root: PathBuf,
    pub lib: PathBuf,
    pub include: PathBuf,
    pub bin: PathBuf,
}

impl VenvLayout {
    #[must_use]
    pub fn locate(root: &Path, version: &str) -> Self {
        if cfg!(windows) {
            Self {
                root: root.to_path_buf(),
                lib: root.join("Lib"),
                include: root.join("Include"),
                bin: root.join("Scripts"),
            }
        } else {
            Self {
                root: root.to_path_buf(),
                lib: root.join("lib").join(format!("python{version}")),
                include: root.join("include"),
                bin: root.join("bin"),
            }
        }
    }

    #[must_use]
    pub fn interpreter(&self) -> PathBuf {
        self.bin.join(interpreter_file_name())
    }
}

/// Whether the interpreter reported by `sys.executable` is the one expected
/// at `expected`, ignoring any executable extension.
#[must_use]
pub fn executable_matches(reported: &Path, expected: &Path) -> bool {
    let reported = reported.with_extension("");
    let expected = expected.with_extension("");
    if reported == expected {
        return true;
    }
    let (Some(reported_name), Some(expected_name)) = (reported.file_name(), expected.file_name())
    else {
        return false;
    };
    if reported_name != expected_name {
        return false;
    }
    match (
        reported.parent().map(Path::canonicalize),
        expected.parent().map(Path::canonicalize),
    ) {
        (Some(Ok(left)), Some(Ok(right))) => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_matches_ignores_extension() {
        assert!(executable_matches(
            Path::new("/sbx/.virtualenv/bin/python.exe"),
            Path::new("/sbx/.virtualenv/bin/python"),
        ));
        assert!(!executable_matches(
            Path::new("/usr/bin/python"),
            Path::new("/sbx/.virtualenv/bin/python"),
        ));
    }

    #[test]
    fn executable_matches_through_canonical_parent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join("bin");
        std::fs::create_dir_all(&bin).expect("bin dir");
        let dotted = temp.path().join("bin").join(".").join("python");
        assert!(executable_matches(&dotted, &bin.join("python")));
    }

    #[cfg(unix)]
    #[test]
    fn venv_layout_uses_versioned_lib_dir() {
        let layout = VenvLayout::locate(Path::new("/sbx/venv"), "3.12");
        assert_eq!(layout.lib, PathBuf::from("/sbx/venv/lib/python3.12"));
        assert_eq!(layout.bin, PathBuf::from("/sbx/venv/bin"));
        assert_eq!(layout.interpreter(), PathBuf::from("/sbx/venv/bin/python"));
    }
}
