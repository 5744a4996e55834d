use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use pkgharness_python::{detect_interpreter, python_version, VenvLayout};

use super::{layout::ToolPaths, ProvisionVariant};

/// Builds a bare interpreter installation at a given root.
pub trait Provisioner: Send + Sync {
    /// Populates `tool_root` and reports where its lib, include and bin dirs
    /// ended up. Every returned path must lie under `tool_root`.
    ///
    /// # Errors
    ///
    /// Returns an error when the installation cannot be created.
    fn provision(&self, tool_root: &Path, variant: &ProvisionVariant) -> Result<ToolPaths>;
}

/// Provisions with `<python> -m venv`.
#[derive(Clone, Debug, Default)]
pub struct VenvProvisioner {
    python: Option<PathBuf>,
}

impl VenvProvisioner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `python` instead of the detected host interpreter.
    #[must_use]
    pub fn with_python(python: impl Into<PathBuf>) -> Self {
        Self {
            python: Some(python.into()),
        }
    }

    fn python(&self) -> Result<PathBuf> {
        match &self.python {
            Some(python) => Ok(python.clone()),
            None => detect_interpreter().map(PathBuf::from),
        }
    }
}

impl Provisioner for VenvProvisioner {
    fn provision(&self, tool_root: &Path, variant: &ProvisionVariant) -> Result<ToolPaths> {
        let python = self.python()?;
        let mut command = Command::new(&python);
        command.args(["-m", "venv"]);
        if variant.system_site_packages {
            command.arg("--system-site-packages");
        }
        command.arg(tool_root);
        command.stdin(Stdio::null());
        tracing::debug!(python = %python.display(), root = %tool_root.display(), "creating venv");
        let output = command
            .output()
            .with_context(|| format!("failed to start {}", python.display()))?;
        if !output.status.success() {
            bail!(
                "{} -m venv exited with {}: {}",
                python.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let version = python_version(&python)?;
        let venv = VenvLayout::locate(tool_root, &version);
        let interpreter = venv.interpreter();
        if !interpreter.is_file() {
            bail!(
                "{} -m venv left no interpreter at {}",
                python.display(),
                interpreter.display()
            );
        }
        Ok(ToolPaths {
            tool_root: venv.root,
            lib_root: venv.lib,
            include_root: venv.include,
            bin_root: venv.bin,
        })
    }
}
