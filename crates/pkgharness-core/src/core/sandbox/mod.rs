//! Isolated roots the tool under test runs in.
//!
//! A sandbox is built once per [`ProvisionVariant`], copied into the
//! [`BackupStore`], and restored from there by later sessions.

mod backup;
mod build;
mod env;
mod errors;
pub(crate) mod hook;
pub(crate) mod layout;
mod provision;
mod time;

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::core::{
    config::{EnvSnapshot, HarnessConfig, ToolUnderTest},
    snapshot::SnapshotOptions,
};

pub use backup::{BackupManifest, BackupStore};
pub(crate) use build::build_sandbox;
pub use errors::ProvisioningFailure;
pub use hook::invalidate_bytecode;
pub use layout::{RelativeToolPaths, SandboxLayout, ToolPaths};
pub use provision::{Provisioner, VenvProvisioner};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerBackend {
    #[default]
    Setuptools,
    Distribute,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvisionVariant {
    pub installer: InstallerBackend,
    pub system_site_packages: bool,
}

impl ProvisionVariant {
    #[must_use]
    pub fn setuptools() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn distribute() -> Self {
        Self {
            installer: InstallerBackend::Distribute,
            system_site_packages: false,
        }
    }

    #[must_use]
    pub fn with_system_site_packages(mut self) -> Self {
        self.system_site_packages = true;
        self
    }

    /// Short key naming the live root and the backup.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match (self.installer, self.system_site_packages) {
            (InstallerBackend::Setuptools, false) => "s",
            (InstallerBackend::Distribute, false) => "d",
            (InstallerBackend::Setuptools, true) => "s-sys",
            (InstallerBackend::Distribute, true) => "d-sys",
        }
    }

    /// Packages installed into every freshly built sandbox of this variant.
    #[must_use]
    pub fn baseline_packages(&self) -> &'static [&'static str] {
        match self.installer {
            InstallerBackend::Setuptools => &["setuptools"],
            InstallerBackend::Distribute => &[],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SandboxOptions {
    pub variant: ProvisionVariant,
    /// Rederive the live root from the backup even when it could be reused.
    pub fresh: bool,
    /// Drop the backup and build from scratch.
    pub force_rebuild: bool,
    /// Code appended to the startup hook of the new sandbox.
    pub startup_hook: Option<String>,
}

impl SandboxOptions {
    #[must_use]
    pub fn new(variant: ProvisionVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }

    #[must_use]
    pub fn force_rebuild(mut self) -> Self {
        self.force_rebuild = true;
        self
    }

    #[must_use]
    pub fn startup_hook(mut self, snippet: impl Into<String>) -> Self {
        self.startup_hook = Some(snippet.into());
        self
    }

    /// Whether a live sandbox of `variant` can be handed out as is.
    pub(crate) fn reuses(&self, variant: &ProvisionVariant) -> bool {
        self.variant == *variant && !self.fresh && !self.force_rebuild && self.startup_hook.is_none()
    }
}

/// A provisioned root plus the environment commands run with inside it.
#[derive(Clone, Debug)]
pub struct Sandbox {
    variant: ProvisionVariant,
    layout: SandboxLayout,
    env: BTreeMap<String, String>,
    tool: ToolUnderTest,
    snapshot_options: SnapshotOptions,
    max_capture_bytes: usize,
    verbose: bool,
}

impl Sandbox {
    pub(crate) fn new(
        variant: ProvisionVariant,
        layout: SandboxLayout,
        config: &HarnessConfig,
        download_cache: &Path,
    ) -> Result<Self, ProvisioningFailure> {
        let inherited = EnvSnapshot::capture();
        let env = env::sandbox_env(inherited.iter(), &config.tool, &layout, download_cache)
            .map_err(|err| ProvisioningFailure::step("environment", err))?;
        Ok(Self {
            variant,
            layout,
            env,
            tool: config.tool.clone(),
            snapshot_options: config.snapshot,
            max_capture_bytes: config.max_capture_bytes,
            verbose: config.verbose,
        })
    }

    #[must_use]
    pub fn variant(&self) -> ProvisionVariant {
        self.variant
    }

    #[must_use]
    pub fn layout(&self) -> &SandboxLayout {
        &self.layout
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    #[must_use]
    pub fn tool(&self) -> &ToolUnderTest {
        &self.tool
    }

    #[must_use]
    pub fn snapshot_options(&self) -> SnapshotOptions {
        self.snapshot_options
    }

    pub(crate) fn max_capture_bytes(&self) -> usize {
        self.max_capture_bytes
    }

    pub(crate) fn verbose(&self) -> bool {
        self.verbose
    }

    /// Steps shared by built and restored sandboxes: a fresh startup hook with
    /// the caller's snippet, and an existing temp dir.
    pub(crate) fn prepare(&self, startup_hook: Option<&str>) -> Result<(), ProvisioningFailure> {
        let hook_path = self.layout.startup_hook_path();
        hook::create_empty(&hook_path)
            .map_err(|err| ProvisioningFailure::step("startup hook", err))?;
        if let Some(snippet) = startup_hook {
            hook::append(&hook_path, snippet)
                .map_err(|err| ProvisioningFailure::step("startup hook", err))?;
        }
        let temp = self.layout.temp_path();
        std::fs::create_dir_all(&temp)
            .map_err(|err| ProvisioningFailure::step("temp dir", anyhow::Error::new(err)))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_sandbox(root: &Path) -> Sandbox {
    let layout = layout::test_layout(root);
    std::fs::create_dir_all(layout.scratch_path()).expect("scratch");
    let config = HarnessConfig::new(root.join("cache"));
    let sandbox = Sandbox::new(
        ProvisionVariant::default(),
        layout,
        &config,
        &root.join("downloads"),
    )
    .expect("sandbox");
    sandbox.prepare(None).expect("prepare");
    sandbox
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_tags_are_distinct() {
        let tags: Vec<&str> = [
            ProvisionVariant::setuptools(),
            ProvisionVariant::distribute(),
            ProvisionVariant::setuptools().with_system_site_packages(),
            ProvisionVariant::distribute().with_system_site_packages(),
        ]
        .iter()
        .map(ProvisionVariant::tag)
        .collect();
        assert_eq!(tags, vec!["s", "d", "s-sys", "d-sys"]);
        assert_eq!(ProvisionVariant::default().baseline_packages(), ["setuptools"]);
        assert!(ProvisionVariant::distribute().baseline_packages().is_empty());
    }

    #[test]
    fn reuse_requires_same_variant_and_no_overrides() {
        let variant = ProvisionVariant::default();
        assert!(SandboxOptions::new(variant).reuses(&variant));
        assert!(!SandboxOptions::new(variant).fresh().reuses(&variant));
        assert!(!SandboxOptions::new(variant).force_rebuild().reuses(&variant));
        assert!(!SandboxOptions::new(variant)
            .startup_hook("import os")
            .reuses(&variant));
        assert!(!SandboxOptions::new(ProvisionVariant::distribute()).reuses(&variant));
    }

    #[test]
    fn prepare_writes_hook_and_temp_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = test_sandbox(temp.path());
        sandbox.prepare(Some("    import os\n")).expect("prepare");
        let hook = std::fs::read_to_string(sandbox.layout().startup_hook_path()).expect("hook");
        assert_eq!(hook, "\nimport os\n");
        assert!(sandbox.layout().temp_path().is_dir());
    }
}
