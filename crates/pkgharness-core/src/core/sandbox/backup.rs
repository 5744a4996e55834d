use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    errors::ProvisioningFailure,
    layout::{RelativeToolPaths, SandboxLayout},
    time::backup_timestamp_string,
    ProvisionVariant,
};
use crate::core::fs::{copy_tree, remove_dir_all_writable};

pub(crate) const BACKUP_VERSION: u32 = 1;
const MANIFEST: &str = "manifest.json";
const TREE: &str = "tree";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub variant: String,
    pub backup_version: u32,
    pub harness_version: String,
    pub created_at: String,
    /// Name of the tool the backup was built for.
    pub tool: String,
    pub tool_paths: RelativeToolPaths,
}

/// Fully provisioned sandbox roots kept per variant so later sessions can skip
/// the build.
#[derive(Clone, Debug)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn variant_dir(&self, variant: &ProvisionVariant) -> PathBuf {
        self.root.join(variant.tag())
    }

    fn manifest_path(&self, variant: &ProvisionVariant) -> PathBuf {
        self.variant_dir(variant).join(MANIFEST)
    }

    fn tree_path(&self, variant: &ProvisionVariant) -> PathBuf {
        self.variant_dir(variant).join(TREE)
    }

    /// Returns the manifest of a usable backup for `variant` built for `tool`.
    ///
    /// Unreadable or incompatible backups are logged and treated as missing.
    pub fn lookup(&self, variant: &ProvisionVariant, tool: &str) -> Option<BackupManifest> {
        let path = self.manifest_path(variant);
        if !path.exists() {
            return None;
        }
        match read_manifest(&path) {
            Ok(manifest) => {
                if let Some(reason) = incompatibility(&manifest, variant, tool) {
                    warn!(path = %path.display(), reason, "ignoring stale sandbox backup");
                    return None;
                }
                if !self.tree_path(variant).is_dir() {
                    warn!(path = %path.display(), "sandbox backup has no tree");
                    return None;
                }
                Some(manifest)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "ignoring unreadable sandbox backup");
                None
            }
        }
    }

    pub fn invalidate(&self, variant: &ProvisionVariant) -> Result<(), ProvisioningFailure> {
        let dir = self.variant_dir(variant);
        remove_dir_all_writable(&dir)
            .map_err(|err| ProvisioningFailure::backup(variant.tag(), "invalidated", err))?;
        debug!(variant = variant.tag(), "invalidated sandbox backup");
        Ok(())
    }

    /// Removes every backup, read-only entries included, and returns the tags
    /// that were present.
    pub fn clear(&self) -> Result<Vec<String>, ProvisioningFailure> {
        let tags = self.variants();
        remove_dir_all_writable(&self.root)
            .map_err(|err| ProvisioningFailure::backup("all", "cleared", err))?;
        debug!(count = tags.len(), "cleared sandbox backups");
        Ok(tags)
    }

    /// Copies a provisioned root into the store. The manifest is written last
    /// so a partial copy is never mistaken for a valid backup.
    pub fn save(
        &self,
        variant: &ProvisionVariant,
        tool: &str,
        layout: &SandboxLayout,
    ) -> Result<BackupManifest, ProvisioningFailure> {
        let save = || -> Result<BackupManifest> {
            remove_dir_all_writable(&self.variant_dir(variant))?;
            copy_tree(layout.root(), &self.tree_path(variant))?;
            let manifest = BackupManifest {
                variant: variant.tag().to_string(),
                backup_version: BACKUP_VERSION,
                harness_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: backup_timestamp_string(),
                tool: tool.to_string(),
                tool_paths: layout.tool_paths().clone(),
            };
            let path = self.manifest_path(variant);
            fs::write(&path, serde_json::to_vec_pretty(&manifest)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(manifest)
        };
        let manifest = save().map_err(|err| ProvisioningFailure::backup(variant.tag(), "saved", err))?;
        info!(variant = variant.tag(), path = %self.variant_dir(variant).display(), "saved sandbox backup");
        Ok(manifest)
    }

    /// Replaces `dest` with a copy of the backup and returns its layout.
    pub fn restore(
        &self,
        variant: &ProvisionVariant,
        manifest: &BackupManifest,
        dest: &Path,
    ) -> Result<SandboxLayout, ProvisioningFailure> {
        let restore = || -> Result<()> {
            remove_dir_all_writable(dest)?;
            copy_tree(&self.tree_path(variant), dest)
        };
        restore().map_err(|err| ProvisioningFailure::backup(variant.tag(), "restored", err))?;
        debug!(variant = variant.tag(), dest = %dest.display(), "restored sandbox from backup");
        Ok(SandboxLayout::from_relative(dest, manifest.tool_paths.clone()))
    }

    /// Tags of every variant with a manifest on disk.
    pub fn variants(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut tags: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().join(MANIFEST).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        tags.sort();
        tags
    }
}

fn read_manifest(path: &Path) -> Result<BackupManifest> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn incompatibility(
    manifest: &BackupManifest,
    variant: &ProvisionVariant,
    tool: &str,
) -> Option<&'static str> {
    if manifest.backup_version != BACKUP_VERSION {
        Some("backup version mismatch")
    } else if manifest.harness_version != env!("CARGO_PKG_VERSION") {
        Some("harness version mismatch")
    } else if manifest.variant != variant.tag() {
        Some("variant mismatch")
    } else if manifest.tool != tool {
        Some("tool mismatch")
    } else {
        None
    }
}
