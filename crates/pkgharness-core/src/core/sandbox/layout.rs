use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::errors::ProvisioningFailure;

/// Absolute paths of a provisioned interpreter installation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub tool_root: PathBuf,
    pub lib_root: PathBuf,
    pub include_root: PathBuf,
    pub bin_root: PathBuf,
}

/// [`ToolPaths`] expressed relative to the sandbox root, as stored in backups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeToolPaths {
    pub tool: Utf8PathBuf,
    pub lib: Utf8PathBuf,
    pub include: Utf8PathBuf,
    pub bin: Utf8PathBuf,
}

impl RelativeToolPaths {
    pub(crate) fn from_absolute(root: &Path, paths: &ToolPaths) -> Result<Self, ProvisioningFailure> {
        Ok(Self {
            tool: relpath(root, &paths.tool_root)?,
            lib: relpath(root, &paths.lib_root)?,
            include: relpath(root, &paths.include_root)?,
            bin: relpath(root, &paths.bin_root)?,
        })
    }
}

/// Path of `other` below `root`, failing when it escapes the root.
fn relpath(root: &Path, other: &Path) -> Result<Utf8PathBuf, ProvisioningFailure> {
    let outside = || ProvisioningFailure::PathOutsideRoot {
        path: other.display().to_string(),
        root: root.display().to_string(),
    };
    let rel = other.strip_prefix(root).map_err(|_| outside())?;
    let rel = Utf8PathBuf::from_path_buf(rel.to_path_buf()).map_err(|_| outside())?;
    if rel.as_str().is_empty() || rel.components().any(|c| c.as_str() == "..") {
        return Err(outside());
    }
    Ok(rel)
}

pub(crate) const TOOL_DIR: &str = ".virtualenv";
const SCRATCH_DIR: &str = "scratch";
const TEMP_DIR: &str = "tmp";

/// Where everything lives inside one sandbox root.
///
/// Paths returned as [`Utf8PathBuf`] are relative to [`SandboxLayout::root`]
/// and match the keys used in snapshots; `*_path` accessors are absolute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxLayout {
    root: PathBuf,
    tool_paths: RelativeToolPaths,
}

impl SandboxLayout {
    pub fn new(root: impl Into<PathBuf>, paths: &ToolPaths) -> Result<Self, ProvisioningFailure> {
        let root = root.into();
        let tool_paths = RelativeToolPaths::from_absolute(&root, paths)?;
        Ok(Self { root, tool_paths })
    }

    pub(crate) fn from_relative(root: impl Into<PathBuf>, tool_paths: RelativeToolPaths) -> Self {
        Self {
            root: root.into(),
            tool_paths,
        }
    }

    /// The tool root a provisioner is asked to populate.
    #[must_use]
    pub fn default_tool_root(root: &Path) -> PathBuf {
        root.join(TOOL_DIR)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn tool_paths(&self) -> &RelativeToolPaths {
        &self.tool_paths
    }

    /// Absolute form of a root-relative path.
    #[must_use]
    pub fn path(&self, rel: impl AsRef<Utf8Path>) -> PathBuf {
        self.root.join(rel.as_ref().as_std_path())
    }

    #[must_use]
    pub fn tool(&self) -> &Utf8Path {
        &self.tool_paths.tool
    }

    #[must_use]
    pub fn lib(&self) -> &Utf8Path {
        &self.tool_paths.lib
    }

    #[must_use]
    pub fn include(&self) -> &Utf8Path {
        &self.tool_paths.include
    }

    #[must_use]
    pub fn bin(&self) -> &Utf8Path {
        &self.tool_paths.bin
    }

    #[must_use]
    pub fn scratch(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(SCRATCH_DIR)
    }

    #[must_use]
    pub fn temp(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(TEMP_DIR)
    }

    #[must_use]
    pub fn site_packages(&self) -> Utf8PathBuf {
        self.lib().join("site-packages")
    }

    /// Checkout directory for editable installs.
    #[must_use]
    pub fn src(&self) -> Utf8PathBuf {
        self.tool().join("src")
    }

    #[must_use]
    pub fn user_base(&self) -> Utf8PathBuf {
        self.tool().join("user")
    }

    #[must_use]
    pub fn user_site(&self) -> Utf8PathBuf {
        let lib_name = self.lib().file_name().unwrap_or("lib");
        self.user_base()
            .join("lib")
            .join(lib_name)
            .join("site-packages")
    }

    /// Module the interpreter imports at startup; tests append setup code to it.
    #[must_use]
    pub fn startup_hook(&self) -> Utf8PathBuf {
        self.lib().join("sitecustomize.py")
    }

    #[must_use]
    pub fn scratch_path(&self) -> PathBuf {
        self.path(self.scratch())
    }

    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        self.path(self.temp())
    }

    #[must_use]
    pub fn bin_path(&self) -> PathBuf {
        self.path(self.bin())
    }

    #[must_use]
    pub fn lib_path(&self) -> PathBuf {
        self.path(self.lib())
    }

    #[must_use]
    pub fn user_base_path(&self) -> PathBuf {
        self.path(self.user_base())
    }

    #[must_use]
    pub fn user_site_path(&self) -> PathBuf {
        self.path(self.user_site())
    }

    #[must_use]
    pub fn startup_hook_path(&self) -> PathBuf {
        self.path(self.startup_hook())
    }

    #[must_use]
    pub fn interpreter_path(&self) -> PathBuf {
        self.bin_path()
            .join(pkgharness_python::interpreter_file_name())
    }
}

#[cfg(test)]
pub(crate) fn test_layout(root: &Path) -> SandboxLayout {
    let tool_root = SandboxLayout::default_tool_root(root);
    let paths = ToolPaths {
        lib_root: tool_root.join("lib").join("python3.12"),
        include_root: tool_root.join("include"),
        bin_root: tool_root.join("bin"),
        tool_root,
    };
    SandboxLayout::new(root, &paths).expect("test layout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_stay_relative_to_root() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        assert_eq!(layout.tool(), Utf8Path::new(".virtualenv"));
        assert_eq!(
            layout.site_packages(),
            Utf8PathBuf::from(".virtualenv/lib/python3.12/site-packages")
        );
        assert_eq!(
            layout.user_site(),
            Utf8PathBuf::from(".virtualenv/user/lib/python3.12/site-packages")
        );
        assert_eq!(layout.src(), Utf8PathBuf::from(".virtualenv/src"));
        assert_eq!(
            layout.startup_hook(),
            Utf8PathBuf::from(".virtualenv/lib/python3.12/sitecustomize.py")
        );
        assert_eq!(
            layout.scratch_path(),
            PathBuf::from("/cache/test_ws/s/scratch")
        );
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let root = Path::new("/cache/test_ws/s");
        let paths = ToolPaths {
            tool_root: root.join(".virtualenv"),
            lib_root: PathBuf::from("/usr/lib/python3.12"),
            include_root: root.join(".virtualenv/include"),
            bin_root: root.join(".virtualenv/bin"),
        };
        let err = SandboxLayout::new(root, &paths).expect_err("escaping lib");
        assert!(matches!(err, ProvisioningFailure::PathOutsideRoot { .. }));
        assert!(err.to_string().contains("/usr/lib/python3.12"));
    }

    #[test]
    fn parent_components_are_rejected() {
        let root = Path::new("/cache/test_ws/s");
        let err = relpath(root, &root.join("../d/bin")).expect_err("dotdot");
        assert_eq!(err.code(), "PH102");
    }
}
