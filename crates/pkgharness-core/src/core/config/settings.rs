use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::core::snapshot::SnapshotOptions;

pub(crate) const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        match self.var(key) {
            Some(value) => {
                let lowered = value.trim().to_ascii_lowercase();
                !matches!(lowered.as_str(), "0" | "false" | "no" | "off" | "")
            }
            None => false,
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).map(str::trim).filter(|value| !value.is_empty())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// The packaging tool exercised by the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUnderTest {
    /// Executable name looked up on the sandbox `PATH`.
    pub name: String,
    /// Importable module run by `python -m`/`runpy` when bootstrapping from source.
    pub module: String,
    /// Variables starting with this prefix (case-insensitive) are stripped from
    /// the inherited environment and used for the tool's own settings.
    pub env_prefix: String,
    /// Local checkout installed into every freshly built sandbox.
    pub source_dir: Option<PathBuf>,
}

impl ToolUnderTest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            module: name.replace('-', "_"),
            env_prefix: format!("{}_", name.replace('-', "_").to_ascii_uppercase()),
            name,
            source_dir: None,
        }
    }

    #[must_use]
    pub fn pip() -> Self {
        Self::new("pip")
    }

    #[must_use]
    pub fn with_source(mut self, source_dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(source_dir.into());
        self
    }

    /// Name of a tool-scoped variable, e.g. `PIP_NO_INPUT`.
    #[must_use]
    pub fn env_var(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.env_prefix)
    }

    #[must_use]
    pub fn owns_env_var(&self, key: &str) -> bool {
        key.to_ascii_lowercase()
            .starts_with(&self.env_prefix.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Parent of the live sandbox roots and their backups.
    pub cache_root: PathBuf,
    pub tool: ToolUnderTest,
    /// Local directory of distributions used as `--find-links`.
    pub packages_dir: Option<PathBuf>,
    pub snapshot: SnapshotOptions,
    /// Log argv, stdout and stderr of every run.
    pub verbose: bool,
    pub max_capture_bytes: usize,
}

impl HarnessConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            tool: ToolUnderTest::pip(),
            packages_dir: None,
            snapshot: SnapshotOptions::default(),
            verbose: false,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }

    #[must_use]
    pub fn with_tool(mut self, tool: ToolUnderTest) -> Self {
        self.tool = tool;
        self
    }

    #[must_use]
    pub fn with_packages_dir(mut self, packages_dir: impl Into<PathBuf>) -> Self {
        self.packages_dir = Some(packages_dir.into());
        self
    }

    /// Parent of the live sandbox roots, one per variant tag.
    #[must_use]
    pub fn live_dir(&self) -> PathBuf {
        self.cache_root.join("test_ws")
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.cache_root.join("test_ws_backup")
    }

    /// Builds a configuration from the current process environment.
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let cache_root = snapshot
            .non_empty("PKGHARNESS_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_root);
        let mut tool = snapshot
            .non_empty("PKGHARNESS_TOOL")
            .map_or_else(ToolUnderTest::pip, ToolUnderTest::new);
        tool.source_dir = snapshot.non_empty("PKGHARNESS_TOOL_SOURCE").map(PathBuf::from);
        Self {
            cache_root,
            tool,
            packages_dir: snapshot.non_empty("PKGHARNESS_PACKAGES").map(PathBuf::from),
            snapshot: SnapshotOptions {
                ignore_hidden: snapshot.flag_is_enabled("PKGHARNESS_IGNORE_HIDDEN"),
            },
            verbose: snapshot.flag_is_enabled("PKGHARNESS_VERBOSE"),
            max_capture_bytes: snapshot
                .non_empty("PKGHARNESS_MAX_CAPTURE_BYTES")
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES),
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs_next::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("pkgharness")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_pip() {
        let config = HarnessConfig::from_snapshot(&EnvSnapshot::testing(&[]));
        assert_eq!(config.tool, ToolUnderTest::pip());
        assert_eq!(config.tool.env_prefix, "PIP_");
        assert!(config.cache_root.ends_with("pkgharness"));
        assert!(config.live_dir().ends_with("pkgharness/test_ws"));
        assert!(config.backup_dir().ends_with("pkgharness/test_ws_backup"));
        assert!(!config.snapshot.ignore_hidden);
        assert_eq!(config.max_capture_bytes, DEFAULT_MAX_CAPTURE_BYTES);
    }

    #[test]
    fn reads_overrides_from_environment() {
        let snapshot = EnvSnapshot::testing(&[
            ("PKGHARNESS_CACHE", "/tmp/ph-cache"),
            ("PKGHARNESS_TOOL", "my-tool"),
            ("PKGHARNESS_TOOL_SOURCE", "/src/my-tool"),
            ("PKGHARNESS_PACKAGES", "/data/packages"),
            ("PKGHARNESS_IGNORE_HIDDEN", "1"),
            ("PKGHARNESS_VERBOSE", "yes"),
            ("PKGHARNESS_MAX_CAPTURE_BYTES", "2048"),
        ]);
        let config = HarnessConfig::from_snapshot(&snapshot);
        assert_eq!(config.cache_root, PathBuf::from("/tmp/ph-cache"));
        assert_eq!(config.tool.name, "my-tool");
        assert_eq!(config.tool.module, "my_tool");
        assert_eq!(config.tool.env_prefix, "MY_TOOL_");
        assert_eq!(config.tool.source_dir, Some(PathBuf::from("/src/my-tool")));
        assert_eq!(config.packages_dir, Some(PathBuf::from("/data/packages")));
        assert!(config.snapshot.ignore_hidden);
        assert!(config.verbose);
        assert_eq!(config.max_capture_bytes, 2048);
    }

    #[test]
    fn flags_handle_common_falsey_values() {
        for value in ["0", "false", "no", "off", ""] {
            let snapshot = EnvSnapshot::testing(&[("PKGHARNESS_VERBOSE", value)]);
            assert!(!HarnessConfig::from_snapshot(&snapshot).verbose, "{value:?}");
        }
    }

    #[test]
    fn tool_owns_prefixed_variables_case_insensitively() {
        let tool = ToolUnderTest::pip();
        assert!(tool.owns_env_var("PIP_INDEX_URL"));
        assert!(tool.owns_env_var("pip_no_input"));
        assert!(!tool.owns_env_var("PIPENV_VENV"));
        assert!(!tool.owns_env_var("PYTHONPATH"));
        assert_eq!(tool.env_var("NO_INPUT"), "PIP_NO_INPUT");
    }
}
