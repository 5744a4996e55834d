use std::{collections::BTreeMap, env, path::Path};

use anyhow::{anyhow, Context, Result};

use super::layout::SandboxLayout;
use crate::core::config::ToolUnderTest;

/// Builds the environment every command in a sandbox runs with.
///
/// Starts from `inherited` minus the tool's own settings and `PYTHONPATH`,
/// then pins the tool to the sandbox.
pub(crate) fn sandbox_env<'a>(
    inherited: impl IntoIterator<Item = (&'a String, &'a String)>,
    tool: &ToolUnderTest,
    layout: &SandboxLayout,
    download_cache: &Path,
) -> Result<BTreeMap<String, String>> {
    let mut vars: BTreeMap<String, String> = inherited
        .into_iter()
        .filter(|(key, _)| !tool.owns_env_var(key) && !key.eq_ignore_ascii_case("PYTHONPATH"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let path_key = vars
        .keys()
        .find(|key| key.eq_ignore_ascii_case("PATH"))
        .cloned()
        .unwrap_or_else(|| "PATH".to_string());
    let inherited_path = vars.remove(&path_key).unwrap_or_default();
    let mut entries = vec![layout.bin_path()];
    entries.extend(env::split_paths(&inherited_path));
    let joined = env::join_paths(entries)
        .context("sandbox bin dir cannot be placed on PATH")?
        .into_string()
        .map_err(|_| anyhow!("PATH is not valid UTF-8"))?;
    vars.insert(path_key, joined);

    let log_file = layout.root().join(format!("{}-log.txt", tool.name));
    let temp = layout.temp_path();
    vars.insert(tool.env_var("NO_INPUT"), "1".to_string());
    vars.insert(tool.env_var("LOG_FILE"), display(&log_file));
    vars.insert(tool.env_var("DOWNLOAD_CACHE"), display(download_cache));
    vars.insert("PYTHONUSERBASE".to_string(), display(&layout.user_base_path()));
    for key in ["TMPDIR", "TMP", "TEMP"] {
        vars.insert(key.to_string(), display(&temp));
    }
    Ok(vars)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::layout::test_layout;

    fn inherited(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn strips_tool_settings_and_pythonpath() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        let vars = inherited(&[
            ("PIP_INDEX_URL", "https://example.invalid"),
            ("pip_require_virtualenv", "1"),
            ("PYTHONPATH", "/elsewhere"),
            ("HOME", "/home/tester"),
        ]);
        let env = sandbox_env(
            vars.iter().map(|(k, v)| (k, v)),
            &ToolUnderTest::pip(),
            &layout,
            Path::new("/tmp/downloads"),
        )
        .expect("env");
        assert!(!env.contains_key("PIP_INDEX_URL"));
        assert!(!env.contains_key("pip_require_virtualenv"));
        assert!(!env.contains_key("PYTHONPATH"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/tester"));
        assert_eq!(env.get("PIP_NO_INPUT").map(String::as_str), Some("1"));
        assert_eq!(
            env.get("PIP_DOWNLOAD_CACHE").map(String::as_str),
            Some("/tmp/downloads")
        );
    }

    #[cfg(unix)]
    #[test]
    fn pins_paths_into_the_sandbox() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        let vars = inherited(&[("PATH", "/usr/bin:/bin")]);
        let env = sandbox_env(
            vars.iter().map(|(k, v)| (k, v)),
            &ToolUnderTest::pip(),
            &layout,
            Path::new("/tmp/downloads"),
        )
        .expect("env");
        assert_eq!(
            env.get("PATH").map(String::as_str),
            Some("/cache/test_ws/s/.virtualenv/bin:/usr/bin:/bin")
        );
        assert_eq!(
            env.get("PIP_LOG_FILE").map(String::as_str),
            Some("/cache/test_ws/s/pip-log.txt")
        );
        assert_eq!(
            env.get("PYTHONUSERBASE").map(String::as_str),
            Some("/cache/test_ws/s/.virtualenv/user")
        );
        for key in ["TMPDIR", "TMP", "TEMP"] {
            assert_eq!(env.get(key).map(String::as_str), Some("/cache/test_ws/s/tmp"));
        }
    }
}
