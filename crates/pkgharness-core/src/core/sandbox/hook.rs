//! The interpreter's startup hook (`sitecustomize.py`) inside a sandbox.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use unindent::unindent;

pub(crate) fn create_empty(hook: &Path) -> Result<()> {
    if let Some(parent) = hook.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(hook, b"").with_context(|| format!("failed to write {}", hook.display()))?;
    invalidate_bytecode(hook)?;
    Ok(())
}

/// Appends a dedented snippet to the hook and drops any compiled copy of it.
pub(crate) fn append(hook: &Path, snippet: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(hook)
        .with_context(|| format!("failed to open {}", hook.display()))?;
    let mut body = dedent(snippet);
    if !body.ends_with('\n') {
        body.push('\n');
    }
    write!(file, "\n{body}")
        .with_context(|| format!("failed to append to {}", hook.display()))?;
    drop(file);
    invalidate_bytecode(hook)?;
    Ok(())
}

/// Removes bytecode compiled from `source`: `__pycache__/<stem>.*.pyc` and the
/// legacy sibling `<file>c`. Returns what was removed.
///
/// # Errors
///
/// Returns an error when a stale file exists but cannot be removed.
pub fn invalidate_bytecode(source: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let Some(file_name) = source.file_name().and_then(|name| name.to_str()) else {
        return Ok(removed);
    };
    let stem = file_name.strip_suffix(".py").unwrap_or(file_name);
    let parent = source.parent().unwrap_or_else(|| Path::new("."));

    let mut stale = vec![parent.join(format!("{file_name}c"))];
    let cache = parent.join("__pycache__");
    if let Ok(entries) = fs::read_dir(&cache) {
        let prefix = format!("{stem}.");
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".pyc") {
                stale.push(entry.path());
            }
        }
    }
    for path in stale {
        if path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Strips the indentation shared by every non-blank line, first line
/// included. Text whose lines disagree on their indentation characters is
/// returned unchanged.
pub(crate) fn dedent(text: &str) -> String {
    let margins: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| &line[..line.len() - line.trim_start().len()])
        .collect();
    let Some(shortest) = margins.iter().min_by_key(|margin| margin.len()) else {
        return text.to_string();
    };
    if margins.iter().any(|margin| !margin.starts_with(*shortest)) {
        return text.to_string();
    }
    // unindent leaves the first line alone unless the text opens with a newline
    if text.starts_with('\n') {
        unindent(text)
    } else {
        unindent(&format!("\n{text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedent_strips_common_margin() {
        let snippet = "\n    import os\n    if True:\n        os.environ['X'] = '1'\n";
        assert_eq!(
            dedent(snippet),
            "import os\nif True:\n    os.environ['X'] = '1'\n"
        );
        assert_eq!(dedent("  a\n\n  b\n"), "a\n\nb\n");
        assert_eq!(dedent("flat"), "flat");
    }

    #[test]
    fn dedent_handles_multibyte_indentation() {
        let text = "  a\n\u{3000}b\n";
        assert_eq!(dedent(text), text);
    }

    #[test]
    fn dedent_keeps_mixed_tabs_and_spaces() {
        let text = "    if x:\n\t\ty()\n";
        assert_eq!(dedent(text), text);
    }

    #[test]
    fn append_accumulates_and_invalidates_bytecode() {
        let temp = tempfile::tempdir().expect("tempdir");
        let hook = temp.path().join("sitecustomize.py");
        create_empty(&hook).expect("create");
        fs::create_dir_all(temp.path().join("__pycache__")).expect("cache dir");
        let compiled = temp
            .path()
            .join("__pycache__")
            .join("sitecustomize.cpython-312.pyc");
        let unrelated = temp.path().join("__pycache__").join("other.cpython-312.pyc");
        fs::write(&compiled, b"x").expect("pyc");
        fs::write(&unrelated, b"x").expect("pyc");
        fs::write(temp.path().join("sitecustomize.pyc"), b"x").expect("legacy pyc");

        append(&hook, "  import sys\n  sys.flag = 1\n").expect("append");
        append(&hook, "x = 2").expect("append again");

        let contents = fs::read_to_string(&hook).expect("read");
        assert_eq!(contents, "\nimport sys\nsys.flag = 1\n\nx = 2\n");
        assert!(!compiled.exists());
        assert!(!temp.path().join("sitecustomize.pyc").exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn invalidate_without_cache_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let removed = invalidate_bytecode(&temp.path().join("sitecustomize.py")).expect("ok");
        assert!(removed.is_empty());
    }
}
