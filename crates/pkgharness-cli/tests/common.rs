#![allow(dead_code)]

use std::{fs, path::Path};

use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
use tempfile::TempDir;

pub fn harness_cmd(cache: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("pkgharness");
    cmd.env("PKGHARNESS_CACHE", cache);
    cmd.env("NO_COLOR", "1");
    cmd
}

pub fn stdout_of(assert: &Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout")
}

/// A small tree with a nested file, an empty dir and a hidden file.
pub fn sample_tree() -> TempDir {
    let temp = tempfile::Builder::new()
        .prefix("pkgharness-cli-")
        .tempdir()
        .expect("tempdir");
    fs::create_dir_all(temp.path().join("pkg")).expect("pkg");
    fs::create_dir_all(temp.path().join("empty")).expect("empty");
    fs::write(temp.path().join("pkg/__init__.py"), b"x = 1\n").expect("init");
    fs::write(temp.path().join(".hidden"), b"h").expect("hidden");
    temp
}
