//! Throwaway projects for tests that install from version control.

use std::path::{Path, PathBuf};

use indoc::indoc;

use crate::core::{errors::HarnessError, runner::RunOptions, session::Session};

const PACKAGE: &str = "version_pkg";
const AUTHOR_NAME: &str = "Harness";
const AUTHOR_EMAIL: &str = "harness@example.invalid";

const MODULE_V1: &str = indoc! {r#"
    def main():
        print('0.1')
"#};

const MODULE_V2: &str = indoc! {r#"
    def main():
        print("some different version")
"#};

const SETUP_PY: &str = indoc! {r#"
    from setuptools import setup, find_packages
    setup(name='version_pkg',
          version='0.1',
          packages=find_packages(),
          py_modules=['version_pkg'],
          entry_points=dict(console_scripts=['version_pkg=version_pkg:main']))
"#};

fn git_options(repo: &Path) -> RunOptions {
    RunOptions::new()
        .cwd(repo)
        .env("GIT_AUTHOR_NAME", AUTHOR_NAME)
        .env("GIT_AUTHOR_EMAIL", AUTHOR_EMAIL)
        .env("GIT_COMMITTER_NAME", AUTHOR_NAME)
        .env("GIT_COMMITTER_EMAIL", AUTHOR_EMAIL)
        .expect_stderr()
}

/// Creates `scratch/version_pkg`, a git repository with one commit of a
/// minimal distribution at version 0.1.
///
/// # Errors
///
/// Returns an error when a file cannot be written or a git command fails.
pub fn create_test_package(session: &Session) -> Result<PathBuf, HarnessError> {
    let repo = session.mkdir(PACKAGE)?;
    session.write_file(format!("{PACKAGE}.py"), MODULE_V1, Some(repo.as_path()))?;
    session.write_file("setup.py", SETUP_PY, Some(repo.as_path()))?;
    let options = git_options(&repo);
    session.run("git", ["init", "-q"], &options)?;
    session.run("git", ["add", "."], &options)?;
    session.run("git", ["commit", "-q", "-am", "initial version"], &options)?;
    Ok(repo)
}

/// Commits a change to the module created by [`create_test_package`] so the
/// repository head no longer matches the first install. Untracked build
/// output left by earlier installs is removed first.
///
/// # Errors
///
/// Returns an error when the file cannot be written or the commit fails.
pub fn change_test_package_version(session: &Session, repo: &Path) -> Result<(), HarnessError> {
    session.write_file(format!("{PACKAGE}.py"), MODULE_V2, Some(repo))?;
    let options = git_options(repo);
    session.run("git", ["clean", "-qfdx"], &options)?;
    session.run("git", ["commit", "-q", "-am", "messed version"], &options)?;
    Ok(())
}
