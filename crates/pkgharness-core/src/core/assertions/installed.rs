use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use super::{AssertionFailure, InstallViolation};
use crate::core::{diff::normalize_relative, runner::RunResult, sandbox::SandboxLayout};

const LINK_MARKER: char = '.';
const PTH_FILE: &str = "easy-install.pth";

/// What an install run is expected to have left behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallExpectation {
    /// Installed in develop mode from `<src>/<name>` rather than copied into
    /// site-packages.
    pub editable: bool,
    /// Paths below the package dir that must have been created.
    pub with_files: Vec<Utf8PathBuf>,
    /// Paths below the package dir that must not have been created; `.`
    /// means the package dir itself.
    pub without_files: Vec<Utf8PathBuf>,
    pub without_egg_link: bool,
    /// Look for the link and `easy-install.pth` in the user site.
    pub use_user_site: bool,
}

impl Default for InstallExpectation {
    fn default() -> Self {
        Self {
            editable: true,
            with_files: Vec::new(),
            without_files: Vec::new(),
            without_egg_link: false,
            use_user_site: false,
        }
    }
}

impl InstallExpectation {
    #[must_use]
    pub fn editable() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn non_editable() -> Self {
        Self {
            editable: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.with_files.extend(files.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn without_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.without_files.extend(files.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn without_egg_link(mut self) -> Self {
        self.without_egg_link = true;
        self
    }

    #[must_use]
    pub fn user_site(mut self) -> Self {
        self.use_user_site = true;
        self
    }

    fn expects_link(&self) -> bool {
        self.editable && !self.without_egg_link
    }
}

/// Checks the artifacts an install of `package` left in `result`.
///
/// # Errors
///
/// Returns [`AssertionFailure::Install`] carrying every violation found.
pub fn assert_installed(
    layout: &SandboxLayout,
    result: &RunResult,
    package: &str,
    expectation: &InstallExpectation,
) -> Result<(), AssertionFailure> {
    let lowered = package.to_lowercase();
    let package_dir = if expectation.editable {
        layout.src().join(&lowered)
    } else {
        layout.site_packages().join(&lowered)
    };
    let site = if expectation.use_user_site {
        layout.user_site()
    } else {
        layout.site_packages()
    };
    let link = site.join(format!("{package}.egg-link"));
    let expects_link = expectation.expects_link();
    let created = result.files_created();
    let mut violations = Vec::new();

    match (expects_link, created.contains_key(&link)) {
        (false, true) => violations.push(InstallViolation::UnexpectedLink { path: link.clone() }),
        (true, false) => violations.push(InstallViolation::MissingLink { path: link.clone() }),
        (true, true) => {
            let expected_ending = layout.path(&package_dir).display().to_string();
            match fs::read_to_string(layout.path(&link)) {
                Ok(contents) if link_points_at(&contents, &expected_ending) => {}
                Ok(contents) => violations.push(InstallViolation::LinkContents {
                    path: link.clone(),
                    expected_ending,
                    actual: contents,
                }),
                Err(err) => violations.push(InstallViolation::LinkUnreadable {
                    path: link.clone(),
                    error: err.to_string(),
                }),
            }
        }
        (false, false) => {}
    }

    let pth = site.join(PTH_FILE);
    if result.files_updated().contains_key(&pth) != expects_link {
        violations.push(InstallViolation::PthFile {
            path: pth,
            expected_updated: expects_link,
        });
    }

    let expect_dir = !expectation
        .without_files
        .iter()
        .any(|path| normalize_relative(path).as_str().is_empty());
    if created.contains_key(&package_dir) != expect_dir {
        violations.push(InstallViolation::PackageDir {
            path: package_dir.clone(),
            expected_created: expect_dir,
            created: created.keys().cloned().collect(),
        });
    }

    for file in &expectation.with_files {
        let path = below(&package_dir, file);
        if !created.contains_key(&path) {
            violations.push(InstallViolation::MissingFile { path });
        }
    }
    for file in &expectation.without_files {
        let path = below(&package_dir, file);
        if path != package_dir && created.contains_key(&path) {
            violations.push(InstallViolation::UnexpectedFile { path });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AssertionFailure::Install {
            package: package.to_string(),
            violations,
        })
    }
}

fn below(package_dir: &Utf8Path, file: &Utf8Path) -> Utf8PathBuf {
    normalize_relative(&package_dir.join(file))
}

/// A develop-mode link holds the project dir followed by a line with `.`.
fn link_points_at(contents: &str, expected_ending: &str) -> bool {
    let Some(rest) = contents.trim().strip_suffix(LINK_MARKER) else {
        return false;
    };
    rest.trim().ends_with(expected_ending)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::core::{sandbox::layout::test_layout, snapshot::FileRecord, snapshot::Snapshot};

    const SITE: &str = ".virtualenv/lib/python3.12/site-packages";

    fn result_with(before: Vec<FileRecord>, after: Vec<FileRecord>) -> RunResult {
        RunResult::from_states(Snapshot::from_records(before), Snapshot::from_records(after))
    }

    fn editable_demo_result(root: &Path, write_link: bool) -> RunResult {
        let layout = test_layout(root);
        let link = layout.site_packages().join("demo.egg-link");
        if write_link {
            let link_path = layout.path(&link);
            fs::create_dir_all(link_path.parent().expect("parent")).expect("site dir");
            let package_dir = layout.path(layout.src().join("demo"));
            fs::write(&link_path, format!("{}\n.", package_dir.display())).expect("link");
        }
        let pth = format!("{SITE}/easy-install.pth");
        let mut after = vec![
            FileRecord::file(pth.as_str(), 20),
            FileRecord::dir(".virtualenv/src/demo"),
            FileRecord::file(".virtualenv/src/demo/setup.py", 100),
        ];
        if write_link {
            after.push(FileRecord::file(link.as_str(), 40));
        }
        result_with(vec![FileRecord::file(pth.as_str(), 0)], after)
    }

    #[test]
    fn editable_install_with_link_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = test_layout(temp.path());
        let result = editable_demo_result(temp.path(), true);
        assert_installed(
            &layout,
            &result,
            "demo",
            &InstallExpectation::editable().with_files(["setup.py"]),
        )
        .expect("installed");
    }

    #[test]
    fn missing_link_names_the_link_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = test_layout(temp.path());
        let result = editable_demo_result(temp.path(), false);
        let err = assert_installed(&layout, &result, "demo", &InstallExpectation::default())
            .expect_err("link missing");
        let AssertionFailure::Install { violations, .. } = &err else {
            panic!("wrong failure {err:?}");
        };
        assert_eq!(
            violations,
            &vec![InstallViolation::MissingLink {
                path: Utf8PathBuf::from(format!("{SITE}/demo.egg-link")),
            }]
        );
        assert!(err.to_string().contains("demo.egg-link"));
    }

    #[test]
    fn link_must_end_with_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = test_layout(temp.path());
        let result = editable_demo_result(temp.path(), true);
        let link_path = layout.path(layout.site_packages().join("demo.egg-link"));
        fs::write(&link_path, "/somewhere/else\n").expect("rewrite link");

        let err = assert_installed(&layout, &result, "demo", &InstallExpectation::default())
            .expect_err("bad link");
        let AssertionFailure::Install { violations, .. } = err else {
            panic!("wrong failure");
        };
        assert!(matches!(
            violations.as_slice(),
            [InstallViolation::LinkContents { .. }]
        ));
    }

    #[test]
    fn non_editable_rejects_unwanted_files() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        let result = result_with(
            Vec::new(),
            vec![
                FileRecord::dir(format!("{SITE}/demo")),
                FileRecord::file(format!("{SITE}/demo/__init__.py"), 1),
                FileRecord::file(format!("{SITE}/demo/setup.py"), 1),
            ],
        );
        let expectation = InstallExpectation::non_editable().without_files(["setup.py"]);
        let err = assert_installed(&layout, &result, "Demo", &expectation).expect_err("setup.py");
        let AssertionFailure::Install { violations, .. } = err else {
            panic!("wrong failure");
        };
        assert_eq!(
            violations,
            vec![InstallViolation::UnexpectedFile {
                path: Utf8PathBuf::from(format!("{SITE}/demo/setup.py")),
            }]
        );
    }

    #[test]
    fn violations_are_collected_not_short_circuited() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        let result = result_with(Vec::new(), Vec::new());
        let expectation = InstallExpectation::default().with_files(["demo/__init__.py"]);
        let err = assert_installed(&layout, &result, "demo", &expectation).expect_err("nothing");
        let AssertionFailure::Install { violations, .. } = err else {
            panic!("wrong failure");
        };
        assert_eq!(violations.len(), 4);
        assert!(matches!(violations[0], InstallViolation::MissingLink { .. }));
        assert!(matches!(
            violations[1],
            InstallViolation::PthFile {
                expected_updated: true,
                ..
            }
        ));
        assert!(matches!(
            violations[2],
            InstallViolation::PackageDir {
                expected_created: true,
                ..
            }
        ));
        assert!(matches!(violations[3], InstallViolation::MissingFile { .. }));
    }

    #[test]
    fn dot_in_without_files_expects_no_package_dir() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        let result = result_with(Vec::new(), Vec::new());
        let expectation = InstallExpectation::non_editable().without_files(["."]);
        assert_installed(&layout, &result, "demo", &expectation).expect("nothing expected");
    }

    #[test]
    fn user_site_moves_link_and_pth_checks() {
        let layout = test_layout(Path::new("/cache/test_ws/s"));
        let user_site = layout.user_site();
        let result = result_with(
            vec![FileRecord::file(user_site.join("easy-install.pth"), 0)],
            vec![
                FileRecord::file(user_site.join("easy-install.pth"), 0),
                FileRecord::dir(".virtualenv/src/demo"),
            ],
        );
        let expectation = InstallExpectation::default().user_site().without_egg_link();
        assert_installed(&layout, &result, "demo", &expectation).expect("no link expected");
    }
}
