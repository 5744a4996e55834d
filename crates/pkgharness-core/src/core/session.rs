//! The explicit owner of the live sandbox.
//!
//! A [`Harness`] holds at most one [`Session`] at a time. Acquiring a session
//! for the same variant hands back the live one; anything else tears it down
//! and derives a new sandbox from the backup store, building one if needed.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use tracing::{debug, info};
use url::Url;

use crate::core::{
    assertions::{assert_installed, AssertionFailure, InstallExpectation},
    config::HarnessConfig,
    errors::HarnessError,
    fs::{remove_best_effort, HarnessTempDir},
    runner::{run, RunOptions, RunResult},
    sandbox::{
        build_sandbox, hook, BackupStore, ProvisionVariant, Provisioner, Sandbox, SandboxLayout,
        SandboxOptions, VenvProvisioner,
    },
    snapshot::{snapshot, Snapshot},
};

pub struct Harness {
    config: HarnessConfig,
    provisioner: Box<dyn Provisioner>,
    backups: BackupStore,
    download_cache: HarnessTempDir,
    session: Option<Session>,
}

impl Harness {
    /// Relative cache and tool source paths are resolved against the current
    /// directory, since sandboxed commands run from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error when a path cannot be resolved or the download cache
    /// dir cannot be created.
    pub fn new(
        mut config: HarnessConfig,
        provisioner: impl Provisioner + 'static,
    ) -> Result<Self, HarnessError> {
        config.cache_root = absolute(&config.cache_root)?;
        if let Some(source) = config.tool.source_dir.take() {
            config.tool.source_dir = Some(absolute(&source)?);
        }
        let backups = BackupStore::new(config.backup_dir());
        let download_cache = HarnessTempDir::new("pkgharness-downloads-")?;
        Ok(Self {
            config,
            provisioner: Box::new(provisioner),
            backups,
            download_cache,
            session: None,
        })
    }

    /// A harness configured from `PKGHARNESS_*` variables that provisions
    /// with `python -m venv`.
    ///
    /// # Errors
    ///
    /// Returns an error when the download cache dir cannot be created.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::new(HarnessConfig::from_env(), VenvProvisioner::new())
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    #[must_use]
    pub fn live_root(&self, variant: &ProvisionVariant) -> PathBuf {
        self.config.live_dir().join(variant.tag())
    }

    /// Hands out a session for `options.variant`, reusing the live sandbox
    /// when the options allow it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Provisioning`] when no sandbox could be built or
    /// restored.
    pub fn acquire(&mut self, options: &SandboxOptions) -> Result<&mut Session, HarnessError> {
        let reusable = self
            .session
            .as_ref()
            .is_some_and(|session| options.reuses(&session.sandbox.variant()));
        if reusable {
            debug!(variant = options.variant.tag(), "reusing live sandbox");
        } else {
            self.release();
            if options.force_rebuild {
                self.backups.invalidate(&options.variant)?;
            }
            let derived = self.derive(&options.variant).and_then(|sandbox| {
                sandbox.prepare(options.startup_hook.as_deref())?;
                Ok(sandbox)
            });
            let sandbox = match derived {
                Ok(sandbox) => sandbox,
                Err(err) => {
                    remove_best_effort(&self.live_root(&options.variant), "partial sandbox root");
                    return Err(err);
                }
            };
            self.session = Some(Session::new(sandbox, self.config.packages_dir.clone()));
        }
        self.session
            .as_mut()
            .ok_or_else(|| HarnessError::from(anyhow!("no live sandbox after acquire")))
    }

    /// Drops the backup for `variant` so the next acquire builds from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error when the backup cannot be removed.
    pub fn force_rebuild(&mut self, variant: &ProvisionVariant) -> Result<(), HarnessError> {
        self.backups.invalidate(variant)?;
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.sandbox.variant() == *variant)
        {
            self.release();
        }
        Ok(())
    }

    /// Tears down the live sandbox, if any.
    pub fn release(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(root = %session.root().display(), "releasing sandbox");
            remove_best_effort(session.root(), "sandbox root");
        }
    }

    /// Builds `variant` and saves it to the backup store without handing out a
    /// session. A valid backup is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Provisioning`] when building fails.
    pub fn warm(&mut self, variant: &ProvisionVariant) -> Result<(), HarnessError> {
        if self.backups.lookup(variant, &self.config.tool.name).is_some() {
            debug!(variant = variant.tag(), "backup already warm");
            return Ok(());
        }
        self.acquire(&SandboxOptions::new(*variant))?;
        Ok(())
    }

    fn derive(&self, variant: &ProvisionVariant) -> Result<Sandbox, HarnessError> {
        let root = self.live_root(variant);
        let tool = &self.config.tool.name;
        let cache = self.download_cache.path();
        if let Some(manifest) = self.backups.lookup(variant, tool) {
            info!(variant = variant.tag(), "restoring sandbox from backup");
            let layout = self.backups.restore(variant, &manifest, &root)?;
            return Ok(Sandbox::new(*variant, layout, &self.config, cache)?);
        }
        let sandbox = build_sandbox(self.provisioner.as_ref(), variant, &root, &self.config, cache)?;
        self.backups.save(variant, tool, sandbox.layout())?;
        Ok(sandbox)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, HarnessError> {
    std::path::absolute(path).map_err(|err| HarnessError::io("resolve", path, err))
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.release();
    }
}

/// A live sandbox together with the helpers tests drive it through.
pub struct Session {
    sandbox: Sandbox,
    packages_dir: Option<PathBuf>,
}

impl Session {
    pub(crate) fn new(sandbox: Sandbox, packages_dir: Option<PathBuf>) -> Self {
        Self {
            sandbox,
            packages_dir,
        }
    }

    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    #[must_use]
    pub fn layout(&self) -> &SandboxLayout {
        self.sandbox.layout()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    #[must_use]
    pub fn scratch_path(&self) -> PathBuf {
        self.layout().scratch_path()
    }

    /// # Errors
    ///
    /// See [`run`].
    pub fn run<I, S>(
        &self,
        program: &str,
        args: I,
        options: &RunOptions,
    ) -> Result<RunResult, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        run(&self.sandbox, program, args, options)
    }

    /// Runs the tool under test.
    ///
    /// # Errors
    ///
    /// See [`run`].
    pub fn run_tool<I, S>(&self, args: I, options: &RunOptions) -> Result<RunResult, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = self.sandbox.tool().name.clone();
        self.run(&program, args, options)
    }

    /// `install --no-index --find-links=<packages dir>` followed by `args`.
    ///
    /// # Errors
    ///
    /// Fails when no packages dir is configured, or as [`run`] does.
    pub fn install_local<I, S>(&self, args: I, options: &RunOptions) -> Result<RunResult, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages = self.packages_dir.as_deref().ok_or_else(|| {
            HarnessError::from(anyhow!(
                "no local packages directory configured; set PKGHARNESS_PACKAGES"
            ))
        })?;
        let packages = fs::canonicalize(packages)
            .map_err(|err| HarnessError::io("resolve", packages, err))?;
        let url = Url::from_directory_path(&packages).map_err(|()| {
            HarnessError::from(anyhow!("{} cannot be expressed as a file URL", packages.display()))
        })?;
        let mut full: Vec<String> = vec![
            "install".to_string(),
            "--no-index".to_string(),
            format!("--find-links={url}"),
        ];
        full.extend(args.into_iter().map(Into::into));
        self.run_tool(full, options)
    }

    /// The current state of the sandbox root.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Snapshot`] when the tree cannot be walked.
    pub fn snapshot(&self) -> Result<Snapshot, HarnessError> {
        Ok(snapshot(self.root(), self.sandbox.snapshot_options())?)
    }

    /// Writes `text` verbatim to `name` under `dest` (default: scratch).
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] when the file cannot be written.
    pub fn write_file(
        &self,
        name: impl AsRef<Path>,
        text: &str,
        dest: Option<&Path>,
    ) -> Result<PathBuf, HarnessError> {
        let dir = dest.map_or_else(|| self.scratch_path(), Path::to_path_buf);
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| HarnessError::io("create", parent, err))?;
        }
        fs::write(&path, text).map_err(|err| HarnessError::io("write", &path, err))?;
        Ok(path)
    }

    /// Creates `name` under scratch.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] when the directory cannot be created.
    pub fn mkdir(&self, name: impl AsRef<Path>) -> Result<PathBuf, HarnessError> {
        let path = self.scratch_path().join(name);
        fs::create_dir_all(&path).map_err(|err| HarnessError::io("create", &path, err))?;
        Ok(path)
    }

    /// Appends code run by every interpreter started in this sandbox.
    ///
    /// # Errors
    ///
    /// Returns an error when the hook cannot be written or its bytecode removed.
    pub fn add_to_startup_hook(&self, snippet: &str) -> Result<(), HarnessError> {
        hook::append(&self.layout().startup_hook_path(), snippet)?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`assert_installed`].
    pub fn assert_installed(
        &self,
        result: &RunResult,
        package: &str,
        expectation: &InstallExpectation,
    ) -> Result<(), AssertionFailure> {
        assert_installed(self.layout(), result, package, expectation)
    }
}
