#![warn(clippy::all)]

//! Black-box test harness for command-line package managers.
//!
//! A [`Harness`] provisions isolated sandboxes (cached per
//! [`ProvisionVariant`] in a [`BackupStore`]), runs the tool under test inside
//! them, and records every filesystem change as a [`RunResult`]. The
//! [`assertions`] module then checks those changes.

mod core;

pub mod assertions {
    pub use crate::core::assertions::*;
}

pub mod fixtures {
    pub use crate::core::fixtures::*;
}

pub use crate::core::assertions::{
    assert_all_changes, assert_installed, AssertionFailure, InstallExpectation, InstallViolation,
    StateSource,
};
pub use crate::core::config::{HarnessConfig, ToolUnderTest};
pub use crate::core::diff::{diff, prefix_match, ChangeSet};
pub use crate::core::errors::HarnessError;
pub use crate::core::fs::remove_tree;
pub use crate::core::runner::{run, RunOptions, RunResult};
pub use crate::core::sandbox::{
    invalidate_bytecode, BackupManifest, BackupStore, InstallerBackend, ProvisionVariant,
    Provisioner, ProvisioningFailure, RelativeToolPaths, Sandbox, SandboxLayout, SandboxOptions,
    ToolPaths, VenvProvisioner,
};
pub use crate::core::session::{Harness, Session};
pub use crate::core::snapshot::{
    snapshot, EntryKind, FileRecord, Snapshot, SnapshotError, SnapshotOptions,
};
