use camino::Utf8Path;

use super::AssertionFailure;
use crate::core::{
    diff::{diff, normalize_relative, prefix_match, ChangeSet},
    runner::RunResult,
    snapshot::Snapshot,
};

/// Something a filesystem state can be read from: a bare snapshot, or a run
/// whose before/after sides supply the start and end states.
pub trait StateSource {
    fn start_state(&self) -> &Snapshot;
    fn end_state(&self) -> &Snapshot;
}

impl StateSource for Snapshot {
    fn start_state(&self) -> &Snapshot {
        self
    }

    fn end_state(&self) -> &Snapshot {
        self
    }
}

impl StateSource for RunResult {
    fn start_state(&self) -> &Snapshot {
        self.files_before()
    }

    fn end_state(&self) -> &Snapshot {
        self.files_after()
    }
}

/// Fails when anything outside `expected` changed between `start` and `end`.
///
/// On success returns the changes that fell under `expected`, for callers that
/// want to look closer.
///
/// # Errors
///
/// Returns [`AssertionFailure::UnexpectedChanges`] listing every path that
/// changed outside the expected prefixes.
pub fn assert_all_changes<S, E, P>(
    start: &S,
    end: &E,
    expected: &[P],
) -> Result<ChangeSet, AssertionFailure>
where
    S: StateSource + ?Sized,
    E: StateSource + ?Sized,
    P: AsRef<Utf8Path>,
{
    let before = start.start_state();
    let after = end.end_state();
    let unexpected = diff(before, after, expected);
    if !unexpected.is_empty() {
        return Err(AssertionFailure::UnexpectedChanges {
            changes: unexpected,
        });
    }
    let mut changes = diff(before, after, &[] as &[&str]);
    let prefixes: Vec<_> = expected
        .iter()
        .map(|prefix| normalize_relative(prefix.as_ref()))
        .collect();
    let keep = |path: &Utf8Path| prefixes.iter().any(|prefix| prefix_match(path, prefix));
    changes.deleted.retain(|path, _| keep(path.as_path()));
    changes.created.retain(|path, _| keep(path.as_path()));
    changes.updated.retain(|path, _| keep(path.as_path()));
    Ok(changes)
}
