//! Completion derivation for a (pack, process) pair.
//!
//! Status is recomputed fresh from the merged rows and the process catalog
//! on every call; there is no stored "process complete" flag to go stale.

use serde::{Deserialize, Serialize};

use crate::model::CheckRow;

/// Completion state of one process on one pack, derived read-side.
///
/// `total_checks` comes from the catalog entry for the process, not from the
/// rows present: a process can be 3/10 complete with only three checks ever
/// touched. Processes the catalog does not know fall back to counting the
/// rows that exist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// At least one row exists for the pair.
    pub exists: bool,
    /// Alias of `exists` kept for dashboard callers: some data was saved.
    pub has_any_data: bool,
    /// Work has begun (some row carries a start date).
    pub started: bool,
    /// Every expected check has a Module X verdict.
    pub module_x_complete: bool,
    /// Every expected check has a Module Y verdict.
    pub module_y_complete: bool,
    /// Both stations have covered every expected check.
    pub both_modules_complete: bool,
    /// Every expected check row carries an end date (and there is at least
    /// one expected check).
    pub completed: bool,
    /// Expected checks whose row has an end date.
    pub completed_checks: usize,
    /// The completion denominator, from the catalog.
    pub total_checks: usize,
}

/// Derive the status for one process from its merged rows.
///
/// `expected` is the catalog entry for the process (`None` when the catalog
/// has no entry; the rows present then stand in as the denominator). Any
/// verdict (OK, NOT OK or N/A) counts toward module completion: all three
/// are deliberate operator decisions, not placeholders.
#[must_use]
pub fn derive_process_status(rows: &[CheckRow], expected: Option<&[String]>) -> ProcessStatus {
    let mut status = ProcessStatus::default();
    if rows.is_empty() {
        status.total_checks = expected.map_or(0, <[String]>::len);
        return status;
    }

    status.exists = true;
    status.has_any_data = true;
    status.started = true;

    let find = |name: &str| rows.iter().find(|r| r.check_name == name);

    let (total, x_filled, y_filled, ended) = match expected {
        // An explicitly empty entry keeps the denominator at zero; with no
        // expected checks the process can never be completed.
        Some(expected) => {
            let mut x = 0;
            let mut y = 0;
            let mut e = 0;
            for name in expected {
                let row = find(name);
                if row.is_some_and(|r| r.module_x.is_some()) {
                    x += 1;
                }
                if row.is_some_and(|r| r.module_y.is_some()) {
                    y += 1;
                }
                if row.is_some_and(|r| r.end_date.is_some()) {
                    e += 1;
                }
            }
            (expected.len(), x, y, e)
        }
        // No catalog entry at all: the rows present define the denominator.
        None => (
            rows.len(),
            rows.iter().filter(|r| r.module_x.is_some()).count(),
            rows.iter().filter(|r| r.module_y.is_some()).count(),
            rows.iter().filter(|r| r.end_date.is_some()).count(),
        ),
    };

    status.total_checks = total;
    status.completed_checks = ended;
    status.module_x_complete = x_filled == total && total > 0;
    status.module_y_complete = y_filled == total && total > 0;
    status.both_modules_complete = status.module_x_complete && status.module_y_complete;
    status.completed = ended == total && total > 0;
    status
}
