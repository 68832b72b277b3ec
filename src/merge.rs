//! Pure merge-field resolution for check observations.
//!
//! The store backends own the SQL; the decision of what a merged row looks
//! like lives here so it can be tested without a database and stays
//! identical across backends.
//!
//! The rule throughout is *merge never reduces information*: an incoming
//! value wins only when it actually says something. An empty module slot or
//! blank text field in a submission preserves whatever is already stored,
//! which is what lets two stations fill the same row independently without
//! clobbering each other.

use chrono::{DateTime, Utc};

use crate::model::{CheckObservation, CheckRow, MergeBatch, Verdict};

/// The column values a merge writes for one check row.
///
/// Produced by [`fresh_row`] (no existing row) or [`merge_into`] (existing
/// row); consumed by the backends' INSERT/UPDATE statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MergedFields {
    pub module_x: Option<Verdict>,
    pub module_y: Option<Verdict>,
    pub technician_name: String,
    pub qc_name: String,
    pub remarks: String,
    /// Re-derived on every merge: `now` iff both module slots ended up
    /// filled, else `None`. Never carried over from the stored row.
    pub end_date: Option<DateTime<Utc>>,
}

/// Incoming slot wins only when it carries a verdict.
pub(crate) fn resolve_module(
    incoming: Option<Verdict>,
    existing: Option<Verdict>,
) -> Option<Verdict> {
    incoming.or(existing)
}

/// Incoming text wins only when non-blank; blank never erases.
pub(crate) fn resolve_text(incoming: &str, existing: &str) -> String {
    if incoming.trim().is_empty() {
        existing.to_string()
    } else {
        incoming.to_string()
    }
}

/// Per-check override, else batch-level value. May still be blank.
fn effective_text<'a>(per_check: &'a str, batch_level: &'a str) -> &'a str {
    if per_check.trim().is_empty() {
        batch_level
    } else {
        per_check
    }
}

/// The derived completion stamp for a pair of module slots.
pub(crate) fn derive_end_date(
    module_x: Option<Verdict>,
    module_y: Option<Verdict>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    (module_x.is_some() && module_y.is_some()).then_some(now)
}

/// Field values for a brand-new row: incoming values verbatim, completion
/// stamped only if the submission already fills both slots.
pub(crate) fn fresh_row(
    observation: &CheckObservation,
    batch: &MergeBatch,
    now: DateTime<Utc>,
) -> MergedFields {
    MergedFields {
        module_x: observation.module_x,
        module_y: observation.module_y,
        technician_name: effective_text(&observation.technician_name, &batch.technician_name)
            .to_string(),
        qc_name: effective_text(&observation.qc_name, &batch.qc_name).to_string(),
        remarks: effective_text(&observation.remarks, &batch.remarks).to_string(),
        end_date: derive_end_date(observation.module_x, observation.module_y, now),
    }
}

/// Field values for merging an observation into an existing row.
///
/// The end date is recomputed from the merged pair rather than read from the
/// stored row, so a row's completion state is always consistent with its
/// module slots no matter what sequence of writes produced them.
pub(crate) fn merge_into(
    existing: &CheckRow,
    observation: &CheckObservation,
    batch: &MergeBatch,
    now: DateTime<Utc>,
) -> MergedFields {
    let module_x = resolve_module(observation.module_x, existing.module_x);
    let module_y = resolve_module(observation.module_y, existing.module_y);
    MergedFields {
        module_x,
        module_y,
        technician_name: resolve_text(
            effective_text(&observation.technician_name, &batch.technician_name),
            &existing.technician_name,
        ),
        qc_name: resolve_text(
            effective_text(&observation.qc_name, &batch.qc_name),
            &existing.qc_name,
        ),
        remarks: resolve_text(
            effective_text(&observation.remarks, &batch.remarks),
            &existing.remarks,
        ),
        end_date: derive_end_date(module_x, module_y, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(module_x: Option<Verdict>, module_y: Option<Verdict>) -> CheckRow {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        CheckRow {
            pack_id: "P1".into(),
            process_name: "Cell sorting".into(),
            check_name: "c1".into(),
            module_x,
            module_y,
            technician_name: "existing tech".into(),
            qc_name: "existing qc".into(),
            remarks: "existing remarks".into(),
            start_date: t,
            end_date: derive_end_date(module_x, module_y, t),
            created_at: t,
            updated_at: t,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn empty_incoming_slot_preserves_existing_verdict() {
        assert_eq!(
            resolve_module(None, Some(Verdict::NotOk)),
            Some(Verdict::NotOk)
        );
        assert_eq!(resolve_module(Some(Verdict::Ok), None), Some(Verdict::Ok));
        assert_eq!(
            resolve_module(Some(Verdict::NotApplicable), Some(Verdict::Ok)),
            Some(Verdict::NotApplicable)
        );
    }

    #[test]
    fn blank_text_never_erases() {
        assert_eq!(resolve_text("", "kept"), "kept");
        assert_eq!(resolve_text("   ", "kept"), "kept");
        assert_eq!(resolve_text("new", "old"), "new");
    }

    #[test]
    fn merge_fills_second_slot_and_stamps_end_date() {
        let existing = row(Some(Verdict::Ok), None);
        let obs = CheckObservation::new("c1").with_module_y(Verdict::Ok);
        let batch = MergeBatch::new("P1", "Cell sorting");
        let merged = merge_into(&existing, &obs, &batch, now());
        assert_eq!(merged.module_x, Some(Verdict::Ok));
        assert_eq!(merged.module_y, Some(Verdict::Ok));
        assert_eq!(merged.end_date, Some(now()));
    }

    #[test]
    fn merge_is_commutative_for_disjoint_slots() {
        let batch = MergeBatch::new("P1", "Cell sorting");
        let x_only = CheckObservation::new("c1").with_module_x(Verdict::Ok);
        let y_only = CheckObservation::new("c1").with_module_y(Verdict::NotApplicable);
        let t = now();

        // x then y
        let first = fresh_row(&x_only, &batch, t);
        let mut mid = row(first.module_x, first.module_y);
        mid.technician_name.clear();
        mid.qc_name.clear();
        mid.remarks.clear();
        let a = merge_into(&mid, &y_only, &batch, t);

        // y then x
        let first = fresh_row(&y_only, &batch, t);
        let mut mid = row(first.module_x, first.module_y);
        mid.technician_name.clear();
        mid.qc_name.clear();
        mid.remarks.clear();
        let b = merge_into(&mid, &x_only, &batch, t);

        assert_eq!(a, b);
        assert_eq!(a.end_date, Some(t));
    }

    #[test]
    fn end_date_rederived_not_carried() {
        // Row already complete; a later merge that leaves both slots filled
        // keeps an end date (stamped at the later write's clock).
        let existing = row(Some(Verdict::Ok), Some(Verdict::Ok));
        let obs = CheckObservation::new("c1").with_module_x(Verdict::NotOk);
        let batch = MergeBatch::new("P1", "Cell sorting");
        let merged = merge_into(&existing, &obs, &batch, now());
        assert_eq!(merged.module_x, Some(Verdict::NotOk));
        assert_eq!(merged.end_date, Some(now()));
    }

    #[test]
    fn blank_write_cannot_unset_end_date() {
        let existing = row(Some(Verdict::Ok), Some(Verdict::Ok));
        let obs = CheckObservation::new("c1"); // carries nothing
        let batch = MergeBatch::new("P1", "Cell sorting");
        let merged = merge_into(&existing, &obs, &batch, now());
        assert!(merged.end_date.is_some());
        assert_eq!(merged.module_x, Some(Verdict::Ok));
        assert_eq!(merged.technician_name, "existing tech");
    }

    #[test]
    fn fresh_row_with_one_slot_has_no_end_date() {
        let obs = CheckObservation::new("c1").with_module_x(Verdict::Ok);
        let batch = MergeBatch::new("P1", "Cell sorting").with_technician("batch tech");
        let fields = fresh_row(&obs, &batch, now());
        assert_eq!(fields.end_date, None);
        assert_eq!(fields.technician_name, "batch tech");
    }

    #[test]
    fn per_check_text_overrides_batch_level() {
        let obs = CheckObservation::new("c1")
            .with_module_x(Verdict::Ok)
            .with_remarks("cell 3 scratch");
        let batch = MergeBatch::new("P1", "Cell sorting").with_remarks("batch remarks");
        let fields = fresh_row(&obs, &batch, now());
        assert_eq!(fields.remarks, "cell 3 scratch");
    }
}
