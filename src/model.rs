use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A station's verdict for one QC check.
///
/// Every check is inspected twice, once per station (Module X and Module Y).
/// A station records one of three deliberate outcomes; "no observation yet"
/// is modelled as `Option::<Verdict>::None`, never as a fourth variant.
///
/// # Examples
///
/// ```
/// use qcledger::model::Verdict;
///
/// let v = Verdict::Ok;
/// assert_eq!(v.as_str(), "OK");
/// assert_eq!("N/A".parse::<Verdict>().unwrap(), Verdict::NotApplicable);
/// assert!("maybe".parse::<Verdict>().is_err());
/// ```
///
/// # Storage Format
///
/// Verdicts are persisted as their operator-facing text (`OK`, `NOT OK`,
/// `N/A`); an absent observation is stored as the empty string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// The check passed.
    Ok,
    /// The check failed.
    NotOk,
    /// The check does not apply to this unit. A deliberate operator decision,
    /// counted toward completion exactly like [`Verdict::Ok`].
    NotApplicable,
}

impl Verdict {
    /// The operator-facing text for this verdict, as persisted.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::NotOk => "NOT OK",
            Verdict::NotApplicable => "N/A",
        }
    }

    /// Encode an optional verdict to its storage text.
    ///
    /// `None` encodes as the empty string, matching the "no observation yet"
    /// convention of the `module_x`/`module_y` columns.
    #[must_use]
    pub fn encode(slot: Option<Verdict>) -> &'static str {
        slot.map_or("", |v| v.as_str())
    }

    /// Decode storage text back to an optional verdict.
    ///
    /// Empty (or whitespace-only) text decodes to `None`; anything else must
    /// be one of the three verdict strings.
    pub fn decode(text: &str) -> Result<Option<Verdict>, VerdictParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error produced when persisted verdict text is not one of the known values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown verdict text: {0:?}")]
pub struct VerdictParseError(pub String);

impl FromStr for Verdict {
    type Err = VerdictParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OK" => Ok(Verdict::Ok),
            "NOT OK" => Ok(Verdict::NotOk),
            "N/A" => Ok(Verdict::NotApplicable),
            other => Err(VerdictParseError(other.to_string())),
        }
    }
}

/// One station observation for a named check, as submitted by a caller.
///
/// Only the fields a station actually filled in should be set; everything
/// left `None`/empty is preserved from the stored row during the merge. The
/// per-check text fields override the batch-level ones in [`MergeBatch`]
/// when non-empty.
///
/// # Examples
///
/// ```
/// use qcledger::model::{CheckObservation, Verdict};
///
/// // Station X submits only its own slot; Module Y's is untouched.
/// let obs = CheckObservation::new("Jig setup on the flat surface")
///     .with_module_x(Verdict::Ok);
/// assert_eq!(obs.module_x, Some(Verdict::Ok));
/// assert_eq!(obs.module_y, None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckObservation {
    /// Catalog name of the check this observation targets.
    pub check_name: String,
    /// Module X station verdict, if this submission carries one.
    pub module_x: Option<Verdict>,
    /// Module Y station verdict, if this submission carries one.
    pub module_y: Option<Verdict>,
    /// Per-check technician override; falls back to the batch-level value.
    pub technician_name: String,
    /// Per-check QC inspector override; falls back to the batch-level value.
    pub qc_name: String,
    /// Per-check remarks override; falls back to the batch-level value.
    pub remarks: String,
}

impl CheckObservation {
    /// Creates an observation for the named check with no verdicts filled in.
    #[must_use]
    pub fn new(check_name: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            ..Self::default()
        }
    }

    /// Sets the Module X verdict.
    #[must_use]
    pub fn with_module_x(mut self, verdict: Verdict) -> Self {
        self.module_x = Some(verdict);
        self
    }

    /// Sets the Module Y verdict.
    #[must_use]
    pub fn with_module_y(mut self, verdict: Verdict) -> Self {
        self.module_y = Some(verdict);
        self
    }

    /// Sets a per-check remarks override.
    #[must_use]
    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = remarks.into();
        self
    }
}

/// One call's worth of observations for a (pack, process) pair.
///
/// This is the unit of atomicity for [`QcStore::merge_checks`]: either every
/// observation in the batch merges, or none do.
///
/// [`QcStore::merge_checks`]: crate::store::QcStore::merge_checks
///
/// # Examples
///
/// ```
/// use qcledger::model::{CheckObservation, MergeBatch, Verdict};
///
/// let batch = MergeBatch::new("PACK-0042", "Cell sorting")
///     .with_technician("A. Rivera")
///     .with_qc_inspector("D. Mensah")
///     .with_observation(
///         CheckObservation::new("Visual & spacing inspection").with_module_x(Verdict::Ok),
///     );
/// assert_eq!(batch.observations.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeBatch {
    /// Pack identifier (caller-supplied, globally unique, non-empty).
    pub pack_id: String,
    /// Production stage the observations belong to.
    pub process_name: String,
    /// Batch-level technician name, applied where a check has no override.
    pub technician_name: String,
    /// Batch-level QC inspector name, applied where a check has no override.
    pub qc_name: String,
    /// Batch-level remarks, applied where a check has no override.
    pub remarks: String,
    /// The observations to merge, one entry per check.
    pub observations: Vec<CheckObservation>,
}

impl MergeBatch {
    /// Creates an empty batch for the given pack and process.
    #[must_use]
    pub fn new(pack_id: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            pack_id: pack_id.into(),
            process_name: process_name.into(),
            ..Self::default()
        }
    }

    /// Sets the batch-level technician name.
    #[must_use]
    pub fn with_technician(mut self, name: impl Into<String>) -> Self {
        self.technician_name = name.into();
        self
    }

    /// Sets the batch-level QC inspector name.
    #[must_use]
    pub fn with_qc_inspector(mut self, name: impl Into<String>) -> Self {
        self.qc_name = name.into();
        self
    }

    /// Sets the batch-level remarks.
    #[must_use]
    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = remarks.into();
        self
    }

    /// Appends one observation to the batch.
    #[must_use]
    pub fn with_observation(mut self, observation: CheckObservation) -> Self {
        self.observations.push(observation);
        self
    }

    /// Appends several observations to the batch.
    #[must_use]
    pub fn with_observations(
        mut self,
        observations: impl IntoIterator<Item = CheckObservation>,
    ) -> Self {
        self.observations.extend(observations);
        self
    }
}

/// A merged check row as stored, the unit the read API hands out.
///
/// The natural key is (`pack_id`, `process_name`, `check_name`); the store
/// guarantees at most one row per triple. `end_date` is derived: non-null
/// exactly when both module slots are filled, re-computed on every merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRow {
    /// Pack this row belongs to.
    pub pack_id: String,
    /// Production stage this row belongs to.
    pub process_name: String,
    /// Catalog name of the check.
    pub check_name: String,
    /// Module X station verdict, `None` until that station submits.
    pub module_x: Option<Verdict>,
    /// Module Y station verdict, `None` until that station submits.
    pub module_y: Option<Verdict>,
    /// Last non-empty technician name written.
    pub technician_name: String,
    /// Last non-empty QC inspector name written.
    pub qc_name: String,
    /// Last non-empty remarks written.
    pub remarks: String,
    /// Set when the row is first created; immutable afterward.
    pub start_date: DateTime<Utc>,
    /// Derived completion stamp: the timestamp of the write that filled the
    /// second module slot, or `None` while either slot is empty.
    pub end_date: Option<DateTime<Utc>>,
    /// Row creation timestamp (immutable).
    pub created_at: DateTime<Utc>,
    /// Bumped on every merge that touches the row.
    pub updated_at: DateTime<Utc>,
}

impl CheckRow {
    /// Returns true once both stations have recorded a verdict.
    #[must_use]
    pub fn both_modules_filled(&self) -> bool {
        self.module_x.is_some() && self.module_y.is_some()
    }
}

/// Which station produced a NOT OK finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Station {
    /// The Module X inspection station.
    ModuleX,
    /// The Module Y inspection station.
    ModuleY,
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Station::ModuleX => f.write_str("Module X"),
            Station::ModuleY => f.write_str("Module Y"),
        }
    }
}

/// One NOT OK verdict located by the read API, for defect review screens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotOkFinding {
    /// Process the failing check belongs to.
    pub process_name: String,
    /// The failing check.
    pub check_name: String,
    /// Which station recorded the NOT OK.
    pub station: Station,
}

/// Dashboard summary row: a pack and the processes that have any data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackProcesses {
    /// Pack identifier.
    pub pack_id: String,
    /// Processes with at least one stored check row, in name order.
    pub processes: Vec<String>,
}
