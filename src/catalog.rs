//! Process catalog: the expected QC checks per production stage.
//!
//! The catalog is read-only configuration injected into the store at
//! construction. It defines the denominator for completion, not the set of
//! rows actually present: a process with N catalog checks is complete
//! only when all N rows exist and all N carry an end date.

use rustc_hash::FxHashMap;

/// Immutable map from process name to its ordered list of expected checks.
///
/// # Examples
///
/// ```
/// use qcledger::catalog::ProcessCatalog;
///
/// let catalog = ProcessCatalog::from_iter([
///     ("Cell sorting", vec!["Jig setup", "Visual inspection"]),
/// ]);
/// assert_eq!(catalog.expected_checks("Cell sorting").unwrap().len(), 2);
/// assert!(catalog.expected_checks("Packing").is_none());
/// ```
///
/// The production line ships as [`ProcessCatalog::standard_line`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessCatalog {
    /// Process names in line order.
    order: Vec<String>,
    /// Process name → expected check names, in sheet order.
    checks: FxHashMap<String, Vec<String>>,
}

impl ProcessCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from (process, checks) pairs, preserving order.
    pub fn from_iter<P, C, I>(entries: I) -> Self
    where
        P: Into<String>,
        C: Into<String>,
        I: IntoIterator<Item = (P, Vec<C>)>,
    {
        let mut catalog = Self::new();
        for (process, checks) in entries {
            catalog.insert(process, checks);
        }
        catalog
    }

    /// Inserts (or replaces) a process and its expected checks.
    pub fn insert<P, C>(&mut self, process: P, checks: Vec<C>)
    where
        P: Into<String>,
        C: Into<String>,
    {
        let process = process.into();
        if !self.checks.contains_key(&process) {
            self.order.push(process.clone());
        }
        self.checks
            .insert(process, checks.into_iter().map(Into::into).collect());
    }

    /// The expected check names for a process, in sheet order.
    ///
    /// Returns `None` for processes the catalog does not know about.
    #[must_use]
    pub fn expected_checks(&self, process_name: &str) -> Option<&[String]> {
        self.checks.get(process_name).map(Vec::as_slice)
    }

    /// Process names in line order.
    #[must_use]
    pub fn process_names(&self) -> &[String] {
        &self.order
    }

    /// Number of processes in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the catalog holds no processes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The standard battery-pack line: eight processes from cell sorting to
    /// dispatch, with the QC checks each stage expects.
    #[must_use]
    pub fn standard_line() -> Self {
        Self::from_iter([
            (
                "Cell sorting",
                vec![
                    "Acceptable range Voltage: 3.58 to 3.6 V, IR: 11.5 to 12.5 mΩ",
                    "Jig setup on the flat surface",
                    "Visual & spacing inspection",
                ],
            ),
            (
                "Module assembly",
                vec![
                    "Aluminum base plate fixing in Base plate fixture & stitch nut",
                    "Adhesive dispensing on cells placed in the jig & lio of cell assembly jig on baseplate fixture after curing",
                    "Dispensing the cell assembly jig & fixture",
                    "Fixing of Downwell (PC sheets) in the cell assembly",
                    "Thermistor & voltage tagging on Cell assembly(Routing & Placement)",
                    "Busbar fitment on CPT (adhesive dispensing & voltage tap,thermistor sub assembly)",
                ],
            ),
            (
                "Pre Encapsulation",
                vec![
                    "The 90 % of encapsulation on module by tightening the module independently using the holding fixture",
                    "Bus bar top assembly placement and Soldering of voltage taps on the cells",
                    "Stripping crimping & connector insertion for voltage tap and thermistor",
                ],
            ),
            ("Wire Bonding", vec!["As per the cell assembly procedure"]),
            (
                "Post Encapsulation",
                vec![
                    "The remaining 20 % of encapsulation on wire bonded module",
                    "Dimensions of the part",
                ],
            ),
            (
                "EOL Testing",
                vec![
                    "Check for Abnormal temp & voltages and cell imbalance, Isolation resistance (EOL: 300 amp charge and discharge)",
                ],
            ),
            (
                "Pack assembly",
                vec![
                    "Pack Assembly(Mock fitment of module 1 & 2 in base plate enclosure)",
                    "Fitment of module 1 & module 2between MSM sandwich bodies on the base plate with sealant and screw with M6 allen head",
                    "Assembly of base plates (left & flame arrester sizes (M3) with sealant /foam and M6)",
                    "Assembly of busbar series with UX Allen head",
                    "Cell box top cover assembly- PCB joining ;PRV assembly; busbar/array & cleanliness",
                    "Final QC on the pack level with CTQs",
                    "Sealing- PCB, Overall Pack Body & Terminals",
                    "Overall aesthetics/cleanliness of the pack",
                    "Pre-casing torque check and paint marking (M4 socket head)",
                    "Leak test (Pressure test) (chaser/Fixer)",
                    "Labelling of the battery pack",
                    "Torque checks & torque marking",
                    "Sealing - PCB, Overall Pack Body & Terminals)",
                    "Overall aesthetics/cleanliness of the pack",
                    "Pre-casing torque check and paint marking (M4 socket head)",
                    "Leak test (Pressure test) (chaser/Fixer)",
                    "Labelling of the battery pack",
                    "Torque checks & torque marking",
                    "Hard leakage to body - Shouldn't present",
                    "Voltage and thermaltor readings with respect to PREVAID BMS (PCB communications - voltage + temperature)",
                    "Hard leakage to body: Shouldn't present",
                    "Isolation resistance: Min in Mohm",
                ],
            ),
            (
                "Ready for Dispatch",
                vec![
                    "Overall pack visual inspection: No defects/no dents/no stains, HV terminals covered, PCB covered, PRV placed, labels verified",
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_line_has_eight_processes_in_order() {
        let catalog = ProcessCatalog::standard_line();
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog.process_names()[0], "Cell sorting");
        assert_eq!(catalog.process_names()[7], "Ready for Dispatch");
        assert_eq!(catalog.expected_checks("Cell sorting").unwrap().len(), 3);
        assert_eq!(catalog.expected_checks("Wire Bonding").unwrap().len(), 1);
    }

    #[test]
    fn insert_replaces_without_duplicating_order() {
        let mut catalog = ProcessCatalog::new();
        catalog.insert("P", vec!["a", "b"]);
        catalog.insert("P", vec!["a"]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.expected_checks("P").unwrap(), ["a"]);
    }

    #[test]
    fn unknown_process_yields_none() {
        let catalog = ProcessCatalog::standard_line();
        assert!(catalog.expected_checks("Paint shop").is_none());
    }
}
