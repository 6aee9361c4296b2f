//! Acquisition protocol constants.
//!
//! Default metadata injected into descriptors depends on how the data was
//! acquired. The values are grouped per protocol and kept in a table that
//! callers can extend or override from TOML:
//!
//! ```toml
//! [protocols.epfid2d1_64]
//! slice_timing = [0.0, 0.065, ...]
//! total_readout_time = 0.0377995
//! echo_time1 = 0.00492
//! echo_time2 = 0.00738
//! ```

use crate::error::{NormalizeError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Name of the built-in protocol: the `*epfid2d1_64` resting-state EPI
/// sequence acquired with 38 interleaved axial slices.
pub const DEFAULT_PROTOCOL: &str = "epfid2d1_64";

/// Slice acquisition times in seconds for the 38-slice `epfid2d1_64` sequence.
pub const EPFID2D1_64_SLICE_TIMING: [f64; 38] = [
    0.0, 0.065, 0.1325, 0.1975, 0.2625, 0.3275, 0.3925, 0.4575, 0.5225, 0.5875, 0.6525, 0.72,
    0.785, 0.85, 0.915, 0.98, 1.045, 1.11, 1.175, 1.24, 1.305, 1.3725, 1.4375, 1.5025, 1.5675,
    1.6325, 1.6975, 1.7625, 1.8275, 1.8925, 1.9575, 2.025, 2.09, 2.155, 2.22, 2.285, 2.35, 2.415,
];

/// Metadata defaults and slice geometry of one acquisition protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionProtocol {
    /// `SliceTiming` injected into functional descriptors
    pub slice_timing: Vec<f64>,
    /// `TotalReadoutTime` injected into functional descriptors
    pub total_readout_time: f64,
    /// `EchoTime1` of phase-difference field maps
    pub echo_time1: f64,
    /// `EchoTime2` of phase-difference field maps
    pub echo_time2: f64,
    /// Canonical slice count of functional images
    #[serde(default = "default_target_slice_count")]
    pub target_slice_count: u64,
    /// Slice count that is trimmed down to `target_slice_count`
    #[serde(default = "default_oversized_slice_count")]
    pub oversized_slice_count: u64,
    /// BIDS task label of the functional run
    #[serde(default = "default_task")]
    pub task: String,
}

fn default_target_slice_count() -> u64 {
    38
}

fn default_oversized_slice_count() -> u64 {
    49
}

fn default_task() -> String {
    "rest".to_string()
}

impl Default for AcquisitionProtocol {
    fn default() -> Self {
        AcquisitionProtocol {
            slice_timing: EPFID2D1_64_SLICE_TIMING.to_vec(),
            total_readout_time: 0.0377995,
            echo_time1: 0.00492,
            echo_time2: 0.00738,
            target_slice_count: default_target_slice_count(),
            oversized_slice_count: default_oversized_slice_count(),
            task: default_task(),
        }
    }
}

impl AcquisitionProtocol {
    /// Canonical functional file stem, e.g. `sub-hc007_task-rest_bold`.
    pub fn functional_stem(&self, subject: &str) -> String {
        format!("{}_task-{}_bold", subject, self.task)
    }

    /// `IntendedFor` value linking a field map to the subject's functional image.
    pub fn intended_for(&self, subject: &str) -> String {
        format!("func/{}.nii.gz", self.functional_stem(subject))
    }

    fn validate(&self, name: &str) -> Result<()> {
        let fail = |reason: String| {
            Err(NormalizeError::InvalidProtocol {
                name: name.to_string(),
                reason,
            })
        };
        if self.slice_timing.len() as u64 != self.target_slice_count {
            return fail(format!(
                "{} slice times for {} slices",
                self.slice_timing.len(),
                self.target_slice_count
            ));
        }
        if self.slice_timing.windows(2).any(|w| w[0] > w[1]) {
            return fail("slice timing is not ascending".to_string());
        }
        if self.oversized_slice_count <= self.target_slice_count {
            return fail("oversized slice count must exceed the target".to_string());
        }
        if self.task.is_empty() || !self.task.chars().all(|c| c.is_ascii_alphanumeric()) {
            return fail(format!("task label `{}` is not alphanumeric", self.task));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProtocolDocument {
    #[serde(default)]
    protocols: BTreeMap<String, AcquisitionProtocol>,
}

/// Named acquisition protocols, always containing `DEFAULT_PROTOCOL`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolTable {
    protocols: BTreeMap<String, AcquisitionProtocol>,
}

impl Default for ProtocolTable {
    fn default() -> Self {
        let mut protocols = BTreeMap::new();
        let _ = protocols.insert(DEFAULT_PROTOCOL.to_string(), AcquisitionProtocol::default());
        ProtocolTable { protocols }
    }
}

impl ProtocolTable {
    /// Built-in protocols merged with the `[protocols.*]` tables of `text`.
    /// Entries with a built-in name replace the built-in.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let doc: ProtocolDocument = toml::from_str(text)?;
        let mut table = ProtocolTable::default();
        for (name, protocol) in doc.protocols {
            table.insert(name, protocol)?;
        }
        Ok(table)
    }

    /// Same as `from_toml_str`, reading the document from `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => NormalizeError::NotFound(path.to_path_buf()),
            _ => NormalizeError::Io(e),
        })?;
        ProtocolTable::from_toml_str(&text)
    }

    /// Add or replace a protocol after checking it is self-consistent.
    pub fn insert<S: Into<String>>(&mut self, name: S, protocol: AcquisitionProtocol) -> Result<()> {
        let name = name.into();
        protocol.validate(&name)?;
        let _ = self.protocols.insert(name, protocol);
        Ok(())
    }

    /// Look up a protocol by name.
    pub fn get(&self, name: &str) -> Result<&AcquisitionProtocol> {
        self.protocols
            .get(name)
            .ok_or_else(|| NormalizeError::UnknownProtocol(name.to_string()))
    }

    /// Names of all protocols, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.protocols.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{AcquisitionProtocol, ProtocolTable, DEFAULT_PROTOCOL};
    use crate::error::NormalizeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_slice_timing_shape() {
        let p = AcquisitionProtocol::default();
        assert_eq!(p.slice_timing.len(), 38);
        assert_eq!(p.slice_timing[0], 0.0);
        assert_eq!(p.slice_timing[37], 2.415);
        assert!(p.slice_timing.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn intended_for_path() {
        let p = AcquisitionProtocol::default();
        assert_eq!(
            p.intended_for("sub-hc007"),
            "func/sub-hc007_task-rest_bold.nii.gz"
        );
    }

    #[test]
    fn toml_adds_protocol_and_keeps_builtin() {
        let text = r#"
[protocols.short]
slice_timing = [0.0, 0.5, 1.0]
total_readout_time = 0.05
echo_time1 = 0.004
echo_time2 = 0.006
target_slice_count = 3
oversized_slice_count = 4
task = "motor"
"#;
        let table = ProtocolTable::from_toml_str(text).unwrap();
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec![DEFAULT_PROTOCOL, "short"]);
        let short = table.get("short").unwrap();
        assert_eq!(short.task, "motor");
        assert_eq!(short.functional_stem("sub-01"), "sub-01_task-motor_bold");
        assert_eq!(
            table.get(DEFAULT_PROTOCOL).unwrap(),
            &AcquisitionProtocol::default()
        );
    }

    #[test]
    fn inconsistent_protocol_is_rejected() {
        let text = r#"
[protocols.bad]
slice_timing = [0.0, 0.5]
total_readout_time = 0.05
echo_time1 = 0.004
echo_time2 = 0.006
"#;
        match ProtocolTable::from_toml_str(text) {
            Err(NormalizeError::InvalidProtocol { name, .. }) => assert_eq!(name, "bad"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_protocol() {
        let table = ProtocolTable::default();
        assert!(matches!(
            table.get("nope"),
            Err(NormalizeError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            ProtocolTable::from_toml_str("protocols = 3"),
            Err(NormalizeError::Config(_))
        ));
    }
}
