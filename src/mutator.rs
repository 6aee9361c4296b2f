//! Descriptor metadata rules.
//!
//! Every rule mutates a `Descriptor` in place and reports what it did. Rules
//! never touch the file system and never log; notices are left to the caller,
//! which knows the subject and file being processed.
//!
//! Applying any rule twice yields the same record as applying it once.

use crate::descriptor::Descriptor;
use crate::protocol::AcquisitionProtocol;
use serde_json::Value;

/// Legacy phase encoding key written by some converters.
pub const PHASE_ENCODING_AXIS: &str = "PhaseEncodingAxis";
/// BIDS phase encoding key.
pub const PHASE_ENCODING_DIRECTION: &str = "PhaseEncodingDirection";
/// Phase encoding direction assumed when none is recorded.
pub const DEFAULT_PHASE_ENCODING_DIRECTION: &str = "j";
/// Slice acquisition times key.
pub const SLICE_TIMING: &str = "SliceTiming";
/// Total readout time key.
pub const TOTAL_READOUT_TIME: &str = "TotalReadoutTime";
/// Field map target key.
pub const INTENDED_FOR: &str = "IntendedFor";
/// First echo time key of phase-difference maps.
pub const ECHO_TIME_1: &str = "EchoTime1";
/// Second echo time key of phase-difference maps.
pub const ECHO_TIME_2: &str = "EchoTime2";

/// What a rule did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The record was modified.
    Changed,
    /// The record already conformed, nothing to report.
    Unchanged,
    /// The governed field was already present and was kept as is.
    AlreadyPresent,
}

impl RuleOutcome {
    /// Whether the record was modified.
    pub fn is_changed(self) -> bool {
        self == RuleOutcome::Changed
    }
}

/// Rename `PhaseEncodingAxis` to `PhaseEncodingDirection`, keeping its value
/// and position. Without either key, `PhaseEncodingDirection` becomes `"j"`.
/// An existing `PhaseEncodingDirection` alone is left untouched.
pub fn normalize_phase_encoding(record: &mut Descriptor) -> RuleOutcome {
    if record.contains_key(PHASE_ENCODING_AXIS) {
        *record = std::mem::take(record)
            .into_iter()
            .map(|(key, value)| {
                if key == PHASE_ENCODING_AXIS {
                    (PHASE_ENCODING_DIRECTION.to_string(), value)
                } else {
                    (key, value)
                }
            })
            .collect();
        RuleOutcome::Changed
    } else if !record.contains_key(PHASE_ENCODING_DIRECTION) {
        set(
            record,
            PHASE_ENCODING_DIRECTION,
            Value::from(DEFAULT_PHASE_ENCODING_DIRECTION),
        )
    } else {
        RuleOutcome::Unchanged
    }
}

/// Insert the protocol's `SliceTiming` when the record has none.
pub fn inject_slice_timing(record: &mut Descriptor, protocol: &AcquisitionProtocol) -> RuleOutcome {
    if record.contains_key(SLICE_TIMING) {
        return RuleOutcome::AlreadyPresent;
    }
    let timing = protocol
        .slice_timing
        .iter()
        .copied()
        .map(Value::from)
        .collect();
    set(record, SLICE_TIMING, Value::Array(timing))
}

/// Insert the protocol's `TotalReadoutTime` when the record has none.
///
/// A value equal to the protocol's is reported as `AlreadyPresent`. Any other
/// value is kept: a readout time set by hand is not corrected.
pub fn inject_total_readout_time(
    record: &mut Descriptor,
    protocol: &AcquisitionProtocol,
) -> RuleOutcome {
    let existing = record.get(TOTAL_READOUT_TIME).map(Value::as_f64);
    match existing {
        None => set(
            record,
            TOTAL_READOUT_TIME,
            Value::from(protocol.total_readout_time),
        ),
        Some(v) if v == Some(protocol.total_readout_time) => RuleOutcome::AlreadyPresent,
        Some(_) => RuleOutcome::Unchanged,
    }
}

/// Point `IntendedFor` at the subject's canonical functional image,
/// overwriting any previous value.
pub fn link_intended_for(
    record: &mut Descriptor,
    subject: &str,
    protocol: &AcquisitionProtocol,
) -> RuleOutcome {
    set(record, INTENDED_FOR, Value::from(protocol.intended_for(subject)))
}

/// Set `EchoTime1` and `EchoTime2` to the protocol's values, overwriting any
/// previous value.
pub fn inject_echo_times(record: &mut Descriptor, protocol: &AcquisitionProtocol) -> RuleOutcome {
    let first = set(record, ECHO_TIME_1, Value::from(protocol.echo_time1));
    let second = set(record, ECHO_TIME_2, Value::from(protocol.echo_time2));
    if first.is_changed() || second.is_changed() {
        RuleOutcome::Changed
    } else {
        RuleOutcome::Unchanged
    }
}

fn set(record: &mut Descriptor, key: &str, value: Value) -> RuleOutcome {
    if record.get(key) == Some(&value) {
        return RuleOutcome::Unchanged;
    }
    let _ = record.insert(key.to_string(), value);
    RuleOutcome::Changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(v: Value) -> Descriptor {
        match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn phase_defaults_to_j() {
        let mut r = record(json!({"RepetitionTime": 2.0}));
        assert_eq!(normalize_phase_encoding(&mut r), RuleOutcome::Changed);
        assert_eq!(r[PHASE_ENCODING_DIRECTION], json!("j"));
        assert!(!r.contains_key(PHASE_ENCODING_AXIS));
    }

    #[test]
    fn phase_axis_is_renamed_in_place() {
        let mut r = record(json!({"A": 1, "PhaseEncodingAxis": "i", "B": 2}));
        assert_eq!(normalize_phase_encoding(&mut r), RuleOutcome::Changed);
        assert_eq!(r[PHASE_ENCODING_DIRECTION], json!("i"));
        assert!(!r.contains_key(PHASE_ENCODING_AXIS));
        let keys: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", PHASE_ENCODING_DIRECTION, "B"]);
    }

    #[test]
    fn phase_axis_wins_over_existing_direction() {
        let mut r = record(json!({"PhaseEncodingDirection": "j-", "PhaseEncodingAxis": "i"}));
        let _ = normalize_phase_encoding(&mut r);
        assert_eq!(r, record(json!({"PhaseEncodingDirection": "i"})));
    }

    #[test]
    fn phase_direction_alone_is_kept() {
        let mut r = record(json!({"PhaseEncodingDirection": "j-"}));
        assert_eq!(normalize_phase_encoding(&mut r), RuleOutcome::Unchanged);
        assert_eq!(r[PHASE_ENCODING_DIRECTION], json!("j-"));
    }

    #[test]
    fn phase_is_idempotent() {
        for start in &[
            json!({}),
            json!({"PhaseEncodingAxis": "i"}),
            json!({"PhaseEncodingDirection": "k"}),
        ] {
            let mut once = record(start.clone());
            let _ = normalize_phase_encoding(&mut once);
            let mut twice = once.clone();
            assert_eq!(normalize_phase_encoding(&mut twice), RuleOutcome::Unchanged);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn slice_timing_injected_when_absent() {
        let p = AcquisitionProtocol::default();
        let mut r = record(json!({}));
        assert_eq!(inject_slice_timing(&mut r, &p), RuleOutcome::Changed);
        let timing = r[SLICE_TIMING].as_array().unwrap();
        assert_eq!(timing.len(), 38);
        assert_eq!(timing[0].as_f64(), Some(0.0));
        assert_eq!(timing[37].as_f64(), Some(2.415));
        let values: Vec<f64> = timing.iter().map(|v| v.as_f64().unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));

        let before = r.clone();
        assert_eq!(inject_slice_timing(&mut r, &p), RuleOutcome::AlreadyPresent);
        assert_eq!(r, before);
    }

    #[test]
    fn slice_timing_present_is_kept() {
        let p = AcquisitionProtocol::default();
        let mut r = record(json!({"SliceTiming": [0, 1]}));
        assert_eq!(inject_slice_timing(&mut r, &p), RuleOutcome::AlreadyPresent);
        assert_eq!(r[SLICE_TIMING], json!([0, 1]));
    }

    #[test]
    fn readout_time_cases() {
        let p = AcquisitionProtocol::default();

        let mut absent = record(json!({}));
        assert_eq!(inject_total_readout_time(&mut absent, &p), RuleOutcome::Changed);
        assert_eq!(absent[TOTAL_READOUT_TIME], json!(0.0377995));
        assert_eq!(
            inject_total_readout_time(&mut absent, &p),
            RuleOutcome::AlreadyPresent
        );

        let mut same = record(json!({"TotalReadoutTime": 0.0377995}));
        let before = same.clone();
        assert_eq!(inject_total_readout_time(&mut same, &p), RuleOutcome::AlreadyPresent);
        assert_eq!(same, before);

        let mut other = record(json!({"TotalReadoutTime": 0.05}));
        let before = other.clone();
        assert_eq!(inject_total_readout_time(&mut other, &p), RuleOutcome::Unchanged);
        assert_eq!(other, before);
    }

    #[test]
    fn intended_for_always_overwritten() {
        let p = AcquisitionProtocol::default();
        for start in &[
            json!({}),
            json!({"IntendedFor": "func/old.nii.gz"}),
            json!({"IntendedFor": ["a", "b"]}),
        ] {
            let mut r = record(start.clone());
            let _ = link_intended_for(&mut r, "sub-hc007", &p);
            assert_eq!(r[INTENDED_FOR], json!("func/sub-hc007_task-rest_bold.nii.gz"));
            assert_eq!(link_intended_for(&mut r, "sub-hc007", &p), RuleOutcome::Unchanged);
        }
    }

    #[test]
    fn echo_times_always_overwritten() {
        let p = AcquisitionProtocol::default();
        let mut r = record(json!({"EchoTime1": 0.1, "Other": true}));
        assert_eq!(inject_echo_times(&mut r, &p), RuleOutcome::Changed);
        assert_eq!(
            r,
            record(json!({"EchoTime1": 0.00492, "Other": true, "EchoTime2": 0.00738}))
        );
        assert_eq!(inject_echo_times(&mut r, &p), RuleOutcome::Unchanged);
    }
}
