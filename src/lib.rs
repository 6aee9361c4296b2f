//! Metadata and slice-geometry normalization for BIDS datasets.
//!
//! Brings every subject of a dataset into a consistent, tool-ready state:
//! functional files get canonical names, functional images get the canonical
//! slice count, and JSON sidecar descriptors get the metadata fields that
//! downstream preprocessing expects.
//!
//! # Example
//!
//! ```no_run
//! use bids_normalizer::{SubjectPattern, Workflow, WorkflowOptions};
//! # use bids_normalizer::Result;
//!
//! # fn run() -> Result<()> {
//! let options = WorkflowOptions::new("/data/bids", SubjectPattern::new("sub-hc", 3, ""));
//! let summary = Workflow::new(options)?.run()?;
//! for failure in summary.failures() {
//!     eprintln!("{}: {}", failure.subject, failure.error);
//! }
//! # Ok(())
//! # }
//! ```
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts, unused_results)]

#[macro_use]
extern crate quick_error;

pub mod descriptor;
pub mod error;
pub mod header;
pub mod inspector;
pub mod layout;
pub mod mutator;
pub mod protocol;
pub mod trimmer;
pub mod workflow;
mod util;

pub use crate::descriptor::Descriptor;
pub use crate::error::{ErrorCategory, NormalizeError, Result};
pub use crate::header::HeaderGeometry;
pub use crate::inspector::{ImageInspector, NiftiInspector};
pub use crate::layout::{Classification, MatchMode, Modality, Subject, SubjectPattern};
pub use crate::mutator::RuleOutcome;
pub use crate::protocol::{AcquisitionProtocol, ProtocolTable, DEFAULT_PROTOCOL};
pub use crate::trimmer::{FslRoi, SliceTrimmer};
pub use crate::workflow::{Failure, Operation, OperationReport, RunSummary, Workflow, WorkflowOptions};
