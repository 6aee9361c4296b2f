//! The normalization workflow.
//!
//! Three operations run in a fixed order, each over a `Classification` of
//! the dataset:
//!
//! 1. [`Workflow::align_slices`]: canonical functional file names, then
//!    trimming of oversized functional images.
//! 2. [`Workflow::sweep_phase_encoding`]: phase encoding normalization of
//!    every descriptor of every subject.
//! 3. [`Workflow::enrich_full_cohort`]: slice timing, readout time, echo
//!    times and `IntendedFor` for subjects that have field maps.
//!
//! Failures on a single file or subject are collected in the operation's
//! report and never stop the run. Only an unreadable dataset root, an
//! invalid configuration or a missing trimming tool abort.

use crate::descriptor::{self, Descriptor};
use crate::error::{NormalizeError, Result};
use crate::inspector::{ImageInspector, NiftiInspector};
use crate::layout::{classify, Classification, Modality, Subject, SubjectMatcher, SubjectPattern};
use crate::mutator::{self, RuleOutcome};
use crate::protocol::AcquisitionProtocol;
use crate::trimmer::{FslRoi, SliceTrimmer};
use crate::util::{is_descriptor, is_image, DESCRIPTOR_EXT, IMAGE_EXT};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Field map descriptors with this in their file name also receive echo times.
pub const PHASEDIFF_MARKER: &str = "phasediff";

/// Already-resolved parameters of a run.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Dataset root
    pub root: PathBuf,
    /// Subject naming scheme
    pub pattern: SubjectPattern,
    /// Metadata defaults and slice geometry
    pub protocol: AcquisitionProtocol,
    /// Time limit for each invocation of the trimming tool
    pub tool_timeout: Option<Duration>,
}

impl WorkflowOptions {
    /// Options with the built-in protocol and no tool timeout.
    pub fn new<P: Into<PathBuf>>(root: P, pattern: SubjectPattern) -> Self {
        WorkflowOptions {
            root: root.into(),
            pattern,
            protocol: AcquisitionProtocol::default(),
            tool_timeout: None,
        }
    }
}

/// The workflow operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Canonical functional file names only
    Rename,
    /// Canonical functional file names and slice count alignment
    SliceAlignment,
    /// Phase encoding normalization
    PhaseEncoding,
    /// Field map cohort enrichment
    Enrichment,
}

/// A unit of work that failed and was skipped.
#[derive(Debug)]
pub struct Failure {
    /// Subject id
    pub subject: String,
    /// File or folder that failed
    pub path: PathBuf,
    /// What went wrong
    pub error: NormalizeError,
}

/// Outcome of one operation.
#[derive(Debug)]
pub struct OperationReport {
    /// Which operation this reports on
    pub operation: Operation,
    /// Number of subjects visited
    pub subjects: usize,
    /// Files rewritten or renamed, at their final path
    pub updated: Vec<PathBuf>,
    /// Files inspected or loaded that needed no change
    pub unchanged: usize,
    /// Images trimmed to the target slice count
    pub trimmed: Vec<PathBuf>,
    /// Skipped units of work
    pub failures: Vec<Failure>,
}

impl OperationReport {
    fn new(operation: Operation) -> Self {
        OperationReport {
            operation,
            subjects: 0,
            updated: Vec::new(),
            unchanged: 0,
            trimmed: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, subject: &str, path: &Path, error: NormalizeError) {
        warn!(subject, path = %path.display(), error = %error, "skipping");
        self.failures.push(Failure {
            subject: subject.to_string(),
            path: path.to_path_buf(),
            error,
        });
    }

    /// Whether every unit of work succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reports of a full run, in execution order.
#[derive(Debug)]
pub struct RunSummary {
    /// One report per operation
    pub reports: Vec<OperationReport>,
}

impl RunSummary {
    /// All failures of the run.
    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.reports.iter().flat_map(|r| r.failures.iter())
    }

    /// Whether every unit of work of every operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.reports.iter().all(OperationReport::is_clean)
    }
}

struct RenamedRun {
    files: Vec<PathBuf>,
    image: Option<PathBuf>,
}

/// Normalization engine over one dataset.
#[derive(Debug)]
pub struct Workflow<I = NiftiInspector, T = FslRoi> {
    root: PathBuf,
    matcher: SubjectMatcher,
    protocol: AcquisitionProtocol,
    inspector: I,
    trimmer: T,
}

impl Workflow<NiftiInspector, FslRoi> {
    /// Workflow reading NIfTI headers and trimming with `fslroi` from `PATH`.
    pub fn new(options: WorkflowOptions) -> Result<Self> {
        let trimmer = FslRoi::new().timeout(options.tool_timeout);
        Workflow::with_tools(options, NiftiInspector, trimmer)
    }
}

impl<I, T> Workflow<I, T>
where
    I: ImageInspector,
    T: SliceTrimmer,
{
    /// Workflow with custom image inspection and trimming.
    pub fn with_tools(options: WorkflowOptions, inspector: I, trimmer: T) -> Result<Self> {
        Ok(Workflow {
            matcher: options.pattern.compile()?,
            root: options.root,
            protocol: options.protocol,
            inspector,
            trimmer,
        })
    }

    /// The protocol in use.
    pub fn protocol(&self) -> &AcquisitionProtocol {
        &self.protocol
    }

    /// Scan the dataset root.
    pub fn classify(&self) -> Result<Classification> {
        let classification = classify(&self.root, &self.matcher)?;
        info!(
            root = %self.root.display(),
            subjects = classification.subjects().count(),
            full = classification.full().count(),
            "classified dataset"
        );
        Ok(classification)
    }

    /// Classify once and run all three operations in order.
    pub fn run(&self) -> Result<RunSummary> {
        let classification = self.classify()?;
        let reports = vec![
            self.align_slices(&classification)?,
            self.sweep_phase_encoding(&classification),
            self.enrich_full_cohort(&classification),
        ];
        let summary = RunSummary { reports };
        info!(
            failures = summary.failures().count(),
            "normalization finished"
        );
        Ok(summary)
    }

    /// Rename the functional image and descriptor of every subject to
    /// `<subject>_task-<task>_bold.<ext>`.
    pub fn rename_functional_files(&self, classification: &Classification) -> OperationReport {
        let mut report = OperationReport::new(Operation::Rename);
        for subject in classification.subjects() {
            report.subjects += 1;
            let _ = self.rename_into(subject, &mut report);
        }
        report
    }

    /// Rename functional files, then bring every functional image to the
    /// target slice count. Images with the oversized count are trimmed, other
    /// counts are reported and left alone.
    ///
    /// # Errors
    ///
    /// - `ToolNotFound` if the trimming tool is unavailable, before any file is touched.
    pub fn align_slices(&self, classification: &Classification) -> Result<OperationReport> {
        self.trimmer.ensure_available()?;
        let mut report = OperationReport::new(Operation::SliceAlignment);
        for subject in classification.subjects() {
            report.subjects += 1;
            let image = match self.rename_into(subject, &mut report) {
                Some(image) => image,
                None => continue,
            };
            match self.align_image(&image) {
                Ok(true) => {
                    info!(subject = %subject.name, path = %image.display(), "trimmed");
                    report.trimmed.push(image);
                }
                Ok(false) => report.unchanged += 1,
                Err(e) => report.fail(&subject.name, &image, e),
            }
        }
        Ok(report)
    }

    /// Normalize the phase encoding field of every descriptor in every
    /// modality folder of every subject.
    pub fn sweep_phase_encoding(&self, classification: &Classification) -> OperationReport {
        let mut report = OperationReport::new(Operation::PhaseEncoding);
        for subject in classification.subjects() {
            report.subjects += 1;
            for &modality in &subject.modalities {
                for path in self.descriptors_in(subject, modality, &mut report) {
                    self.update(&mut report, subject, &path, |record| {
                        let _ = mutator::normalize_phase_encoding(record);
                    });
                }
            }
            debug!(subject = %subject.name, "phase encoding done");
        }
        report
    }

    /// Add slice timing and readout time to functional descriptors, and
    /// `IntendedFor` (plus echo times for phase-difference maps) to field map
    /// descriptors, for subjects with a field map folder.
    pub fn enrich_full_cohort(&self, classification: &Classification) -> OperationReport {
        let mut report = OperationReport::new(Operation::Enrichment);
        let protocol = &self.protocol;
        for subject in classification.full() {
            report.subjects += 1;
            let name = subject.name.as_str();

            if subject.has(Modality::Functional) {
                for path in self.descriptors_in(subject, Modality::Functional, &mut report) {
                    self.update(&mut report, subject, &path, |record| {
                        if mutator::inject_slice_timing(record, protocol)
                            == RuleOutcome::AlreadyPresent
                        {
                            info!(subject = name, path = %path.display(), "SliceTiming already present");
                        }
                        if mutator::inject_total_readout_time(record, protocol)
                            == RuleOutcome::AlreadyPresent
                        {
                            info!(subject = name, path = %path.display(), "TotalReadoutTime already present");
                        }
                    });
                }
            }

            for path in self.descriptors_in(subject, Modality::FieldMap, &mut report) {
                let phasediff = path
                    .file_name()
                    .map(|n| n.to_string_lossy().contains(PHASEDIFF_MARKER))
                    .unwrap_or(false);
                self.update(&mut report, subject, &path, |record| {
                    let _ = mutator::link_intended_for(record, name, protocol);
                    if phasediff {
                        let _ = mutator::inject_echo_times(record, protocol);
                    }
                });
            }
            debug!(subject = name, "enrichment done");
        }
        report
    }

    fn rename_into(&self, subject: &Subject, report: &mut OperationReport) -> Option<PathBuf> {
        let dir = subject.folder(Modality::Functional);
        match self.rename_run(subject, &dir) {
            Ok(renamed) => {
                report.updated.extend(renamed.files);
                let stem = self.protocol.functional_stem(&subject.name);
                Some(
                    renamed
                        .image
                        .unwrap_or_else(|| dir.join(format!("{}{}", stem, IMAGE_EXT))),
                )
            }
            Err(e) => {
                report.fail(&subject.name, &dir, e);
                None
            }
        }
    }

    fn rename_run(&self, subject: &Subject, dir: &Path) -> Result<RenamedRun> {
        if !dir.is_dir() {
            return Err(NormalizeError::NotFound(dir.to_path_buf()));
        }

        let mut images = Vec::new();
        let mut descriptors = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_image(&name) {
                images.push((entry.path(), IMAGE_EXT));
            } else if is_descriptor(&name) {
                descriptors.push((entry.path(), DESCRIPTOR_EXT));
            }
        }
        if images.len() > 1 || descriptors.len() > 1 {
            return Err(NormalizeError::AmbiguousFunctionalRun {
                dir: dir.to_path_buf(),
                images: images.len(),
                descriptors: descriptors.len(),
            });
        }

        let stem = self.protocol.functional_stem(&subject.name);
        let mut renamed = RenamedRun {
            files: Vec::new(),
            image: None,
        };
        for (path, ext) in images.iter().chain(descriptors.iter()) {
            let target = dir.join(format!("{}{}", stem, ext));
            if *path != target {
                fs::rename(path, &target)?;
                debug!(subject = %subject.name, from = %path.display(), to = %target.display(), "renamed");
                renamed.files.push(target.clone());
            }
            if *ext == IMAGE_EXT {
                renamed.image = Some(target);
            }
        }
        Ok(renamed)
    }

    /// Returns whether the image was trimmed.
    fn align_image(&self, image: &Path) -> Result<bool> {
        let target = self.protocol.target_slice_count;
        let count = self.inspector.slice_count(image)?;
        if count == target {
            return Ok(false);
        }
        if count != self.protocol.oversized_slice_count {
            return Err(NormalizeError::UnexpectedSliceCount {
                path: image.to_path_buf(),
                count,
            });
        }

        self.trimmer.trim(image, target)?;

        let count = self.inspector.slice_count(image)?;
        if count != target {
            return Err(NormalizeError::InvalidGeometry {
                path: image.to_path_buf(),
                dims: vec![count],
            });
        }
        Ok(true)
    }

    fn descriptors_in(
        &self,
        subject: &Subject,
        modality: Modality,
        report: &mut OperationReport,
    ) -> Vec<PathBuf> {
        let dir = subject.folder(modality);
        match descriptor::list_descriptors(&dir) {
            Ok(files) => files,
            Err(e) => {
                report.fail(&subject.name, &dir, e);
                Vec::new()
            }
        }
    }

    fn update(
        &self,
        report: &mut OperationReport,
        subject: &Subject,
        path: &Path,
        transform: impl FnOnce(&mut Descriptor),
    ) {
        match descriptor::update(path, transform) {
            Ok(true) => {
                debug!(subject = %subject.name, path = %path.display(), "descriptor updated");
                report.updated.push(path.to_path_buf());
            }
            Ok(false) => report.unchanged += 1,
            Err(e) => report.fail(&subject.name, path, e),
        }
    }
}
