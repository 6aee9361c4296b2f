//! Error types for the normalization engine.

use std::io::Error as IOError;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

quick_error! {
    /// All failures the engine can report.
    #[derive(Debug)]
    pub enum NormalizeError {
        /// A required file or directory does not exist.
        NotFound(path: PathBuf) {
            display("{} does not exist", path.display())
        }
        /// A descriptor file is not well-formed JSON object text.
        Parse { path: PathBuf, err: serde_json::Error } {
            display("malformed descriptor {}: {}", path.display(), err)
            source(err)
        }
        /// An image header could not be decoded.
        Decode { path: PathBuf, reason: String } {
            display("cannot decode image {}: {}", path.display(), reason)
        }
        /// The volume does not have the expected spatial shape.
        InvalidGeometry { path: PathBuf, dims: Vec<u64> } {
            display("unexpected volume geometry in {}: {:?}", path.display(), dims)
        }
        /// A descriptor could not be persisted.
        Write { path: PathBuf, err: IOError } {
            display("cannot write {}: {}", path.display(), err)
            source(err)
        }
        /// The external trimming tool is not resolvable.
        ToolNotFound(tool: String) {
            display("`{}` not found on PATH", tool)
        }
        /// The external trimming tool exited unsuccessfully.
        ToolExecution { tool: String, status: ExitStatus, stderr: String } {
            display("`{}` failed ({}): {}", tool, status, stderr)
        }
        /// The external trimming tool did not finish in time and was killed.
        ToolTimeout { tool: String, timeout: Duration } {
            display("`{}` did not finish within {:?}", tool, timeout)
        }
        /// A functional image has a slice count the pipeline cannot align.
        UnexpectedSliceCount { path: PathBuf, count: u64 } {
            display("{} has {} slices, cannot align", path.display(), count)
        }
        /// A functional folder holds more than one run, renaming would overwrite data.
        AmbiguousFunctionalRun { dir: PathBuf, images: usize, descriptors: usize } {
            display("{} holds {} images and {} descriptors, expected at most one of each",
                dir.display(), images, descriptors)
        }
        /// The dataset root could not be listed.
        RootUnreadable { path: PathBuf, err: IOError } {
            display("cannot read dataset root {}: {}", path.display(), err)
            source(err)
        }
        /// The subject naming pattern does not compile.
        InvalidPattern(err: regex::Error) {
            from()
            display("invalid subject pattern: {}", err)
            source(err)
        }
        /// A protocol override document is malformed.
        Config(err: toml::de::Error) {
            from()
            display("invalid protocol table: {}", err)
            source(err)
        }
        /// A protocol definition is inconsistent.
        InvalidProtocol { name: String, reason: String } {
            display("invalid acquisition protocol `{}`: {}", name, reason)
        }
        /// No protocol with this name exists in the table.
        UnknownProtocol(name: String) {
            display("unknown acquisition protocol `{}`", name)
        }
        /// I/O Error
        Io(err: IOError) {
            from()
            display("I/O error: {}", err)
            source(err)
        }
    }
}

/// Coarse grouping of errors, used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The subject list could not be established.
    Classifier,
    /// Reading, mutating or persisting a descriptor or image failed.
    Mutation,
    /// The external trimming tool is missing or failed.
    Tool,
    /// Pattern or protocol configuration is invalid.
    Configuration,
}

impl ErrorCategory {
    /// Distinct non-zero exit code for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::Classifier => 2,
            ErrorCategory::Mutation => 3,
            ErrorCategory::Tool => 4,
            ErrorCategory::Configuration => 5,
        }
    }
}

impl NormalizeError {
    /// The category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        use self::NormalizeError::*;
        match self {
            RootUnreadable { .. } => ErrorCategory::Classifier,
            ToolNotFound(_) | ToolExecution { .. } | ToolTimeout { .. } => ErrorCategory::Tool,
            InvalidPattern(_) | Config(_) | InvalidProtocol { .. } | UnknownProtocol(_) => {
                ErrorCategory::Configuration
            }
            NotFound(_)
            | Parse { .. }
            | Decode { .. }
            | InvalidGeometry { .. }
            | Write { .. }
            | UnexpectedSliceCount { .. }
            | AmbiguousFunctionalRun { .. }
            | Io(_) => ErrorCategory::Mutation,
        }
    }
}

/// Alias for results of this crate.
pub type Result<T> = ::std::result::Result<T, NormalizeError>;
