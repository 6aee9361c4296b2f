//! Dataset layout: subject discovery and cohort classification.
//!
//! Nothing here is cached. A `Classification` is a read-only view of the
//! dataset root at the time of the scan.

use crate::error::{NormalizeError, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Modality folder of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modality {
    /// Anatomical images, `anat`
    Anatomical,
    /// Functional images, `func`
    Functional,
    /// Field maps, `fmap`
    FieldMap,
}

impl Modality {
    /// All modalities, in traversal order.
    pub const ALL: [Modality; 3] = [Modality::Anatomical, Modality::Functional, Modality::FieldMap];

    /// Folder name inside a subject directory.
    pub fn folder_name(self) -> &'static str {
        match self {
            Modality::Anatomical => "anat",
            Modality::Functional => "func",
            Modality::FieldMap => "fmap",
        }
    }
}

/// How a subject pattern is matched against directory names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The whole name must match.
    Full,
    /// The pattern may occur anywhere in the name, so `sub-hc001_old`
    /// is accepted for `sub-hc` + 3 digits.
    Search,
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Full
    }
}

/// Subject naming scheme: `prefix`, exactly `digits` ASCII digits, `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPattern {
    /// Literal text before the numeric id
    pub prefix: String,
    /// Width of the numeric id
    pub digits: usize,
    /// Literal text after the numeric id
    pub suffix: String,
    /// Matching semantics
    pub mode: MatchMode,
}

impl SubjectPattern {
    /// A fully matched pattern.
    pub fn new<P, S>(prefix: P, digits: usize, suffix: S) -> Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        SubjectPattern {
            prefix: prefix.into(),
            digits,
            suffix: suffix.into(),
            mode: MatchMode::default(),
        }
    }

    /// Change the matching semantics.
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build the matcher for this pattern.
    pub fn compile(&self) -> Result<SubjectMatcher> {
        let core = format!(
            "{}[0-9]{{{}}}{}",
            regex::escape(&self.prefix),
            self.digits,
            regex::escape(&self.suffix)
        );
        let source = match self.mode {
            MatchMode::Full => format!("^{}$", core),
            MatchMode::Search => core,
        };
        Ok(SubjectMatcher {
            regex: Regex::new(&source)?,
        })
    }
}

/// Compiled `SubjectPattern`.
#[derive(Debug, Clone)]
pub struct SubjectMatcher {
    regex: Regex,
}

impl SubjectMatcher {
    /// Whether `name` is a subject name.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// A dataset entry whose name matches the subject pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Entry name, used as the subject id
    pub name: String,
    /// Full path of the entry
    pub path: PathBuf,
    /// Whether the entry is a directory at scan time
    pub is_directory: bool,
    /// Modality folders present at scan time
    pub modalities: Vec<Modality>,
}

impl Subject {
    fn scan(path: PathBuf, name: String) -> Self {
        let is_directory = path.is_dir();
        let modalities = if is_directory {
            Modality::ALL
                .iter()
                .copied()
                .filter(|m| path.join(m.folder_name()).is_dir())
                .collect()
        } else {
            Vec::new()
        };
        Subject {
            name,
            path,
            is_directory,
            modalities,
        }
    }

    /// Whether the modality folder was present.
    pub fn has(&self, modality: Modality) -> bool {
        self.modalities.contains(&modality)
    }

    /// Path of a modality folder, whether or not it exists.
    pub fn folder(&self, modality: Modality) -> PathBuf {
        self.path.join(modality.folder_name())
    }

    /// Whether the subject has a field map folder.
    pub fn has_field_map(&self) -> bool {
        self.has(Modality::FieldMap)
    }
}

/// Subjects of a dataset, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Every root entry matching the pattern, directories or not
    pub matched: Vec<Subject>,
}

impl Classification {
    /// Subject directories, skipping matching entries that are not directories.
    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.matched.iter().filter(|s| s.is_directory)
    }

    /// Subjects without a field map folder.
    pub fn complete(&self) -> impl Iterator<Item = &Subject> {
        self.subjects().filter(|s| !s.has_field_map())
    }

    /// Subjects with a field map folder.
    pub fn full(&self) -> impl Iterator<Item = &Subject> {
        self.subjects().filter(|s| s.has_field_map())
    }
}

/// Scan the entries directly under `root`.
///
/// # Errors
///
/// - `RootUnreadable` if `root` cannot be listed. This is fatal for a run.
pub fn classify<P: AsRef<Path>>(root: P, matcher: &SubjectMatcher) -> Result<Classification> {
    let root = root.as_ref();
    let unreadable = |err| NormalizeError::RootUnreadable {
        path: root.to_path_buf(),
        err,
    };
    let mut matched = Vec::new();
    for entry in fs::read_dir(root).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if !matcher.is_match(&name) {
            continue;
        }
        let subject = Subject::scan(entry.path(), name);
        if !subject.is_directory {
            debug!(subject = %subject.name, "matching entry is not a directory");
        }
        matched.push(subject);
    }
    matched.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Classification { matched })
}
