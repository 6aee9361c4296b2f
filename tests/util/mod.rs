//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use bids_normalizer::{HeaderGeometry, NormalizeError, Result, SliceTrimmer};
use byteordered::ByteOrdered;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::rc::Rc;

/// A minimal little-endian single-file NIfTI-1 header with the given shape,
/// followed by the 4 byte extender.
pub fn nifti1_header(shape: &[u16]) -> Vec<u8> {
    assert!(shape.len() <= 7);
    let mut buf = vec![0u8; 352];
    ByteOrdered::le(&mut buf[0..4]).write_i32(348).unwrap();
    {
        let mut dim = ByteOrdered::le(&mut buf[40..56]);
        dim.write_u16(shape.len() as u16).unwrap();
        for d in shape {
            dim.write_u16(*d).unwrap();
        }
    }
    buf[344..348].copy_from_slice(b"n+1\0");
    buf
}

/// A minimal big-endian NIfTI-2 header with the given shape.
pub fn nifti2_header(shape: &[i64]) -> Vec<u8> {
    assert!(shape.len() <= 7);
    let mut buf = vec![0u8; 544];
    ByteOrdered::be(&mut buf[0..4]).write_i32(540).unwrap();
    buf[4..12].copy_from_slice(b"n+2\0\r\n\x1a\n");
    {
        let mut dim = ByteOrdered::be(&mut buf[16..80]);
        dim.write_i64(shape.len() as i64).unwrap();
        for d in shape {
            dim.write_i64(*d).unwrap();
        }
    }
    buf
}

/// Write `bytes` to `path`, GZip-compressed if the name ends with ".gz".
pub fn write_image_bytes(path: &Path, bytes: &[u8]) {
    if path.to_string_lossy().ends_with(".gz") {
        let mut e = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        e.write_all(bytes).unwrap();
        let _ = e.finish().unwrap();
    } else {
        fs::write(path, bytes).unwrap();
    }
}

/// Write a NIfTI-1 image header with the given shape.
pub fn write_image(path: &Path, shape: &[u16]) {
    write_image_bytes(path, &nifti1_header(shape));
}

/// Write a descriptor with two-space indentation.
pub fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Read a descriptor back as a JSON value.
pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Create `root/name` with the given modality folders.
pub fn make_subject(root: &Path, name: &str, folders: &[&str]) -> PathBuf {
    let dir = root.join(name);
    for folder in folders {
        fs::create_dir_all(dir.join(folder)).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// File names directly inside `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Trimmer that rewrites the header in place instead of calling FSL,
/// remembering every image it was asked to trim.
#[derive(Debug, Clone)]
pub struct RecordingTrimmer {
    pub available: bool,
    /// Report success without touching the image
    pub noop: bool,
    /// Exit unsuccessfully for images whose path contains this
    pub fail_on: Option<String>,
    pub calls: Rc<RefCell<Vec<PathBuf>>>,
}

impl RecordingTrimmer {
    pub fn new() -> Self {
        RecordingTrimmer {
            available: true,
            noop: false,
            fail_on: None,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn unavailable() -> Self {
        RecordingTrimmer {
            available: false,
            ..RecordingTrimmer::new()
        }
    }

    pub fn noop() -> Self {
        RecordingTrimmer {
            noop: true,
            ..RecordingTrimmer::new()
        }
    }

    pub fn failing_on(subject: &str) -> Self {
        RecordingTrimmer {
            fail_on: Some(subject.to_string()),
            ..RecordingTrimmer::new()
        }
    }
}

#[cfg(unix)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

impl SliceTrimmer for RecordingTrimmer {
    fn ensure_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(NormalizeError::ToolNotFound("fslroi".to_string()))
        }
    }

    fn trim(&self, path: &Path, slices: u64) -> Result<()> {
        self.calls.borrow_mut().push(path.to_path_buf());
        if let Some(subject) = &self.fail_on {
            if path.to_string_lossy().contains(subject.as_str()) {
                return Err(NormalizeError::ToolExecution {
                    tool: "fslroi".to_string(),
                    status: exit_status(1),
                    stderr: "Image Exception : cannot open".to_string(),
                });
            }
        }
        if self.noop {
            return Ok(());
        }
        let geometry = HeaderGeometry::from_file(path)?;
        let mut shape: Vec<u16> = geometry.shape().iter().map(|d| *d as u16).collect();
        shape[2] = slices as u16;
        write_image(path, &shape);
        Ok(())
    }
}
