//! Loading and saving of JSON sidecar descriptors.
//!
//! Records keep their fields in file order, so a load followed by a save
//! reproduces the original field set, order and values.

use crate::error::{NormalizeError, Result};
use crate::util::is_descriptor;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Serializer, Value};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// In-memory descriptor: field name to JSON value, in file order.
pub type Descriptor = Map<String, Value>;

/// Load the descriptor at `path`.
///
/// # Errors
///
/// - `NotFound` if there is no such file.
/// - `Parse` if the content is not a JSON object.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Descriptor> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => BufReader::new(file),
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(NormalizeError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(NormalizeError::Io(e)),
    };
    serde_json::from_reader(file).map_err(|err| NormalizeError::Parse {
        path: path.to_path_buf(),
        err,
    })
}

/// Replace the descriptor at `path` with `record`, indented by four spaces.
/// The previous content stays intact if writing fails.
///
/// # Errors
///
/// - `Write` on permission or disk errors.
pub fn save<P: AsRef<Path>>(path: P, record: &Descriptor) -> Result<()> {
    let path = path.as_ref();
    write_pretty(path, record).map_err(|err| NormalizeError::Write {
        path: path.to_path_buf(),
        err,
    })
}

// Written next to the target and renamed over it, so the old content
// survives any failure before the rename.
fn write_pretty(path: &Path, record: &Descriptor) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        {
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut ser = Serializer::with_formatter(&mut writer, formatter);
            record.serialize(&mut ser).map_err(io::Error::from)?;
        }
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    if let Ok(meta) = fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }
    let _ = temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load, transform and, if anything changed, save the descriptor at `path`.
/// Returns whether the file was rewritten.
pub fn update<P, F>(path: P, transform: F) -> Result<bool>
where
    P: AsRef<Path>,
    F: FnOnce(&mut Descriptor),
{
    let path = path.as_ref();
    let original = load(path)?;
    let mut record = original.clone();
    transform(&mut record);
    if record == original {
        return Ok(false);
    }
    save(path, &record)?;
    Ok(true)
}

/// Descriptor files directly inside `dir`, sorted by name. Hidden files are skipped.
pub fn list_descriptors<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(NormalizeError::NotFound(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if is_descriptor(&name.to_string_lossy()) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
