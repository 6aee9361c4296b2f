//! Private utility module
use std::path::Path;

/// File name suffix of descriptor sidecars.
pub const DESCRIPTOR_EXT: &str = ".json";

/// File name suffix of functional images eligible for renaming and trimming.
/// `IntendedFor` links always name this suffix.
pub const IMAGE_EXT: &str = ".nii.gz";

/// Whether the file at `path` should be read through a GZip decoder.
pub fn is_gz_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}

/// Hidden entries (`.DS_Store`, `._foo.json`) are never treated as data.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether `name` is a descriptor sidecar.
pub fn is_descriptor(name: &str) -> bool {
    !is_hidden(name) && name.ends_with(DESCRIPTOR_EXT)
}

/// Whether `name` is a compressed image file.
pub fn is_image(name: &str) -> bool {
    !is_hidden(name) && name.ends_with(IMAGE_EXT)
}
