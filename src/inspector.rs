//! Read-only inspection of image geometry.

use crate::error::{NormalizeError, Result};
use crate::header::HeaderGeometry;
use std::path::Path;

/// Trait for anything that can report the slice count of an image file.
pub trait ImageInspector {
    /// Extent of the third spatial axis of the image at `path`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file is absent.
    /// - `InvalidGeometry` if the volume has fewer than three dimensions.
    /// - `Decode` for any other read failure.
    fn slice_count(&self, path: &Path) -> Result<u64>;
}

/// Inspector backed by the NIfTI header decoder. Never reads past the header.
#[derive(Debug, Default, Clone, Copy)]
pub struct NiftiInspector;

impl ImageInspector for NiftiInspector {
    fn slice_count(&self, path: &Path) -> Result<u64> {
        let geometry = HeaderGeometry::from_file(path)?;
        geometry
            .slice_count()
            .ok_or_else(|| NormalizeError::InvalidGeometry {
                path: path.to_path_buf(),
                dims: geometry.shape().to_vec(),
            })
    }
}
