//! This module defines `HeaderGeometry`, the subset of a NIfTI header
//! describing the shape of the volume.
//!
//! Only the fields needed to reason about slice geometry are decoded. Both
//! NIfTI-1 (348 byte header) and NIfTI-2 (540 byte header) are recognized, in
//! either byte order, optionally GZip-compressed.

use crate::error::{NormalizeError, Result};
use crate::util::is_gz_file;
use byteordered::{ByteOrdered, Endianness};
use flate2::bufread::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Magic code for NIFTI-1 header files (extention ".hdr[.gz]").
pub const MAGIC_CODE_NI1: &[u8; 4] = b"ni1\0";
/// Magic code for full NIFTI-1 files (extention ".nii[.gz]").
pub const MAGIC_CODE_NIP1: &[u8; 4] = b"n+1\0";
/// Magic code for NIFTI-2 header files.
pub const MAGIC_CODE_NI2: &[u8; 8] = b"ni2\0\r\n\x1a\n";
/// Magic code for full NIFTI-2 files.
pub const MAGIC_CODE_NIP2: &[u8; 8] = b"n+2\0\r\n\x1a\n";

/// `sizeof_hdr` of a NIfTI-1 header.
pub const NIFTI1_HEADER_SIZE: i32 = 348;
/// `sizeof_hdr` of a NIfTI-2 header.
pub const NIFTI2_HEADER_SIZE: i32 = 540;

/// Header format revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// NIfTI-1, 16-bit dimensions
    Nifti1,
    /// NIfTI-2, 64-bit dimensions
    Nifti2,
}

/// Volume geometry as stored in the `dim` field of the header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderGeometry {
    /// Header revision
    pub version: Version,
    /// Byte order the header was stored in
    pub endianness: Endianness,
    /// Data array dimensions, `dim[0]` being the number of dimensions
    pub dim: [u64; 8],
}

impl HeaderGeometry {
    /// Read the geometry of the image at `path`.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    ///
    /// A missing file yields `NotFound`, every other failure `Decode`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<HeaderGeometry> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => BufReader::new(file),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NormalizeError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(decode_error(path, &e)),
        };
        let geometry = if is_gz_file(path) {
            HeaderGeometry::from_reader(GzDecoder::new(file))
        } else {
            HeaderGeometry::from_reader(file)
        };
        geometry.map_err(|e| decode_error(path, &e))
    }

    /// Read the geometry from a byte stream positioned at the start of the header.
    /// Format violations are reported as `InvalidData` I/O errors.
    pub fn from_reader<R: Read>(mut input: R) -> io::Result<HeaderGeometry> {
        let mut sizeof_hdr = [0u8; 4];
        input.read_exact(&mut sizeof_hdr)?;
        let le = i32::from_le_bytes(sizeof_hdr);
        let be = i32::from_be_bytes(sizeof_hdr);

        if le == NIFTI1_HEADER_SIZE {
            parse_nifti1(input, Endianness::Little)
        } else if be == NIFTI1_HEADER_SIZE {
            parse_nifti1(input, Endianness::Big)
        } else if le == NIFTI2_HEADER_SIZE {
            parse_nifti2(input, Endianness::Little)
        } else if be == NIFTI2_HEADER_SIZE {
            parse_nifti2(input, Endianness::Big)
        } else {
            Err(invalid(format!("unrecognized header size {}", le)))
        }
    }

    fn new(version: Version, endianness: Endianness, raw: [i64; 8]) -> io::Result<Self> {
        if raw[0] < 1 || raw[0] > 7 {
            return Err(invalid(format!("dimension count {} out of range", raw[0])));
        }
        let ndim = raw[0] as usize;
        let mut dim = [0u64; 8];
        dim[0] = raw[0] as u64;
        for (d, &r) in dim[1..=ndim].iter_mut().zip(&raw[1..=ndim]) {
            if r < 0 {
                return Err(invalid(format!("negative dimension {}", r)));
            }
            *d = r as u64;
        }
        // slots past dim[0] are unused and often hold garbage
        for (d, &r) in dim[ndim + 1..].iter_mut().zip(&raw[ndim + 1..]) {
            *d = r.max(0) as u64;
        }
        Ok(HeaderGeometry {
            version,
            endianness,
            dim,
        })
    }

    /// Number of dimensions of the volume.
    pub fn ndim(&self) -> usize {
        self.dim[0] as usize
    }

    /// The extent of each dimension in use.
    pub fn shape(&self) -> &[u64] {
        &self.dim[1..=self.ndim()]
    }

    /// Extent of the third spatial axis, if the volume has one.
    pub fn slice_count(&self) -> Option<u64> {
        self.shape().get(2).copied()
    }
}

fn parse_nifti1<R: Read>(mut input: R, endianness: Endianness) -> io::Result<HeaderGeometry> {
    // remainder of the 348 byte header, after sizeof_hdr
    let mut rest = [0u8; 344];
    input.read_exact(&mut rest)?;

    let magic = &rest[340..344];
    if magic != MAGIC_CODE_NI1 && magic != MAGIC_CODE_NIP1 {
        return Err(invalid("bad NIfTI-1 magic code"));
    }

    let mut dims = ByteOrdered::runtime(&rest[36..52], endianness);
    let mut raw = [0i64; 8];
    for v in &mut raw {
        *v = i64::from(dims.read_i16()?);
    }
    HeaderGeometry::new(Version::Nifti1, endianness, raw)
}

fn parse_nifti2<R: Read>(mut input: R, endianness: Endianness) -> io::Result<HeaderGeometry> {
    let mut rest = [0u8; 536];
    input.read_exact(&mut rest)?;

    let magic = &rest[0..8];
    if magic != MAGIC_CODE_NI2 && magic != MAGIC_CODE_NIP2 {
        return Err(invalid("bad NIfTI-2 magic code"));
    }

    // datatype and bitpix sit between the magic code and dim
    let mut dims = ByteOrdered::runtime(&rest[12..76], endianness);
    let mut raw = [0i64; 8];
    for v in &mut raw {
        *v = dims.read_i64()?;
    }
    HeaderGeometry::new(Version::Nifti2, endianness, raw)
}

fn invalid<M: Into<String>>(msg: M) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn decode_error(path: &Path, e: &io::Error) -> NormalizeError {
    let reason = if e.kind() == io::ErrorKind::UnexpectedEof {
        "truncated header".to_string()
    } else {
        e.to_string()
    };
    NormalizeError::Decode {
        path: path.to_path_buf(),
        reason,
    }
}
