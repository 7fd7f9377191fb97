// VecBench — npy.rs
// NumPy .npy float32 (N, D) reader, exposed as a vector source.
//
// .npy format (simplified):
//   - Magic:   \x93NUMPY
//   - Version: 1.0 / 2.0
//   - Header:  variable-length dict describing dtype, shape, order
//   - Data:    raw little-endian float32 values (row-major)
//
// Author: d65v <https://github.com/d65v>

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::vectors::VectorSource;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not a .npy file (bad magic bytes)")]
    BadMagic,

    #[error("Unsupported .npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("Header parse error: {0}")]
    ParseError(String),

    #[error("Unsupported dtype: {0} (need little-endian float32)")]
    UnsupportedDtype(String),

    #[error("Fortran-ordered arrays are not supported")]
    FortranOrder,

    #[error("Array must be 2-D (N, D)")]
    WrongShape,
}

// ── Header ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpyHeader {
    pub rows: usize,
    pub cols: usize,
}

/// Parse a .npy v1 / v2 header. Returns the shape and the data offset.
pub fn parse_header(data: &[u8]) -> Result<(NpyHeader, usize), NpyError> {
    if !data.starts_with(NPY_MAGIC) {
        return Err(NpyError::BadMagic);
    }
    if data.len() < 10 {
        return Err(NpyError::ParseError("file too short for preamble".into()));
    }

    let major = data[6];
    let minor = data[7];

    // Header length: 2 bytes (v1) or 4 bytes (v2) little-endian
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10usize),
        2 if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12usize,
        ),
        2 => return Err(NpyError::ParseError("file too short for preamble".into())),
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let header_end = header_start + header_len;
    if data.len() < header_end {
        return Err(NpyError::ParseError("file too short for declared header".into()));
    }

    let header = std::str::from_utf8(&data[header_start..header_end])
        .map_err(|_| NpyError::ParseError("header is not valid UTF-8".into()))?;

    let descr = dict_value(header, "descr")
        .ok_or_else(|| NpyError::ParseError("no 'descr' key".into()))?;
    let dtype = descr.trim_matches(|c| c == '\'' || c == '"');
    if dtype != "<f4" && dtype != "float32" {
        return Err(NpyError::UnsupportedDtype(dtype.to_string()));
    }

    if dict_value(header, "fortran_order").map_or(false, |v| v.starts_with("True")) {
        return Err(NpyError::FortranOrder);
    }

    let shape = dict_value(header, "shape")
        .ok_or_else(|| NpyError::ParseError("no 'shape' key".into()))?;
    let inner = shape
        .strip_prefix('(')
        .and_then(|s| s.find(')').map(|end| &s[..end]))
        .ok_or_else(|| NpyError::ParseError("malformed shape tuple".into()))?;
    let dims: Vec<usize> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| NpyError::ParseError(format!("bad shape '{}'", inner)))?;

    match dims.as_slice() {
        [rows, cols] => Ok((NpyHeader { rows: *rows, cols: *cols }, header_end)),
        _ => Err(NpyError::WrongShape),
    }
}

/// Raw text following `'key':` in the header dict.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let single = format!("'{}':", key);
    let double = format!("\"{}\":", key);
    let (pos, len) = header
        .find(&single)
        .map(|p| (p, single.len()))
        .or_else(|| header.find(&double).map(|p| (p, double.len())))?;
    let rest = header[pos + len..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|e| e + 1)
    } else {
        rest.find(',')
    };
    Some(rest[..end.unwrap_or(rest.len())].trim())
}

// ── Source ────────────────────────────────────────────────────────────────────

/// Rows of a `.npy` file. The whole file is held in memory.
pub struct NpySource {
    header: NpyHeader,
    data: Vec<u8>,
    row: usize,
    skipped: usize,
    reported: bool,
}

impl NpySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NpyError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, NpyError> {
        let (header, offset) = parse_header(&raw)?;

        // 4 bytes per f32
        let expected = header
            .rows
            .checked_mul(header.cols)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                NpyError::ParseError(format!(
                    "shape ({}, {}) is too large",
                    header.rows, header.cols
                ))
            })?;
        let available = raw.len() - offset;
        if available < expected {
            return Err(NpyError::ParseError(format!(
                "data section too small: expected {} bytes, got {}",
                expected, available
            )));
        }

        log::debug!("npy: shape ({}, {})", header.rows, header.cols);

        let data = raw[offset..offset + expected].to_vec();
        Ok(Self {
            header,
            data,
            row: 0,
            skipped: 0,
            reported: false,
        })
    }

    pub fn header(&self) -> NpyHeader {
        self.header
    }

    /// Rows dropped so far because they held NaN or Inf.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_row(&self, row: usize) -> Vec<f32> {
        let width = self.header.cols * 4;
        self.data[row * width..(row + 1) * width]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl Iterator for NpySource {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        while self.row < self.header.rows {
            let row = self.row;
            self.row += 1;
            let vector = self.decode_row(row);
            if vector.iter().all(|x| x.is_finite()) {
                return Some(vector);
            }
            log::warn!("npy: row {} contains NaN/Inf, skipping", row);
            self.skipped += 1;
        }
        if !self.reported {
            self.reported = true;
            if self.skipped > 0 {
                log::warn!(
                    "npy: skipped {} of {} rows containing NaN/Inf",
                    self.skipped,
                    self.header.rows
                );
            }
        }
        None
    }
}

impl VectorSource for NpySource {
    fn dim(&self) -> usize {
        self.header.cols
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a .npy v1.0 buffer from a header dict and row-major values.
    fn make_npy_with(dict: &str, values: &[f32]) -> Vec<u8> {
        let mut hdr = dict.as_bytes().to_vec();
        hdr.push(b'\n');
        while (10 + hdr.len()) % 64 != 0 {
            hdr.insert(hdr.len() - 1, b' ');
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(NPY_MAGIC);
        buf.push(1); // major
        buf.push(0); // minor
        buf.extend_from_slice(&(hdr.len() as u16).to_le_bytes());
        buf.extend_from_slice(&hdr);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    fn make_npy(rows: usize, cols: usize, values: &[f32]) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
            rows, cols
        );
        make_npy_with(&dict, values)
    }

    #[test]
    fn test_parse_valid_header() {
        let npy = make_npy(10, 4, &[0.5; 40]);
        let (header, offset) = parse_header(&npy).unwrap();
        assert_eq!(header, NpyHeader { rows: 10, cols: 4 });
        assert_eq!(offset % 64, 0);
    }

    #[test]
    fn test_bad_magic() {
        let bad = b"NOT_NPY\x01\x00\x00\x00".to_vec();
        assert!(matches!(parse_header(&bad), Err(NpyError::BadMagic)));
    }

    #[test]
    fn test_1d_shape_fails() {
        let npy = make_npy_with(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (10,), }",
            &[0.0; 10],
        );
        assert!(matches!(parse_header(&npy), Err(NpyError::WrongShape)));
    }

    #[test]
    fn test_fortran_order_rejected() {
        let npy = make_npy_with(
            "{'descr': '<f4', 'fortran_order': True, 'shape': (2, 2), }",
            &[0.0; 4],
        );
        assert!(matches!(parse_header(&npy), Err(NpyError::FortranOrder)));
    }

    #[test]
    fn test_float64_rejected() {
        let npy = make_npy_with(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (2, 2), }",
            &[0.0; 8],
        );
        assert!(matches!(parse_header(&npy), Err(NpyError::UnsupportedDtype(_))));
    }

    #[test]
    fn test_truncated_data_rejected() {
        let npy = make_npy(3, 4, &[1.0; 5]);
        assert!(matches!(
            NpySource::from_bytes(npy),
            Err(NpyError::ParseError(_))
        ));
    }

    #[test]
    fn test_oversized_shape_rejected() {
        let npy = make_npy_with(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (4611686018427387904, 2), }",
            &[1.0; 2],
        );
        match NpySource::from_bytes(npy) {
            Err(NpyError::ParseError(msg)) => assert!(msg.contains("too large")),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("oversized shape accepted"),
        }
    }

    #[test]
    fn test_rows_in_order_and_nan_skipped() {
        let values = [1.0, 2.0, f32::NAN, 0.0, 5.0, 6.0];
        let mut src = NpySource::from_bytes(make_npy(3, 2, &values)).unwrap();
        assert_eq!(src.dim(), 2);
        assert_eq!(src.next_batch(10), vec![vec![1.0, 2.0], vec![5.0, 6.0]]);
        assert_eq!(src.skipped(), 1);
        assert_eq!(src.next(), None);
        assert_eq!(src.skipped(), 1);
    }

    #[test]
    fn test_open_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&make_npy(8, 3, &[0.25; 24])).unwrap();

        let src = NpySource::open(file.path()).unwrap();
        assert_eq!(src.header(), NpyHeader { rows: 8, cols: 3 });
        assert_eq!(src.count(), 8);
    }
}
