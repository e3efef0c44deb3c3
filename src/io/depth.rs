//! Delft3D depth (`.dep`) file I/O.
//!
//! A dep file carries one depth value per grid corner: `n + 1` records of
//! `m + 1` values for an `m` by `n` grid, each record wrapped at twelve
//! values per line in `%16.7E` fields. The trailing record and trailing
//! column are padding and always hold the `-999` sentinel, which also marks
//! missing depths inside the matrix.
//!
//! # File Format
//!
//! ```text
//!    1.6929708E-01   2.8992051E-01   5.0572435E-01  -9.9900000E+02
//!   -5.0850775E-02   3.1147481E-01   4.6392793E-01  -9.9900000E+02
//!   -9.9900000E+02  -9.9900000E+02  -9.9900000E+02  -9.9900000E+02
//! ```
//!
//! Only the interior `n` by `m` matrix is held in memory; the padding is
//! regenerated on write. Untouched files serialize back byte-for-byte.

use std::fs;
use std::path::Path;

use thiserror::Error;

use super::grid::GrdFile;
use super::scan::{self, ExpFormat, LineCursor, ScanError};

/// Sentinel marking a missing depth value.
pub const MISSING_DEPTH: f64 = -999.0;

/// Values per physical line in a depth record.
const VALUES_PER_LINE: usize = 12;

/// Error type for dep file operations.
#[derive(Debug, Error)]
pub enum DepthError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed content detected during parse.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Depth value count disagrees with the grid dimensions.
    #[error("Depth file holds {actual} values, a {m}x{n} grid requires {expected}")]
    Dimension {
        m: usize,
        n: usize,
        expected: usize,
        actual: usize,
    },

    /// Replacement matrix does not match the grid dimensions.
    #[error("Shape mismatch: expected {expected_rows}x{expected_cols}, got {actual_rows}x{actual_cols}")]
    Shape {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },
}

impl From<ScanError> for DepthError {
    fn from(err: ScanError) -> Self {
        DepthError::Parse {
            line: err.line,
            message: err.message,
        }
    }
}

/// In-memory model of a Delft3D dep file.
///
/// The grid dimensions are captured at construction; the interior matrix
/// is stored as `n` rows of `m` values with the padding stripped.
#[derive(Debug, Clone)]
pub struct DepFile {
    m: usize,
    n: usize,
    /// Interior depth matrix, sentinel values kept verbatim.
    data: Vec<Vec<f64>>,
    /// Original file lines, kept while the data is untouched.
    layout: Option<Vec<String>>,
}

impl DepFile {
    /// Number of depth columns (the grid's `M` dimension).
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of depth rows (the grid's `N` dimension).
    pub fn n(&self) -> usize {
        self.n
    }

    /// The interior depth matrix, `n` rows of `m` values.
    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    /// Depth at `(m, n)`, or `None` if out of range or marked missing.
    pub fn depth(&self, m: usize, n: usize) -> Option<f64> {
        let value = *self.data.get(n)?.get(m)?;
        (value != MISSING_DEPTH).then_some(value)
    }

    /// Replace the interior depth matrix.
    ///
    /// # Errors
    /// `Shape` if `data` is not `n` rows of `m` values; the model is left
    /// unmodified.
    pub fn set_dep(&mut self, data: Vec<Vec<f64>>) -> Result<(), DepthError> {
        if data.len() != self.n || data.iter().any(|row| row.len() != self.m) {
            return Err(DepthError::Shape {
                expected_rows: self.n,
                expected_cols: self.m,
                actual_rows: data.len(),
                actual_cols: data.first().map_or(0, Vec::len),
            });
        }
        self.data = data;
        self.layout = None;
        Ok(())
    }

    /// Serialize to the dep file format, regenerating the sentinel padding
    /// row and column.
    ///
    /// An unmodified file reproduces its original bytes.
    pub fn serialize(&self) -> String {
        if let Some(layout) = &self.layout {
            let mut out = String::new();
            for line in layout {
                out.push_str(line);
                out.push('\n');
            }
            return out;
        }

        let mut out = String::new();
        let pad_row = vec![MISSING_DEPTH; self.m];
        for row in self.data.iter().chain(std::iter::once(&pad_row)) {
            let mut written = 0;
            for value in row.iter().chain(std::iter::once(&MISSING_DEPTH)) {
                out.push_str(&ExpFormat::DEPTH.render(*value));
                written += 1;
                if written % VALUES_PER_LINE == 0 {
                    out.push('\n');
                }
            }
            if written % VALUES_PER_LINE != 0 {
                out.push('\n');
            }
        }
        out
    }

    /// Write to a dep file at `path`.
    pub fn to_file(&self, path: &Path) -> Result<(), DepthError> {
        fs::write(path, self.serialize())?;
        Ok(())
    }
}

/// Read a dep file from `path`, validated against `grd`.
pub fn read_dep_file(path: &Path, grd: &GrdFile) -> Result<DepFile, DepthError> {
    let text = fs::read_to_string(path)?;
    parse_dep(&text, grd)
}

/// Parse dep file content against the grid it belongs to.
///
/// The value count must be exactly `(m + 1) * (n + 1)`; line structure
/// within a record is not significant.
///
/// # Errors
/// `Parse` on non-numeric fields, `Dimension` if the value count does not
/// match the grid.
pub fn parse_dep(text: &str, grd: &GrdFile) -> Result<DepFile, DepthError> {
    let (m, n) = (grd.m(), grd.n());
    let expected = (m + 1) * (n + 1);

    let mut cursor = LineCursor::new(text);
    let mut values = Vec::with_capacity(expected);
    let mut layout = Vec::new();
    while let Some((line_no, line)) = cursor.next_line() {
        layout.push(line.to_string());
        for token in scan::fields(line) {
            values.push(scan::parse_f64(token, line_no)?);
        }
    }
    if values.len() != expected {
        return Err(DepthError::Dimension {
            m,
            n,
            expected,
            actual: values.len(),
        });
    }

    // Strip the padding: keep the first m values of the first n records.
    let data = values
        .chunks(m + 1)
        .take(n)
        .map(|record| record[..m].to_vec())
        .collect();

    Ok(DepFile {
        m,
        n,
        data,
        layout: Some(layout),
    })
}
