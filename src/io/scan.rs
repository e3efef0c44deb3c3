//! Low-level line and field scanning shared by the file codecs.
//!
//! Delft3D input files are line-oriented Fortran-style text: fixed keyword
//! columns, whitespace-separated numeric fields, and scientific notation
//! with a two-digit signed exponent (`1.6929708E-01`). Rust's `{:e}`
//! formatting writes `1.6929708e-1`, so the writers here go through
//! [`ExpFormat`] to reproduce the exact on-disk shape.
//!
//! All parse helpers carry a 1-based line number so codec errors can point
//! at the offending line.

use thiserror::Error;

/// Error raised by the scanning helpers.
///
/// Codec modules convert this into their own `Parse` variants.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ScanError {
    /// 1-based line number of the fault.
    pub line: usize,
    /// Description of the fault.
    pub message: String,
}

impl ScanError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Cursor over the lines of a text buffer with 1-based line numbers.
pub struct LineCursor<'a> {
    inner: std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>,
}

impl<'a> LineCursor<'a> {
    /// Create a cursor over `text`.
    pub fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate().peekable(),
        }
    }

    /// Advance and return the next line as `(line_number, text)`.
    pub fn next_line(&mut self) -> Option<(usize, &'a str)> {
        self.inner.next().map(|(i, l)| (i + 1, l))
    }

    /// Look at the next line without consuming it.
    pub fn peek_line(&mut self) -> Option<(usize, &'a str)> {
        self.inner.peek().map(|&(i, l)| (i + 1, l))
    }
}

/// Split a line into whitespace-separated fields.
pub fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split_whitespace()
}

/// Parse a whitespace-separated field as `f64`, reporting the line number
/// on failure.
pub fn parse_f64(token: &str, line: usize) -> Result<f64, ScanError> {
    token
        .parse::<f64>()
        .map_err(|_| ScanError::new(line, format!("invalid number '{token}'")))
}

/// Parse a whitespace-separated field as `usize`, reporting the line number
/// on failure.
pub fn parse_usize(token: &str, line: usize) -> Result<usize, ScanError> {
    token
        .parse::<usize>()
        .map_err(|_| ScanError::new(line, format!("invalid integer '{token}'")))
}

/// Fortran/C style scientific-notation format: fixed precision, two-digit
/// signed exponent, optional right-justified field width.
///
/// `ExpFormat { precision: 7, width: Some(16), uppercase: true }` renders
/// `0.16929708` as `"  1.6929708E-01"` (the `%16.7E` of the depth writer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpFormat {
    /// Digits after the decimal point.
    pub precision: usize,
    /// Total field width (right-justified) if fixed.
    pub width: Option<usize>,
    /// `E` exponent marker instead of `e`.
    pub uppercase: bool,
}

impl ExpFormat {
    /// `%.7e` — time-series data rows and mdf numbers.
    pub const SERIES: Self = Self {
        precision: 7,
        width: None,
        uppercase: false,
    };

    /// `%.17E` — grid coordinate values.
    pub const GRID: Self = Self {
        precision: 17,
        width: None,
        uppercase: true,
    };

    /// `%16.7E` — depth matrix values.
    pub const DEPTH: Self = Self {
        precision: 7,
        width: Some(16),
        uppercase: true,
    };

    /// Render `value` in this format.
    pub fn render(&self, value: f64) -> String {
        let raw = if self.uppercase {
            format!("{:.*E}", self.precision, value)
        } else {
            format!("{:.*e}", self.precision, value)
        };
        let marker = if self.uppercase { 'E' } else { 'e' };
        // Rust emits a bare exponent ("e-1"); Fortran wants sign + 2 digits.
        let (mantissa, exponent) = raw
            .split_once(marker)
            .expect("exponential format always contains a marker");
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        let body = format!("{mantissa}{marker}{sign}{digits:0>2}");
        match self.width {
            Some(width) => format!("{body:>width$}"),
            None => body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_format() {
        assert_eq!(ExpFormat::SERIES.render(0.0), "0.0000000e+00");
        assert_eq!(ExpFormat::SERIES.render(-5.24454), "-5.2445400e+00");
        assert_eq!(ExpFormat::SERIES.render(100.0), "1.0000000e+02");
        assert_eq!(ExpFormat::SERIES.render(0.5), "5.0000000e-01");
    }

    #[test]
    fn test_grid_format() {
        assert_eq!(ExpFormat::GRID.render(12.5), "1.25000000000000000E+01");
        assert_eq!(ExpFormat::GRID.render(0.0), "0.00000000000000000E+00");
    }

    #[test]
    fn test_depth_format_width() {
        assert_eq!(ExpFormat::DEPTH.render(0.16929708), "  1.6929708E-01");
        assert_eq!(ExpFormat::DEPTH.render(-999.0), " -9.9900000E+02");
        assert_eq!(ExpFormat::DEPTH.render(-0.050850775), " -5.0850775E-02");
    }

    #[test]
    fn test_large_exponent_not_truncated() {
        assert_eq!(ExpFormat::SERIES.render(1.0e123), "1.0000000e+123");
    }

    #[test]
    fn test_line_cursor_numbers() {
        let mut cursor = LineCursor::new("a\nb\nc");
        assert_eq!(cursor.peek_line(), Some((1, "a")));
        assert_eq!(cursor.next_line(), Some((1, "a")));
        assert_eq!(cursor.next_line(), Some((2, "b")));
        assert_eq!(cursor.peek_line(), Some((3, "c")));
        assert_eq!(cursor.next_line(), Some((3, "c")));
        assert_eq!(cursor.next_line(), None);
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = parse_f64("bogus", 17).unwrap_err();
        assert_eq!(err.line, 17);
        assert!(parse_usize("12", 1).is_ok());
    }
}
