//! Delft3D time-series boundary file (`.bct`/`.bcc`/`.dis`) I/O.
//!
//! These files carry one block per boundary section or discharge station:
//! `key : value` style header lines, a list of `parameter` declarations
//! (the first is always relative time, the rest are data channels), a
//! `records-in-table` count, and fixed-format data rows whose first column
//! is the offset in minutes from the header's `reference-time`.
//!
//! # File Format
//!
//! ```text
//! table-name           'Boundary Section : 1'
//! contents             'Uniform             '
//! location             '(2,246)..(7,246)    '
//! time-function        'non-equidistant'
//! reference-time       20200304
//! time-unit            'minutes'
//! interpolation        'linear'
//! parameter            'time                '                     unit '[min]'
//! parameter            'flux/discharge  end A'                    unit '[m3/s]'
//! parameter            'flux/discharge  end B'                    unit '[m3/s]'
//! records-in-table     3
//!  0.0000000e+00 -5.2445400e+00 -5.5135700e+00
//!  1.0000000e+01 -5.8022580e+00 -6.1787330e+00
//!  2.0000000e+01 -6.4453150e+00 -6.0000000e+00
//! ```
//!
//! Quoted header values keep their original field widths so an unmodified
//! file serializes back byte-for-byte.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use thiserror::Error;

use super::scan::{self, ExpFormat, LineCursor, ScanError};

/// Column width of the keyword field in header lines.
const KEY_WIDTH: usize = 21;

/// Default quoted-value width for header fields added by mutation.
const DEFAULT_QUOTED_WIDTH: usize = 20;

/// Error type for time-series file operations.
#[derive(Debug, Error)]
pub enum TimeSeriesError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed structure detected during parse.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// File extension does not identify a known dialect.
    #[error("Unsupported time-series extension: {0}")]
    UnsupportedExtension(String),

    /// Reference to a record that does not exist.
    #[error("Record index {index} out of range ({count} records)")]
    RecordIndex { index: usize, count: usize },

    /// Data row width disagrees with the declared channel count.
    #[error("Row at line {line} has {actual} channels, header declares {declared}")]
    RowWidth {
        line: usize,
        declared: usize,
        actual: usize,
    },

    /// Supplied channel tables do not match the declared channel count.
    #[error("Header declares {declared} channels, {supplied} tables supplied")]
    ChannelCount { declared: usize, supplied: usize },

    /// Data rows are not strictly time-ordered.
    #[error("Non-monotonic time offset at line {line}")]
    NonMonotonic { line: usize },

    /// The `reference-time` header is missing or not `YYYYMMDD`.
    #[error("Invalid reference-time '{value}'")]
    ReferenceTime { value: String },
}

impl From<ScanError> for TimeSeriesError {
    fn from(err: ScanError) -> Self {
        TimeSeriesError::Parse {
            line: err.line,
            message: err.message,
        }
    }
}

/// Format dialect of a time-series file, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSeriesDialect {
    /// Flow (`.bct`) or concentration (`.bcc`) boundary conditions.
    BoundaryCondition,
    /// Discharge stations (`.dis`).
    Discharge,
}

impl TimeSeriesDialect {
    /// Map a file extension to its dialect.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "bct" | "bcc" => Some(TimeSeriesDialect::BoundaryCondition),
            "dis" => Some(TimeSeriesDialect::Discharge),
            _ => None,
        }
    }
}

/// Rendering kind of a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Single-quoted string; `width` is the original inner field width.
    Quoted { width: usize },
    /// Unquoted token (numbers, dates).
    Bare,
}

/// One header value with the formatting metadata needed to re-emit it in
/// its original shape.
#[derive(Debug, Clone)]
pub struct HeaderField {
    value: String,
    kind: FieldKind,
    /// Unit segment (`unit '[m3/s]'`) with its original total width.
    unit: Option<(String, usize)>,
}

impl HeaderField {
    fn quoted(value: impl Into<String>) -> Self {
        let value = value.into();
        let width = value.len().max(DEFAULT_QUOTED_WIDTH);
        Self {
            value,
            kind: FieldKind::Quoted { width },
            unit: None,
        }
    }

    fn bare(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: FieldKind::Bare,
            unit: None,
        }
    }

    /// The field value with quotes and padding stripped.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The unit string, if the field carries a `unit '[..]'` segment.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_ref().map(|(u, _)| u.as_str())
    }

    fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    fn set_unit(&mut self, unit: impl Into<String>) {
        let unit = unit.into();
        match &mut self.unit {
            Some((value, _)) => *value = unit,
            None => {
                let width = unit.len() + 9;
                self.unit = Some((unit, width));
            }
        }
    }

    /// Render the value (and unit segment) in its captured format.
    fn render(&self) -> String {
        let mut out = match self.kind {
            FieldKind::Quoted { width } => format!("'{:<width$}'", self.value),
            FieldKind::Bare => self.value.clone(),
        };
        if let Some((unit, width)) = &self.unit {
            let segment = format!("unit '[{unit}]'");
            out.push_str(&format!("{segment:>w$}", w = *width));
        }
        out
    }
}

/// One data row: a time offset in minutes plus one value per channel.
#[derive(Debug, Clone)]
pub struct SeriesRow {
    /// Minutes relative to the record's `reference-time`.
    pub offset_minutes: f64,
    /// Channel values in declared parameter order.
    pub channels: Vec<f64>,
    /// Original line, kept while the series is untouched.
    raw: Option<String>,
}

/// One header+series block of a time-series file.
#[derive(Debug, Clone)]
pub struct TimeSeriesRecord {
    /// Regular header fields in file order (`table-name` first).
    header: Vec<(String, HeaderField)>,
    /// `parameter` declarations in file order; the first is the time
    /// column, the rest are data channels.
    parameters: Vec<(String, HeaderField)>,
    records_in_table: HeaderField,
    rows: Vec<SeriesRow>,
}

impl TimeSeriesRecord {
    /// Number of data channels declared by the header (parameters minus
    /// the time column).
    pub fn channel_count(&self) -> usize {
        self.parameters.len().saturating_sub(1)
    }

    /// Look up a regular header value by key.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        if key == "records-in-table" {
            return Some(self.records_in_table.value());
        }
        self.header
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, f)| f.value())
    }

    /// Declared parameter names in file order (time column included).
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a parameter declaration by name.
    pub fn parameter(&self, name: &str) -> Option<&HeaderField> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    /// The data rows.
    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    /// The record's reference time (header `reference-time`, `YYYYMMDD`).
    pub fn reference_time(&self) -> Result<NaiveDate, TimeSeriesError> {
        let value = self
            .header_value("reference-time")
            .ok_or_else(|| TimeSeriesError::ReferenceTime {
                value: "<missing>".to_string(),
            })?;
        NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| TimeSeriesError::ReferenceTime {
            value: value.to_string(),
        })
    }

    fn set_header(&mut self, patch: &[(&str, &str)]) {
        for &(key, value) in patch {
            if key == "records-in-table" || key == "reference-time" {
                warn!("'{key}' changed by set_header; check the series data against the header");
            }
            if key == "records-in-table" {
                self.records_in_table.set_value(value);
            } else if let Some((_, field)) = self.header.iter_mut().find(|(k, _)| k == key) {
                field.set_value(value);
            } else if let Some((_, field)) = self.parameters.iter_mut().find(|(n, _)| n == key) {
                field.set_value(value);
            } else {
                self.header.push((key.to_string(), HeaderField::quoted(value)));
            }
        }
    }

    fn set_time_series(
        &mut self,
        reference_time: NaiveDate,
        tables: &[BTreeMap<NaiveDateTime, f64>],
    ) -> Result<(), TimeSeriesError> {
        let declared = self.channel_count();
        if tables.len() != declared {
            return Err(TimeSeriesError::ChannelCount {
                declared,
                supplied: tables.len(),
            });
        }

        // Outer join on the union of timestamps, missing values -> 0.
        let timestamps: BTreeSet<NaiveDateTime> =
            tables.iter().flat_map(|t| t.keys().copied()).collect();
        let epoch = reference_time.and_time(NaiveTime::MIN);
        let rows = timestamps
            .into_iter()
            .map(|t| SeriesRow {
                offset_minutes: (t - epoch).num_milliseconds() as f64 / 60_000.0,
                channels: tables.iter().map(|tab| tab.get(&t).copied().unwrap_or(0.0)).collect(),
                raw: None,
            })
            .collect::<Vec<_>>();

        self.records_in_table.set_value(rows.len().to_string());
        if let Some((_, field)) = self
            .header
            .iter_mut()
            .find(|(k, _)| k == "reference-time")
        {
            field.set_value(reference_time.format("%Y%m%d").to_string());
        } else {
            self.header.push((
                "reference-time".to_string(),
                HeaderField::bare(reference_time.format("%Y%m%d").to_string()),
            ));
        }
        self.rows = rows;
        Ok(())
    }

    fn serialize_into(&self, out: &mut String) {
        for (key, field) in &self.header {
            out.push_str(&format!("{key:<KEY_WIDTH$}{}\n", field.render()));
        }
        for (_, field) in &self.parameters {
            out.push_str(&format!("{:<KEY_WIDTH$}{}\n", "parameter", field.render()));
        }
        out.push_str(&format!(
            "{:<KEY_WIDTH$}{}\n",
            "records-in-table",
            self.records_in_table.render()
        ));
        for row in &self.rows {
            match &row.raw {
                Some(raw) => {
                    out.push_str(raw);
                    out.push('\n');
                }
                None => {
                    out.push(' ');
                    out.push_str(&ExpFormat::SERIES.render(row.offset_minutes));
                    for value in &row.channels {
                        out.push(' ');
                        out.push_str(&ExpFormat::SERIES.render(*value));
                    }
                    out.push('\n');
                }
            }
        }
    }
}

/// In-memory model of a Delft3D time-series file: an ordered sequence of
/// records sharing one dialect.
#[derive(Debug, Clone)]
pub struct TimeSeriesFile {
    dialect: TimeSeriesDialect,
    records: Vec<TimeSeriesRecord>,
}

impl TimeSeriesFile {
    /// The file's format dialect.
    pub fn dialect(&self) -> TimeSeriesDialect {
        self.dialect
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the file has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Access a record by index.
    pub fn record(&self, index: usize) -> Option<&TimeSeriesRecord> {
        self.records.get(index)
    }

    /// All records in file order.
    pub fn records(&self) -> &[TimeSeriesRecord] {
        &self.records
    }

    /// Merge `patch` into the header of the record at `index`.
    ///
    /// Existing keys (regular headers and parameter names) are replaced in
    /// place; unknown keys are appended in patch order. Pre-existing key
    /// order is never disturbed.
    ///
    /// # Errors
    /// `RecordIndex` if `index` is out of range; the file is left
    /// unmodified.
    pub fn set_header(&mut self, index: usize, patch: &[(&str, &str)]) -> Result<(), TimeSeriesError> {
        let count = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(TimeSeriesError::RecordIndex { index, count })?;
        record.set_header(patch);
        Ok(())
    }

    /// Set the unit segment of a parameter declaration.
    ///
    /// # Errors
    /// `RecordIndex` if `index` is out of range.
    pub fn set_parameter_unit(
        &mut self,
        index: usize,
        name: &str,
        unit: &str,
    ) -> Result<(), TimeSeriesError> {
        let count = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(TimeSeriesError::RecordIndex { index, count })?;
        if let Some((_, field)) = record.parameters.iter_mut().find(|(n, _)| n == name) {
            field.set_unit(unit);
        }
        Ok(())
    }

    /// Replace the series of the record at `index`.
    ///
    /// One table per declared channel, in declared order; tables are
    /// outer-joined on their timestamp union with missing values filled
    /// with zero, and offsets are minutes from `reference_time`. The
    /// header's `reference-time` and `records-in-table` are updated.
    ///
    /// # Errors
    /// - `RecordIndex` if `index` is out of range.
    /// - `ChannelCount` if the table count disagrees with the header.
    ///
    /// The file is left unmodified on error.
    pub fn set_time_series(
        &mut self,
        index: usize,
        reference_time: NaiveDate,
        tables: &[BTreeMap<NaiveDateTime, f64>],
    ) -> Result<(), TimeSeriesError> {
        let count = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(TimeSeriesError::RecordIndex { index, count })?;
        record.set_time_series(reference_time, tables)
    }

    /// Serialize to the time-series file format.
    ///
    /// An unmodified file reproduces its original bytes.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            record.serialize_into(&mut out);
        }
        out
    }

    /// Write to a file at `path`.
    pub fn to_file(&self, path: &Path) -> Result<(), TimeSeriesError> {
        fs::write(path, self.serialize())?;
        Ok(())
    }
}

/// Read a time-series file, deriving the dialect from the extension.
pub fn read_timeseries_file(path: &Path) -> Result<TimeSeriesFile, TimeSeriesError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let dialect = TimeSeriesDialect::from_extension(ext)
        .ok_or_else(|| TimeSeriesError::UnsupportedExtension(ext.to_string()))?;
    let text = fs::read_to_string(path)?;
    parse_timeseries_file(&text, dialect)
}

/// Parse time-series file content.
///
/// # Errors
/// `Parse`, `RowWidth`, `NonMonotonic` or `ReferenceTime`, all detected
/// eagerly and carrying line context.
pub fn parse_timeseries_file(
    text: &str,
    dialect: TimeSeriesDialect,
) -> Result<TimeSeriesFile, TimeSeriesError> {
    let mut cursor = LineCursor::new(text);
    let mut records = Vec::new();

    while let Some((line_no, line)) = cursor.peek_line() {
        if line.trim().is_empty() {
            cursor.next_line();
            continue;
        }
        if !line.starts_with("table-name") {
            return Err(TimeSeriesError::Parse {
                line: line_no,
                message: "expected 'table-name' at start of record".to_string(),
            });
        }
        records.push(parse_record(&mut cursor)?);
    }

    if records.is_empty() {
        return Err(TimeSeriesError::Parse {
            line: 1,
            message: "file contains no records".to_string(),
        });
    }

    Ok(TimeSeriesFile { dialect, records })
}

/// Parse one header+series block, leaving the cursor at the next
/// `table-name` line (or end of input).
fn parse_record(cursor: &mut LineCursor<'_>) -> Result<TimeSeriesRecord, TimeSeriesError> {
    let mut header: Vec<(String, HeaderField)> = Vec::new();
    let mut parameters: Vec<(String, HeaderField)> = Vec::new();
    let mut records_in_table: Option<HeaderField> = None;

    // Header section, terminated by records-in-table.
    while let Some((line_no, line)) = cursor.next_line() {
        let (key, rest) = split_header_line(line, line_no)?;
        let field = parse_field(rest, line_no)?;
        match key {
            "parameter" => {
                let name = field.value().trim().to_string();
                parameters.push((name, field));
            }
            "records-in-table" => {
                records_in_table = Some(field);
                break;
            }
            _ => header.push((key.to_string(), field)),
        }
    }
    let records_in_table = records_in_table.ok_or_else(|| TimeSeriesError::Parse {
        line: 0,
        message: "record has no 'records-in-table' header".to_string(),
    })?;
    if parameters.len() < 2 {
        return Err(TimeSeriesError::Parse {
            line: 0,
            message: format!(
                "record declares {} parameters, expected time plus at least one channel",
                parameters.len()
            ),
        });
    }
    let declared = parameters.len() - 1;

    // Data rows until the next block or end of input.
    let mut rows: Vec<SeriesRow> = Vec::new();
    while let Some((line_no, line)) = cursor.peek_line() {
        if line.starts_with("table-name") {
            break;
        }
        cursor.next_line();
        if line.trim().is_empty() {
            continue;
        }
        let mut numbers = Vec::new();
        for token in scan::fields(line) {
            numbers.push(scan::parse_f64(token, line_no)?);
        }
        if numbers.len() != declared + 1 {
            return Err(TimeSeriesError::RowWidth {
                line: line_no,
                declared,
                actual: numbers.len().saturating_sub(1),
            });
        }
        let offset_minutes = numbers[0];
        if let Some(last) = rows.last() {
            if offset_minutes <= last.offset_minutes {
                return Err(TimeSeriesError::NonMonotonic { line: line_no });
            }
        }
        rows.push(SeriesRow {
            offset_minutes,
            channels: numbers[1..].to_vec(),
            raw: Some(line.to_string()),
        });
    }

    let record = TimeSeriesRecord {
        header,
        parameters,
        records_in_table,
        rows,
    };
    // Eager reference-time validation; series offsets are meaningless
    // without it.
    record.reference_time()?;
    Ok(record)
}

/// Split a header line into its keyword and value part.
fn split_header_line<'a>(line: &'a str, line_no: usize) -> Result<(&'a str, &'a str), TimeSeriesError> {
    let key_end = line
        .find(|c: char| c.is_whitespace())
        .ok_or_else(|| TimeSeriesError::Parse {
            line: line_no,
            message: "header line has no value".to_string(),
        })?;
    let key = &line[..key_end];
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(TimeSeriesError::Parse {
            line: line_no,
            message: format!("malformed header key '{key}'"),
        });
    }
    Ok((key, line[key_end..].trim_start()))
}

/// Parse a header value: quoted string (width captured) with optional unit
/// segment, or a bare token.
fn parse_field(rest: &str, line_no: usize) -> Result<HeaderField, TimeSeriesError> {
    if let Some(body) = rest.strip_prefix('\'') {
        let close = body.find('\'').ok_or_else(|| TimeSeriesError::Parse {
            line: line_no,
            message: "unterminated quoted value".to_string(),
        })?;
        let inner = &body[..close];
        let remainder = &body[close + 1..];
        let mut field = HeaderField {
            value: inner.to_string(),
            kind: FieldKind::Quoted { width: inner.len() },
            unit: None,
        };
        let trimmed = remainder.trim_end();
        if !trimmed.is_empty() {
            let open = trimmed.find("'[").ok_or_else(|| TimeSeriesError::Parse {
                line: line_no,
                message: format!("unrecognized header trailer '{trimmed}'"),
            })?;
            let close = trimmed[open..].find("]'").ok_or_else(|| TimeSeriesError::Parse {
                line: line_no,
                message: "unterminated unit segment".to_string(),
            })? + open;
            let unit = trimmed[open + 2..close].to_string();
            field.unit = Some((unit, trimmed.len()));
        }
        Ok(field)
    } else {
        let value = rest.trim_end();
        if value.is_empty() {
            return Err(TimeSeriesError::Parse {
                line: line_no,
                message: "header line has no value".to_string(),
            });
        }
        Ok(HeaderField::bare(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TOL: f64 = 1e-12;

    const BCT: &str = "\
table-name           'Boundary Section : 1'
contents             'Uniform             '
location             '(2,246)..(7,246)    '
time-function        'non-equidistant'
reference-time       20200304
time-unit            'minutes'
interpolation        'linear'
parameter            'time                '                     unit '[min]'
parameter            'total discharge (t)  end A'               unit '[m3/s]'
parameter            'total discharge (t)  end B'               unit '[m3/s]'
records-in-table     3
 0.0000000e+00 -5.2445400e+00 -5.5135700e+00
 1.0000000e+01 -5.8022580e+00 -6.1787330e+00
 2.0000000e+01 -6.4453150e+00 -6.0000000e+00
table-name           'Boundary Section : 2'
contents             'Uniform             '
location             '(10,12)..(10,18)    '
time-function        'non-equidistant'
reference-time       20200304
time-unit            'minutes'
interpolation        'linear'
parameter            'time                '                     unit '[min]'
parameter            'water elevation (z)  end A'               unit '[m]'
parameter            'water elevation (z)  end B'               unit '[m]'
records-in-table     2
 0.0000000e+00 1.0000000e-01 1.2000000e-01
 6.0000000e+01 1.5000000e-01 1.7000000e-01
";

    fn parse_bct() -> TimeSeriesFile {
        parse_timeseries_file(BCT, TimeSeriesDialect::BoundaryCondition).unwrap()
    }

    #[test]
    fn test_parse_records() {
        let file = parse_bct();
        assert_eq!(file.len(), 2);
        let rec = file.record(0).unwrap();
        assert_eq!(rec.header_value("location"), Some("(2,246)..(7,246)"));
        assert_eq!(rec.header_value("reference-time"), Some("20200304"));
        assert_eq!(rec.channel_count(), 2);
        assert_eq!(rec.rows().len(), 3);
        assert!((rec.rows()[1].offset_minutes - 10.0).abs() < TOL);
        assert!((rec.rows()[1].channels[0] - -5.802258).abs() < TOL);
        assert_eq!(
            rec.parameter("time").and_then(HeaderField::unit),
            Some("min")
        );
        assert_eq!(
            rec.reference_time().unwrap(),
            NaiveDate::from_ymd_opt(2020, 3, 4).unwrap()
        );
    }

    #[test]
    fn test_roundtrip_untouched() {
        let file = parse_bct();
        assert_eq!(file.serialize(), BCT);
    }

    #[test]
    fn test_read_file_dialect(){
        let mut tmp = tempfile::Builder::new().suffix(".bct").tempfile().unwrap();
        tmp.write_all(BCT.as_bytes()).unwrap();
        let file = read_timeseries_file(tmp.path()).unwrap();
        assert_eq!(file.dialect(), TimeSeriesDialect::BoundaryCondition);

        let plain = NamedTempFile::new().unwrap();
        assert!(matches!(
            read_timeseries_file(plain.path()),
            Err(TimeSeriesError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn test_set_header_in_place() {
        let mut file = parse_bct();
        file.set_header(0, &[("location", "(1,1)..(1,1)")]).unwrap();
        let rec = file.record(0).unwrap();
        assert_eq!(rec.header_value("location"), Some("(1,1)..(1,1)"));
        // Quoted width is preserved: shorter value gets padded.
        assert!(file
            .serialize()
            .contains("location             '(1,1)..(1,1)        '\n"));
    }

    #[test]
    fn test_set_header_isolation() {
        let mut file = parse_bct();
        file.set_header(0, &[("location", "(1,1)..(1,1)")]).unwrap();
        let untouched = file.record(1).unwrap();
        assert_eq!(untouched.header_value("location"), Some("(10,12)..(10,18)"));
    }

    #[test]
    fn test_set_header_appends_unknown_key() {
        let mut file = parse_bct();
        file.set_header(0, &[("fresh-key", "value")]).unwrap();
        let rec = file.record(0).unwrap();
        assert_eq!(rec.header_value("fresh-key"), Some("value"));
        // Existing keys keep their order; the new key lands after them.
        let serialized = file.serialize();
        let interp = serialized.find("interpolation").unwrap();
        let fresh = serialized.find("fresh-key").unwrap();
        assert!(fresh > interp);
    }

    #[test]
    fn test_set_header_parameter_value() {
        let mut file = parse_bct();
        file.set_header(0, &[("time", "relative time")]).unwrap();
        file.set_parameter_unit(0, "time", "hour").unwrap();
        let rec = file.record(0).unwrap();
        let field = rec.parameter("time").unwrap();
        assert_eq!(field.value(), "relative time");
        assert_eq!(field.unit(), Some("hour"));
        assert!(file
            .serialize()
            .contains("parameter            'relative time       '                    unit '[hour]'\n"));
    }

    #[test]
    fn test_set_header_index_error() {
        let mut file = parse_bct();
        assert!(matches!(
            file.set_header(5, &[("location", "x")]),
            Err(TimeSeriesError::RecordIndex { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_set_time_series() {
        let mut file = parse_bct();
        let reference = NaiveDate::from_ymd_opt(2020, 4, 15).unwrap();
        let t = |min: i64| {
            reference.and_time(NaiveTime::MIN) + chrono::Duration::minutes(min)
        };
        let table_a: BTreeMap<_, _> = [(t(0), 100.0), (t(10), 110.0)].into();
        let table_b: BTreeMap<_, _> = [(t(10), 210.0), (t(20), 220.0)].into();
        file.set_time_series(0, reference, &[table_a, table_b]).unwrap();

        let rec = file.record(0).unwrap();
        assert_eq!(rec.header_value("reference-time"), Some("20200415"));
        assert_eq!(rec.header_value("records-in-table"), Some("3"));
        assert_eq!(rec.rows().len(), 3);
        // Outer join: missing entries are zero-filled.
        assert!((rec.rows()[0].channels[1] - 0.0).abs() < TOL);
        assert!((rec.rows()[1].channels[0] - 110.0).abs() < TOL);
        assert!((rec.rows()[2].channels[0] - 0.0).abs() < TOL);
        assert!((rec.rows()[2].offset_minutes - 20.0).abs() < TOL);

        // Replaced series is emitted in the canonical row format.
        let serialized = file.serialize();
        assert!(serialized.contains(" 1.0000000e+01 1.1000000e+02 2.1000000e+02\n"));
        // Second record stays byte-identical.
        assert!(serialized.contains(" 0.0000000e+00 1.0000000e-01 1.2000000e-01\n"));
    }

    #[test]
    fn test_set_time_series_channel_count() {
        let mut file = parse_bct();
        let before = file.serialize();
        let reference = NaiveDate::from_ymd_opt(2020, 4, 15).unwrap();
        let only: BTreeMap<NaiveDateTime, f64> =
            [(reference.and_time(NaiveTime::MIN), 1.0)].into();
        assert!(matches!(
            file.set_time_series(0, reference, &[only]),
            Err(TimeSeriesError::ChannelCount {
                declared: 2,
                supplied: 1
            })
        ));
        assert_eq!(file.serialize(), before, "failed setter must not mutate");
    }

    #[test]
    fn test_row_width_mismatch() {
        let text = BCT.replace(
            " 1.0000000e+01 -5.8022580e+00 -6.1787330e+00",
            " 1.0000000e+01 -5.8022580e+00",
        );
        assert!(matches!(
            parse_timeseries_file(&text, TimeSeriesDialect::BoundaryCondition),
            Err(TimeSeriesError::RowWidth {
                declared: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_non_monotonic_rows() {
        let text = BCT.replace(" 2.0000000e+01", " 5.0000000e+00");
        assert!(matches!(
            parse_timeseries_file(&text, TimeSeriesDialect::BoundaryCondition),
            Err(TimeSeriesError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn test_missing_reference_time() {
        let text = BCT.replace("reference-time       20200304\n", "");
        assert!(matches!(
            parse_timeseries_file(&text, TimeSeriesDialect::BoundaryCondition),
            Err(TimeSeriesError::ReferenceTime { .. })
        ));
    }

    #[test]
    fn test_garbage_header_fails() {
        let text = "table-name garbage without quotes or structure\n";
        assert!(parse_timeseries_file(text, TimeSeriesDialect::BoundaryCondition).is_err());
    }
}
