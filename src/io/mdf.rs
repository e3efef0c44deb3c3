//! Delft3D master definition file (`.mdf`) I/O.
//!
//! An mdf file drives a FLOW run: one `key = value` parameter per line,
//! keys left-justified in a six-column field, with three value families
//! (numbers, `#..#` strings, `[..]` bracket strings) and two multi-line
//! continuation forms (column arrays indented ten spaces, string lists
//! indented nine).
//!
//! # File Format
//!
//! ```text
//! Ident  = #Delft3D-FLOW  .03.02 3.39.25#
//! Runtxt = #Test run#
//!          #second line#
//! Filcco = #river.grd#
//! Anglat = 2.2000000e+01
//! MNKmax = 246 7 1
//! Flmap  = 0.0000000e+00
//!           6.0000000e+01
//!           4.3200000e+03
//! ```
//!
//! Records keep their position and their original lines, so an untouched
//! file (including `Commnt` records, which the model ignores) serializes
//! back byte-for-byte. Mutating a parameter rewrites only that record, in
//! the canonical format above.

use std::fs;
use std::path::Path;

use thiserror::Error;

use super::scan::{self, ExpFormat, LineCursor, ScanError};

/// Parameters written as integers instead of `%.7e` floats.
const INT_KEYS: [&str; 5] = ["MNKmax", "Ktemp", "Ivapop", "Irov", "Iter"];

/// Error type for mdf file operations.
#[derive(Debug, Error)]
pub enum MdfError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed content detected during parse.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl From<ScanError> for MdfError {
    fn from(err: ScanError) -> Self {
        MdfError::Parse {
            line: err.line,
            message: err.message,
        }
    }
}

/// Typed value of one mdf parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum MdfValue {
    /// Single number (`Dt     = 1.0000000e+00`).
    Number(f64),
    /// Numbers on one line (`MNKmax = 246 7 1`).
    Numbers(Vec<f64>),
    /// One number per line, continuations indented ten spaces (`Flmap`).
    Column(Vec<f64>),
    /// `#..#` string with the hashes stripped.
    Text(String),
    /// `[..]` bracket string, kept verbatim.
    Bracketed(String),
    /// One `#..#` string per line, continuations indented nine spaces
    /// (`Runtxt`).
    Lines(Vec<String>),
}

impl MdfValue {
    /// The value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MdfValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a hashed string, if it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MdfValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The numbers of a `Numbers` or `Column` value.
    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            MdfValue::Numbers(v) | MdfValue::Column(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for MdfValue {
    fn from(value: f64) -> Self {
        MdfValue::Number(value)
    }
}

impl From<Vec<f64>> for MdfValue {
    fn from(value: Vec<f64>) -> Self {
        MdfValue::Numbers(value)
    }
}

impl From<&str> for MdfValue {
    fn from(value: &str) -> Self {
        if value.contains('[') {
            MdfValue::Bracketed(value.to_string())
        } else {
            MdfValue::Text(value.to_string())
        }
    }
}

impl From<String> for MdfValue {
    fn from(value: String) -> Self {
        MdfValue::from(value.as_str())
    }
}

/// One positional record of the file.
#[derive(Debug, Clone)]
enum Record {
    /// A line carried verbatim: blank lines and `Commnt` records, which
    /// the model ignores.
    Verbatim(String),
    /// A parameter with its original lines, kept while untouched.
    Parameter {
        key: String,
        value: MdfValue,
        raw: Option<Vec<String>>,
    },
}

/// In-memory model of a Delft3D mdf file with record order preserved.
#[derive(Debug, Clone)]
pub struct MdfFile {
    records: Vec<Record>,
}

impl MdfFile {
    /// Look up a parameter value by key.
    pub fn parm(&self, key: &str) -> Option<&MdfValue> {
        self.records.iter().find_map(|record| match record {
            Record::Parameter { key: k, value, .. } if k == key => Some(value),
            _ => None,
        })
    }

    /// Parameter keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().filter_map(|record| match record {
            Record::Parameter { key, .. } => Some(key.as_str()),
            _ => None,
        })
    }

    /// Set a parameter value.
    ///
    /// An existing parameter is replaced in place and rewritten in the
    /// canonical format on the next serialize; an unknown key is appended
    /// at the end of the file.
    pub fn set_parm(&mut self, key: &str, value: impl Into<MdfValue>) {
        let value = value.into();
        for record in &mut self.records {
            if let Record::Parameter { key: k, value: v, raw } = record {
                if k == key {
                    *v = value;
                    *raw = None;
                    return;
                }
            }
        }
        self.records.push(Record::Parameter {
            key: key.to_string(),
            value,
            raw: None,
        });
    }

    /// Remove a parameter. Returns whether the key was present.
    pub fn remove_parm(&mut self, key: &str) -> bool {
        let before = self.records.len();
        self.records.retain(
            |record| !matches!(record, Record::Parameter { key: k, .. } if k == key),
        );
        self.records.len() != before
    }

    /// Serialize to the mdf file format.
    ///
    /// An unmodified file reproduces its original bytes.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            match record {
                Record::Verbatim(line) => {
                    out.push_str(line);
                    out.push('\n');
                }
                Record::Parameter { raw: Some(lines), .. } => {
                    for line in lines {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                Record::Parameter { key, value, raw: None } => {
                    render_parameter(&mut out, key, value);
                }
            }
        }
        out
    }

    /// Write to an mdf file at `path`.
    pub fn to_file(&self, path: &Path) -> Result<(), MdfError> {
        fs::write(path, self.serialize())?;
        Ok(())
    }
}

/// Render one parameter in the canonical mdf format.
fn render_parameter(out: &mut String, key: &str, value: &MdfValue) {
    let number = |v: f64| {
        if INT_KEYS.contains(&key) {
            format!("{}", v as i64)
        } else {
            ExpFormat::SERIES.render(v)
        }
    };
    match value {
        MdfValue::Number(v) => {
            out.push_str(&format!("{key:<6} = {}\n", number(*v)));
        }
        MdfValue::Numbers(values) => {
            out.push_str(&format!("{key:<6} ="));
            for v in values {
                out.push(' ');
                out.push_str(&number(*v));
            }
            out.push('\n');
        }
        MdfValue::Column(values) => {
            let mut iter = values.iter();
            if let Some(first) = iter.next() {
                out.push_str(&format!("{key:<6} = {}\n", number(*first)));
            }
            for v in iter {
                out.push_str(&format!("          {}\n", number(*v)));
            }
        }
        MdfValue::Text(text) => {
            out.push_str(&format!("{key:<6} = #{text}#\n"));
        }
        MdfValue::Bracketed(text) => {
            out.push_str(&format!("{key:<6} = {text}\n"));
        }
        MdfValue::Lines(lines) => {
            let mut iter = lines.iter();
            if let Some(first) = iter.next() {
                out.push_str(&format!("{key:<6} = #{first}#\n"));
            }
            for line in iter {
                out.push_str(&format!("         #{line}#\n"));
            }
        }
    }
}

/// Read an mdf file from `path`.
pub fn read_mdf_file(path: &Path) -> Result<MdfFile, MdfError> {
    let text = fs::read_to_string(path)?;
    parse_mdf(&text)
}

/// Parse mdf file content.
///
/// # Errors
/// `Parse` on lines that are neither parameters, continuations of the
/// preceding parameter, blank, nor `Commnt` records.
pub fn parse_mdf(text: &str) -> Result<MdfFile, MdfError> {
    let mut cursor = LineCursor::new(text);
    let mut records: Vec<Record> = Vec::new();

    while let Some((line_no, line)) = cursor.next_line() {
        if line.trim().is_empty() {
            records.push(Record::Verbatim(line.to_string()));
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            extend_parameter(&mut records, line, line_no)?;
            continue;
        }
        let (key, value_part) = split_parameter_line(line, line_no)?;
        if key == "Commnt" {
            records.push(Record::Verbatim(line.to_string()));
            continue;
        }
        let value = classify_value(value_part, line_no)?;
        records.push(Record::Parameter {
            key: key.to_string(),
            value,
            raw: Some(vec![line.to_string()]),
        });
    }

    Ok(MdfFile { records })
}

/// Split a `key = value` line; the key is word characters only.
fn split_parameter_line<'a>(line: &'a str, line_no: usize) -> Result<(&'a str, &'a str), MdfError> {
    let (key_part, value_part) = line.split_once('=').ok_or_else(|| MdfError::Parse {
        line: line_no,
        message: "expected 'key = value'".to_string(),
    })?;
    let key = key_part.trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MdfError::Parse {
            line: line_no,
            message: format!("malformed parameter key '{key}'"),
        });
    }
    Ok((key, value_part.trim_start()))
}

/// Classify a parameter value: bracket string, hashed string, or numbers.
fn classify_value(value: &str, line_no: usize) -> Result<MdfValue, MdfError> {
    if value.contains('[') {
        return Ok(MdfValue::Bracketed(value.trim_end_matches(' ').to_string()));
    }
    if value.contains('#') {
        let text = value.trim_end_matches(' ').replace('#', "");
        return Ok(MdfValue::Text(text));
    }
    let mut numbers = Vec::new();
    for token in scan::fields(value) {
        numbers.push(scan::parse_f64(token, line_no)?);
    }
    match numbers.len() {
        0 => Err(MdfError::Parse {
            line: line_no,
            message: "parameter has no value".to_string(),
        }),
        1 => Ok(MdfValue::Number(numbers[0])),
        _ => Ok(MdfValue::Numbers(numbers)),
    }
}

/// Fold a continuation line into the preceding parameter, promoting its
/// value to the matching multi-line kind.
fn extend_parameter(records: &mut [Record], line: &str, line_no: usize) -> Result<(), MdfError> {
    let Some(Record::Parameter { value, raw, .. }) = records
        .iter_mut()
        .rev()
        .find(|r| matches!(r, Record::Parameter { .. }))
    else {
        return Err(MdfError::Parse {
            line: line_no,
            message: "continuation line without a preceding parameter".to_string(),
        });
    };

    let body = line.trim();
    if body.contains('#') {
        let text = body.replace('#', "");
        match value {
            MdfValue::Lines(lines) => lines.push(text),
            MdfValue::Text(first) => *value = MdfValue::Lines(vec![std::mem::take(first), text]),
            _ => {
                return Err(MdfError::Parse {
                    line: line_no,
                    message: "string continuation on a numeric parameter".to_string(),
                })
            }
        }
    } else {
        let number = scan::parse_f64(body, line_no)?;
        match value {
            MdfValue::Column(values) => values.push(number),
            MdfValue::Number(first) => *value = MdfValue::Column(vec![*first, number]),
            MdfValue::Numbers(values) => {
                let mut column = std::mem::take(values);
                column.push(number);
                *value = MdfValue::Column(column);
            }
            _ => {
                return Err(MdfError::Parse {
                    line: line_no,
                    message: "numeric continuation on a string parameter".to_string(),
                })
            }
        }
    }
    if let Some(lines) = raw {
        lines.push(line.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    const MDF: &str = "\
Ident  = #Delft3D-FLOW  .03.02 3.39.25#
Commnt =
Runtxt = #Test run#
         #second line#
Filcco = #river.grd#
Fildep = #river.dep#
Anglat = 2.2000000e+01
MNKmax = 246 7 1
Dt     = 1.0000000e+00
Tunit  = #M#
Flmap  = 0.0000000e+00
          6.0000000e+01
          4.3200000e+03
Tstart = 0.0000000e+00
Tstop  = 4.3200000e+03
";

    #[test]
    fn test_parse_value_kinds() {
        let mdf = parse_mdf(MDF).unwrap();
        assert_eq!(
            mdf.parm("Ident").and_then(MdfValue::as_text),
            Some("Delft3D-FLOW  .03.02 3.39.25")
        );
        assert_eq!(mdf.parm("Fildep").and_then(MdfValue::as_text), Some("river.dep"));
        assert!((mdf.parm("Dt").unwrap().as_number().unwrap() - 1.0).abs() < TOL);
        assert_eq!(
            mdf.parm("MNKmax"),
            Some(&MdfValue::Numbers(vec![246.0, 7.0, 1.0]))
        );
        assert_eq!(
            mdf.parm("Flmap"),
            Some(&MdfValue::Column(vec![0.0, 60.0, 4320.0]))
        );
        assert_eq!(
            mdf.parm("Runtxt"),
            Some(&MdfValue::Lines(vec![
                "Test run".to_string(),
                "second line".to_string()
            ]))
        );
        // Commnt records are carried but not exposed as parameters.
        assert_eq!(mdf.parm("Commnt"), None);
    }

    #[test]
    fn test_bracket_value() {
        let mdf = parse_mdf("Unitsy = [m]\n").unwrap();
        assert_eq!(mdf.parm("Unitsy"), Some(&MdfValue::Bracketed("[m]".to_string())));
        assert_eq!(mdf.serialize(), "Unitsy = [m]\n");
    }

    #[test]
    fn test_roundtrip_untouched() {
        let mdf = parse_mdf(MDF).unwrap();
        assert_eq!(mdf.serialize(), MDF);
    }

    #[test]
    fn test_set_parm_rewrites_only_its_record() {
        let mut mdf = parse_mdf(MDF).unwrap();
        mdf.set_parm("Dt", 0.5);
        let out = mdf.serialize();
        assert!(out.contains("Dt     = 5.0000000e-01\n"));
        // Neighbouring records stay byte-identical, Commnt included.
        assert!(out.contains("Anglat = 2.2000000e+01\n"));
        assert!(out.contains("Commnt =\n"));
        assert!(out.contains("         #second line#\n"));
    }

    #[test]
    fn test_set_parm_integer_keys() {
        let mut mdf = parse_mdf(MDF).unwrap();
        mdf.set_parm("MNKmax", vec![246.0, 7.0, 10.0]);
        assert!(mdf.serialize().contains("MNKmax = 246 7 10\n"));
    }

    #[test]
    fn test_set_parm_column() {
        let mut mdf = parse_mdf(MDF).unwrap();
        mdf.set_parm("Flmap", MdfValue::Column(vec![0.0, 10.0, 4320.0]));
        let out = mdf.serialize();
        assert!(out.contains("Flmap  = 0.0000000e+00\n          1.0000000e+01\n          4.3200000e+03\n"));
    }

    #[test]
    fn test_set_parm_lines_indent() {
        let mut mdf = parse_mdf(MDF).unwrap();
        mdf.set_parm(
            "Runtxt",
            MdfValue::Lines(vec!["new run".to_string(), "notes".to_string()]),
        );
        assert!(mdf
            .serialize()
            .contains("Runtxt = #new run#\n         #notes#\n"));
    }

    #[test]
    fn test_set_parm_appends_unknown_key() {
        let mut mdf = parse_mdf(MDF).unwrap();
        mdf.set_parm("Fildry", "river.dry");
        assert_eq!(mdf.parm("Fildry").and_then(MdfValue::as_text), Some("river.dry"));
        assert!(mdf.serialize().ends_with("Fildry = #river.dry#\n"));
    }

    #[test]
    fn test_remove_parm() {
        let mut mdf = parse_mdf(MDF).unwrap();
        assert!(mdf.remove_parm("Tunit"));
        assert!(!mdf.remove_parm("Tunit"));
        assert!(!mdf.serialize().contains("Tunit"));
        // The surrounding records are untouched.
        assert!(mdf.serialize().contains("Dt     = 1.0000000e+00\n"));
    }

    #[test]
    fn test_key_order_preserved() {
        let mdf = parse_mdf(MDF).unwrap();
        let keys: Vec<&str> = mdf.keys().collect();
        assert_eq!(keys[0], "Ident");
        assert_eq!(keys[1], "Runtxt");
        assert_eq!(*keys.last().unwrap(), "Tstop");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_mdf("   1.0000000e+00\n"),
            Err(MdfError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_mdf("Dt     =\n"),
            Err(MdfError::Parse { .. })
        ));
        assert!(matches!(
            parse_mdf("Dt     = bogus\n"),
            Err(MdfError::Parse { .. })
        ));
    }
}
