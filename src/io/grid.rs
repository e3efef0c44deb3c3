//! Delft3D curvilinear grid (`.grd`) file I/O.
//!
//! A grd file stores the node coordinates of a structured curvilinear mesh:
//! a header with the coordinate system tag and the grid dimensions, then
//! two row-major coordinate blocks (x first, y second), each row introduced
//! by an `ETA=` label and wrapped at five values per line. Inactive nodes
//! carry a sentinel ("missing value") in both blocks.
//!
//! # File Format
//!
//! ```text
//! * Optional comment lines
//! Coordinate System = Cartesian
//! Missing Value = -9.9999900e+02
//!        7     245
//!  0 0 0
//!  ETA=    1   1.80000000000000000E+02   1.90000000000000000E+02 ...
//!              2.30000000000000000E+02   2.40000000000000000E+02 ...
//!  ETA=    2   ...
//! ```
//!
//! Untouched grids serialize back byte-for-byte; any mutation switches the
//! writer to the canonical Delft3D layout above.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use super::projection::{CoordinateProjection, MercatorProjection};
use super::scan::{self, ExpFormat, LineCursor, ScanError};

/// Values per physical line in a coordinate block.
const VALUES_PER_LINE: usize = 5;

/// Error type for grd file operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed structure detected during parse.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Replacement arrays do not match the grid dimensions.
    #[error("Shape mismatch: expected {expected_rows}x{expected_cols}, got {actual_rows}x{actual_cols}")]
    Shape {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// Geometric query on a grid without any active node.
    #[error("Grid contains no active nodes")]
    EmptyGrid,

    /// Transform requested into the coordinate system the grid is
    /// already in.
    #[error("Grid is already in {current} coordinates")]
    CoordinateSystem { current: CoordinateSystem },
}

impl From<ScanError> for GridError {
    fn from(err: ScanError) -> Self {
        GridError::Parse {
            line: err.line,
            message: err.message,
        }
    }
}

/// Coordinate system tag of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    /// WGS84 longitude/latitude in degrees.
    Spherical,
    /// Projected meters.
    Cartesian,
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSystem::Spherical => write!(f, "Spherical"),
            CoordinateSystem::Cartesian => write!(f, "Cartesian"),
        }
    }
}

impl FromStr for CoordinateSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spherical" => Ok(CoordinateSystem::Spherical),
            "cartesian" => Ok(CoordinateSystem::Cartesian),
            other => Err(format!("unknown coordinate system '{other}'")),
        }
    }
}

/// Original file lines, kept verbatim for byte-for-byte round-trip of
/// untouched grids.
#[derive(Debug, Clone)]
struct GrdLayout {
    /// Comment lines, header lines and the `0 0 0` part line.
    header_lines: Vec<String>,
    /// Physical lines of both coordinate blocks, in file order.
    coordinate_lines: Vec<String>,
}

/// In-memory model of a Delft3D grd file.
///
/// Node storage is row-major with `n` rows of `m` columns, matching the
/// file layout (`m` values per `ETA` row, `n` rows per block). Inactive
/// nodes are `None` internally; the sentinel only exists on disk.
#[derive(Debug, Clone)]
pub struct GrdFile {
    coordinate_system: CoordinateSystem,
    missing_value: f64,
    /// Whether the file carried an explicit `Missing Value` header.
    has_missing_header: bool,
    /// Leading `*` comment lines (verbatim, kept on rewrite).
    comments: Vec<String>,
    m: usize,
    n: usize,
    nodes: Vec<Option<(f64, f64)>>,
    layout: Option<GrdLayout>,
}

impl GrdFile {
    /// Number of nodes per row (the Delft3D `M` direction).
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of rows (the Delft3D `N` direction).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Current coordinate system tag.
    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }

    /// Sentinel marking inactive nodes on disk.
    pub fn missing_value(&self) -> f64 {
        self.missing_value
    }

    /// Coordinates of the node at `(m, n)`, or `None` if the node is
    /// inactive or out of range.
    pub fn node(&self, m: usize, n: usize) -> Option<(f64, f64)> {
        if m >= self.m || n >= self.n {
            return None;
        }
        self.nodes[n * self.m + m]
    }

    /// Iterate over active nodes as `(m, n, x, y)`.
    pub fn active_nodes(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, node)| {
            node.map(|(x, y)| (i % self.m, i / self.m, x, y))
        })
    }

    /// Project all active nodes from spherical (lon/lat) to cartesian
    /// (mercator meters) coordinates and retag the grid.
    ///
    /// # Errors
    /// `CoordinateSystem` if the grid is already cartesian; the grid is
    /// left unmodified.
    pub fn spherical_to_cartesian(&mut self) -> Result<(), GridError> {
        if self.coordinate_system == CoordinateSystem::Cartesian {
            return Err(GridError::CoordinateSystem {
                current: self.coordinate_system,
            });
        }
        let proj = MercatorProjection;
        self.apply_projection(|lon, lat| proj.geo_to_xy(lon, lat));
        self.coordinate_system = CoordinateSystem::Cartesian;
        Ok(())
    }

    /// Project all active nodes from cartesian (mercator meters) to
    /// spherical (lon/lat) coordinates and retag the grid.
    ///
    /// # Errors
    /// `CoordinateSystem` if the grid is already spherical; the grid is
    /// left unmodified.
    pub fn cartesian_to_spherical(&mut self) -> Result<(), GridError> {
        if self.coordinate_system == CoordinateSystem::Spherical {
            return Err(GridError::CoordinateSystem {
                current: self.coordinate_system,
            });
        }
        let proj = MercatorProjection;
        self.apply_projection(|x, y| proj.xy_to_geo(x, y));
        self.coordinate_system = CoordinateSystem::Spherical;
        Ok(())
    }

    fn apply_projection(&mut self, transform: impl Fn(f64, f64) -> (f64, f64)) {
        for node in &mut self.nodes {
            if let Some((x, y)) = node {
                let (px, py) = transform(*x, *y);
                *x = px;
                *y = py;
            }
        }
        self.layout = None;
    }

    /// Find the active node nearest to `(x, y)` by Euclidean distance in
    /// the grid's current coordinate system.
    ///
    /// Linear scan over active nodes; ties resolve to the first node in
    /// row-major order. Returns `(m, n)` indices.
    ///
    /// # Errors
    /// `EmptyGrid` if the grid has no active nodes.
    pub fn get_nearest_grid(&self, x: f64, y: f64) -> Result<(usize, usize), GridError> {
        let mut best: Option<(f64, usize, usize)> = None;
        for (m, n, nx, ny) in self.active_nodes() {
            let d2 = (x - nx).powi(2) + (y - ny).powi(2);
            if best.map_or(true, |(bd, _, _)| d2 < bd) {
                best = Some((d2, m, n));
            }
        }
        best.map(|(_, m, n)| (m, n)).ok_or(GridError::EmptyGrid)
    }

    /// Replace both coordinate arrays and the coordinate system tag.
    ///
    /// `x` and `y` must each have `n` rows of `m` values. Entries equal to
    /// the sentinel in both arrays become inactive nodes.
    ///
    /// # Errors
    /// `Shape` if either array does not match the grid dimensions; the
    /// grid is left unmodified.
    pub fn set_grid(
        &mut self,
        x: &[Vec<f64>],
        y: &[Vec<f64>],
        system: CoordinateSystem,
    ) -> Result<(), GridError> {
        for array in [x, y] {
            if array.len() != self.n || array.iter().any(|row| row.len() != self.m) {
                return Err(GridError::Shape {
                    expected_rows: self.n,
                    expected_cols: self.m,
                    actual_rows: array.len(),
                    actual_cols: array.first().map_or(0, Vec::len),
                });
            }
        }
        let sentinel = self.missing_value;
        self.nodes = x
            .iter()
            .flatten()
            .zip(y.iter().flatten())
            .map(|(&xv, &yv)| {
                if xv == sentinel && yv == sentinel {
                    None
                } else {
                    Some((xv, yv))
                }
            })
            .collect();
        self.coordinate_system = system;
        self.layout = None;
        Ok(())
    }

    /// Serialize to the grd file format.
    ///
    /// An unmodified grid reproduces its original bytes; a modified grid
    /// is written in the canonical Delft3D layout.
    pub fn serialize(&self) -> String {
        if let Some(layout) = &self.layout {
            let mut out = String::new();
            for line in layout.header_lines.iter().chain(&layout.coordinate_lines) {
                out.push_str(line);
                out.push('\n');
            }
            return out;
        }

        let mut out = String::new();
        for comment in &self.comments {
            out.push_str(comment);
            out.push('\n');
        }
        out.push_str(&format!("Coordinate System = {}\n", self.coordinate_system));
        if self.has_missing_header {
            out.push_str(&format!(
                "Missing Value = {}\n",
                ExpFormat::SERIES.render(self.missing_value)
            ));
        }
        out.push_str(&format!("{:>8}{:>8}\n", self.m, self.n));
        out.push_str(" 0 0 0\n");
        self.write_block(&mut out, |node| node.map(|(x, _)| x));
        self.write_block(&mut out, |node| node.map(|(_, y)| y));
        out
    }

    /// Write one coordinate block (x or y), five values per line, with
    /// continuation lines aligned under the first value.
    fn write_block(&self, out: &mut String, component: impl Fn(Option<(f64, f64)>) -> Option<f64>) {
        for n in 0..self.n {
            let mut line = format!(" ETA={:>5}", n + 1);
            for m in 0..self.m {
                let value = component(self.nodes[n * self.m + m]).unwrap_or(self.missing_value);
                if m > 0 && m % VALUES_PER_LINE == 0 {
                    line.push_str("\n             ");
                } else {
                    line.push_str("   ");
                }
                line.push_str(&ExpFormat::GRID.render(value));
            }
            line.push('\n');
            out.push_str(&line);
        }
    }

    /// Write to a grd file at `path`.
    pub fn to_file(&self, path: &Path) -> Result<(), GridError> {
        fs::write(path, self.serialize())?;
        Ok(())
    }
}

/// Read a grd file from `path`.
pub fn read_grd_file(path: &Path) -> Result<GrdFile, GridError> {
    let text = fs::read_to_string(path)?;
    parse_grd(&text)
}

/// Parse grd file content.
///
/// # Errors
/// `Parse` on malformed headers, a truncated coordinate block, or
/// non-numeric coordinate fields. All faults carry the offending line.
pub fn parse_grd(text: &str) -> Result<GrdFile, GridError> {
    let mut cursor = LineCursor::new(text);
    let mut header_lines: Vec<String> = Vec::new();
    let mut comments: Vec<String> = Vec::new();

    // Leading '*' comments.
    while let Some((_, line)) = cursor.peek_line() {
        if line.trim_start().starts_with('*') {
            comments.push(line.to_string());
            header_lines.push(line.to_string());
            cursor.next_line();
        } else {
            break;
        }
    }

    // Coordinate system tag.
    let (cs_line_no, cs_line) = cursor
        .next_line()
        .ok_or_else(|| parse_err(1, "missing 'Coordinate System' header"))?;
    let coordinate_system = cs_line
        .split_once('=')
        .filter(|(key, _)| key.contains("Coordinate System"))
        .ok_or_else(|| parse_err(cs_line_no, "missing 'Coordinate System' header"))
        .and_then(|(_, value)| {
            value
                .parse::<CoordinateSystem>()
                .map_err(|e| parse_err(cs_line_no, e))
        })?;
    header_lines.push(cs_line.to_string());

    // Optional sentinel header.
    let mut missing_value = 0.0;
    let mut has_missing_header = false;
    if let Some((line_no, line)) = cursor.peek_line() {
        if line.contains("Missing Value") {
            let (_, value) = line
                .split_once('=')
                .ok_or_else(|| parse_err(line_no, "malformed 'Missing Value' header"))?;
            missing_value = scan::parse_f64(value.trim(), line_no)?;
            has_missing_header = true;
            header_lines.push(line.to_string());
            cursor.next_line();
        }
    }

    // Dimensions.
    let (dim_line_no, dim_line) = cursor
        .next_line()
        .ok_or_else(|| parse_err(cs_line_no, "missing dimension line"))?;
    let mut dims = scan::fields(dim_line);
    let m = scan::parse_usize(
        dims.next()
            .ok_or_else(|| parse_err(dim_line_no, "missing M dimension"))?,
        dim_line_no,
    )?;
    let n = scan::parse_usize(
        dims.next()
            .ok_or_else(|| parse_err(dim_line_no, "missing N dimension"))?,
        dim_line_no,
    )?;
    if m == 0 || n == 0 {
        return Err(parse_err(dim_line_no, "grid dimensions must be positive"));
    }
    header_lines.push(dim_line.to_string());

    // The '0 0 0' part line.
    let (part_line_no, part_line) = cursor
        .next_line()
        .ok_or_else(|| parse_err(dim_line_no, "missing part line after dimensions"))?;
    if scan::fields(part_line).count() != 3 {
        return Err(parse_err(part_line_no, "expected '0 0 0' part line"));
    }
    header_lines.push(part_line.to_string());

    // Two coordinate blocks of n rows each.
    let mut coordinate_lines: Vec<String> = Vec::new();
    let mut x = read_block(&mut cursor, m, n, &mut coordinate_lines)?;
    let y = read_block(&mut cursor, m, n, &mut coordinate_lines)?;

    let nodes = x
        .drain(..)
        .zip(y)
        .map(|(xv, yv)| {
            if xv == missing_value && yv == missing_value {
                None
            } else {
                Some((xv, yv))
            }
        })
        .collect();

    Ok(GrdFile {
        coordinate_system,
        missing_value,
        has_missing_header,
        comments,
        m,
        n,
        nodes,
        layout: Some(GrdLayout {
            header_lines,
            coordinate_lines,
        }),
    })
}

/// Read one coordinate block: `n` ETA rows of `m` values, values wrapped
/// over continuation lines.
fn read_block(
    cursor: &mut LineCursor<'_>,
    m: usize,
    n: usize,
    raw: &mut Vec<String>,
) -> Result<Vec<f64>, GridError> {
    let mut values = Vec::with_capacity(m * n);
    for _ in 0..n {
        let (line_no, line) = cursor
            .next_line()
            .ok_or_else(|| parse_err(0, "unexpected end of file in coordinate block"))?;
        raw.push(line.to_string());

        let mut tokens = scan::fields(line);
        match tokens.next() {
            Some(label) if label.starts_with("ETA=") => {
                // Row index may be glued to the label or a separate token.
                if label == "ETA=" {
                    tokens
                        .next()
                        .ok_or_else(|| parse_err(line_no, "missing row index after ETA="))?;
                }
            }
            _ => return Err(parse_err(line_no, "expected ETA= row label")),
        }

        let mut row = Vec::with_capacity(m);
        for token in tokens {
            row.push(scan::parse_f64(token, line_no)?);
        }
        while row.len() < m {
            let (cont_no, cont) = cursor
                .next_line()
                .ok_or_else(|| parse_err(line_no, "truncated coordinate row"))?;
            if cont.contains("ETA=") {
                return Err(parse_err(cont_no, "unexpected ETA= inside coordinate row"));
            }
            raw.push(cont.to_string());
            for token in scan::fields(cont) {
                row.push(scan::parse_f64(token, cont_no)?);
            }
        }
        if row.len() > m {
            return Err(parse_err(line_no, format!("row has {} values, expected {m}", row.len())));
        }
        values.extend(row);
    }
    Ok(values)
}

fn parse_err(line: usize, message: impl Into<String>) -> GridError {
    GridError::Parse {
        line,
        message: message.into(),
    }
}
