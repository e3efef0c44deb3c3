//! I/O for the Delft3D-FLOW input file family.
//!
//! This module provides:
//! - **Time-series files**: boundary conditions (`.bct`/`.bcc`) and
//!   discharges (`.dis`) as header+table blocks
//! - **Master definition files**: the `.mdf` run parameters
//! - **Grid files**: curvilinear node coordinates (`.grd`)
//! - **Depth files**: bathymetry on the grid corners (`.dep`)
//! - **Coordinate projections**: spherical/cartesian grid transforms
//!
//! All codecs share the same contract: parsing captures enough layout
//! metadata that an untouched model serializes back byte-for-byte, while
//! any mutation rewrites the affected part in the canonical Delft3D
//! format. Parse errors are detected eagerly and carry the offending
//! 1-based line number.

pub mod depth;
pub mod grid;
pub mod mdf;
pub mod projection;
pub(crate) mod scan;
pub mod timeseries;

pub use depth::{parse_dep, read_dep_file, DepFile, DepthError, MISSING_DEPTH};
pub use grid::{parse_grd, read_grd_file, CoordinateSystem, GrdFile, GridError};
pub use mdf::{parse_mdf, read_mdf_file, MdfError, MdfFile, MdfValue};
pub use projection::{CoordinateProjection, MercatorProjection};
pub use timeseries::{
    parse_timeseries_file, read_timeseries_file, HeaderField, SeriesRow, TimeSeriesDialect,
    TimeSeriesError, TimeSeriesFile, TimeSeriesRecord,
};
