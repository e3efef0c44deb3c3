//! # delft3d-rs
//!
//! Readers, editors and writers for the Delft3D-FLOW input file family,
//! plus a launcher for batches of FLOW simulations.
//!
//! This crate provides:
//! - Curvilinear grid files (`.grd`) with spherical/cartesian transforms
//!   and nearest-node lookup
//! - Depth files (`.dep`) validated against their grid
//! - Master definition files (`.mdf`) with typed parameter access
//! - Time-series boundary files (`.bct`/`.bcc`/`.dis`) with header and
//!   series editing
//! - A simulation runner around `d_hydro` with rayon-based batching
//!
//! Every codec round-trips an untouched file byte-for-byte; edits rewrite
//! only the affected records in the canonical Delft3D format, so a model
//! can be read, adjusted and written back without disturbing the rest of
//! the file.

pub mod io;
pub mod sim;

// Re-export main types for convenience
pub use io::{
    parse_dep, parse_grd, parse_mdf, parse_timeseries_file, read_dep_file, read_grd_file,
    read_mdf_file, read_timeseries_file, CoordinateProjection, CoordinateSystem, DepFile,
    DepthError, GrdFile, GridError, MdfError, MdfFile, MdfValue, MercatorProjection,
    TimeSeriesDialect, TimeSeriesError, TimeSeriesFile, TimeSeriesRecord, MISSING_DEPTH,
};
pub use sim::{Delft3dInstall, RunOutcome, SimError, SimulationRunner, Workers};
