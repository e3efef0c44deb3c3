//! Delft3D-FLOW simulation launcher.
//!
//! Locates a Delft3D install (`dflow2d3d/bin/d_hydro` plus `share/bin`),
//! generates the per-run `config_d_hydro_<id>.xml` next to each mdf file,
//! and launches `d_hydro` with the install's binary directories prepended
//! to `PATH`. Batches run serially or on a rayon worker pool; one failed
//! run never aborts the rest of the batch.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::io::mdf::{read_mdf_file, MdfError, MdfFile};

/// Platform name of the FLOW engine executable.
const D_HYDRO: &str = if cfg!(windows) { "d_hydro.exe" } else { "d_hydro" };

/// Install subdirectories located relative to the install root.
const DFLOW_BIN: &str = "dflow2d3d/bin";
const SHARE_BIN: &str = "share/bin";

/// The mdf keyword that switches map/history output to netCDF.
const NETCDF_KEY: &str = "FlNcdf";
const NETCDF_VALUE: &str = "map his dro fou";

/// Error type for simulation operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The install path does not exist.
    #[error("Delft3D path does not exist: {0}")]
    InstallNotFound(PathBuf),

    /// A required install component is missing.
    #[error("Delft3D component '{component}' not found under {root}")]
    MissingComponent { component: String, root: PathBuf },

    /// The engine exited with a failure status.
    #[error("Simulation of {mdf} failed with status {status}")]
    Launch { mdf: PathBuf, status: i32 },

    /// Worker count must be positive.
    #[error("Worker count must be positive")]
    Workers,

    /// Worker pool construction failed.
    #[error("Worker pool: {0}")]
    Pool(String),

    /// Mdf rewrite for netCDF output failed.
    #[error(transparent)]
    Mdf(#[from] MdfError),
}

/// A located Delft3D installation.
#[derive(Debug, Clone)]
pub struct Delft3dInstall {
    root: PathBuf,
    d_hydro: PathBuf,
    dflow_bin: PathBuf,
    share_bin: PathBuf,
}

impl Delft3dInstall {
    /// Locate an install under `path`.
    ///
    /// The expected layout (`<path>/dflow2d3d/bin/d_hydro`,
    /// `<path>/share/bin`) is checked first; otherwise the tree is
    /// searched recursively for those directories.
    ///
    /// # Errors
    /// `InstallNotFound` if `path` does not exist, `MissingComponent` if
    /// either directory (or the engine executable) cannot be found.
    pub fn locate(path: &Path) -> Result<Self, SimError> {
        if !path.exists() {
            return Err(SimError::InstallNotFound(path.to_path_buf()));
        }

        let dflow_bin = path.join(DFLOW_BIN);
        let share_bin = path.join(SHARE_BIN);
        if dflow_bin.join(D_HYDRO).exists() && share_bin.exists() {
            return Ok(Self {
                root: path.to_path_buf(),
                d_hydro: dflow_bin.join(D_HYDRO),
                dflow_bin,
                share_bin,
            });
        }

        warn!(
            "install layout not found directly under {}; searching the tree",
            path.display()
        );
        let mut found = HashMap::new();
        search_directories(path, &[DFLOW_BIN, SHARE_BIN], &mut found)?;
        let dflow_bin = found
            .remove(DFLOW_BIN)
            .ok_or_else(|| SimError::MissingComponent {
                component: DFLOW_BIN.to_string(),
                root: path.to_path_buf(),
            })?;
        let share_bin = found
            .remove(SHARE_BIN)
            .ok_or_else(|| SimError::MissingComponent {
                component: SHARE_BIN.to_string(),
                root: path.to_path_buf(),
            })?;
        let d_hydro = dflow_bin.join(D_HYDRO);
        if !d_hydro.exists() {
            return Err(SimError::MissingComponent {
                component: D_HYDRO.to_string(),
                root: path.to_path_buf(),
            });
        }
        let root = dflow_bin
            .parent()
            .and_then(Path::parent)
            .unwrap_or(path)
            .to_path_buf();
        Ok(Self {
            root,
            d_hydro,
            dflow_bin,
            share_bin,
        })
    }

    /// The install root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The engine executable.
    pub fn d_hydro(&self) -> &Path {
        &self.d_hydro
    }

    /// `PATH` value with the install's binary directories prepended.
    fn search_path(&self) -> Result<OsString, SimError> {
        let tail = env::var_os("PATH").unwrap_or_default();
        let paths = [self.dflow_bin.clone(), self.share_bin.clone()]
            .into_iter()
            .chain(env::split_paths(&tail));
        env::join_paths(paths).map_err(|e| SimError::Pool(e.to_string()))
    }
}

/// Recursively match directories whose last two path components equal one
/// of `targets` (`dflow2d3d/bin`, `share/bin`).
fn search_directories(
    root: &Path,
    targets: &[&str],
    found: &mut HashMap<String, PathBuf>,
) -> Result<(), SimError> {
    for entry in fs::read_dir(root)? {
        if found.len() == targets.len() {
            return Ok(());
        }
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let tail: Vec<&str> = path
            .iter()
            .rev()
            .take(2)
            .filter_map(|c| c.to_str())
            .collect();
        let key = format!("{}/{}", tail.get(1).unwrap_or(&""), tail.first().unwrap_or(&""));
        if targets.contains(&key.as_str()) {
            found.insert(key, path);
        } else {
            search_directories(&path, targets, found)?;
        }
    }
    Ok(())
}

/// Parallelism of a simulation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workers {
    /// Run the batch one mdf at a time.
    Serial,
    /// Run on a pool of exactly this many threads (must be positive).
    Fixed(usize),
    /// Run on one thread per cpu core.
    AllCores,
}

/// Result of one simulation in a batch.
#[derive(Debug)]
pub struct RunOutcome {
    /// The mdf file the run was launched for.
    pub mdf_path: PathBuf,
    /// `Ok` on a zero exit status.
    pub result: Result<(), SimError>,
}

/// Launches batches of FLOW simulations against one install.
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    install: Delft3dInstall,
    /// Suppress engine output.
    quiet: bool,
    /// Rewrite each mdf for netCDF output for the duration of its run.
    netcdf: bool,
}

impl SimulationRunner {
    pub fn new(install: Delft3dInstall) -> Self {
        Self {
            install,
            quiet: false,
            netcdf: false,
        }
    }

    /// Discard engine output instead of inheriting the console.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Write map/history results as netCDF.
    pub fn netcdf(mut self, netcdf: bool) -> Self {
        self.netcdf = netcdf;
        self
    }

    /// Run a batch of mdf files.
    ///
    /// Outcomes are returned in input order; a failed run is reported in
    /// its outcome and does not abort the rest of the batch.
    ///
    /// # Errors
    /// `Workers` for a zero `Fixed` count, `Pool` if the thread pool
    /// cannot be built. Per-run failures land in [`RunOutcome::result`].
    pub fn run(&self, mdf_paths: &[PathBuf], workers: Workers) -> Result<Vec<RunOutcome>, SimError> {
        let outcome = |path: &PathBuf| RunOutcome {
            mdf_path: path.clone(),
            result: self.run_unit(path),
        };
        match workers {
            Workers::Serial => Ok(mdf_paths.iter().map(outcome).collect()),
            Workers::Fixed(0) => Err(SimError::Workers),
            Workers::Fixed(count) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(count)
                    .build()
                    .map_err(|e| SimError::Pool(e.to_string()))?;
                Ok(pool.install(|| mdf_paths.par_iter().map(outcome).collect()))
            }
            Workers::AllCores => Ok(mdf_paths.par_iter().map(outcome).collect()),
        }
    }

    /// Run one simulation: generate the run config, launch the engine in
    /// the mdf's directory, and clean up afterwards.
    fn run_unit(&self, mdf_path: &Path) -> Result<(), SimError> {
        let mdf_path = mdf_path.canonicalize()?;
        let work_dir = mdf_path.parent().ok_or_else(|| {
            SimError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("mdf file has no parent directory: {}", mdf_path.display()),
            ))
        })?;
        let run_id = next_run_id();

        if self.netcdf {
            enable_netcdf_output(&mdf_path)?;
        }

        let config_path = work_dir.join(format!("config_d_hydro_{run_id}.xml"));
        let mdf_name = mdf_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        fs::write(&config_path, render_run_config(mdf_name))?;

        info!("launching {} (run id {run_id})", mdf_path.display());
        let status = Command::new(self.install.d_hydro())
            .arg(config_path.file_name().unwrap_or_default())
            .current_dir(work_dir)
            .env("PATH", self.install.search_path()?)
            .stdout(if self.quiet { Stdio::null() } else { Stdio::inherit() })
            .status();

        // Cleanup happens regardless of the engine outcome.
        let _ = fs::remove_file(&config_path);
        if self.netcdf {
            disable_netcdf_output(&mdf_path)?;
        }

        let status = status?;
        if !status.success() {
            return Err(SimError::Launch {
                mdf: mdf_path,
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

static RUN_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Per-process unique run id, used to keep generated files of concurrent
/// runs in the same directory apart.
fn next_run_id() -> usize {
    RUN_COUNTER.fetch_add(1, Ordering::Relaxed) * 10_000 + std::process::id() as usize % 10_000
}

/// The `d_hydro` run configuration for one mdf file.
fn render_run_config(mdf_name: &str) -> String {
    let url_name = mdf_name.replace(".mdf", ".url");
    format!(
        r#"<?xml version="1.0" encoding="iso-8859-1"?>
<deltaresHydro xmlns="http://schemas.deltares.nl/deltaresHydro">
    <control>
        <sequence>
            <start>myNameFlow</start>
        </sequence>
    </control>
    <flow2D3D name="myNameFlow">
        <library>flow2d3d</library>
        <mdfFile>{mdf_name}</mdfFile>
    </flow2D3D>
    <delftOnline>
        <enabled>true</enabled>
        <urlFile>{url_name}</urlFile>
        <waitOnStart>false</waitOnStart>
        <clientControl>true</clientControl>
        <clientWrite>false</clientWrite>
    </delftOnline>
</deltaresHydro>
"#
    )
}

/// Rewrite an mdf file on disk to emit netCDF output.
fn enable_netcdf_output(mdf_path: &Path) -> Result<(), SimError> {
    let mut mdf = read_mdf_file(mdf_path)?;
    mdf.set_parm(NETCDF_KEY, NETCDF_VALUE);
    mdf.to_file(mdf_path)?;
    Ok(())
}

/// Remove the netCDF switch from an mdf file on disk.
fn disable_netcdf_output(mdf_path: &Path) -> Result<(), SimError> {
    let mut mdf = read_mdf_file(mdf_path)?;
    mdf.remove_parm(NETCDF_KEY);
    mdf.to_file(mdf_path)?;
    Ok(())
}

/// Toggle netCDF output on a parsed mdf model.
pub fn set_netcdf_output(mdf: &mut MdfFile, enabled: bool) {
    if enabled {
        mdf.set_parm(NETCDF_KEY, NETCDF_VALUE);
    } else {
        mdf.remove_parm(NETCDF_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_install(root: &Path) {
        fs::create_dir_all(root.join(DFLOW_BIN)).unwrap();
        fs::create_dir_all(root.join(SHARE_BIN)).unwrap();
        fs::write(root.join(DFLOW_BIN).join(D_HYDRO), "").unwrap();
    }

    #[test]
    fn test_locate_exact_layout() {
        let tmp = TempDir::new().unwrap();
        fake_install(tmp.path());
        let install = Delft3dInstall::locate(tmp.path()).unwrap();
        assert_eq!(install.root(), tmp.path());
        assert!(install.d_hydro().ends_with(Path::new(DFLOW_BIN).join(D_HYDRO)));
    }

    #[test]
    fn test_locate_by_search() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("src").join("bin").join("x64");
        fake_install(&nested);
        let install = Delft3dInstall::locate(tmp.path()).unwrap();
        assert!(install.d_hydro().exists());
        assert_eq!(install.root(), nested);
    }

    #[test]
    fn test_locate_missing_path() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("nope");
        assert!(matches!(
            Delft3dInstall::locate(&gone),
            Err(SimError::InstallNotFound(_))
        ));
    }

    #[test]
    fn test_locate_missing_component() {
        let tmp = TempDir::new().unwrap();
        // share/bin exists but dflow2d3d/bin does not.
        fs::create_dir_all(tmp.path().join(SHARE_BIN)).unwrap();
        assert!(matches!(
            Delft3dInstall::locate(tmp.path()),
            Err(SimError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_run_config_names() {
        let xml = render_run_config("f34.mdf");
        assert!(xml.contains("<mdfFile>f34.mdf</mdfFile>"));
        assert!(xml.contains("<urlFile>f34.url</urlFile>"));
    }

    #[test]
    fn test_netcdf_toggle_restores_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("river.mdf");
        let original = "Ident  = #Delft3D-FLOW#\nDt     = 1.0000000e+00\n";
        fs::write(&path, original).unwrap();

        enable_netcdf_output(&path).unwrap();
        let injected = fs::read_to_string(&path).unwrap();
        assert!(injected.contains("FlNcdf = #map his dro fou#\n"));

        disable_netcdf_output(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let tmp = TempDir::new().unwrap();
        fake_install(tmp.path());
        let runner = SimulationRunner::new(Delft3dInstall::locate(tmp.path()).unwrap());
        assert!(matches!(
            runner.run(&[], Workers::Fixed(0)),
            Err(SimError::Workers)
        ));
    }

    #[test]
    fn test_run_ids_unique() {
        let a = next_run_id();
        let b = next_run_id();
        assert_ne!(a, b);
    }
}
