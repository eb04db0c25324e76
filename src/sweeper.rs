use tracing::{error, info};
use walkdir::WalkDir;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{cli::Conf, utilities::is_empty_dir};

#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Removes directories left empty under the download directory, deepest first.
/// The download directory itself always survives.
pub struct Sweeper {
    root: PathBuf,
}

impl Sweeper {
    pub fn new(conf: &Conf) -> Self {
        Self {
            root: conf.download_dir.clone(),
        }
    }

    pub fn run(&self) -> SweepReport {
        let mut report = SweepReport::default();

        // contents_first yields every directory after its children, so a parent
        // is checked only once its emptied subdirectories are already gone.
        for entry in WalkDir::new(&self.root).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Could not scan {}: {}", self.root.display(), e);
                    if let Some(path) = e.path() {
                        report.failed.push(path.to_path_buf());
                    }
                    continue;
                },
            };
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            match remove_if_empty(path) {
                Ok(true) => {
                    info!("Removed empty directory: {}", path.display());
                    report.removed.push(path.to_path_buf());
                },
                Ok(false) => {},
                Err(e) => {
                    error!("Could not remove {}: {}", path.display(), e);
                    report.failed.push(path.to_path_buf());
                },
            }
        }
        report
    }
}

fn remove_if_empty(path: &Path) -> io::Result<bool> {
    if !is_empty_dir(path)? {
        return Ok(false);
    }
    fs::remove_dir(path)?;
    Ok(true)
}
