use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, error, info};

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    cli::Conf,
    metadata_handler::{capture_date, ExifTool, TagReader},
    utilities::*,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Moved(PathBuf),
    AlreadyPlaced,
}

#[derive(Debug, Default)]
pub struct OrganizeReport {
    pub moved: Vec<PathBuf>,
    pub already_placed: usize,
    pub failed: Vec<PathBuf>,
}

/// Moves the flat top level of the download directory into `YYYY/MM/DD/`.
/// Subdirectories are never entered.
pub struct Organizer<R> {
    download_dir: PathBuf,
    reader: R,
}

impl Organizer<ExifTool> {
    pub fn new(conf: &Conf) -> Self {
        Self::with_reader(conf, ExifTool::new(&conf.exiftool_path))
    }
}

impl<R: TagReader> Organizer<R> {
    pub fn with_reader(conf: &Conf, reader: R) -> Self {
        Self {
            download_dir: conf.download_dir.clone(),
            reader,
        }
    }

    pub fn dated_dir(&self, taken: NaiveDateTime) -> PathBuf {
        self.download_dir
            .join(taken.format("%Y").to_string())
            .join(taken.format("%m").to_string())
            .join(taken.format("%d").to_string())
    }

    pub fn destination_for(&self, taken: NaiveDateTime, file_name: &OsStr) -> PathBuf {
        self.dated_dir(taken).join(file_name)
    }

    /// A failure here concerns this file only.
    pub fn organize_file(&self, path: &Path) -> Result<Placement> {
        let file_name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?;

        let date = capture_date(&self.reader, path)
            .with_context(|| format!("no usable date for {}", path.display()))?;
        debug!("{} dated {} from {}", path.display(), date.taken, date.source);

        let target = self.destination_for(date.taken, file_name);
        let target_dir = self.dated_dir(date.taken);
        create_dir_if_not_exists(&target_dir)
            .with_context(|| format!("could not create {}", target_dir.display()))?;

        if target == path {
            info!(
                "Skipping {} - already in correct location",
                file_name.to_string_lossy()
            );
            return Ok(Placement::AlreadyPlaced);
        }

        if target.exists() {
            debug!("replacing existing {}", target.display());
        }
        fs::rename(path, &target)
            .with_context(|| format!("could not move to {}", target.display()))?;
        info!("Moved {} to {}", file_name.to_string_lossy(), target_dir.display());

        Ok(Placement::Moved(target))
    }

    /// Errors only when the download directory itself cannot be listed.
    pub fn run(&self) -> Result<OrganizeReport> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.download_dir)
            .with_context(|| format!("could not list {}", self.download_dir.display()))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    error!("Could not read an entry of {}: {}", self.download_dir.display(), e);
                    None
                },
            })
            .collect();
        entries.sort();

        let mut report = OrganizeReport::default();
        for path in entries.into_iter().filter(|p| is_regular_file(p)) {
            match self.organize_file(&path) {
                Ok(Placement::Moved(target)) => report.moved.push(target),
                Ok(Placement::AlreadyPlaced) => report.already_placed += 1,
                Err(e) => {
                    let name = path.file_name().unwrap_or(path.as_os_str());
                    error!("Error processing {}: {:#}", name.to_string_lossy(), e);
                    report.failed.push(path);
                },
            }
        }
        Ok(report)
    }
}
