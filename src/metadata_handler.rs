use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use crate::process::{ExternalCommand, ProcessError};

/// Tags consulted for the capture date, most trusted first.
pub const DATE_TAGS: [&str; 3] = [
    "EXIF:DateTimeOriginal",
    "EXIF:CreateDate",
    "File:FileCreateDate",
];

pub type Tags = Map<String, Value>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error("unreadable exiftool output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exiftool returned no record")]
    NoRecord,

    #[error("no date tag present")]
    MissingDate,

    #[error("unrecognised date '{0}'")]
    InvalidDate(String),
}

/// Source of group-qualified metadata tags for one file.
pub trait TagReader {
    fn read_tags(&self, path: &Path) -> Result<Tags, MetadataError>;
}

/// Reads tags by running `exiftool -j -G -n <file>`.
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl TagReader for ExifTool {
    fn read_tags(&self, path: &Path) -> Result<Tags, MetadataError> {
        let stdout = ExternalCommand::new(&self.program)
            .args(["-j", "-G", "-n"])
            .arg(path)
            .run_captured()?;

        let records: Vec<Tags> = serde_json::from_slice(&stdout)?;
        records.into_iter().next().ok_or(MetadataError::NoRecord)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Tag(&'static str),
    FileTimestamp,
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSource::Tag(tag) => write!(f, "{tag}"),
            DateSource::FileTimestamp => write!(f, "file timestamp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDate {
    pub taken: NaiveDateTime,
    pub source: DateSource,
}

/// First present, non-empty string among [`DATE_TAGS`]. Later tags are not
/// consulted when the winning value fails to parse.
pub fn date_from_tags(tags: &Tags) -> Result<CaptureDate, MetadataError> {
    let (tag, raw) = DATE_TAGS
        .iter()
        .find_map(|tag| {
            tags.get(*tag)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| (*tag, s))
        })
        .ok_or(MetadataError::MissingDate)?;

    Ok(CaptureDate {
        taken: parse_exif_datetime(raw)?,
        source: DateSource::Tag(tag),
    })
}

/// Parses `YYYY:MM:DD HH:MM:SS`, ignoring anything from the first '.' on.
pub fn parse_exif_datetime(raw: &str) -> Result<NaiveDateTime, MetadataError> {
    static EXIF_DATETIME: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?P<y>\d{4}):(?P<mo>\d{2}):(?P<d>\d{2}) (?P<h>\d{2}):(?P<mi>\d{2}):(?P<s>\d{2})$",
        )
        .unwrap()
    });

    let invalid = || MetadataError::InvalidDate(raw.to_string());
    let trimmed = raw.split('.').next().unwrap_or_default();
    let caps = EXIF_DATETIME.captures(trimmed).ok_or_else(invalid)?;
    let num = |name: &str| caps[name].parse::<u32>().map_err(|_| invalid());

    let year = caps["y"].parse::<i32>().map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, num("mo")?, num("d")?).ok_or_else(invalid)?;
    let time = NaiveTime::from_hms_opt(num("h")?, num("mi")?, num("s")?).ok_or_else(invalid)?;
    Ok(date.and_time(time))
}

/// Creation time where the filesystem records one, modification time otherwise,
/// in local time.
pub fn file_timestamp(path: &Path) -> io::Result<NaiveDateTime> {
    let meta = fs::metadata(path)?;
    let stamp = meta.created().or_else(|_| meta.modified())?;
    Ok(DateTime::<Local>::from(stamp).naive_local())
}

/// Metadata date when one can be read, otherwise the filesystem timestamp.
/// Only a failure of both yields an error.
pub fn capture_date<R: TagReader + ?Sized>(reader: &R, path: &Path) -> io::Result<CaptureDate> {
    match reader.read_tags(path).and_then(|tags| date_from_tags(&tags)) {
        Ok(date) => Ok(date),
        Err(e) => {
            tracing::warn!(
                "Could not get EXIF date for {}, using file timestamp: {}",
                path.display(),
                e
            );
            file_timestamp(path).map(|taken| CaptureDate {
                taken,
                source: DateSource::FileTimestamp,
            })
        },
    }
}
