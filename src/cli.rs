use clap::Parser;
use std::{fmt, io, path::PathBuf};

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Download iCloud photos and sort them into YYYY/MM/DD folders",
    long_about = None
)]
pub struct Conf {
    /// Directory that receives the downloads and the dated folder tree.
    #[arg(short, long, default_value = "downloads")]
    pub download_dir: PathBuf,

    /// icloudpd executable, looked up on PATH unless a path is given.
    #[arg(long, default_value = "icloudpd")]
    pub icloudpd_path: PathBuf,

    /// exiftool executable used to read capture dates.
    #[arg(long, default_value = "exiftool")]
    pub exiftool_path: PathBuf,

    /// iCloud email address; prompted for when omitted.
    #[arg(short, long)]
    pub username: Option<String>,

    /// Only organize what is already in the download directory.
    #[arg(long, default_value_t = false)]
    pub skip_download: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            icloudpd_path: PathBuf::from("icloudpd"),
            exiftool_path: PathBuf::from("exiftool"),
            username: None,
            skip_download: false,
            log_level: "info".to_string(),
        }
    }
}

impl Conf {
    /// Anchors a relative download directory to the current working directory,
    /// so every later path comparison works on the same absolute root.
    pub fn resolve_download_dir(mut self) -> io::Result<Self> {
        if self.download_dir.is_relative() {
            self.download_dir = std::env::current_dir()?.join(&self.download_dir);
        }
        Ok(self)
    }
}

impl fmt::Display for Conf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.download_dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_line_matches_default() {
        let parsed = Conf::parse_from(["icloud_photo_organizer"]);
        let default = Conf::default();
        assert_eq!(parsed.download_dir, default.download_dir);
        assert_eq!(parsed.icloudpd_path, default.icloudpd_path);
        assert_eq!(parsed.exiftool_path, default.exiftool_path);
        assert_eq!(parsed.username, None);
        assert!(!parsed.skip_download);
        assert_eq!(parsed.log_level, "info");
    }

    #[test]
    fn flags_override_defaults() {
        let parsed = Conf::parse_from([
            "icloud_photo_organizer",
            "-d",
            "/photos",
            "--exiftool-path",
            "/opt/exiftool/exiftool",
            "-u",
            "me@example.com",
            "--skip-download",
        ]);
        assert_eq!(parsed.download_dir, PathBuf::from("/photos"));
        assert_eq!(parsed.exiftool_path, PathBuf::from("/opt/exiftool/exiftool"));
        assert_eq!(parsed.username.as_deref(), Some("me@example.com"));
        assert!(parsed.skip_download);
    }

    #[test]
    fn relative_download_dir_is_anchored_to_cwd() {
        let conf = Conf::default().resolve_download_dir().unwrap();
        assert!(conf.download_dir.is_absolute());
        assert!(conf.download_dir.ends_with("downloads"));
    }

    #[test]
    fn absolute_download_dir_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let conf = Conf {
            download_dir: dir.path().to_path_buf(),
            ..Conf::default()
        }
        .resolve_download_dir()
        .unwrap();
        assert_eq!(conf.download_dir, dir.path());
    }
}
