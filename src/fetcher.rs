use anyhow::Result;
use tracing::{debug, error, info, warn};

use std::path::PathBuf;

use crate::{
    cli::Conf,
    process::{ExternalCommand, ProcessError},
    utilities::create_dir_if_not_exists,
};

/// Runs icloudpd against the download directory. Resuming is icloudpd's job:
/// it skips files that are already present.
pub struct Fetcher {
    download_dir: PathBuf,
    icloudpd: PathBuf,
}

impl Fetcher {
    pub fn new(conf: &Conf) -> Self {
        Self {
            download_dir: conf.download_dir.clone(),
            icloudpd: conf.icloudpd_path.clone(),
        }
    }

    pub fn command(&self, username: &str, password: &str) -> ExternalCommand {
        ExternalCommand::new(&self.icloudpd)
            .arg("--directory")
            .arg(&self.download_dir)
            .args(["--username", username, "--password"])
            .secret_arg(password)
            .args(["--size", "original", "--set-exif-datetime", "--log-level", "info"])
    }

    /// Returns true when icloudpd finished cleanly. `ask_password` is only
    /// called once the download directory exists.
    pub fn download<F>(&self, username: &str, ask_password: F) -> bool
    where
        F: FnOnce(&str) -> Result<String>,
    {
        if let Err(e) = create_dir_if_not_exists(&self.download_dir) {
            error!(
                "Could not create download directory {}: {}",
                self.download_dir.display(),
                e
            );
            return false;
        }

        info!("Downloading for {} to {}...", username, self.download_dir.display());
        info!(
            "Note: Files already in {} will be skipped unless deleted or renamed.",
            self.download_dir.display()
        );

        let password = match ask_password(username) {
            Ok(password) => password,
            Err(e) => {
                error!("Could not read password for {}: {:#}", username, e);
                return false;
            },
        };

        info!(
            "Note: If 2FA is required, select a trusted device (e.g., '1' for iPhone) instead of SMS (e.g., '0') when prompted."
        );

        let cmd = self.command(username, &password);
        debug!("running {}", cmd);

        match cmd.run_interactive() {
            Ok(()) => {
                info!("Download completed successfully for {}.", username);
                true
            },
            Err(ProcessError::NotFound { program }) => {
                error!(
                    "{} not found. Ensure icloudpd is installed and in your PATH, or pass --icloudpd-path.",
                    program
                );
                false
            },
            Err(ProcessError::Interrupted { .. }) => {
                warn!(
                    "Download interrupted by user for {}. Restarting will skip already downloaded files.",
                    username
                );
                false
            },
            Err(e) => {
                error!("Error during download for {}: {}", username, e);
                false
            },
        }
    }
}
