mod cli;
mod fetcher;
mod file_organizer;
mod logging;
mod metadata_handler;
mod process;
mod prompt;
mod sweeper;
#[cfg(all(test, unix))]
mod test_support;
mod utilities;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

use crate::{cli::Conf, fetcher::Fetcher, file_organizer::Organizer, sweeper::Sweeper};

fn main() -> Result<()> {
    let conf = Conf::parse().resolve_download_dir()?;
    logging::init_logging(&conf.log_level);

    info!("Starting iCloud Photo Downloader...");
    debug!("download directory: {}", conf.download_dir.display());

    let username = match &conf.username {
        Some(username) => username.trim().to_string(),
        None => prompt::ask_username()?,
    };
    if username.is_empty() {
        error!("No username provided. Exiting.");
        return Ok(());
    }

    run(&conf, &username, prompt::ask_password);
    Ok(())
}

/// Fetcher, then Organizer, then Sweeper. A failed download ends the run
/// before anything is moved or removed; returns false in that case.
fn run<F>(conf: &Conf, username: &str, ask_password: F) -> bool
where
    F: FnOnce(&str) -> Result<String>,
{
    if !conf.skip_download && !Fetcher::new(conf).download(username, ask_password) {
        error!("Download failed or was interrupted for {}. Restart to resume.", username);
        return false;
    }

    info!("Organizing new files for {}...", username);
    match Organizer::new(conf).run() {
        Ok(report) => debug!(
            "{} moved, {} already in place, {} failed",
            report.moved.len(),
            report.already_placed,
            report.failed.len()
        ),
        Err(e) => error!("Could not organize {}: {:#}", conf.download_dir.display(), e),
    }

    info!("Cleaning up empty directories for {}...", username);
    let swept = Sweeper::new(conf).run();
    debug!(
        "{} directories removed, {} could not be removed",
        swept.removed.len(),
        swept.failed.len()
    );

    info!("All tasks completed for {}!", username);
    true
}
