//! Synchronous spawn-and-wait for the external tools.

use std::{
    ffi::{OsStr, OsString},
    fmt, io,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{program} not found")]
    NotFound { program: String },

    #[error("{program} exited with {status}{}", stderr_detail(.stderr))]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} was interrupted")]
    Interrupted { program: String },

    #[error("could not run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn stderr_detail(stderr: &str) -> String {
    match stderr.trim() {
        "" => String::new(),
        text => format!(": {text}"),
    }
}

/// A program plus its arguments. Arguments added with [`ExternalCommand::secret_arg`]
/// are masked whenever the command is displayed.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<OsString>,
    secrets: Vec<usize>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    pub fn secret_arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.secrets.push(self.args.len());
        self.arg(arg)
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Run with the terminal attached so the tool can prompt the user.
    /// Blocks until the child exits.
    pub fn run_interactive(&self) -> Result<(), ProcessError> {
        let guard = interrupt::Guard::install();
        let status = self.command().status().map_err(|e| self.spawn_error(e))?;
        let interrupted = guard.received() || interrupt::killed_by_sigint(&status);
        drop(guard);

        if interrupted {
            return Err(ProcessError::Interrupted {
                program: self.program_name(),
            });
        }
        if !status.success() {
            return Err(ProcessError::Failed {
                program: self.program_name(),
                status,
                stderr: String::new(),
            });
        }
        Ok(())
    }

    /// Run with stdout and stderr captured; returns stdout on success.
    pub fn run_captured(&self) -> Result<Vec<u8>, ProcessError> {
        let output = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if interrupt::killed_by_sigint(&output.status) {
            return Err(ProcessError::Interrupted {
                program: self.program_name(),
            });
        }
        if !output.status.success() {
            return Err(ProcessError::Failed {
                program: self.program_name(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    fn spawn_error(&self, source: io::Error) -> ProcessError {
        match source.kind() {
            io::ErrorKind::NotFound => ProcessError::NotFound {
                program: self.program_name(),
            },
            _ => ProcessError::Io {
                program: self.program_name(),
                source,
            },
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secrets.contains(&i) {
                write!(f, " ********")?;
            } else {
                write!(f, " {}", arg.to_string_lossy())?;
            }
        }
        Ok(())
    }
}

/// While a guard is alive, Ctrl-C is recorded instead of terminating this
/// process. The child still gets the signal: caught handlers reset on exec.
/// Guards are serialized, so each one restores the disposition it replaced.
#[cfg(unix)]
mod interrupt {
    use std::{
        os::unix::process::ExitStatusExt,
        process::ExitStatus,
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex, MutexGuard, PoisonError,
        },
    };

    static RECEIVED: AtomicBool = AtomicBool::new(false);
    static INSTALLED: Mutex<()> = Mutex::new(());

    extern "C" fn on_sigint(_: libc::c_int) {
        RECEIVED.store(true, Ordering::SeqCst);
    }

    pub fn lock() -> MutexGuard<'static, ()> {
        INSTALLED.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub struct Guard {
        previous: libc::sighandler_t,
        // Declared last: released only after `drop` has restored `previous`.
        _installed: MutexGuard<'static, ()>,
    }

    impl Guard {
        pub fn install() -> Self {
            let installed = lock();
            RECEIVED.store(false, Ordering::SeqCst);
            let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
            let previous = unsafe { libc::signal(libc::SIGINT, handler) };
            // An ignored SIGINT (nohup and friends) must stay ignored for the child too.
            if previous == libc::SIG_IGN {
                unsafe { libc::signal(libc::SIGINT, libc::SIG_IGN) };
            }
            Self {
                previous,
                _installed: installed,
            }
        }

        pub fn received(&self) -> bool {
            RECEIVED.load(Ordering::SeqCst)
        }
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            if self.previous != libc::SIG_ERR {
                unsafe { libc::signal(libc::SIGINT, self.previous) };
            }
        }
    }

    pub fn killed_by_sigint(status: &ExitStatus) -> bool {
        status.signal() == Some(libc::SIGINT)
    }
}

#[cfg(not(unix))]
mod interrupt {
    use std::process::ExitStatus;

    pub struct Guard;

    impl Guard {
        pub fn install() -> Self {
            Guard
        }

        pub fn received(&self) -> bool {
            false
        }
    }

    pub fn killed_by_sigint(_status: &ExitStatus) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_secret_arguments() {
        let cmd = ExternalCommand::new("icloudpd")
            .args(["--username", "me@example.com", "--password"])
            .secret_arg("hunter2")
            .arg("--set-exif-datetime");
        let shown = cmd.to_string();
        assert_eq!(
            shown,
            "icloudpd --username me@example.com --password ******** --set-exif-datetime"
        );
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn missing_program_is_not_found() {
        let cmd = ExternalCommand::new("definitely-not-a-real-tool-4f1c");
        assert!(matches!(cmd.run_captured(), Err(ProcessError::NotFound { .. })));
        assert!(matches!(cmd.run_interactive(), Err(ProcessError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn captured_output_is_returned() {
        let out = ExternalCommand::new("sh")
            .args(["-c", "printf hello"])
            .run_captured()
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_stderr() {
        let err = ExternalCommand::new("sh")
            .args(["-c", "echo boom >&2; exit 1"])
            .run_captured()
            .unwrap_err();
        match &err {
            ProcessError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(1));
                assert_eq!(stderr.trim(), "boom");
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().ends_with(": boom"));
    }

    #[cfg(unix)]
    #[test]
    fn interactive_non_zero_exit_is_failed() {
        let err = ExternalCommand::new("sh")
            .args(["-c", "exit 3"])
            .run_interactive()
            .unwrap_err();
        match err {
            ProcessError::Failed { status, .. } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn child_killed_by_sigint_is_interrupted() {
        let err = ExternalCommand::new("sh")
            .args(["-c", "kill -INT $$"])
            .run_interactive()
            .unwrap_err();
        assert!(matches!(err, ProcessError::Interrupted { .. }));
    }

    #[cfg(unix)]
    fn sigint_disposition() -> libc::sighandler_t {
        unsafe {
            let mut current: libc::sigaction = std::mem::zeroed();
            libc::sigaction(libc::SIGINT, std::ptr::null(), &mut current);
            current.sa_sigaction
        }
    }

    #[cfg(unix)]
    #[test]
    fn overlapping_runs_restore_the_original_handler() {
        let before = {
            let _installed = interrupt::lock();
            sigint_disposition()
        };

        let workers: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..5 {
                        ExternalCommand::new("sh")
                            .args(["-c", "exit 0"])
                            .run_interactive()
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let _installed = interrupt::lock();
        assert_eq!(sigint_disposition(), before);
    }
}
