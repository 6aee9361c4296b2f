//! Destructive in-place slice trimming through FSL's `fslroi`.

use crate::error::{NormalizeError, Result};
use std::env;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Name of the FSL region-of-interest executable.
pub const FSLROI: &str = "fslroi";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Trait for tools that cut the third spatial axis of an image down to its
/// first `slices` indices, writing the result over the input.
pub trait SliceTrimmer {
    /// Fail with `ToolNotFound` if trimming cannot possibly succeed.
    fn ensure_available(&self) -> Result<()>;

    /// Trim the image at `path` in place.
    fn trim(&self, path: &Path, slices: u64) -> Result<()>;
}

/// `fslroi` invoked as a blocking subprocess.
#[derive(Debug, Clone)]
pub struct FslRoi {
    program: String,
    timeout: Option<Duration>,
}

impl Default for FslRoi {
    fn default() -> Self {
        FslRoi::with_program(FSLROI)
    }
}

impl FslRoi {
    /// Use `fslroi` from `PATH`, without a timeout.
    pub fn new() -> Self {
        FslRoi::default()
    }

    /// Use a different executable name, or an explicit path to one.
    pub fn with_program<S: Into<String>>(program: S) -> Self {
        FslRoi {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill the tool and fail with `ToolTimeout` once `timeout` elapses.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Locate the executable. Bare names are looked up on `PATH`, skipping
    /// entries that are not executable files.
    pub fn resolve(&self) -> Result<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return if is_executable(program) {
                Ok(program.to_path_buf())
            } else {
                Err(NormalizeError::ToolNotFound(self.program.clone()))
            };
        }
        env::var_os("PATH")
            .and_then(|paths| {
                env::split_paths(&paths)
                    .map(|dir| dir.join(program))
                    .find(|candidate| is_executable(candidate))
            })
            .ok_or_else(|| NormalizeError::ToolNotFound(self.program.clone()))
    }

    fn run(&self, program: &Path, path: &Path, slices: u64) -> Result<()> {
        let mut child = Command::new(program)
            .args(roi_arguments(path, slices))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    NormalizeError::ToolNotFound(self.program.clone())
                }
                _ => NormalizeError::Io(e),
            })?;

        let stderr = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        let status = match self.timeout {
            Some(timeout) => match wait_with_deadline(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(NormalizeError::ToolTimeout {
                        tool: self.program.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait()?,
        };

        let stderr = reader.join().unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(NormalizeError::ToolExecution {
                tool: self.program.clone(),
                status,
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl SliceTrimmer for FslRoi {
    fn ensure_available(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    fn trim(&self, path: &Path, slices: u64) -> Result<()> {
        let program = self.resolve()?;
        debug!(tool = %program.display(), path = %path.display(), slices, "trimming slices");
        self.run(&program, path, slices)
    }
}

/// Arguments selecting the full x, y and t extent and the first `slices`
/// indices of z, with output written over the input.
pub fn roi_arguments(path: &Path, slices: u64) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![path.into(), path.into()];
    let ranges = [
        ("0", "-1".to_string()),
        ("0", "-1".to_string()),
        ("0", slices.to_string()),
        ("0", "-1".to_string()),
    ];
    for (start, len) in ranges.iter() {
        args.push(OsString::from(*start));
        args.push(OsString::from(len));
    }
    args
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
