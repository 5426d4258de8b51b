//! Detecting package files held open by other processes.
//!
//! On Windows an IDE with a solution loaded keeps the referenced package
//! assemblies open, and any attempt to overwrite or delete them fails with a
//! sharing violation. We probe for that before destructive operations and
//! retry transient filesystem failures a bounded number of times before
//! giving up.

use std::{
    fs::OpenOptions,
    io::{self, ErrorKind},
    path::Path,
    thread,
    time::Duration,
};
use sysinfo::{ProcessExt, System, SystemExt};
use thiserror::Error as ThisError;

/// Process names of IDEs known to hold package files open.
pub const KNOWN_IDES: &[&str] = &["devenv", "rider64", "rider", "code"];

/// How hard to try before declaring a file locked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LockPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        LockPolicy {
            retries: 3,
            delay: Duration::from_millis(250),
        }
    }
}

/// An error returned when local package files are held open by another
/// process. This is never retried automatically: the offending process has
/// to be closed first.
#[derive(Debug, ThisError)]
pub struct ResourceLockedError {
    pub solution: String,
    /// The running IDE that most likely holds the files, if one was found.
    pub process: Option<String>,
}

impl std::fmt::Display for ResourceLockedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.process {
            Some(ref process) => write!(
                f,
                "package files for solution `{}` are locked; `{}` is running, close it and try again",
                self.solution, process
            ),
            None => write!(
                f,
                "package files for solution `{}` are locked by another process; close it and try again",
                self.solution
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Probe {
    Free,
    Locked,
    Transient,
}

fn classify(err: &io::Error) -> Probe {
    // ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION
    if cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33)) {
        return Probe::Locked;
    }

    match err.kind() {
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => Probe::Transient,
        ErrorKind::PermissionDenied if cfg!(windows) => Probe::Transient,
        _ => Probe::Free,
    }
}

fn probe(path: &Path) -> Probe {
    match OpenOptions::new().append(true).open(path) {
        Ok(_) => Probe::Free,
        Err(e) => classify(&e),
    }
}

/// Whether `path` is held open by another process.
///
/// Transient failures are retried according to `policy`; if they persist
/// the file is reported as locked.
pub fn is_locked(path: &Path, policy: &LockPolicy) -> bool {
    for attempt in 0..=policy.retries {
        match probe(path) {
            Probe::Free => return false,
            Probe::Locked => return true,
            Probe::Transient if attempt < policy.retries => thread::sleep(policy.delay),
            Probe::Transient => {}
        }
    }

    true
}

/// Whether an I/O error means the target is held by another process.
pub fn is_lock_error(err: &io::Error) -> bool {
    classify(err) != Probe::Free
}

/// Run a filesystem operation, retrying transient and lock failures a
/// bounded number of times.
pub fn retry_io<T, F>(policy: &LockPolicy, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempt = 0;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_lock_error(&e) && attempt < policy.retries => {
                attempt += 1;
                thread::sleep(policy.delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Convert a failed filesystem operation into an error, escalating lock
/// failures to [`ResourceLockedError`].
pub fn escalate(err: io::Error, solution: &str, path: &Path) -> anyhow::Error {
    if is_lock_error(&err) {
        ResourceLockedError {
            solution: solution.to_owned(),
            process: SystemProcessProbe.find_ide(),
        }
        .into()
    } else {
        anyhow::Error::new(err).context(format!("failed to modify `{}`", path.display()))
    }
}

/// Finds running processes that are known to lock package files.
pub trait ProcessProbe: Send + Sync {
    /// The name of the first known IDE found running, if any.
    fn find_ide(&self) -> Option<String>;
}

/// Looks at the live process table.
#[derive(Debug, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn find_ide(&self) -> Option<String> {
        let mut system = System::new();
        system.refresh_processes();

        let mut names: Vec<String> = system
            .processes()
            .values()
            .map(|p| p.name().to_lowercase())
            .collect();
        names.sort();

        KNOWN_IDES.iter().find_map(|ide| {
            names
                .iter()
                .find(|n| n.as_str() == *ide || n.trim_end_matches(".exe") == *ide)
                .cloned()
        })
    }
}
