use std::process::ExitCode;

pub(crate) use check::check;
pub(crate) use fetch::fetch;
pub(crate) use index::index;

mod check;
mod fetch;
mod index;

/// Probes are one cheap request each, so they run wider than dumps.
pub(crate) const PROBE_THREADS: usize = 10;

/// Concurrent repository dumps in batch mode.
pub(crate) const REPO_THREADS: usize = 2;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,

    /// The command ran, but recorded errors along the way.
    Failure,

    /// The command failed with an unexpected error.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::from(0),
            ExitStatus::Failure => ExitCode::from(1),
            ExitStatus::Error => ExitCode::from(2),
        }
    }
}
