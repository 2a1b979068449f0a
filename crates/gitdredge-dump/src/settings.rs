use std::path::PathBuf;
use std::time::Duration;

/// Slots in the frontier channel. Expansion is bursty (a single tree can
/// reference thousands of blobs), so producers only block on a very full
/// queue.
pub(crate) const QUEUE_CAPACITY: usize = 10_000;

/// Slots in the save channel; bounds how far fetchers can outrun the writer.
pub(crate) const SAVE_CAPACITY: usize = 100;

/// The counters must stay equal across this window before the crawl is
/// considered quiescent.
pub(crate) const GRACE_WINDOW: Duration = Duration::from_millis(200);

/// Poll interval while the counters are still apart.
pub(crate) const QUIESCENCE_POLL: Duration = Duration::from_millis(50);

pub(crate) const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Minimum failed object count before the objects circuit breaker may trip.
pub(crate) const BAD_OBJECTS_FLOOR: usize = 200;

/// Everything a crawl needs to know, passed explicitly into each component.
#[derive(Debug, Clone)]
pub struct DumpSettings {
    /// Directory that per-repository dumps are created under.
    pub download_dir: PathBuf,
    /// Concurrent fetch workers per repository.
    pub threads: usize,
    /// Dial timeout for every request, in seconds.
    pub timeout: u64,
    /// Cap on hex-40 matches extracted from a single file.
    pub hash_limit: usize,
    /// Allow dumping into an existing target directory.
    pub update: bool,
    /// Re-use files already on disk instead of fetching them again.
    pub skip_existing: bool,
    /// Keep extracting references from objects whose SHA-1 does not match
    /// the path they are served under.
    pub ignore_bad_checksum: bool,
}

impl Default for DumpSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("dumps"),
            threads: 4,
            timeout: 10,
            hash_limit: 2_000,
            update: false,
            skip_existing: true,
            ignore_bad_checksum: true,
        }
    }
}
