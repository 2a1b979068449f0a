//! One crawl rooted at a base URL: bootstrap, worker pool, circuit breaker,
//! and the quiescence-based termination protocol.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use gitdredge_client::FetchClient;
use gitdredge_index::Index;

use crate::error::DumpError;
use crate::item::{Item, ParseLimits};
use crate::paths::{is_loose_object, object_path, PATH_INDEX, ROOT_DIR, WELL_KNOWN};
use crate::queue::FetchQueue;
use crate::settings::{
    DumpSettings, BAD_OBJECTS_FLOOR, GRACE_WINDOW, PROGRESS_INTERVAL, QUIESCENCE_POLL,
    SAVE_CAPACITY,
};
use crate::urls::{directory_name, item_url, normalize_base};
use crate::writer;

/// The outcome of one repository crawl.
#[derive(Debug)]
pub struct DumpReport {
    pub base: Url,
    pub dir: PathBuf,
    /// Paths whose fetch-and-parse completed (found or missing).
    pub fetched: usize,
    /// Items that landed on disk.
    pub saved: usize,
    /// Per-path errors recorded along the way; none of them aborted the
    /// crawl, but any of them makes the run non-clean.
    pub errors: Vec<String>,
}

/// One crawl rooted at a base URL. Created per input URL, torn down once
/// every worker has joined.
pub struct Repo {
    base: Url,
    dir: PathBuf,
    settings: DumpSettings,
    client: FetchClient,
    cancel: CancellationToken,
    queue: FetchQueue,
    objects_total: AtomicUsize,
    objects_bad: AtomicUsize,
    objects_skip: AtomicBool,
    errors: Mutex<Vec<String>>,
}

impl Repo {
    /// Prepare a crawl: normalize the URL and create the target directory.
    ///
    /// Refusing to touch an existing dump (without update mode) happens
    /// here, before any network traffic.
    pub fn new(
        settings: DumpSettings,
        client: FetchClient,
        cancel: CancellationToken,
        url: &Url,
    ) -> Result<Self, DumpError> {
        let base = normalize_base(url);
        let dir = settings
            .download_dir
            .join(directory_name(&base))
            .join(ROOT_DIR);

        if dir.exists() {
            if !settings.update {
                return Err(DumpError::TargetExists(dir));
            }
        } else {
            fs_err::create_dir_all(&dir)?;
        }

        Ok(Self {
            base,
            dir,
            settings,
            client,
            cancel,
            queue: FetchQueue::new(),
            objects_total: AtomicUsize::new(0),
            objects_bad: AtomicUsize::new(0),
            objects_skip: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
        })
    }

    /// Crawl until the frontier drains, then report.
    pub async fn run(self) -> Result<DumpReport, DumpError> {
        info!("({}) dumping into {}", self.base, self.dir.display());

        let index_item = self.probe_index().await?;
        let index = Index::decode(&index_item.data);

        let (save_tx, save_rx) = mpsc::channel(SAVE_CAPACITY);
        let writer = tokio::spawn(writer::run(self.dir.clone(), save_rx));
        if save_tx.send(index_item).await.is_err() {
            warn!("({}) save writer quit before the index was written", self.base);
        }

        let repo = Arc::new(self);

        for path in WELL_KNOWN {
            repo.enqueue(path).await;
        }
        match index {
            Ok(index) => {
                info!(
                    "({}) {} files in the remote index",
                    repo.base,
                    index.entries.len()
                );
                for entry in &index.entries {
                    repo.enqueue(&object_path(&entry.id)).await;
                }
            }
            Err(err) => repo.record_error(PATH_INDEX, &err),
        }

        let mut workers = JoinSet::new();
        for id in 0..repo.settings.threads.max(1) {
            workers.spawn(worker(id, Arc::clone(&repo), save_tx.clone()));
        }
        drop(save_tx);
        let progress = tokio::spawn(progress(Arc::clone(&repo)));

        await_quiescence(&repo.queue, &repo.cancel).await;
        repo.queue.close();
        while workers.join_next().await.is_some() {}
        progress.abort();
        let _ = progress.await;

        // All senders are gone; the writer drains what is left and exits.
        let saved = writer.await.unwrap_or(0);

        let (_, done) = repo.queue.counts();
        info!("({}) done, fetched {done} items", repo.base);
        let errors = std::mem::take(&mut *repo.errors.lock().unwrap());
        let report = DumpReport {
            base: repo.base.clone(),
            dir: repo.dir.clone(),
            fetched: done,
            saved,
            errors,
        };
        Ok(report)
    }

    /// Fetch `index` and require the DIRC magic; anything else means the
    /// server is not actually exposing a repository.
    async fn probe_index(&self) -> Result<Item, DumpError> {
        let url = item_url(&self.base, PATH_INDEX)?;
        let fetched = self.client.get(url, &self.cancel).await?;
        let item = Item::new(PATH_INDEX, fetched.body, i32::from(fetched.status.as_u16()));
        if !item.exists || !gitdredge_index::is_index(&item.data) {
            return Err(DumpError::NotARepository(self.base.clone()));
        }
        Ok(item)
    }

    async fn enqueue(&self, path: &str) {
        if self.queue.add(path).await && is_loose_object(path) {
            self.objects_total.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fetch-and-parse one path. Every error is recorded and swallowed; the
    /// caller marks the path done regardless.
    async fn process(&self, path: &str, save: &mpsc::Sender<Item>) {
        let (mut item, from_disk) = match self.load(path).await {
            Ok(loaded) => loaded,
            Err(err) => {
                self.record_error(path, &err);
                return;
            }
        };

        if !item.exists {
            if item.status != 404 {
                self.record_error(path, format_args!("status {}", item.status));
            }
            return;
        }

        let extraction = item.extract(&self.limits());
        if item.is_object && !extraction.errors.is_empty() {
            self.note_bad_object();
        }
        for err in &extraction.errors {
            self.record_error(path, err);
        }
        for new_path in extraction.paths {
            self.enqueue(&new_path).await;
        }

        if !from_disk && save.send(item).await.is_err() {
            debug!("save channel closed before {path} could be written");
        }
    }

    /// Get the bytes for a path: from disk when an earlier run already saved
    /// them (object files are implicitly verified by their hash name during
    /// parsing), from the network otherwise.
    async fn load(&self, path: &str) -> Result<(Item, bool), DumpError> {
        if self.settings.skip_existing {
            if let Some(data) = self.read_local(path).await {
                debug!("re-using on-disk copy of {path}");
                return Ok((Item::new(path, data, 200), true));
            }
        }
        let url = item_url(&self.base, path)?;
        let fetched = self.client.get(url, &self.cancel).await?;
        let status = i32::from(fetched.status.as_u16());
        Ok((Item::new(path, fetched.body, status), false))
    }

    async fn read_local(&self, path: &str) -> Option<Vec<u8>> {
        let relative = writer::safe_relative_path(path)?;
        fs_err::tokio::read(self.dir.join(relative)).await.ok()
    }

    fn limits(&self) -> ParseLimits {
        ParseLimits {
            hash_limit: self.settings.hash_limit,
            ignore_bad_checksum: self.settings.ignore_bad_checksum,
            objects_skip: self.objects_skip.load(Ordering::SeqCst),
        }
    }

    /// Called once per object item whose extraction errored. Trips the
    /// breaker when enough objects are bad in absolute and relative terms;
    /// once tripped it stays tripped for the life of the repo.
    fn note_bad_object(&self) {
        let bad = self.objects_bad.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.objects_total.load(Ordering::SeqCst);
        if bad >= BAD_OBJECTS_FLOOR
            && bad * 100 > total * 50
            && !self.objects_skip.swap(true, Ordering::SeqCst)
        {
            warn!(
                "({}) skipping objects/ paths: {bad} of {total} failed to parse",
                self.base
            );
        }
    }

    fn record_error(&self, path: &str, message: impl Display) {
        let message = format!("{path}: {message}");
        warn!("({}) {message}", self.base);
        self.errors.lock().unwrap().push(message);
    }
}

async fn worker(id: usize, repo: Arc<Repo>, save: mpsc::Sender<Item>) {
    let todo = repo.queue.todo();
    loop {
        let path = tokio::select! {
            () = repo.cancel.cancelled() => break,
            next = todo.recv() => match next {
                Ok(path) => path,
                Err(_) => break,
            },
        };
        debug!("fetcher [{id}] {path}");
        repo.process(&path, &save).await;
        repo.queue.mark_done(&path);
    }
}

/// Wait until the crawl is quiescent: `queued == done` observed twice,
/// separated by a grace window. Workers enqueue every discovered path before
/// marking their own path done, so counter equality cannot mask an in-flight
/// parse; the re-check covers the hand-off window between the channel and
/// the counters. A third oscillation would indicate a bug, not more work.
async fn await_quiescence(queue: &FetchQueue, cancel: &CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        if queue.counters_equal() {
            tokio::time::sleep(GRACE_WINDOW).await;
            if queue.counters_equal() {
                return;
            }
        } else {
            tokio::time::sleep(QUIESCENCE_POLL).await;
        }
    }
}

async fn progress(repo: Arc<Repo>) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    interval.tick().await; // the first tick is immediate
    loop {
        interval.tick().await;
        let (queued, done) = repo.queue.counts();
        info!(
            "({}) fetched {done}, queue {}{}",
            repo.base,
            queued - done,
            memory_note()
        );
    }
}

#[cfg(target_os = "linux")]
fn memory_note() -> String {
    let Ok(process) = procfs::process::Process::myself() else {
        return String::new();
    };
    let Ok(statm) = process.statm() else {
        return String::new();
    };
    let rss_mb = statm.resident * procfs::page_size() / (1024 * 1024);
    format!(", rss {rss_mb} MB")
}

#[cfg(not(target_os = "linux"))]
fn memory_note() -> String {
    String::new()
}
