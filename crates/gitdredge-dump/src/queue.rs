use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rustc_hash::FxHashSet;

use crate::settings::QUEUE_CAPACITY;

/// The crawl frontier: a deduplicating hand-off between the parsers that
/// discover paths and the workers that fetch them.
///
/// Membership lives in a mutex-guarded pair of sets; delivery goes through a
/// bounded channel, so bursty expansion applies backpressure to producers
/// instead of growing without bound. The channel send always happens after
/// the set lock is released — a producer must never block on a full channel
/// while holding the lock.
pub(crate) struct FetchQueue {
    state: Mutex<State>,
    queued: AtomicUsize,
    done: AtomicUsize,
    tx: async_channel::Sender<String>,
    rx: async_channel::Receiver<String>,
}

#[derive(Default)]
struct State {
    known: FxHashSet<String>,
    done: FxHashSet<String>,
}

impl FetchQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = async_channel::bounded(QUEUE_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            queued: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            tx,
            rx,
        }
    }

    /// Queue a path for fetching. A path ever queued before — done or not —
    /// is ignored. Returns whether the path was newly queued.
    ///
    /// Panics if the queue has been closed; paths are only discovered by
    /// parsing, and the queue closes strictly after the last parse.
    pub(crate) async fn add(&self, path: &str) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if !state.known.insert(path.to_string()) {
                return false;
            }
            self.queued.fetch_add(1, Ordering::SeqCst);
        }
        self.tx
            .send(path.to_string())
            .await
            .expect("path added to a closed fetch queue");
        true
    }

    /// Record that a path's fetch-and-parse finished, whatever the outcome.
    /// Idempotent per path.
    pub(crate) fn mark_done(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        if state.done.insert(path.to_string()) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A consumer handle yielding paths until the queue is closed and
    /// drained. Handles may be cloned freely across workers.
    pub(crate) fn todo(&self) -> async_channel::Receiver<String> {
        self.rx.clone()
    }

    /// True when every queued path has been marked done. The counters are
    /// read under the set lock so the snapshot is consistent with in-flight
    /// `add`s.
    pub(crate) fn counters_equal(&self) -> bool {
        let _state = self.state.lock().unwrap();
        self.queued.load(Ordering::SeqCst) == self.done.load(Ordering::SeqCst)
    }

    /// Lock-free `(queued, done)` snapshot for progress reporting.
    pub(crate) fn counts(&self) -> (usize, usize) {
        (
            self.queued.load(Ordering::SeqCst),
            self.done.load(Ordering::SeqCst),
        )
    }

    pub(crate) fn close(&self) {
        self.tx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paths_are_queued_at_most_once() {
        let queue = FetchQueue::new();
        assert!(queue.add("HEAD").await);
        assert!(!queue.add("HEAD").await);
        assert_eq!(queue.counts(), (1, 0));
        assert!(!queue.counters_equal());

        let todo = queue.todo();
        assert_eq!(todo.recv().await.unwrap(), "HEAD");
        queue.mark_done("HEAD");
        queue.mark_done("HEAD");
        assert_eq!(queue.counts(), (1, 1));
        assert!(queue.counters_equal());

        // Done paths never re-enter the frontier.
        assert!(!queue.add("HEAD").await);
        assert_eq!(queue.counts(), (1, 1));
    }

    #[tokio::test]
    async fn close_ends_the_todo_stream_after_draining() {
        let queue = FetchQueue::new();
        queue.add("packed-refs").await;
        queue.close();

        let todo = queue.todo();
        assert_eq!(todo.recv().await.unwrap(), "packed-refs");
        assert!(todo.recv().await.is_err());
    }

    #[tokio::test]
    #[should_panic(expected = "closed fetch queue")]
    async fn add_after_close_is_fatal() {
        let queue = FetchQueue::new();
        queue.close();
        queue.add("HEAD").await;
    }
}
