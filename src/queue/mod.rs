//! The download queue: a single-worker, globally paced, retrying dispatcher.
//!
//! Every catch-up source feeds discovered media links into one shared queue.
//! The queue runs at most one fetch at a time, paced by the global
//! [`RateLimiter`], which is the only concurrency throttle between this
//! process and the media hosts. Transient failures (connection timeout,
//! zero-byte write) re-enqueue the identical job with backoff until the
//! [`RetryPolicy`] ceiling is reached; everything else is dropped to the
//! dead-letter list with a log line.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use catchup_core::download::{HttpClient, RateLimiter, RetryPolicy};
//! use catchup_core::queue::{DownloadJob, DownloadQueue};
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(50)));
//! let queue = DownloadQueue::new(HttpClient::new(), limiter, RetryPolicy::default());
//! queue.enqueue(DownloadJob::new(
//!     "https://i.example.com/cat.jpg",
//!     "downloads/cat.jpg",
//! ));
//! queue.drain().await;
//! # }
//! ```

mod job;

pub use job::DownloadJob;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::download::{classify_error, HttpClient, RateLimiter, RetryDecision, RetryPolicy};
use crate::store::MetadataStore;

/// How often `drain` re-checks queue emptiness.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A job that exhausted its retries or failed permanently.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The job that was dropped.
    pub job: DownloadJob,
    /// The final error, rendered.
    pub error: String,
    /// How many attempts were made in total.
    pub attempts: u32,
}

#[derive(Debug)]
struct QueuedJob {
    job: DownloadJob,
    attempt: u32,
    /// Set on re-enqueued jobs: the backoff deadline before which the worker
    /// will not pick this job up again.
    not_before: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<QueuedJob>,
    dead: Vec<DeadLetter>,
    in_flight: bool,
    worker_running: bool,
}

enum Step {
    Fetch(QueuedJob),
    Sleep(Instant),
    Exit,
}

/// Globally rate-limited download dispatcher.
///
/// Cheap to clone; all clones share the same pending list and worker. The
/// worker task is started lazily by the first `enqueue` and exits when the
/// queue runs dry, to be restarted by the next `enqueue`.
#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<Mutex<Inner>>,
    client: HttpClient,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    store: Option<Arc<dyn MetadataStore>>,
    /// Wakes a worker sleeping on a backoff deadline when new work arrives.
    wakeup: Arc<Notify>,
}

impl DownloadQueue {
    /// Creates a queue with no metadata store attached.
    #[must_use]
    pub fn new(client: HttpClient, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            client,
            limiter,
            policy,
            store: None,
            wakeup: Arc::new(Notify::new()),
        }
    }

    /// Attaches a metadata store; completed fetches promote their planned
    /// record to confirmed.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a job and, if the worker is idle, (re)starts it.
    ///
    /// Duplicate destinations are accepted; repeated enqueues for the same
    /// path are idempotent in effect (last write wins). Deduplication against
    /// existing files happens at the dispatch call site.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, job: DownloadJob) {
        let spawn_worker = {
            let mut inner = self.lock();
            debug!(url = %job.url(), dest = %job.dest().display(), "enqueueing job");
            inner.pending.push_back(QueuedJob {
                job,
                attempt: 1,
                not_before: None,
            });
            if inner.worker_running {
                false
            } else {
                inner.worker_running = true;
                true
            }
        };

        if spawn_worker {
            let queue = self.clone();
            tokio::spawn(async move { queue.run_worker().await });
        } else {
            // The worker may be asleep on a backoff deadline; the new job is
            // immediately eligible.
            self.wakeup.notify_one();
        }
    }

    /// Returns true when no job is pending or in flight.
    ///
    /// Best-effort only: a `true` result means in-flight writes are likely
    /// finished, not that they are fsynced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.lock();
        inner.pending.is_empty() && !inner.in_flight
    }

    /// Number of jobs waiting (not counting one in flight).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Jobs dropped after permanent failure or retry exhaustion.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead.clone()
    }

    /// Waits until the queue is empty and nothing is in flight.
    pub async fn drain(&self) {
        while !self.is_empty() {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    async fn run_worker(self) {
        loop {
            let step = {
                let mut inner = self.lock();
                if inner.pending.is_empty() {
                    // Flag must be cleared in the same critical section as
                    // the emptiness check, or a concurrent enqueue could see
                    // a running worker that is about to exit.
                    inner.worker_running = false;
                    Step::Exit
                } else {
                    let now = Instant::now();
                    let eligible = inner
                        .pending
                        .iter()
                        .position(|j| j.not_before.is_none_or(|t| t <= now));
                    match eligible {
                        Some(index) => match inner.pending.remove(index) {
                            Some(queued) => {
                                inner.in_flight = true;
                                Step::Fetch(queued)
                            }
                            None => Step::Exit,
                        },
                        None => {
                            let earliest = inner
                                .pending
                                .iter()
                                .filter_map(|j| j.not_before)
                                .min()
                                .unwrap_or(now);
                            Step::Sleep(earliest)
                        }
                    }
                }
            };

            match step {
                Step::Exit => break,
                Step::Sleep(deadline) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline) => {}
                        () = self.wakeup.notified() => {}
                    }
                }
                Step::Fetch(queued) => {
                    self.limiter.acquire().await;
                    self.process(queued).await;
                    self.lock().in_flight = false;
                }
            }
        }
    }

    async fn process(&self, queued: QueuedJob) {
        let QueuedJob { job, attempt, .. } = queued;
        debug!(url = %job.url(), attempt, "fetching");

        match self.client.fetch_to_file(job.url(), job.dest()).await {
            Ok(bytes) => {
                info!(url = %job.url(), dest = %job.dest().display(), bytes, "downloaded");
                if let Some(store) = &self.store {
                    let filepath = job.dest().to_string_lossy();
                    if let Err(error) = store.confirm(&filepath).await {
                        warn!(%filepath, %error, "could not confirm metadata record");
                    }
                }
            }
            Err(error) => match self.policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url = %job.url(),
                        attempt = next_attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        %error,
                        "re-enqueueing job"
                    );
                    let mut inner = self.lock();
                    inner.pending.push_back(QueuedJob {
                        job,
                        attempt: next_attempt,
                        not_before: Some(Instant::now() + delay),
                    });
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(
                        url = %job.url(),
                        attempts = attempt,
                        %error,
                        %reason,
                        "dropping job"
                    );
                    self.lock().dead.push(DeadLetter {
                        job,
                        error: error.to_string(),
                        attempts: attempt,
                    });
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(10),
            Duration::from_millis(50),
            2.0,
        )
    }

    fn test_queue(max_attempts: u32) -> DownloadQueue {
        DownloadQueue::new(
            HttpClient::new(),
            Arc::new(RateLimiter::disabled()),
            fast_policy(max_attempts),
        )
    }

    #[tokio::test]
    async fn test_enqueue_and_drain_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.jpg");
        let queue = test_queue(3);

        queue.enqueue(DownloadJob::new(format!("{}/a.jpg", server.uri()), &dest));
        queue.drain().await;

        assert_eq!(std::fs::read(&dest).unwrap(), b"image");
        assert!(queue.dead_letters().is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_zero_byte_write_is_reenqueued_and_recovers() {
        let server = MockServer::start().await;
        // First response completes with an empty body, second has content.
        Mock::given(method("GET"))
            .and(path("/b.png"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("b.png");
        let queue = test_queue(3);

        queue.enqueue(DownloadJob::new(format!("{}/b.png", server.uri()), &dest));
        queue.drain().await;

        assert_eq!(std::fs::read(&dest).unwrap(), b"png bytes");
        assert!(queue.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_retry_ceiling_dead_letters_the_job() {
        let server = MockServer::start().await;
        // Always empty: the job retries up to the ceiling, then dead-letters.
        Mock::given(method("GET"))
            .and(path("/c.gif"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("c.gif");
        let queue = test_queue(2);

        queue.enqueue(DownloadJob::new(format!("{}/c.gif", server.uri()), &dest));
        queue.drain().await;

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert!(dead[0].error.contains("zero bytes"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_dropped_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/d.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let queue = test_queue(5);

        queue.enqueue(DownloadJob::new(
            format!("{}/d.jpg", server.uri()),
            temp.path().join("d.jpg"),
        ));
        queue.drain().await;

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 1);
        assert!(!temp.path().join("d.jpg").exists());
    }

    #[tokio::test]
    async fn test_fresh_job_is_not_stalled_by_a_backing_off_one() {
        let server = MockServer::start().await;
        // stuck.gif always completes empty, so it keeps backing off.
        Mock::given(method("GET"))
            .and(path("/stuck.gif"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quick.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"quick".to_vec()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let queue = DownloadQueue::new(
            HttpClient::new(),
            Arc::new(RateLimiter::disabled()),
            RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(2), 2.0),
        );

        queue.enqueue(DownloadJob::new(
            format!("{}/stuck.gif", server.uri()),
            temp.path().join("stuck.gif"),
        ));
        // Let the first attempt fail and enter its two-second backoff.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let quick = temp.path().join("quick.jpg");
        queue.enqueue(DownloadJob::new(
            format!("{}/quick.jpg", server.uri()),
            &quick,
        ));

        // The fresh job must complete well inside the backoff window.
        let deadline = Instant::now() + Duration::from_secs(1);
        while !quick.exists() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(std::fs::read(&quick).unwrap(), b"quick");
    }

    #[tokio::test]
    async fn test_worker_restarts_after_drain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/e.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"one".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/f.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"two".to_vec()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let queue = test_queue(3);

        queue.enqueue(DownloadJob::new(
            format!("{}/e.jpg", server.uri()),
            temp.path().join("e.jpg"),
        ));
        queue.drain().await;

        queue.enqueue(DownloadJob::new(
            format!("{}/f.jpg", server.uri()),
            temp.path().join("f.jpg"),
        ));
        queue.drain().await;

        assert_eq!(std::fs::read(temp.path().join("e.jpg")).unwrap(), b"one");
        assert_eq!(std::fs::read(temp.path().join("f.jpg")).unwrap(), b"two");
    }
}
