use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sentinel_core::cache::OfflineCache;
use sentinel_core::sentinel_debug;

use super::http::{HttpSender, TransportResult};
use super::ratelimit::RateLimiter;
use crate::{ClientOptions, DeliveryHint, DeliveryOutcome, Envelope, Transport};

type Job = (Envelope, DeliveryHint);

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    in_flight: usize,
    paused_until: Option<Instant>,
    shutdown: bool,
    exit: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.jobs.is_empty() && self.in_flight == 0
    }

    fn is_paused(&self) -> bool {
        self.paused_until.is_some_and(|until| until > Instant::now())
    }
}

struct Shared<S> {
    sender: S,
    cache: Option<OfflineCache>,
    limiter: Mutex<RateLimiter>,
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
    max_queue_size: usize,
}

/// The delivery queue in front of an [`HttpSender`].
///
/// Envelopes are written to the offline cache before they are attempted and
/// removed once the collector accepted them, so anything that fails or is
/// still queued at shutdown survives until the next start.  Jobs are worked
/// off in submission order by a fixed pool of `sentinel-transport-N`
/// threads, each driving its own current-thread tokio runtime.
///
/// A submission is rejected, and goes straight to the cache, when the queue
/// holds `max_queue_size` jobs, when it was shut down, or while it is paused
/// after the collector answered `429 Too Many Requests`.
pub struct AsyncConnection<S: HttpSender> {
    shared: Arc<Shared<S>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: HttpSender> AsyncConnection<S> {
    /// Creates the queue and spawns its workers.
    pub fn new(options: &ClientOptions, sender: S) -> Self {
        let cache = match OfflineCache::from_options(options) {
            Some(Ok(cache)) => Some(cache),
            Some(Err(err)) => {
                log::error!(
                    target: "sentinel",
                    "[Transport] Offline cache unavailable, failed envelopes are lost: {}",
                    err
                );
                None
            }
            None => None,
        };
        let shared = Arc::new(Shared {
            sender,
            cache,
            limiter: Mutex::new(RateLimiter::new()),
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            max_queue_size: options.max_queue_size,
        });

        let workers = (0..options.transport_workers.max(1))
            .filter_map(|index| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("sentinel-transport-{index}"))
                    .spawn(move || shared.work())
                    .map_err(|err| {
                        log::error!(
                            target: "sentinel",
                            "[Transport] Failed to spawn transport worker: {}",
                            err
                        );
                    })
                    .ok()
            })
            .collect();

        AsyncConnection {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// The number of jobs that are queued or running.
    pub fn pending(&self) -> usize {
        let state = self.shared.lock_state();
        state.jobs.len() + state.in_flight
    }

    /// Returns true while submissions are refused after a `429`.
    pub fn is_paused(&self) -> bool {
        self.shared.lock_state().is_paused()
    }

    /// Stops the workers once their current job is done and moves every
    /// queued job into the cache.
    fn stop(&self) {
        let leftover: Vec<Job> = {
            let mut state = self.shared.lock_state();
            state.shutdown = true;
            state.exit = true;
            state.jobs.drain(..).collect()
        };
        self.shared.available.notify_all();
        if !leftover.is_empty() {
            sentinel_debug!("[Transport] Caching {} queued envelopes", leftover.len());
        }
        for (envelope, hint) in leftover {
            self.shared.reject(envelope, hint);
        }
        self.shared.idle.notify_all();
    }

    fn join_workers(&self) {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() != current && handle.join().is_err() {
                log::error!(target: "sentinel", "[Transport] A transport worker panicked");
            }
        }
    }
}

impl<S: HttpSender> Shared<S> {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, envelope: &Envelope, hint: &DeliveryHint) -> Option<PathBuf> {
        self.cache.as_ref()?.store_with_hint(envelope, hint)
    }

    fn discard(&self, path: &Path) {
        if let Some(cache) = &self.cache {
            cache.discard_path(path);
        }
    }

    /// Keeps a job that will not be attempted now.
    fn reject(&self, envelope: Envelope, mut hint: DeliveryHint) {
        if !hint.retryable {
            hint.resolve(DeliveryOutcome::Dropped);
            return;
        }
        if hint.cached.is_none() {
            self.store(&envelope, &hint);
        }
        hint.resolve(DeliveryOutcome::Retry);
    }

    fn work(&self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                log::error!(
                    target: "sentinel",
                    "[Transport] Failed to start transport runtime: {}",
                    err
                );
                return;
            }
        };

        while let Some((envelope, hint)) = self.next_job() {
            runtime.block_on(self.run(envelope, hint));
            self.finish_job();
        }
    }

    fn next_job(&self) -> Option<Job> {
        let mut state = self.lock_state();
        loop {
            if state.exit {
                return None;
            }
            if let Some(job) = state.jobs.pop_front() {
                state.in_flight += 1;
                return Some(job);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish_job(&self) {
        let mut state = self.lock_state();
        state.in_flight -= 1;
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    async fn run(&self, envelope: Envelope, mut hint: DeliveryHint) {
        let cached = match hint.cached.clone() {
            Some(path) => Some(path),
            None if hint.retryable => self.store(&envelope, &hint),
            None => None,
        };

        let limited = self.limiter().envelope_disabled(&envelope);
        if let Some(time_left) = limited {
            sentinel_debug!(
                "[Transport] Holding back envelope due to rate limits for {}s",
                time_left.as_secs()
            );
            hint.resolve(DeliveryOutcome::Retry);
            return;
        }

        let result = self.sender.send(&envelope).await;
        match result {
            TransportResult::Success => {
                if let Some(path) = cached {
                    self.discard(&path);
                }
                hint.resolve(DeliveryOutcome::Sent);
            }
            TransportResult::Failure {
                status,
                retry_after,
                ref rate_limits,
            } => {
                self.record_failure(status, retry_after, rate_limits.as_deref());
                log::warn!(
                    target: "sentinel",
                    "[Transport] Failed to send envelope (status {}), retry suggested in {}ms",
                    status.map_or_else(|| "none".to_owned(), |status| status.to_string()),
                    result.retry_delay().as_millis()
                );
                if hint.retryable {
                    hint.resolve(DeliveryOutcome::Retry);
                } else {
                    hint.resolve(DeliveryOutcome::Dropped);
                }
            }
        }
    }

    fn record_failure(
        &self,
        status: Option<u16>,
        retry_after: Option<Duration>,
        rate_limits: Option<&str>,
    ) {
        let pause = {
            let mut limiter = self.limiter();
            if let Some(header) = rate_limits {
                limiter.update_from_sentry_header(header);
            }
            if let Some(delay) = retry_after {
                limiter.update_from_retry_after(delay);
            }
            if status != Some(429) {
                return;
            }
            if limiter.longest_limit().is_none() {
                limiter.update_from_429();
            }
            limiter.longest_limit().unwrap_or_default()
        };
        self.pause(pause);
    }

    /// Refuses new submissions for `duration` and caches everything queued.
    fn pause(&self, duration: Duration) {
        let drained: Vec<Job> = {
            let mut state = self.lock_state();
            state.paused_until = Some(Instant::now() + duration);
            state.jobs.drain(..).collect()
        };
        log::warn!(
            target: "sentinel",
            "[Transport] Rate limited, pausing delivery for {}s and caching {} queued envelopes",
            duration.as_secs(),
            drained.len()
        );
        for (envelope, hint) in drained {
            self.reject(envelope, hint);
        }
    }
}

impl<S: HttpSender> Transport for AsyncConnection<S> {
    fn send_envelope(&self, envelope: Envelope, hint: DeliveryHint) {
        let mut state = self.shared.lock_state();
        let refusal = if state.shutdown {
            Some("shut down")
        } else if state.is_paused() {
            Some("paused")
        } else if state.jobs.len() + state.in_flight >= self.shared.max_queue_size {
            Some("full")
        } else {
            None
        };

        match refusal {
            None => {
                state.jobs.push_back((envelope, hint));
                drop(state);
                self.shared.available.notify_one();
            }
            Some(reason) => {
                drop(state);
                sentinel_debug!("[Transport] Queue is {}, caching envelope", reason);
                self.shared.reject(envelope, hint);
            }
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock_state();
        while !state.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .idle
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        sentinel_debug!("[Transport] Shutting down");
        self.shared.lock_state().shutdown = true;
        let flushed = self.flush(timeout);
        self.stop();
        if flushed {
            self.join_workers();
        }
        flushed
    }
}

impl<S: HttpSender> Drop for AsyncConnection<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::protocol::{Event, SessionStatus, SessionUpdate};
    use crate::SessionPhase;

    struct Scripted {
        calls: AtomicUsize,
        result: TransportResult,
    }

    impl HttpSender for Scripted {
        async fn send(&self, _envelope: &Envelope) -> TransportResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn connection(
        dir: &Path,
        result: TransportResult,
    ) -> (AsyncConnection<Arc<Scripted>>, Arc<Scripted>) {
        let options = ClientOptions {
            cache_dir_path: Some(dir.to_path_buf()),
            ..Default::default()
        };
        let sender = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            result,
        });
        (AsyncConnection::new(&options, sender.clone()), sender)
    }

    fn cached_events(dir: &Path) -> usize {
        OfflineCache::open(dir, 10, 100).unwrap().events().len()
    }

    #[test]
    fn test_success_discards_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let (connection, sender) = connection(dir.path(), TransportResult::Success);

        let (hint, receipt) = DeliveryHint::new().with_completion();
        connection.send_envelope(Event::new().into(), hint);
        assert_eq!(
            receipt.wait(Duration::from_secs(5)),
            Some(DeliveryOutcome::Sent)
        );
        assert!(connection.flush(Duration::from_secs(5)));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached_events(dir.path()), 0);
    }

    #[test]
    fn test_failure_keeps_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let (connection, _) = connection(dir.path(), TransportResult::io_failure());

        let (hint, receipt) = DeliveryHint::new().with_completion();
        connection.send_envelope(Event::new().into(), hint);
        assert_eq!(
            receipt.wait(Duration::from_secs(5)),
            Some(DeliveryOutcome::Retry)
        );
        assert_eq!(cached_events(dir.path()), 1);
        assert!(!connection.is_paused());
    }

    #[test]
    fn test_rate_limited_envelopes_are_held_back() {
        let dir = tempfile::tempdir().unwrap();
        let (connection, sender) = connection(
            dir.path(),
            TransportResult::Failure {
                status: Some(500),
                retry_after: None,
                rate_limits: Some("60:error:project".into()),
            },
        );

        connection.send_envelope(Event::new().into(), DeliveryHint::new());
        assert!(connection.flush(Duration::from_secs(5)));

        let (hint, receipt) = DeliveryHint::new().with_completion();
        connection.send_envelope(Event::new().into(), hint);
        assert_eq!(
            receipt.wait(Duration::from_secs(5)),
            Some(DeliveryOutcome::Retry)
        );
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached_events(dir.path()), 2);
    }

    #[test]
    fn test_not_retryable_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (connection, _) = connection(dir.path(), TransportResult::io_failure());

        let mut hint = DeliveryHint::new();
        hint.retryable = false;
        let (hint, receipt) = hint.with_completion();
        connection.send_envelope(Event::new().into(), hint);
        assert_eq!(
            receipt.wait(Duration::from_secs(5)),
            Some(DeliveryOutcome::Dropped)
        );
        assert_eq!(cached_events(dir.path()), 0);
    }

    #[test]
    fn test_final_session_update_replaces_cached_ones() {
        let dir = tempfile::tempdir().unwrap();
        let (connection, _) = connection(dir.path(), TransportResult::io_failure());

        let mut session = SessionUpdate {
            session_id: crate::Uuid::new_v4(),
            distinct_id: None,
            sequence: None,
            timestamp: None,
            started: std::time::SystemTime::now(),
            init: true,
            duration: None,
            status: SessionStatus::Ok,
            errors: 0,
            attributes: Default::default(),
        };
        connection.send_envelope(
            session.clone().into(),
            DeliveryHint::new().session(SessionPhase::Start),
        );
        session.init = false;
        session.status = SessionStatus::Exited;
        let (hint, receipt) = DeliveryHint::new()
            .session(SessionPhase::End)
            .with_completion();
        connection.send_envelope(session.into(), hint);
        assert_eq!(
            receipt.wait(Duration::from_secs(5)),
            Some(DeliveryOutcome::Retry)
        );

        let cache = OfflineCache::open(dir.path(), 10, 100).unwrap();
        let cached = cache.sessions().load_all();
        assert_eq!(cached.len(), 1);
        let last = cached[0].1.session_updates().next().unwrap();
        assert_eq!(last.status, SessionStatus::Exited);
        assert!(last.init);
    }

    #[test]
    fn test_shutdown_refuses_new_work() {
        let dir = tempfile::tempdir().unwrap();
        let (connection, sender) = connection(dir.path(), TransportResult::Success);
        assert!(connection.shutdown(Duration::from_secs(5)));

        let (hint, receipt) = DeliveryHint::new().with_completion();
        connection.send_envelope(Event::new().into(), hint);
        assert_eq!(
            receipt.wait(Duration::from_secs(1)),
            Some(DeliveryOutcome::Retry)
        );
        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cached_events(dir.path()), 1);
    }
}
