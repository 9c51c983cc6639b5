use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

/// The part of a session's life an envelope reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The first update of a fresh session.
    Start,
    /// An intermediate update, e.g. after an error.
    Update,
    /// The final update of a session.
    End,
}

/// How a single delivery settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The collector accepted the envelope.
    Sent,
    /// Delivery failed transiently; the envelope stays in the offline cache.
    Retry,
    /// The envelope was given up on.
    Dropped,
}

/// Delivery metadata travelling with an envelope.
///
/// The hint tells the transport where an envelope came from and lets the
/// submitter wait for the outcome through a [`Receipt`].
pub struct DeliveryHint {
    /// Whether a failed delivery should keep the envelope for later.
    pub retryable: bool,
    /// The cache file this envelope was replayed from.
    pub cached: Option<PathBuf>,
    /// The session phase carried by this envelope, if any.
    pub session: Option<SessionPhase>,
    completion: Option<SyncSender<DeliveryOutcome>>,
}

impl Default for DeliveryHint {
    fn default() -> Self {
        DeliveryHint {
            retryable: true,
            cached: None,
            session: None,
            completion: None,
        }
    }
}

impl fmt::Debug for DeliveryHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryHint")
            .field("retryable", &self.retryable)
            .field("cached", &self.cached)
            .field("session", &self.session)
            .field("awaited", &self.completion.is_some())
            .finish()
    }
}

impl DeliveryHint {
    /// Creates a default hint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the envelope as replayed from the given cache file.
    #[must_use]
    pub fn cached<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cached = Some(path.as_ref().to_path_buf());
        self
    }

    /// Records the session phase carried by the envelope.
    #[must_use]
    pub fn session(mut self, phase: SessionPhase) -> Self {
        self.session = Some(phase);
        self
    }

    /// Attaches a completion channel and returns the matching [`Receipt`].
    pub fn with_completion(mut self) -> (Self, Receipt) {
        let (tx, rx) = mpsc::sync_channel(1);
        self.completion = Some(tx);
        (self, Receipt { rx })
    }

    /// Resolves the delivery.
    ///
    /// Only the first call has an effect.
    pub fn resolve(&mut self, outcome: DeliveryOutcome) {
        if let Some(tx) = self.completion.take() {
            tx.try_send(outcome).ok();
        }
    }
}

/// The waiting end of a [`DeliveryHint`] completion.
#[derive(Debug)]
pub struct Receipt {
    rx: Receiver<DeliveryOutcome>,
}

impl Receipt {
    /// Waits up to `timeout` for the delivery to settle.
    ///
    /// Returns `None` on timeout.  A hint that is dropped without being
    /// resolved counts as [`DeliveryOutcome::Dropped`].
    pub fn wait(&self, timeout: Duration) -> Option<DeliveryOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Disconnected) => Some(DeliveryOutcome::Dropped),
            Err(RecvTimeoutError::Timeout) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_once() {
        let (mut hint, receipt) = DeliveryHint::new().with_completion();
        hint.resolve(DeliveryOutcome::Retry);
        hint.resolve(DeliveryOutcome::Sent);
        assert_eq!(
            receipt.wait(Duration::from_millis(10)),
            Some(DeliveryOutcome::Retry)
        );
    }

    #[test]
    fn test_unresolved_drop() {
        let (hint, receipt) = DeliveryHint::new().with_completion();
        drop(hint);
        assert_eq!(
            receipt.wait(Duration::from_millis(10)),
            Some(DeliveryOutcome::Dropped)
        );
    }

    #[test]
    fn test_wait_times_out() {
        let (_hint, receipt) = DeliveryHint::new().with_completion();
        assert_eq!(receipt.wait(Duration::from_millis(10)), None);
    }
}
