use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::Envelope;

/// The delay suggested when a failed response carried no `Retry-After`.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The result of handing one envelope to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResult {
    /// The collector accepted the envelope.
    Success,
    /// The envelope was not accepted.
    Failure {
        /// The response status, if a response was received at all.
        status: Option<u16>,
        /// The parsed `Retry-After` header.
        retry_after: Option<Duration>,
        /// The raw `X-Sentry-Rate-Limits` header.
        rate_limits: Option<String>,
    },
}

impl TransportResult {
    /// A failure without any response, e.g. a connection error.
    pub fn io_failure() -> Self {
        TransportResult::Failure {
            status: None,
            retry_after: None,
            rate_limits: None,
        }
    }

    /// Returns true for [`TransportResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, TransportResult::Success)
    }

    /// How long the collector asked us to wait before retrying.
    pub fn retry_delay(&self) -> Duration {
        match self {
            TransportResult::Failure {
                retry_after: Some(delay),
                ..
            } => *delay,
            _ => DEFAULT_RETRY_DELAY,
        }
    }
}

/// Performs a single delivery attempt.
///
/// Implementations do not retry or cache; the [`AsyncConnection`] driving
/// them takes care of both.  The returned future is polled on the
/// connection's worker runtime.
///
/// [`AsyncConnection`]: super::AsyncConnection
pub trait HttpSender: Send + Sync + 'static {
    /// Sends the envelope.
    fn send(&self, envelope: &Envelope) -> impl Future<Output = TransportResult>;
}

impl<T: HttpSender> HttpSender for Arc<T> {
    async fn send(&self, envelope: &Envelope) -> TransportResult {
        (**self).send(envelope).await
    }
}
