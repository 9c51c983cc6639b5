use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::USER_AGENT;
use crate::protocol::{Breadcrumb, Event};
use crate::scope::EventProcessor;
use crate::types::Dsn;
use crate::TransportFactory;

/// Type alias for before event/breadcrumb handlers.
pub type BeforeCallback<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// Configuration settings for the client.
///
/// # Examples
///
/// ```
/// let _options = sentinel_core::ClientOptions {
///     max_breadcrumbs: 50,
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    // Common options
    /// The DSN to use.  If not set the client is effectively disabled.
    pub dsn: Option<Dsn>,
    /// The release to be sent with events.
    ///
    /// Sessions are only tracked when a release is set.
    pub release: Option<Cow<'static, str>>,
    /// The environment to be sent with events.
    pub environment: Option<Cow<'static, str>>,
    /// The server name to be reported.
    pub server_name: Option<Cow<'static, str>>,
    /// The sample rate for event submission. (0.0 - 1.0, defaults to 1.0)
    pub sample_rate: f32,
    /// Maximum number of breadcrumbs. (defaults to 100)
    pub max_breadcrumbs: usize,
    // Hooks
    /// Callback that is executed before event sending.
    pub before_send: Option<BeforeCallback<Event>>,
    /// Callback that is executed for each Breadcrumb being added.
    pub before_breadcrumb: Option<BeforeCallback<Breadcrumb>>,
    /// Event processors that run for every event before the scope's own.
    pub event_processors: Vec<EventProcessor>,
    // Transport options
    /// The transport to use.
    ///
    /// This is typically either a boxed function taking the client options by
    /// reference and returning a `Transport`, or an `Arc<Transport>`.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// An optional HTTP proxy to use.
    ///
    /// This will default to the `HTTP_PROXY` environment variable.
    pub http_proxy: Option<Cow<'static, str>>,
    /// An optional HTTPS proxy to use.
    ///
    /// This will default to the `HTTPS_PROXY` environment variable
    /// or `http_proxy` if that one exists.
    pub https_proxy: Option<Cow<'static, str>>,
    /// The timeout on client drop for draining events on shutdown.
    pub shutdown_timeout: Duration,
    /// How long startup replay of cached envelopes may wait for each delivery.
    pub flush_timeout: Duration,
    /// Timeout for establishing a connection to the collector.
    pub connect_timeout: Duration,
    /// Timeout for reading the collector's response.
    pub read_timeout: Duration,
    // Offline cache
    /// Directory holding the `events/` and `sessions/` caches.
    ///
    /// Without one nothing is persisted and failed deliveries are lost.
    pub cache_dir_path: Option<PathBuf>,
    /// Maximum number of cached event envelopes. (defaults to 10)
    pub cache_dir_size: usize,
    /// Maximum number of cached session envelopes. (defaults to 100)
    pub sessions_dir_size: usize,
    /// Maximum number of queued and running deliveries.
    pub max_queue_size: usize,
    /// Number of delivery worker threads. (defaults to 1)
    pub transport_workers: usize,
    // Other options
    /// Start a session when the client is initialized.
    pub auto_session_tracking: bool,
    /// The user agent that should be reported.
    pub user_agent: Cow<'static, str>,
}

impl ClientOptions {
    /// Creates new Options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global event processor.
    #[must_use]
    pub fn add_event_processor<F>(mut self, f: F) -> Self
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        self.event_processors.push(Arc::new(f));
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct BeforeSend;
        let before_send = self.before_send.as_ref().map(|_| BeforeSend);
        #[derive(Debug)]
        struct BeforeBreadcrumb;
        let before_breadcrumb = self.before_breadcrumb.as_ref().map(|_| BeforeBreadcrumb);
        #[derive(Debug)]
        struct TransportFactory;

        f.debug_struct("ClientOptions")
            .field("dsn", &self.dsn)
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("server_name", &self.server_name)
            .field("sample_rate", &self.sample_rate)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("before_send", &before_send)
            .field("before_breadcrumb", &before_breadcrumb)
            .field("event_processors", &self.event_processors.len())
            .field("transport", &TransportFactory)
            .field("http_proxy", &self.http_proxy)
            .field("https_proxy", &self.https_proxy)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("flush_timeout", &self.flush_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("cache_dir_path", &self.cache_dir_path)
            .field("cache_dir_size", &self.cache_dir_size)
            .field("sessions_dir_size", &self.sessions_dir_size)
            .field("max_queue_size", &self.max_queue_size)
            .field("transport_workers", &self.transport_workers)
            .field("auto_session_tracking", &self.auto_session_tracking)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        let cache_dir_size = 10;
        let sessions_dir_size = 100;
        ClientOptions {
            dsn: None,
            release: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            max_breadcrumbs: 100,
            before_send: None,
            before_breadcrumb: None,
            event_processors: Vec::new(),
            transport: None,
            http_proxy: None,
            https_proxy: None,
            shutdown_timeout: Duration::from_secs(2),
            flush_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            cache_dir_path: None,
            cache_dir_size,
            sessions_dir_size,
            max_queue_size: cache_dir_size + sessions_dir_size,
            transport_workers: 1,
            auto_session_tracking: false,
            user_agent: Cow::Borrowed(USER_AGENT),
        }
    }
}
