use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sentinel_core::cache::OfflineCache;
use sentinel_core::sentinel_debug;
use thiserror::Error;

use crate::defaults::apply_defaults;
use crate::types::ParseDsnError;
use crate::{
    Client, DeliveryHint, DeliveryOutcome, Envelope, Hub, IntoClientConfig, Scope, SessionStatus,
};

/// The configuration problems [`init`] reports.
#[derive(Debug, Error)]
pub enum InitError {
    /// The DSN could not be parsed.
    #[error("invalid DSN")]
    InvalidDsn(#[from] ParseDsnError),
    /// The offline cache directory cannot be created or used.
    #[error("unusable cache directory {}", .path.display())]
    CacheDir {
        /// The configured cache directory.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Lifecycle states of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// The application came to the foreground; a new session starts.
    Foreground,
    /// The application went to the background; the session ends.
    Background,
    /// The application is about to exit; the session ends and pending
    /// envelopes are flushed.
    Terminating,
}

/// Helper struct that is returned from `init`.
///
/// It owns the [`Hub`] events are captured through.  When this is dropped
/// the current session is ended and events are drained with the client's
/// `shutdown_timeout`.
#[must_use = "when the init guard is dropped the transport will be shut down and no further \
              events can be sent.  If you do want to ignore this use mem::forget on it."]
pub struct ClientInitGuard {
    hub: Arc<Hub>,
    client: Arc<Client>,
}

impl ClientInitGuard {
    /// The hub bound to the initialized client.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The initialized client.
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Quick check if the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    /// Waits for pending deliveries without shutting down.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        self.client.flush(timeout)
    }

    /// Reports a lifecycle change of the host application.
    pub fn notify(&self, state: AppState) {
        sentinel_debug!("[Init] Application state changed to {:?}", state);
        match state {
            AppState::Foreground => self.hub.start_session(),
            AppState::Background => self.hub.end_session_with_status(SessionStatus::Exited),
            AppState::Terminating => {
                self.hub.end_session_with_status(SessionStatus::Exited);
                self.client.flush(None);
            }
        }
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        if self.is_enabled() {
            sentinel_debug!("dropping client guard -> disposing client");
        } else {
            sentinel_debug!("dropping client guard (no client to dispose)");
        }
        self.client.close(None);
    }
}

/// Creates the sentinel client for a given client config and returns the
/// guard owning the hub bound to it.
///
/// The config is anything [`IntoClientConfig`] accepts: a DSN string, a
/// [`ClientOptions`](crate::ClientOptions), or a tuple of both.  Missing
/// options are filled in by [`apply_defaults`].
///
/// Envelopes left in the offline cache by an earlier run are resubmitted in
/// the background.  With `auto_session_tracking` a session is started right
/// away, which also reports a session the previous run left open as
/// abnormal.
///
/// # Examples
///
/// ```
/// let guard = sentinel::init("https://key@sentinel.invalid/1234").unwrap();
/// guard.hub().capture_message("Hello World!", sentinel::Level::Info);
/// ```
///
/// A DSN that does not parse is an error:
///
/// ```
/// assert!(sentinel::init("not a dsn").is_err());
/// ```
///
/// Without a DSN the guard is returned with a disabled client:
///
/// ```
/// let guard = sentinel::init(sentinel::ClientOptions::default()).unwrap();
/// # if std::env::var("SENTINEL_DSN").is_err() {
/// assert!(!guard.is_enabled());
/// # }
/// ```
pub fn init<C: IntoClientConfig>(cfg: C) -> Result<ClientInitGuard, InitError> {
    let options = apply_defaults(cfg.into_client_config()?);

    let cache = match OfflineCache::from_options(&options) {
        Some(Ok(cache)) => Some(cache),
        Some(Err(source)) => {
            return Err(InitError::CacheDir {
                path: options.cache_dir_path.clone().unwrap_or_default(),
                source,
            })
        }
        None => None,
    };

    let client = Arc::new(Client::with_options(options));
    let hub = Arc::new(Hub::new(Some(client.clone()), Arc::new(Scope::default())));
    if let Some(dsn) = client.dsn() {
        sentinel_debug!("enabled sentinel client for DSN {}", dsn);
    } else {
        sentinel_debug!("initialized disabled sentinel client due to disabled or invalid DSN");
    }

    if client.is_enabled() {
        // replay before a new session is started so that its envelopes are
        // not picked up from the cache a second time
        if let Some(cache) = cache {
            let backlog = cache.load_all();
            if !backlog.is_empty() {
                spawn_replay(client.clone(), cache, backlog);
            }
        }
        if client.options().auto_session_tracking {
            hub.start_session();
        }
    }

    Ok(ClientInitGuard { hub, client })
}

fn spawn_replay(client: Arc<Client>, cache: OfflineCache, backlog: Vec<(PathBuf, Envelope)>) {
    sentinel_debug!("[Init] Replaying {} cached envelopes", backlog.len());
    let spawned = thread::Builder::new()
        .name("sentinel-replay".into())
        .spawn(move || replay(&client, &cache, backlog));
    if let Err(err) = spawned {
        log::error!(target: "sentinel", "[Init] Failed to spawn replay thread: {}", err);
    }
}

/// Resubmits cached envelopes one at a time.
///
/// Each delivery is awaited for at most `flush_timeout`.  Files stay on disk
/// unless the delivery was sent, which removes them in the transport, or
/// given up on by a client that is still running.
fn replay(client: &Client, cache: &OfflineCache, backlog: Vec<(PathBuf, Envelope)>) {
    let timeout = client.options().flush_timeout;
    for (path, envelope) in backlog {
        if !client.is_enabled() {
            sentinel_debug!("[Init] Client closed, stopping replay");
            return;
        }
        let (hint, receipt) = DeliveryHint::new().cached(&path).with_completion();
        client.send_envelope(envelope, hint);
        match receipt.wait(timeout) {
            Some(DeliveryOutcome::Sent) => {}
            Some(DeliveryOutcome::Retry) => {
                sentinel_debug!("[Init] Keeping {} for a later retry", path.display());
            }
            Some(DeliveryOutcome::Dropped) if client.is_enabled() => {
                sentinel_debug!("[Init] Dropping cached envelope {}", path.display());
                cache.discard_path(&path);
            }
            Some(DeliveryOutcome::Dropped) => {}
            None => {
                sentinel_debug!("[Init] Timed out replaying {}", path.display());
            }
        }
    }
}
