use std::fmt;
use std::panic::RefUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use rand::random;

use crate::cache::OfflineCache;
use crate::constants::sdk_info;
use crate::protocol::{ClientSdkInfo, Event, SessionStatus, User};
use crate::session::SessionTracker;
use crate::types::{random_uuid, Dsn, Uuid};
use crate::{
    sentinel_debug, ClientOptions, DeliveryHint, DeliveryOutcome, Envelope, Scope, SessionPhase,
    Transport,
};

impl<T: Into<ClientOptions>> From<T> for Client {
    fn from(o: T) -> Client {
        Client::with_options(o.into())
    }
}

pub(crate) type TransportArc = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// The sentinel client.
///
/// The client turns raw events into fully populated ones and hands them to
/// the configured [`Transport`].  It can be created from a
/// [`ClientOptions`].
///
/// # Examples
///
/// ```
/// sentinel_core::Client::from(sentinel_core::ClientOptions::default());
/// ```
pub struct Client {
    options: ClientOptions,
    transport: TransportArc,
    session: Mutex<SessionTracker>,
    sdk_info: ClientSdkInfo,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn())
            .field("options", &self.options)
            .finish()
    }
}

impl Client {
    /// Creates a new client for the given options.
    ///
    /// If the DSN on the options is set to `None`, or no transport factory
    /// is configured, the client will be entirely disabled.
    pub fn with_options(options: ClientOptions) -> Client {
        let create_transport = || {
            options.dsn.as_ref()?;
            let factory = options.transport.as_ref()?;
            Some(factory.create_transport(&options))
        };

        let transport = Arc::new(RwLock::new(create_transport()));
        if transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            sentinel_debug!("[Client] No transport available (client will be disabled)");
        }

        let store = match OfflineCache::from_options(&options) {
            Some(Ok(cache)) => Some(cache.session_store().clone()),
            Some(Err(err)) => {
                log::error!(
                    target: "sentinel",
                    "[Client] Offline cache unavailable, sessions are not persisted: {}",
                    err
                );
                None
            }
            None => None,
        };
        let session = Mutex::new(SessionTracker::new(&options, store));

        Client {
            options,
            transport,
            session,
            sdk_info: sdk_info(),
        }
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, SessionTracker> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepares an event for transmission.
    ///
    /// Returns `None` if a processor, `before_send` or sampling dropped the
    /// event.
    pub fn prepare_event(&self, mut event: Event, scope: Option<&Scope>) -> Option<Event> {
        // the id is assigned before the processors run so that they can log it
        if event.event_id.is_nil() {
            event.event_id = random_uuid();
        }
        if event.timestamp == SystemTime::UNIX_EPOCH {
            event.timestamp = SystemTime::now();
        }

        if let Some(scope) = scope {
            event = scope.apply_to_event(event);
        }

        if event.release.is_none() {
            event.release = self.options.release.as_ref().map(|r| r.to_string());
        }
        if event.environment.is_none() {
            event.environment = self.options.environment.as_ref().map(|e| e.to_string());
        }
        if event.server_name.is_none() {
            event.server_name = self.options.server_name.as_ref().map(|s| s.to_string());
        }
        if event.sdk.is_none() {
            event.sdk = Some(self.sdk_info.clone());
        }

        for (i, processor) in self.options.event_processors.iter().enumerate() {
            let id = event.event_id;
            event = match processor(event) {
                Some(event) => event,
                None => {
                    sentinel_debug!("[Client] Event processor {} dropped event {}", i + 1, id);
                    return None;
                }
            }
        }
        if let Some(scope) = scope {
            event = scope.process_event(event)?;
        }

        if let Some(ref func) = self.options.before_send {
            let id = event.event_id;
            match func(event) {
                Some(processed) => event = processed,
                None => {
                    sentinel_debug!("[Client] before_send dropped event {}", id);
                    return None;
                }
            }
        }

        if !self.sample_should_send() {
            sentinel_debug!(
                "[Client] Event {} dropped due to sampling (rate: {})",
                event.event_id,
                self.options.sample_rate
            );
            return None;
        }
        Some(event)
    }

    fn sample_should_send(&self) -> bool {
        let rate = self.options.sample_rate;
        rate >= 1.0 || random::<f32>() < rate
    }

    /// Returns the options of this client.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the DSN that constructed this client.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.options.dsn.as_ref()
    }

    /// Quick check to see if the client is enabled.
    ///
    /// The client is enabled if it has a valid DSN and Transport configured,
    /// and has not been closed.
    ///
    /// # Examples
    ///
    /// ```
    /// let client = sentinel_core::Client::from(sentinel_core::ClientOptions::default());
    /// assert!(!client.is_enabled());
    /// ```
    pub fn is_enabled(&self) -> bool {
        self.options.dsn.is_some() && self.transport().is_some()
    }

    /// Captures an event.
    ///
    /// Returns the id of the event once it was handed to the transport, or
    /// the nil id if it was dropped.  Delivery itself happens in the
    /// background and is reported through `hint`.
    pub fn capture_event(
        &self,
        event: Event,
        scope: Option<&Scope>,
        mut hint: DeliveryHint,
    ) -> Uuid {
        let Some(transport) = self.transport() else {
            sentinel_debug!("[Client] No transport available, cannot capture event");
            hint.resolve(DeliveryOutcome::Dropped);
            return Uuid::nil();
        };
        let Some(event) = self.prepare_event(event, scope) else {
            hint.resolve(DeliveryOutcome::Dropped);
            return Uuid::nil();
        };

        let event_id = event.event_id;
        let session_update = if event.level.is_error_or_worse() || !event.exception.is_empty() {
            self.sessions().update(event.is_unhandled())
        } else {
            None
        };

        let mut envelope = Envelope::from(event);
        if let Some(update) = session_update {
            envelope.add_item(update);
            hint.session.get_or_insert(SessionPhase::Update);
        }
        if let Some(scope) = scope {
            for attachment in scope.attachments.iter().cloned() {
                envelope.add_item(attachment);
            }
        }

        sentinel_debug!("[Client] Sending envelope for event {}", event_id);
        transport.send_envelope(envelope, hint);
        event_id
    }

    /// Sends the specified [`Envelope`].
    pub fn send_envelope(&self, envelope: Envelope, mut hint: DeliveryHint) {
        match self.transport() {
            Some(transport) => transport.send_envelope(envelope, hint),
            None => {
                sentinel_debug!("[Client] No transport available, cannot send envelope");
                hint.resolve(DeliveryOutcome::Dropped);
            }
        }
    }

    /// Starts a new session, ending the current one first.
    ///
    /// A session left behind by a previous process is reported as abnormal
    /// before the new one starts.
    pub fn start_session(&self, user: Option<&User>) {
        if !self.is_enabled() {
            return;
        }
        let updates = self.sessions().start(user);
        for (update, phase) in updates {
            self.send_envelope(update.into(), DeliveryHint::new().session(phase));
        }
    }

    /// Ends the current session with the given status.
    pub fn end_session(&self, status: SessionStatus) {
        if !self.is_enabled() {
            return;
        }
        let update = self.sessions().end(status);
        if let Some(update) = update {
            self.send_envelope(update.into(), DeliveryHint::new().session(SessionPhase::End));
        }
    }

    /// Marks the current session as crashed.
    ///
    /// Returns true if there was a running session.
    pub fn crash_session(&self) -> bool {
        let update = self.sessions().update(true);
        match update {
            Some(update) => {
                let hint = DeliveryHint::new().session(SessionPhase::Update);
                self.send_envelope(update.into(), hint);
                true
            }
            None => false,
        }
    }

    /// Drains all pending events without shutting down.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.options.shutdown_timeout);
        match self.transport() {
            Some(transport) => transport.flush(timeout),
            None => true,
        }
    }

    /// Drains all pending events and shuts down the transport behind the
    /// client.  After shutting down the transport is removed.
    ///
    /// The current session is ended as exited first.  Returns `true` if all
    /// pending work was handled within the timeout.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        self.end_session(SessionStatus::Exited);
        let transport = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match transport {
            Some(transport) => {
                sentinel_debug!("[Client] Shutting down transport");
                transport.shutdown(timeout.unwrap_or(self.options.shutdown_timeout))
            }
            None => true,
        }
    }
}

// Make this unwind safe.  It's not out of the box because of the
// `BeforeCallback`s inside `ClientOptions` and the boxed transport.
impl RefUnwindSafe for Client {}
