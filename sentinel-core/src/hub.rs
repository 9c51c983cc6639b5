use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::protocol::{Event, Level, SessionStatus, Value};
use crate::scope::{Scope, ScopeGuard, Stack};
use crate::{sentinel_debug, Client, DeliveryHint, IntoBreadcrumbs, Uuid};

/// The central object that manages scopes and clients.
///
/// This can be used to capture events and manage the scope.  This object is
/// internally synchronized so it can be used from multiple threads if needed.
///
/// There is no process wide hub: [`sentinel::init`] hands one out as part of
/// its guard and tests build their own.  Cloning a hub creates an independent
/// scope stack that initially shares the client and scopes of the original.
///
/// [`sentinel::init`]: https://docs.rs/sentinel/*/sentinel/fn.init.html
pub struct Hub {
    stack: Arc<RwLock<Stack>>,
    last_event_id: RwLock<Option<Uuid>>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("depth", &self.with_stack(Stack::depth))
            .field("last_event_id", &self.last_event_id())
            .finish()
    }
}

impl Clone for Hub {
    fn clone(&self) -> Self {
        let stack = self.with_stack(Stack::clone);
        Hub {
            stack: Arc::new(RwLock::new(stack)),
            last_event_id: RwLock::new(self.last_event_id()),
        }
    }
}

impl Hub {
    fn with_stack<F: FnOnce(&Stack) -> R, R>(&self, f: F) -> R {
        let guard = self.stack.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn with_stack_mut<F: FnOnce(&mut Stack) -> R, R>(&self, f: F) -> R {
        let mut guard = self.stack.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn top(&self) -> (Option<Arc<Client>>, Arc<Scope>) {
        self.with_stack(|stack| {
            let top = stack.top();
            (top.client.clone(), top.scope.clone())
        })
    }

    /// Creates a new hub from the given client and scope.
    pub fn new(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Hub {
        Hub {
            stack: Arc::new(RwLock::new(Stack::from_client_and_scope(client, scope))),
            last_event_id: RwLock::new(None),
        }
    }

    /// Creates a new hub based on the top scope of the given hub.
    pub fn new_from_top<H: AsRef<Hub>>(other: H) -> Hub {
        let (client, scope) = other.as_ref().top();
        Hub::new(client, scope)
    }

    /// Returns the currently bound client.
    pub fn client(&self) -> Option<Arc<Client>> {
        self.with_stack(|stack| stack.top().client.clone())
    }

    /// Binds a new client to the hub.
    pub fn bind_client(&self, client: Option<Arc<Client>>) {
        self.with_stack_mut(|stack| {
            stack.top_mut().client = client;
        })
    }

    /// Returns the last event id.
    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends the event to the current client with the current scope.
    ///
    /// Returns the id of the event, or the nil id when no client is bound or
    /// the event was dropped while being processed.
    pub fn capture_event(&self, event: Event) -> Uuid {
        let (client, scope) = self.top();
        let Some(client) = client else {
            sentinel_debug!("[Hub] No client bound, dropping event");
            return Uuid::nil();
        };
        let event_id = client.capture_event(event, Some(&scope), DeliveryHint::default());
        if !event_id.is_nil() {
            *self
                .last_event_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(event_id);
        }
        event_id
    }

    /// Captures an arbitrary message.
    pub fn capture_message(&self, msg: &str, level: Level) -> Uuid {
        let event = Event {
            message: Some(msg.to_string()),
            level,
            ..Default::default()
        };
        self.capture_event(event)
    }

    /// Invokes a function that can modify the current scope.
    ///
    /// The top scope is copied first if another layer or hub still shares it.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Scope) -> R,
    {
        self.with_stack_mut(|stack| f(Arc::make_mut(&mut stack.top_mut().scope)))
    }

    /// Pushes a new scope.
    ///
    /// This returns a guard that when dropped will pop the scope again.
    pub fn push_scope(&self) -> ScopeGuard {
        self.with_stack_mut(|stack| {
            stack.push();
            ScopeGuard(Some((self.stack.clone(), stack.depth())))
        })
    }

    /// Pops the top scope.
    ///
    /// The root scope is never removed.  Returns `false` when only the root
    /// was left.
    pub fn pop_scope(&self) -> bool {
        self.with_stack_mut(Stack::pop)
    }

    /// Temporarily pushes a scope for a single call optionally reconfiguring it.
    ///
    /// The scope is popped again once `callback` returns or unwinds.
    pub fn with_scope<C, F, R>(&self, scope_config: C, callback: F) -> R
    where
        C: FnOnce(&mut Scope),
        F: FnOnce() -> R,
    {
        let _guard = self.push_scope();
        self.configure_scope(scope_config);
        callback()
    }

    /// Adds a new breadcrumb to the current scope.
    ///
    /// Breadcrumbs are only recorded, and closures passed here are only
    /// invoked, when a client is bound.
    pub fn add_breadcrumb<B: IntoBreadcrumbs>(&self, breadcrumbs: B) {
        let Some(client) = self.client() else {
            return;
        };
        let options = client.options();

        let mut accepted = Vec::new();
        for breadcrumb in breadcrumbs.into_breadcrumbs() {
            let breadcrumb = match &options.before_breadcrumb {
                Some(callback) => {
                    let original = breadcrumb.clone();
                    match panic::catch_unwind(AssertUnwindSafe(|| callback(breadcrumb))) {
                        Ok(rv) => rv,
                        Err(payload) => {
                            let message = panic_message(&*payload);
                            log::warn!(
                                target: "sentinel",
                                "[Hub] before_breadcrumb panicked: {}",
                                message
                            );
                            let mut original = original;
                            original
                                .data
                                .insert("sentinel:message".into(), Value::String(message));
                            Some(original)
                        }
                    }
                }
                None => Some(breadcrumb),
            };
            accepted.extend(breadcrumb);
        }
        if accepted.is_empty() {
            return;
        }

        let max = options.max_breadcrumbs;
        self.configure_scope(|scope| {
            for breadcrumb in accepted {
                scope.push_breadcrumb(breadcrumb, max);
            }
        });
    }

    /// Starts a new session for the bound client.
    ///
    /// The user of the current scope becomes the distinct id of the session.
    pub fn start_session(&self) {
        let (client, scope) = self.top();
        if let Some(client) = client {
            client.start_session(scope.user());
        }
    }

    /// Ends the current session as exited.
    pub fn end_session(&self) {
        self.end_session_with_status(SessionStatus::Exited)
    }

    /// Ends the current session with the given status.
    pub fn end_session_with_status(&self, status: SessionStatus) {
        if let Some(client) = self.client() {
            client.end_session(status);
        }
    }

    /// Drains the queue of the bound client.
    ///
    /// Returns `false` if no client is bound or the timeout elapsed first.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => false,
        }
    }
}

impl AsRef<Hub> for Hub {
    fn as_ref(&self) -> &Hub {
        self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "Box<Any>".to_string(),
        },
    }
}

