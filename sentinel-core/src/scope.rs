use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::{Attachment, Breadcrumb, Event, Level, Map, User, Value};
use crate::{sentinel_debug, Client};

/// A function that can inspect, modify or drop an event.
pub type EventProcessor = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

#[derive(Debug, Clone)]
pub(crate) struct Stack {
    top: StackLayer,
    layers: Vec<StackLayer>,
}

/// Holds contextual data for the current scope.
///
/// The scope is an object that can be cloned efficiently and stores data that
/// is locally relevant to an event.  For instance the scope will hold recorded
/// breadcrumbs and similar information.
///
/// All collections are shared between clones and copied when written to, so
/// mutating a pushed scope never leaks into its parent.
#[derive(Clone, Default)]
pub struct Scope {
    pub(crate) level: Option<Level>,
    pub(crate) fingerprint: Option<Arc<[String]>>,
    pub(crate) transaction: Option<Arc<str>>,
    pub(crate) breadcrumbs: Arc<VecDeque<Breadcrumb>>,
    pub(crate) user: Option<Arc<User>>,
    pub(crate) extra: Arc<Map<String, Value>>,
    pub(crate) tags: Arc<Map<String, String>>,
    pub(crate) contexts: Arc<Map<String, Value>>,
    pub(crate) event_processors: Arc<Vec<EventProcessor>>,
    pub(crate) attachments: Arc<Vec<Attachment>>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint)
            .field("transaction", &self.transaction)
            .field("breadcrumbs", &self.breadcrumbs)
            .field("user", &self.user)
            .field("extra", &self.extra)
            .field("tags", &self.tags)
            .field("contexts", &self.contexts)
            .field("event_processors", &self.event_processors.len())
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StackLayer {
    pub client: Option<Arc<Client>>,
    pub scope: Arc<Scope>,
}

impl Stack {
    pub fn from_client_and_scope(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Stack {
        Stack {
            top: StackLayer { client, scope },
            layers: vec![],
        }
    }

    pub fn push(&mut self) {
        let layer = self.top.clone();
        self.layers.push(layer);
    }

    /// Pops the top layer.  The root layer is never removed.
    pub fn pop(&mut self) -> bool {
        match self.layers.pop() {
            Some(layer) => {
                self.top = layer;
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    pub fn top(&self) -> &StackLayer {
        &self.top
    }

    #[inline(always)]
    pub fn top_mut(&mut self) -> &mut StackLayer {
        &mut self.top
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// A scope guard.
///
/// This is returned from [`Hub::push_scope`] and will automatically pop the
/// scope on drop.
///
/// [`Hub::push_scope`]: crate::Hub::push_scope
#[derive(Default)]
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard(pub(crate) Option<(Arc<RwLock<Stack>>, usize)>);

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeGuard")
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some((stack, depth)) = self.0.take() {
            let popped_depth = {
                let mut stack = stack.write().unwrap_or_else(PoisonError::into_inner);
                let popped_depth = stack.depth();
                // an inner guard that was leaked or dropped late leaves layers
                // above ours, those go together with our own layer
                while stack.depth() >= depth && stack.pop() {}
                popped_depth
            };
            // the lock must be released before logging, a log backend may
            // capture events through the same hub
            if popped_depth != depth {
                log::warn!(
                    target: "sentinel",
                    "[Scope] Popped scope guard out of order (expected depth {}, found {})",
                    depth,
                    popped_depth
                );
            }
        }
    }
}

impl Scope {
    /// Clear the scope.
    ///
    /// By default a scope will inherit all values from the higher scope.
    /// In some situations this might not be what a user wants.  Calling
    /// this method will wipe all data contained within.
    pub fn clear(&mut self) {
        sentinel_debug!("[Scope] Clearing all scope data");
        *self = Default::default();
    }

    /// Deletes current breadcrumbs from the scope.
    pub fn clear_breadcrumbs(&mut self) {
        let previous_count = self.breadcrumbs.len();
        self.breadcrumbs = Default::default();
        sentinel_debug!("[Scope] Cleared {} breadcrumbs", previous_count);
    }

    /// Sets a level override.
    pub fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
    }

    /// Sets the fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Option<&[&str]>) {
        self.fingerprint = fingerprint.map(|fp| fp.iter().map(|s| (*s).to_owned()).collect())
    }

    /// Sets the transaction.
    pub fn set_transaction(&mut self, transaction: Option<&str>) {
        self.transaction = transaction.map(Arc::from);
    }

    /// Sets the user for the current scope.
    pub fn set_user(&mut self, user: Option<User>) {
        match (&self.user, &user) {
            (None, Some(new_user)) => {
                sentinel_debug!("[Scope] Setting user: id={:?}", new_user.id)
            }
            (Some(_), None) => sentinel_debug!("[Scope] Removing user"),
            _ => {}
        }
        self.user = user.map(Arc::new);
    }

    /// Retrieves the user of the current scope.
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Sets a tag to a specific value.
    pub fn set_tag<V: ToString>(&mut self, key: &str, value: V) {
        Arc::make_mut(&mut self.tags).insert(key.to_string(), value.to_string());
    }

    /// Removes a tag.
    ///
    /// If the tag is not set, does nothing.
    pub fn remove_tag(&mut self, key: &str) {
        Arc::make_mut(&mut self.tags).remove(key);
    }

    /// Sets a context for a key.
    pub fn set_context<V: Into<Value>>(&mut self, key: &str, value: V) {
        Arc::make_mut(&mut self.contexts).insert(key.to_string(), value.into());
    }

    /// Removes a context for a key.
    pub fn remove_context(&mut self, key: &str) {
        Arc::make_mut(&mut self.contexts).remove(key);
    }

    /// Sets a extra to a specific value.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        Arc::make_mut(&mut self.extra).insert(key.to_string(), value);
    }

    /// Removes a extra.
    pub fn remove_extra(&mut self, key: &str) {
        Arc::make_mut(&mut self.extra).remove(key);
    }

    /// Add an event processor to the scope.
    ///
    /// Processors run in registration order after the client's own
    /// processors.  Returning `None` drops the event.
    pub fn add_event_processor<F>(&mut self, f: F)
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.event_processors).push(Arc::new(f));
        sentinel_debug!(
            "[Scope] Added event processor (total: {})",
            self.event_processors.len()
        );
    }

    /// Adds an attachment to the scope.
    ///
    /// Attachments travel in the same envelope as every event captured
    /// while the scope is active.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        Arc::make_mut(&mut self.attachments).push(attachment);
    }

    /// Clears attachments from the scope.
    pub fn clear_attachments(&mut self) {
        Arc::make_mut(&mut self.attachments).clear();
    }

    /// Returns the breadcrumbs currently recorded, oldest first.
    pub fn breadcrumbs(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.breadcrumbs.iter()
    }

    /// Appends a breadcrumb, dropping the oldest ones beyond `max`.
    pub(crate) fn push_breadcrumb(&mut self, breadcrumb: Breadcrumb, max: usize) {
        let breadcrumbs = Arc::make_mut(&mut self.breadcrumbs);
        breadcrumbs.push_back(breadcrumb);
        while breadcrumbs.len() > max {
            breadcrumbs.pop_front();
        }
    }

    /// Applies the contained scoped data to fill an event.
    ///
    /// Values the event already carries are left alone, with the exception
    /// of the level which the scope overrides when set.
    pub fn apply_to_event(&self, mut event: Event) -> Event {
        if let Some(level) = self.level {
            event.level = level;
        }

        if event.user.is_none() {
            if let Some(user) = self.user.as_deref() {
                event.user = Some(user.clone());
            }
        }

        if !self.breadcrumbs.is_empty() {
            let own = std::mem::take(&mut event.breadcrumbs);
            event.breadcrumbs = self.breadcrumbs.iter().cloned().chain(own).collect();
        }

        for (key, value) in self.extra.iter() {
            event
                .extra
                .entry(key.to_owned())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in self.tags.iter() {
            event
                .tags
                .entry(key.to_owned())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in self.contexts.iter() {
            event
                .contexts
                .entry(key.to_owned())
                .or_insert_with(|| value.clone());
        }

        if event.transaction.is_none() {
            if let Some(txn) = self.transaction.as_deref() {
                event.transaction = Some(txn.to_owned());
            }
        }

        if event.has_default_fingerprint() {
            if let Some(fp) = self.fingerprint.as_deref() {
                event.fingerprint = fp.to_vec();
            }
        }

        event
    }

    /// Runs the scope's event processors over the event.
    pub fn process_event(&self, mut event: Event) -> Option<Event> {
        for (i, processor) in self.event_processors.iter().enumerate() {
            let id = event.event_id;
            event = match processor(event) {
                Some(event) => event,
                None => {
                    sentinel_debug!("[Scope] Event processor {} dropped event {}", i + 1, id);
                    return None;
                }
            }
        }
        Some(event)
    }
}
