//! The offline cache.
//!
//! Every envelope handed to the transport is written here first and only
//! removed once the collector accepted it.  Events and session updates live
//! in separate directories with different overflow behaviour, next to the
//! `session.json` file tracking the current session.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::protocol::{Envelope, EnvelopeItem};
use crate::{sentinel_debug, ClientOptions, DeliveryHint, SessionPhase, Uuid};

mod disk;
mod session_store;

pub use self::disk::{CachePolicy, DiskCache};
pub use self::session_store::SessionStore;

/// File suffix of cached event envelopes.
pub const EVENT_SUFFIX: &str = ".sentry-event";
/// File suffix of cached session envelopes.
pub const ENVELOPE_SUFFIX: &str = ".envelope";
/// Subdirectory holding event envelopes.
pub const EVENTS_DIR: &str = "events";
/// Subdirectory holding session envelopes and the session file.
pub const SESSIONS_DIR: &str = "sessions";
/// Name of the file holding the current session.
pub const SESSION_FILE: &str = "session.json";

/// The pair of caches below a cache root.
#[derive(Debug, Clone)]
pub struct OfflineCache {
    events: DiskCache,
    sessions: DiskCache,
    session_store: SessionStore,
}

impl OfflineCache {
    /// Opens the caches below `root`, creating the directories.
    pub fn open(root: &Path, events_size: usize, sessions_size: usize) -> io::Result<Self> {
        let events_dir = root.join(EVENTS_DIR);
        let sessions_dir = root.join(SESSIONS_DIR);
        fs::create_dir_all(&events_dir)?;
        fs::create_dir_all(&sessions_dir)?;
        Ok(OfflineCache {
            events: DiskCache::new(
                events_dir,
                events_size,
                EVENT_SUFFIX,
                CachePolicy::RejectWhenFull,
            ),
            session_store: SessionStore::new(sessions_dir.join(SESSION_FILE)),
            sessions: DiskCache::new(
                sessions_dir,
                sessions_size,
                ENVELOPE_SUFFIX,
                CachePolicy::RotateOldest,
            ),
        })
    }

    /// Opens the caches configured by `options`.
    ///
    /// Returns `None` when no cache directory is configured.
    pub fn from_options(options: &ClientOptions) -> Option<io::Result<Self>> {
        let root = options.cache_dir_path.as_deref()?;
        Some(Self::open(
            root,
            options.cache_dir_size,
            options.sessions_dir_size,
        ))
    }

    /// The cache for envelopes containing an event.
    pub fn events(&self) -> &DiskCache {
        &self.events
    }

    /// The cache for all other envelopes.
    pub fn sessions(&self) -> &DiskCache {
        &self.sessions
    }

    /// The store of the current session.
    pub fn session_store(&self) -> &SessionStore {
        &self.session_store
    }

    fn cache_for(&self, envelope: &Envelope) -> &DiskCache {
        if envelope.event().is_some() {
            &self.events
        } else {
            &self.sessions
        }
    }

    /// Stores the envelope in the matching cache.
    pub fn store(&self, envelope: &Envelope) -> Option<PathBuf> {
        self.cache_for(envelope).store(envelope)
    }

    /// Stores the envelope, taking the session phase of its hint into
    /// account.
    ///
    /// The final update of a session supersedes the updates of that session
    /// still waiting in the session cache.  Those files are deleted, and when
    /// one of them carried the initial update the `init` flag moves over to
    /// the final one.
    pub fn store_with_hint(&self, envelope: &Envelope, hint: &DeliveryHint) -> Option<PathBuf> {
        if hint.session != Some(SessionPhase::End) || envelope.event().is_some() {
            return self.store(envelope);
        }

        let ended: Vec<Uuid> = envelope.session_updates().map(|s| s.session_id).collect();
        let mut carries_init = false;
        for (path, cached) in self.sessions.load_all() {
            let superseded = !cached.is_empty()
                && cached.items().all(|item| match item {
                    EnvelopeItem::SessionUpdate(update) => ended.contains(&update.session_id),
                    _ => false,
                });
            if superseded {
                carries_init |= cached.session_updates().any(|update| update.init);
                sentinel_debug!("[Cache] {} is superseded by a final update", path.display());
                self.sessions.discard_path(&path);
            }
        }

        if !carries_init {
            return self.sessions.store(envelope);
        }
        let mut envelope = envelope.clone();
        for item in envelope.items_mut() {
            if let EnvelopeItem::SessionUpdate(update) = item {
                update.init = true;
            }
        }
        self.sessions.store(&envelope)
    }

    /// Deletes a cache file.
    pub fn discard_path(&self, path: &Path) {
        disk::remove_file(path);
    }

    /// Every cached envelope, events first.
    pub fn load_all(&self) -> Vec<(PathBuf, Envelope)> {
        let mut all = self.events.load_all();
        all.extend(self.sessions.load_all());
        all
    }
}
