//! Session tracking.
//!
//! A client has at most one current session.  It is mirrored to
//! `sessions/session.json` on every change so that a session which is still
//! open when the process dies can be reported as abnormal on the next start.

use std::time::SystemTime;

use crate::cache::SessionStore;
use crate::hint::SessionPhase;
use crate::protocol::{SessionAttributes, SessionStatus, SessionUpdate, User};
use crate::types::random_uuid;
use crate::{sentinel_debug, ClientOptions};

#[derive(Debug)]
pub(crate) struct SessionTracker {
    attributes: Option<SessionAttributes>,
    store: Option<SessionStore>,
    current: Option<SessionUpdate>,
}

fn distinct_id(user: Option<&User>) -> Option<String> {
    user.and_then(|user| {
        user.id
            .as_ref()
            .or(user.email.as_ref())
            .or(user.username.as_ref())
    })
    .cloned()
}

impl SessionTracker {
    pub fn new(options: &ClientOptions, store: Option<SessionStore>) -> Self {
        let attributes = options.release.as_ref().map(|release| SessionAttributes {
            release: release.to_string(),
            environment: options.environment.as_ref().map(|env| env.to_string()),
            ip_address: None,
            user_agent: None,
        });
        SessionTracker {
            attributes,
            store,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&SessionUpdate> {
        self.current.as_ref()
    }

    fn save(&self) {
        if let (Some(store), Some(session)) = (&self.store, &self.current) {
            store.save(session);
        }
    }

    /// Starts a new session.
    ///
    /// Returns the updates to deliver, in order: the end of a session that
    /// was still running, the abnormal end of a session left over by a
    /// previous process, and the initial update of the new session.
    pub fn start(&mut self, user: Option<&User>) -> Vec<(SessionUpdate, SessionPhase)> {
        let mut updates = Vec::new();
        if let Some(ended) = self.end(SessionStatus::Exited) {
            updates.push((ended, SessionPhase::End));
        }

        if let Some(store) = &self.store {
            if let Some(mut leftover) = store.load() {
                if leftover.is_ok() {
                    sentinel_debug!(
                        "[Session] Closing dangling session {} as abnormal",
                        leftover.session_id
                    );
                    leftover.close(SessionStatus::Abnormal, SystemTime::now());
                }
                updates.push((leftover, SessionPhase::End));
                store.remove();
            }
        }

        let Some(attributes) = self.attributes.clone() else {
            sentinel_debug!("[Session] No release configured, not starting a session");
            return updates;
        };

        let now = SystemTime::now();
        let mut session = SessionUpdate {
            session_id: random_uuid(),
            distinct_id: distinct_id(user),
            sequence: None,
            timestamp: Some(now),
            started: now,
            init: true,
            duration: None,
            status: SessionStatus::Ok,
            errors: 0,
            attributes,
        };
        updates.push((session.clone(), SessionPhase::Start));
        session.init = false;
        self.current = Some(session);
        self.save();
        updates
    }

    /// Records an error in the current session.
    ///
    /// Returns the update to deliver, or `None` when there is no running
    /// session.
    pub fn update(&mut self, crashed: bool) -> Option<SessionUpdate> {
        let session = self.current.as_mut().filter(|session| session.is_ok())?;
        session.errors += 1;
        session.timestamp = Some(SystemTime::now());
        if crashed {
            session.status = SessionStatus::Crashed;
        }
        let update = session.clone();
        self.save();
        Some(update)
    }

    /// Ends the current session.
    ///
    /// A session that already crashed has been reported and yields nothing.
    pub fn end(&mut self, status: SessionStatus) -> Option<SessionUpdate> {
        let mut session = self.current.take()?;
        if let Some(store) = &self.store {
            store.remove();
        }
        if !session.is_ok() {
            return None;
        }
        let status = match status {
            SessionStatus::Ok => SessionStatus::Exited,
            status => status,
        };
        session.close(status, SystemTime::now());
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            release: Some("app@1.0.0".into()),
            ..Default::default()
        }
    }

    fn tracker(dir: &std::path::Path) -> SessionTracker {
        SessionTracker::new(&options(), Some(SessionStore::new(dir.join("session.json"))))
    }

    #[test]
    fn test_no_release_no_session() {
        let mut tracker = SessionTracker::new(&ClientOptions::default(), None);
        assert!(tracker.start(None).is_empty());
        assert!(tracker.update(false).is_none());
        assert!(tracker.end(SessionStatus::Exited).is_none());
    }

    #[test]
    fn test_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker(dir.path());
        let user = User {
            email: Some("user@example.com".into()),
            ..Default::default()
        };

        let started = tracker.start(Some(&user));
        assert_eq!(started.len(), 1);
        let (initial, phase) = &started[0];
        assert_eq!(*phase, SessionPhase::Start);
        assert!(initial.init);
        assert_eq!(initial.distinct_id.as_deref(), Some("user@example.com"));
        assert!(dir.path().join("session.json").exists());

        let update = tracker.update(false).unwrap();
        assert_eq!(update.errors, 1);
        assert!(!update.init);

        let ended = tracker.end(SessionStatus::Exited).unwrap();
        assert_eq!(ended.status, SessionStatus::Exited);
        assert!(ended.duration.is_some());
        assert!(!dir.path().join("session.json").exists());
    }

    #[test]
    fn test_crash_ends_updates() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker(dir.path());
        tracker.start(None);

        let crashed = tracker.update(true).unwrap();
        assert_eq!(crashed.status, SessionStatus::Crashed);
        assert!(tracker.update(false).is_none());
        assert!(tracker.end(SessionStatus::Exited).is_none());
    }

    #[test]
    fn test_dangling_session_is_abnormal() {
        let dir = tempfile::tempdir().unwrap();
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        let leftover = {
            let mut previous = tracker(dir.path());
            previous.start(None);
            let mut session = previous.current().unwrap().clone();
            session.started = an_hour_ago;
            session.timestamp = Some(an_hour_ago);
            SessionStore::new(dir.path().join("session.json")).save(&session);
            session.session_id
        };

        let before = SystemTime::now();
        let mut tracker = tracker(dir.path());
        let updates = tracker.start(None);
        assert_eq!(updates.len(), 2);
        let ended = &updates[0].0;
        assert_eq!(ended.session_id, leftover);
        assert_eq!(ended.status, SessionStatus::Abnormal);
        assert!(ended.timestamp.unwrap() >= before);
        assert!(ended.duration.unwrap() >= 3599.0);
        assert_eq!(updates[0].1, SessionPhase::End);
        assert_eq!(updates[1].1, SessionPhase::Start);
        assert_ne!(updates[1].0.session_id, leftover);
    }
}
