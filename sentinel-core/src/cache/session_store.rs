use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::protocol::SessionUpdate;

/// The well-known file holding the current session.
///
/// A session that is still found here on the next start was never ended
/// and is reported as abnormal.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store for the given file.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        SessionStore { path: path.into() }
    }

    /// The path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored session.
    ///
    /// An unreadable file is deleted and treated as absent.
    pub fn load(&self) -> Option<SessionUpdate> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                log::warn!(
                    target: "sentinel",
                    "[Cache] Failed to read {}: {}",
                    self.path.display(),
                    err
                );
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!(
                    target: "sentinel",
                    "[Cache] Discarding corrupt session file {}: {}",
                    self.path.display(),
                    err
                );
                self.remove();
                None
            }
        }
    }

    /// Persists the session, replacing whatever was stored before.
    pub fn save(&self, session: &SessionUpdate) {
        let result = serde_json::to_vec(session)
            .map_err(io::Error::from)
            .and_then(|bytes| fs::write(&self.path, bytes));
        if let Err(err) = result {
            log::warn!(
                target: "sentinel",
                "[Cache] Failed to write {}: {}",
                self.path.display(),
                err
            );
        }
    }

    /// Deletes the session file.  A missing file is fine.
    pub fn remove(&self) {
        super::disk::remove_file(&self.path);
    }
}
