use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::protocol::{Envelope, EnvelopeItem};
use crate::sentinel_debug;
use crate::types::random_uuid;

/// What a full [`DiskCache`] does with a new envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// The new envelope is dropped.
    RejectWhenFull,
    /// The oldest cached envelopes are deleted to make room.
    RotateOldest,
}

/// A directory of envelopes, one file each.
///
/// Files are named after the envelope's event id, so storing the same event
/// twice is a no-op.  The directory itself is checked on every use; if it
/// went missing or is not writable the cache degrades to doing nothing.
#[derive(Debug, Clone)]
pub struct DiskCache {
    directory: PathBuf,
    max_size: usize,
    suffix: &'static str,
    policy: CachePolicy,
}

impl DiskCache {
    /// Creates a cache over `directory` holding at most `max_size` files.
    pub fn new<P: Into<PathBuf>>(
        directory: P,
        max_size: usize,
        suffix: &'static str,
        policy: CachePolicy,
    ) -> Self {
        DiskCache {
            directory: directory.into(),
            max_size,
            suffix,
            policy,
        }
    }

    /// The cache directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The maximum number of files.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn is_usable(&self) -> bool {
        match fs::metadata(&self.directory) {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => true,
            Ok(_) => {
                log::error!(
                    target: "sentinel",
                    "[Cache] {} is not a writable directory",
                    self.directory.display()
                );
                false
            }
            Err(err) => {
                log::error!(
                    target: "sentinel",
                    "[Cache] Cannot access {}: {}",
                    self.directory.display(),
                    err
                );
                false
            }
        }
    }

    /// The file an envelope is stored under.
    ///
    /// Envelopes without an event id get a fresh random name.
    pub fn path_for(&self, envelope: &Envelope) -> PathBuf {
        let id = envelope.uuid().copied().unwrap_or_else(random_uuid);
        self.directory.join(format!("{}{}", id, self.suffix))
    }

    /// Writes the envelope into the cache.
    ///
    /// Returns the path of the cache file, which also covers the case of the
    /// envelope having been stored before.  `None` means nothing was written.
    pub fn store(&self, envelope: &Envelope) -> Option<PathBuf> {
        if !self.is_usable() {
            return None;
        }
        let path = self.path_for(envelope);
        if path.exists() {
            sentinel_debug!("[Cache] {} is already cached", path.display());
            return Some(path);
        }

        let files = self.files();
        if files.len() >= self.max_size {
            match self.policy {
                CachePolicy::RejectWhenFull => {
                    log::warn!(
                        target: "sentinel",
                        "[Cache] {} is full ({} files), dropping envelope",
                        self.directory.display(),
                        files.len()
                    );
                    return None;
                }
                CachePolicy::RotateOldest => {
                    let excess = files.len() + 1 - self.max_size;
                    rotate(files, excess);
                }
            }
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Some(path),
            Err(err) => {
                log::warn!(
                    target: "sentinel",
                    "[Cache] Failed to create {}: {}",
                    path.display(),
                    err
                );
                return None;
            }
        };
        if let Err(err) = write_envelope(file, envelope) {
            log::warn!(
                target: "sentinel",
                "[Cache] Failed to write {}: {}",
                path.display(),
                err
            );
            remove_file(&path);
            return None;
        }
        sentinel_debug!("[Cache] Stored {}", path.display());
        Some(path)
    }

    /// Deletes the cache file of an envelope, if there is one.
    pub fn discard(&self, envelope: &Envelope) {
        if envelope.uuid().is_some() {
            remove_file(&self.path_for(envelope));
        }
    }

    /// Deletes a cache file by path.
    pub fn discard_path(&self, path: &Path) {
        remove_file(path);
    }

    /// All cache files, oldest first.
    pub fn files(&self) -> Vec<PathBuf> {
        if !self.is_usable() {
            return Vec::new();
        }
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!(
                    target: "sentinel",
                    "[Cache] Failed to list {}: {}",
                    self.directory.display(),
                    err
                );
                return Vec::new();
            }
        };

        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(self.suffix))
            })
            .filter_map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((modified, path))
            })
            .collect();
        files.sort();
        files.into_iter().map(|(_, path)| path).collect()
    }

    /// The number of cached envelopes.
    pub fn len(&self) -> usize {
        self.files().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads every cached envelope, oldest first.
    ///
    /// Files that fail to parse are deleted.
    pub fn load_all(&self) -> Vec<(PathBuf, Envelope)> {
        self.files()
            .into_iter()
            .filter_map(|path| match Envelope::from_path(&path) {
                Ok(envelope) => Some((path, envelope)),
                Err(err) => {
                    log::warn!(
                        target: "sentinel",
                        "[Cache] Discarding unreadable envelope {}: {}",
                        path.display(),
                        err
                    );
                    remove_file(&path);
                    None
                }
            })
            .collect()
    }
}

fn write_envelope(file: File, envelope: &Envelope) -> io::Result<()> {
    let mut writer = BufWriter::new(file);
    envelope.to_writer(&mut writer)?;
    writer.flush()
}

/// Removes a file, treating a file that is already gone as success.
pub(crate) fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => log::warn!(
            target: "sentinel",
            "[Cache] Failed to delete {}: {}",
            path.display(),
            err
        ),
    }
}

/// Deletes the `count` oldest of `files`.
///
/// When a deleted envelope carried the initial update of a session, the
/// `init` flag moves to the next cached update of that session so the
/// collector still learns when the session started.
fn rotate(files: Vec<PathBuf>, count: usize) {
    let count = count.min(files.len());
    let (doomed, remaining) = files.split_at(count);
    for path in doomed {
        if let Ok(envelope) = Envelope::from_path(path) {
            for session in envelope.session_updates() {
                if session.is_ok() && session.init {
                    transfer_init(remaining, session.session_id);
                }
            }
        }
        sentinel_debug!("[Cache] Rotating out {}", path.display());
        remove_file(path);
    }
}

fn transfer_init(files: &[PathBuf], session_id: crate::Uuid) {
    for path in files {
        let Ok(mut envelope) = Envelope::from_path(path) else {
            continue;
        };
        let mut found = false;
        for item in envelope.items_mut() {
            if let EnvelopeItem::SessionUpdate(session) = item {
                if session.session_id == session_id {
                    session.init = true;
                    found = true;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        let result = File::create(path).and_then(|file| write_envelope(file, &envelope));
        if let Err(err) = result {
            log::warn!(
                target: "sentinel",
                "[Cache] Failed to rewrite {}: {}",
                path.display(),
                err
            );
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::{Event, SessionAttributes, SessionStatus, SessionUpdate};
    use crate::Uuid;

    fn event_envelope() -> Envelope {
        Envelope::from(Event::new())
    }

    fn session_envelope(session_id: Uuid, init: bool) -> Envelope {
        Envelope::from(SessionUpdate {
            session_id,
            distinct_id: None,
            sequence: None,
            timestamp: None,
            started: SystemTime::now(),
            init,
            duration: None,
            status: SessionStatus::Ok,
            errors: 0,
            attributes: SessionAttributes {
                release: "app@1.0.0".into(),
                ..Default::default()
            },
        })
    }

    fn age(path: &Path, secs_ago: u64) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .unwrap();
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 10, ".sentry-event", CachePolicy::RejectWhenFull);
        let envelope = event_envelope();

        let first = cache.store(&envelope).unwrap();
        let second = cache.store(&envelope).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        cache.discard(&envelope);
        cache.discard(&envelope);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reject_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 2, ".sentry-event", CachePolicy::RejectWhenFull);
        assert!(cache.store(&event_envelope()).is_some());
        assert!(cache.store(&event_envelope()).is_some());
        assert!(cache.store(&event_envelope()).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(
            dir.path().join("missing"),
            2,
            ".envelope",
            CachePolicy::RotateOldest,
        );
        assert!(cache.store(&event_envelope()).is_none());
        assert!(cache.load_all().is_empty());
    }

    #[test]
    fn test_rotation_moves_init_flag() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 2, ".envelope", CachePolicy::RotateOldest);
        let sid = Uuid::new_v4();

        let initial = cache.store(&session_envelope(sid, true)).unwrap();
        age(&initial, 20);
        let update = cache.store(&session_envelope(sid, false)).unwrap();
        age(&update, 10);
        let newest = cache.store(&session_envelope(Uuid::new_v4(), true)).unwrap();

        let loaded = cache.load_all();
        assert_eq!(loaded.len(), 2);
        assert!(!initial.exists());
        assert!(newest.exists());

        let moved = Envelope::from_path(&update).unwrap();
        let session = moved.session_updates().next().unwrap();
        assert_eq!(session.session_id, sid);
        assert!(session.init);
    }

    #[test]
    fn test_corrupt_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 10, ".envelope", CachePolicy::RotateOldest);
        let bogus = dir.path().join("bogus.envelope");
        fs::write(&bogus, b"{}\n{\"type\":\"event\",\"length\":100}\n{}").unwrap();
        cache.store(&session_envelope(Uuid::new_v4(), true)).unwrap();

        assert_eq!(cache.load_all().len(), 1);
        assert!(!bogus.exists());
    }
}
