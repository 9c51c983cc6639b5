#![cfg(feature = "test")]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use sentinel::cache::OfflineCache;
use sentinel::protocol::{Event, SessionAttributes, SessionStatus, SessionUpdate};
use sentinel::test::{TestTransport, TEST_DSN};
use sentinel::transports::{AsyncConnection, HttpSender, TransportResult};
use sentinel::{AppState, ClientOptions, Envelope, InitError, Transport, Uuid};

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<Envelope>>,
}

impl HttpSender for Recorder {
    async fn send(&self, envelope: &Envelope) -> TransportResult {
        self.sent.lock().unwrap().push(envelope.clone());
        TransportResult::Success
    }
}

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

fn options_with(dir: &Path, transport: &Arc<TestTransport>) -> ClientOptions {
    ClientOptions {
        dsn: Some(TEST_DSN.clone()),
        release: Some("app@1.0.0".into()),
        cache_dir_path: Some(dir.to_path_buf()),
        transport: Some(Arc::new(transport.clone())),
        ..Default::default()
    }
}

#[test]
fn test_invalid_dsn() {
    match sentinel::init("https://public@example.com/not-a-project") {
        Err(InitError::InvalidDsn(_)) => {}
        other => panic!("unexpected init result: {:?}", other.map(|g| g.is_enabled())),
    }
}

#[test]
fn test_unusable_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-directory");
    std::fs::write(&file, b"").unwrap();

    let result = sentinel::init(ClientOptions {
        dsn: Some(TEST_DSN.clone()),
        cache_dir_path: Some(file.clone()),
        transport: Some(Arc::new(TestTransport::new())),
        ..Default::default()
    });
    match result {
        Err(InitError::CacheDir { path, .. }) => assert_eq!(path, file),
        other => panic!("unexpected init result: {:?}", other.map(|g| g.is_enabled())),
    }
}

#[test]
fn test_cached_envelopes_are_replayed() {
    let _ = pretty_env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    let cache = OfflineCache::open(dir.path(), 10, 100).unwrap();
    let mut expected = HashSet::new();
    for _ in 0..2 {
        let event = Event::new();
        expected.insert(event.event_id);
        cache.store(&Envelope::from(event)).unwrap();
    }
    assert_eq!(cache.events().len(), 2);

    let recorder = Arc::new(Recorder::default());
    let sender = recorder.clone();
    let guard = sentinel::init(ClientOptions {
        dsn: Some(TEST_DSN.clone()),
        cache_dir_path: Some(dir.path().to_path_buf()),
        transport: Some(Arc::new(move |opts: &ClientOptions| {
            Arc::new(AsyncConnection::new(opts, sender.clone())) as Arc<dyn Transport>
        })),
        ..Default::default()
    })
    .unwrap();
    assert!(guard.is_enabled());

    assert!(wait_for(|| cache.events().is_empty()));
    let replayed: HashSet<Uuid> = recorder
        .sent
        .lock()
        .unwrap()
        .iter()
        .filter_map(|envelope| envelope.event().map(|event| event.event_id))
        .collect();
    assert_eq!(replayed, expected);
}

#[test]
fn test_auto_session_reports_dangling_session() {
    let dir = tempfile::tempdir().unwrap();
    let cache = OfflineCache::open(dir.path(), 10, 100).unwrap();
    let started = SystemTime::now() - Duration::from_secs(60);
    let dangling = SessionUpdate {
        session_id: Uuid::new_v4(),
        distinct_id: None,
        sequence: None,
        timestamp: Some(started + Duration::from_secs(30)),
        started,
        init: false,
        duration: None,
        status: SessionStatus::Ok,
        errors: 1,
        attributes: SessionAttributes {
            release: "app@1.0.0".into(),
            ..Default::default()
        },
    };
    cache.session_store().save(&dangling);

    let transport = TestTransport::new();
    let guard = sentinel::init(ClientOptions {
        auto_session_tracking: true,
        ..options_with(dir.path(), &transport)
    })
    .unwrap();

    let envelopes = transport.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 2);
    let ended = envelopes[0].session_updates().next().unwrap();
    assert_eq!(ended.session_id, dangling.session_id);
    assert_eq!(ended.status, SessionStatus::Abnormal);
    assert_eq!(ended.errors, 1);
    let fresh = envelopes[1].session_updates().next().unwrap();
    assert!(fresh.init);
    assert_eq!(fresh.status, SessionStatus::Ok);

    drop(guard);
    let envelopes = transport.fetch_and_clear_envelopes();
    let closed = envelopes[0].session_updates().next().unwrap();
    assert_eq!(closed.session_id, fresh.session_id);
    assert_eq!(closed.status, SessionStatus::Exited);
    assert!(cache.session_store().load().is_none());
}

#[test]
fn test_lifecycle_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let transport = TestTransport::new();
    let guard = sentinel::init(options_with(dir.path(), &transport)).unwrap();
    assert!(transport.fetch_and_clear_envelopes().is_empty());

    guard.notify(AppState::Foreground);
    let started = transport.fetch_and_clear_envelopes();
    assert_eq!(started.len(), 1);
    let session = started[0].session_updates().next().unwrap().clone();
    assert!(session.init);

    guard.notify(AppState::Background);
    let ended = transport.fetch_and_clear_envelopes();
    let update = ended[0].session_updates().next().unwrap();
    assert_eq!(update.session_id, session.session_id);
    assert_eq!(update.status, SessionStatus::Exited);

    guard.notify(AppState::Foreground);
    guard.hub().capture_message("oops", sentinel::Level::Error);
    guard.notify(AppState::Terminating);
    let envelopes = transport.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 3);
    assert!(envelopes[1].event().is_some());
    let last = envelopes[2].session_updates().next().unwrap();
    assert_eq!(last.status, SessionStatus::Exited);
    assert_eq!(last.errors, 1);
}
