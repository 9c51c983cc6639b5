#![cfg(feature = "test")]

use std::path::Path;
use std::sync::Arc;

use sentinel_core::cache::{OfflineCache, SESSIONS_DIR, SESSION_FILE};
use sentinel_core::protocol::SessionStatus;
use sentinel_core::test::{TestTransport, TEST_DSN};
use sentinel_core::{Client, ClientOptions, Hub};

fn hub_with_cache(dir: &Path, transport: &Arc<TestTransport>) -> Hub {
    let options = ClientOptions {
        dsn: Some(TEST_DSN.clone()),
        release: Some("app@1.0.0".into()),
        cache_dir_path: Some(dir.to_path_buf()),
        transport: Some(Arc::new(transport.clone())),
        ..Default::default()
    };
    OfflineCache::from_options(&options).unwrap().unwrap();
    Hub::new(Some(Arc::new(Client::from(options))), Default::default())
}

#[test]
fn test_dangling_session_is_reported_abnormal() {
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join(SESSIONS_DIR).join(SESSION_FILE);

    let first = TestTransport::new();
    let previous_sid = {
        let hub = hub_with_cache(dir.path(), &first);
        hub.start_session();
        let envelopes = first.fetch_and_clear_envelopes();
        let sid = envelopes[0].session_updates().next().unwrap().session_id;
        // the process "dies" here without ending the session
        sid
    };
    assert!(session_file.exists());

    let second = TestTransport::new();
    let hub = hub_with_cache(dir.path(), &second);
    hub.start_session();

    let envelopes = second.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 2);
    let dangling = envelopes[0].session_updates().next().unwrap();
    assert_eq!(dangling.session_id, previous_sid);
    assert_eq!(dangling.status, SessionStatus::Abnormal);
    assert!(!dangling.init);

    let fresh = envelopes[1].session_updates().next().unwrap();
    assert_ne!(fresh.session_id, previous_sid);
    assert!(fresh.init);
    assert!(session_file.exists());

    hub.end_session();
    assert!(!session_file.exists());
}

#[test]
fn test_error_count_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let transport = TestTransport::new();
    let hub = hub_with_cache(dir.path(), &transport);
    hub.start_session();
    hub.capture_message("first", sentinel_core::Level::Error);
    hub.capture_message("second", sentinel_core::Level::Error);

    let store = OfflineCache::open(dir.path(), 10, 100).unwrap();
    let persisted = store.session_store().load().unwrap();
    assert_eq!(persisted.errors, 2);
    assert_eq!(persisted.status, SessionStatus::Ok);
}
