#![cfg(all(feature = "test", feature = "panic"))]

use std::panic;
use std::sync::Arc;

use sentinel::protocol::{Level, SessionStatus};
use sentinel::test::{TestTransport, TEST_DSN};
use sentinel::{Client, ClientOptions, Hub};

#[test]
fn test_panic_is_captured_and_crashes_session() {
    let transport = TestTransport::new();
    let client = Arc::new(Client::from(ClientOptions {
        dsn: Some(TEST_DSN.clone()),
        release: Some("app@1.0.0".into()),
        transport: Some(Arc::new(transport.clone())),
        ..Default::default()
    }));
    let hub = Arc::new(Hub::new(Some(client), Default::default()));
    hub.start_session();
    transport.fetch_and_clear_envelopes();

    sentinel::panic::register_panic_handler(hub.clone());
    let result = panic::catch_unwind(|| panic!("Everything is on fire!"));
    assert!(result.is_err());

    let envelopes = transport.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 1);
    let event = envelopes[0].event().unwrap();
    assert_eq!(event.level, Level::Fatal);
    assert!(event.is_unhandled());
    assert!(event.exception[0]
        .value
        .as_deref()
        .unwrap()
        .starts_with("Everything is on fire!"));
    assert_eq!(hub.last_event_id(), Some(event.event_id));

    let session = envelopes[0].session_updates().next().unwrap();
    assert_eq!(session.status, SessionStatus::Crashed);
    assert_eq!(session.errors, 1);

    // a crashed session is not ended a second time
    hub.end_session();
    assert!(transport.fetch_and_clear_envelopes().is_empty());
}
