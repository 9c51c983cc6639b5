#![cfg(feature = "test")]

use std::sync::Arc;

use sentinel_core::protocol::{Breadcrumb, Level, User, Value};
use sentinel_core::test::{with_captured_events, with_captured_events_options};
use sentinel_core::{ClientOptions, Hub, Uuid};

#[test]
fn test_basic_capture_message() {
    let mut last_event_id = None::<Uuid>;
    let events = with_captured_events(|hub| {
        hub.configure_scope(|scope| {
            scope.set_tag("worker", "worker1");
        });
        hub.capture_message("Hello World!", Level::Warning);
        last_event_id = hub.last_event_id();
    });
    assert_eq!(events.len(), 1);
    let event = events.into_iter().next().unwrap();
    assert_eq!(event.message.unwrap(), "Hello World!");
    assert_eq!(event.level, Level::Warning);
    assert_eq!(
        event.tags.into_iter().collect::<Vec<(String, String)>>(),
        vec![("worker".to_string(), "worker1".to_string())]
    );

    assert_eq!(Some(event.event_id), last_event_id);
}

#[test]
fn test_no_client_returns_nil() {
    let hub = Hub::new(None, Default::default());
    assert!(hub.capture_message("nobody listens", Level::Error).is_nil());
    assert!(hub.last_event_id().is_none());
}

#[test]
fn test_breadcrumbs() {
    let events = with_captured_events(|hub| {
        hub.add_breadcrumb(|| Breadcrumb {
            ty: "log".into(),
            message: Some("First breadcrumb".into()),
            ..Default::default()
        });
        hub.add_breadcrumb(Breadcrumb {
            ty: "log".into(),
            message: Some("Second breadcrumb".into()),
            ..Default::default()
        });
        hub.add_breadcrumb(|| {
            vec![
                Breadcrumb {
                    ty: "log".into(),
                    message: Some("Third breadcrumb".into()),
                    ..Default::default()
                },
                Breadcrumb {
                    ty: "log".into(),
                    message: Some("Fourth breadcrumb".into()),
                    ..Default::default()
                },
            ]
        });
        hub.add_breadcrumb(|| None);
        hub.capture_message("Hello World!", Level::Warning);
    });
    assert_eq!(events.len(), 1);
    let event = events.into_iter().next().unwrap();

    let messages: Vec<_> = event
        .breadcrumbs
        .iter()
        .map(|x| (x.message.as_deref().unwrap(), x.ty.as_str()))
        .collect();
    assert_eq!(
        messages,
        vec![
            ("First breadcrumb", "log"),
            ("Second breadcrumb", "log"),
            ("Third breadcrumb", "log"),
            ("Fourth breadcrumb", "log"),
        ]
    );
}

#[test]
fn test_breadcrumbs_closure_without_client() {
    let hub = Hub::new(None, Default::default());
    hub.add_breadcrumb(|| -> Option<Breadcrumb> { panic!("must not be called") });
}

#[test]
fn test_max_breadcrumbs() {
    let options = ClientOptions {
        max_breadcrumbs: 2,
        ..Default::default()
    };
    let events = with_captured_events_options(
        |hub| {
            for i in 0..5 {
                hub.add_breadcrumb(Breadcrumb {
                    message: Some(i.to_string()),
                    ..Default::default()
                });
            }
            hub.capture_message("full", Level::Info);
        },
        options,
    );
    let messages: Vec<_> = events[0]
        .breadcrumbs
        .iter()
        .filter_map(|b| b.message.as_deref())
        .collect();
    assert_eq!(messages, ["3", "4"]);
}

#[test]
fn test_before_breadcrumb_filters_and_survives_panics() {
    let options = ClientOptions {
        before_breadcrumb: Some(Arc::new(|breadcrumb: Breadcrumb| {
            match breadcrumb.message.as_deref() {
                Some("drop") => None,
                Some("explode") => panic!("filter exploded"),
                _ => Some(breadcrumb),
            }
        })),
        ..Default::default()
    };
    let events = with_captured_events_options(
        |hub| {
            hub.add_breadcrumb(Breadcrumb {
                message: Some("keep".into()),
                ..Default::default()
            });
            hub.add_breadcrumb(Breadcrumb {
                message: Some("drop".into()),
                ..Default::default()
            });
            hub.add_breadcrumb(Breadcrumb {
                message: Some("explode".into()),
                ..Default::default()
            });
            hub.capture_message("done", Level::Info);
        },
        options,
    );

    let breadcrumbs = &events[0].breadcrumbs;
    assert_eq!(breadcrumbs.len(), 2);
    assert_eq!(breadcrumbs[0].message.as_deref(), Some("keep"));
    assert_eq!(breadcrumbs[1].message.as_deref(), Some("explode"));
    assert_eq!(
        breadcrumbs[1].data.get("sentinel:message"),
        Some(&Value::from("filter exploded"))
    );
}

#[test]
fn test_with_scope() {
    let events = with_captured_events(|hub| {
        hub.configure_scope(|scope| scope.set_tag("outer", 1));
        hub.with_scope(
            |scope| {
                scope.set_tag("inner", 2);
                scope.set_user(Some(User {
                    id: Some("42".into()),
                    ..Default::default()
                }));
            },
            || {
                hub.capture_message("inside", Level::Info);
            },
        );
        hub.capture_message("outside", Level::Info);
    });
    assert_eq!(events.len(), 2);

    assert_eq!(events[0].tags.get("inner").map(String::as_str), Some("2"));
    assert_eq!(events[0].tags.get("outer").map(String::as_str), Some("1"));
    assert!(events[0].user.is_some());

    assert!(!events[1].tags.contains_key("inner"));
    assert!(events[1].user.is_none());
}

#[test]
fn test_with_scope_pops_on_panic() {
    let hub = Hub::new(None, Default::default());
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        hub.with_scope(|_| {}, || panic!("boom"));
    }));
    assert!(result.is_err());
    assert!(!hub.pop_scope());
}

#[test]
fn test_push_and_pop_scope() {
    let events = with_captured_events(|hub| {
        let guard = hub.push_scope();
        hub.configure_scope(|scope| scope.set_level(Some(Level::Fatal)));
        hub.capture_message("pushed", Level::Info);
        drop(guard);
        hub.capture_message("popped", Level::Info);

        assert!(!hub.pop_scope());
    });
    assert_eq!(events[0].level, Level::Fatal);
    assert_eq!(events[1].level, Level::Info);
}

#[test]
fn test_out_of_order_guards() {
    let hub = Hub::new(None, Default::default());
    let outer = hub.push_scope();
    let inner = hub.push_scope();
    drop(outer);
    drop(inner);
    assert!(!hub.pop_scope());
}

#[test]
fn test_cloned_hub_is_independent() {
    let events = with_captured_events(|hub| {
        hub.configure_scope(|scope| scope.set_tag("shared", "yes"));
        let clone = hub.clone();
        clone.configure_scope(|scope| scope.set_tag("clone", "yes"));
        let _guard = clone.push_scope();

        hub.capture_message("original", Level::Info);
        clone.capture_message("clone", Level::Info);
    });
    assert_eq!(events.len(), 2);
    assert!(!events[0].tags.contains_key("clone"));
    assert!(events[1].tags.contains_key("clone"));
    assert!(events[1].tags.contains_key("shared"));
}

#[derive(Debug, thiserror::Error)]
#[error("could not load config")]
struct ConfigError(#[source] std::io::Error);

#[test]
fn test_capture_error_chain() {
    let events = with_captured_events(|hub| {
        let err = ConfigError(std::io::Error::other("disk on fire"));
        hub.capture_error(&err);
    });
    assert_eq!(events.len(), 1);
    let exceptions = &events[0].exception;
    assert_eq!(exceptions.len(), 2);
    assert_eq!(exceptions[0].value.as_deref(), Some("disk on fire"));
    assert_eq!(exceptions[1].ty, "ConfigError");
    assert_eq!(events[0].level, Level::Error);
}
