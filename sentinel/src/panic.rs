//! Panic capture.
//!
//! [`register_panic_handler`] installs a panic hook that reports every panic
//! as a `fatal` event through the given hub.  The event carries an unhandled
//! `panic` mechanism, so the client marks the current session as crashed.
//! Panics are forwarded to the previously registered panic hook afterwards.
//!
//! ```no_run
//! let guard = sentinel::init("https://key@sentinel.invalid/1").unwrap();
//! sentinel::panic::register_panic_handler(guard.hub().clone());
//!
//! panic!("Everything is on fire!");
//! ```

use std::panic::{self, PanicHookInfo};
use std::sync::Arc;

use sentinel_core::sentinel_debug;

use crate::protocol::{Event, Exception, Level, Mechanism};
use crate::Hub;

/// Extract the message of a panic.
pub fn message_from_panic_info<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    match info.payload().downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

/// Creates an event from the given panic info.
pub fn event_from_panic_info(info: &PanicHookInfo<'_>) -> Event {
    let msg = message_from_panic_info(info);
    let value = match info.location() {
        Some(location) => format!("{} at {}:{}", msg, location.file(), location.line()),
        None => msg.to_owned(),
    };
    Event {
        exception: vec![Exception {
            ty: "panic".into(),
            mechanism: Some(Mechanism {
                ty: "panic".into(),
                handled: Some(false),
                ..Default::default()
            }),
            value: Some(value),
            ..Default::default()
        }]
        .into(),
        level: Level::Fatal,
        ..Default::default()
    }
}

/// Reports a panic through `hub` and waits for the delivery.
///
/// The wait is bounded by the client's `shutdown_timeout` so a crashing
/// process never hangs.
pub fn panic_handler(hub: &Hub, info: &PanicHookInfo<'_>) {
    sentinel_debug!("[Panic] Panic detected: {}", message_from_panic_info(info));
    let Some(client) = hub.client() else {
        return;
    };
    let event_id = hub.capture_event(event_from_panic_info(info));
    sentinel_debug!("[Panic] Created event {} for panic", event_id);
    client.flush(Some(client.options().shutdown_timeout));
}

/// Installs a panic hook reporting to `hub`.
///
/// The previous hook still runs after the panic was captured.  Every call
/// chains another hook, so this is meant to be called once per process.
pub fn register_panic_handler(hub: Arc<Hub>) {
    sentinel_debug!("[Panic] Installing panic hook");
    let next = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        panic_handler(&hub, info);
        next(info);
    }));
}
