//! This crate reports errors, panics and application health to a sentinel
//! collector.  Events that cannot be delivered are kept in an offline cache
//! and resubmitted on the next start.
//!
//! # Quickstart
//!
//! The most convenient way to use this library is the [`init`] function,
//! which creates a client with the default HTTP transport and returns a
//! guard owning the [`Hub`] that events are captured through.
//!
//! When the guard is dropped it ends the current session and flushes events
//! that were not yet sent.  It has a two second deadline for this, so
//! shutdown of applications might slightly delay as a result.  Keep the
//! guard around or sending events will not work.
//!
//! ```
//! let guard = sentinel::init("https://key@sentinel.invalid/42").unwrap();
//! guard.hub().capture_message("Hello World!", sentinel::Level::Info);
//! // when the guard goes out of scope here, the client will wait up to two
//! // seconds to send remaining events to the service.
//! ```
//!
//! # Offline caching
//!
//! With [`ClientOptions::cache_dir_path`] set, every envelope is written to
//! disk before it is attempted and only removed once the collector accepted
//! it.  Events go to `events/`, session updates to `sessions/`, next to the
//! `session.json` file tracking the current session.
//!
//! ```no_run
//! let guard = sentinel::init(sentinel::ClientOptions {
//!     dsn: "https://key@sentinel.invalid/42".parse().ok(),
//!     release: Some("my-app@1.0.0".into()),
//!     cache_dir_path: Some("/var/cache/my-app/sentinel".into()),
//!     auto_session_tracking: true,
//!     ..Default::default()
//! })
//! .expect("valid configuration");
//! # drop(guard);
//! ```
//!
//! # Minimal API
//!
//! If the goal is to instrument libraries, or to extend the SDK with a
//! custom [`Transport`], the `sentinel-core` crate is enough.  Everything it
//! exports is re-exported here.
//!
//! # Features
//!
//! Default features:
//!
//! * `panic`: Enables support for capturing panics.
//! * `transport`: Enables the default transport, which is currently `reqwest` with `native-tls`.
//!
//! Additional features:
//!
//! * `test`: Enables testing support.
//! * `rustls`: Uses `rustls` instead of `native-tls` for the `reqwest` transport.

#![warn(missing_docs)]

mod defaults;
mod init;
pub mod transports;

#[cfg(feature = "panic")]
pub mod panic;

// re-export from core
#[doc(inline)]
pub use sentinel_core::*;

// added public API
pub use crate::defaults::apply_defaults;
pub use crate::init::{init, AppState, ClientInitGuard, InitError};
