//! This crate provides the core of the sentinel SDK, which can be used to
//! report events and errors.
//!
//! `sentinel-core` is meant for library authors that want to instrument their
//! code.  Applications should use the `sentinel` crate instead, which adds
//! the HTTP transport, the delivery queue and process-level integration.
//!
//! # Core Concepts
//!
//! The crate is centered around the concepts of [`Client`], [`Hub`] and
//! [`Scope`], as well as the extension point of the [`Transport`] and
//! [`TransportFactory`] traits.
//!
//! A [`Hub`] keeps a stack of scopes, each bound to a client.  Events
//! captured through the hub are enriched with the data of the top scope,
//! processed by the client and handed to its transport inside an
//! [`Envelope`](protocol::Envelope).  Envelopes that cannot be delivered
//! right away are kept in the [`cache`] on disk.
//!
//! There is no global hub.  Code running on other threads should get its
//! own hub via [`Hub::new_from_top`] or by cloning.
//!
//! ```
//! use sentinel_core::{Hub, Level};
//!
//! let hub = Hub::new(None, Default::default());
//! let worker = Hub::new_from_top(&hub);
//! std::thread::spawn(move || {
//!     worker.capture_message("from a thread", Level::Info);
//! })
//! .join()
//! .unwrap();
//! ```
//!
//! # Features
//!
//! - `test`: Activates the [`test`] module, which can be used to write
//!   tests that capture events in memory.

#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod breadcrumbs;
pub mod cache;
mod client;
mod clientoptions;
mod constants;
mod error;
mod hint;
mod hub;
mod intodsn;
mod scope;
mod session;
mod transport;

// public api or exports from this crate
pub use crate::breadcrumbs::IntoBreadcrumbs;
pub use crate::client::Client;
pub use crate::clientoptions::{BeforeCallback, ClientOptions};
pub use crate::constants::{SDK_NAME, USER_AGENT, VERSION};
pub use crate::error::{event_from_error, parse_type_from_debug, MAX_EXCEPTIONS};
pub use crate::hint::{DeliveryHint, DeliveryOutcome, Receipt, SessionPhase};
pub use crate::hub::Hub;
pub use crate::intodsn::{IntoClientConfig, IntoDsn};
pub use crate::scope::{EventProcessor, Scope, ScopeGuard};
pub use crate::transport::{Transport, TransportFactory};


// public api from other crates
#[doc(inline)]
pub use sentinel_types as types;
pub use sentinel_types::protocol;
pub use sentinel_types::protocol::{
    Attachment, Breadcrumb, Envelope, EnvelopeItem, Event, Level, SessionStatus, User,
};
pub use sentinel_types::Uuid;

#[doc(hidden)]
pub use log as __log;
