//! The data types exchanged with the collector.
//!
//! Events are kept deliberately small: an identity, a timestamp, a level and
//! the contextual data a [`Scope`] can contribute.  Everything is wrapped in an
//! [`Envelope`] for transport and on-disk persistence.
//!
//! [`Scope`]: https://docs.rs/sentinel-core/*/sentinel_core/struct.Scope.html

mod attachment;
mod envelope;
mod event;
mod session;

pub use self::attachment::*;
pub use self::envelope::*;
pub use self::event::*;
pub use self::session::*;

/// The protocol version spoken by this crate.
pub const LATEST: u16 = 7;

/// An arbitrary (JSON) value.
pub mod value {
    pub use serde_json::value::{from_value, to_value, Map, Number, Value};
}

/// The internally used map type.
pub mod map {
    pub use std::collections::btree_map::{BTreeMap as Map, *};
}

pub use self::map::Map;
pub use self::value::Value;
