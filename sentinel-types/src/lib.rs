//! This crate provides common types for working with the sentinel protocol or the
//! sentinel server.  It's used by the sentinel client as well as other crates
//! that want to read or write envelopes.
//!
//! ## Crate Features
//!
//! The crate only holds data types and the envelope codec.  It does not do any
//! network or disk I/O on its own, apart from the convenience
//! [`Envelope::from_path`](protocol::Envelope::from_path) reader.
//!
//! ## Example
//!
//! ```
//! use sentinel_types::Dsn;
//!
//! let dsn: Dsn = "https://public@example.com/42".parse().unwrap();
//! assert_eq!(dsn.host(), "example.com");
//! assert_eq!(dsn.envelope_api_url().as_str(), "https://example.com/api/42/envelope/");
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod auth;
mod dsn;
mod project_id;
pub mod protocol;
pub(crate) mod utils;

pub use crate::auth::*;
pub use crate::dsn::*;
pub use crate::project_id::*;

// Re-export external types and traits for convenience
pub use uuid::Uuid;

/// Generates a random v4 [`Uuid`].
pub fn random_uuid() -> Uuid {
    Uuid::new_v4()
}
