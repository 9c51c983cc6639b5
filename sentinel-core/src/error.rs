use std::collections::HashSet;
use std::error::Error;

use crate::protocol::{Event, Exception, Level};
use crate::{Hub, Uuid};

/// The maximum number of exceptions recorded for one error chain.
pub const MAX_EXCEPTIONS: usize = 10;

impl Hub {
    /// Capture any `std::error::Error`.
    ///
    /// The error and its chain of sources become the exceptions of a new
    /// event at `error` level.
    pub fn capture_error<E: Error + ?Sized>(&self, error: &E) -> Uuid {
        if self.client().is_none() {
            return Uuid::nil();
        }
        self.capture_event(event_from_error(error))
    }
}

/// Create an `Event` from a `std::error::Error`.
///
/// A chain of errors will be resolved as well, and sorted oldest to newest.
/// The chain is cut off after [`MAX_EXCEPTIONS`] entries or when a source
/// repeats.
///
/// # Examples
///
/// ```
/// use thiserror::Error;
///
/// #[derive(Debug, Error)]
/// #[error("inner")]
/// struct InnerError;
///
/// #[derive(Debug, Error)]
/// #[error("outer")]
/// struct OuterError(#[from] InnerError);
///
/// let event = sentinel_core::event_from_error(&OuterError(InnerError));
/// assert_eq!(event.level, sentinel_core::protocol::Level::Error);
/// assert_eq!(event.exception.len(), 2);
/// assert_eq!(&event.exception[0].ty, "InnerError");
/// assert_eq!(event.exception[0].value, Some("inner".into()));
/// assert_eq!(&event.exception[1].ty, "OuterError");
/// assert_eq!(event.exception[1].value, Some("outer".into()));
/// ```
pub fn event_from_error<E: Error + ?Sized>(err: &E) -> Event {
    let root = exception_from_error(err);
    // a wrapper and its first field share an address, so the type is part
    // of the key
    let mut seen = HashSet::new();
    seen.insert((err as *const E as *const (), root.ty.clone()));
    let mut exceptions = vec![root];

    let mut source = err.source();
    while let Some(err) = source {
        if exceptions.len() >= MAX_EXCEPTIONS {
            break;
        }
        let exception = exception_from_error(err);
        let key = (err as *const dyn Error as *const (), exception.ty.clone());
        if !seen.insert(key) {
            break;
        }
        exceptions.push(exception);
        source = err.source();
    }

    exceptions.reverse();
    Event {
        exception: exceptions.into(),
        level: Level::Error,
        ..Default::default()
    }
}

fn exception_from_error<E: Error + ?Sized>(err: &E) -> Exception {
    Exception {
        ty: parse_type_from_debug(err),
        value: Some(err.to_string()),
        ..Default::default()
    }
}

/// Parse the types name from `Debug` output.
pub fn parse_type_from_debug<D: std::fmt::Debug + ?Sized>(d: &D) -> String {
    let dbg = format!("{d:#?}");

    dbg.split(&[' ', '(', '{', '\r', '\n'][..])
        .next()
        .unwrap_or(&dbg)
        .trim()
        .to_owned()
}
