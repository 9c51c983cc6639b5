//! The provided transports.
//!
//! Every transport built here is an [`AsyncConnection`]: a bounded delivery
//! queue with an offline cache and rate limiting, in front of an
//! [`HttpSender`] that performs the actual requests.  The `reqwest` feature
//! turns on the [`ReqwestHttpTransport`] sender.

use std::sync::Arc;

use crate::{ClientOptions, Transport, TransportFactory};

mod connection;
mod http;
mod ratelimit;

#[cfg(feature = "reqwest")]
mod reqwest;

pub use self::connection::AsyncConnection;
pub use self::http::{HttpSender, TransportResult, DEFAULT_RETRY_DELAY};
pub use self::ratelimit::{parse_retry_after, RateLimiter, RateLimitingCategory};

#[cfg(feature = "reqwest")]
pub use self::reqwest::{ReqwestHttpTransport, SendError};

/// The default http transport.
#[cfg(feature = "reqwest")]
pub type HttpTransport = AsyncConnection<ReqwestHttpTransport>;

/// Creates the default HTTP transport.
///
/// This is the default value for `transport` on the client options.  It
/// creates a `HttpTransport`.  If no http transport was compiled into the
/// library it will panic on transport creation.
#[derive(Clone)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        #[cfg(feature = "reqwest")]
        {
            Arc::new(HttpTransport::new(
                options,
                ReqwestHttpTransport::new(options),
            ))
        }
        #[cfg(not(feature = "reqwest"))]
        {
            let _ = options;
            panic!("sentinel crate was compiled without transport")
        }
    }
}
