use std::borrow::Cow;
use std::env;
use std::sync::Arc;

use crate::transports::DefaultTransportFactory;
use crate::types::Dsn;
use crate::ClientOptions;

/// Apply default client options.
///
/// Extends the given `ClientOptions` with default options such as a default
/// transport, a DSN, release and environment based on environment
/// variables, and the HTTP proxies.
///
/// This is called by [`init`](crate::init).  Options that are already set
/// are left alone.
///
/// The following variables are read:
///
/// * `SENTINEL_DSN` for the DSN
/// * `SENTINEL_RELEASE` for the release
/// * `SENTINEL_ENVIRONMENT` for the environment, falling back to `debug` or
///   `release` depending on how the program was built
/// * `HTTP_PROXY` and `HTTPS_PROXY` (or their lowercase forms); the HTTPS
///   proxy falls back to the HTTP one
///
/// # Examples
///
/// ```
/// std::env::set_var("SENTINEL_RELEASE", "release-from-env");
///
/// let options = sentinel::ClientOptions::default();
/// assert_eq!(options.release, None);
/// assert!(options.transport.is_none());
///
/// let options = sentinel::apply_defaults(options);
/// assert_eq!(options.release, Some("release-from-env".into()));
/// assert!(options.transport.is_some());
/// ```
pub fn apply_defaults(mut opts: ClientOptions) -> ClientOptions {
    if opts.transport.is_none() {
        opts.transport = Some(Arc::new(DefaultTransportFactory));
    }
    if opts.dsn.is_none() {
        opts.dsn = env::var("SENTINEL_DSN")
            .ok()
            .and_then(|dsn| match dsn.parse::<Dsn>() {
                Ok(dsn) => Some(dsn),
                Err(err) => {
                    log::warn!(target: "sentinel", "Ignoring invalid SENTINEL_DSN: {}", err);
                    None
                }
            });
    }
    if opts.release.is_none() {
        opts.release = env::var("SENTINEL_RELEASE").ok().map(Cow::Owned);
    }
    if opts.environment.is_none() {
        opts.environment = env::var("SENTINEL_ENVIRONMENT")
            .ok()
            .map(Cow::Owned)
            .or_else(|| {
                Some(Cow::Borrowed(if cfg!(debug_assertions) {
                    "debug"
                } else {
                    "release"
                }))
            });
    }
    if opts.http_proxy.is_none() {
        opts.http_proxy = env::var("HTTP_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("http_proxy").ok().map(Cow::Owned));
    }
    if opts.https_proxy.is_none() {
        opts.https_proxy = env::var("HTTPS_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("https_proxy").ok().map(Cow::Owned))
            .or_else(|| opts.http_proxy.clone());
    }
    opts
}
