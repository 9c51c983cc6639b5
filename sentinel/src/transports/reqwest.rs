use std::io::{self, Write};

use ::reqwest::header::{HeaderMap, ACCEPT, CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use ::reqwest::{Client as ReqwestClient, Proxy, Response};
use flate2::write::GzEncoder;
use flate2::Compression;
use sentinel_core::sentinel_debug;
use thiserror::Error;

use super::http::{HttpSender, TransportResult};
use super::ratelimit::parse_retry_after;
use crate::types::Dsn;
use crate::{ClientOptions, Envelope};

/// The ways a request can fail before a response arrives.
#[derive(Debug, Error)]
pub enum SendError {
    /// The envelope could not be serialized.
    #[error("failed to serialize the event")]
    Serialize(#[from] serde_json::Error),
    /// The body could not be compressed.
    #[error("failed to compress the request body")]
    Compress(#[from] io::Error),
    /// The request itself failed.
    #[error("request failed")]
    Request(#[from] ::reqwest::Error),
    /// The client has no DSN to send to.
    #[error("no DSN configured")]
    NoDsn,
}

/// An [`HttpSender`] that posts envelopes via the [`reqwest`] library.
///
/// Envelopes that consist of a single event go to the store endpoint as
/// JSON, everything else goes to the envelope endpoint.  Request bodies are
/// gzip compressed.
///
/// [`reqwest`]: https://crates.io/crates/reqwest
#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
pub struct ReqwestHttpTransport {
    client: ReqwestClient,
    dsn: Option<Dsn>,
    user_agent: String,
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
impl ReqwestHttpTransport {
    /// Creates a new sender.
    pub fn new(options: &ClientOptions) -> Self {
        Self::new_internal(options, None)
    }

    /// Creates a new sender that uses the specified [`ReqwestClient`].
    pub fn with_client(options: &ClientOptions, client: ReqwestClient) -> Self {
        Self::new_internal(options, Some(client))
    }

    fn new_internal(options: &ClientOptions, client: Option<ReqwestClient>) -> Self {
        let client = client.unwrap_or_else(|| build_client(options));
        ReqwestHttpTransport {
            client,
            dsn: options.dsn.clone(),
            user_agent: options.user_agent.to_string(),
        }
    }

    async fn post(&self, envelope: &Envelope) -> Result<Response, SendError> {
        let dsn = self.dsn.as_ref().ok_or(SendError::NoDsn)?;
        let (url, content_type, body) = match envelope.event() {
            Some(event) if envelope.is_single_event() => (
                dsn.store_api_url(),
                "application/json",
                serde_json::to_vec(event)?,
            ),
            _ => (
                dsn.envelope_api_url(),
                "application/x-sentry-envelope",
                envelope.to_vec(),
            ),
        };

        let response = self
            .client
            .post(url.as_str())
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.user_agent.as_str())
            .header("X-Sentry-Auth", dsn.auth_header(Some(&self.user_agent)))
            .body(gzip(&body)?)
            .send()
            .await?;
        Ok(response)
    }
}

fn build_client(options: &ClientOptions) -> ReqwestClient {
    let mut builder = ReqwestClient::builder()
        .connect_timeout(options.connect_timeout)
        .read_timeout(options.read_timeout);
    if let Some(url) = options.http_proxy.as_ref() {
        match Proxy::http(url.as_ref()) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => log::warn!(
                target: "sentinel",
                "[Transport] Ignoring invalid HTTP proxy {}: {}",
                url,
                err
            ),
        }
    }
    if let Some(url) = options.https_proxy.as_ref() {
        match Proxy::https(url.as_ref()) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => log::warn!(
                target: "sentinel",
                "[Transport] Ignoring invalid HTTPS proxy {}: {}",
                url,
                err
            ),
        }
    }
    builder.build().unwrap_or_else(|err| {
        log::error!(
            target: "sentinel",
            "[Transport] Failed to configure HTTP client, using defaults: {}",
            err
        );
        ReqwestClient::new()
    })
}

fn gzip(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
impl HttpSender for ReqwestHttpTransport {
    async fn send(&self, envelope: &Envelope) -> TransportResult {
        let response = match self.post(envelope).await {
            Ok(response) => response,
            Err(SendError::Request(err)) => {
                sentinel_debug!("[Transport] Failed to send envelope: {}", err);
                return TransportResult::Failure {
                    status: err.status().map(|status| status.as_u16()),
                    retry_after: None,
                    rate_limits: None,
                };
            }
            Err(err) => {
                log::warn!(target: "sentinel", "[Transport] Cannot send envelope: {}", err);
                return TransportResult::io_failure();
            }
        };

        let status = response.status();
        let headers = response.headers();
        let retry_after = header_str(headers, RETRY_AFTER.as_str()).and_then(parse_retry_after);
        let rate_limits = header_str(headers, "x-sentry-rate-limits").map(str::to_owned);

        match response.text().await {
            Err(err) => {
                sentinel_debug!("[Transport] Failed to read response: {}", err);
            }
            Ok(text) => {
                sentinel_debug!("[Transport] Got response {}: `{}`", status, text);
            }
        }

        if status.is_success() {
            TransportResult::Success
        } else {
            TransportResult::Failure {
                status: Some(status.as_u16()),
                retry_after,
                rate_limits,
            }
        }
    }
}
