use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

use crate::protocol::EnvelopeItem;
use crate::Envelope;

/// How long everything is disabled after a `429` without any limit headers.
const DEFAULT_LIMIT: Duration = Duration::from_secs(60);

/// A Utility that helps with rate limiting requests to the collector.
#[derive(Debug, Default)]
pub struct RateLimiter {
    global: Option<SystemTime>,
    error: Option<SystemTime>,
    session: Option<SystemTime>,
    attachment: Option<SystemTime>,
}

/// Stores `new_time` unless an equal or later expiry is already known.
fn extend(slot: &mut Option<SystemTime>, new_time: SystemTime) {
    match slot {
        Some(current) if *current >= new_time => {}
        _ => *slot = Some(new_time),
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs(value.clamp(0.0, u32::MAX as f64).ceil() as u64)
}

/// Parses a `Retry-After` header.
///
/// The header is either a number of seconds or an HTTP date.  A date in the
/// past yields a zero delay.
pub fn parse_retry_after(header: &str) -> Option<Duration> {
    let header = header.trim();
    if let Ok(value) = header.parse::<f64>() {
        Some(seconds(value))
    } else if let Ok(value) = parse_http_date(header) {
        Some(value.duration_since(SystemTime::now()).unwrap_or_default())
    } else {
        None
    }
}

impl RateLimiter {
    /// Create a new RateLimiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the RateLimiter with the delay of a `Retry-After` header.
    ///
    /// The delay applies to all categories.
    pub fn update_from_retry_after(&mut self, delay: Duration) {
        extend(&mut self.global, SystemTime::now() + delay);
    }

    /// Updates the RateLimiter with information from a `X-Sentry-Rate-Limits` header.
    pub fn update_from_sentry_header(&mut self, header: &str) {
        // <rate-limit> = (<group>,)+
        // <group> = <time>:(<category>;)+:<scope>(:<reason>)?

        let mut parse_group = |group: &str| {
            let mut splits = group.split(':');
            let delay = splits.next()?.trim().parse::<f64>().ok()?;
            let categories = splits.next()?;
            let _scope = splits.next()?;

            let new_time = SystemTime::now() + seconds(delay);

            if categories.is_empty() {
                extend(&mut self.global, new_time);
            }

            for category in categories.split(';') {
                match category {
                    "error" => extend(&mut self.error, new_time),
                    "session" => extend(&mut self.session, new_time),
                    "attachment" => extend(&mut self.attachment, new_time),
                    _ => {}
                }
            }
            Some(())
        };

        for group in header.split(',') {
            parse_group(group.trim());
        }
    }

    /// Applies the default limit of a `429` response that carried no headers.
    pub fn update_from_429(&mut self) {
        extend(&mut self.global, SystemTime::now() + DEFAULT_LIMIT);
    }

    /// Query the RateLimiter for a certain category of event.
    ///
    /// Returns how long the category stays disabled.
    pub fn is_disabled(&self, category: RateLimitingCategory) -> Option<Duration> {
        if let Some(ts) = self.global {
            let time_left = ts.duration_since(SystemTime::now()).ok();
            if time_left.is_some() {
                return time_left;
            }
        }
        let time_left = match category {
            RateLimitingCategory::Any => self.global,
            RateLimitingCategory::Error => self.error,
            RateLimitingCategory::Session => self.session,
            RateLimitingCategory::Attachment => self.attachment,
        }?;
        time_left.duration_since(SystemTime::now()).ok()
    }

    /// The longest remaining limit over all categories.
    pub fn longest_limit(&self) -> Option<Duration> {
        [self.global, self.error, self.session, self.attachment]
            .into_iter()
            .flatten()
            .filter_map(|ts| ts.duration_since(SystemTime::now()).ok())
            .max()
    }

    /// Returns true while the category is rate limited.
    pub fn is_retry_after(&self, category: RateLimitingCategory) -> bool {
        self.is_disabled(category).is_some()
    }

    /// The time the envelope has to wait before it may be sent.
    ///
    /// An envelope is held back while any of its items is limited.
    pub fn envelope_disabled(&self, envelope: &Envelope) -> Option<Duration> {
        envelope
            .items()
            .map(RateLimitingCategory::from_item)
            .chain(std::iter::once(RateLimitingCategory::Any))
            .filter_map(|category| self.is_disabled(category))
            .max()
    }
}

/// The Category of payload that a Rate Limit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RateLimitingCategory {
    /// Rate Limit for any kind of payload.
    Any,
    /// Rate Limit pertaining to Errors.
    Error,
    /// Rate Limit pertaining to Sessions.
    Session,
    /// Rate Limit pertaining to Attachments.
    Attachment,
}

impl RateLimitingCategory {
    /// The category an envelope item is counted against.
    pub fn from_item(item: &EnvelopeItem) -> Self {
        match item {
            EnvelopeItem::Event(_) => RateLimitingCategory::Error,
            EnvelopeItem::SessionUpdate(_) => RateLimitingCategory::Session,
            EnvelopeItem::Attachment(_) => RateLimitingCategory::Attachment,
            _ => RateLimitingCategory::Any,
        }
    }
}
