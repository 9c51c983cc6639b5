use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Attachment, AttachmentType, Event, SessionUpdate};
use crate::utils::ts_rfc3339_opt;
use crate::Dsn;

/// Raised if a envelope cannot be parsed from a given input.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Missing envelope header
    #[error("missing envelope header")]
    MissingHeader,
    /// Missing newline after header or payload
    #[error("missing newline after header or payload")]
    MissingNewline,
    /// Invalid envelope header
    #[error("invalid envelope header")]
    InvalidHeader(#[source] serde_json::Error),
    /// Invalid item header
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
    /// Invalid item payload
    #[error("invalid item payload")]
    InvalidItemPayload(#[source] serde_json::Error),
    /// The envelope could not be read from disk
    #[error("failed to read envelope")]
    Io(#[from] std::io::Error),
}

#[derive(Default, Serialize, Deserialize)]
struct EnvelopeHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dsn: Option<Dsn>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_rfc3339_opt"
    )]
    sent_at: Option<SystemTime>,
}

/// An Envelope Item Header.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeItemHeader {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<usize>,
    // Fields below apply only to Attachment Item type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

impl EnvelopeItemHeader {
    fn new(ty: &str, length: usize) -> Self {
        EnvelopeItemHeader {
            ty: ty.to_owned(),
            length: Some(length),
            filename: None,
            attachment_type: None,
            content_type: None,
        }
    }
}

/// An Envelope Item.
#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum EnvelopeItem {
    /// An Event Item.
    Event(Event),
    /// A Session Item.
    SessionUpdate(SessionUpdate),
    /// An Attachment Item.
    Attachment(Attachment),
    /// An item of a type this crate does not model.
    ///
    /// The type and payload are kept verbatim so the item survives a trip
    /// through the disk cache.
    Other {
        /// The item type from the header.
        ty: String,
        /// The raw payload bytes.
        payload: Vec<u8>,
    },
}

impl EnvelopeItem {
    /// The wire name of this item type.
    pub fn ty(&self) -> &str {
        match self {
            EnvelopeItem::Event(_) => "event",
            EnvelopeItem::SessionUpdate(_) => "session",
            EnvelopeItem::Attachment(_) => "attachment",
            EnvelopeItem::Other { ty, .. } => ty,
        }
    }
}

impl From<Event> for EnvelopeItem {
    fn from(event: Event) -> Self {
        EnvelopeItem::Event(event)
    }
}

impl From<SessionUpdate> for EnvelopeItem {
    fn from(session: SessionUpdate) -> Self {
        EnvelopeItem::SessionUpdate(session)
    }
}

impl From<Attachment> for EnvelopeItem {
    fn from(attachment: Attachment) -> Self {
        EnvelopeItem::Attachment(attachment)
    }
}

/// An Envelope.
///
/// The envelope is the unit of delivery and of on-disk persistence.  It
/// contains an ordered list of items, some of which are related (an event and
/// its attachments), others independent (session updates).
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Envelope {
    event_id: Option<Uuid>,
    dsn: Option<Dsn>,
    sent_at: Option<SystemTime>,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Creates a new empty Envelope.
    pub fn new() -> Envelope {
        Default::default()
    }

    /// Add a new Envelope Item.
    pub fn add_item<I>(&mut self, item: I)
    where
        I: Into<EnvelopeItem>,
    {
        let item = item.into();
        if self.event_id.is_none() {
            if let EnvelopeItem::Event(ref event) = item {
                self.event_id = Some(event.event_id);
            }
        }
        self.items.push(item);
    }

    /// Create an [`Iterator`] over all the [`EnvelopeItem`]s.
    pub fn items(&self) -> std::slice::Iter<'_, EnvelopeItem> {
        self.items.iter()
    }

    /// Mutable access to the items, in order.
    pub fn items_mut(&mut self) -> std::slice::IterMut<'_, EnvelopeItem> {
        self.items.iter_mut()
    }

    /// Returns true if the envelope has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the Envelopes Uuid, if any.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.event_id.as_ref()
    }

    /// Returns the DSN this envelope was addressed to, if recorded.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref()
    }

    /// Records the DSN in the envelope header.
    pub fn set_dsn(&mut self, dsn: Option<Dsn>) {
        self.dsn = dsn;
    }

    /// Returns when the envelope was handed to the network, if recorded.
    pub fn sent_at(&self) -> Option<SystemTime> {
        self.sent_at
    }

    /// Records the time the envelope is handed to the network.
    pub fn set_sent_at(&mut self, sent_at: SystemTime) {
        self.sent_at = Some(sent_at);
    }

    /// Returns the [`Event`] contained in this Envelope, if any.
    pub fn event(&self) -> Option<&Event> {
        self.items.iter().find_map(|item| match item {
            EnvelopeItem::Event(event) => Some(event),
            _ => None,
        })
    }

    /// Returns every session update contained in this Envelope.
    pub fn session_updates(&self) -> impl Iterator<Item = &SessionUpdate> {
        self.items.iter().filter_map(|item| match item {
            EnvelopeItem::SessionUpdate(session) => Some(session),
            _ => None,
        })
    }

    /// Returns true if the envelope consists of exactly one event item.
    pub fn is_single_event(&self) -> bool {
        matches!(self.items.as_slice(), [EnvelopeItem::Event(_)])
    }

    /// Filters the Envelope's [`EnvelopeItem`]s based on a predicate,
    /// and returns a new Envelope containing only the filtered items.
    ///
    /// Attachments are only kept if an event survives the filter.
    /// [`None`] is returned if no items remain in the Envelope after filtering.
    pub fn filter<P>(self, mut predicate: P) -> Option<Self>
    where
        P: FnMut(&EnvelopeItem) -> bool,
    {
        let mut filtered = Envelope {
            dsn: self.dsn,
            sent_at: self.sent_at,
            ..Default::default()
        };
        for item in self.items {
            if predicate(&item) {
                filtered.add_item(item);
            }
        }

        // attachments do not make any sense without an event
        if filtered.uuid().is_none() {
            filtered
                .items
                .retain(|item| !matches!(item, EnvelopeItem::Attachment(..)))
        }

        if filtered.items.is_empty() {
            None
        } else {
            Some(filtered)
        }
    }

    /// Serialize the Envelope into the given [`Write`].
    pub fn to_writer<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        let header = EnvelopeHeader {
            event_id: self.event_id,
            dsn: self.dsn.clone(),
            sent_at: self.sent_at,
        };
        serde_json::to_writer(&mut writer, &header)?;
        writeln!(writer)?;

        let mut item_buf = Vec::new();
        for item in &self.items {
            // we write them to a temporary buffer first, since we need their length
            let header = match item {
                EnvelopeItem::Event(event) => {
                    serde_json::to_writer(&mut item_buf, event)?;
                    EnvelopeItemHeader::new("event", item_buf.len())
                }
                EnvelopeItem::SessionUpdate(session) => {
                    serde_json::to_writer(&mut item_buf, session)?;
                    EnvelopeItemHeader::new("session", item_buf.len())
                }
                EnvelopeItem::Attachment(attachment) => {
                    item_buf.extend_from_slice(&attachment.buffer);
                    EnvelopeItemHeader {
                        filename: Some(attachment.filename.clone()),
                        attachment_type: Some(attachment.ty.unwrap_or_default().as_str().into()),
                        content_type: attachment.content_type.clone(),
                        ..EnvelopeItemHeader::new("attachment", item_buf.len())
                    }
                }
                EnvelopeItem::Other { ty, payload } => {
                    item_buf.extend_from_slice(payload);
                    EnvelopeItemHeader::new(ty, item_buf.len())
                }
            };
            serde_json::to_writer(&mut writer, &header)?;
            writeln!(writer)?;
            writer.write_all(&item_buf)?;
            writeln!(writer)?;
            item_buf.clear();
        }

        Ok(())
    }

    /// Serializes the Envelope into a freshly allocated buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // writing into a `Vec` only fails if serialization of our own types fails
        let _ = self.to_writer(&mut buf);
        buf
    }

    /// Creates a new Envelope from slice.
    pub fn from_slice(slice: &[u8]) -> Result<Envelope, EnvelopeError> {
        let (header, offset) = Self::parse_header(slice)?;
        let items = Self::parse_items(slice, offset)?;

        let mut envelope = Envelope {
            event_id: header.event_id,
            dsn: header.dsn,
            sent_at: header.sent_at,
            ..Default::default()
        };

        for item in items {
            envelope.add_item(item);
        }

        Ok(envelope)
    }

    /// Creates a new Envelope from path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Envelope, EnvelopeError> {
        let bytes = std::fs::read(path)?;
        Envelope::from_slice(&bytes)
    }

    fn parse_header(slice: &[u8]) -> Result<(EnvelopeHeader, usize), EnvelopeError> {
        let mut stream = serde_json::Deserializer::from_slice(slice).into_iter();

        let header: EnvelopeHeader = match stream.next() {
            None => return Err(EnvelopeError::MissingHeader),
            Some(Err(error)) => return Err(EnvelopeError::InvalidHeader(error)),
            Some(Ok(header)) => header,
        };

        // Each header is terminated by a UNIX newline.
        Self::require_newline(slice, stream.byte_offset())?;

        Ok((header, stream.byte_offset() + 1))
    }

    fn parse_items(slice: &[u8], mut offset: usize) -> Result<Vec<EnvelopeItem>, EnvelopeError> {
        let mut items = Vec::new();

        while offset < slice.len() {
            let bytes = slice.get(offset..).ok_or(EnvelopeError::UnexpectedEof)?;
            let (item, item_size) = Self::parse_item(bytes)?;
            offset += item_size;
            items.push(item);
        }

        Ok(items)
    }

    fn parse_item(slice: &[u8]) -> Result<(EnvelopeItem, usize), EnvelopeError> {
        let mut stream = serde_json::Deserializer::from_slice(slice).into_iter();

        let header: EnvelopeItemHeader = match stream.next() {
            None => return Err(EnvelopeError::UnexpectedEof),
            Some(Err(error)) => return Err(EnvelopeError::InvalidItemHeader(error)),
            Some(Ok(header)) => header,
        };

        // Each header is terminated by a UNIX newline.
        let header_end = stream.byte_offset();
        Self::require_newline(slice, header_end)?;

        let payload_start = header_end + 1;
        let payload_end = match header.length {
            Some(len) => {
                let payload_end = payload_start + len;
                if slice.len() < payload_end {
                    return Err(EnvelopeError::UnexpectedEof);
                }

                // The newline after the last payload is optional.
                Self::require_termination(slice, payload_end)?;
                payload_end
            }
            None => slice[payload_start..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(slice.len(), |relative_end| payload_start + relative_end),
        };

        let payload = &slice[payload_start..payload_end];

        let item = match header.ty.as_str() {
            "event" => serde_json::from_slice(payload).map(EnvelopeItem::Event),
            "session" => serde_json::from_slice(payload).map(EnvelopeItem::SessionUpdate),
            "attachment" => Ok(EnvelopeItem::Attachment(Attachment {
                buffer: payload.to_owned(),
                filename: header.filename.unwrap_or_default(),
                content_type: header.content_type,
                ty: header
                    .attachment_type
                    .as_deref()
                    .and_then(AttachmentType::from_header),
            })),
            _ => Ok(EnvelopeItem::Other {
                ty: header.ty,
                payload: payload.to_owned(),
            }),
        }
        .map_err(EnvelopeError::InvalidItemPayload)?;

        Ok((item, payload_end + 1))
    }

    fn require_newline(slice: &[u8], offset: usize) -> Result<(), EnvelopeError> {
        match slice.get(offset) {
            Some(&b'\n') => Ok(()),
            Some(_) => Err(EnvelopeError::MissingNewline),
            None => Err(EnvelopeError::UnexpectedEof),
        }
    }

    fn require_termination(slice: &[u8], offset: usize) -> Result<(), EnvelopeError> {
        match slice.get(offset) {
            Some(&b'\n') | None => Ok(()),
            Some(_) => Err(EnvelopeError::MissingNewline),
        }
    }
}

impl<T> From<T> for Envelope
where
    T: Into<EnvelopeItem>,
{
    fn from(item: T) -> Self {
        let mut envelope = Self::default();
        envelope.add_item(item.into());
        envelope
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use std::time::Duration;

    use super::*;
    use crate::protocol::{Level, SessionAttributes, SessionStatus};

    fn to_str(envelope: Envelope) -> String {
        String::from_utf8(envelope.to_vec()).unwrap()
    }

    fn timestamp(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_empty() {
        assert_eq!(to_str(Envelope::new()), "{}\n");
    }

    #[test]
    fn test_event() {
        let event_id = Uuid::parse_str("22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c").unwrap();
        let event = Event {
            event_id,
            timestamp: timestamp(1595256674),
            ..Default::default()
        };
        let envelope: Envelope = event.into();
        assert!(envelope.is_single_event());
        assert_eq!(
            to_str(envelope),
            r#"{"event_id":"22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c"}
{"type":"event","length":70}
{"event_id":"22d00b3fd1b14b5d8d2049d138cd8a9c","timestamp":1595256674}
"#
        )
    }

    #[test]
    fn test_session() {
        let session_id = Uuid::parse_str("22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c").unwrap();
        let session = SessionUpdate {
            session_id,
            distinct_id: Some("foo@bar.baz".to_owned()),
            sequence: None,
            timestamp: None,
            started: timestamp(1595256674),
            init: true,
            duration: Some(1.234),
            status: SessionStatus::Ok,
            errors: 123,
            attributes: SessionAttributes {
                release: "foo-bar@1.2.3".into(),
                environment: Some("production".into()),
                ip_address: None,
                user_agent: None,
            },
        };
        let mut envelope: Envelope = session.into();
        assert!(!envelope.is_single_event());
        envelope.set_sent_at(timestamp(1595256675));

        assert_eq!(
            to_str(envelope),
            r#"{"sent_at":"2020-07-20T14:51:15Z"}
{"type":"session","length":218}
{"sid":"22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c","did":"foo@bar.baz","started":"2020-07-20T14:51:14Z","init":true,"duration":1.234,"status":"ok","errors":123,"attrs":{"release":"foo-bar@1.2.3","environment":"production"}}
"#
        )
    }

    #[test]
    fn test_event_with_attachment() {
        let event_id = Uuid::parse_str("22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c").unwrap();
        let mut envelope: Envelope = Event {
            event_id,
            timestamp: timestamp(1595256674),
            ..Default::default()
        }
        .into();
        envelope.add_item(Attachment {
            buffer: "some content".as_bytes().to_vec(),
            filename: "file.txt".to_string(),
            content_type: None,
            ty: None,
        });

        assert_eq!(
            to_str(envelope),
            r#"{"event_id":"22d00b3f-d1b1-4b5d-8d20-49d138cd8a9c"}
{"type":"event","length":70}
{"event_id":"22d00b3fd1b14b5d8d2049d138cd8a9c","timestamp":1595256674}
{"type":"attachment","length":12,"filename":"file.txt","attachment_type":"event.attachment"}
some content
"#
        )
    }

    #[test]
    fn test_deserialize_envelope_empty() {
        let bytes = b"{\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}\n";
        let envelope = Envelope::from_slice(bytes).unwrap();

        let event_id = Uuid::from_str("9ec79c33ec9942ab8353589fcb2e04dc").unwrap();
        assert_eq!(envelope.event_id, Some(event_id));
        assert_eq!(envelope.items().count(), 0);
    }

    #[test]
    fn test_deserialize_envelope_empty_item_eof() {
        let bytes = b"\
             {\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}\n\
             {\"type\":\"attachment\",\"length\":0}\n\
             \n\
             {\"type\":\"attachment\",\"length\":0}\n\
             ";

        let envelope = Envelope::from_slice(bytes).unwrap();
        assert_eq!(envelope.items().count(), 2);
        for item in envelope.items() {
            match item {
                EnvelopeItem::Attachment(attachment) => assert!(attachment.buffer.is_empty()),
                other => panic!("invalid item type: {other:?}"),
            }
        }
    }

    #[test]
    fn test_deserialize_envelope_implicit_length() {
        let bytes = b"\
             {\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}\n\
             {\"type\":\"attachment\"}\n\
             helloworld\n\
             ";

        let envelope = Envelope::from_slice(bytes).unwrap();
        assert_eq!(envelope.items().count(), 1);

        if let Some(EnvelopeItem::Attachment(attachment)) = envelope.items().next() {
            assert_eq!(attachment.buffer, b"helloworld");
        } else {
            panic!("invalid item type");
        }
    }

    #[test]
    fn test_deserialize_envelope_multiple_items() {
        let bytes = b"\
            {\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\"}\n\
            {\"type\":\"attachment\",\"length\":10,\"content_type\":\"text/plain\",\"filename\":\"hello.txt\"}\n\
            \xef\xbb\xbfHello\r\n\n\
            {\"type\":\"event\",\"length\":41,\"content_type\":\"application/json\",\"filename\":\"application.log\"}\n\
            {\"message\":\"hello world\",\"level\":\"error\"}\n\
            ";

        let envelope = Envelope::from_slice(bytes).unwrap();
        assert_eq!(envelope.items().count(), 2);

        let mut items = envelope.items();

        if let EnvelopeItem::Attachment(attachment) = items.next().unwrap() {
            assert_eq!(attachment.buffer, b"\xef\xbb\xbfHello\r\n");
            assert_eq!(attachment.filename, "hello.txt");
            assert_eq!(attachment.content_type, Some("text/plain".to_string()));
        } else {
            panic!("invalid item type");
        }

        if let EnvelopeItem::Event(event) = items.next().unwrap() {
            assert_eq!(event.message, Some("hello world".to_string()));
            assert_eq!(event.level, Level::Error);
        } else {
            panic!("invalid item type");
        }
    }

    #[test]
    fn test_unknown_items_are_preserved() {
        let bytes = b"{}\n{\"type\":\"client_report\",\"length\":2}\n{}\n";
        let envelope = Envelope::from_slice(bytes).unwrap();
        match envelope.items().next() {
            Some(EnvelopeItem::Other { ty, payload }) => {
                assert_eq!(ty, "client_report");
                assert_eq!(payload, b"{}");
            }
            other => panic!("invalid item type: {other:?}"),
        }
        assert_eq!(envelope.to_vec(), bytes.to_vec());
    }

    #[test]
    fn test_deserialize_serialized() {
        let mut envelope: Envelope = Event {
            event_id: Uuid::new_v4(),
            level: Level::Warning,
            message: Some("disk is full".into()),
            timestamp: timestamp(1595256674),
            ..Default::default()
        }
        .into();
        envelope.add_item(SessionUpdate {
            session_id: Uuid::new_v4(),
            distinct_id: None,
            sequence: None,
            timestamp: Some(timestamp(1595256680)),
            started: timestamp(1595256674),
            init: false,
            duration: None,
            status: SessionStatus::Ok,
            errors: 1,
            attributes: SessionAttributes {
                release: "app@2".into(),
                ..Default::default()
            },
        });
        envelope.add_item(Attachment {
            buffer: b"line one\nline two".to_vec(),
            filename: "app.log".into(),
            content_type: Some("text/plain".into()),
            ty: Some(AttachmentType::Logs),
        });
        envelope.set_dsn(Some("https://public@example.com/1".parse().unwrap()));

        let serialized = envelope.to_vec();
        let deserialized = Envelope::from_slice(&serialized).unwrap();
        assert_eq!(deserialized, envelope);
        assert_eq!(deserialized.session_updates().count(), 1);
    }

    #[test]
    fn test_length_mismatch_fails() {
        // declared length is shorter than the payload
        let bytes = b"{}\n{\"type\":\"attachment\",\"length\":3}\nhello\n";
        assert!(matches!(
            Envelope::from_slice(bytes),
            Err(EnvelopeError::MissingNewline)
        ));

        // declared length runs past the end of the buffer
        let bytes = b"{}\n{\"type\":\"attachment\",\"length\":30}\nhello\n";
        assert!(matches!(
            Envelope::from_slice(bytes),
            Err(EnvelopeError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_invalid_headers_fail() {
        assert!(matches!(
            Envelope::from_slice(b""),
            Err(EnvelopeError::MissingHeader)
        ));
        assert!(matches!(
            Envelope::from_slice(b"{\"event_id\":42}\n"),
            Err(EnvelopeError::InvalidHeader(_))
        ));
        assert!(matches!(
            Envelope::from_slice(b"{} {\"type\":\"event\"}"),
            Err(EnvelopeError::MissingNewline)
        ));
        // headers must be terminated even at the end of the buffer
        assert!(matches!(
            Envelope::from_slice(b"{}"),
            Err(EnvelopeError::UnexpectedEof)
        ));
        assert!(matches!(
            Envelope::from_slice(b"{}\n{\"type\":\"attachment\",\"length\":0}"),
            Err(EnvelopeError::UnexpectedEof)
        ));
        assert!(matches!(
            Envelope::from_slice(b"{}\n{\"type\":\"event\",\"length\":2}\n{]\n"),
            Err(EnvelopeError::InvalidItemPayload(_))
        ));
    }

    #[test]
    fn test_filter_drops_orphan_attachments() {
        let mut envelope: Envelope = Event::new().into();
        envelope.add_item(Attachment {
            buffer: b"x".to_vec(),
            filename: "x.txt".into(),
            content_type: None,
            ty: None,
        });
        let filtered = envelope.filter(|item| !matches!(item, EnvelopeItem::Event(_)));
        assert!(filtered.is_none());
    }
}
