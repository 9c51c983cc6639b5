use std::fmt;

/// The different types an attachment can have.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum AttachmentType {
    /// (default) A standard attachment without special meaning.
    #[default]
    Attachment,
    /// A minidump file produced by a native crash handler.
    Minidump,
    /// A plain-text log file collected alongside the event.
    Logs,
}

impl AttachmentType {
    /// Gets the string value the collector expects for the attachment type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attachment => "event.attachment",
            Self::Minidump => "event.minidump",
            Self::Logs => "event.logs",
        }
    }

    /// Parses the header value written by [`AttachmentType::as_str`].
    pub fn from_header(value: &str) -> Option<Self> {
        Some(match value {
            "event.attachment" => Self::Attachment,
            "event.minidump" => Self::Minidump,
            "event.logs" => Self::Logs,
            _ => return None,
        })
    }
}

/// Represents an attachment item.
#[derive(Clone, PartialEq)]
pub struct Attachment {
    /// The actual attachment data.
    pub buffer: Vec<u8>,
    /// The filename of the attachment.
    pub filename: String,
    /// The Content Type of the attachment
    pub content_type: Option<String>,
    /// The special type of this attachment.
    pub ty: Option<AttachmentType>,
}

// Implement Debug manually, otherwise users will be sad when they get a dump
// of decimal encoded bytes to their console
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("buffer", &self.buffer.len())
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("type", &self.ty)
            .finish()
    }
}
