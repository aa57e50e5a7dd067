//! Downloaded attachment outcome.
//!
//! # Design
//! An attachment is either an open byte stream or an error message, never
//! both and never neither; `AttachmentBody` makes the other combinations
//! unrepresentable. When a stream is present the caller owns it: dropping the
//! attachment (or the stream) closes the underlying connection.

use std::fmt;
use std::io::Read;

use crate::response::BodyReader;

pub enum AttachmentBody {
    Stream(BodyReader),
    Error(String),
}

pub struct Attachment {
    /// Name without the extension, e.g. `report`.
    pub file_name: String,
    /// Extension without the dot, e.g. `pdf`.
    pub suffix: String,
    /// Name as announced by `Content-Disposition`, e.g. `report.pdf`.
    pub full_name: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: AttachmentBody,
}

impl Attachment {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            file_name: String::new(),
            suffix: String::new(),
            full_name: String::new(),
            content_type: None,
            content_length: None,
            body: AttachmentBody::Error(message.into()),
        }
    }

    pub fn stream(
        full_name: impl Into<String>,
        content_type: Option<String>,
        content_length: Option<u64>,
        stream: impl Read + Send + Sync + 'static,
    ) -> Self {
        let full_name = full_name.into();
        let (file_name, suffix) = split_file_name(&full_name);
        Self {
            file_name: file_name.to_string(),
            suffix: suffix.to_string(),
            full_name,
            content_type,
            content_length,
            body: AttachmentBody::Stream(Box::new(stream)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, AttachmentBody::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            AttachmentBody::Error(message) => Some(message),
            AttachmentBody::Stream(_) => None,
        }
    }

    pub fn file_stream(&mut self) -> Option<&mut BodyReader> {
        match &mut self.body {
            AttachmentBody::Stream(stream) => Some(stream),
            AttachmentBody::Error(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<BodyReader> {
        match self.body {
            AttachmentBody::Stream(stream) => Some(stream),
            AttachmentBody::Error(_) => None,
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Attachment");
        s.field("full_name", &self.full_name)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length);
        match &self.body {
            AttachmentBody::Stream(_) => s.field("file_stream", &"<open>"),
            AttachmentBody::Error(message) => s.field("error_message", message),
        };
        s.finish()
    }
}

/// Extract `filename` from a `Content-Disposition` value.
///
/// Accepts the quoted form (`filename="a b.pdf"`) and the bare token form
/// (`filename=a.pdf`).
pub fn disposition_file_name(disposition: &str) -> Option<String> {
    let start = disposition.find("filename=")? + "filename=".len();
    let rest = &disposition[start..];
    let name = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or_default(),
        None => rest.split(';').next().unwrap_or_default().trim(),
    };
    Some(name.to_string())
}

/// Split on the last `.`: `report.pdf` → (`report`, `pdf`). A name without a
/// dot has an empty suffix.
pub fn split_file_name(full_name: &str) -> (&str, &str) {
    match full_name.rfind('.') {
        Some(dot) => (&full_name[..dot], &full_name[dot + 1..]),
        None => (full_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn quoted_file_name() {
        assert_eq!(
            disposition_file_name(r#"attachment; filename="report.pdf""#).as_deref(),
            Some("report.pdf")
        );
    }

    #[test]
    fn bare_file_name() {
        assert_eq!(
            disposition_file_name("attachment; filename=MEDIA_01.jpg; size=3").as_deref(),
            Some("MEDIA_01.jpg")
        );
    }

    #[test]
    fn disposition_without_file_name() {
        assert!(disposition_file_name("inline").is_none());
    }

    #[test]
    fn split_on_last_dot() {
        assert_eq!(split_file_name("report.pdf"), ("report", "pdf"));
        assert_eq!(split_file_name("archive.tar.gz"), ("archive.tar", "gz"));
        assert_eq!(split_file_name("README"), ("README", ""));
    }

    #[test]
    fn stream_attachment_derives_names() {
        let mut attachment = Attachment::stream(
            "report.pdf",
            Some("application/pdf".into()),
            Some(4),
            Cursor::new(b"%PDF".to_vec()),
        );
        assert_eq!(attachment.file_name, "report");
        assert_eq!(attachment.suffix, "pdf");
        assert!(!attachment.is_error());
        assert!(attachment.error_message().is_none());

        let mut bytes = Vec::new();
        attachment.file_stream().unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"%PDF");
    }

    #[test]
    fn error_attachment_has_no_stream() {
        let attachment = Attachment::error("invalid media_id");
        assert!(attachment.is_error());
        assert_eq!(attachment.error_message(), Some("invalid media_id"));
        assert!(attachment.into_stream().is_none());
    }
}
