//! Response classification.
//!
//! # Design
//! The platform answers a media request in one of four shapes and only the
//! `Content-Type` says which. Rules are tried top to bottom, first match wins:
//!
//! 1. `text/plain`: a body mentioning `video_url` is parsed as JSON and read
//!    as an envelope; anything else is kept raw.
//! 2. `application/json`: parsed and read as an envelope; unparseable bodies
//!    are kept raw.
//! 3. anything else with a 2xx status: a binary attachment whose stream is
//!    left open for the caller.
//! 4. anything else: kept raw.
//!
//! An envelope is an `Error` when `errcode != 0`, a `Redirect` when it
//! carries a `video_url`, and `Raw` otherwise.

use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, WeixinError};
use crate::response::Response;
use crate::types::{disposition_file_name, Attachment};

/// Field naming the second resource to fetch.
pub const INDIRECTION_FIELD: &str = "video_url";

#[derive(Debug)]
pub enum Classification {
    /// `errcode != 0`.
    Error(ApiError),
    /// The real content lives at this URL.
    Redirect(String),
    /// A binary body with its stream still open.
    Attachment(Attachment),
    /// A body with no error envelope and no indirection. JSON calls treat
    /// this as success; downloads treat it as an unrecognised reply.
    Raw(RawBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBody {
    pub status: u16,
    pub text: String,
    pub json: Option<Value>,
}

impl Classification {
    /// Collapse into the attachment handed back by a download.
    pub fn into_attachment(self) -> Attachment {
        match self {
            Classification::Attachment(attachment) => attachment,
            Classification::Error(err) => Attachment::error(err.message),
            Classification::Raw(raw) if raw.text.is_empty() => {
                Attachment::error(format!("empty response with HTTP status {}", raw.status))
            }
            Classification::Raw(raw) => Attachment::error(raw.text),
            Classification::Redirect(url) => {
                Attachment::error(format!("unfollowed {INDIRECTION_FIELD} indirection to {url}"))
            }
        }
    }
}

pub fn classify(mut response: Response) -> Result<Classification, WeixinError> {
    let status = response.status();
    let content_type = response.content_type().unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("text/plain") {
        debug!(status, "classifying text/plain response");
        let text = response.text()?.to_string();
        if !text.contains(INDIRECTION_FIELD) {
            return Ok(raw(status, text, None));
        }
        return Ok(match serde_json::from_str::<Value>(&text) {
            Ok(value) => envelope(status, text, value),
            Err(_) => raw(status, text, None),
        });
    }

    if content_type.contains("application/json") {
        debug!(status, "classifying application/json response");
        let text = response.text()?.to_string();
        return Ok(match serde_json::from_str::<Value>(&text) {
            Ok(value) => envelope(status, text, value),
            Err(_) => raw(status, text, None),
        });
    }

    if !(200..300).contains(&status) {
        debug!(status, %content_type, "non-success response with binary content type");
        let text = response.into_text()?;
        return Ok(raw(status, text, None));
    }

    let full_name = response
        .header("Content-Disposition")
        .and_then(disposition_file_name)
        .unwrap_or_default();
    let content_length = response.content_length();
    let content_type = response.content_type().map(str::to_string);
    debug!(status, file = %full_name, ?content_length, "classified as binary attachment");

    let stream = std::io::BufReader::new(response.into_reader());
    Ok(Classification::Attachment(Attachment::stream(
        full_name,
        content_type,
        content_length,
        stream,
    )))
}

fn envelope(status: u16, text: String, value: Value) -> Classification {
    if let Some(err) = ApiError::from_envelope(&value) {
        return Classification::Error(err);
    }
    match value.get(INDIRECTION_FIELD).and_then(Value::as_str) {
        Some(url) if !url.is_empty() => Classification::Redirect(url.to_string()),
        _ => raw(status, text, Some(value)),
    }
}

fn raw(status: u16, text: String, json: Option<Value>) -> Classification {
    Classification::Raw(RawBody { status, text, json })
}
