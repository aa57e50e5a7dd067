//! Accessor over a received response.
//!
//! # Design
//! Status and headers are captured when the response arrives; the body stays
//! an unread stream until somebody asks for it. `text()` drains the stream
//! once and keeps the string, `json()` parses that string once and keeps the
//! result, including a failed parse (as `None`), so callers can fall back to
//! the raw text without re-reading anything.
//!
//! Dropping a `Response` drops its stream, which releases the connection.

use std::fmt;
use std::io::{Cursor, Read};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, WeixinError};

pub type BodyReader = Box<dyn Read + Send + Sync + 'static>;

pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<BodyReader>,
    text: Option<String>,
    json: Option<Option<Value>>,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Read + Send + Sync + 'static) -> Self {
        Self {
            status,
            headers,
            body: Some(Box::new(body)),
            text: None,
            json: None,
        }
    }

    pub(crate) fn from_ureq(response: ureq::Response) -> Self {
        Self::from_http(response.into())
    }

    /// Header values are decoded lossily: servers put raw UTF-8 file names in
    /// `Content-Disposition`, and those must not be dropped.
    pub(crate) fn from_http(response: http::Response<BodyReader>) -> Self {
        let (parts, body) = response.into_parts();
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).trim().to_string(),
                )
            })
            .collect();
        Self {
            status: parts.status.as_u16(),
            headers,
            body: Some(body),
            text: None,
            json: None,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")?.trim().parse().ok()
    }

    /// The body as text, read on first call.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    pub fn text(&mut self) -> Result<&str, WeixinError> {
        if self.text.is_none() {
            let mut bytes = Vec::new();
            if let Some(mut body) = self.body.take() {
                body.read_to_end(&mut bytes)
                    .map_err(|e| WeixinError::transport("reading response body", e))?;
            }
            self.text = Some(match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            });
        }
        Ok(self.text.as_deref().unwrap_or_default())
    }

    /// The body parsed as JSON, or `None` when it is not JSON.
    pub fn json(&mut self) -> Result<Option<&Value>, WeixinError> {
        if self.json.is_none() {
            let parsed = serde_json::from_str::<Value>(self.text()?).ok();
            self.json = Some(parsed);
        }
        Ok(self.json.as_ref().and_then(Option::as_ref))
    }

    pub fn into_text(mut self) -> Result<String, WeixinError> {
        self.text()?;
        Ok(self.text.take().unwrap_or_default())
    }

    /// Hand the body stream to the caller. If the body was already read as
    /// text, the stream replays those bytes.
    pub fn into_reader(mut self) -> BodyReader {
        match (self.text.take(), self.body.take()) {
            (Some(text), _) => Box::new(Cursor::new(text.into_bytes())),
            (None, Some(body)) => body,
            (None, None) => Box::new(std::io::empty()),
        }
    }

    /// Interpret the body as a platform JSON reply: a non-zero `errcode`
    /// becomes `WeixinError::Api`, anything else is the parsed value.
    pub fn into_api_result(mut self) -> Result<Value, WeixinError> {
        let status = self.status;
        let parsed = self.json()?.cloned();
        let value = match parsed {
            Some(value) => value,
            None => {
                let text = self.text()?;
                return Err(WeixinError::Deserialization(format!(
                    "HTTP {status} body is not JSON: {}",
                    preview(text)
                )));
            }
        };
        match ApiError::from_envelope(&value) {
            Some(err) => Err(err.into()),
            None => Ok(value),
        }
    }

    /// Map the JSON body into a caller type.
    pub fn deserialize<T: DeserializeOwned>(&mut self) -> Result<T, WeixinError> {
        serde_json::from_str(self.text()?).map_err(|e| WeixinError::Deserialization(e.to_string()))
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_read", &self.text.is_some())
            .finish()
    }
}

fn preview(text: &str) -> &str {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        return text;
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn response(content_type: &str, body: &str) -> Response {
        Response::new(
            200,
            vec![("content-type".to_string(), content_type.to_string())],
            Cursor::new(body.as_bytes().to_vec()),
        )
    }

    /// Counts how many times the body is read from.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = response("application/json", "{}");
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        assert_eq!(resp.content_type(), Some("application/json"));
        assert!(resp.header("Content-Disposition").is_none());
    }

    #[test]
    fn text_is_read_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut resp = Response::new(
            200,
            Vec::new(),
            CountingReader {
                inner: Cursor::new(b"hello".to_vec()),
                reads: reads.clone(),
            },
        );
        assert_eq!(resp.text().unwrap(), "hello");
        let after_first = reads.load(Ordering::SeqCst);
        assert_eq!(resp.text().unwrap(), "hello");
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn malformed_json_is_none_and_text_survives() {
        let mut resp = response("application/json", "{not json");
        assert!(resp.json().unwrap().is_none());
        assert!(resp.json().unwrap().is_none());
        assert_eq!(resp.text().unwrap(), "{not json");
    }

    #[test]
    fn json_is_parsed() {
        let mut resp = response("application/json", r#"{"access_token":"abc","expires_in":7200}"#);
        let value = resp.json().unwrap().unwrap();
        assert_eq!(value["expires_in"], 7200);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut resp = Response::new(200, Vec::new(), Cursor::new(vec![b'o', b'k', 0xff]));
        assert_eq!(resp.text().unwrap(), "ok\u{fffd}");
    }

    #[test]
    fn api_result_success() {
        let value = response("application/json", r#"{"errcode":0,"errmsg":"ok"}"#)
            .into_api_result()
            .unwrap();
        assert_eq!(value["errmsg"], "ok");
    }

    #[test]
    fn api_result_error() {
        let err = response("application/json", r#"{"errcode":40001,"errmsg":"invalid credential"}"#)
            .into_api_result()
            .unwrap_err();
        match err {
            WeixinError::Api(api) => {
                assert_eq!(api.code, 40001);
                assert_eq!(api.message, "invalid credential");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn api_result_rejects_non_json() {
        let err = response("text/html", "<html>busy</html>").into_api_result().unwrap_err();
        assert!(matches!(err, WeixinError::Deserialization(_)));
    }

    #[test]
    fn deserialize_into_caller_type() {
        #[derive(Deserialize)]
        struct Token {
            access_token: String,
            expires_in: u32,
        }
        let mut resp = response("application/json", r#"{"access_token":"abc","expires_in":7200}"#);
        let token: Token = resp.deserialize().unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 7200);
    }

    #[test]
    fn into_reader_replays_text_already_read() {
        let mut resp = response("text/plain", "payload");
        resp.text().unwrap();
        let mut out = String::new();
        resp.into_reader().read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");
    }

    #[test]
    fn non_ascii_header_values_are_kept() {
        let disposition = http::HeaderValue::from_bytes("attachment; filename=\"报告.pdf\"".as_bytes()).unwrap();
        let body: BodyReader = Box::new(Cursor::new(b"%PDF".to_vec()));
        let resp = Response::from_http(
            http::Response::builder()
                .status(200)
                .header("Content-Type", "application/pdf")
                .header("Content-Disposition", disposition)
                .body(body)
                .unwrap(),
        );
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.content_type(), Some("application/pdf"));
        assert_eq!(resp.header("Content-Disposition"), Some("attachment; filename=\"报告.pdf\""));
    }

    #[test]
    fn failing_body_is_a_transport_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
            }
        }
        let mut resp = Response::new(200, Vec::new(), Broken);
        assert!(matches!(resp.text(), Err(WeixinError::Transport { .. })));
    }
}
