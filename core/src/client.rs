//! Blocking client for the platform API.
//!
//! # Design
//! `HttpsClient` holds only its `Dispatcher` (and through it the immutable
//! `TransportConfig`); it keeps no state between calls and is `Send + Sync`.
//! Every method drives exactly one request end-to-end on the calling thread,
//! except `download`, which may issue one more GET when the platform answers
//! with a `video_url` indirection.
//!
//! Non-200 statuses are never errors at this level: `execute` hands back the
//! `Response` and callers decide from status plus payload. Only setup and
//! transport failures are `Err`.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::classify::{classify, Classification, INDIRECTION_FIELD};
use crate::config::TransportConfig;
use crate::error::WeixinError;
use crate::http::{HttpMethod, Request};
use crate::multipart::{self, MultipartBody};
use crate::response::Response;
use crate::tls::{TlsIdentity, TlsTrustStrategy};
use crate::transport::{checked_url, redact, Dispatcher};
use crate::types::Attachment;

#[derive(Debug, Clone, Default)]
pub struct HttpsClient {
    dispatcher: Dispatcher,
}

impl HttpsClient {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
        }
    }

    /// Build a client from `WEIXIN_*` environment variables.
    pub fn from_env() -> Result<Self, WeixinError> {
        Ok(Self::new(TransportConfig::from_env()?))
    }

    pub fn config(&self) -> &TransportConfig {
        self.dispatcher.config()
    }

    /// Run one request/response cycle.
    ///
    /// A POST body is sent as UTF-8 with an exact `Content-Length`; GET and
    /// body-less POST send nothing after the headers.
    pub fn execute(&self, request: Request) -> Result<Response, WeixinError> {
        let Request {
            method,
            url,
            headers,
            body,
            client_identity,
        } = request;

        let trust = TlsTrustStrategy::select(client_identity, self.config().server_trust);
        let connection = headers
            .iter()
            .fold(self.dispatcher.open(&url, method, &trust)?, |conn, (name, value)| {
                conn.header(name, value)
            });

        match (method, body) {
            (HttpMethod::Post, Some(body)) => connection.send_bytes(body.as_bytes()),
            (HttpMethod::Get, Some(_)) => {
                debug!("GET request body dropped");
                connection.send_empty()
            }
            (_, None) => connection.send_empty(),
        }
    }

    pub fn get(&self, url: &str) -> Result<Response, WeixinError> {
        self.execute(Request::get(url))
    }

    pub fn post(&self, url: &str, body: impl Into<String>) -> Result<Response, WeixinError> {
        self.execute(Request::post(url, body))
    }

    /// Serialize `payload` to JSON and POST it.
    pub fn post_json<T: Serialize + ?Sized>(&self, url: &str, payload: &T) -> Result<Response, WeixinError> {
        let body = serde_json::to_string(payload).map_err(|e| WeixinError::Serialization(e.to_string()))?;
        self.post(url, body)
    }

    /// POST an XML payload over mutual TLS, as the payment refund and
    /// red-packet endpoints require.
    pub fn post_xml_with_cert(
        &self,
        url: &str,
        xml: impl Into<String>,
        identity: TlsIdentity,
    ) -> Result<Response, WeixinError> {
        self.execute(Request::post(url, xml).with_client_certificate(identity))
    }

    /// GET `url` and decode the platform JSON envelope.
    pub fn get_json(&self, url: &str) -> Result<Value, WeixinError> {
        self.get(url)?.into_api_result()
    }

    /// Upload the file at `path` as the `media` part of a multipart form and
    /// return the response text verbatim, whatever the status.
    pub fn upload(&self, url: &str, path: impl AsRef<Path>) -> Result<String, WeixinError> {
        let path = path.as_ref();
        let body = MultipartBody::open(path)?;
        let len = body.content_length();
        debug!(file = %path.display(), len, "uploading media");

        let trust = TlsTrustStrategy::select(None, self.config().server_trust);
        let connection = self
            .dispatcher
            .open(url, HttpMethod::Post, &trust)?
            .header("Content-Type", &multipart::content_type())
            .header("Connection", "Keep-Alive")
            .header("Cache-Control", "no-cache");

        connection.send_reader(body.into_reader(), len)?.into_text()
    }

    /// Fetch a media attachment with a plain GET.
    pub fn download(&self, url: &str) -> Result<Attachment, WeixinError> {
        self.download_with(Request::get(url))
    }

    /// Fetch a media attachment with an arbitrary request, e.g. a POST of
    /// `{"media_id": ...}` for permanent material.
    ///
    /// Platform errors and unrecognised replies come back as an error
    /// attachment; only setup and transport failures are `Err`.
    pub fn download_with(&self, request: Request) -> Result<Attachment, WeixinError> {
        match classify(self.execute(request)?)? {
            Classification::Redirect(url) => self.follow_indirection(&url),
            other => Ok(other.into_attachment()),
        }
    }

    /// One hop only: a second indirection is returned as an error attachment,
    /// and so is a target that is not an http(s) URL.
    fn follow_indirection(&self, url: &str) -> Result<Attachment, WeixinError> {
        if let Err(err) = checked_url(url) {
            warn!(error = %err, "unusable {INDIRECTION_FIELD}");
            return Ok(Attachment::error(format!("unusable {INDIRECTION_FIELD}: {err}")));
        }
        debug!(url = %redact_str(url), "following {INDIRECTION_FIELD}");
        let classification = classify(self.get(url)?)?;
        if let Classification::Redirect(next) = &classification {
            warn!(url = %redact_str(next), "refusing nested {INDIRECTION_FIELD} indirection");
        }
        Ok(classification.into_attachment())
    }
}

fn redact_str(url: &str) -> String {
    Url::parse(url).map(|u| redact(&u)).unwrap_or_else(|_| "<invalid url>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerTrust;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn client_is_shareable_across_threads() {
        assert_send_sync::<HttpsClient>();
    }

    #[test]
    fn default_client_uses_lenient_trust_and_ten_second_timeouts() {
        let client = HttpsClient::default();
        assert_eq!(client.config().server_trust, ServerTrust::AcceptAll);
        assert_eq!(client.config().connect_timeout(), std::time::Duration::from_secs(10));
        assert_eq!(client.config().read_timeout(), std::time::Duration::from_secs(10));
    }

    #[test]
    fn execute_rejects_unsupported_schemes() {
        let err = HttpsClient::default().get("file:///etc/passwd").unwrap_err();
        assert!(matches!(err, WeixinError::InvalidUrl { .. }), "got {err:?}");
    }

    #[test]
    fn upload_of_missing_file_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let err = HttpsClient::default()
            .upload("http://127.0.0.1:9/upload", dir.path().join("absent.jpg"))
            .unwrap_err();
        assert!(matches!(err, WeixinError::Transport { .. }), "got {err:?}");
        assert!(err.to_string().contains("absent.jpg"));
    }

    #[test]
    fn post_json_reports_serialization_failures() {
        use std::collections::BTreeMap;
        // Non-string map keys cannot be JSON object keys.
        let mut payload = BTreeMap::new();
        payload.insert((1, 2), "x");
        let err = HttpsClient::default()
            .post_json("http://127.0.0.1:9/", &payload)
            .unwrap_err();
        assert!(matches!(err, WeixinError::Serialization(_)), "got {err:?}");
    }

    #[test]
    fn unusable_indirection_targets_become_error_attachments() {
        let client = HttpsClient::default();
        for target in ["not a url", "ftp://example.com/video.mp4", "", "   "] {
            let attachment = client.follow_indirection(target).unwrap();
            let message = attachment.error_message().unwrap();
            assert!(message.contains("video_url"), "{target:?}: {message}");
        }
    }

    #[test]
    fn redacted_urls_lose_their_query() {
        assert_eq!(
            redact_str("http://host/video.mp4?token=abc"),
            "http://host/video.mp4"
        );
        assert_eq!(redact_str("::"), "<invalid url>");
    }
}
