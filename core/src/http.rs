//! Request values and the fixed header set used on every call.
//!
//! # Design
//! A `Request` is plain data: built once by the caller and moved into
//! `HttpsClient::execute`, which consumes it. Whether mutual TLS is needed is
//! not a separate flag: it is true exactly when a `TlsIdentity` is attached,
//! so the flag and the identity cannot disagree.

use crate::tls::TlsIdentity;

/// Sent on every request, whatever the payload actually is.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/33.0.1750.146 Safari/537.36";

pub const CHARSET: &str = "UTF-8";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An outbound request described as plain data.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    pub url: String,
    /// Applied after the uniform headers, replacing any with the same name.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub(crate) client_identity: Option<TlsIdentity>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url, None)
    }

    /// POST with a string payload (JSON, XML or form data).
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url, Some(body.into()))
    }

    /// POST without a payload; nothing is written after the headers.
    pub fn post_empty(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url, None)
    }

    fn new(method: HttpMethod, url: impl Into<String>, body: Option<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body,
            client_identity: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Authenticate this request with a client certificate (mutual TLS).
    pub fn with_client_certificate(mut self, identity: TlsIdentity) -> Self {
        self.client_identity = Some(identity);
        self
    }

    pub fn requires_client_cert(&self) -> bool {
        self.client_identity.is_some()
    }

    pub fn client_identity(&self) -> Option<&TlsIdentity> {
        self.client_identity.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_has_no_body_and_no_certificate() {
        let req = Request::get("https://api.weixin.qq.com/cgi-bin/token?grant_type=client_credential");
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
        assert!(!req.requires_client_cert());
    }

    #[test]
    fn post_keeps_the_string_body() {
        let req = Request::post("https://api.mch.weixin.qq.com/pay/unifiedorder", "<xml></xml>");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.body.as_deref(), Some("<xml></xml>"));
    }

    #[test]
    fn post_empty_has_no_body() {
        let req = Request::post_empty("https://example.com/");
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.body.is_none());
    }

    #[test]
    fn attaching_identity_requires_client_cert() {
        let identity = TlsIdentity::new("1900000109", "/etc/weixin/apiclient_cert.p12", "secret").unwrap();
        let req = Request::post("https://api.mch.weixin.qq.com/secapi/pay/refund", "<xml/>")
            .with_client_certificate(identity);
        assert!(req.requires_client_cert());
        assert_eq!(req.client_identity().unwrap().partner_id(), "1900000109");
    }

    #[test]
    fn headers_accumulate_in_order() {
        let req = Request::get("http://localhost/")
            .header("Cache-Control", "no-cache")
            .header("Connection", "Keep-Alive");
        assert_eq!(
            req.headers,
            vec![
                ("Cache-Control".to_string(), "no-cache".to_string()),
                ("Connection".to_string(), "Keep-Alive".to_string()),
            ]
        );
    }

    #[test]
    fn method_names() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.as_str(), "POST");
    }
}
