//! Connection setup and the wire round-trip.
//!
//! # Design
//! `Dispatcher::open` does everything that can fail before a byte is sent:
//! URL validation, scheme selection and TLS connector construction. The
//! returned `Connection` is consumed by exactly one `send_*` call, so a
//! connection cannot be reused or sent twice.
//!
//! Each `open` builds its own `ureq::Agent` with pooling disabled: nothing is
//! shared between calls, and the socket is closed when the returned
//! `Response` (or its body stream) is dropped. Redirects are never followed.
//!
//! Every request carries the uniform header set:
//! - `Content-Type: application/x-www-form-urlencoded`
//! - `User-Agent: <fixed browser string>`
//! - `Accept-Charset: UTF-8`
//!
//! Headers set on the connection afterwards replace uniform ones with the same
//! name (case-insensitive).

use std::io::Read;

use tracing::{debug, warn};
use url::Url;

use crate::config::TransportConfig;
use crate::error::WeixinError;
use crate::http::{HttpMethod, CHARSET, FORM_CONTENT_TYPE, USER_AGENT};
use crate::response::Response;
use crate::tls::TlsTrustStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: TransportConfig,
}

impl Dispatcher {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Prepare a connection to `url`. No network I/O happens here.
    pub fn open(&self, url: &str, method: HttpMethod, trust: &TlsTrustStrategy) -> Result<Connection, WeixinError> {
        let (parsed, scheme) = checked_url(url)?;

        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(self.config.connect_timeout())
            .timeout_read(self.config.read_timeout())
            .timeout_write(self.config.read_timeout())
            .redirects(0)
            .max_idle_connections(0)
            .user_agent(USER_AGENT);

        match scheme {
            Scheme::Https => {
                builder = builder.tls_connector(trust.connector()?);
            }
            Scheme::Http if trust.presents_client_certificate() => {
                warn!(url = %redact(&parsed), "client certificate ignored on a plain http request");
            }
            Scheme::Http => {}
        }

        Ok(Connection {
            agent: builder.build(),
            method,
            url: parsed,
            scheme,
            headers: vec![
                ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
                ("User-Agent".to_string(), USER_AGENT.to_string()),
                ("Accept-Charset".to_string(), CHARSET.to_string()),
            ],
        })
    }
}

/// A prepared request, consumed by one `send_*` call.
#[derive(Debug)]
pub struct Connection {
    agent: ureq::Agent,
    method: HttpMethod,
    url: Url,
    scheme: Scheme,
    headers: Vec<(String, String)>,
}

impl Connection {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set a header, replacing any existing one with the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Send without a body.
    pub fn send_empty(self) -> Result<Response, WeixinError> {
        let url = redact(&self.url);
        let request = self.request();
        finish(&url, request.call())
    }

    /// Send `body` with `Content-Length` set to its exact length.
    pub fn send_bytes(self, body: &[u8]) -> Result<Response, WeixinError> {
        let url = redact(&self.url);
        let request = self
            .header("Content-Length", &body.len().to_string())
            .request();
        finish(&url, request.send_bytes(body))
    }

    /// Stream `len` bytes from `body`. The length is announced up front, so the
    /// body is never sent chunked.
    pub fn send_reader(self, body: impl Read, len: u64) -> Result<Response, WeixinError> {
        let url = redact(&self.url);
        let request = self.header("Content-Length", &len.to_string()).request();
        finish(&url, request.send(body))
    }

    fn request(self) -> ureq::Request {
        debug!(method = self.method.as_str(), url = %redact(&self.url), "sending request");
        self.headers
            .iter()
            .fold(self.agent.request_url(self.method.as_str(), &self.url), |req, (n, v)| {
                req.set(n, v)
            })
    }
}

/// Non-2xx answers are ordinary responses here; only transport failures are
/// errors.
fn finish(url: &str, result: Result<ureq::Response, ureq::Error>) -> Result<Response, WeixinError> {
    match result {
        Ok(response) | Err(ureq::Error::Status(_, response)) => {
            debug!(url, status = response.status(), "response received");
            Ok(Response::from_ureq(response))
        }
        Err(ureq::Error::Transport(err)) => {
            debug!(url, error = %err, "transport failure");
            Err(WeixinError::transport(format!("request to {url} failed"), err))
        }
    }
}

/// Parse `url` and require an `http` or `https` scheme.
pub(crate) fn checked_url(url: &str) -> Result<(Url, Scheme), WeixinError> {
    let parsed = parse_url(url)?;
    let scheme = scheme_of(&parsed)?;
    Ok((parsed, scheme))
}

fn parse_url(url: &str) -> Result<Url, WeixinError> {
    Url::parse(url).map_err(|e| WeixinError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn scheme_of(url: &Url) -> Result<Scheme, WeixinError> {
    match url.scheme() {
        "https" => Ok(Scheme::Https),
        "http" => Ok(Scheme::Http),
        other => Err(WeixinError::InvalidUrl {
            url: redact(url),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

/// The URL without query or fragment. Platform URLs carry access tokens and
/// secrets in the query string.
pub fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.set_fragment(None);
    clean.to_string()
}
