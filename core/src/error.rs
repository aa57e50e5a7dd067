//! Error types for the platform transport.
//!
//! # Design
//! Failures are split by the point at which they happen. `TlsSetup` covers
//! everything that goes wrong before a byte is sent (keystore, algorithms,
//! connector construction). `Transport` covers DNS, connect, handshake and
//! stream I/O once a request is underway. `Api` is a response that travelled
//! fine but whose `{errcode, errmsg}` envelope reports a failure.
//!
//! Platform errors (`std::io`, `native_tls`, `ureq`) never escape this crate
//! in their own shape: they are wrapped once at the transport boundary and kept
//! reachable through `std::error::Error::source`.

use serde_json::Value;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `HttpsClient` and the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum WeixinError {
    /// The client identity given for mutual TLS is incomplete.
    #[error("invalid TLS identity: {0}")]
    InvalidIdentity(String),

    /// The URL cannot be parsed or uses a scheme other than http/https.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Keystore, algorithm or TLS context failure before any request was sent.
    #[error("TLS setup failed: {message}")]
    TlsSetup {
        message: String,
        #[source]
        source: BoxError,
    },

    /// Connect, handshake or stream I/O failure during a request.
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: BoxError,
    },

    /// The platform answered with a non-zero `errcode`.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A configuration value could not be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl WeixinError {
    pub(crate) fn tls_setup(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        WeixinError::TlsSetup {
            message: message.into(),
            source: source.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        WeixinError::Transport {
            message: message.into(),
            source: source.into(),
        }
    }
}

/// A decoded `{errcode, errmsg}` failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("errcode {code}: {message}")]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

impl ApiError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Decode the error envelope from a JSON body.
    ///
    /// Returns `None` when `errcode` is absent, zero, or not a number: those
    /// bodies are successful payloads as far as the platform is concerned.
    /// A failing envelope without `errmsg` gets a message naming the code so
    /// callers can still look it up in their own code table.
    pub fn from_envelope(value: &Value) -> Option<Self> {
        let code = match value.get("errcode")? {
            Value::Number(n) => n.as_i64().or_else(|| whole_f64(n.as_f64()?))?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        if code == 0 {
            return None;
        }
        let message = value
            .get("errmsg")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("platform returned errcode {code} without errmsg"));
        Some(Self { code, message })
    }
}

/// `40001.0` is the integer 40001; `40001.5` is not an errcode.
fn whole_f64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}
