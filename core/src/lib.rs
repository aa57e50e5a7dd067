//! Blocking HTTPS transport for the WeChat public-platform API.
//!
//! # Overview
//! Issues GET/POST calls, uploads media as `multipart/form-data`, and turns the
//! platform's loosely typed replies (plain text, `{errcode, errmsg}` envelopes,
//! binary attachments, `video_url` indirections) into typed values.
//!
//! ```no_run
//! use weixin_transport::HttpsClient;
//!
//! # fn main() -> Result<(), weixin_transport::WeixinError> {
//! let client = HttpsClient::from_env()?;
//! let token = client.get_json("https://api.weixin.qq.com/cgi-bin/token?grant_type=client_credential")?;
//! println!("{token}");
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - Everything is synchronous; one call drives one request on the calling
//!   thread and builds its own agent, TLS connector and socket.
//! - Server trust is an explicit policy (`TlsTrustStrategy`): lenient by
//!   default, platform verification on request, mutual TLS whenever a
//!   `TlsIdentity` is attached to the request.
//! - Response classification is an ordered rule list yielding one
//!   `Classification` value; downloads follow at most one indirection.
//! - Sockets, files and body streams are owned values released on drop.

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod multipart;
pub mod response;
pub mod tls;
pub mod transport;
pub mod types;

pub use classify::{classify, Classification, RawBody};
pub use client::HttpsClient;
pub use config::{ServerTrust, TransportConfig};
pub use error::{ApiError, WeixinError};
pub use http::{HttpMethod, Request};
pub use response::{BodyReader, Response};
pub use tls::{TlsIdentity, TlsTrustStrategy};
pub use types::{Attachment, AttachmentBody};
