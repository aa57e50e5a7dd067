//! TLS trust policies.
//!
//! # Design
//! One enum, one variant per trust policy, selected from the request's
//! identity and the configured default. Each call builds a fresh
//! `native_tls::TlsConnector`; nothing is cached or shared between calls.
//!
//! - `Lenient` accepts any server chain and host name. It is the default
//!   because the platform's chains are not present in every stock trust store.
//! - `Platform` verifies the server normally.
//! - `ClientCertificate` loads a PKCS12 keystore and presents it to the server
//!   (mutual TLS); the server is verified normally.
//!
//! Every failure here is a `WeixinError::TlsSetup` and happens before a socket
//! is opened.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use native_tls::{Identity, Protocol, TlsConnector};
use tracing::debug;

use crate::config::ServerTrust;
use crate::error::WeixinError;

/// Merchant identity used for mutual TLS.
///
/// The PKCS12 store is protected by the partner (merchant) id; the private
/// key by `certificate_secret`. Both are usually the same value on the
/// platform, and a single store password is all `native-tls` accepts, so
/// loading tries the partner id first and the secret second.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    partner_id: String,
    certificate_path: PathBuf,
    certificate_secret: String,
}

impl TlsIdentity {
    /// Validate and build an identity. Blank values are rejected here rather
    /// than surfacing later as a handshake failure.
    pub fn new(
        partner_id: impl Into<String>,
        certificate_path: impl Into<PathBuf>,
        certificate_secret: impl Into<String>,
    ) -> Result<Self, WeixinError> {
        let partner_id = partner_id.into();
        let certificate_path = certificate_path.into();
        let certificate_secret = certificate_secret.into();

        if partner_id.trim().is_empty() {
            return Err(WeixinError::InvalidIdentity("partner id is empty".into()));
        }
        if certificate_path.as_os_str().is_empty() {
            return Err(WeixinError::InvalidIdentity("certificate path is empty".into()));
        }
        if certificate_secret.is_empty() {
            return Err(WeixinError::InvalidIdentity("certificate secret is empty".into()));
        }

        Ok(Self {
            partner_id,
            certificate_path,
            certificate_secret,
        })
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    fn load(&self) -> Result<Identity, WeixinError> {
        debug!(path = %self.certificate_path.display(), "loading PKCS12 keystore");
        let der = fs::read(&self.certificate_path).map_err(|e| {
            WeixinError::tls_setup(
                format!("cannot read keystore {}", self.certificate_path.display()),
                e,
            )
        })?;

        match Identity::from_pkcs12(&der, &self.partner_id) {
            Ok(identity) => Ok(identity),
            Err(first) if self.certificate_secret != self.partner_id => {
                Identity::from_pkcs12(&der, &self.certificate_secret).map_err(|_| {
                    WeixinError::tls_setup(
                        format!("cannot unlock keystore {}", self.certificate_path.display()),
                        first,
                    )
                })
            }
            Err(e) => Err(WeixinError::tls_setup(
                format!("cannot unlock keystore {}", self.certificate_path.display()),
                e,
            )),
        }
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("partner_id", &self.partner_id)
            .field("certificate_path", &self.certificate_path)
            .field("certificate_secret", &"<redacted>")
            .finish()
    }
}

/// How the TLS connector for one request is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsTrustStrategy {
    Lenient,
    Platform,
    ClientCertificate(TlsIdentity),
}

impl TlsTrustStrategy {
    /// A client identity always wins; otherwise the configured default applies.
    pub fn select(identity: Option<TlsIdentity>, default: ServerTrust) -> Self {
        match (identity, default) {
            (Some(identity), _) => TlsTrustStrategy::ClientCertificate(identity),
            (None, ServerTrust::AcceptAll) => TlsTrustStrategy::Lenient,
            (None, ServerTrust::Platform) => TlsTrustStrategy::Platform,
        }
    }

    pub fn presents_client_certificate(&self) -> bool {
        matches!(self, TlsTrustStrategy::ClientCertificate(_))
    }

    /// Build the connector for this policy.
    pub fn connector(&self) -> Result<Arc<TlsConnector>, WeixinError> {
        let mut builder = TlsConnector::builder();
        match self {
            TlsTrustStrategy::Lenient => {
                builder
                    .danger_accept_invalid_certs(true)
                    .danger_accept_invalid_hostnames(true);
            }
            TlsTrustStrategy::Platform => {}
            TlsTrustStrategy::ClientCertificate(identity) => {
                builder
                    .identity(identity.load()?)
                    .min_protocol_version(Some(Protocol::Tlsv12));
            }
        }
        let connector = builder
            .build()
            .map_err(|e| WeixinError::tls_setup("cannot build TLS context", e))?;
        Ok(Arc::new(connector))
    }
}
