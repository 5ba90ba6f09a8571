// ── Runtime connection configuration ──
//
// These types describe *how* to reach an openBIS server. They carry
// credential data and transport tuning, but never touch disk. The CLI
// builds a `ServiceConfig` from its profile and hands it in.

use std::time::Duration;

use obis_api::{HttpConnection, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::error::IpadError;

/// Name of the server-side module the facade depends on.
pub const IPAD_MODULE: &str = "ipad-read-service-v1";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab servers).
    DangerAcceptInvalid,
}

/// Username and password for `login`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Configuration for talking to a single openBIS server.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Server root URL (e.g., `https://openbis.example.org`).
    pub url: Url,
    pub credentials: Credentials,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Name of the ipad-access module to look for.
    pub module: String,
}

impl ServiceConfig {
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            module: IPAD_MODULE.into(),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }

    /// Build the HTTP connection described by this config.
    pub fn connect(&self) -> Result<HttpConnection, IpadError> {
        Ok(HttpConnection::new(self.url.clone(), &self.transport())?)
    }
}
