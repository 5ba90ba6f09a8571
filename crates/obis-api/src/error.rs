use thiserror::Error;

/// Top-level error type for the `obis-api` crate.
///
/// Covers every failure mode of the transport: authentication, HTTP,
/// JSON-RPC faults, and payload decoding. `obis-core` maps these into
/// the ipad-service error domain.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, disabled account, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The server no longer recognizes the session token.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    /// An authenticated method was called without a session token.
    #[error("Not authenticated -- call login first")]
    NotAuthenticated,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status outside the JSON-RPC envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── JSON-RPC ────────────────────────────────────────────────────
    /// Fault returned in the `error` member of a JSON-RPC response.
    #[error("openBIS error{}: {message}", code.map(|c| format!(" {c}")).unwrap_or_default())]
    Rpc { code: Option<i64>, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the session is gone
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotAuthenticated)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}
