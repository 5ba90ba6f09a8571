// ── Ipad-service error domain ──
//
// Every failure an `AsyncCall` can deliver. Transport errors from
// obis-api are wrapped, not flattened, so callers can still reach the
// underlying cause through `source()`.

use strum::{AsRefStr, Display, IntoStaticStr};
use thiserror::Error;

/// Name of the error domain for this layer.
pub const ERROR_DOMAIN: &str = "ch.ethz.sis.ipad-service";

/// Stable, machine-readable code for each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCode {
    NoIpadServiceAvailable,
    AuthenticationRequired,
    AuthenticationFailed,
    LoginInProgress,
    MalformedResponse,
    TransportFailure,
    Internal,
}

impl ErrorCode {
    /// Numeric value, where the server contract defines one.
    ///
    /// Only `NoIpadServiceAvailable` (1) has a published number.
    pub fn numeric(self) -> Option<u32> {
        match self {
            Self::NoIpadServiceAvailable => Some(1),
            _ => None,
        }
    }
}

/// Error delivered through an `AsyncCall`'s failure continuation.
#[derive(Debug, Error)]
pub enum IpadError {
    // ── Configuration / availability ─────────────────────────────────
    #[error("The server does not provide the ipad-access module")]
    NoIpadServiceAvailable,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Not logged in -- call login first")]
    AuthenticationRequired,

    #[error("Session expired -- log in again")]
    SessionExpired,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Another login is already in progress")]
    LoginInProgress,

    // ── Decoding ─────────────────────────────────────────────────────
    #[error("Malformed server response: {message}")]
    MalformedResponse { message: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("Transport failure: {source}")]
    Transport {
        #[source]
        source: obis_api::Error,
    },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IpadError {
    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoIpadServiceAvailable => ErrorCode::NoIpadServiceAvailable,
            Self::AuthenticationRequired | Self::SessionExpired => {
                ErrorCode::AuthenticationRequired
            }
            Self::AuthenticationFailed { .. } => ErrorCode::AuthenticationFailed,
            Self::LoginInProgress => ErrorCode::LoginInProgress,
            Self::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            Self::Transport { .. } => ErrorCode::TransportFailure,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether repeating the same call unchanged may succeed.
    ///
    /// Availability, credential, and decoding failures never resolve on
    /// their own; a pending login or a transient network fault may.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LoginInProgress => true,
            Self::Transport { source } => source.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<obis_api::Error> for IpadError {
    fn from(err: obis_api::Error) -> Self {
        match err {
            obis_api::Error::Authentication { message } => Self::AuthenticationFailed { message },
            obis_api::Error::SessionExpired => Self::SessionExpired,
            obis_api::Error::NotAuthenticated => Self::AuthenticationRequired,
            obis_api::Error::Deserialization { message, body: _ } => {
                Self::MalformedResponse { message }
            }
            source => Self::Transport { source },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn only_the_availability_code_is_numbered() {
        assert_eq!(IpadError::NoIpadServiceAvailable.code().numeric(), Some(1));
        assert_eq!(IpadError::AuthenticationRequired.code().numeric(), None);
        assert_eq!(
            ErrorCode::NoIpadServiceAvailable.as_ref(),
            "no-ipad-service-available"
        );
    }

    #[test]
    fn transport_errors_keep_their_source() {
        let err = IpadError::from(obis_api::Error::Timeout { timeout_secs: 30 });
        assert_eq!(err.code(), ErrorCode::TransportFailure);
        assert!(err.is_retryable());
        assert_eq!(err.domain(), ERROR_DOMAIN);
        insta::assert_snapshot!(
            err.source().map(ToString::to_string).unwrap_or_default(),
            @"Request timed out after 30s"
        );
    }

    #[test]
    fn session_loss_maps_to_authentication_required() {
        let err = IpadError::from(obis_api::Error::SessionExpired);
        assert!(matches!(err, IpadError::SessionExpired));
        assert_eq!(err.code(), ErrorCode::AuthenticationRequired);
        assert!(!err.is_retryable());
    }

    #[test]
    fn decoding_failures_are_malformed_responses() {
        let err = IpadError::from(obis_api::Error::Deserialization {
            message: "expected array".into(),
            body: "{}".into(),
        });
        assert_eq!(err.code(), ErrorCode::MalformedResponse);
    }
}
