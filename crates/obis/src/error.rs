//! CLI error types with miette diagnostics.
//!
//! Maps `IpadError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use obis_config::ConfigError;
use obis_core::IpadError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const UNAVAILABLE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to openBIS at {url}")]
    #[diagnostic(
        code(obis::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             URL: {url}\n\
             Try: obis login --insecure"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("TLS certificate verification failed for {url}")]
    #[diagnostic(
        code(obis::tls_error),
        help(
            "The server is using a certificate the system does not trust.\n\
             Use --insecure (-k) to accept it, or configure ca_cert in your profile."
        )
    )]
    TlsError { url: String },

    #[error("{url} does not provide the ipad-access service")]
    #[diagnostic(
        code(obis::service_unavailable),
        help(
            "The aggregation service '{module}' is not deployed on this server.\n\
             Ask the openBIS administrator, or set a different module with:\n\
             obis config set module <name>"
        )
    )]
    ServiceUnavailable { url: String, module: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(obis::auth_failed),
        help(
            "Verify the username and password for profile '{profile}'.\n\
             Run: obis config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("Session expired")]
    #[diagnostic(
        code(obis::session_expired),
        help("The server dropped the session. Run the command again to log in afresh.")
    )]
    SessionExpired,

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(obis::no_credentials),
        help(
            "Set a username with: obis config set username <name>\n\
             Then store a password with: obis config set-password\n\
             Or set OBIS_USERNAME and OBIS_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(obis::not_found),
        help("Run: obis {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(obis::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(obis::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(obis::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: obis config set server <url> --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(obis::no_config),
        help(
            "Create a profile with: obis config set server <url>\n\
             Or pass --server and --user.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(obis::config))]
    Config(Box<figment::Error>),

    #[error("Keyring error: {0}")]
    #[diagnostic(
        code(obis::keyring),
        help("Use OBIS_PASSWORD or the profile's password_env instead.")
    )]
    Keyring(String),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(obis::timeout),
        help("Increase timeout with --timeout or check server responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(obis::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(obis::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to write config: {0}")]
    #[diagnostic(code(obis::toml))]
    Toml(#[from] toml::ser::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } => exit_code::CONNECTION,
            Self::ServiceUnavailable { .. } => exit_code::UNAVAILABLE,
            Self::AuthFailed { .. } | Self::SessionExpired | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Translate a facade failure, given the server and profile it concerned.
    pub fn from_ipad(err: IpadError, url: &str, profile: &str, module: &str) -> Self {
        match err {
            IpadError::NoIpadServiceAvailable => Self::ServiceUnavailable {
                url: url.into(),
                module: module.into(),
            },

            IpadError::AuthenticationFailed { .. } | IpadError::AuthenticationRequired => {
                Self::AuthFailed {
                    profile: profile.into(),
                }
            }

            IpadError::SessionExpired => Self::SessionExpired,

            IpadError::Transport { source } => Self::from_transport(source, url),

            other => Self::ApiError {
                code: other.code().to_string(),
                message: match other {
                    IpadError::MalformedResponse { message } | IpadError::Internal(message) => {
                        message
                    }
                    rest => rest.to_string(),
                },
            },
        }
    }

    fn from_transport(err: obis_api::Error, url: &str) -> Self {
        match err {
            obis_api::Error::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            obis_api::Error::Tls(_) => Self::TlsError { url: url.into() },
            obis_api::Error::Rpc { code, message } => Self::ApiError {
                code: code.map_or_else(|| "rpc".into(), |c| c.to_string()),
                message,
            },
            obis_api::Error::Http { status, message } if !is_gateway_status(status) => {
                Self::ApiError {
                    code: format!("http-{status}"),
                    message,
                }
            }
            source => Self::ConnectionFailed {
                url: url.into(),
                source: Box::new(source),
            },
        }
    }
}

fn is_gateway_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => Self::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Keyring(e) => Self::Keyring(e.to_string()),
            ConfigError::Serialization(e) => Self::Toml(e),
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(err: IpadError) -> CliError {
        CliError::from_ipad(
            err,
            "https://openbis.example.org",
            "lab",
            "ipad-read-service-v1",
        )
    }

    #[test]
    fn facade_errors_pick_stable_exit_codes() {
        let cases = [
            (IpadError::NoIpadServiceAvailable, exit_code::UNAVAILABLE),
            (
                IpadError::AuthenticationFailed {
                    message: "Login failed".into(),
                },
                exit_code::AUTH,
            ),
            (IpadError::SessionExpired, exit_code::AUTH),
            (
                IpadError::MalformedResponse {
                    message: "row 0".into(),
                },
                exit_code::GENERAL,
            ),
            (
                IpadError::from(obis_api::Error::Timeout { timeout_secs: 5 }),
                exit_code::TIMEOUT,
            ),
            (
                IpadError::from(obis_api::Error::Http {
                    status: 503,
                    message: "down".into(),
                }),
                exit_code::CONNECTION,
            ),
        ];

        for (err, expected) in cases {
            let label = err.to_string();
            assert_eq!(translate(err).exit_code(), expected, "{label}");
        }
    }

    #[test]
    fn rpc_faults_keep_the_server_code() {
        let err = translate(IpadError::from(obis_api::Error::Rpc {
            code: Some(-32603),
            message: "boom".into(),
        }));
        insta::assert_snapshot!(err.to_string(), @"API error (-32603): boom");
    }

    #[test]
    fn missing_profile_lists_alternatives() {
        let err = CliError::from(ConfigError::ProfileNotFound {
            name: "prod".into(),
            available: vec!["dev".into(), "lab".into()],
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        match err {
            CliError::ProfileNotFound { available, .. } => assert_eq!(available, "dev, lab"),
            other => panic!("expected ProfileNotFound, got: {other:?}"),
        }
    }
}
