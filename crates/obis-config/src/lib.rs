//! Shared configuration for openBIS tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `obis_core::ServiceConfig`. The CLI adds
//! `GlobalOpts`-aware overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use obis_core::{Credentials, IPAD_MODULE, ServiceConfig, TlsVerification};

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "obis";

/// Environment variables consulted by the credential chain.
pub const USERNAME_ENV: &str = "OBIS_USERNAME";
pub const PASSWORD_ENV: &str = "OBIS_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::ProfileNotFound {
                name,
                available: self.profile_names(),
            }),
        }
    }

    /// Profile names in sorted order.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named openBIS server profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Server root URL (e.g., "https://openbis.example.org").
    pub server: String,

    /// Login name.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Aggregation service name, if the server deploys it under another key.
    pub module: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("ch", "ethz", "obis").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("obis");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment.
///
/// A missing file is not an error; defaults and `OBIS_*` variables still
/// apply. Nested keys use a double underscore, e.g.
/// `OBIS_DEFAULTS__TIMEOUT=60`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OBIS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Store a password in the system keyring for `profile_name`.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Resolve the password from the credential chain (no CLI flag step).
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(profile, profile_name, |name| std::env::var(name).ok())
}

/// Credential chain with an injectable environment lookup.
///
/// Order: the profile's `password_env`, `OBIS_PASSWORD`, the system
/// keyring, then plaintext in the profile.
pub fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env vars
    let from_env = profile
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env(PASSWORD_ENV));
    if let Some(pw) = from_env {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve username + password without CLI flags.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;
    let password = resolve_password(profile, profile_name)?;
    Ok(Credentials { username, password })
}

/// Parse the profile's server URL.
pub fn server_url(raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "server".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// TLS strategy for a profile, with `insecure` taking precedence.
pub fn tls_for(profile: &Profile, insecure: bool) -> TlsVerification {
    if insecure || profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    }
}

/// Build a `ServiceConfig` from a profile, no CLI flag overrides.
pub fn profile_to_service_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ServiceConfig, ConfigError> {
    let url = server_url(&profile.server)?;
    let credentials = resolve_credentials(profile, profile_name)?;

    Ok(ServiceConfig {
        url,
        credentials,
        tls: tls_for(profile, defaults.insecure),
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        module: profile.module.clone().unwrap_or_else(|| IPAD_MODULE.into()),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const SAMPLE: &str = r#"
default_profile = "lab"

[defaults]
timeout = 45

[profiles.lab]
server = "https://openbis.example.org"
username = "observer"
password = "plain"
ca_cert = "/etc/ssl/lab-ca.pem"

[profiles.dev]
server = "https://localhost:8443"
insecure = true
module = "ipad-read-service-dev"
"#;

    #[test]
    fn loads_profiles_from_toml() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("lab"));
        assert_eq!(config.defaults.timeout, 45);
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.profile_names(), vec!["dev", "lab"]);

        let (name, lab) = config.profile(None).unwrap();
        assert_eq!(name, "lab");
        assert_eq!(lab.server, "https://openbis.example.org");
        assert_eq!(lab.username.as_deref(), Some("observer"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert!(config.profiles.is_empty());
        assert_eq!(config.default_profile.as_deref(), Some("default"));
    }

    #[test]
    fn unknown_profile_lists_the_available_ones() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();

        match config.profile(Some("prod")) {
            Err(ConfigError::ProfileNotFound { name, available }) => {
                assert_eq!(name, "prod");
                assert_eq!(available, vec!["dev", "lab"]);
            }
            other => panic!("expected ProfileNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn password_env_wins_over_plaintext() {
        let profile = Profile {
            server: "https://openbis.example.org".into(),
            password: Some("plain".into()),
            password_env: Some("LAB_PW".into()),
            ..Profile::default()
        };

        let pw = resolve_password_with(&profile, "env-test", |name| {
            (name == "LAB_PW").then(|| "from-env".to_owned())
        })
        .unwrap();
        assert_eq!(pw.expose_secret(), "from-env");

        let pw = resolve_password_with(&profile, "env-test", |name| {
            (name == PASSWORD_ENV).then(|| "global".to_owned())
        })
        .unwrap();
        assert_eq!(pw.expose_secret(), "global");
    }

    #[test]
    fn plaintext_is_the_last_resort() {
        let profile = Profile {
            password: Some("plain".into()),
            ..Profile::default()
        };
        let pw = resolve_password_with(&profile, "obis-test-no-keyring-entry", |_| None).unwrap();
        assert_eq!(pw.expose_secret(), "plain");

        let err = resolve_password_with(&Profile::default(), "obis-test-no-keyring-entry", |_| None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn tls_prefers_insecure_then_custom_ca() {
        let file = write_config(SAMPLE);
        let config = load_config_from(file.path()).unwrap();
        let (_, lab) = config.profile(Some("lab")).unwrap();
        let (_, dev) = config.profile(Some("dev")).unwrap();

        assert_eq!(
            tls_for(lab, false),
            TlsVerification::CustomCa("/etc/ssl/lab-ca.pem".into())
        );
        assert_eq!(tls_for(lab, true), TlsVerification::DangerAcceptInvalid);
        assert_eq!(tls_for(dev, false), TlsVerification::DangerAcceptInvalid);
        assert_eq!(tls_for(&Profile::default(), false), TlsVerification::SystemDefaults);
    }

    #[test]
    fn invalid_server_url_is_a_validation_error() {
        assert!(matches!(
            server_url("not a url"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                server: "https://openbis.example.org".into(),
                username: Some("observer".into()),
                ..Profile::default()
            },
        );

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        let (_, profile) = loaded.profile(None).unwrap();
        assert_eq!(profile.username.as_deref(), Some("observer"));
        assert_eq!(profile.module, None);
    }
}
