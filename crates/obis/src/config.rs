//! CLI configuration -- thin wrapper around `obis_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--server, --user, etc.).

use std::io::IsTerminal;
use std::time::Duration;

use secrecy::SecretString;

use obis_config::ConfigError;
use obis_core::{Credentials, IPAD_MODULE, IpadError, ServiceConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use obis_config::{
    Config, Defaults, Profile, config_path, load_config, load_config_or_default, save_config,
};

// ── Target ──────────────────────────────────────────────────────────

/// A fully resolved server to talk to, plus the profile it came from.
#[derive(Debug)]
pub struct Target {
    pub profile: String,
    pub service: ServiceConfig,
}

impl Target {
    /// Translate a facade error with this target's context.
    pub fn error(&self, err: IpadError) -> CliError {
        CliError::from_ipad(
            err,
            self.service.url.as_str(),
            &self.profile,
            &self.service.module,
        )
    }
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `Target` from the config file, profile, and CLI overrides.
pub fn resolve_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg.defaults, global);
    }

    // No profile found -- build from CLI flags / env vars alone
    if global.server.is_none() {
        return Err(if global.profile.is_some() {
            ConfigError::ProfileNotFound {
                name: profile_name,
                available: cfg.profile_names(),
            }
            .into()
        } else {
            CliError::NoConfig {
                path: config_path().display().to_string(),
            }
        });
    }
    resolve_profile(&Profile::default(), &profile_name, &cfg.defaults, global)
}

/// Translate a `Profile` + global flags into a `Target`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<Target, CliError> {
    // 1. Server URL (flag > env > profile)
    let server = global.server.as_deref().unwrap_or(&profile.server);
    if server.is_empty() {
        return Err(CliError::Validation {
            field: "server".into(),
            reason: format!("profile '{profile_name}' has no server URL"),
        });
    }
    let url = obis_config::server_url(server)?;

    // 2. Credentials (flag > profile > env, then the password chain)
    let username = global
        .user
        .clone()
        .or_else(|| profile.username.clone())
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.into(),
        })?;
    let password = match obis_config::resolve_password(profile, profile_name) {
        Ok(password) => password,
        Err(ConfigError::NoCredentials { .. }) if std::io::stdin().is_terminal() => {
            prompt_password(&username)?
        }
        Err(e) => return Err(e.into()),
    };

    // 3. TLS verification
    let tls = obis_config::tls_for(profile, global.insecure || defaults.insecure);

    // 4. Timeout (flag > profile > defaults)
    let timeout = Duration::from_secs(
        global
            .timeout
            .or(profile.timeout)
            .unwrap_or(defaults.timeout),
    );

    Ok(Target {
        profile: profile_name.into(),
        service: ServiceConfig {
            url,
            credentials: Credentials { username, password },
            tls,
            timeout,
            module: profile.module.clone().unwrap_or_else(|| IPAD_MODULE.into()),
        },
    })
}

fn prompt_password(username: &str) -> Result<SecretString, CliError> {
    let password = rpassword::prompt_password(format!("Password for {username}: "))?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(SecretString::from(password))
}
