//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Replace plaintext passwords so structured output never leaks them.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
    }
}

/// Render the config the way it would be written back to disk.
fn format_config(cfg: &Config) -> Result<String, CliError> {
    Ok(toml::to_string_pretty(cfg)?.trim_end().to_owned())
}

fn profile_not_found(cfg: &Config, name: String) -> CliError {
    obis_config::ConfigError::ProfileNotFound {
        name,
        available: cfg.profile_names(),
    }
    .into()
}

/// Apply `key = value` to a profile.
fn set_profile_value(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "server" => {
            obis_config::server_url(&value)?;
            profile.server = value;
        }
        "username" | "user" => profile.username = Some(value),
        "password_env" | "password-env" => profile.password_env = Some(value),
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        "insecure" => {
            profile.insecure = Some(value.parse().map_err(|_| CliError::Validation {
                field: "insecure".into(),
                reason: "must be 'true' or 'false'".into(),
            })?);
        }
        "timeout" => {
            profile.timeout = Some(value.parse().map_err(|_| CliError::Validation {
                field: "timeout".into(),
                reason: "must be a number (seconds)".into(),
            })?);
        }
        "module" => profile.module = Some(value),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: server, username, \
                     password_env, ca_cert, insecure, timeout, module"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            redact(&mut cfg);
            let text = format_config(&cfg)?;
            let out =
                output::render_single(&global.output, &cfg, |_| text.clone(), |_| text.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_profile_value(profile, &key, value)?;

            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let names = cfg.profile_names();
            if names.is_empty() {
                eprintln!("No profiles configured. Run: obis config set server <url>");
                return Ok(());
            }
            let active = config::active_profile_name(global, &cfg);
            let listing = names
                .iter()
                .map(|name| {
                    if name == &active {
                        format!("{name} (active)")
                    } else {
                        name.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&listing, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(&cfg, name));
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetPassword { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(profile_not_found(&cfg, profile_name));
            }

            let secret = rpassword::prompt_password("Password: ")?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            obis_config::store_password(&profile_name, &secret)?;

            eprintln!("✓ Password stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn set_validates_typed_keys() {
        let mut profile = Profile::default();

        set_profile_value(&mut profile, "server", "https://openbis.example.org".into()).unwrap();
        set_profile_value(&mut profile, "timeout", "90".into()).unwrap();
        set_profile_value(&mut profile, "module", "ipad-read-service-v2".into()).unwrap();

        assert_eq!(profile.server, "https://openbis.example.org");
        assert_eq!(profile.timeout, Some(90));
        assert_eq!(profile.module.as_deref(), Some("ipad-read-service-v2"));

        assert!(set_profile_value(&mut profile, "timeout", "soon".into()).is_err());
        assert!(set_profile_value(&mut profile, "server", "not a url".into()).is_err());
        assert!(set_profile_value(&mut profile, "site", "x".into()).is_err());
    }

    #[test]
    fn show_masks_plaintext_passwords() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                server: "https://openbis.example.org".into(),
                password: Some("hunter2".into()),
                ..Profile::default()
            },
        );

        redact(&mut cfg);
        let text = format_config(&cfg).unwrap();

        assert!(text.contains("[profiles.lab]"));
        assert!(text.contains("password = \"****\""));
        assert!(!text.contains("hunter2"));
    }
}
