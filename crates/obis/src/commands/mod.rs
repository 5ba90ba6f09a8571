//! Command handlers and the per-invocation session.

pub mod config_cmd;
pub mod entities;
pub mod login;

use obis_core::{AsyncCall, IpadService};

use crate::config::Target;
use crate::error::CliError;

/// A logged-in facade for the lifetime of one command.
pub struct Session {
    service: IpadService,
    target: Target,
}

impl Session {
    /// Create the facade for `target` and log in.
    pub async fn open(target: Target) -> Result<Self, CliError> {
        let service = IpadService::from_config(&target.service).map_err(|e| target.error(e))?;
        let credentials = &target.service.credentials;

        tracing::debug!(
            server = %target.service.url,
            username = %credentials.username,
            "logging in"
        );
        service
            .login(credentials.username.clone(), credentials.password.clone())
            .outcome()
            .await
            .map_err(|e| target.error(e))?;

        Ok(Self { service, target })
    }

    pub fn service(&self) -> &IpadService {
        &self.service
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Start `call` and wait for it, translating failures.
    pub async fn run<T: Send + 'static>(&self, call: AsyncCall<T>) -> Result<T, CliError> {
        call.outcome().await.map_err(|e| self.target.error(e))
    }

    /// Best-effort logout.
    pub async fn close(self) {
        if let Err(e) = self.service.logout().outcome().await {
            tracing::debug!(error = %e, "logout failed");
        }
    }
}
