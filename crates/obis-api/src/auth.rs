// Session login/logout and module discovery
//
// openBIS hands out an opaque session token from `login`; the token is the
// first parameter of every later call. Discovery needs a session too, so
// before the user logs in it borrows an anonymous one when the server
// allows it.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::connection::Discovery;
use crate::error::Error;
use crate::http::HttpConnection;
use crate::models::{AggregationService, AggregationServiceSearch, ModuleDescriptor};

impl HttpConnection {
    /// Authenticate with username/password.
    ///
    /// `login` answers `null` instead of faulting on bad credentials, so
    /// a missing token is reported as [`Error::Authentication`].
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        debug!(username, "logging in at {}", self.endpoint());

        let token: Option<String> = self
            .call("login", json!([username, password.expose_secret()]))
            .await?;

        match token {
            Some(token) if !token.is_empty() => {
                self.set_session_token(Some(SecretString::from(token)));
                debug!("login successful");
                Ok(())
            }
            _ => Err(Error::Authentication {
                message: format!("invalid credentials for user '{username}'"),
            }),
        }
    }

    /// End the current session. A no-op without a session.
    pub async fn logout(&self) -> Result<(), Error> {
        let Some(token) = self.session_token() else {
            return Ok(());
        };

        debug!("logging out");
        // The token is dropped locally even if the server call fails.
        self.set_session_token(None);
        let _: Value = self
            .call("logout", json!([token.expose_secret()]))
            .await?;

        debug!("logout complete");
        Ok(())
    }

    /// Look up an aggregation service by name.
    ///
    /// Uses the current session when there is one, otherwise a throwaway
    /// anonymous session. Answers [`Discovery::Deferred`] when neither is
    /// possible.
    pub async fn discover(&self, name: &str) -> Result<Discovery, Error> {
        if let Some(token) = self.session_token() {
            let services = self.search_aggregation_services(&token).await?;
            return Ok(pick(services, name));
        }

        let Some(anonymous) = self.login_anonymous().await? else {
            debug!(module = name, "no anonymous session, discovery deferred");
            return Ok(Discovery::Deferred);
        };

        let services = self.search_aggregation_services(&anonymous).await;
        if let Err(e) = self
            .call::<Value>("logout", json!([anonymous.expose_secret()]))
            .await
        {
            debug!(error = %e, "anonymous logout failed");
        }
        Ok(pick(services?, name))
    }

    /// `loginAsAnonymousUser()`; `None` when the server has no anonymous user.
    async fn login_anonymous(&self) -> Result<Option<SecretString>, Error> {
        match self
            .call::<Option<String>>("loginAsAnonymousUser", json!([]))
            .await
        {
            Ok(token) => Ok(token.filter(|t| !t.is_empty()).map(SecretString::from)),
            Err(Error::Rpc { message, .. } | Error::Authentication { message }) => {
                debug!(%message, "anonymous login refused");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `searchAggregationServices(token, criteria, fetchOptions)`
    async fn search_aggregation_services(
        &self,
        token: &SecretString,
    ) -> Result<Vec<ModuleDescriptor>, Error> {
        let params = json!([
            token.expose_secret(),
            { "@type": "as.dto.service.search.AggregationServiceSearchCriteria" },
            { "@type": "as.dto.service.fetchoptions.AggregationServiceFetchOptions" }
        ]);
        let result: Option<AggregationServiceSearch> =
            self.call("searchAggregationServices", params).await?;

        let services: Vec<ModuleDescriptor> = result
            .unwrap_or_default()
            .objects
            .into_iter()
            .map(AggregationService::into_descriptor)
            .collect();
        debug!(count = services.len(), "aggregation services listed");
        Ok(services)
    }
}

fn pick(services: Vec<ModuleDescriptor>, name: &str) -> Discovery {
    services
        .into_iter()
        .find(|s| s.name == name)
        .map_or(Discovery::Unavailable, Discovery::Available)
}
