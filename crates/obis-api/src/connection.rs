// Connection capability
//
// The seam between the ipad-access facade and whatever actually talks to
// the server. `HttpConnection` is the production implementation; tests
// substitute in-memory fakes.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Error;
use crate::models::{ModuleDescriptor, TableModel};

/// Outcome of probing the server for a named module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// The module is exposed by the server.
    Available(ModuleDescriptor),
    /// The server definitely does not expose the module.
    Unavailable,
    /// The connection cannot answer without an authenticated session.
    /// Callers should authenticate and ask again.
    Deferred,
}

/// Transport capability used by the service facade.
///
/// Implementations own the session token; the facade only observes
/// [`is_authenticated`](Self::is_authenticated) and reacts to
/// [`Error::SessionExpired`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Check whether the server exposes the module called `name`.
    ///
    /// Must not submit user credentials.
    async fn discover_module(&self, name: &str) -> Result<Discovery, Error>;

    /// Open a session with the given credentials.
    async fn authenticate(&self, username: &str, password: &SecretString) -> Result<(), Error>;

    /// Run a module with the given parameter map and return its table.
    async fn execute(
        &self,
        module: &ModuleDescriptor,
        parameters: serde_json::Value,
    ) -> Result<TableModel, Error>;

    /// Close the current session, if any.
    async fn logout(&self) -> Result<(), Error>;

    /// Whether the connection currently holds a session token.
    fn is_authenticated(&self) -> bool;
}
