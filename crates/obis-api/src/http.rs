// openBIS v3 JSON-RPC client
//
// Wraps `reqwest::Client` with endpoint construction, JSON-RPC envelope
// handling, and session-token bookkeeping. Authentication and discovery
// live in `auth.rs`; this module stays focused on transport mechanics.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::connection::{Connection, Discovery};
use crate::error::Error;
use crate::models::{ModuleDescriptor, RpcResponse, TableModel};
use crate::transport::TransportConfig;

/// Path of the v3 application-server JSON-RPC endpoint.
pub const V3_ENDPOINT_PATH: &str = "/openbis/openbis/rmi-application-server-v3.json";

/// JSON-RPC connection to an openBIS application server.
///
/// Holds the session token obtained by [`login`](Self::login) and
/// attaches it as the first parameter of every authenticated call.
pub struct HttpConnection {
    http: reqwest::Client,
    base_url: Url,
    endpoint: Url,
    timeout_secs: u64,
    session_token: RwLock<Option<SecretString>>,
}

impl HttpConnection {
    /// Create a connection from a `TransportConfig`.
    ///
    /// `base_url` is the server root (e.g. `https://openbis.example.org`);
    /// the v3 endpoint path is appended automatically.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let mut conn = Self::with_client(http, base_url)?;
        conn.timeout_secs = transport.timeout_secs();
        Ok(conn)
    }

    /// Create a connection around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Result<Self, Error> {
        let endpoint = base_url.join(V3_ENDPOINT_PATH)?;
        Ok(Self {
            http,
            base_url,
            endpoint,
            timeout_secs: 0,
            session_token: RwLock::new(None),
        })
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The JSON-RPC endpoint every call is posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // ── Session token management ─────────────────────────────────────

    pub(crate) fn session_token(&self) -> Option<SecretString> {
        self.session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_session_token(&self, token: Option<SecretString>) {
        trace!(present = token.is_some(), "updating session token");
        *self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Drop the session token if it is still `sent`. A token replaced by a
    /// newer login in the meantime is kept.
    pub(crate) fn clear_session_token_if(&self, sent: &SecretString) -> bool {
        let mut token = self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let current = token
            .as_ref()
            .is_some_and(|t| t.expose_secret() == sent.expose_secret());
        if current {
            *token = None;
        }
        current
    }

    /// The session token, or `NotAuthenticated` if there is none.
    pub(crate) fn require_session(&self) -> Result<SecretString, Error> {
        self.session_token().ok_or(Error::NotAuthenticated)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Post a JSON-RPC call and unwrap the envelope.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, Error> {
        let id = Uuid::new_v4().to_string();
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, %id, "POST {}", self.endpoint);

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        self.parse_envelope(resp).await
    }

    /// Like [`call`](Self::call) but prepends the session token and
    /// drops it locally when the server reports it invalid.
    pub(crate) async fn call_authenticated<T: DeserializeOwned>(
        &self,
        method: &str,
        mut params: Vec<Value>,
    ) -> Result<T, Error> {
        let token = self.require_session()?;
        params.insert(0, Value::String(token.expose_secret().to_owned()));

        let result = self.call(method, Value::Array(params)).await;
        if matches!(result, Err(Error::SessionExpired)) && self.clear_session_token_if(&token) {
            warn!(method, "server invalidated the session");
        }
        result
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }

    /// Parse the JSON-RPC envelope, returning `result` on success.
    ///
    /// jsonrpc4j reports faults either with HTTP 200 or 500, so the body
    /// is inspected before the status code.
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "server rejected the request (HTTP 401)".into(),
            });
        }

        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        let preview = || body.chars().take(200).collect::<String>();

        let envelope: RpcResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(Error::Http {
                    status: status.as_u16(),
                    message: preview(),
                });
            }
            Err(e) => {
                return Err(Error::Deserialization {
                    message: format!("{e} (body preview: {:?})", preview()),
                    body: body.clone(),
                });
            }
        };

        if let Some(fault) = envelope.error {
            if fault.is_invalid_session() {
                return Err(Error::SessionExpired);
            }
            return Err(Error::Rpc {
                code: fault.code,
                message: fault.message,
            });
        }

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: preview(),
            });
        }

        serde_json::from_value(envelope.result).map_err(|e| Error::Deserialization {
            message: format!("unexpected result shape: {e}"),
            body: body.clone(),
        })
    }

    // ── Aggregation services ─────────────────────────────────────────

    /// `executeAggregationService(token, serviceId, options)`
    pub async fn execute_aggregation_service(
        &self,
        module: &ModuleDescriptor,
        parameters: Value,
    ) -> Result<TableModel, Error> {
        debug!(service = %module.name, data_store = %module.data_store, "executing aggregation service");
        let service_id = json!({
            "@type": "as.dto.service.id.DssServicePermId",
            "permId": module.name,
            "dataStoreId": {
                "@type": "as.dto.datastore.id.DataStorePermId",
                "permId": module.data_store,
            },
        });
        let options = json!({
            "@type": "as.dto.service.execute.AggregationServiceExecutionOptions",
            "parameters": parameters,
        });
        self.call_authenticated("executeAggregationService", vec![service_id, options])
            .await
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn discover_module(&self, name: &str) -> Result<Discovery, Error> {
        self.discover(name).await
    }

    async fn authenticate(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        self.login(username, password).await
    }

    async fn execute(
        &self,
        module: &ModuleDescriptor,
        parameters: Value,
    ) -> Result<TableModel, Error> {
        self.execute_aggregation_service(module, parameters).await
    }

    async fn logout(&self) -> Result<(), Error> {
        HttpConnection::logout(self).await
    }

    fn is_authenticated(&self) -> bool {
        self.session_token().is_some()
    }
}
