// ── Ipad-access service facade ──
//
// Turns domain operations into `AsyncCall`s over a shared `Connection`.
// The facade owns the authentication gate: listings are only issued
// while the session state is `Authenticated`, and only one login or
// logout may be in flight at a time.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use obis_api::{Connection, Discovery, ModuleDescriptor};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::call::{AsyncCall, DeliveryLane};
use crate::config::{IPAD_MODULE, ServiceConfig};
use crate::entity::{IpadEntity, columns, decode_listing};
use crate::error::IpadError;

/// Request keys understood by the ipad-access module.
mod request_key {
    pub const ALL: &str = "ALL";
    pub const ROOT: &str = "ROOT";
    pub const DRILL: &str = "DRILL";
    pub const DETAIL: &str = "DETAIL";
}

// ── SessionState ─────────────────────────────────────────────────

/// Authentication gate observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

// ── IpadService ──────────────────────────────────────────────────

/// Facade over the ipad-access module of an openBIS server.
///
/// Cheaply cloneable via `Arc<ServiceInner>`. Every operation returns an
/// unstarted [`AsyncCall`]; continuations of calls from the same facade
/// are delivered one at a time.
#[derive(Clone)]
pub struct IpadService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    connection: Arc<dyn Connection>,
    module: String,
    session: watch::Sender<SessionState>,
    /// Bumped on every successful login, under the `session` lock.
    generation: AtomicU64,
    /// Discovered module, populated by a successful login.
    descriptor: ArcSwapOption<ModuleDescriptor>,
    /// Held for the duration of a login or logout.
    auth_gate: Mutex<()>,
    lane: DeliveryLane,
}

impl IpadService {
    /// Create a facade looking for the default ipad-access module.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self::with_module(connection, IPAD_MODULE)
    }

    /// Create a facade looking for a differently named module.
    pub fn with_module(connection: Arc<dyn Connection>, module: impl Into<String>) -> Self {
        let (session, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            inner: Arc::new(ServiceInner {
                connection,
                module: module.into(),
                session,
                generation: AtomicU64::new(0),
                descriptor: ArcSwapOption::empty(),
                auth_gate: Mutex::new(()),
                lane: DeliveryLane::default(),
            }),
        }
    }

    /// Create a facade over an `HttpConnection` built from `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, IpadError> {
        let connection = config.connect()?;
        Ok(Self::with_module(Arc::new(connection), config.module.clone()))
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    pub fn session_state(&self) -> SessionState {
        *self.inner.session.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_state() == SessionState::Authenticated
    }

    /// Subscribe to session state transitions.
    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    /// The module found by the last successful login.
    pub fn module(&self) -> Option<Arc<ModuleDescriptor>> {
        self.inner.descriptor.load_full()
    }

    // ── Operations ───────────────────────────────────────────────

    /// Authenticate against the ipad-access module.
    ///
    /// Fails with [`IpadError::NoIpadServiceAvailable`] before sending
    /// credentials when the server is known not to expose the module. If
    /// that happens while a session is open, the session is logged out.
    pub fn login(&self, username: impl Into<String>, password: SecretString) -> AsyncCall<()> {
        let username = username.into();
        self.call("login", move |inner| async move {
            inner.login(&username, &password).await
        })
    }

    /// Close the session. The facade is unauthenticated afterwards even
    /// when the server call fails.
    pub fn logout(&self) -> AsyncCall<()> {
        self.call("logout", |inner| async move { inner.logout().await })
    }

    /// Every entity the module exposes, in server order.
    pub fn list_all_entities(&self) -> AsyncCall<Vec<IpadEntity>> {
        self.call("list_all_entities", |inner| async move {
            inner.list(request_key::ALL, json!({ "requestKey": request_key::ALL })).await
        })
    }

    /// Top-level entities only.
    pub fn list_root_level_entities(&self) -> AsyncCall<Vec<IpadEntity>> {
        self.call("list_root_level_entities", |inner| async move {
            inner.list(request_key::ROOT, json!({ "requestKey": request_key::ROOT })).await
        })
    }

    /// Children of `entity`, as listed by the server.
    pub fn drill_on_entity(&self, entity: &IpadEntity) -> AsyncCall<Vec<IpadEntity>> {
        let params = entity_request(request_key::DRILL, entity);
        self.call("drill_on_entity", |inner| async move {
            inner.list(request_key::DRILL, params).await
        })
    }

    /// Full record for `entity`.
    pub fn details_for_entity(&self, entity: &IpadEntity) -> AsyncCall<IpadEntity> {
        let params = entity_request(request_key::DETAIL, entity);
        let perm_id = entity.perm_id().to_owned();
        self.call("details_for_entity", |inner| async move {
            let mut entities = inner.list(request_key::DETAIL, params).await?;
            match entities.len() {
                1 => entities.pop().ok_or_else(|| IpadError::malformed("empty detail")),
                n => Err(IpadError::malformed(format!(
                    "expected one detail record for {perm_id}, got {n}"
                ))),
            }
        })
    }

    fn call<T, F, Fut>(&self, label: &'static str, work: F) -> AsyncCall<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<ServiceInner>) -> Fut,
        Fut: Future<Output = Result<T, IpadError>> + Send + 'static,
    {
        AsyncCall::with_lane(label, work(Arc::clone(&self.inner)), self.inner.lane.clone())
    }
}

fn entity_request(key: &str, entity: &IpadEntity) -> Value {
    json!({
        "requestKey": key,
        "entities": [{
            columns::PERM_ID: entity.perm_id(),
            columns::REFCON: entity.refcon(),
        }],
    })
}

// ── Call bodies ──────────────────────────────────────────────────

impl ServiceInner {
    fn set_session(&self, state: SessionState) {
        let previous = self.session.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "session state changed");
        }
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<(), IpadError> {
        let Ok(_gate) = self.auth_gate.try_lock() else {
            return Err(IpadError::LoginInProgress);
        };

        let deferred = match self.connection.discover_module(&self.module).await? {
            Discovery::Available(desc) => {
                debug!(module = %desc.name, data_store = %desc.data_store, "module available");
                self.descriptor.store(Some(Arc::new(desc)));
                false
            }
            Discovery::Unavailable => {
                warn!(module = %self.module, "server does not provide the module");
                let was_open = *self.session.borrow() == SessionState::Authenticated;
                if was_open {
                    self.abandon_session().await;
                }
                return Err(IpadError::NoIpadServiceAvailable);
            }
            Discovery::Deferred => true,
        };

        self.connection.authenticate(username, password).await?;

        if deferred {
            match self.connection.discover_module(&self.module).await {
                Ok(Discovery::Available(desc)) => {
                    self.descriptor.store(Some(Arc::new(desc)));
                }
                outcome => {
                    self.abandon_session().await;
                    return Err(match outcome {
                        Err(e) => e.into(),
                        Ok(_) => {
                            warn!(module = %self.module, "server does not provide the module");
                            IpadError::NoIpadServiceAvailable
                        }
                    });
                }
            }
        }

        self.session.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = SessionState::Authenticated;
        });
        info!(username, module = %self.module, "logged in");
        Ok(())
    }

    /// Drop a session that was opened but cannot be used.
    async fn abandon_session(&self) {
        if let Err(e) = self.connection.logout().await {
            debug!(error = %e, "logout of unusable session failed");
        }
        self.descriptor.store(None);
        self.set_session(SessionState::Unauthenticated);
    }

    async fn logout(&self) -> Result<(), IpadError> {
        let Ok(_gate) = self.auth_gate.try_lock() else {
            return Err(IpadError::LoginInProgress);
        };

        let result = self.connection.logout().await;
        self.descriptor.store(None);
        self.set_session(SessionState::Unauthenticated);
        info!("logged out");
        result.map_err(IpadError::from)
    }

    /// The module to query and the session generation it belongs to.
    ///
    /// Read at the moment a request would be issued. A missing descriptor
    /// means a logout got in first.
    fn admit(&self) -> Result<(Arc<ModuleDescriptor>, u64), IpadError> {
        let state = self.session.borrow();
        let generation = self.generation.load(Ordering::SeqCst);
        if *state != SessionState::Authenticated {
            return Err(IpadError::AuthenticationRequired);
        }
        let module = self
            .descriptor
            .load_full()
            .ok_or(IpadError::AuthenticationRequired)?;
        Ok((module, generation))
    }

    /// Flip to `Unauthenticated` unless a newer login has replaced the
    /// session the failed request was sent with.
    fn expire_session(&self, generation: u64) -> bool {
        self.session.send_if_modified(|state| {
            let current = self.generation.load(Ordering::SeqCst) == generation;
            if current && *state == SessionState::Authenticated {
                *state = SessionState::Unauthenticated;
                return true;
            }
            false
        })
    }

    async fn list(&self, key: &str, parameters: Value) -> Result<Vec<IpadEntity>, IpadError> {
        let (module, generation) = self.admit()?;

        debug!(request_key = key, module = %module.name, "querying module");
        let table = match self.connection.execute(&module, parameters).await {
            Ok(table) => table,
            Err(e) => {
                if e.is_auth_expired() {
                    if self.expire_session(generation) {
                        warn!(request_key = key, "session lost, re-authentication required");
                    } else {
                        debug!(request_key = key, "stale session expiry ignored");
                    }
                }
                return Err(e.into());
            }
        };

        let entities = decode_listing(&table)?;
        debug!(request_key = key, count = entities.len(), "entities decoded");
        Ok(entities)
    }
}
