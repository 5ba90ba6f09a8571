//! Asynchronous ipad-access facade over `obis-api`.
//!
//! This crate owns the domain logic between the openBIS transport and its
//! consumers (the `obis` CLI, or any embedding application):
//!
//! - **[`AsyncCall`]**: a one-shot unit of work with optional success and
//!   failure continuations. [`start()`](AsyncCall::start) consumes the call
//!   and spawns it; exactly one continuation fires, always after `start`
//!   has returned. [`outcome()`](AsyncCall::outcome) awaits the result
//!   directly.
//!
//! - **[`IpadService`]**: the facade. It discovers the `ipad-read-service-v1`
//!   module, authenticates, and turns listing requests into
//!   [`IpadEntity`] values. Listings are refused with
//!   [`IpadError::AuthenticationRequired`] until a login succeeds.
//!
//! - **[`IpadEntity`]**: an immutable row of an ipad-access table. The
//!   serialized `children` and `properties` payloads can be unpacked with
//!   [`parse_children`] and [`parse_properties`].

pub mod call;
pub mod config;
pub mod decode;
pub mod entity;
pub mod error;
pub mod service;

// ── Primary re-exports ──────────────────────────────────────────────
pub use call::{AsyncCall, CallHandle, CallState, DeliveryLane};
pub use config::{Credentials, IPAD_MODULE, ServiceConfig, TlsVerification};
pub use decode::{EntityProperty, parse_children, parse_properties};
pub use entity::{IpadEntity, RawRecord, decode_listing};
pub use error::{ERROR_DOMAIN, ErrorCode, IpadError};
pub use service::{IpadService, SessionState};
