// obis-api: async transport for the openBIS v3 application server

pub mod auth;
pub mod connection;
pub mod error;
pub mod http;
pub mod models;
pub mod transport;

pub use connection::{Connection, Discovery};
pub use error::Error;
pub use http::HttpConnection;
pub use models::{ModuleDescriptor, TableCell, TableColumn, TableModel};
pub use transport::{TlsMode, TransportConfig};
