/// Oracle adapter
///
/// Resolves connection descriptors from profile credentials and runs SQL
/// against Oracle through a thin connection manager that translates driver
/// failures for the host.

pub mod client;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod manager;
pub mod models;

pub use client::{check_client_ready, prime_client, resolve_client_path};
pub use connection::{OciCursor, OciDriver, OciHandle};
pub use driver::{Cursor, Driver, DriverCursor, NativeHandle};
pub use error::{AdapterError, DriverError, ExecutionError, RuntimeFailure};
pub use manager::OracleConnectionManager;
pub use models::{
    AdapterResponse, Bindings, Connection, ConnectionDescriptor, ConnectionMethod,
    ConnectionState, Credentials,
};
