/// Native driver boundary
///
/// The connection manager only talks to the database through these traits.
/// `OciDriver` in the `connection` module implements them on top of the
/// `oracle` crate; tests substitute an in-memory driver.

use super::error::DriverError;
use super::models::Bindings;
use serde_json::Value;

/// Opens native handles
pub trait Driver {
    type Handle: NativeHandle;

    fn connect(
        &self,
        user: &str,
        password: &str,
        dsn: &str,
        encoding: &str,
    ) -> Result<Self::Handle, DriverError>;
}

/// An open session with the database
pub trait NativeHandle {
    type Cursor: Cursor;

    fn cursor(&self) -> Result<Self::Cursor, DriverError>;
    fn commit(&self) -> Result<(), DriverError>;
    fn rollback(&self) -> Result<(), DriverError>;
    fn close(&self) -> Result<(), DriverError>;
}

/// Executes statements on a handle and holds the last result
pub trait Cursor {
    fn execute(&mut self, sql: &str, bindings: &Bindings) -> Result<(), DriverError>;

    /// Drains the rows produced by the last query, one JSON object per row
    fn fetch_all(&mut self) -> Vec<Value>;

    /// Rows touched by the last DML statement
    fn rows_affected(&self) -> Option<u64>;
}

/// Cursor type produced by a driver's handles
pub type DriverCursor<D> = <<D as Driver>::Handle as NativeHandle>::Cursor;
