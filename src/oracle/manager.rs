/// Oracle connection manager
///
/// Opens native handles from resolved credentials, runs statements inside
/// the error-translation boundary and moves each connection through its
/// closed / open / fail states. Every statement is committed as soon as it
/// has run.

use super::driver::{Cursor, Driver, DriverCursor, NativeHandle};
use super::error::{AdapterError, DriverError, ExecutionError, NotOpen, RuntimeFailure};
use super::events::{fire_event, HookInfo};
use super::models::{AdapterResponse, Bindings, Connection, ConnectionState, Credentials};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Character set requested from the driver
pub const CLIENT_ENCODING: &str = "UTF-8";

/// Characters of SQL kept in the log when abridged
pub const ABRIDGED_SQL_LEN: usize = 512;

fn abridge(sql: &str) -> String {
    let head: String = sql.chars().take(ABRIDGED_SQL_LEN).collect();
    format!("{}...", head)
}

pub struct OracleConnectionManager<D: Driver> {
    driver: D,
}

impl<D: Driver> OracleConnectionManager<D> {
    pub const TYPE: &'static str = "oracle";

    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// Credentials a connection was created with
    pub fn get_credentials(connection: &Connection<D::Handle>) -> &Credentials {
        &connection.credentials
    }

    /// Opens the native handle, unless the connection is already open
    ///
    /// A driver failure leaves the connection in the `fail` state.
    pub fn open<'c>(
        &self,
        connection: &'c mut Connection<D::Handle>,
    ) -> Result<&'c mut Connection<D::Handle>, AdapterError> {
        if connection.is_open() {
            log::debug!("Connection is already open, skipping open.");
            return Ok(connection);
        }

        let credentials = Arc::clone(&connection.credentials);
        let descriptor = credentials.descriptor();
        let dsn = descriptor.to_string();

        log::debug!(
            "Attempting to connect using Oracle method: '{}' and dsn: '{}'",
            descriptor.method(),
            dsn
        );

        match self
            .driver
            .connect(&credentials.user, &credentials.password, &dsn, CLIENT_ENCODING)
        {
            Ok(handle) => {
                connection.state = ConnectionState::Open(handle);
                Ok(connection)
            }
            Err(e) => {
                log::info!("Got an error when attempting to open an Oracle connection: '{}'", e);
                connection.state = ConnectionState::Failed(e.to_string());
                Err(AdapterError::ConnectionFailure(e.to_string()))
            }
        }
    }

    /// Cancels whatever runs on the connection by closing its handle
    pub fn cancel(&self, connection: &mut Connection<D::Handle>) -> Result<(), AdapterError> {
        log::info!("Cancelling query '{}' ", connection.name);

        if let Some(handle) = connection.handle() {
            if let Err(e) = handle.close() {
                log::error!("Error closing connection for cancel request");
                return Err(RuntimeFailure::new(e.to_string()).into());
            }
            connection.state = ConnectionState::Closed;
            connection.transaction_open = false;
        }

        log::info!("Canceled query '{}'", connection.name);
        Ok(())
    }

    pub fn get_status(_cursor: &DriverCursor<D>) -> AdapterResponse {
        AdapterResponse::ok()
    }

    pub fn get_response(_cursor: &DriverCursor<D>) -> AdapterResponse {
        AdapterResponse::ok()
    }

    /// Runs `body` and translates its failure for the host
    ///
    /// The connection is released on every failure; a failed release is only
    /// logged. Database errors become `QueryFailure` carrying `sql`. Anything
    /// else surfaces as a `RuntimeFailure`, passed through as-is when it
    /// already is one.
    pub fn exception_handler<T, F>(
        &self,
        connection: &mut Connection<D::Handle>,
        sql: &str,
        body: F,
    ) -> Result<T, AdapterError>
    where
        F: FnOnce(&mut Connection<D::Handle>) -> Result<T, ExecutionError>,
    {
        let error = match body(&mut *connection) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let failure = match error {
            ExecutionError::Driver(e) => {
                log::error!("Oracle error: {}", e);
                if let Err(release_err) = self.release(connection) {
                    log::error!("Failed to release connection! {}", release_err);
                }
                return Err(AdapterError::query_failure(sql, &e));
            }
            ExecutionError::Runtime(failure) => failure,
            ExecutionError::Other(cause) => RuntimeFailure::caused_by(cause),
        };

        log::error!("Rolling back transaction.");
        if let Err(release_err) = self.release(connection) {
            log::error!("Failed to release connection! {}", release_err);
        }
        Err(failure.into())
    }

    /// Executes `sql` on a fresh cursor and commits
    ///
    /// With `auto_begin` a transaction is begun first when none is open. The
    /// profile's `cursor_precode` runs on the same cursor before every
    /// statement.
    pub fn add_query(
        &self,
        connection: &mut Connection<D::Handle>,
        sql: &str,
        bindings: &Bindings,
        auto_begin: bool,
        abridge_sql_log: bool,
    ) -> Result<DriverCursor<D>, AdapterError> {
        if auto_begin && !connection.transaction_open {
            self.begin(connection)?;
        }

        log::debug!("Using {} connection \"{}\".", Self::TYPE, connection.name);

        self.exception_handler(connection, sql, |connection| {
            let credentials = Arc::clone(&connection.credentials);

            if credentials.debug_log_commands {
                let log_sql = if abridge_sql_log { abridge(sql) } else { sql.to_string() };
                fire_event(&HookInfo::new(format!("On {}: {}", connection.name, log_sql)));
            }
            let started = Instant::now();

            let handle = connection
                .handle()
                .ok_or_else(|| NotOpen(connection.name.clone()))?;
            let mut cursor = handle.cursor()?;
            if let Some(precode) = credentials.cursor_precode.as_deref().filter(|p| !p.is_empty()) {
                cursor.execute(precode, &Bindings::None)?;
            }
            cursor.execute(sql, bindings)?;
            handle.commit()?;
            if let Some(count) = cursor.rows_affected() {
                log::debug!("On {}: {} rows affected", connection.name, count);
            }

            if credentials.debug_log_commands {
                fire_event(&HookInfo::new(format!(
                    "SQL status: {} in {:0.2} seconds",
                    Self::get_status(&cursor),
                    started.elapsed().as_secs_f64()
                )));
            }

            Ok(cursor)
        })
    }

    /// Cursor for the start of a transaction
    ///
    /// Oracle opens transactions implicitly, so no statement is sent.
    pub fn add_begin_query(
        &self,
        connection: &mut Connection<D::Handle>,
    ) -> Result<DriverCursor<D>, AdapterError> {
        let handle = connection
            .handle()
            .ok_or_else(|| RuntimeFailure::caused_by(Box::new(NotOpen(connection.name.clone()))))?;
        handle
            .cursor()
            .map_err(|e| RuntimeFailure::caused_by(Box::new(e)).into())
    }

    pub fn begin(&self, connection: &mut Connection<D::Handle>) -> Result<(), AdapterError> {
        if connection.transaction_open {
            return Err(RuntimeFailure::new(format!(
                "Tried to begin a new transaction on connection \"{}\", but it already had one open!",
                connection.name
            ))
            .into());
        }

        self.add_begin_query(connection)?;
        connection.transaction_open = true;
        Ok(())
    }

    pub fn commit(&self, connection: &mut Connection<D::Handle>) -> Result<(), AdapterError> {
        if !connection.transaction_open {
            return Err(RuntimeFailure::new(format!(
                "Tried to commit transaction on connection \"{}\", but it does not have one open!",
                connection.name
            ))
            .into());
        }

        log::debug!("On {}: COMMIT", connection.name);
        self.add_query(connection, "COMMIT", &Bindings::None, false, false)?;
        connection.transaction_open = false;
        Ok(())
    }

    /// Rolls back an open transaction and closes the handle
    ///
    /// Closing is attempted even when the rollback fails; the first error
    /// is returned. Connections without a handle are left as they are.
    pub fn release(&self, connection: &mut Connection<D::Handle>) -> Result<(), DriverError> {
        let handle = match std::mem::replace(&mut connection.state, ConnectionState::Closed) {
            ConnectionState::Open(handle) => handle,
            other => {
                connection.state = other;
                return Ok(());
            }
        };

        let rolled_back = if connection.transaction_open {
            log::debug!("On {}: ROLLBACK", connection.name);
            handle.rollback()
        } else {
            Ok(())
        };
        connection.transaction_open = false;

        log::debug!("On {}: Close", connection.name);
        let closed = handle.close();
        rolled_back.and(closed)
    }

    /// Runs `sql` and optionally fetches its rows
    pub fn execute(
        &self,
        connection: &mut Connection<D::Handle>,
        sql: &str,
        auto_begin: bool,
        fetch: bool,
    ) -> Result<(AdapterResponse, Vec<Value>), AdapterError> {
        let mut cursor = self.add_query(connection, sql, &Bindings::None, auto_begin, false)?;
        let response = Self::get_response(&cursor);
        let rows = if fetch { cursor.fetch_all() } else { Vec::new() };
        Ok((response, rows))
    }
}
