/// Oracle driver on top of the `oracle` crate
///
/// Implements the driver boundary with ODPI-C. Query results are fetched
/// eagerly into the cursor as JSON rows.

use super::client::{is_client_primed, prime_client};
use super::driver::{Cursor, Driver, NativeHandle};
use super::error::DriverError;
use super::models::{Bindings, Credentials};
use oracle::sql_type::ToSql;
use serde_json::Value;
use std::sync::Arc;

/// The only client character set ODPI-C speaks
const SUPPORTED_ENCODING: &str = "UTF-8";

/// Guidance for common connection failures, keyed by error code
pub fn connect_hint(message: &str) -> Option<&'static str> {
    if message.contains("DPI-1047") || message.contains("Cannot locate") {
        return Some("Oracle Client library could not be loaded. Install Oracle Instant Client or set client_lib_dir.");
    }
    if message.contains("ORA-12170") || message.contains("ORA-12541") || message.contains("timeout") {
        return Some("Network error or database not reachable. Check host and port.");
    }
    if message.contains("ORA-01017") {
        return Some("Invalid username or password.");
    }
    if message.contains("ORA-12514") {
        return Some("Service name not known to the listener. Check service or database.");
    }
    if message.contains("ORA-12154") {
        return Some("TNS alias could not be resolved. Check TNS_ADMIN and tnsnames.ora.");
    }
    None
}

/// Driver that opens `oracle::Connection`s
#[derive(Debug, Clone, Default)]
pub struct OciDriver {
    client_lib_dir: Option<String>,
}

impl OciDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver that primes the client library from the profile's `client_lib_dir`
    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            client_lib_dir: credentials.client_lib_dir.clone(),
        }
    }
}

impl Driver for OciDriver {
    type Handle = OciHandle;

    fn connect(
        &self,
        user: &str,
        password: &str,
        dsn: &str,
        encoding: &str,
    ) -> Result<OciHandle, DriverError> {
        if !encoding.eq_ignore_ascii_case(SUPPORTED_ENCODING) && !encoding.eq_ignore_ascii_case("UTF8") {
            return Err(DriverError::Interface(format!(
                "Unsupported client encoding '{}': the Oracle client only runs in {}",
                encoding, SUPPORTED_ENCODING
            )));
        }

        if let Some(dir) = self.client_lib_dir.as_deref() {
            if !is_client_primed() {
                prime_client(Some(dir)).map_err(DriverError::Interface)?;
            }
        }

        let conn = oracle::Connection::connect(user, password, dsn).map_err(|e| {
            let err = DriverError::from(e);
            if let Some(hint) = connect_hint(err.message()) {
                log::warn!("{}", hint);
            }
            err
        })?;

        log::info!("Successfully connected to {}", dsn);
        Ok(OciHandle { conn: Arc::new(conn) })
    }
}

/// Open `oracle::Connection`
pub struct OciHandle {
    conn: Arc<oracle::Connection>,
}

impl std::fmt::Debug for OciHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciHandle").finish_non_exhaustive()
    }
}

impl NativeHandle for OciHandle {
    type Cursor = OciCursor;

    fn cursor(&self) -> Result<OciCursor, DriverError> {
        Ok(OciCursor {
            conn: Arc::clone(&self.conn),
            rows: Vec::new(),
            rows_affected: None,
        })
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.conn.commit().map_err(DriverError::from)
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.conn.rollback().map_err(DriverError::from)
    }

    fn close(&self) -> Result<(), DriverError> {
        self.conn.close().map_err(DriverError::from)
    }
}

/// Cursor over an `OciHandle`
pub struct OciCursor {
    conn: Arc<oracle::Connection>,
    rows: Vec<Value>,
    rows_affected: Option<u64>,
}

impl Cursor for OciCursor {
    fn execute(&mut self, sql: &str, bindings: &Bindings) -> Result<(), DriverError> {
        self.rows.clear();
        self.rows_affected = None;

        let mut stmt = self.conn.statement(sql).build()?;
        let params = BoundParams::from_bindings(bindings);

        if stmt.is_query() {
            let result_set = match &params {
                BoundParams::Positional(values) => {
                    let refs: Vec<&dyn ToSql> = values.iter().map(SqlParam::as_sql).collect();
                    stmt.query(&refs)?
                }
                BoundParams::Named(values) => {
                    let refs: Vec<(&str, &dyn ToSql)> = values
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.as_sql()))
                        .collect();
                    stmt.query_named(&refs)?
                }
            };
            for row_result in result_set {
                let row = row_result?;
                self.rows.push(row_to_json(&row)?);
            }
            log::debug!("Fetched {} rows", self.rows.len());
        } else {
            match &params {
                BoundParams::Positional(values) => {
                    let refs: Vec<&dyn ToSql> = values.iter().map(SqlParam::as_sql).collect();
                    stmt.execute(&refs)?;
                }
                BoundParams::Named(values) => {
                    let refs: Vec<(&str, &dyn ToSql)> = values
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.as_sql()))
                        .collect();
                    stmt.execute_named(&refs)?;
                }
            }
            self.rows_affected = Some(stmt.row_count()?);
        }
        Ok(())
    }

    fn fetch_all(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.rows)
    }

    fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }
}

/// Owned bind value
#[derive(Debug, Clone, PartialEq)]
enum SqlParam {
    Null(Option<String>),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlParam {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null(None),
            Value::Bool(b) => SqlParam::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => SqlParam::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            other => SqlParam::Text(other.to_string()),
        }
    }

    fn as_sql(&self) -> &dyn ToSql {
        match self {
            SqlParam::Null(v) => v,
            SqlParam::Int(v) => v,
            SqlParam::Float(v) => v,
            SqlParam::Text(v) => v,
        }
    }
}

#[derive(Debug)]
enum BoundParams {
    Positional(Vec<SqlParam>),
    Named(Vec<(String, SqlParam)>),
}

impl BoundParams {
    fn from_bindings(bindings: &Bindings) -> Self {
        match bindings {
            Bindings::None => BoundParams::Positional(Vec::new()),
            Bindings::Positional(values) => {
                BoundParams::Positional(values.iter().map(SqlParam::from_value).collect())
            }
            Bindings::Named(values) => BoundParams::Named(
                values
                    .iter()
                    .map(|(name, value)| {
                        (name.trim_start_matches(':').to_string(), SqlParam::from_value(value))
                    })
                    .collect(),
            ),
        }
    }
}

/// Converts an Oracle row to a JSON object keyed by column name
fn row_to_json(row: &oracle::Row) -> Result<Value, DriverError> {
    let mut map = serde_json::Map::new();

    for (i, col_info) in row.column_info().iter().enumerate() {
        let value = column_value(row, i, col_info)?;
        map.insert(col_info.name().to_string(), value);
    }

    Ok(Value::Object(map))
}

/// Converts a single column according to its Oracle type
fn column_value(
    row: &oracle::Row,
    idx: usize,
    col_info: &oracle::ColumnInfo,
) -> Result<Value, DriverError> {
    use oracle::sql_type::OracleType;

    match col_info.oracle_type() {
        OracleType::Number(_, _)
        | OracleType::Float(_)
        | OracleType::BinaryFloat
        | OracleType::BinaryDouble => {
            // NUMBER can exceed f64 precision; integers that fit stay numeric, the rest stay text
            let text: Option<String> = row.get(idx)?;
            Ok(match text {
                None => Value::Null,
                Some(s) => match s.parse::<i64>() {
                    Ok(i) => Value::from(i),
                    Err(_) => Value::String(s),
                },
            })
        }

        OracleType::BLOB | OracleType::Raw(_) | OracleType::LongRaw => {
            let bytes: Option<Vec<u8>> = row.get(idx)?;
            Ok(bytes.map(|b| Value::String(to_hex(&b))).unwrap_or(Value::Null))
        }

        // Strings, CLOBs, dates and timestamps render through the driver's text conversion
        _ => {
            let text: Option<String> = row.get(idx)?;
            Ok(text.map(Value::String).unwrap_or(Value::Null))
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
