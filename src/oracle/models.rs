/// Data models for Oracle connection handling
///
/// This module defines the profile credentials, the connection descriptor
/// derived from them, and the per-thread connection entity the manager
/// drives through its lifecycle.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default Oracle listener port
pub const DEFAULT_PORT: u16 = 1521;

/// Fields shown by diagnostics, in display order. Never includes the password.
const CONNECTION_KEYS: [&str; 7] = [
    "user",
    "database",
    "schema",
    "host",
    "port",
    "service",
    "connection_string",
];

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// An explicit `null` port means the default listener port
fn port_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    Ok(Option::<u16>::deserialize(deserializer)?.unwrap_or(DEFAULT_PORT))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Credentials for an Oracle profile
///
/// The connection method is never configured directly: it is inferred from
/// which of `connection_string`, `host` and `database` are present.
/// The port is only used when a host is given.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Database username
    pub user: String,

    /// Database password
    #[serde(alias = "pass", skip_serializing)]
    pub password: String,

    /// Logical database name; doubles as the TNS alias and the default service
    #[serde(alias = "dbname")]
    pub database: String,

    /// Target schema for models
    #[serde(default)]
    pub schema: String,

    /// Listener port
    #[serde(default = "default_port", deserialize_with = "port_or_default")]
    pub port: u16,

    /// Listener host
    #[serde(default)]
    pub host: Option<String>,

    /// Service name, falls back to `database`
    #[serde(default)]
    pub service: Option<String>,

    /// Full driver connect string (EZConnect, descriptor or tnsnames alias)
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Emit every statement and its timing as a hook event
    #[serde(default)]
    pub debug_log_commands: bool,

    /// Statement run on the cursor before every query
    #[serde(default)]
    pub cursor_precode: Option<String>,

    /// Directory holding the Oracle Client libraries
    #[serde(default)]
    pub client_lib_dir: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"********")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("port", &self.port)
            .field("host", &self.host)
            .field("service", &self.service)
            .field("connection_string", &self.connection_string)
            .field("debug_log_commands", &self.debug_log_commands)
            .field("cursor_precode", &self.cursor_precode)
            .field("client_lib_dir", &self.client_lib_dir)
            .finish()
    }
}

impl Credentials {
    /// Creates credentials with every optional field unset
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            database: database.into(),
            schema: schema.into(),
            port: DEFAULT_PORT,
            host: None,
            service: None,
            connection_string: None,
            debug_log_commands: false,
            cursor_precode: None,
            client_lib_dir: None,
        }
    }

    /// Parses a profile target from JSON, accepting the `dbname` and `pass` aliases
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| format!("Invalid Oracle profile: {}", e))
    }

    /// Reads a profile target from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read profile {}: {}", path.display(), e))?;
        Self::from_json_str(&raw)
    }

    /// Adapter type name
    pub fn type_name(&self) -> &'static str {
        "oracle"
    }

    /// Keys safe to display in diagnostics
    pub fn connection_keys(&self) -> &'static [&'static str] {
        &CONNECTION_KEYS
    }

    /// Display values for [`Credentials::connection_keys`], in the same order
    pub fn connection_info(&self) -> Vec<(&'static str, String)> {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "None".to_string());
        CONNECTION_KEYS
            .iter()
            .map(|key| {
                let value = match *key {
                    "user" => self.user.clone(),
                    "database" => self.database.clone(),
                    "schema" => self.schema.clone(),
                    "host" => show(&self.host),
                    "port" => self.port.to_string(),
                    "service" => show(&self.service),
                    _ => show(&self.connection_string),
                };
                (*key, value)
            })
            .collect()
    }

    /// Infers the connection method
    ///
    /// Priority: connection string, then host, then TNS alias.
    pub fn connection_method(&self) -> ConnectionMethod {
        if non_empty(&self.connection_string).is_some() {
            ConnectionMethod::ConnectionString
        } else if non_empty(&self.host).is_some() {
            ConnectionMethod::Host
        } else {
            ConnectionMethod::Tns
        }
    }

    /// Builds the descriptor for an explicit method
    pub fn descriptor_for(&self, method: ConnectionMethod) -> ConnectionDescriptor {
        match method {
            ConnectionMethod::Tns => ConnectionDescriptor::Tns {
                identifier: self.database.clone(),
            },
            ConnectionMethod::ConnectionString => ConnectionDescriptor::ConnectionString {
                raw: self.connection_string.clone().unwrap_or_default(),
            },
            ConnectionMethod::Host => ConnectionDescriptor::HostPort {
                host: self.host.clone().unwrap_or_default(),
                port: self.port,
                service: non_empty(&self.service)
                    .unwrap_or(&self.database)
                    .to_string(),
            },
        }
    }

    /// Descriptor for the inferred method
    pub fn descriptor(&self) -> ConnectionDescriptor {
        self.descriptor_for(self.connection_method())
    }

    /// DSN handed to the driver
    pub fn dsn(&self) -> String {
        self.descriptor().to_string()
    }
}

/// How the driver locates the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMethod {
    Host,
    Tns,
    ConnectionString,
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionMethod::Host => "host",
            ConnectionMethod::Tns => "tns",
            ConnectionMethod::ConnectionString => "connection_string",
        };
        f.write_str(name)
    }
}

/// Resolved address of an Oracle database
///
/// `Display` renders the DSN string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ConnectionDescriptor {
    Tns { identifier: String },
    ConnectionString { raw: String },
    #[serde(rename = "host")]
    HostPort { host: String, port: u16, service: String },
}

impl ConnectionDescriptor {
    pub fn method(&self) -> ConnectionMethod {
        match self {
            ConnectionDescriptor::Tns { .. } => ConnectionMethod::Tns,
            ConnectionDescriptor::ConnectionString { .. } => ConnectionMethod::ConnectionString,
            ConnectionDescriptor::HostPort { .. } => ConnectionMethod::Host,
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDescriptor::Tns { identifier } => f.write_str(identifier),
            ConnectionDescriptor::ConnectionString { raw } => f.write_str(raw),
            ConnectionDescriptor::HostPort { host, port, service } => {
                write!(f, "{}:{}/{}", host, port, service)
            }
        }
    }
}

/// Lifecycle of a connection's native handle
#[derive(Debug)]
pub enum ConnectionState<H> {
    Closed,
    Open(H),
    /// Handle creation failed; carries the driver message
    Failed(String),
}

impl<H> ConnectionState<H> {
    /// Host-facing state name
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open(_) => "open",
            ConnectionState::Failed(_) => "fail",
        }
    }
}

/// A named connection owned by one worker thread
#[derive(Debug)]
pub struct Connection<H> {
    pub(crate) name: String,
    pub(crate) credentials: Arc<Credentials>,
    pub(crate) state: ConnectionState<H>,
    pub(crate) transaction_open: bool,
}

impl<H> Connection<H> {
    /// Creates a closed connection
    pub fn new(name: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        Self {
            name: name.into(),
            credentials,
            state: ConnectionState::Closed,
            transaction_open: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn state(&self) -> &ConnectionState<H> {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Open(_))
    }

    pub fn transaction_open(&self) -> bool {
        self.transaction_open
    }

    /// Native handle, when open
    pub fn handle(&self) -> Option<&H> {
        match &self.state {
            ConnectionState::Open(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Bind parameters for a statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bindings {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(BTreeMap<String, Value>),
}

impl Bindings {
    pub fn is_empty(&self) -> bool {
        match self {
            Bindings::None => true,
            Bindings::Positional(values) => values.is_empty(),
            Bindings::Named(values) => values.is_empty(),
        }
    }
}

/// Response reported to the host after a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub message: String,
}

impl AdapterResponse {
    /// The driver exposes no per-statement status, so every response is "OK"
    pub fn ok() -> Self {
        Self {
            message: "OK".to_string(),
        }
    }
}

impl fmt::Display for AdapterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
