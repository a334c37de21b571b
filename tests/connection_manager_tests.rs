/// Integration tests for the connection manager
///
/// A recording in-memory driver stands in for ODPI-C so every lifecycle
/// step and statement can be checked without a database.
///
/// Run these tests with: cargo test --test connection_manager_tests

use log::{Level, LevelFilter, Log, Metadata, Record};
use oracle_adapter::oracle::events::EVENT_TARGET;
use oracle_adapter::oracle::{
    AdapterError, Bindings, Connection, Credentials, Cursor, Driver, DriverError,
    ExecutionError, NativeHandle, OracleConnectionManager, RuntimeFailure,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, ThreadId};

type Journal = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone, Default)]
struct Faults {
    connect: Option<DriverError>,
    /// Statement text that fails, and how
    execute: Option<(String, DriverError)>,
    rollback: bool,
    close: bool,
}

struct RecordingDriver {
    journal: Journal,
    faults: Faults,
}

#[derive(Debug)]
struct RecordingHandle {
    journal: Journal,
    faults: Faults,
}

#[derive(Debug)]
struct RecordingCursor {
    journal: Journal,
    faults: Faults,
    rows: Vec<Value>,
    affected: Option<u64>,
}

impl Driver for RecordingDriver {
    type Handle = RecordingHandle;

    fn connect(
        &self,
        user: &str,
        _password: &str,
        dsn: &str,
        encoding: &str,
    ) -> Result<RecordingHandle, DriverError> {
        self.journal
            .borrow_mut()
            .push(format!("connect {}@{} {}", user, dsn, encoding));
        if let Some(err) = &self.faults.connect {
            return Err(err.clone());
        }
        Ok(RecordingHandle {
            journal: Rc::clone(&self.journal),
            faults: self.faults.clone(),
        })
    }
}

impl NativeHandle for RecordingHandle {
    type Cursor = RecordingCursor;

    fn cursor(&self) -> Result<RecordingCursor, DriverError> {
        Ok(RecordingCursor {
            journal: Rc::clone(&self.journal),
            faults: self.faults.clone(),
            rows: Vec::new(),
            affected: None,
        })
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.journal.borrow_mut().push("commit".to_string());
        Ok(())
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.journal.borrow_mut().push("rollback".to_string());
        if self.faults.rollback {
            return Err(DriverError::Database("ORA-03113: end-of-file on communication channel".to_string()));
        }
        Ok(())
    }

    fn close(&self) -> Result<(), DriverError> {
        self.journal.borrow_mut().push("close".to_string());
        if self.faults.close {
            return Err(DriverError::Database("DPI-1010: not connected".to_string()));
        }
        Ok(())
    }
}

impl Cursor for RecordingCursor {
    fn execute(&mut self, sql: &str, bindings: &Bindings) -> Result<(), DriverError> {
        let suffix = if bindings.is_empty() { String::new() } else { format!(" {}", json!(bindings)) };
        self.journal.borrow_mut().push(format!("execute {}{}", sql, suffix));
        if let Some((failing_sql, err)) = &self.faults.execute {
            if failing_sql == sql {
                return Err(err.clone());
            }
        }
        if sql.to_lowercase().starts_with("select") {
            self.rows = vec![json!({ "OK": 1 })];
            self.affected = None;
        } else {
            self.affected = Some(3);
        }
        Ok(())
    }

    fn fetch_all(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.rows)
    }

    fn rows_affected(&self) -> Option<u64> {
        self.affected
    }
}

#[derive(Debug)]
struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("keyboard interrupt")
    }
}

impl Error for Interrupted {}

/// Log records kept in memory, tagged with the emitting thread so that
/// tests running in parallel only see their own output
struct CaptureLogger {
    records: Mutex<Vec<(ThreadId, String, Level, String)>>,
}

static CAPTURE: CaptureLogger = CaptureLogger { records: Mutex::new(Vec::new()) };
static INSTALL_CAPTURE: Once = Once::new();

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records.lock().unwrap().push((
            thread::current().id(),
            record.target().to_string(),
            record.level(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

/// Starts capturing and returns a mark for `logged_since`
fn capture_logs() -> usize {
    INSTALL_CAPTURE.call_once(|| {
        log::set_logger(&CAPTURE).expect("no other logger installed");
        log::set_max_level(LevelFilter::Trace);
    });
    CAPTURE.records.lock().unwrap().len()
}

/// Messages logged by the current thread on `target` after `mark`
fn logged_since(mark: usize, target: &str) -> Vec<String> {
    let me = thread::current().id();
    CAPTURE
        .records
        .lock()
        .unwrap()
        .iter()
        .skip(mark)
        .filter(|(thread, t, _, _)| *thread == me && t == target)
        .map(|(_, _, _, message)| message.clone())
        .collect()
}

fn credentials() -> Credentials {
    let mut creds = Credentials::new("scott", "tiger", "ORCL", "ANALYTICS");
    creds.host = Some("db.example.com".to_string());
    creds
}

fn setup(
    creds: Credentials,
    faults: Faults,
) -> (OracleConnectionManager<RecordingDriver>, Connection<RecordingHandle>, Journal) {
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let driver = RecordingDriver { journal: Rc::clone(&journal), faults };
    let manager = OracleConnectionManager::new(driver);
    let connection = Connection::new("model.jaffle.orders", Arc::new(creds));
    (manager, connection, journal)
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.borrow().clone()
}

#[test]
fn test_open_connects_with_resolved_dsn() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());

    manager.open(&mut conn).expect("open");

    assert!(conn.is_open());
    assert_eq!(conn.state().name(), "open");
    assert_eq!(entries(&journal), vec!["connect scott@db.example.com:1521/ORCL UTF-8"]);
}

#[test]
fn test_open_twice_creates_one_handle() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());

    manager.open(&mut conn).expect("first open");
    manager.open(&mut conn).expect("second open");

    assert!(conn.is_open());
    assert_eq!(entries(&journal).len(), 1);
}

#[test]
fn test_open_failure_marks_connection_failed() {
    let faults = Faults {
        connect: Some(DriverError::Database("ORA-01017: invalid username/password; logon denied".to_string())),
        ..Faults::default()
    };
    let (manager, mut conn, _journal) = setup(credentials(), faults);

    let err = manager.open(&mut conn).unwrap_err();

    match err {
        AdapterError::ConnectionFailure(msg) => assert!(msg.contains("ORA-01017")),
        other => panic!("expected connection failure, got {:?}", other),
    }
    assert_eq!(conn.state().name(), "fail");
    assert!(conn.handle().is_none());
}

#[test]
fn test_add_query_runs_precode_before_every_statement_and_commits() {
    let mut creds = credentials();
    creds.cursor_precode = Some("ALTER SESSION SET CURRENT_SCHEMA = ANALYTICS".to_string());
    let (manager, mut conn, journal) = setup(creds, Faults::default());
    manager.open(&mut conn).expect("open");

    manager
        .add_query(&mut conn, "select * from orders", &Bindings::None, true, false)
        .expect("first query");
    manager
        .add_query(
            &mut conn,
            "delete from orders where id = :1",
            &Bindings::Positional(vec![json!(7)]),
            true,
            false,
        )
        .expect("second query");

    assert_eq!(
        entries(&journal)[1..],
        [
            "execute ALTER SESSION SET CURRENT_SCHEMA = ANALYTICS",
            "execute select * from orders",
            "commit",
            "execute ALTER SESSION SET CURRENT_SCHEMA = ANALYTICS",
            "execute delete from orders where id = :1 [7]",
            "commit",
        ]
    );
    assert!(conn.transaction_open());
}

#[test]
fn test_add_query_with_debug_logging_and_abridged_sql() {
    let mut creds = credentials();
    creds.debug_log_commands = true;
    let (manager, mut conn, journal) = setup(creds, Faults::default());
    manager.open(&mut conn).expect("open");

    let mark = capture_logs();

    let long_sql = format!("select 1 from dual where 'x' = '{}'", "x".repeat(1000));
    manager
        .add_query(&mut conn, &long_sql, &Bindings::None, false, true)
        .expect("query");

    assert_eq!(entries(&journal).last().map(String::as_str), Some("commit"));
    assert!(!conn.transaction_open());

    let events = logged_since(mark, EVENT_TARGET);
    assert_eq!(events.len(), 2, "{:?}", events);
    let head: String = long_sql.chars().take(512).collect();
    assert_eq!(events[0], format!("[E040] On model.jaffle.orders: {}....", head));
    let status = events[1]
        .strip_prefix("[E040] SQL status: OK in ")
        .and_then(|rest| rest.strip_suffix(" seconds."))
        .expect("status event");
    let (secs, hundredths) = status.split_once('.').expect("two decimals");
    assert!(secs.parse::<u64>().is_ok());
    assert_eq!(hundredths.len(), 2);
}

#[test]
fn test_add_query_logs_full_sql_when_not_abridged() {
    let mut creds = credentials();
    creds.debug_log_commands = true;
    let (manager, mut conn, _journal) = setup(creds, Faults::default());
    manager.open(&mut conn).expect("open");
    let mark = capture_logs();

    let sql = format!("select '{}' from dual", "y".repeat(600));
    manager
        .add_query(&mut conn, &sql, &Bindings::None, false, false)
        .expect("query");

    let events = logged_since(mark, EVENT_TARGET);
    assert_eq!(events[0], format!("[E040] On model.jaffle.orders: {}.", sql));
}

#[test]
fn test_add_query_fires_no_events_without_debug_logging() {
    let (manager, mut conn, _journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");
    let mark = capture_logs();

    manager
        .add_query(&mut conn, "update orders set status = 'shipped'", &Bindings::None, false, true)
        .expect("query");

    assert!(logged_since(mark, EVENT_TARGET).is_empty());
    let manager_logs = logged_since(mark, "oracle_adapter::oracle::manager");
    assert!(manager_logs.contains(&"On model.jaffle.orders: 3 rows affected".to_string()), "{:?}", manager_logs);
}

#[test]
fn test_database_error_releases_and_reports_sql() {
    let sql = "insert into orders values (1)";
    let faults = Faults {
        execute: Some((
            sql.to_string(),
            DriverError::Database("ORA-00001: unique constraint (ANALYTICS.PK_ORDERS) violated\n".to_string()),
        )),
        ..Faults::default()
    };
    let (manager, mut conn, journal) = setup(credentials(), faults);
    manager.open(&mut conn).expect("open");

    let err = manager
        .add_query(&mut conn, sql, &Bindings::None, true, false)
        .unwrap_err();

    match &err {
        AdapterError::QueryFailure { sql: failed_sql, message } => {
            assert_eq!(failed_sql, sql);
            assert_eq!(message, "ORA-00001: unique constraint (ANALYTICS.PK_ORDERS) violated");
        }
        other => panic!("expected query failure, got {:?}", other),
    }
    let rendered = err.to_string();
    assert!(rendered.contains(sql));
    assert!(rendered.contains("ORA-00001"));

    let log = entries(&journal);
    assert_eq!(log[log.len() - 2..], ["rollback", "close"]);
    assert_eq!(conn.state().name(), "closed");
    assert!(!conn.transaction_open());
}

#[test]
fn test_release_failure_during_database_error_is_not_escalated() {
    let sql = "select * from missing_table";
    let faults = Faults {
        execute: Some((sql.to_string(), DriverError::Database("ORA-00942: table or view does not exist".to_string()))),
        rollback: true,
        close: true,
        ..Faults::default()
    };
    let (manager, mut conn, _journal) = setup(credentials(), faults);
    manager.open(&mut conn).expect("open");

    let err = manager
        .add_query(&mut conn, sql, &Bindings::None, true, false)
        .unwrap_err();

    assert!(matches!(err, AdapterError::QueryFailure { .. }));
    assert!(err.to_string().contains("ORA-00942"));
}

#[test]
fn test_interface_error_is_wrapped_as_runtime_failure() {
    let sql = "select :1 from dual";
    let faults = Faults {
        execute: Some((sql.to_string(), DriverError::Interface("invalid bind value".to_string()))),
        ..Faults::default()
    };
    let (manager, mut conn, journal) = setup(credentials(), faults);
    manager.open(&mut conn).expect("open");

    let err = manager
        .add_query(&mut conn, sql, &Bindings::None, false, false)
        .unwrap_err();

    match err {
        AdapterError::Runtime(failure) => {
            assert_eq!(failure.message(), "invalid bind value");
            let source = failure.source().expect("cause kept");
            assert!(source.downcast_ref::<DriverError>().is_some());
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
    assert_eq!(entries(&journal).last().map(String::as_str), Some("close"));
}

#[test]
fn test_runtime_failure_passes_through_unchanged() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");

    let result: Result<(), AdapterError> = manager.exception_handler(&mut conn, "select 1 from dual", |_| {
        Err(ExecutionError::Runtime(RuntimeFailure::caused_by(Box::new(Interrupted))))
    });

    match result.unwrap_err() {
        AdapterError::Runtime(failure) => {
            assert_eq!(failure.message(), "keyboard interrupt");
            // Not re-wrapped: the cause is still the original error, not another RuntimeFailure
            let source = failure.source().expect("source");
            assert!(source.downcast_ref::<Interrupted>().is_some());
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
    assert_eq!(entries(&journal).last().map(String::as_str), Some("close"));
    assert_eq!(conn.state().name(), "closed");
}

#[test]
fn test_runtime_failure_survives_failed_release() {
    let faults = Faults { close: true, ..Faults::default() };
    let (manager, mut conn, journal) = setup(credentials(), faults);
    manager.open(&mut conn).expect("open");

    let result: Result<(), AdapterError> = manager.exception_handler(&mut conn, "select 1 from dual", |_| {
        Err(ExecutionError::Runtime(RuntimeFailure::caused_by(Box::new(Interrupted))))
    });

    match result.unwrap_err() {
        AdapterError::Runtime(failure) => {
            assert_eq!(failure.message(), "keyboard interrupt");
            assert!(failure.source().and_then(|s| s.downcast_ref::<Interrupted>()).is_some());
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
    assert_eq!(entries(&journal).last().map(String::as_str), Some("close"));
    assert_eq!(conn.state().name(), "closed");
}

#[test]
fn test_other_error_is_wrapped_with_cause() {
    let (manager, mut conn, _journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");

    let result: Result<(), AdapterError> =
        manager.exception_handler(&mut conn, "select 1 from dual", |_| Err(ExecutionError::other(Interrupted)));

    match result.unwrap_err() {
        AdapterError::Runtime(failure) => {
            assert_eq!(failure.to_string(), "keyboard interrupt");
            assert!(failure.source().and_then(|s| s.downcast_ref::<Interrupted>()).is_some());
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
}

#[test]
fn test_query_on_closed_connection_is_runtime_failure() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());

    let err = manager
        .add_query(&mut conn, "select 1 from dual", &Bindings::None, false, false)
        .unwrap_err();

    assert!(matches!(err, AdapterError::Runtime(_)));
    assert!(err.to_string().contains("is not open"));
    assert!(entries(&journal).is_empty());
}

#[test]
fn test_begin_and_commit_track_transaction() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");

    manager.begin(&mut conn).expect("begin");
    assert!(conn.transaction_open());

    let err = manager.begin(&mut conn).unwrap_err();
    assert!(err.to_string().contains("already had one open"));

    manager.commit(&mut conn).expect("commit");
    assert!(!conn.transaction_open());
    assert_eq!(entries(&journal)[1..], ["execute COMMIT", "commit"]);

    let err = manager.commit(&mut conn).unwrap_err();
    assert!(err.to_string().contains("does not have one open"));
}

#[test]
fn test_add_begin_query_sends_nothing() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");

    let mut cursor = manager.add_begin_query(&mut conn).expect("cursor");

    assert!(cursor.fetch_all().is_empty());
    assert_eq!(entries(&journal).len(), 1);
}

#[test]
fn test_execute_fetches_rows_and_reports_ok() {
    let (manager, mut conn, _journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");

    let (response, rows) = manager
        .execute(&mut conn, "select 1 as ok from dual", false, true)
        .expect("execute");
    assert_eq!(response.message, "OK");
    assert_eq!(rows, vec![json!({ "OK": 1 })]);

    let (_, rows) = manager
        .execute(&mut conn, "select 1 as ok from dual", false, false)
        .expect("execute");
    assert!(rows.is_empty());
}

#[test]
fn test_status_is_constant() {
    let (manager, mut conn, _journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");
    let cursor = manager
        .add_query(&mut conn, "update orders set status = 'shipped'", &Bindings::None, false, false)
        .expect("query");

    assert_eq!(OracleConnectionManager::<RecordingDriver>::get_status(&cursor).message, "OK");
    assert_eq!(OracleConnectionManager::<RecordingDriver>::get_response(&cursor).to_string(), "OK");
}

#[test]
fn test_cancel_closes_handle() {
    let (manager, mut conn, journal) = setup(credentials(), Faults::default());
    manager.open(&mut conn).expect("open");

    manager.cancel(&mut conn).expect("cancel");

    assert_eq!(conn.state().name(), "closed");
    assert_eq!(entries(&journal).last().map(String::as_str), Some("close"));
}

#[test]
fn test_cancel_close_failure_is_runtime_failure() {
    let faults = Faults { close: true, ..Faults::default() };
    let (manager, mut conn, _journal) = setup(credentials(), faults);
    manager.open(&mut conn).expect("open");

    let err = manager.cancel(&mut conn).unwrap_err();

    assert!(matches!(err, AdapterError::Runtime(_)));
    assert!(err.to_string().contains("DPI-1010"));
}

#[test]
fn test_credentials_are_shared_not_copied() {
    let creds = Arc::new(credentials());
    let conn: Connection<RecordingHandle> = Connection::new("model.jaffle.orders", Arc::clone(&creds));

    let seen = OracleConnectionManager::<RecordingDriver>::get_credentials(&conn);

    assert!(std::ptr::eq(seen, creds.as_ref()));
    assert_eq!(seen.type_name(), "oracle");
}
