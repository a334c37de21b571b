use std::env;
use std::sync::Arc;

use oracle_adapter::oracle::client;
use oracle_adapter::oracle::{
  Connection, Credentials, OciDriver, OracleConnectionManager,
};

fn print_json<T: serde::Serialize>(value: &T) {
  match serde_json::to_string_pretty(value) {
    Ok(s) => println!("{}", s),
    Err(e) => eprintln!("failed to serialize: {}", e),
  }
}

fn usage() {
  eprintln!(
    "Oracle Smoke CLI\n\n\
    Commands:\n\
      ready [<dir>]                         Check Oracle Client detection\n\
      dsn <profile.json>                    Show connection method, DSN and profile fields\n\
      debug <profile.json>                  Open a connection and run SELECT 1 FROM dual\n\
    "
  );
}

fn load_profile(path: &str) -> Result<Credentials, i32> {
  Credentials::from_json_file(path).map_err(|e| {
    eprintln!("{}", e);
    2
  })
}

fn cmd_ready(dir: Option<&str>) -> i32 {
  let path = client::resolve_client_path(dir);
  let installed = client::check_client_ready(dir);
  print_json(&serde_json::json!({
    "installed": installed,
    "lib_name": client::ORACLE_LIB_NAME,
    "lib_dir": path.map(|p| p.display().to_string()),
  }));
  if installed { 0 } else { 1 }
}

fn cmd_dsn(path: &str) -> i32 {
  let creds = match load_profile(path) { Ok(c) => c, Err(code) => return code };

  let mut fields = serde_json::Map::new();
  for (key, value) in creds.connection_info() {
    fields.insert(key.to_string(), serde_json::Value::String(value));
  }
  print_json(&serde_json::json!({
    "type": creds.type_name(),
    "dsn": creds.dsn(),
    "descriptor": creds.descriptor(),
    "connection": fields,
  }));
  0
}

fn cmd_debug(path: &str) -> i32 {
  let creds = match load_profile(path) { Ok(c) => c, Err(code) => return code };

  let manager = OracleConnectionManager::new(OciDriver::from_credentials(&creds));
  let mut connection = Connection::new("debug", Arc::new(creds));

  if let Err(e) = manager.open(&mut connection) {
    eprintln!("Connection test: ERROR\n{}", e);
    return 3;
  }

  let code = match manager.execute(&mut connection, "SELECT 1 AS ok FROM dual", false, true) {
    Ok((response, rows)) => {
      println!("Connection test: {}", response);
      print_json(&serde_json::json!({ "response": response, "rows": rows }));
      0
    }
    Err(e) => {
      eprintln!("Query failed: {}", e);
      4
    }
  };

  if let Err(e) = manager.release(&mut connection) {
    eprintln!("Failed to close connection: {}", e);
  }
  code
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let args: Vec<String> = env::args().collect();
  if args.len() < 2 {
    usage();
    std::process::exit(1);
  }

  let code = match args[1].as_str() {
    "ready" => cmd_ready(args.get(2).map(String::as_str)),
    "dsn" => {
      if args.len() < 3 { eprintln!("Usage: dsn <profile.json>"); 2 } else { cmd_dsn(&args[2]) }
    }
    "debug" => {
      if args.len() < 3 { eprintln!("Usage: debug <profile.json>"); 2 } else { cmd_debug(&args[2]) }
    }
    _ => { usage(); 1 }
  };

  std::process::exit(code);
}
