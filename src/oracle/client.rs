/// Oracle Client library detection and loading
///
/// ODPI-C loads the Oracle Client (Instant Client or a full install) at
/// runtime. This module finds the shared library, validates it and keeps it
/// loaded globally so later connections resolve against it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Static reference to the Oracle client library (loaded via libloading)
static ORACLE_CLIENT: OnceLock<Mutex<Option<libloading::Library>>> = OnceLock::new();

/// Oracle client library filename for the current platform
#[cfg(target_os = "macos")]
pub const ORACLE_LIB_NAME: &str = "libclntsh.dylib";

#[cfg(target_os = "windows")]
pub const ORACLE_LIB_NAME: &str = "oci.dll";

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const ORACLE_LIB_NAME: &str = "libclntsh.so";

/// Smallest plausible size of the client library
const MIN_LIB_SIZE: u64 = 1_048_576;

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn has_library(dir: &Path) -> bool {
    dir.join(ORACLE_LIB_NAME).exists()
}

/// Resolves the Oracle client directory
///
/// A custom path is returned as given (after `~/` expansion). Otherwise the
/// first of `$ORACLE_HOME/lib`, `$ORACLE_HOME` and `~/lib` that contains the
/// client library wins. `None` means the driver's own search applies.
pub fn resolve_client_path(custom_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path_str) = custom_path {
        return Some(expand_home(path_str));
    }

    let mut candidates = Vec::new();
    if let Some(oracle_home) = std::env::var_os("ORACLE_HOME") {
        let oracle_home = PathBuf::from(oracle_home);
        candidates.push(oracle_home.join("lib"));
        candidates.push(oracle_home);
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("lib"));
    }

    candidates.into_iter().find(|dir| has_library(dir))
}

/// Why a library file cannot be handed to ODPI-C
fn library_defect(lib_path: &Path) -> Option<String> {
    // metadata() follows links, so a dangling symlink surfaces as NotFound
    let metadata = match std::fs::metadata(lib_path) {
        Ok(metadata) => metadata,
        Err(e) if lib_path.is_symlink() => return Some(format!("symlink target is unreadable ({})", e)),
        Err(e) => return Some(e.to_string()),
    };
    if !metadata.is_file() {
        return Some("not a regular file".to_string());
    }
    if metadata.len() < MIN_LIB_SIZE {
        return Some(format!("only {} bytes, expected at least {}", metadata.len(), MIN_LIB_SIZE));
    }
    None
}

/// Checks if the Oracle client library is usable
///
/// The library must resolve (through any symlink) to a regular file of a
/// plausible size. Does not load it.
pub fn check_client_ready(custom_path: Option<&str>) -> bool {
    let Some(client_dir) = resolve_client_path(custom_path) else {
        log::debug!("No Oracle client directory found");
        return false;
    };
    let lib_path = client_dir.join(ORACLE_LIB_NAME);

    match library_defect(&lib_path) {
        None => {
            log::info!("Oracle client library found: {:?}", lib_path);
            true
        }
        Some(defect) => {
            log::warn!("Oracle client library at {:?} is unusable: {}", lib_path, defect);
            false
        }
    }
}

/// Loads the Oracle client library for the lifetime of the process
///
/// On unix the library is opened with `RTLD_GLOBAL` so that ODPI-C finds the
/// already-loaded symbols instead of searching the library path again.
pub fn prime_client(custom_path: Option<&str>) -> Result<(), String> {
    let client_dir = resolve_client_path(custom_path)
        .ok_or_else(|| format!("Oracle client library {} not found. Set ORACLE_HOME or client_lib_dir.", ORACLE_LIB_NAME))?;
    let lib_path = client_dir.join(ORACLE_LIB_NAME);

    if !lib_path.exists() {
        return Err(format!(
            "Oracle client library not found at: {}. Please install Oracle Instant Client.",
            lib_path.display()
        ));
    }

    #[cfg(unix)]
    let library = unsafe {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
        let unix_lib = UnixLibrary::open(Some(&lib_path), RTLD_NOW | RTLD_GLOBAL)
            .map_err(|e| format!("Failed to load Oracle client library: {}", e))?;
        libloading::Library::from(unix_lib)
    };

    #[cfg(not(unix))]
    let library = unsafe {
        libloading::Library::new(&lib_path)
            .map_err(|e| format!("Failed to load Oracle client library: {}", e))?
    };

    let mutex = ORACLE_CLIENT.get_or_init(|| Mutex::new(None));
    let mut guard = mutex
        .lock()
        .map_err(|e| format!("Failed to acquire lock on Oracle client: {}", e))?;

    *guard = Some(library);

    log::info!("Oracle client library loaded from: {:?}", lib_path);
    Ok(())
}

/// Checks if the Oracle client has been primed (loaded)
pub fn is_client_primed() -> bool {
    if let Some(mutex) = ORACLE_CLIENT.get() {
        if let Ok(guard) = mutex.lock() {
            return guard.is_some();
        }
    }
    false
}
