// src/diagnostics.rs
//! Logging setup and the backend's log callback.

use std::ffi::{c_char, CStr};

use log::LevelFilter;

/// Log target used for messages coming out of the native backend.
pub const BACKEND_LOG_TARGET: &str = "hair_backend";

/// Installs the process logger at `level`, letting `RUST_LOG` override it.
///
/// Returns `false` if a logger was already installed (e.g. by the host).
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(level: LevelFilter) -> bool {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .parse_default_env()
        .try_init()
        .is_ok()
}

#[cfg(target_arch = "wasm32")]
pub fn init_logging(level: LevelFilter) -> bool {
    log::set_max_level(level);
    false
}

/// Default level: debug in debug builds, warnings only in release.
pub fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Callback handed to the native backend. Forwards its messages into `log`.
///
/// # Safety
/// `message` must be null or point to a NUL-terminated string that stays
/// valid for the duration of the call.
pub unsafe extern "C" fn backend_log_sink(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let text = CStr::from_ptr(message).to_string_lossy();
    let text = text.trim_end();
    if !text.is_empty() {
        log::info!(target: BACKEND_LOG_TARGET, "{text}");
    }
}
