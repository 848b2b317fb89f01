//! Logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! The topology poll runs twice a second and capture walks every top-level
//! window, so those modules get a switch to silence themselves without
//! touching the global `RUST_LOG` filter:
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("captured {} windows", count);
//! ```

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Info-level log that compiles to nothing useful when the calling module's
/// `ENABLE_LOGS` is false.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors are still gated: a module that silences itself is expected to
/// surface failures through its return values instead.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
