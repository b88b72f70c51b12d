//! Logging abstraction
//!
//! Unified logging macros that work across targets:
//! - Embedded with the `defmt` feature: routed to defmt
//! - Host tests: `println!`
//! - Host non-test without defmt: no-op
//!
//! Keep format strings to plain `{}` placeholders so the same string is
//! valid for both defmt and `core::fmt`.

/// Log at info level.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);
        #[cfg(all(not(feature = "defmt"), test))]
        ::std::println!($($arg)*);
        #[cfg(all(not(feature = "defmt"), not(test)))]
        { let _ = ($($arg)*,); }
    }};
}

/// Log at warn level.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);
        #[cfg(all(not(feature = "defmt"), test))]
        ::std::println!($($arg)*);
        #[cfg(all(not(feature = "defmt"), not(test)))]
        { let _ = ($($arg)*,); }
    }};
}

/// Log at error level.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)*);
        #[cfg(all(not(feature = "defmt"), test))]
        ::std::println!($($arg)*);
        #[cfg(all(not(feature = "defmt"), not(test)))]
        { let _ = ($($arg)*,); }
    }};
}
