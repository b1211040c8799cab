//! Tracy profiling integration
//!
//! This module provides Tracy profiling macros that compile to no-ops when
//! the `profile-with-tracy` feature is disabled.
//!
//! The interesting spans are the CRTC solver and default configuration
//! synthesis, both of which can take a while with many outputs and modes.
//!
//! # Usage
//!
//! ```ignore
//! fn assign_crtcs() {
//!     tracy_span!("assign_crtcs");
//!     // ... search
//! }
//! ```

/// Create a Tracy span for the current scope.
/// Compiles to no-op when tracy feature is disabled.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_span {
    ($name:expr) => {
        let _span = tracy_client::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_span {
    ($name:expr) => {};
}
