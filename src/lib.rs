//! gf-display - fallback shell monitor configuration
//!
//! Decides which outputs a legacy (RandR/KMS style) display server should
//! drive, at which mode and position. The engine enumerates the hardware,
//! groups outputs into monitors, matches them against persisted
//! configurations (or synthesizes a default one), solves the CRTC
//! assignment and hands the result to a [`backend::DisplayBackend`].
//!
//! The entry point is [`MonitorManager`]. It is single-threaded and meant to
//! be driven from the display server's main loop; tests drive it through
//! [`testing::Fixture`].

pub mod assign;
pub mod backend;
pub mod config;
#[cfg(feature = "dbus")]
pub mod dbus;
pub mod default_config;
pub mod edid;
pub mod event;
pub mod hardware;
pub mod lid;
pub mod logical_monitor;
pub mod manager;
pub mod monitor;
pub mod rect;
pub mod testing;
pub mod transform;
mod tracy;

pub use assign::{assign_crtcs, AssignError, CrtcAssignment};
pub use backend::DisplayBackend;
pub use config::{ConfigStore, Configuration, OutputConfig, OutputKey};
pub use event::{ConfigSource, Event};
pub use hardware::Hardware;
pub use logical_monitor::LogicalMonitor;
pub use manager::{DisplayState, ManagerSettings, MonitorManager};
pub use monitor::Monitor;
pub use rect::Rectangle;
pub use transform::MonitorTransform;

/// Initialize tracing. Safe to call more than once.
///
/// Logs go to journald when it is reachable and to stderr otherwise;
/// `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    use std::sync::Once;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    static INIT_LOG: Once = Once::new();
    INIT_LOG.call_once(|| {
        let default_filter = "gf_display=debug";
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // Try journald first, fall back to stderr
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter)
                .with(journald.with_syslog_identifier("gf-display".to_string()))
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    });
}
