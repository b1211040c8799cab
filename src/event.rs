//! Events queued by the monitor manager.
//!
//! These replace signal emission: the manager pushes them as things happen
//! and the embedding shell drains them with
//! [`MonitorManager::drain_events`](crate::manager::MonitorManager::drain_events).
//! They serialize to JSON for the debugging binary.

use std::path::PathBuf;

use serde::Serialize;

/// Where an applied configuration came from.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Found in the configuration store
    Stored,
    /// Synthesized from the hardware
    Default,
    /// Rolled back to the previous configuration
    Previous,
    /// Derived from another configuration for a closed lid
    LaptopLid,
    /// Only the primary output, bound without the solver
    Fallback,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "event")]
pub enum Event {
    /// Hardware was re-read and monitors were rebuilt
    #[serde(rename = "monitors_changed")]
    MonitorsChanged {
        n_monitors: usize,
        n_logical_monitors: usize,
    },
    /// A configuration was programmed into the backend
    #[serde(rename = "configuration_applied")]
    ConfigurationApplied {
        source: ConfigSource,
        n_outputs: usize,
        n_enabled: usize,
    },
    /// A configuration could not be assigned or applied
    #[serde(rename = "configuration_failed")]
    ConfigurationFailed { source: ConfigSource, reason: String },
    #[serde(rename = "lid_closed_changed")]
    LidClosedChanged { closed: bool },
    #[serde(rename = "backlight_changed")]
    BacklightChanged { output: String, value: i32 },
    /// A background save finished
    #[serde(rename = "configuration_saved")]
    ConfigurationSaved {
        path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
