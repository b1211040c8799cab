//! D-Bus export of the display state
//!
//! Implements:
//! - org.gnome.Mutter.DisplayConfig (read-only `GetCurrentState`)
//!
//! The monitor manager is single-threaded and `!Send`, so the interface does
//! not talk to it. Instead the owner publishes [`DisplayState`] snapshots
//! into a shared slot after every change and the interface serves the latest
//! one from zbus' own thread.

pub mod display_config;

use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use zbus::blocking::Connection;
use zbus::object_server::Interface;

pub use display_config::DisplayConfig;

use crate::manager::DisplayState;

/// Trait for starting D-Bus interfaces
trait Start: Interface {
    fn start(self) -> anyhow::Result<Connection>;
}

/// Shared slot the owner of the manager publishes snapshots into.
#[derive(Clone)]
pub struct StatePublisher {
    state: Arc<Mutex<DisplayState>>,
}

impl StatePublisher {
    pub fn new(initial: DisplayState) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
        }
    }

    /// An interface serving whatever was last published here.
    pub fn display_config(&self) -> DisplayConfig {
        DisplayConfig::new(self.state.clone())
    }

    pub fn publish(&self, state: DisplayState) {
        match self.state.lock() {
            Ok(mut slot) => *slot = state,
            Err(_) => warn!("Display state lock poisoned, dropping update"),
        }
    }
}

/// D-Bus server connections
#[derive(Default)]
pub struct DBusServers {
    pub conn_display_config: Option<Connection>,
}

impl DBusServers {
    pub fn start(publisher: &StatePublisher) -> Self {
        let dbus = Self {
            conn_display_config: try_start(publisher.display_config()),
        };
        info!("D-Bus servers started");
        dbus
    }
}

fn try_start<I: Start>(iface: I) -> Option<Connection> {
    let name = I::name();
    match iface.start() {
        Ok(conn) => {
            info!(
                "Started D-Bus interface {} (unique_name: {:?})",
                name,
                conn.unique_name()
            );
            Some(conn)
        }
        Err(err) => {
            warn!("Failed to start D-Bus interface {}: {err:?}", name);
            None
        }
    }
}
