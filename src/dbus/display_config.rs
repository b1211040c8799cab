//! org.gnome.Mutter.DisplayConfig D-Bus interface implementation
//!
//! Read-only: `GetCurrentState` reports the last published
//! [`DisplayState`]. Settings panels and xdg-desktop-portal-gnome use it to
//! enumerate monitors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;
use zbus::blocking::Connection;
use zbus::zvariant::{OwnedValue, Type, Value};
use zbus::{fdo, interface};

use super::Start;
use crate::manager::{DisplayState, MonitorState};
use crate::monitor::MonitorSpec;

/// `GetCurrentState` layout-mode: logical monitors are laid out in physical
/// pixels.
const LAYOUT_MODE_PHYSICAL: u32 = 2;

/// DisplayConfig D-Bus interface
#[derive(Clone)]
pub struct DisplayConfig {
    state: Arc<Mutex<DisplayState>>,
}

impl DisplayConfig {
    pub fn new(state: Arc<Mutex<DisplayState>>) -> Self {
        Self { state }
    }
}

type MonitorNames = (String, String, String, String);

fn names(spec: &MonitorSpec) -> MonitorNames {
    (
        spec.connector.clone(),
        spec.vendor.clone(),
        spec.product.clone(),
        spec.serial.clone(),
    )
}

fn owned(value: Value<'_>) -> fdo::Result<OwnedValue> {
    OwnedValue::try_from(value).map_err(|err| fdo::Error::Failed(err.to_string()))
}

#[derive(Serialize, Type)]
pub struct Monitor {
    names: MonitorNames,
    modes: Vec<Mode>,
    properties: HashMap<String, OwnedValue>,
}

#[derive(Serialize, Type)]
pub struct Mode {
    id: String,
    width: i32,
    height: i32,
    refresh_rate: f64,
    preferred_scale: f64,
    supported_scales: Vec<f64>,
    properties: HashMap<String, OwnedValue>,
}

#[derive(Serialize, Type)]
pub struct LogicalMonitor {
    x: i32,
    y: i32,
    scale: f64,
    transform: u32,
    is_primary: bool,
    monitors: Vec<MonitorNames>,
    properties: HashMap<String, OwnedValue>,
}

fn monitor(state: &MonitorState) -> fdo::Result<Monitor> {
    let mut modes = Vec::with_capacity(state.modes.len());
    for mode in &state.modes {
        let mut properties = HashMap::new();
        if mode.is_current {
            properties.insert("is-current".to_string(), owned(Value::Bool(true))?);
        }
        if mode.is_preferred {
            properties.insert("is-preferred".to_string(), owned(Value::Bool(true))?);
        }
        modes.push(Mode {
            id: mode.id.clone(),
            width: mode.width,
            height: mode.height,
            refresh_rate: f64::from(mode.refresh_rate),
            preferred_scale: f64::from(mode.preferred_scale),
            supported_scales: mode.supported_scales.iter().copied().map(f64::from).collect(),
            properties,
        });
    }

    let mut properties = HashMap::new();
    properties.insert(
        "display-name".to_string(),
        owned(Value::from(state.display_name.as_str()))?,
    );
    properties.insert("is-builtin".to_string(), owned(Value::Bool(state.is_builtin))?);
    properties.insert("width-mm".to_string(), owned(Value::I32(state.width_mm))?);
    properties.insert("height-mm".to_string(), owned(Value::I32(state.height_mm))?);
    if state.supports_underscanning {
        properties.insert(
            "is-underscanning".to_string(),
            owned(Value::Bool(state.is_underscanning))?,
        );
    }

    Ok(Monitor {
        names: names(&state.spec),
        modes,
        properties,
    })
}

/// `GetCurrentState` reply: serial, monitors, logical monitors, properties.
pub type CurrentState = (
    u32,
    Vec<Monitor>,
    Vec<LogicalMonitor>,
    HashMap<String, OwnedValue>,
);

fn current_state(state: &DisplayState) -> fdo::Result<CurrentState> {
    let monitors = state
        .monitors
        .iter()
        .map(monitor)
        .collect::<fdo::Result<Vec<_>>>()?;

    let logical_monitors = state
        .logical_monitors
        .iter()
        .map(|lm| LogicalMonitor {
            x: lm.rect.x,
            y: lm.rect.y,
            scale: f64::from(lm.scale),
            transform: lm.transform.to_int(),
            is_primary: lm.is_primary,
            monitors: lm
                .monitors
                .iter()
                .filter_map(|&index| state.monitors.get(index))
                .map(|m| names(&m.spec))
                .collect(),
            properties: HashMap::new(),
        })
        .collect();

    let properties = HashMap::from([
        (
            "layout-mode".to_string(),
            owned(Value::U32(LAYOUT_MODE_PHYSICAL))?,
        ),
        (
            "supports-changing-layout-mode".to_string(),
            owned(Value::Bool(false))?,
        ),
        (
            "max-screen-size".to_string(),
            owned(Value::from((state.max_screen_width, state.max_screen_height)))?,
        ),
    ]);

    Ok((state.serial, monitors, logical_monitors, properties))
}

impl DisplayConfig {
    /// The reply for the last published state.
    pub fn current_state(&self) -> fdo::Result<CurrentState> {
        let state = self
            .state
            .lock()
            .map_err(|_| fdo::Error::Failed("display state poisoned".to_string()))?;
        debug!(
            "DisplayConfig::get_current_state(): {} monitors",
            state.monitors.len()
        );
        current_state(&state)
    }
}

#[interface(name = "org.gnome.Mutter.DisplayConfig")]
impl DisplayConfig {
    /// Get the current display configuration state
    async fn get_current_state(&self) -> fdo::Result<CurrentState> {
        self.current_state()
    }

    #[zbus(property)]
    fn power_save_mode(&self) -> i32 {
        -1
    }

    #[zbus(property)]
    fn panel_orientation_managed(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn apply_monitors_config_allowed(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn night_light_supported(&self) -> bool {
        false
    }
}

impl Start for DisplayConfig {
    fn start(self) -> anyhow::Result<Connection> {
        use zbus::fdo::RequestNameFlags;

        let conn = zbus::blocking::Connection::session()?;
        let flags = RequestNameFlags::AllowReplacement
            | RequestNameFlags::ReplaceExisting
            | RequestNameFlags::DoNotQueue;

        conn.object_server()
            .at("/org/gnome/Mutter/DisplayConfig", self)?;
        conn.request_name_with_flags("org.gnome.Mutter.DisplayConfig", flags)?;

        Ok(conn)
    }
}
