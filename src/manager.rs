//! The monitor manager: reading hardware, choosing and applying
//! configurations, and keeping the store up to date.
//!
//! # Design Invariants
//!
//! 1. **One thread**: the manager holds `Rc`s and is `!Send`. Hotplug, lid
//!    and user requests are all fed in from the thread that owns it; only
//!    saving `monitors.xml` runs elsewhere.
//!
//! 2. **Monitors follow hardware**: every time the hardware arena changes
//!    (re-read or an assignment mirrored into it) monitors and logical
//!    monitors are rebuilt from scratch.
//!
//! 3. **Lid configurations are transient**: a configuration derived for a
//!    closed lid is applied but never becomes `current`, is never stored, and
//!    remembers the configuration it was derived from so opening the lid can
//!    bring that back.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::assign::{assign_crtcs, CrtcAssignment};
use crate::backend::DisplayBackend;
use crate::config::persist::{self, Saver};
use crate::config::{xml, ConfigKey, ConfigStore, Configuration};
use crate::default_config::{make_default_config, primary_only_assignment};
use crate::event::{ConfigSource, Event};
use crate::hardware::Hardware;
use crate::lid::make_lid_config;
use crate::logical_monitor::{build_logical_monitors, screen_size, LogicalMonitor};
use crate::monitor::scale::{calculate_scale, calculate_supported_scales, ScalesConstraint};
use crate::monitor::{build_monitors, Monitor, MonitorSpec};

/// Manager settings, usually deserialized from the embedding shell's
/// configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Scale for every logical monitor instead of the computed one.
    pub scale_override: Option<f32>,
    /// Offer fractional scales in the display state.
    pub fractional_scaling: bool,
    /// File configurations are loaded from first and saved to. `None`
    /// disables saving.
    pub persist_path: Option<PathBuf>,
    /// Read-only fallbacks tried after `persist_path`.
    pub system_paths: Vec<PathBuf>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            scale_override: None,
            fractional_scaling: false,
            persist_path: persist::user_config_path(),
            system_paths: persist::system_config_paths(),
        }
    }
}

pub struct MonitorManager<B: DisplayBackend> {
    backend: B,
    settings: ManagerSettings,
    hw: Hardware,
    monitors: Vec<Monitor>,
    logical_monitors: Vec<LogicalMonitor>,
    store: ConfigStore,
    lid_closed: bool,
    /// Set while a lid configuration is applied: what it was derived from.
    lid_base: Option<Rc<Configuration>>,
    events: VecDeque<Event>,
    saver: Saver,
    serial: u32,
}

impl<B: DisplayBackend> MonitorManager<B> {
    /// Load stored configurations and read the hardware. Nothing is applied
    /// until the first `on_hotplug` or `apply_stored`/`apply_default`.
    pub fn new(mut backend: B, settings: ManagerSettings) -> anyhow::Result<Self> {
        let candidates: Vec<PathBuf> = settings
            .persist_path
            .iter()
            .chain(&settings.system_paths)
            .cloned()
            .collect();
        let store = ConfigStore::from_configs(persist::load_first(
            candidates.iter().map(PathBuf::as_path),
        ));
        info!("{} stored monitor configurations", store.len());

        let hw = backend
            .read_current()
            .context("reading initial display hardware")?;

        let mut manager = Self {
            backend,
            settings,
            hw,
            monitors: Vec::new(),
            logical_monitors: Vec::new(),
            store,
            lid_closed: false,
            lid_base: None,
            events: VecDeque::new(),
            saver: Saver::new(),
            serial: 0,
        };
        manager.rebuild_monitors();
        Ok(manager)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hw
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn logical_monitors(&self) -> &[LogicalMonitor] {
        &self.logical_monitors
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Incremented every time monitors are rebuilt.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn is_lid_closed(&self) -> bool {
        self.lid_closed
    }

    /// True while a lid configuration derived from another one is applied.
    pub fn is_lid_config_active(&self) -> bool {
        self.lid_base.is_some()
    }

    pub fn screen_size(&self) -> (i32, i32) {
        screen_size(&self.logical_monitors)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    fn primary_monitor(&self) -> Option<&Monitor> {
        self.monitors
            .iter()
            .filter(|m| m.is_active())
            .find(|m| m.is_primary(&self.hw))
            .or_else(|| self.monitors.iter().find(|m| m.is_active()))
    }

    fn global_scale(&self) -> f32 {
        if let Some(scale) = self.settings.scale_override {
            return scale;
        }
        self.primary_monitor()
            .and_then(|monitor| {
                let mode = monitor.mode(monitor.current_mode()?);
                Some(calculate_scale(&self.hw, monitor, mode))
            })
            .unwrap_or(1.0)
    }

    fn rebuild_monitors(&mut self) {
        self.monitors = build_monitors(&self.hw);
        // Scale needs active monitors but not their logical monitors.
        let scale = self.global_scale();
        self.logical_monitors = build_logical_monitors(&self.hw, &mut self.monitors, scale);
        self.serial = self.serial.wrapping_add(1);

        debug!(
            "{} monitors, {} logical monitors at scale {}",
            self.monitors.len(),
            self.logical_monitors.len(),
            scale
        );
        self.events.push_back(Event::MonitorsChanged {
            n_monitors: self.monitors.len(),
            n_logical_monitors: self.logical_monitors.len(),
        });
    }

    /// Re-enumerate the hardware and rebuild monitors.
    pub fn read_current(&mut self) -> anyhow::Result<()> {
        self.hw = self
            .backend
            .read_current()
            .context("reading display hardware")?;
        self.rebuild_monitors();
        Ok(())
    }

    /// Outputs came or went: re-read and apply the stored configuration for
    /// the new set of outputs, or a default one.
    pub fn on_hotplug(&mut self) -> anyhow::Result<()> {
        self.read_current()?;
        if !self.apply_stored() {
            self.apply_default();
        }
        Ok(())
    }

    /// Apply the stored configuration matching the connected outputs.
    pub fn apply_stored(&mut self) -> bool {
        let key = ConfigKey::from_hardware(&self.hw);
        match self.store.lookup(&key) {
            Some(config) => self.apply_with_lid(config, ConfigSource::Stored),
            None => {
                debug!("No stored configuration for {} outputs", key.len());
                false
            }
        }
    }

    /// Synthesize and apply a default configuration. If it enables nothing or
    /// no CRTC assignment can drive it, the primary output is turned on alone.
    pub fn apply_default(&mut self) -> bool {
        let (max_width, max_height) = self.backend.screen_limits();
        let Some(config) = make_default_config(&self.hw, &self.store, max_width, max_height)
        else {
            debug!("No outputs connected, nothing to configure");
            return false;
        };

        if config.n_enabled() == 0 {
            warn!("Default configuration enables nothing, using the primary output alone");
            return self.apply_fallback();
        }
        let config = Rc::new(config);
        if self.apply_with_lid(config.clone(), ConfigSource::Default) {
            return true;
        }
        // Backend failures are not retried, only unsolvable layouts.
        if assign_crtcs(&self.hw, &config).is_err() {
            warn!("Default configuration cannot be driven, using the primary output alone");
            return self.apply_fallback();
        }
        false
    }

    fn apply_with_lid(&mut self, config: Rc<Configuration>, source: ConfigSource) -> bool {
        if self.lid_closed {
            if let Some(lid) = make_lid_config(&config) {
                return self.apply_lid(config, lid);
            }
        }
        self.apply_config(config, source)
    }

    fn apply_config(&mut self, config: Rc<Configuration>, source: ConfigSource) -> bool {
        if !self.program(&config, source) {
            return false;
        }
        self.lid_base = None;
        self.update_current();
        true
    }

    fn apply_lid(&mut self, base: Rc<Configuration>, lid: Configuration) -> bool {
        if !self.program(&lid, ConfigSource::LaptopLid) {
            return false;
        }
        self.lid_base = Some(base);
        true
    }

    fn apply_fallback(&mut self) -> bool {
        let Some(assignment) = primary_only_assignment(&self.hw) else {
            return false;
        };
        if !self.apply_assignment(&assignment, ConfigSource::Fallback) {
            return false;
        }
        self.lid_base = None;
        self.update_current();
        true
    }

    /// Solve `config` against the hardware and apply it.
    fn program(&mut self, config: &Configuration, source: ConfigSource) -> bool {
        match assign_crtcs(&self.hw, config) {
            Ok(assignment) => self.apply_assignment(&assignment, source),
            Err(err) => {
                warn!("Cannot apply {:?} configuration: {}", source, err);
                self.events.push_back(Event::ConfigurationFailed {
                    source,
                    reason: err.to_string(),
                });
                false
            }
        }
    }

    fn apply_assignment(&mut self, assignment: &CrtcAssignment, source: ConfigSource) -> bool {
        if let Err(err) = self.backend.apply_configuration(&self.hw, assignment) {
            error!("Backend failed to apply {:?} configuration: {:?}", source, err);
            self.events.push_back(Event::ConfigurationFailed {
                source,
                reason: format!("{:#}", err),
            });
            return false;
        }

        self.hw.apply_assignment(assignment);
        self.rebuild_monitors();

        let n_enabled = assignment.crtcs.iter().map(|c| c.outputs.len()).sum();
        info!(
            "Applied {:?} configuration: {} of {} outputs on",
            source,
            n_enabled,
            assignment.outputs.len()
        );
        self.events.push_back(Event::ConfigurationApplied {
            source,
            n_outputs: assignment.outputs.len(),
            n_enabled,
        });
        true
    }

    /// Snapshot the hardware as the current configuration. Returns false if
    /// nothing changed. Ignored while a lid configuration is active.
    pub fn update_current(&mut self) -> bool {
        if self.lid_base.is_some() {
            return false;
        }
        let snapshot = Configuration::from_hardware(&self.hw);
        self.store.update_current(Rc::new(snapshot))
    }

    pub fn current(&self) -> Option<&Rc<Configuration>> {
        self.store.current()
    }

    /// Apply a configuration the user asked for, without storing it.
    pub fn apply_configuration(&mut self, config: Configuration) -> bool {
        self.apply_with_lid(Rc::new(config), ConfigSource::Stored)
    }

    /// Store the current configuration and save all stored ones.
    pub fn make_persistent(&mut self) {
        if self.lid_base.is_some() {
            debug!("Not storing the lid configuration");
            return;
        }
        let Some(current) = self.store.current().cloned() else {
            return;
        };
        self.store.insert(current);
        self.save();
    }

    fn save(&mut self) {
        let Some(path) = self.settings.persist_path.clone() else {
            return;
        };
        let contents = xml::serialize(self.store.iter().map(Rc::as_ref));
        debug!("Saving {} configurations to {}", self.store.len(), path.display());
        self.saver.save(path, contents);
    }

    fn push_save_result(&mut self, path: PathBuf, result: anyhow::Result<()>) {
        let error = match result {
            Ok(()) => {
                info!("Saved monitor configuration to {}", path.display());
                None
            }
            Err(err) => {
                warn!("Saving {} failed: {:?}", path.display(), err);
                Some(format!("{:#}", err))
            }
        };
        self.events
            .push_back(Event::ConfigurationSaved { path, error });
    }

    /// Report a finished background save, if any.
    pub fn poll_save(&mut self) {
        if let Some((path, result)) = self.saver.poll() {
            self.push_save_result(path, result);
        }
    }

    /// Block until the background save finishes.
    pub fn wait_save(&mut self) {
        if let Some((path, result)) = self.saver.wait() {
            self.push_save_result(path, result);
        }
    }

    /// Roll back to the previous configuration, falling back to the stored
    /// one and then to a default.
    pub fn restore_previous(&mut self) -> bool {
        if let Some(previous) = self.store.take_previous() {
            if self.apply_with_lid(previous, ConfigSource::Previous) {
                self.store.clear_previous();
                return true;
            }
        }
        self.apply_stored() || self.apply_default()
    }

    pub fn on_lid_closed_changed(&mut self, closed: bool) {
        if closed == self.lid_closed {
            return;
        }
        self.lid_closed = closed;
        self.events.push_back(Event::LidClosedChanged { closed });
        info!("Lid {}", if closed { "closed" } else { "opened" });

        if closed {
            let current = self
                .store
                .current()
                .cloned()
                .unwrap_or_else(|| Rc::new(Configuration::from_hardware(&self.hw)));
            if let Some(lid) = make_lid_config(&current) {
                self.apply_lid(current, lid);
            }
        } else if let Some(base) = self.lid_base.take() {
            if !self.apply_config(base, ConfigSource::Previous) && !self.apply_stored() {
                self.apply_default();
            }
        }
    }

    /// Set the backlight of the output with winsys id `output_id`, clamped to
    /// its range. Returns the value set.
    pub fn set_backlight(&mut self, output_id: u64, value: i32) -> anyhow::Result<i32> {
        let id = self
            .hw
            .output_by_winsys_id(output_id)
            .with_context(|| format!("no output {:#x}", output_id))?;
        let output = self.hw.output(id);
        let backlight = output
            .backlight
            .with_context(|| format!("{} has no backlight", output.name))?;
        let value = backlight.clamp(value);
        let name = output.name.clone();

        self.backend
            .set_backlight(output_id, value)
            .with_context(|| format!("setting backlight of {}", name))?;
        self.hw.set_backlight(id, value);
        self.events.push_back(Event::BacklightChanged {
            output: name,
            value,
        });
        Ok(value)
    }

    /// Serializable snapshot of monitors and logical monitors.
    pub fn state(&self) -> DisplayState {
        let constraint = if self.settings.fractional_scaling {
            ScalesConstraint::None
        } else {
            ScalesConstraint::NoFractional
        };

        let monitors = self
            .monitors
            .iter()
            .map(|monitor| {
                let modes = monitor
                    .modes()
                    .iter()
                    .enumerate()
                    .map(|(index, mode)| ModeState {
                        id: mode.id.clone(),
                        width: mode.spec.width,
                        height: mode.spec.height,
                        refresh_rate: mode.spec.refresh_rate,
                        preferred_scale: calculate_scale(&self.hw, monitor, mode),
                        supported_scales: calculate_supported_scales(
                            mode.spec.width,
                            mode.spec.height,
                            constraint,
                        ),
                        is_current: monitor.current_mode() == Some(index),
                        is_preferred: monitor.preferred_mode() == Some(index),
                    })
                    .collect();
                let (width_mm, height_mm) = monitor.physical_dimensions(&self.hw);

                MonitorState {
                    spec: monitor.spec().clone(),
                    display_name: monitor.display_name().to_string(),
                    is_builtin: monitor.is_laptop_panel(&self.hw),
                    is_tiled: monitor.is_tiled(),
                    width_mm,
                    height_mm,
                    is_underscanning: monitor.is_underscanning(&self.hw),
                    supports_underscanning: monitor.supports_underscanning(&self.hw),
                    logical_monitor: monitor.logical_monitor(),
                    modes,
                }
            })
            .collect();

        let (screen_width, screen_height) = self.screen_size();
        let (max_screen_width, max_screen_height) = self.backend.screen_limits();
        DisplayState {
            serial: self.serial,
            monitors,
            logical_monitors: self.logical_monitors.clone(),
            screen_width,
            screen_height,
            max_screen_width,
            max_screen_height,
            lid_closed: self.lid_closed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModeState {
    pub id: String,
    pub width: i32,
    pub height: i32,
    pub refresh_rate: f32,
    pub preferred_scale: f32,
    pub supported_scales: Vec<f32>,
    pub is_current: bool,
    pub is_preferred: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorState {
    pub spec: MonitorSpec,
    pub display_name: String,
    pub is_builtin: bool,
    pub is_tiled: bool,
    pub width_mm: i32,
    pub height_mm: i32,
    pub is_underscanning: bool,
    pub supports_underscanning: bool,
    pub logical_monitor: Option<usize>,
    pub modes: Vec<ModeState>,
}

/// What the display configuration looks like right now.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayState {
    pub serial: u32,
    pub monitors: Vec<MonitorState>,
    pub logical_monitors: Vec<LogicalMonitor>,
    pub screen_width: i32,
    pub screen_height: i32,
    pub max_screen_width: i32,
    pub max_screen_height: i32,
    pub lid_closed: bool,
}
