//! Monitors: what the user perceives as one screen.
//!
//! A monitor is either a single output (`MonitorKind::Normal`) or a group of
//! outputs sharing a DisplayID tile group (`MonitorKind::Tiled`). Monitors
//! own their synthesized `MonitorMode`s and refer to hardware through ids, so
//! they are rebuilt every time the hardware arena is.

mod mode;
mod normal;
pub mod scale;
mod tiled;

pub use mode::{MonitorCrtcMode, MonitorMode, MonitorModeSpec};
pub use tiled::TiledInfo;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::hardware::{ConnectorType, Hardware, OutputId, UNKNOWN};
use crate::rect::Rectangle;
use crate::transform::MonitorTransform;

/// Persistence key of a monitor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MonitorSpec {
    pub connector: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MonitorKind {
    Normal,
    Tiled(TiledInfo),
}

#[derive(Clone, Debug)]
pub struct Monitor {
    kind: MonitorKind,
    outputs: Vec<OutputId>,
    modes: Vec<MonitorMode>,
    mode_ids: HashMap<String, usize>,
    preferred_mode: Option<usize>,
    current_mode: Option<usize>,
    spec: MonitorSpec,
    winsys_id: u64,
    logical_monitor: Option<usize>,
    display_name: String,
}

impl Monitor {
    fn with_outputs(hw: &Hardware, kind: MonitorKind, outputs: Vec<OutputId>) -> Self {
        let mut monitor = Self {
            kind,
            outputs,
            modes: Vec::new(),
            mode_ids: HashMap::new(),
            preferred_mode: None,
            current_mode: None,
            spec: MonitorSpec {
                connector: String::new(),
                vendor: String::new(),
                product: String::new(),
                serial: String::new(),
            },
            winsys_id: 0,
            logical_monitor: None,
            display_name: String::new(),
        };

        let main = hw.output(monitor.main_output());
        monitor.spec = MonitorSpec {
            connector: main.name.clone(),
            vendor: main.vendor.clone(),
            product: main.product.clone(),
            serial: main.serial.clone(),
        };
        monitor.winsys_id = main.id;
        monitor
    }

    pub fn kind(&self) -> &MonitorKind {
        &self.kind
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self.kind, MonitorKind::Tiled(_))
    }

    pub fn outputs(&self) -> &[OutputId] {
        &self.outputs
    }

    pub fn modes(&self) -> &[MonitorMode] {
        &self.modes
    }

    pub fn mode(&self, index: usize) -> &MonitorMode {
        &self.modes[index]
    }

    pub fn mode_by_id(&self, id: &str) -> Option<usize> {
        self.mode_ids.get(id).copied()
    }

    pub fn preferred_mode(&self) -> Option<usize> {
        self.preferred_mode
    }

    pub fn current_mode(&self) -> Option<usize> {
        self.current_mode
    }

    pub fn spec(&self) -> &MonitorSpec {
        &self.spec
    }

    pub fn winsys_id(&self) -> u64 {
        self.winsys_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn logical_monitor(&self) -> Option<usize> {
        self.logical_monitor
    }

    pub(crate) fn set_logical_monitor(&mut self, index: Option<usize>) {
        self.logical_monitor = index;
    }

    /// The output that represents the monitor: its only output, or for a
    /// tiled monitor the tile with the most untiled modes.
    pub fn main_output(&self) -> OutputId {
        match &self.kind {
            MonitorKind::Normal => self.outputs[0],
            MonitorKind::Tiled(info) => info.main_output,
        }
    }

    /// Screen area currently covered by the monitor's CRTCs.
    pub fn derive_layout(&self, hw: &Hardware) -> Rectangle {
        match &self.kind {
            MonitorKind::Normal => hw
                .output_crtc_config(self.outputs[0])
                .map(|config| config.layout)
                .unwrap_or_default(),
            MonitorKind::Tiled(_) => self
                .outputs
                .iter()
                .filter_map(|&output| hw.output_crtc_config(output))
                .fold(Rectangle::default(), |acc, config| acc.union(&config.layout)),
        }
    }

    /// Offset of `output`'s CRTC inside the monitor when running `mode`
    /// with `crtc_transform`.
    pub fn calculate_crtc_pos(
        &self,
        hw: &Hardware,
        mode: &MonitorMode,
        output: OutputId,
        crtc_transform: MonitorTransform,
    ) -> (i32, i32) {
        match &self.kind {
            MonitorKind::Normal => (0, 0),
            MonitorKind::Tiled(_) => {
                tiled::calculate_crtc_pos(hw, &self.outputs, mode, output, crtc_transform)
            }
        }
    }

    pub fn suggested_position(&self, hw: &Hardware) -> Option<(i32, i32)> {
        match &self.kind {
            MonitorKind::Normal => hw.output(self.outputs[0]).suggested_position(),
            MonitorKind::Tiled(_) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current_mode.is_some()
    }

    pub fn is_laptop_panel(&self, hw: &Hardware) -> bool {
        hw.output(self.main_output()).is_laptop()
    }

    pub fn is_primary(&self, hw: &Hardware) -> bool {
        hw.output(self.main_output()).is_primary
    }

    pub fn connector_type(&self, hw: &Hardware) -> ConnectorType {
        hw.output(self.main_output()).connector_type
    }

    pub fn physical_dimensions(&self, hw: &Hardware) -> (i32, i32) {
        let output = hw.output(self.main_output());
        (output.width_mm, output.height_mm)
    }

    pub fn is_underscanning(&self, hw: &Hardware) -> bool {
        hw.output(self.main_output()).is_underscanning
    }

    pub fn supports_underscanning(&self, hw: &Hardware) -> bool {
        hw.output(self.main_output()).supports_underscanning
    }

    pub fn has_aspect_as_size(&self, hw: &Hardware) -> bool {
        let (width_mm, height_mm) = self.physical_dimensions(hw);
        scale::has_aspect_as_size(width_mm, height_mm)
    }

    /// True if every output runs exactly the CRTC mode `mode` asks of it.
    pub fn is_mode_assigned(&self, hw: &Hardware, mode: &MonitorMode) -> bool {
        mode.crtc_modes.iter().all(|crtc_mode| {
            let crtc = hw.output(crtc_mode.output).crtc();
            match crtc_mode.crtc_mode {
                Some(wanted) => crtc
                    .and_then(|crtc| hw.crtc(crtc).config())
                    .is_some_and(|config| config.mode == wanted),
                None => crtc.is_none(),
            }
        })
    }

    /// Insert `mode` unless its id is taken. With `replace`, a colliding
    /// mode is swapped out in place unless it is the preferred one.
    fn add_mode(&mut self, mode: MonitorMode, replace: bool) -> Option<usize> {
        match self.mode_ids.get(&mode.id).copied() {
            Some(existing) if !replace || self.preferred_mode == Some(existing) => None,
            Some(existing) => {
                if self.current_mode == Some(existing) {
                    self.current_mode = None;
                }
                self.modes[existing] = mode;
                Some(existing)
            }
            None => {
                let index = self.modes.len();
                self.mode_ids.insert(mode.id.clone(), index);
                self.modes.push(mode);
                Some(index)
            }
        }
    }

    fn make_display_name(&self, hw: &Hardware) -> String {
        if self.is_laptop_panel(hw) {
            return "Built-in display".to_string();
        }

        let (width_mm, height_mm) = self.physical_dimensions(hw);
        let mut inches = None;
        let mut product_name = None;
        if width_mm > 0 && height_mm > 0 {
            if self.has_aspect_as_size(hw) {
                product_name = Some(self.spec.product.as_str());
            } else {
                let diagonal = ((width_mm as f64).powi(2) + (height_mm as f64).powi(2)).sqrt();
                inches = Some(diagonal_to_str(diagonal / 25.4));
            }
        }

        let vendor_name = if self.spec.vendor != UNKNOWN {
            self.spec.vendor.clone()
        } else if inches.is_some() {
            "Unknown".to_string()
        } else {
            "Unknown Display".to_string()
        };

        match (inches, product_name) {
            (Some(inches), _) => format!("{} {}", vendor_name, inches),
            (None, Some(product)) => format!("{} {}", vendor_name, product),
            (None, None) => vendor_name,
        }
    }

    fn finish(mut self, hw: &Hardware) -> Self {
        self.display_name = self.make_display_name(hw);
        debug!(
            "Monitor {} ({}): {} modes, preferred {:?}, current {:?}",
            self.spec.connector,
            self.display_name,
            self.modes.len(),
            self.preferred_mode.map(|m| self.modes[m].id.as_str()),
            self.current_mode.map(|m| self.modes[m].id.as_str()),
        );
        self
    }
}

fn diagonal_to_str(inches: f64) -> String {
    const KNOWN_DIAGONALS: [f64; 3] = [12.1, 13.3, 15.6];
    KNOWN_DIAGONALS
        .iter()
        .find(|known| (*known - inches).abs() < 0.1)
        .map(|known| format!("{:.1}\"", known))
        .unwrap_or_else(|| format!("{}\"", (inches + 0.5) as i32))
}

/// Group the outputs of `hw` into monitors, in output order.
///
/// A tile group becomes one monitor, created when its first member is seen.
pub fn build_monitors(hw: &Hardware) -> Vec<Monitor> {
    let mut monitors = Vec::new();
    let mut seen_groups = Vec::new();

    for output_id in hw.output_ids() {
        let tile_info = &hw.output(output_id).tile_info;
        let monitor = if tile_info.is_tiled() {
            if seen_groups.contains(&tile_info.group_id) {
                continue;
            }
            seen_groups.push(tile_info.group_id);
            tiled::new_tiled(hw, tile_info.group_id)
        } else {
            normal::new_normal(hw, output_id)
        };
        monitors.push(monitor.finish(hw));
    }

    monitors
}
