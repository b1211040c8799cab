//! Headless backend for testing
//!
//! This module provides an in-memory display server: virtual outputs with
//! virtual modes and CRTCs, enumerated into a fresh [`Hardware`] arena on
//! every `read_current` and reprogrammed by `apply_configuration`.
//!
//! # Design Invariants
//!
//! 1. **No display server access**: The headless backend never talks to X or
//!    any driver. Everything it reports comes from its virtual outputs.
//!
//! 2. **Deterministic enumeration**: Backend ids are stable for the life of a
//!    virtual output, modes are deduplicated across outputs in insertion
//!    order, and CRTC `n` always has backend id `CRTC_ID_BASE + n`.
//!
//! 3. **Applied state is reflected**: Whatever `apply_configuration`
//!    programs is what the next `read_current` reports, so a manager driving
//!    this backend sees its own configuration come back.

use anyhow::{bail, Context};
use tracing::{debug, info, warn};

use super::DisplayBackend;
use crate::assign::CrtcAssignment;
use crate::hardware::{
    Backlight, ConnectorType, CrtcConfig, CrtcDescriptor, CrtcMode, CrtcModeFlags, Hardware,
    OutputDescriptor, OutputIdentity, TileInfo,
};
use crate::rect::Rectangle;
use crate::transform::{MonitorTransform, ALL_TRANSFORMS_MASK};

const OUTPUT_ID_BASE: u64 = 0x100;
const CRTC_ID_BASE: u64 = 0x40;
const MODE_ID_BASE: u64 = 0x1000;

/// Default maximum screen size, the X server's usual `8192x8192`.
pub const DEFAULT_SCREEN_LIMITS: (i32, i32) = (8192, 8192);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualMode {
    pub width: i32,
    pub height: i32,
    pub refresh_rate: f32,
    pub flags: CrtcModeFlags,
}

impl VirtualMode {
    fn same_timing(&self, mode: &CrtcMode) -> bool {
        self.width == mode.width
            && self.height == mode.height
            && self.refresh_rate == mode.refresh_rate
            && self.flags == mode.flags
    }
}

/// What a virtual output is currently showing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveState {
    /// Index into the output's modes.
    pub mode: usize,
    pub x: i32,
    pub y: i32,
    pub transform: MonitorTransform,
    /// CRTC index; `None` picks the next free CRTC at enumeration time.
    pub crtc: Option<usize>,
}

/// A virtual output for headless testing
///
/// The setters return `&mut Self` so outputs can be described in one chain.
#[derive(Clone, Debug)]
pub struct VirtualOutput {
    pub id: u64,
    pub name: String,
    pub identity: OutputIdentity,
    pub width_mm: i32,
    pub height_mm: i32,
    pub connector_type: Option<ConnectorType>,
    pub panel_orientation: MonitorTransform,
    pub modes: Vec<VirtualMode>,
    pub preferred: Option<usize>,
    pub tile_info: TileInfo,
    pub backlight: Option<Backlight>,
    pub suggested_position: Option<(i32, i32)>,
    pub hotplug_mode_update: bool,
    pub supports_underscanning: bool,
    /// Names of the outputs this one can share a CRTC with.
    pub clones: Vec<String>,
    /// Bit `i` lets CRTC `i` drive this output; `None` allows every CRTC.
    pub crtc_mask: Option<u32>,
    pub active: Option<ActiveState>,
    pub is_primary: bool,
    pub is_presentation: bool,
    pub is_underscanning: bool,
}

impl VirtualOutput {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            identity: OutputIdentity::default(),
            width_mm: 0,
            height_mm: 0,
            connector_type: None,
            panel_orientation: MonitorTransform::Normal,
            modes: Vec::new(),
            preferred: None,
            tile_info: TileInfo::default(),
            backlight: None,
            suggested_position: None,
            hotplug_mode_update: false,
            supports_underscanning: false,
            clones: Vec::new(),
            crtc_mask: None,
            active: None,
            is_primary: false,
            is_presentation: false,
            is_underscanning: false,
        }
    }

    pub fn identity(&mut self, vendor: &str, product: &str, serial: &str) -> &mut Self {
        self.identity = OutputIdentity {
            vendor: vendor.to_string(),
            product: product.to_string(),
            serial: serial.to_string(),
        };
        self
    }

    /// Take vendor, product and serial from a raw EDID blob.
    pub fn edid(&mut self, data: &[u8]) -> &mut Self {
        self.identity = OutputIdentity::from_edid(Some(data));
        self
    }

    pub fn physical_size(&mut self, width_mm: i32, height_mm: i32) -> &mut Self {
        self.width_mm = width_mm;
        self.height_mm = height_mm;
        self
    }

    pub fn connector(&mut self, connector_type: ConnectorType) -> &mut Self {
        self.connector_type = Some(connector_type);
        self
    }

    pub fn panel_orientation(&mut self, transform: MonitorTransform) -> &mut Self {
        self.panel_orientation = transform;
        self
    }

    fn push_mode(&mut self, mode: VirtualMode) -> usize {
        match self.modes.iter().position(|m| *m == mode) {
            Some(index) => index,
            None => {
                self.modes.push(mode);
                self.modes.len() - 1
            }
        }
    }

    pub fn mode_with_flags(
        &mut self,
        width: i32,
        height: i32,
        refresh_rate: f32,
        flags: CrtcModeFlags,
    ) -> &mut Self {
        self.push_mode(VirtualMode {
            width,
            height,
            refresh_rate,
            flags,
        });
        self
    }

    pub fn mode(&mut self, width: i32, height: i32, refresh_rate: f32) -> &mut Self {
        self.mode_with_flags(width, height, refresh_rate, CrtcModeFlags::NONE)
    }

    pub fn preferred_mode(&mut self, width: i32, height: i32, refresh_rate: f32) -> &mut Self {
        let index = self.push_mode(VirtualMode {
            width,
            height,
            refresh_rate,
            flags: CrtcModeFlags::NONE,
        });
        self.preferred = Some(index);
        self
    }

    /// Add a mode and show it at the origin.
    pub fn active_mode(&mut self, width: i32, height: i32, refresh_rate: f32) -> &mut Self {
        let mode = self.push_mode(VirtualMode {
            width,
            height,
            refresh_rate,
            flags: CrtcModeFlags::NONE,
        });
        self.activate(mode, 0, 0);
        self
    }

    /// Show the active (or else the preferred) mode at `x`, `y`.
    ///
    /// # Panics
    /// Panics if the output has no modes yet.
    pub fn active_at(&mut self, x: i32, y: i32) -> &mut Self {
        let mode = match self.active {
            Some(active) => active.mode,
            None => self.preferred.unwrap_or(0),
        };
        assert!(mode < self.modes.len(), "{} has no modes to activate", self.name);
        self.activate(mode, x, y);
        self
    }

    fn activate(&mut self, mode: usize, x: i32, y: i32) {
        let previous = self.active.take();
        self.active = Some(ActiveState {
            mode,
            x,
            y,
            transform: previous.map(|a| a.transform).unwrap_or_default(),
            crtc: previous.and_then(|a| a.crtc),
        });
    }

    /// Set the CRTC transform of the active output.
    pub fn rotated(&mut self, transform: MonitorTransform) -> &mut Self {
        if let Some(active) = self.active.as_mut() {
            active.transform = transform;
        }
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.is_primary = true;
        self
    }

    pub fn presentation(&mut self) -> &mut Self {
        self.is_presentation = true;
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn tile(
        &mut self,
        group_id: u32,
        loc_h_tile: u32,
        loc_v_tile: u32,
        max_h_tiles: u32,
        max_v_tiles: u32,
        tile_w: u32,
        tile_h: u32,
    ) -> &mut Self {
        self.tile_info = TileInfo {
            group_id,
            flags: 0,
            max_h_tiles,
            max_v_tiles,
            loc_h_tile,
            loc_v_tile,
            tile_w,
            tile_h,
        };
        self
    }

    pub fn suggested_position(&mut self, x: i32, y: i32) -> &mut Self {
        self.suggested_position = Some((x, y));
        self
    }

    pub fn hotplug_mode_update(&mut self) -> &mut Self {
        self.hotplug_mode_update = true;
        self
    }

    pub fn underscanning_support(&mut self) -> &mut Self {
        self.supports_underscanning = true;
        self
    }

    pub fn clones_with(&mut self, other: &str) -> &mut Self {
        self.clones.push(other.to_string());
        self
    }

    /// Only the CRTCs whose bit is set in `mask` can drive this output.
    pub fn possible_crtcs(&mut self, mask: u32) -> &mut Self {
        self.crtc_mask = Some(mask);
        self
    }

    pub fn backlight(&mut self, min: i32, max: i32, value: i32) -> &mut Self {
        self.backlight = Some(Backlight { min, max, value });
        self
    }
}

/// Headless backend state for testing without a display server
#[derive(Clone, Debug)]
pub struct HeadlessBackend {
    /// Virtual outputs in enumeration order
    pub outputs: Vec<VirtualOutput>,
    /// Number of CRTCs; defaults to one per output
    pub crtc_count: Option<usize>,
    /// Transform mask every CRTC reports
    pub crtc_transforms: u32,
    pub screen_limits: (i32, i32),
    /// Count of successful `apply_configuration` calls (for assertions)
    pub apply_count: usize,
    /// The last assignment applied, as backend ids.
    pub last_applied: Option<Vec<(u64, Vec<u64>)>>,
    fail_next_apply: bool,
    next_output_id: u64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            crtc_count: None,
            crtc_transforms: ALL_TRANSFORMS_MASK,
            screen_limits: DEFAULT_SCREEN_LIMITS,
            apply_count: 0,
            last_applied: None,
            fail_next_apply: false,
            next_output_id: OUTPUT_ID_BASE,
        }
    }

    /// Add a virtual output, or return the existing one with that name.
    pub fn add_output(&mut self, name: &str) -> &mut VirtualOutput {
        let index = match self.outputs.iter().position(|o| o.name == name) {
            Some(index) => index,
            None => {
                let output = VirtualOutput::new(self.next_output_id, name);
                self.next_output_id += 1;
                debug!("Headless: added output {} ({:#x})", name, output.id);
                self.outputs.push(output);
                self.outputs.len() - 1
            }
        };
        &mut self.outputs[index]
    }

    pub fn remove_output(&mut self, name: &str) -> Option<VirtualOutput> {
        let index = self.outputs.iter().position(|o| o.name == name)?;
        debug!("Headless: removed output {}", name);
        Some(self.outputs.remove(index))
    }

    pub fn output(&self, name: &str) -> Option<&VirtualOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Make the next `apply_configuration` fail, as a driver refusing a
    /// configuration would.
    pub fn fail_next_apply(&mut self) {
        self.fail_next_apply = true;
    }

    fn crtc_count(&self) -> usize {
        self.crtc_count.unwrap_or(self.outputs.len())
    }

    /// Enumerate the virtual outputs into a hardware arena.
    pub fn hardware(&self) -> Hardware {
        let mut builder = Hardware::builder();
        let gpu = builder.add_gpu(0);

        let mut modes: Vec<VirtualMode> = Vec::new();
        let mut mode_ids = Vec::new();
        for output in &self.outputs {
            for mode in &output.modes {
                if !modes.contains(mode) {
                    let crtc_mode = CrtcMode::new(
                        MODE_ID_BASE + modes.len() as u64,
                        mode.width,
                        mode.height,
                        mode.refresh_rate,
                    )
                    .with_flags(mode.flags);
                    mode_ids.push(builder.add_mode(gpu, crtc_mode));
                    modes.push(*mode);
                }
            }
        }
        let mode_id = |mode: &VirtualMode| {
            let index = modes.iter().position(|m| m == mode).unwrap_or_default();
            mode_ids[index]
        };

        // Resolve which CRTC each active output sits on.
        let n_crtcs = self.crtc_count();
        let mut taken: Vec<bool> = vec![false; n_crtcs];
        for active in self.outputs.iter().filter_map(|o| o.active) {
            if let Some(crtc) = active.crtc.filter(|&crtc| crtc < n_crtcs) {
                taken[crtc] = true;
            }
        }
        let crtc_for_output: Vec<Option<usize>> = self
            .outputs
            .iter()
            .map(|output| {
                let active = output.active?;
                if let Some(crtc) = active.crtc.filter(|&crtc| crtc < n_crtcs) {
                    return Some(crtc);
                }
                let free = taken.iter().position(|t| !t);
                match free {
                    Some(free) => taken[free] = true,
                    None => warn!("Headless: no free CRTC for {}, leaving it off", output.name),
                }
                free
            })
            .collect();

        let mut crtcs = Vec::with_capacity(n_crtcs);
        for index in 0..n_crtcs {
            let mut descriptor =
                CrtcDescriptor::new(CRTC_ID_BASE + index as u64).with_transforms(self.crtc_transforms);
            let driver = self
                .outputs
                .iter()
                .zip(&crtc_for_output)
                .find(|(_, crtc)| **crtc == Some(index));
            if let Some((output, _)) = driver {
                if let Some(active) = output.active {
                    let mode = output.modes[active.mode];
                    let (width, height) = if active.transform.is_rotated() {
                        (mode.height, mode.width)
                    } else {
                        (mode.width, mode.height)
                    };
                    descriptor = descriptor.with_config(CrtcConfig {
                        layout: Rectangle::new(active.x, active.y, width, height),
                        mode: mode_id(&mode),
                        transform: active.transform,
                    });
                }
            }
            crtcs.push(builder.add_crtc(gpu, descriptor));
        }

        for (output, crtc) in self.outputs.iter().zip(&crtc_for_output) {
            let mut descriptor = OutputDescriptor::new(output.id, output.name.clone());
            descriptor.identity = output.identity.clone();
            descriptor.width_mm = output.width_mm;
            descriptor.height_mm = output.height_mm;
            descriptor.connector_type = output.connector_type;
            descriptor.panel_orientation_transform = output.panel_orientation;
            descriptor.modes = output.modes.iter().map(mode_id).collect();
            descriptor.preferred_mode = output.preferred.map(|i| mode_id(&output.modes[i]));
            descriptor.possible_crtcs = match output.crtc_mask {
                Some(mask) => crtcs
                    .iter()
                    .enumerate()
                    .filter(|&(index, _)| index < 32 && mask & (1 << index) != 0)
                    .map(|(_, &crtc)| crtc)
                    .collect(),
                None => crtcs.clone(),
            };
            descriptor.possible_clones = output
                .clones
                .iter()
                .filter_map(|name| self.output(name))
                .map(|o| o.id)
                .collect();
            descriptor.tile_info = output.tile_info;
            descriptor.backlight = output.backlight;
            descriptor.suggested_position = output.suggested_position;
            descriptor.hotplug_mode_update = output.hotplug_mode_update;
            descriptor.supports_underscanning = output.supports_underscanning;
            descriptor.crtc = crtc.map(|i| crtcs[i]);
            descriptor.is_primary = output.is_primary;
            descriptor.is_presentation = output.is_presentation;
            descriptor.is_underscanning = output.is_underscanning;
            builder.add_output(gpu, descriptor);
        }

        builder.build()
    }
}

impl DisplayBackend for HeadlessBackend {
    fn read_current(&mut self) -> anyhow::Result<Hardware> {
        Ok(self.hardware())
    }

    fn screen_limits(&self) -> (i32, i32) {
        self.screen_limits
    }

    fn apply_configuration(
        &mut self,
        hw: &Hardware,
        assignment: &CrtcAssignment,
    ) -> anyhow::Result<()> {
        if std::mem::take(&mut self.fail_next_apply) {
            bail!("headless: configuration rejected");
        }

        for output in &mut self.outputs {
            output.active = None;
        }

        let mut applied = Vec::with_capacity(assignment.crtcs.len());
        for info in &assignment.crtcs {
            let crtc_mode = hw.mode(info.mode);
            let mut driven = Vec::with_capacity(info.outputs.len());
            for &output_id in &info.outputs {
                let name = &hw.output(output_id).name;
                let output = self
                    .outputs
                    .iter_mut()
                    .find(|o| &o.name == name)
                    .with_context(|| format!("headless: no output named {}", name))?;
                let mode = output
                    .modes
                    .iter()
                    .position(|m| m.same_timing(crtc_mode))
                    .with_context(|| format!("headless: {} has no mode {}", name, crtc_mode.name))?;
                output.active = Some(ActiveState {
                    mode,
                    x: info.x,
                    y: info.y,
                    transform: info.transform,
                    crtc: Some(info.crtc.index()),
                });
                driven.push(output.id);
            }
            applied.push((hw.crtc(info.crtc).id, driven));
        }

        for info in &assignment.outputs {
            let name = &hw.output(info.output).name;
            if let Some(output) = self.outputs.iter_mut().find(|o| &o.name == name) {
                output.is_primary = info.is_primary;
                output.is_presentation = info.is_presentation;
                output.is_underscanning = info.is_underscanning;
            }
        }

        self.apply_count += 1;
        self.last_applied = Some(applied);
        info!(
            "Headless: applied {} CRTCs for {} outputs",
            assignment.crtcs.len(),
            assignment.outputs.len()
        );
        Ok(())
    }

    fn set_backlight(&mut self, output_id: u64, value: i32) -> anyhow::Result<()> {
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.id == output_id)
            .with_context(|| format!("headless: no output {:#x}", output_id))?;
        let backlight = output
            .backlight
            .as_mut()
            .with_context(|| format!("headless: {} has no backlight", output.name))?;
        backlight.value = backlight.clamp(value);
        Ok(())
    }
}
