//! Hardware entities: GPUs, CRTCs, outputs and CRTC modes.
//!
//! # Design Invariants
//!
//! 1. **Wholesale replacement**: a `Hardware` value is one enumeration of the
//!    display server state. It is never patched incrementally; every "read
//!    current" cycle produces a new value and the old one is dropped.
//!
//! 2. **Arena + typed ids**: entities live in flat vectors and reference each
//!    other through `GpuId`, `CrtcId`, `OutputId` and `CrtcModeId`. Every id
//!    carries the generation of the arena that minted it, so an id that
//!    outlived a refresh is caught on lookup instead of silently aliasing a
//!    different entity.
//!
//! 3. **Assigned CRTC**: an output's assigned CRTC is always one of its
//!    `possible_crtcs`. `Hardware::assign_crtc` is the only way to change it.

mod crtc;
mod gpu;
mod mode;
mod output;

pub use crtc::{Crtc, CrtcConfig, CrtcDescriptor};
pub use gpu::Gpu;
pub use mode::{CrtcMode, CrtcModeFlags};
pub use output::{
    Backlight, ConnectorType, Output, OutputDescriptor, OutputIdentity, TileInfo, UNKNOWN,
};

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::assign::CrtcAssignment;
use crate::rect::Rectangle;

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            generation: u32,
            index: u32,
        }

        impl $name {
            fn new(generation: u32, index: usize) -> Self {
                Self {
                    generation,
                    index: index as u32,
                }
            }

            pub fn index(self) -> usize {
                self.index as usize
            }

            pub fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

entity_id!(
    /// Index of a GPU in a `Hardware` arena.
    GpuId
);
entity_id!(
    /// Index of a CRTC in a `Hardware` arena.
    CrtcId
);
entity_id!(
    /// Index of an output in a `Hardware` arena.
    OutputId
);
entity_id!(
    /// Index of a CRTC mode in a `Hardware` arena.
    CrtcModeId
);

/// One complete enumeration of the display hardware.
#[derive(Clone, Debug)]
pub struct Hardware {
    generation: u32,
    gpus: Vec<Gpu>,
    modes: Vec<CrtcMode>,
    crtcs: Vec<Crtc>,
    outputs: Vec<Output>,
}

impl Default for Hardware {
    fn default() -> Self {
        HardwareBuilder::new().build()
    }
}

impl Hardware {
    pub fn builder() -> HardwareBuilder {
        HardwareBuilder::new()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn gpus(&self) -> &[Gpu] {
        &self.gpus
    }

    pub fn modes(&self) -> &[CrtcMode] {
        &self.modes
    }

    pub fn crtcs(&self) -> &[Crtc] {
        &self.crtcs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn mode_ids(&self) -> impl Iterator<Item = CrtcModeId> + '_ {
        (0..self.modes.len()).map(|i| CrtcModeId::new(self.generation, i))
    }

    pub fn crtc_ids(&self) -> impl Iterator<Item = CrtcId> + '_ {
        (0..self.crtcs.len()).map(|i| CrtcId::new(self.generation, i))
    }

    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        (0..self.outputs.len()).map(|i| OutputId::new(self.generation, i))
    }

    pub fn gpu(&self, id: GpuId) -> &Gpu {
        debug_assert_eq!(id.generation, self.generation, "stale GPU id");
        &self.gpus[id.index()]
    }

    pub fn mode(&self, id: CrtcModeId) -> &CrtcMode {
        debug_assert_eq!(id.generation, self.generation, "stale CRTC mode id");
        &self.modes[id.index()]
    }

    pub fn crtc(&self, id: CrtcId) -> &Crtc {
        debug_assert_eq!(id.generation, self.generation, "stale CRTC id");
        &self.crtcs[id.index()]
    }

    pub fn output(&self, id: OutputId) -> &Output {
        debug_assert_eq!(id.generation, self.generation, "stale output id");
        &self.outputs[id.index()]
    }

    pub fn output_by_name(&self, name: &str) -> Option<OutputId> {
        self.output_ids().find(|&id| self.output(id).name == name)
    }

    pub fn output_by_winsys_id(&self, winsys_id: u64) -> Option<OutputId> {
        self.output_ids().find(|&id| self.output(id).id == winsys_id)
    }

    /// The CRTC config currently driving `output`, if any.
    pub fn output_crtc_config(&self, output: OutputId) -> Option<&CrtcConfig> {
        let crtc = self.output(output).crtc()?;
        self.crtc(crtc).config()
    }

    /// True if any output asks for its mode list to be re-read on hotplug,
    /// which makes stored configurations unreliable.
    pub fn has_hotplug_mode_update(&self) -> bool {
        self.outputs.iter().any(|o| o.hotplug_mode_update)
    }

    /// Assign (or clear) the CRTC driving `output`.
    ///
    /// # Panics
    /// Panics if `crtc` is not one of the output's possible CRTCs.
    pub fn assign_crtc(&mut self, output: OutputId, crtc: Option<CrtcId>) {
        debug_assert_eq!(output.generation, self.generation, "stale output id");
        let out = &mut self.outputs[output.index()];
        if let Some(crtc) = crtc {
            assert!(
                out.can_be_driven_by(crtc),
                "CRTC {:?} cannot drive output {}",
                crtc,
                out.name
            );
        }
        out.crtc = crtc;
    }

    pub fn set_crtc_config(&mut self, crtc: CrtcId, config: Option<CrtcConfig>) {
        debug_assert_eq!(crtc.generation, self.generation, "stale CRTC id");
        self.crtcs[crtc.index()].config = config;
    }

    /// Disable every CRTC and detach every output from its CRTC.
    pub fn clear_crtc_configs(&mut self) {
        for crtc in &mut self.crtcs {
            crtc.config = None;
        }
        for output in &mut self.outputs {
            output.crtc = None;
        }
    }

    pub fn set_backlight(&mut self, output: OutputId, value: i32) -> Option<i32> {
        debug_assert_eq!(output.generation, self.generation, "stale output id");
        let backlight = self.outputs[output.index()].backlight.as_mut()?;
        backlight.value = backlight.clamp(value);
        Some(backlight.value)
    }

    /// Mirror an applied CRTC assignment into this enumeration: CRTCs not in
    /// the assignment are disabled and outputs not driven lose their CRTC.
    pub fn apply_assignment(&mut self, assignment: &CrtcAssignment) {
        self.clear_crtc_configs();

        for info in &assignment.crtcs {
            let mode = self.mode(info.mode);
            let (width, height) = if info.transform.is_rotated() {
                (mode.height, mode.width)
            } else {
                (mode.width, mode.height)
            };
            self.set_crtc_config(
                info.crtc,
                Some(CrtcConfig {
                    layout: Rectangle::new(info.x, info.y, width, height),
                    mode: info.mode,
                    transform: info.transform,
                }),
            );
            for &output in &info.outputs {
                self.assign_crtc(output, Some(info.crtc));
            }
        }

        for info in &assignment.outputs {
            let output = &mut self.outputs[info.output.index()];
            output.is_primary = info.is_primary;
            output.is_presentation = info.is_presentation;
            output.is_underscanning = info.is_underscanning;
        }
    }
}

/// Incremental construction of a `Hardware` arena by a backend.
pub struct HardwareBuilder {
    generation: u32,
    gpus: Vec<Gpu>,
    modes: Vec<CrtcMode>,
    crtcs: Vec<Crtc>,
    outputs: Vec<(GpuId, OutputDescriptor)>,
}

impl Default for HardwareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareBuilder {
    pub fn new() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            gpus: Vec::new(),
            modes: Vec::new(),
            crtcs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_gpu(&mut self, handle: u64) -> GpuId {
        let id = GpuId::new(self.generation, self.gpus.len());
        self.gpus.push(Gpu::new(handle));
        id
    }

    pub fn add_mode(&mut self, gpu: GpuId, mode: CrtcMode) -> CrtcModeId {
        let id = CrtcModeId::new(self.generation, self.modes.len());
        self.modes.push(mode);
        self.gpus[gpu.index()].modes.push(id);
        id
    }

    pub fn add_crtc(&mut self, gpu: GpuId, descriptor: CrtcDescriptor) -> CrtcId {
        let id = CrtcId::new(self.generation, self.crtcs.len());
        self.crtcs.push(Crtc {
            id: descriptor.id,
            gpu,
            all_transforms: descriptor.all_transforms,
            config: descriptor.config,
        });
        self.gpus[gpu.index()].crtcs.push(id);
        id
    }

    /// Queue an output. Outputs without any mode are dropped by `build()`.
    pub fn add_output(&mut self, gpu: GpuId, descriptor: OutputDescriptor) {
        self.outputs.push((gpu, descriptor));
    }

    pub fn build(self) -> Hardware {
        let generation = self.generation;
        let mut gpus = self.gpus;
        let descriptors: Vec<_> = self
            .outputs
            .into_iter()
            .filter(|(_, d)| {
                if d.modes.is_empty() {
                    warn!("Output {} has no modes, ignoring it", d.name);
                    false
                } else {
                    true
                }
            })
            .collect();

        let backend_ids: Vec<u64> = descriptors.iter().map(|(_, d)| d.id).collect();
        let mut outputs = Vec::with_capacity(descriptors.len());

        for (index, (gpu, d)) in descriptors.into_iter().enumerate() {
            let id = OutputId::new(generation, index);
            gpus[gpu.index()].outputs.push(id);

            let possible_clones = d
                .possible_clones
                .iter()
                .filter_map(|clone| backend_ids.iter().position(|b| b == clone))
                .map(|i| OutputId::new(generation, i))
                .collect();

            let crtc = match d.crtc {
                Some(crtc) if !d.possible_crtcs.contains(&crtc) => {
                    warn!(
                        "Output {} reports CRTC {:?} it cannot be driven by, ignoring it",
                        d.name, crtc
                    );
                    None
                }
                other => other,
            };

            let preferred_mode = d.preferred_mode.unwrap_or(d.modes[0]);
            let (suggested_x, suggested_y) = d.suggested_position.unwrap_or((-1, -1));
            let connector_type = d
                .connector_type
                .unwrap_or_else(|| ConnectorType::from_output_name(&d.name));

            debug!(
                "Output {} ({} {} {}): {} modes, {} CRTCs",
                d.name,
                d.identity.vendor,
                d.identity.product,
                d.identity.serial,
                d.modes.len(),
                d.possible_crtcs.len()
            );

            outputs.push(Output {
                id: d.id,
                gpu,
                name: d.name,
                vendor: d.identity.vendor,
                product: d.identity.product,
                serial: d.identity.serial,
                width_mm: d.width_mm,
                height_mm: d.height_mm,
                connector_type,
                panel_orientation_transform: d.panel_orientation_transform,
                modes: d.modes,
                preferred_mode,
                possible_crtcs: d.possible_crtcs,
                possible_clones,
                tile_info: d.tile_info,
                backlight: d.backlight,
                suggested_x,
                suggested_y,
                hotplug_mode_update: d.hotplug_mode_update,
                supports_underscanning: d.supports_underscanning,
                crtc,
                is_primary: d.is_primary,
                is_presentation: d.is_presentation,
                is_underscanning: d.is_underscanning,
            });
        }

        Hardware {
            generation,
            gpus,
            modes: self.modes,
            crtcs: self.crtcs,
            outputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_output_hardware() -> (Hardware, CrtcId, CrtcId) {
        let mut builder = Hardware::builder();
        let gpu = builder.add_gpu(0);
        let mode = builder.add_mode(gpu, CrtcMode::new(0x40, 1920, 1080, 60.0));
        let crtc_a = builder.add_crtc(gpu, CrtcDescriptor::new(0x3f));
        let crtc_b = builder.add_crtc(gpu, CrtcDescriptor::new(0x40));

        let mut a = OutputDescriptor::new(0x41, "eDP-1");
        a.modes = vec![mode];
        a.possible_crtcs = vec![crtc_a];
        a.possible_clones = vec![0x42];
        a.crtc = Some(crtc_b);
        builder.add_output(gpu, a);

        let mut b = OutputDescriptor::new(0x42, "HDMI-1");
        b.modes = vec![mode];
        b.possible_crtcs = vec![crtc_a, crtc_b];
        builder.add_output(gpu, b);

        let mut empty = OutputDescriptor::new(0x43, "VGA-1");
        empty.possible_crtcs = vec![crtc_a];
        builder.add_output(gpu, empty);

        (builder.build(), crtc_a, crtc_b)
    }

    #[test]
    fn test_build_resolves_references() {
        let (hw, _, _) = two_output_hardware();
        assert_eq!(hw.outputs().len(), 2, "output without modes is dropped");
        assert_eq!(hw.gpus()[0].outputs.len(), 2);

        let edp = hw.output_by_name("eDP-1").unwrap();
        let hdmi = hw.output_by_name("HDMI-1").unwrap();
        assert_eq!(hw.output(edp).possible_clones, vec![hdmi]);
        assert_eq!(hw.output(edp).connector_type, ConnectorType::Edp);
        assert_eq!(hw.output(edp).preferred_mode, hw.output(edp).modes[0]);
        assert_eq!(hw.output_by_winsys_id(0x42), Some(hdmi));
    }

    #[test]
    fn test_invalid_reported_crtc_is_dropped() {
        let (hw, _, _) = two_output_hardware();
        let edp = hw.output_by_name("eDP-1").unwrap();
        assert_eq!(hw.output(edp).crtc(), None);
    }

    #[test]
    #[should_panic(expected = "cannot drive")]
    fn test_assign_incapable_crtc_panics() {
        let (mut hw, _, crtc_b) = two_output_hardware();
        let edp = hw.output_by_name("eDP-1").unwrap();
        hw.assign_crtc(edp, Some(crtc_b));
    }

    #[test]
    fn test_generations_differ() {
        let (a, _, _) = two_output_hardware();
        let (b, _, _) = two_output_hardware();
        assert_ne!(a.generation(), b.generation());
    }
}
