//! CRTC assignment: turning a configuration into CRTC bindings.
//!
//! The search is a plain depth-first backtracking over the configured
//! outputs. For every enabled output each CRTC is tried, first with modes
//! whose refresh rate matches the configured one and then with any refresh
//! rate, and the first complete assignment wins.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{Configuration, OutputConfig};
use crate::hardware::{CrtcId, CrtcModeId, Hardware, OutputId};
use crate::transform::MonitorTransform;
use crate::tracy_span;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignError {
    #[error("No CRTC assignment satisfies the configuration")]
    NoAssignment,
    #[error("The configuration refers to unknown output {0}")]
    UnknownOutput(String),
    #[error("The configuration has {config} outputs but {hardware} are connected")]
    OutputCountMismatch { config: usize, hardware: usize },
}

/// What one CRTC should do.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrtcInfo {
    #[serde(skip)]
    pub crtc: CrtcId,
    #[serde(skip)]
    pub mode: CrtcModeId,
    pub x: i32,
    pub y: i32,
    pub transform: MonitorTransform,
    #[serde(skip)]
    pub outputs: Vec<OutputId>,
}

/// Runtime flags of one configured output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputInfo {
    pub output: OutputId,
    pub is_primary: bool,
    pub is_presentation: bool,
    pub is_underscanning: bool,
}

/// A complete set of bindings ready for the backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrtcAssignment {
    /// Enabled CRTCs, in CRTC order.
    pub crtcs: Vec<CrtcInfo>,
    /// Every configured output, in configuration order.
    pub outputs: Vec<OutputInfo>,
}

impl CrtcAssignment {
    pub fn crtc_for_output(&self, output: OutputId) -> Option<&CrtcInfo> {
        self.crtcs.iter().find(|info| info.outputs.contains(&output))
    }
}

struct Assigner<'a> {
    hw: &'a Hardware,
    configs: &'a [OutputConfig],
    outputs: Vec<OutputId>,
    crtcs: HashMap<CrtcId, CrtcInfo>,
}

impl<'a> Assigner<'a> {
    fn assign(
        &mut self,
        crtc: CrtcId,
        mode: CrtcModeId,
        x: i32,
        y: i32,
        transform: MonitorTransform,
        output: OutputId,
    ) -> bool {
        let hw = self.hw;
        let out = hw.output(output);

        if !out.can_be_driven_by(crtc) || !out.supports_mode(mode) {
            return false;
        }
        if !hw.crtc(crtc).supports_transform(transform) {
            return false;
        }

        match self.crtcs.get_mut(&crtc) {
            Some(info) => {
                if info.mode != mode || info.x != x || info.y != y || info.transform != transform {
                    return false;
                }
                let clonable = info.outputs.iter().all(|&existing| {
                    hw.output(existing).can_clone(output) && out.can_clone(existing)
                });
                if !clonable {
                    return false;
                }
                info.outputs.push(output);
            }
            None => {
                self.crtcs.insert(
                    crtc,
                    CrtcInfo {
                        crtc,
                        mode,
                        x,
                        y,
                        transform,
                        outputs: vec![output],
                    },
                );
            }
        }

        true
    }

    fn unassign(&mut self, crtc: CrtcId, output: OutputId) {
        let Some(info) = self.crtcs.get_mut(&crtc) else {
            return;
        };
        info.outputs.retain(|&o| o != output);
        if info.outputs.is_empty() {
            self.crtcs.remove(&crtc);
        }
    }

    fn assign_from(&mut self, index: usize) -> bool {
        if index == self.configs.len() {
            return true;
        }

        let config = self.configs[index];
        if !config.enabled {
            return self.assign_from(index + 1);
        }

        let hw = self.hw;
        let output = self.outputs[index];
        // Configurations are in logical space; CRTCs also undo the panel
        // orientation.
        let transform = hw.output(output).logical_to_crtc_transform(config.transform);

        for crtc in hw.crtc_ids() {
            for pass in 0..2 {
                for mode_id in hw.mode_ids() {
                    let mode = hw.mode(mode_id);
                    let (width, height) = if transform.is_rotated() {
                        (mode.height, mode.width)
                    } else {
                        (mode.width, mode.height)
                    };

                    if pass == 0 && mode.refresh_rate != config.refresh_rate {
                        continue;
                    }
                    if width != config.rect.width || height != config.rect.height {
                        continue;
                    }

                    if !self.assign(crtc, mode_id, config.rect.x, config.rect.y, transform, output)
                    {
                        continue;
                    }
                    trace!(
                        "Trying {} on CRTC {:#x} with mode {} (pass {})",
                        hw.output(output).name,
                        hw.crtc(crtc).id,
                        mode.name,
                        pass
                    );
                    if self.assign_from(index + 1) {
                        return true;
                    }
                    self.unassign(crtc, output);
                }
            }
        }

        false
    }
}

/// Find CRTC bindings realizing `config` on `hw`.
pub fn assign_crtcs(hw: &Hardware, config: &Configuration) -> Result<CrtcAssignment, AssignError> {
    tracy_span!("assign_crtcs");

    if config.len() != hw.outputs().len() {
        return Err(AssignError::OutputCountMismatch {
            config: config.len(),
            hardware: hw.outputs().len(),
        });
    }

    let outputs = config
        .keys()
        .iter()
        .map(|key| {
            hw.output_by_name(&key.connector)
                .ok_or_else(|| AssignError::UnknownOutput(key.connector.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut assigner = Assigner {
        hw,
        configs: config.outputs(),
        outputs,
        crtcs: HashMap::new(),
    };
    if !assigner.assign_from(0) {
        debug!("No CRTC assignment for {} outputs", config.len());
        return Err(AssignError::NoAssignment);
    }

    let mut crtcs: Vec<CrtcInfo> = assigner.crtcs.into_values().collect();
    crtcs.sort_by_key(|info| info.crtc);

    let output_infos = assigner
        .outputs
        .iter()
        .zip(config.outputs())
        .map(|(&output, config)| OutputInfo {
            output,
            is_primary: config.is_primary,
            is_presentation: config.is_presentation,
            is_underscanning: config.is_underscanning,
        })
        .collect();

    Ok(CrtcAssignment {
        crtcs,
        outputs: output_infos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigKey;
    use crate::rect::Rectangle;
    use crate::testing::Fixture;
    use proptest::prelude::*;

    fn configure(hw: &Hardware, outputs: Vec<OutputConfig>) -> Configuration {
        Configuration::new(ConfigKey::from_hardware(hw).keys().to_vec(), outputs)
    }

    #[test]
    fn test_single_output() {
        let mut fixture = Fixture::new();
        fixture.output("DP-1").preferred_mode(1920, 1080, 60.0);
        let hw = fixture.build();

        let config = configure(
            &hw,
            vec![OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0)],
        );
        let assignment = assign_crtcs(&hw, &config).unwrap();
        assert_eq!(assignment.crtcs.len(), 1);
        assert_eq!(assignment.crtcs[0].outputs, [hw.output_ids().next().unwrap()]);
        assert_eq!(assignment.outputs.len(), 1);
    }

    #[test]
    fn test_refresh_rate_falls_back() {
        let mut fixture = Fixture::new();
        fixture
            .output("DP-1")
            .preferred_mode(1920, 1080, 59.94)
            .mode(1920, 1080, 50.0);
        let hw = fixture.build();

        let config = configure(
            &hw,
            vec![OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 50.0)],
        );
        let assignment = assign_crtcs(&hw, &config).unwrap();
        assert_eq!(hw.mode(assignment.crtcs[0].mode).refresh_rate, 50.0);

        let config = configure(
            &hw,
            vec![OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 75.0)],
        );
        let assignment = assign_crtcs(&hw, &config).unwrap();
        assert_eq!(hw.mode(assignment.crtcs[0].mode).refresh_rate, 59.94);
    }

    #[test]
    fn test_rotated_output_uses_swapped_mode() {
        let mut fixture = Fixture::new();
        fixture.output("DP-1").preferred_mode(1920, 1080, 60.0);
        let hw = fixture.build();

        let mut output = OutputConfig::enabled(Rectangle::new(0, 0, 1080, 1920), 60.0);
        output.transform = MonitorTransform::Rotate90;
        let assignment = assign_crtcs(&hw, &configure(&hw, vec![output])).unwrap();
        assert_eq!(assignment.crtcs[0].transform, MonitorTransform::Rotate90);
    }

    #[test]
    fn test_unsupported_transform_fails() {
        let mut fixture = Fixture::new();
        fixture.crtc_transforms(MonitorTransform::Normal.mask_bit());
        fixture.output("DP-1").preferred_mode(1920, 1080, 60.0);
        let hw = fixture.build();

        let mut output = OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0);
        output.transform = MonitorTransform::Rotate180;
        assert_eq!(
            assign_crtcs(&hw, &configure(&hw, vec![output])),
            Err(AssignError::NoAssignment)
        );
    }

    #[test]
    fn test_more_outputs_than_crtcs() {
        let mut fixture = Fixture::new();
        fixture.crtcs(1);
        fixture.output("DP-1").preferred_mode(1920, 1080, 60.0);
        fixture.output("DP-2").preferred_mode(1920, 1080, 60.0);
        let hw = fixture.build();

        let side_by_side = configure(
            &hw,
            vec![
                OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0),
                OutputConfig::enabled(Rectangle::new(1920, 0, 1920, 1080), 60.0),
            ],
        );
        assert_eq!(
            assign_crtcs(&hw, &side_by_side),
            Err(AssignError::NoAssignment)
        );

        let one_off = configure(
            &hw,
            vec![
                OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0),
                OutputConfig::default(),
            ],
        );
        let assignment = assign_crtcs(&hw, &one_off).unwrap();
        assert_eq!(assignment.crtcs.len(), 1);
        assert_eq!(assignment.outputs.len(), 2);
    }

    #[test]
    fn test_clones_share_a_crtc_only_when_allowed() {
        let clone_config = |hw: &Hardware| {
            configure(
                hw,
                vec![
                    OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0),
                    OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0),
                ],
            )
        };

        let mut fixture = Fixture::new();
        fixture.crtcs(1);
        fixture
            .output("DP-1")
            .preferred_mode(1920, 1080, 60.0)
            .clones_with("DP-2");
        fixture
            .output("DP-2")
            .preferred_mode(1920, 1080, 60.0)
            .clones_with("DP-1");
        let hw = fixture.build();
        let assignment = assign_crtcs(&hw, &clone_config(&hw)).unwrap();
        assert_eq!(assignment.crtcs.len(), 1);
        assert_eq!(assignment.crtcs[0].outputs.len(), 2);

        let mut fixture = Fixture::new();
        fixture.crtcs(1);
        fixture
            .output("DP-1")
            .preferred_mode(1920, 1080, 60.0)
            .clones_with("DP-2");
        fixture.output("DP-2").preferred_mode(1920, 1080, 60.0);
        let hw = fixture.build();
        assert_eq!(
            assign_crtcs(&hw, &clone_config(&hw)),
            Err(AssignError::NoAssignment)
        );
    }

    #[test]
    fn test_unknown_output() {
        let mut fixture = Fixture::new();
        fixture.output("DP-1").preferred_mode(1920, 1080, 60.0);
        let hw = fixture.build();

        let mut keys = ConfigKey::from_hardware(&hw).keys().to_vec();
        keys[0].connector = "HDMI-1".to_string();
        let config = Configuration::new(keys, vec![OutputConfig::default()]);
        assert_eq!(
            assign_crtcs(&hw, &config),
            Err(AssignError::UnknownOutput("HDMI-1".to_string()))
        );

        let config = Configuration::new(Vec::new(), Vec::new());
        assert_eq!(
            assign_crtcs(&hw, &config),
            Err(AssignError::OutputCountMismatch {
                config: 0,
                hardware: 1
            })
        );
    }

    /// Outputs `DP-0..` with identical modes. Output `i` can use the CRTCs
    /// in `masks[i]` and clone output `j` when `clones[i * n + j]` is set.
    fn restricted_hardware(n_crtcs: usize, masks: &[u32], clones: &[bool]) -> Hardware {
        let mut fixture = Fixture::new();
        fixture.crtcs(n_crtcs);
        let n = masks.len();
        for (i, &mask) in masks.iter().enumerate() {
            let output = fixture.output(&format!("DP-{}", i));
            output.preferred_mode(1920, 1080, 60.0).possible_crtcs(mask);
            for j in (0..n).filter(|&j| j != i && clones[i * n + j]) {
                output.clones_with(&format!("DP-{}", j));
            }
        }
        fixture.build()
    }

    proptest! {
        #[test]
        fn assignments_respect_crtc_and_clone_limits(
            n_crtcs in 1..=4usize,
            outputs in prop::collection::vec((0..16u32, any::<bool>(), 0..2i32), 1..=4),
            clones in prop::collection::vec(any::<bool>(), 16),
        ) {
            let masks: Vec<u32> = outputs.iter().map(|&(mask, _, _)| mask).collect();
            let hw = restricted_hardware(n_crtcs, &masks, &clones);
            let config = configure(
                &hw,
                outputs
                    .iter()
                    .map(|&(_, enabled, column)| {
                        let mut output = OutputConfig::enabled(
                            Rectangle::new(column * 1920, 0, 1920, 1080),
                            60.0,
                        );
                        output.enabled = enabled;
                        output
                    })
                    .collect(),
            );

            let Ok(assignment) = assign_crtcs(&hw, &config) else {
                return Ok(());
            };
            for info in &assignment.crtcs {
                for &output in &info.outputs {
                    prop_assert!(hw.output(output).can_be_driven_by(info.crtc));
                    for &other in info.outputs.iter().filter(|&&other| other != output) {
                        prop_assert!(hw.output(output).can_clone(other));
                    }
                }
            }
            let ids: Vec<OutputId> = hw.output_ids().collect();
            for (id, &(_, enabled, _)) in ids.iter().zip(&outputs) {
                let bound = assignment
                    .crtcs
                    .iter()
                    .filter(|info| info.outputs.contains(id))
                    .count();
                prop_assert_eq!(bound, usize::from(enabled));
            }
        }
    }
}
