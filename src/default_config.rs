//! Synthesizing a configuration when none is stored.
//!
//! Strategies are tried in order and the first that produces something wins:
//!
//! 1. driver-suggested positions, when every output has one and none of the
//!    resulting rectangles overlap;
//! 2. extending a stored configuration that covers all outputs but one;
//! 3. a linear left-to-right layout starting with the primary output.
//!
//! Whatever the strategy, outputs that do not fit the screen limits end up
//! disabled.

use tracing::{debug, info, warn};

use crate::assign::{CrtcAssignment, CrtcInfo, OutputInfo};
use crate::config::{ConfigKey, ConfigStore, Configuration, OutputConfig};
use crate::hardware::{Hardware, OutputId};
use crate::monitor::MonitorModeSpec;
use crate::rect::Rectangle;
use crate::tracy_span;
use crate::transform::MonitorTransform;

/// The output that should become primary: one already flagged primary, else
/// a laptop panel, else the one with the largest preferred mode.
pub fn find_primary_output(hw: &Hardware) -> Option<OutputId> {
    if let Some(primary) = hw.output_ids().find(|&id| hw.output(id).is_primary) {
        return Some(primary);
    }
    if let Some(laptop) = hw.output_ids().find(|&id| hw.output(id).is_laptop()) {
        return Some(laptop);
    }

    let mut ids = hw.output_ids();
    let first = ids.next()?;
    let area = |id: OutputId| {
        let mode = hw.mode(hw.output(id).preferred_mode);
        i64::from(mode.width) * i64::from(mode.height)
    };
    // Strictly larger, so the earliest output wins ties.
    Some(ids.fold(first, |best, id| if area(id) > area(best) { id } else { best }))
}

/// The preferred mode at the origin, sized like the monitor mode it shows up
/// as (swapped for panels mounted sideways).
fn preferred_output_config(hw: &Hardware, output: OutputId) -> OutputConfig {
    let output = hw.output(output);
    let spec = MonitorModeSpec::from_crtc_mode(
        hw.mode(output.preferred_mode),
        output.panel_orientation_transform.is_rotated(),
    );
    OutputConfig::enabled(Rectangle::new(0, 0, spec.width, spec.height), spec.refresh_rate)
}

fn make_suggested_config(hw: &Hardware, primary: OutputId) -> Option<Vec<OutputConfig>> {
    let mut outputs: Vec<OutputConfig> = Vec::with_capacity(hw.outputs().len());

    for id in hw.output_ids() {
        let output = hw.output(id);
        let (x, y) = output.suggested_position()?;

        let mut config = preferred_output_config(hw, id);
        config.rect.x = x;
        config.rect.y = y;
        config.is_primary = id == primary;

        if config.rect.overlaps_any(outputs.iter().map(|o| &o.rect)) {
            debug!("Suggested position of {} overlaps another output", output.name);
            return None;
        }
        outputs.push(config);
    }

    Some(outputs)
}

fn extend_stored_config(
    hw: &Hardware,
    store: &ConfigStore,
    key: &ConfigKey,
    max_width: i32,
    max_height: i32,
) -> Option<Vec<OutputConfig>> {
    for (new_index, new_output) in hw.output_ids().enumerate() {
        let Some(stored) = store.lookup(&key.without(new_index)) else {
            continue;
        };

        let mut outputs = Vec::with_capacity(key.len());
        outputs.extend_from_slice(&stored.outputs()[..new_index]);
        outputs.push(OutputConfig::default());
        outputs.extend_from_slice(&stored.outputs()[new_index..]);

        let extents = outputs
            .iter()
            .filter(|o| o.enabled)
            .map(|o| o.rect)
            .reduce(|acc, rect| acc.union(&rect));

        let mut config = preferred_output_config(hw, new_output);
        match extents {
            None => {}
            Some(extents) if extents.right() + config.rect.width <= max_width => {
                config.rect.x = extents.right();
                config.rect.y = extents.y;
            }
            Some(extents) if extents.bottom() + config.rect.height <= max_height => {
                config.rect.x = extents.x;
                config.rect.y = extents.bottom();
            }
            Some(_) => {
                debug!(
                    "No room for {} next to the stored layout, disabling it",
                    hw.output(new_output).name
                );
                config.disable();
            }
        }
        outputs[new_index] = config;

        debug!(
            "Extending stored configuration with {}",
            hw.output(new_output).name
        );
        return Some(outputs);
    }

    None
}

/// Members of the tile group `group_id`, in output order.
fn tile_group(hw: &Hardware, group_id: u32) -> Vec<OutputId> {
    hw.output_ids()
        .filter(|&id| hw.output(id).tile_info.group_id == group_id)
        .collect()
}

/// Lay a tile group out at `x`. Returns the group width.
fn place_tile_group(
    hw: &Hardware,
    group: &[OutputId],
    x: i32,
    primary: OutputId,
    outputs: &mut [OutputConfig],
) -> i32 {
    let mut width = 0;

    for &id in group {
        let tile = hw.output(id).tile_info;
        let (offset_x, offset_y) = group.iter().map(|&other| hw.output(other).tile_info).fold(
            (0, 0),
            |(ox, oy), other| {
                let ox = if other.loc_v_tile == tile.loc_v_tile && other.loc_h_tile < tile.loc_h_tile {
                    ox + other.tile_w as i32
                } else {
                    ox
                };
                let oy = if other.loc_h_tile == tile.loc_h_tile && other.loc_v_tile < tile.loc_v_tile {
                    oy + other.tile_h as i32
                } else {
                    oy
                };
                (ox, oy)
            },
        );

        let mut config = preferred_output_config(hw, id);
        config.rect.x = x + offset_x;
        config.rect.y = offset_y;
        config.is_primary = id == primary;
        if tile.loc_v_tile == 0 {
            width += config.rect.width;
        }
        outputs[id.index()] = config;
    }

    width
}

fn make_linear_config(hw: &Hardware, primary: OutputId) -> Vec<OutputConfig> {
    let mut outputs = vec![OutputConfig::default(); hw.outputs().len()];
    let mut placed = vec![false; hw.outputs().len()];
    let mut x = 0;

    // Primary first, then other tile groups, then everything else.
    let mut order: Vec<OutputId> = vec![primary];
    order.extend(
        hw.output_ids()
            .filter(|&id| id != primary && hw.output(id).tile_info.is_tiled()),
    );
    order.extend(
        hw.output_ids()
            .filter(|&id| id != primary && !hw.output(id).tile_info.is_tiled()),
    );

    for id in order {
        if placed[id.index()] {
            continue;
        }

        let tile = hw.output(id).tile_info;
        if tile.is_tiled() {
            let group = tile_group(hw, tile.group_id);
            x += place_tile_group(hw, &group, x, primary, &mut outputs);
            for member in group {
                placed[member.index()] = true;
            }
        } else {
            let mut config = preferred_output_config(hw, id);
            config.rect.x = x;
            config.is_primary = id == primary;
            x += config.rect.width;
            outputs[id.index()] = config;
            placed[id.index()] = true;
        }
    }

    outputs
}

fn disable_oversized(hw: &Hardware, outputs: &mut [OutputConfig], max_width: i32, max_height: i32) {
    let bounds = Rectangle::new(0, 0, max_width, max_height);
    for (id, config) in hw.output_ids().zip(outputs.iter_mut()) {
        if config.enabled && !bounds.contains_rect(&config.rect) {
            warn!(
                "{} does not fit in the {}x{} screen, disabling it",
                hw.output(id).name,
                max_width,
                max_height
            );
            config.disable();
        }
    }
}

/// Synthesize a configuration for `hw`. Returns `None` when nothing is
/// connected.
pub fn make_default_config(
    hw: &Hardware,
    store: &ConfigStore,
    max_width: i32,
    max_height: i32,
) -> Option<Configuration> {
    tracy_span!("make_default_config");

    let primary = find_primary_output(hw)?;
    let key = ConfigKey::from_hardware(hw);

    let mut outputs = if key.len() == 1 {
        let mut config = preferred_output_config(hw, primary);
        config.is_primary = true;
        vec![config]
    } else if let Some(outputs) = make_suggested_config(hw, primary) {
        debug!("Using driver-suggested positions");
        outputs
    } else if let Some(outputs) = (!hw.has_hotplug_mode_update())
        .then(|| extend_stored_config(hw, store, &key, max_width, max_height))
        .flatten()
    {
        outputs
    } else {
        debug!("Using linear layout");
        make_linear_config(hw, primary)
    };

    disable_oversized(hw, &mut outputs, max_width, max_height);

    let config = Configuration::new(key.keys().to_vec(), outputs);
    info!(
        "Default configuration: {} of {} outputs enabled",
        config.n_enabled(),
        config.len()
    );
    Some(config)
}

/// Drive only the primary output, at its preferred mode on its first
/// capable CRTC. Used when no configuration enables anything.
pub fn primary_only_assignment(hw: &Hardware) -> Option<CrtcAssignment> {
    let primary = find_primary_output(hw)?;
    let output = hw.output(primary);
    let transform = output.logical_to_crtc_transform(MonitorTransform::Normal);
    let Some(&crtc) = output
        .possible_crtcs
        .iter()
        .find(|&&crtc| hw.crtc(crtc).supports_transform(transform))
    else {
        warn!("{} cannot be driven by any CRTC", output.name);
        return None;
    };

    Some(CrtcAssignment {
        crtcs: vec![CrtcInfo {
            crtc,
            mode: output.preferred_mode,
            x: 0,
            y: 0,
            transform,
            outputs: vec![primary],
        }],
        outputs: hw
            .output_ids()
            .map(|id| OutputInfo {
                output: id,
                is_primary: id == primary,
                is_presentation: false,
                is_underscanning: false,
            })
            .collect(),
    })
}
