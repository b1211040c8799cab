//! Tiled monitors: one panel driven through several outputs.

use tracing::warn;

use super::{Monitor, MonitorCrtcMode, MonitorKind, MonitorMode, MonitorModeSpec};
use crate::hardware::{CrtcModeId, Hardware, Output, OutputId};
use crate::transform::MonitorTransform;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TiledInfo {
    pub tile_group_id: u32,
    /// The tile at location (0, 0).
    pub origin_output: OutputId,
    /// The tile with the most untiled modes; drives the untiled fallbacks.
    pub main_output: OutputId,
}

pub(super) fn new_tiled(hw: &Hardware, tile_group_id: u32) -> Monitor {
    let outputs: Vec<OutputId> = hw
        .output_ids()
        .filter(|&id| hw.output(id).tile_info.group_id == tile_group_id)
        .collect();

    let origin_output = outputs
        .iter()
        .copied()
        .find(|&id| hw.output(id).tile_info.is_origin())
        .unwrap_or_else(|| {
            warn!("Tile group {} has no origin tile", tile_group_id);
            outputs[0]
        });
    let main_output = find_untiled_output(hw, &outputs, origin_output);

    let info = TiledInfo {
        tile_group_id,
        origin_output,
        main_output,
    };
    let mut monitor = Monitor::with_outputs(hw, MonitorKind::Tiled(info), outputs);
    generate_modes(&mut monitor, hw, origin_output, main_output);
    monitor
}

fn is_crtc_mode_tiled(hw: &Hardware, output: &Output, mode: CrtcModeId) -> bool {
    let mode = hw.mode(mode);
    mode.width == output.tile_info.tile_w as i32 && mode.height == output.tile_info.tile_h as i32
}

fn count_untiled_crtc_modes(hw: &Hardware, output: &Output) -> usize {
    output
        .modes
        .iter()
        .filter(|&&mode| !is_crtc_mode_tiled(hw, output, mode))
        .count()
}

fn find_untiled_output(hw: &Hardware, outputs: &[OutputId], origin: OutputId) -> OutputId {
    let mut candidate = origin;
    let mut candidate_count = count_untiled_crtc_modes(hw, hw.output(origin));

    for &id in outputs.iter().filter(|&&id| id != origin) {
        let count = count_untiled_crtc_modes(hw, hw.output(id));
        if count > candidate_count {
            candidate = id;
            candidate_count = count;
        }
    }

    candidate
}

/// Composite size: tile widths along the top row by tile heights along the
/// left column.
fn calculate_tiled_size(hw: &Hardware, outputs: &[OutputId]) -> (i32, i32) {
    let mut width = 0;
    let mut height = 0;
    for &id in outputs {
        let tile = &hw.output(id).tile_info;
        if tile.loc_v_tile == 0 {
            width += tile.tile_w as i32;
        }
        if tile.loc_h_tile == 0 {
            height += tile.tile_h as i32;
        }
    }
    (width, height)
}

fn find_tiled_crtc_mode(
    hw: &Hardware,
    output: &Output,
    reference: CrtcModeId,
) -> Option<CrtcModeId> {
    let reference = hw.mode(reference);
    let matches = |id: CrtcModeId| {
        let mode = hw.mode(id);
        is_crtc_mode_tiled(hw, output, id)
            && mode.refresh_rate == reference.refresh_rate
            && mode.flags == reference.flags
    };

    if matches(output.preferred_mode) {
        return Some(output.preferred_mode);
    }
    output.modes.iter().copied().find(|&id| matches(id))
}

fn create_tiled_monitor_mode(
    hw: &Hardware,
    outputs: &[OutputId],
    reference: CrtcModeId,
) -> Option<(MonitorMode, bool)> {
    let (width, height) = calculate_tiled_size(hw, outputs);
    let reference_mode = hw.mode(reference);
    let spec = MonitorModeSpec {
        width,
        height,
        refresh_rate: reference_mode.refresh_rate,
        flags: reference_mode.flags.handled(),
    };

    let mut is_preferred = true;
    let mut crtc_modes = Vec::with_capacity(outputs.len());
    for &id in outputs {
        let output = hw.output(id);
        let Some(crtc_mode) = find_tiled_crtc_mode(hw, output, reference) else {
            warn!(
                "No tiled mode with refresh rate {} on {}",
                reference_mode.refresh_rate, output.name
            );
            return None;
        };
        is_preferred &= crtc_mode == output.preferred_mode;
        crtc_modes.push(MonitorCrtcMode {
            output: id,
            crtc_mode: Some(crtc_mode),
        });
    }

    Some((MonitorMode::new(spec, crtc_modes, true), is_preferred))
}

fn generate_tiled_monitor_modes(monitor: &mut Monitor, hw: &Hardware, origin: OutputId) {
    let origin_output = hw.output(origin);
    let tiled_modes: Vec<(MonitorMode, bool)> = origin_output
        .modes
        .iter()
        .filter(|&&mode| is_crtc_mode_tiled(hw, origin_output, mode))
        .filter_map(|&reference| create_tiled_monitor_mode(hw, &monitor.outputs, reference))
        .collect();

    let mut inserted = Vec::new();
    for (mode, is_preferred) in tiled_modes {
        let assigned = monitor.is_mode_assigned(hw, &mode);
        let Some(index) = monitor.add_mode(mode, false) else {
            continue;
        };
        if assigned {
            monitor.current_mode = Some(index);
        }
        if is_preferred {
            monitor.preferred_mode = Some(index);
        }
        inserted.push(index);
    }

    if monitor.preferred_mode.is_none() {
        let best = inserted.into_iter().reduce(|best, index| {
            if monitor.modes[index].spec.refresh_rate > monitor.modes[best].spec.refresh_rate {
                index
            } else {
                best
            }
        });
        monitor.preferred_mode = best;
    }
}

fn generate_untiled_monitor_modes(monitor: &mut Monitor, hw: &Hardware, main: OutputId) {
    let main_output = hw.output(main);

    for &crtc_mode_id in &main_output.modes {
        if is_crtc_mode_tiled(hw, main_output, crtc_mode_id) {
            continue;
        }

        let crtc_modes = monitor
            .outputs
            .iter()
            .map(|&output| MonitorCrtcMode {
                output,
                crtc_mode: (output == main).then_some(crtc_mode_id),
            })
            .collect();
        let mode = MonitorMode::new(
            MonitorModeSpec::from_crtc_mode(hw.mode(crtc_mode_id), false),
            crtc_modes,
            false,
        );

        let assigned = monitor.is_mode_assigned(hw, &mode);
        let Some(index) = monitor.add_mode(mode, false) else {
            continue;
        };
        if assigned {
            monitor.current_mode = Some(index);
        }
        if monitor.preferred_mode.is_none() && crtc_mode_id == main_output.preferred_mode {
            monitor.preferred_mode = Some(index);
        }
    }
}

fn find_best_mode(monitor: &Monitor) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, mode) in monitor.modes.iter().enumerate() {
        let better = match best {
            None => true,
            Some(b) => {
                let best_spec = &monitor.modes[b].spec;
                mode.spec.area() > best_spec.area()
                    || (mode.spec.area() == best_spec.area()
                        && mode.spec.refresh_rate > best_spec.refresh_rate)
            }
        };
        if better {
            best = Some(index);
        }
    }
    best
}

fn generate_modes(monitor: &mut Monitor, hw: &Hardware, origin: OutputId, main: OutputId) {
    generate_tiled_monitor_modes(monitor, hw, origin);

    if monitor.preferred_mode.is_none() {
        warn!(
            "Tiled monitor on {} didn't have any tiled modes",
            monitor.spec.connector
        );
    }

    generate_untiled_monitor_modes(monitor, hw, main);

    if monitor.preferred_mode.is_none() {
        monitor.preferred_mode = find_best_mode(monitor);
    }
}

/// Position of `output`'s tile inside a tiled mode, accumulated over the
/// tiles that precede it once `crtc_transform` is applied.
pub(super) fn calculate_crtc_pos(
    hw: &Hardware,
    outputs: &[OutputId],
    mode: &MonitorMode,
    output: OutputId,
    crtc_transform: MonitorTransform,
) -> (i32, i32) {
    if !mode.is_tiled {
        return (0, 0);
    }

    let tile = hw.output(output).tile_info;
    let mut x = 0;
    let mut y = 0;

    for &other_id in outputs.iter().filter(|&&id| id != output) {
        let other = hw.output(other_id).tile_info;
        let same_row = other.loc_v_tile == tile.loc_v_tile;
        let same_column = other.loc_h_tile == tile.loc_h_tile;

        match crtc_transform {
            MonitorTransform::Normal | MonitorTransform::Flipped => {
                if same_row && other.loc_h_tile < tile.loc_h_tile {
                    x += other.tile_w as i32;
                }
                if same_column && other.loc_v_tile < tile.loc_v_tile {
                    y += other.tile_h as i32;
                }
            }
            MonitorTransform::Rotate180 | MonitorTransform::Flipped180 => {
                if same_row && other.loc_h_tile > tile.loc_h_tile {
                    x += other.tile_w as i32;
                }
                if same_column && other.loc_v_tile > tile.loc_v_tile {
                    y += other.tile_h as i32;
                }
            }
            MonitorTransform::Rotate270 | MonitorTransform::Flipped270 => {
                if same_row && other.loc_h_tile < tile.loc_h_tile {
                    y += other.tile_w as i32;
                }
                if same_column && other.loc_v_tile < tile.loc_v_tile {
                    x += other.tile_h as i32;
                }
            }
            MonitorTransform::Rotate90 | MonitorTransform::Flipped90 => {
                if same_row && other.loc_h_tile > tile.loc_h_tile {
                    y += other.tile_w as i32;
                }
                if same_column && other.loc_v_tile > tile.loc_v_tile {
                    x += other.tile_h as i32;
                }
            }
        }
    }

    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::build_monitors;
    use crate::testing::Fixture;

    /// Two 1920x1080 tiles side by side, each also offering an untiled
    /// 1920x1080 mode.
    fn two_tile_fixture() -> Fixture {
        let mut fixture = Fixture::new();
        for (name, loc_h) in [("DP-1", 0), ("DP-2", 1)] {
            fixture
                .output(name)
                .identity("DEL", "UP3218K", "T1")
                .tile(4, loc_h, 0, 2, 1, 1920, 1080)
                .preferred_mode(1920, 1080, 60.0)
                .mode(3840, 1080, 30.0);
        }
        fixture
    }

    #[test]
    fn test_two_tile_monitor() {
        let hw = two_tile_fixture().build();
        let monitors = build_monitors(&hw);
        assert_eq!(monitors.len(), 1);

        let monitor = &monitors[0];
        assert!(monitor.is_tiled());
        assert_eq!(monitor.outputs().len(), 2);

        let preferred = monitor.mode(monitor.preferred_mode().unwrap());
        assert_eq!(preferred.id, "3840x1080@60.000");
        assert!(preferred.is_tiled);
        assert!(preferred.crtc_modes.iter().all(|m| m.crtc_mode.is_some()));

        let untiled = monitor.mode(monitor.mode_by_id("3840x1080@30.000").unwrap());
        assert!(!untiled.is_tiled);
        assert_eq!(untiled.crtc_modes[1].crtc_mode, None);

        let preferred_count = monitor
            .modes()
            .iter()
            .enumerate()
            .filter(|(i, _)| monitor.preferred_mode() == Some(*i))
            .count();
        assert_eq!(preferred_count, 1);
    }

    #[test]
    fn test_crtc_positions() {
        let hw = two_tile_fixture().build();
        let monitors = build_monitors(&hw);
        let monitor = &monitors[0];
        let mode = monitor.mode(monitor.preferred_mode().unwrap());
        let (left, right) = (monitor.outputs()[0], monitor.outputs()[1]);

        let pos = |output, transform| monitor.calculate_crtc_pos(&hw, mode, output, transform);
        assert_eq!(pos(left, MonitorTransform::Normal), (0, 0));
        assert_eq!(pos(right, MonitorTransform::Normal), (1920, 0));
        assert_eq!(pos(left, MonitorTransform::Rotate180), (1920, 0));
        assert_eq!(pos(right, MonitorTransform::Rotate180), (0, 0));
        assert_eq!(pos(right, MonitorTransform::Rotate270), (0, 1920));
        assert_eq!(pos(left, MonitorTransform::Rotate90), (0, 1920));

        let untiled = monitor.mode(monitor.mode_by_id("3840x1080@30.000").unwrap());
        let pos_in = |mode, output| {
            monitor.calculate_crtc_pos(&hw, mode, output, MonitorTransform::Normal)
        };
        assert_eq!(pos_in(untiled, right), (0, 0));
    }

    #[test]
    fn test_missing_tile_mode_discards_composite() {
        let mut fixture = Fixture::new();
        fixture
            .output("DP-1")
            .tile(7, 0, 0, 2, 1, 1920, 2160)
            .preferred_mode(1920, 2160, 60.0)
            .mode(1920, 2160, 30.0)
            .mode(1920, 1080, 60.0);
        fixture
            .output("DP-2")
            .tile(7, 1, 0, 2, 1, 1920, 2160)
            .preferred_mode(1920, 2160, 60.0);
        let hw = fixture.build();

        let monitors = build_monitors(&hw);
        let monitor = &monitors[0];
        assert!(monitor.mode_by_id("3840x2160@30.000").is_none());
        assert!(monitor.mode_by_id("3840x2160@60.000").is_some());
        assert_eq!(
            monitor.mode(monitor.preferred_mode().unwrap()).id,
            "3840x2160@60.000"
        );
        assert!(monitor.mode_by_id("1920x1080@60.000").is_some());
    }

    #[test]
    fn test_highest_refresh_when_no_tile_is_preferred() {
        let mut fixture = Fixture::new();
        for (name, loc_h) in [("DP-1", 0), ("DP-2", 1)] {
            fixture
                .output(name)
                .tile(9, loc_h, 0, 2, 1, 1280, 1440)
                .preferred_mode(2560, 1440, 60.0)
                .mode(1280, 1440, 30.0)
                .mode(1280, 1440, 60.0);
        }
        let hw = fixture.build();

        let monitors = build_monitors(&hw);
        let monitor = &monitors[0];
        assert_eq!(
            monitor.mode(monitor.preferred_mode().unwrap()).id,
            "2560x1440@60.000"
        );
        assert!(monitor.mode(monitor.preferred_mode().unwrap()).is_tiled);
    }
}
