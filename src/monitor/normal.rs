use super::{Monitor, MonitorCrtcMode, MonitorKind, MonitorMode, MonitorModeSpec};
use crate::hardware::{Hardware, OutputId};

pub(super) fn new_normal(hw: &Hardware, output_id: OutputId) -> Monitor {
    let mut monitor = Monitor::with_outputs(hw, MonitorKind::Normal, vec![output_id]);
    generate_modes(&mut monitor, hw, output_id);
    monitor
}

fn generate_modes(monitor: &mut Monitor, hw: &Hardware, output_id: OutputId) {
    let output = hw.output(output_id);
    let preferred_flags = hw.mode(output.preferred_mode).flags;
    let swap = output.panel_orientation_transform.is_rotated();
    let live_mode = hw.output_crtc_config(output_id).map(|config| config.mode);

    for &crtc_mode_id in &output.modes {
        let crtc_mode = hw.mode(crtc_mode_id);
        let mode = MonitorMode::new(
            MonitorModeSpec::from_crtc_mode(crtc_mode, swap),
            vec![MonitorCrtcMode {
                output: output_id,
                crtc_mode: Some(crtc_mode_id),
            }],
            false,
        );

        let replace = crtc_mode.flags == preferred_flags;
        let Some(index) = monitor.add_mode(mode, replace) else {
            debug_assert_ne!(crtc_mode_id, output.preferred_mode);
            continue;
        };

        if crtc_mode_id == output.preferred_mode {
            monitor.preferred_mode = Some(index);
        }
        if live_mode == Some(crtc_mode_id) {
            monitor.current_mode = Some(index);
        }
    }
}
