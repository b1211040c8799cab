//! Logical monitors: the rectangles the desktop lays windows onto.

use serde::Serialize;

use crate::hardware::Hardware;
use crate::monitor::Monitor;
use crate::rect::Rectangle;
use crate::transform::MonitorTransform;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogicalMonitor {
    pub number: usize,
    pub winsys_id: u64,
    pub rect: Rectangle,
    pub scale: f32,
    pub transform: MonitorTransform,
    pub is_primary: bool,
    /// True only if every output of every covered monitor is in
    /// presentation mode.
    pub is_presentation: bool,
    /// Indices into the monitor list this logical monitor was built from.
    pub monitors: Vec<usize>,
}

impl LogicalMonitor {
    fn new(number: usize, hw: &Hardware, monitor: &Monitor, rect: Rectangle, scale: f32) -> Self {
        let main = monitor.main_output();
        let transform = hw
            .output_crtc_config(main)
            .map(|config| hw.output(main).crtc_to_logical_transform(config.transform))
            .unwrap_or_default();

        Self {
            number,
            winsys_id: monitor.winsys_id(),
            rect,
            scale,
            transform,
            is_primary: false,
            is_presentation: true,
            monitors: Vec::new(),
        }
    }

    fn add_monitor(&mut self, hw: &Hardware, index: usize, monitor: &Monitor) {
        self.is_primary |= monitor.is_primary(hw);
        self.is_presentation &= monitor
            .outputs()
            .iter()
            .all(|&output| hw.output(output).is_presentation);
        self.monitors.push(index);
    }
}

/// Group active monitors sharing a layout (clones) into logical monitors and
/// record the back-reference on each monitor. If no monitor is primary the
/// first logical monitor is promoted.
pub fn build_logical_monitors(
    hw: &Hardware,
    monitors: &mut [Monitor],
    scale: f32,
) -> Vec<LogicalMonitor> {
    let mut logical_monitors: Vec<LogicalMonitor> = Vec::new();
    let mut back_refs = Vec::with_capacity(monitors.len());

    for (index, monitor) in monitors.iter().enumerate() {
        if !monitor.is_active() {
            back_refs.push(None);
            continue;
        }

        let layout = monitor.derive_layout(hw);
        let number = match logical_monitors.iter().position(|lm| lm.rect == layout) {
            Some(number) => number,
            None => {
                let number = logical_monitors.len();
                logical_monitors.push(LogicalMonitor::new(number, hw, monitor, layout, scale));
                number
            }
        };
        logical_monitors[number].add_monitor(hw, index, monitor);
        back_refs.push(Some(number));
    }

    for (monitor, back_ref) in monitors.iter_mut().zip(back_refs) {
        monitor.set_logical_monitor(back_ref);
    }

    if !logical_monitors.iter().any(|lm| lm.is_primary) {
        if let Some(first) = logical_monitors.first_mut() {
            first.is_primary = true;
        }
    }

    logical_monitors
}

/// The union of all logical monitor rectangles.
pub fn screen_size(logical_monitors: &[LogicalMonitor]) -> (i32, i32) {
    let bounds = logical_monitors
        .iter()
        .fold(Rectangle::default(), |acc, lm| acc.union(&lm.rect));
    (bounds.right().max(0), bounds.bottom().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::build_monitors;
    use crate::testing::Fixture;

    #[test]
    fn test_clones_share_a_logical_monitor() {
        let mut fixture = Fixture::new();
        fixture
            .output("eDP-1")
            .preferred_mode(1920, 1080, 60.0)
            .active_at(0, 0)
            .primary();
        fixture
            .output("HDMI-1")
            .preferred_mode(1920, 1080, 60.0)
            .active_at(0, 0);
        fixture
            .output("DP-1")
            .preferred_mode(2560, 1440, 60.0)
            .active_at(1920, 0)
            .rotated(MonitorTransform::Rotate90);
        fixture.output("DP-2").preferred_mode(1280, 1024, 60.0);
        let hw = fixture.build();

        let mut monitors = build_monitors(&hw);
        let logical = build_logical_monitors(&hw, &mut monitors, 1.0);

        assert_eq!(logical.len(), 2);
        assert_eq!(logical[0].monitors, [0, 1]);
        assert!(logical[0].is_primary);
        assert!(!logical[0].is_presentation);
        assert_eq!(logical[1].rect, Rectangle::new(1920, 0, 1440, 2560));
        assert_eq!(logical[1].transform, MonitorTransform::Rotate90);
        assert_eq!(monitors[2].logical_monitor(), Some(1));
        assert_eq!(monitors[3].logical_monitor(), None);
        assert_eq!(screen_size(&logical), (3360, 2560));
    }

    #[test]
    fn test_first_logical_monitor_promoted_to_primary() {
        let mut fixture = Fixture::new();
        fixture
            .output("DP-1")
            .preferred_mode(1920, 1080, 60.0)
            .active_at(0, 0);
        let hw = fixture.build();

        let mut monitors = build_monitors(&hw);
        let logical = build_logical_monitors(&hw, &mut monitors, 2.0);
        assert!(logical[0].is_primary);
        assert_eq!(logical[0].scale, 2.0);
    }
}
