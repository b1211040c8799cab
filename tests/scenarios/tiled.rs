//! Tiled monitor tests
//!
//! A 4K panel driven over two connectors, each carrying one half.

use gf_display::backend::HeadlessBackend;
use gf_display::testing::Fixture;
use gf_display::{Configuration, MonitorManager, OutputConfig, Rectangle};

fn laptop_with_tiled_monitor() -> MonitorManager<HeadlessBackend> {
    let mut fixture = Fixture::new();
    fixture
        .output("eDP-1")
        .physical_size(294, 165)
        .preferred_mode(1920, 1080, 60.0);
    fixture
        .output("DP-1")
        .identity("GSM", "LG UltraFine", "701NTAB4S144")
        .tile(9, 0, 0, 2, 1, 1920, 2160)
        .preferred_mode(1920, 2160, 60.0)
        .mode(1920, 1080, 60.0);
    fixture
        .output("DP-2")
        .identity("GSM", "LG UltraFine", "701NTAB4S144")
        .tile(9, 1, 0, 2, 1, 1920, 2160)
        .preferred_mode(1920, 2160, 60.0);
    fixture.manager()
}

/// Both tiles are driven side by side and reported as one monitor
#[test]
fn test_tiled_monitor_default_layout() {
    let mut manager = laptop_with_tiled_monitor();
    manager.on_hotplug().unwrap();

    assert_eq!(manager.monitors().len(), 2);
    assert!(manager.monitors()[1].is_tiled());
    let rects: Vec<_> = manager.logical_monitors().iter().map(|lm| lm.rect).collect();
    assert_eq!(
        rects,
        [
            Rectangle::new(0, 0, 1920, 1080),
            Rectangle::new(1920, 0, 3840, 2160)
        ]
    );

    let state = manager.state();
    let tiled = &state.monitors[1];
    assert!(tiled.is_tiled);
    let current: Vec<_> = tiled
        .modes
        .iter()
        .filter(|m| m.is_current)
        .map(|m| m.id.as_str())
        .collect();
    assert_eq!(current, ["3840x2160@60.000"]);
    assert!(tiled.modes.iter().any(|m| m.id == "1920x1080@60.000"));
}

/// Switching to the untiled mode drives one connector and turns the other off
#[test]
fn test_switch_to_untiled_mode() {
    let mut manager = laptop_with_tiled_monitor();
    manager.on_hotplug().unwrap();

    let config = manager.current().unwrap().clone();
    let mut outputs = config.outputs().to_vec();
    outputs[1] = OutputConfig::enabled(Rectangle::new(1920, 0, 1920, 1080), 60.0);
    outputs[2].disable();
    assert!(manager.apply_configuration(Configuration::new(config.keys().to_vec(), outputs)));

    assert_eq!(manager.monitors().len(), 2);
    assert_eq!(
        manager.logical_monitors()[1].rect,
        Rectangle::new(1920, 0, 1920, 1080)
    );
    let backend = manager.backend();
    assert!(backend.output("DP-1").unwrap().active.is_some());
    assert!(backend.output("DP-2").unwrap().active.is_none());
}
