//! Hotplug tests
//!
//! Outputs coming and going, and the layout chosen for each output set.

use gf_display::backend::HeadlessBackend;
use gf_display::testing::Fixture;
use gf_display::{ConfigSource, Configuration, Event, MonitorManager, Rectangle};

fn docked_laptop() -> MonitorManager<HeadlessBackend> {
    let mut fixture = Fixture::new();
    fixture
        .output("eDP-1")
        .physical_size(294, 165)
        .preferred_mode(1920, 1080, 60.0)
        .active_at(0, 0);
    fixture
        .output("DP-1")
        .identity("DEL", "DELL U2415", "7MT0167")
        .preferred_mode(1920, 1200, 59.95);
    fixture.manager()
}

fn layout(manager: &MonitorManager<HeadlessBackend>) -> Vec<Rectangle> {
    manager.logical_monitors().iter().map(|lm| lm.rect).collect()
}

fn plug_external(manager: &mut MonitorManager<HeadlessBackend>) {
    manager
        .backend_mut()
        .add_output("DP-1")
        .identity("DEL", "DELL U2415", "7MT0167")
        .preferred_mode(1920, 1200, 59.95);
}

/// Unplugging the external monitor leaves the panel alone at the origin
#[test]
fn test_unplug_external() {
    let mut manager = docked_laptop();
    manager.on_hotplug().unwrap();
    assert_eq!(manager.logical_monitors().len(), 2);

    manager.backend_mut().remove_output("DP-1");
    manager.on_hotplug().unwrap();

    assert_eq!(layout(&manager), [Rectangle::new(0, 0, 1920, 1080)]);
    assert!(manager.logical_monitors()[0].is_primary);
    assert_eq!(manager.current().unwrap().keys().len(), 1);
}

/// A stored layout comes back when its output set is plugged in again
#[test]
fn test_replug_restores_stored_layout() {
    let mut manager = docked_laptop();
    manager.on_hotplug().unwrap();

    // External above the panel.
    let config = manager.current().unwrap().clone();
    let mut outputs = config.outputs().to_vec();
    outputs[0].rect = Rectangle::new(0, 1200, 1920, 1080);
    outputs[1].rect = Rectangle::new(0, 0, 1920, 1200);
    assert!(manager.apply_configuration(Configuration::new(config.keys().to_vec(), outputs)));
    manager.make_persistent();

    manager.backend_mut().remove_output("DP-1");
    manager.on_hotplug().unwrap();
    assert_eq!(layout(&manager), [Rectangle::new(0, 0, 1920, 1080)]);
    manager.drain_events().for_each(drop);

    plug_external(&mut manager);
    manager.on_hotplug().unwrap();

    assert_eq!(
        layout(&manager),
        [
            Rectangle::new(0, 1200, 1920, 1080),
            Rectangle::new(0, 0, 1920, 1200)
        ]
    );
    let events: Vec<_> = manager.drain_events().collect();
    assert!(events.contains(&Event::ConfigurationApplied {
        source: ConfigSource::Stored,
        n_outputs: 2,
        n_enabled: 2,
    }));
}

/// A monitor plugged next to a stored layout extends it instead of
/// reshuffling what the user arranged
#[test]
fn test_new_monitor_extends_stored_layout() {
    let mut manager = docked_laptop();
    manager.on_hotplug().unwrap();

    let config = manager.current().unwrap().clone();
    let mut outputs = config.outputs().to_vec();
    outputs[0].rect = Rectangle::new(1920, 0, 1920, 1080);
    outputs[1].rect = Rectangle::new(0, 0, 1920, 1200);
    assert!(manager.apply_configuration(Configuration::new(config.keys().to_vec(), outputs)));
    manager.make_persistent();

    manager
        .backend_mut()
        .add_output("HDMI-1")
        .preferred_mode(1280, 1024, 60.0);
    manager.on_hotplug().unwrap();

    assert_eq!(
        layout(&manager),
        [
            Rectangle::new(1920, 0, 1920, 1080),
            Rectangle::new(0, 0, 1920, 1200),
            Rectangle::new(3840, 0, 1280, 1024)
        ]
    );
}

/// Two outputs but one CRTC: the default layout cannot be driven, so only
/// the primary output comes on
#[test]
fn test_single_crtc_falls_back_to_primary() {
    let mut fixture = Fixture::new();
    fixture.output("eDP-1").preferred_mode(1920, 1080, 60.0);
    fixture.output("DP-1").preferred_mode(2560, 1440, 60.0);
    fixture.crtcs(1);
    let mut manager = fixture.manager();
    manager.on_hotplug().unwrap();

    let events: Vec<_> = manager.drain_events().collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ConfigurationFailed { source: ConfigSource::Default, .. })));
    assert_eq!(manager.logical_monitors().len(), 1);
}

/// Closing the lid while docked, then undocking, keeps the panel usable
#[test]
fn test_lid_closed_then_undocked() {
    let mut manager = docked_laptop();
    manager.on_hotplug().unwrap();

    manager.on_lid_closed_changed(true);
    assert_eq!(layout(&manager), [Rectangle::new(0, 0, 1920, 1200)]);

    manager.backend_mut().remove_output("DP-1");
    manager.on_hotplug().unwrap();

    // Nothing else is left on, so the panel stays on.
    assert!(!manager.is_lid_config_active());
    assert_eq!(layout(&manager), [Rectangle::new(0, 0, 1920, 1080)]);
}
