//! Persistence tests
//!
//! Configurations saved by one manager are picked up by the next one.

use std::fs;

use gf_display::backend::HeadlessBackend;
use gf_display::testing::Fixture;
use gf_display::{ConfigSource, Configuration, Event, ManagerSettings, MonitorManager, Rectangle};

fn docked_laptop() -> Fixture {
    let mut fixture = Fixture::new();
    fixture
        .output("eDP-1")
        .physical_size(294, 165)
        .preferred_mode(1920, 1080, 60.0);
    fixture
        .output("DP-1")
        .identity("DEL", "DELL U2415", "7MT0167")
        .preferred_mode(1920, 1200, 59.95);
    fixture
}

/// Put the external monitor left of the panel and store that.
fn store_external_left(manager: &mut MonitorManager<HeadlessBackend>) {
    manager.on_hotplug().unwrap();
    let config = manager.current().unwrap().clone();
    let mut outputs = config.outputs().to_vec();
    outputs[0].rect = Rectangle::new(1920, 0, 1920, 1080);
    outputs[1].rect = Rectangle::new(0, 0, 1920, 1200);
    assert!(manager.apply_configuration(Configuration::new(config.keys().to_vec(), outputs)));
    manager.make_persistent();
    manager.wait_save();
}

/// A saved layout is loaded and applied by a fresh manager
#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitors.xml");
    let fixture = docked_laptop();

    let mut manager = fixture.clone().manager_persisting_to(path.clone());
    store_external_left(&mut manager);

    let events: Vec<_> = manager.drain_events().collect();
    assert!(events.contains(&Event::ConfigurationSaved {
        path: path.clone(),
        error: None,
    }));
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("<monitors version=\"1\">"));
    assert!(contents.contains("<output name=\"DP-1\">"));

    let mut manager = fixture.manager_persisting_to(path);
    assert_eq!(manager.store().len(), 1);
    manager.on_hotplug().unwrap();

    let rects: Vec<_> = manager.logical_monitors().iter().map(|lm| lm.rect).collect();
    assert_eq!(
        rects,
        [
            Rectangle::new(1920, 0, 1920, 1080),
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

/// A broken user file falls through to the system-wide one
#[test]
fn test_broken_user_file_uses_system_file() {
    let dir = tempfile::tempdir().unwrap();
    let system = dir.path().join("system-monitors.xml");
    let user = dir.path().join("monitors.xml");
    let fixture = docked_laptop();

    let mut manager = fixture.clone().manager_persisting_to(system.clone());
    store_external_left(&mut manager);
    fs::write(&user, "<monitors version=\"7\"></monitors>").unwrap();

    let manager = fixture.manager_with(ManagerSettings {
        persist_path: Some(user),
        system_paths: vec![system],
        ..ManagerSettings::default()
    });
    assert_eq!(manager.store().len(), 1);
}

/// A save that cannot be written is reported, not fatal
#[test]
fn test_failed_save_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, "").unwrap();
    let path = blocker.join("monitors.xml");

    let mut manager = docked_laptop().manager_persisting_to(path.clone());
    store_external_left(&mut manager);

    let error = manager.drain_events().find_map(|event| match event {
        Event::ConfigurationSaved { error, .. } => Some(error),
        _ => None,
    });
    assert!(matches!(error, Some(Some(_))));
    assert_eq!(manager.store().len(), 1);
}
