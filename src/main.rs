//! gf-display binary entry point
//!
//! Debugging tool: runs the configuration engine against a virtual laptop
//! with one external monitor and prints every resulting display state and
//! event as JSON. Production use is through the library.
//!
//! With the `dbus` feature, `--serve` also exports each state as
//! `org.gnome.Mutter.DisplayConfig` and keeps serving the last one.

use std::path::Path;

use anyhow::Context;
use gf_display::backend::HeadlessBackend;
use gf_display::hardware::ConnectorType;
use gf_display::{init_logging, ManagerSettings, MonitorManager};
use tracing::{error, info};

fn load_settings(path: &Path) -> anyhow::Result<ManagerSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn demo_backend() -> HeadlessBackend {
    let mut backend = HeadlessBackend::new();
    backend
        .add_output("eDP-1")
        .identity("BOE", "0x0a1c", "0x00000000")
        .connector(ConnectorType::Edp)
        .physical_size(310, 170)
        .preferred_mode(1920, 1080, 60.0)
        .mode(1280, 720, 60.0)
        .backlight(0, 255, 128)
        .active_mode(1920, 1080, 60.0)
        .active_at(0, 0);
    backend
        .add_output("DP-1")
        .identity("DEL", "DELL U2720Q", "F8KXM13")
        .physical_size(600, 340)
        .preferred_mode(3840, 2160, 60.0)
        .mode(2560, 1440, 60.0)
        .mode(1920, 1080, 60.0);
    backend
}

fn dump<B: gf_display::DisplayBackend>(
    step: &str,
    manager: &mut MonitorManager<B>,
) -> anyhow::Result<()> {
    for event in manager.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    info!("{step}");
    println!("{}", serde_json::to_string_pretty(&manager.state())?);
    Ok(())
}

fn run(settings: ManagerSettings, serve: bool) -> anyhow::Result<()> {
    let mut manager = MonitorManager::new(demo_backend(), settings)?;

    #[cfg(feature = "dbus")]
    let publisher = gf_display::dbus::StatePublisher::new(manager.state());
    #[cfg(feature = "dbus")]
    let dbus = serve.then(|| gf_display::dbus::DBusServers::start(&publisher));
    #[cfg(not(feature = "dbus"))]
    let _ = serve;

    let step = |name: &str, manager: &mut MonitorManager<HeadlessBackend>| {
        dump(name, manager)?;
        #[cfg(feature = "dbus")]
        publisher.publish(manager.state());
        anyhow::Ok(())
    };

    manager.on_hotplug()?;
    step("hotplug", &mut manager)?;

    manager.on_lid_closed_changed(true);
    step("lid closed", &mut manager)?;

    manager.on_lid_closed_changed(false);
    step("lid opened", &mut manager)?;

    manager.make_persistent();
    manager.wait_save();
    step("saved", &mut manager)?;

    #[cfg(feature = "dbus")]
    if let Some(_dbus) = dbus {
        info!("Serving the last state on D-Bus, interrupt to exit");
        loop {
            std::thread::park();
        }
    }

    Ok(())
}

fn usage() -> ! {
    eprintln!("Usage: gf-display [--serve] [SETTINGS.json]");
    eprintln!();
    eprintln!("Without a settings file nothing is loaded or saved.");
    eprintln!("--serve exports the state on D-Bus (dbus feature only).");
    std::process::exit(1);
}

fn main() {
    init_logging();

    let mut serve = false;
    let mut settings_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--serve" => serve = true,
            "-h" | "--help" => usage(),
            _ if settings_path.is_some() || arg.starts_with('-') => usage(),
            _ => settings_path = Some(arg.clone()),
        }
    }
    if serve && !cfg!(feature = "dbus") {
        error!("--serve needs the dbus feature");
        std::process::exit(1);
    }

    let settings = match &settings_path {
        Some(path) => match load_settings(Path::new(path)) {
            Ok(settings) => settings,
            Err(err) => {
                error!("{err:?}");
                std::process::exit(1);
            }
        },
        None => ManagerSettings {
            persist_path: None,
            system_paths: Vec::new(),
            ..ManagerSettings::default()
        },
    };

    if let Err(err) = run(settings, serve) {
        error!("Fatal error: {err:?}");
        std::process::exit(1);
    }
}
