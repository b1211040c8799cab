//! Laptop lid policy.
//!
//! With the lid closed the built-in panel is turned off as long as some
//! other output stays on. The resulting configuration is derived on the fly
//! and never stored.

use tracing::debug;

use crate::config::{Configuration, OutputConfig};

const LAPTOP_CONNECTOR_PREFIXES: &[&str] = &["LVDS", "Lvds", "lvds", "eDP", "DSI"];

/// True for connector names of built-in panels.
pub fn is_laptop_connector(connector: &str) -> bool {
    LAPTOP_CONNECTOR_PREFIXES
        .iter()
        .any(|prefix| connector.starts_with(prefix))
}

/// True if `config` keeps a laptop panel on alongside at least one other
/// output, i.e. closing the lid should change something.
pub fn laptop_display_is_on(config: &Configuration) -> bool {
    config.n_enabled() > 1
        && config
            .iter()
            .any(|(key, output)| output.enabled && is_laptop_connector(&key.connector))
}

/// `config` with the first enabled laptop panel turned off and the outputs
/// beyond it moved in to close the gap. Returns `None` if closing the lid
/// changes nothing.
pub fn make_lid_config(config: &Configuration) -> Option<Configuration> {
    if !laptop_display_is_on(config) {
        return None;
    }

    let mut outputs: Vec<OutputConfig> = config.outputs().to_vec();
    let panel = config
        .iter()
        .position(|(key, output)| output.enabled && is_laptop_connector(&key.connector))?;
    let vacated = outputs[panel].rect;
    outputs[panel].disable();

    for output in outputs.iter_mut().filter(|o| o.enabled) {
        if output.rect.x > vacated.x {
            output.rect.x -= vacated.width;
        }
        if output.rect.y > vacated.y {
            output.rect.y -= vacated.height;
        }
    }

    if !outputs.iter().any(|o| o.is_primary) {
        if let Some(first) = outputs.iter_mut().find(|o| o.enabled) {
            first.is_primary = true;
        }
    }

    debug!(
        "Lid configuration: {} disabled, {} outputs left on",
        config.keys()[panel].connector,
        outputs.iter().filter(|o| o.enabled).count()
    );
    Some(Configuration::new(config.keys().to_vec(), outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputKey;
    use crate::rect::Rectangle;

    fn key(connector: &str) -> OutputKey {
        OutputKey {
            connector: connector.to_string(),
            vendor: "AUO".to_string(),
            product: "0x123d".to_string(),
            serial: "0x00000000".to_string(),
        }
    }

    fn laptop_and_external() -> Configuration {
        let mut panel = OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0);
        panel.is_primary = true;
        Configuration::new(
            vec![key("eDP-1"), key("DP-1"), key("HDMI-1")],
            vec![
                panel,
                OutputConfig::enabled(Rectangle::new(1920, 0, 2560, 1440), 60.0),
                OutputConfig::default(),
            ],
        )
    }

    #[test]
    fn test_laptop_connectors() {
        for name in ["LVDS1", "lvds-0", "eDP-1", "DSI-1"] {
            assert!(is_laptop_connector(name), "{}", name);
        }
        for name in ["DP-1", "HDMI-A-1", "VGA-1", "edp"] {
            assert!(!is_laptop_connector(name), "{}", name);
        }
    }

    #[test]
    fn test_panel_disabled_and_gap_closed() {
        let lid = make_lid_config(&laptop_and_external()).unwrap();
        assert!(!lid.outputs()[0].enabled);
        assert_eq!(lid.outputs()[1].rect, Rectangle::new(0, 0, 2560, 1440));
        assert!(lid.outputs()[1].is_primary);
        assert!(!lid.outputs()[2].enabled);
        assert!(lid.equal(&laptop_and_external()));
    }

    #[test]
    fn test_existing_primary_is_kept() {
        let config = laptop_and_external();
        let mut outputs = config.outputs().to_vec();
        outputs[0].is_primary = false;
        outputs[2] = OutputConfig::enabled(Rectangle::new(0, 1080, 1920, 1080), 60.0);
        outputs[2].is_primary = true;
        let config = Configuration::new(config.keys().to_vec(), outputs);

        let lid = make_lid_config(&config).unwrap();
        assert!(!lid.outputs()[1].is_primary);
        assert!(lid.outputs()[2].is_primary);
        assert_eq!(lid.outputs()[2].rect, Rectangle::new(0, 0, 1920, 1080));
    }

    #[test]
    fn test_nothing_to_do() {
        let config = Configuration::new(
            vec![key("eDP-1"), key("DP-1")],
            vec![
                OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0),
                OutputConfig::default(),
            ],
        );
        assert!(make_lid_config(&config).is_none());

        let config = Configuration::new(
            vec![key("DP-2"), key("DP-1")],
            vec![
                OutputConfig::enabled(Rectangle::new(0, 0, 1920, 1080), 60.0),
                OutputConfig::enabled(Rectangle::new(1920, 0, 1920, 1080), 60.0),
            ],
        );
        assert!(make_lid_config(&config).is_none());
    }
}
