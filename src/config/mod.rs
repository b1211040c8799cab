//! Persisted monitor configurations.
//!
//! A [`Configuration`] maps an ordered set of output identities
//! ([`OutputKey`]) to what the user wants each of them to do
//! ([`OutputConfig`]). Configurations are looked up by their key sequence
//! only; two configurations for the same outputs in the same order collide
//! in the store regardless of their settings.

pub mod persist;
mod store;
pub mod xml;

pub use store::ConfigStore;
pub use xml::ParseError;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::hardware::{Hardware, Output};
use crate::rect::Rectangle;
use crate::transform::MonitorTransform;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct OutputKey {
    pub connector: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

impl OutputKey {
    pub fn from_output(output: &Output) -> Self {
        Self {
            connector: output.name.clone(),
            vendor: output.vendor.clone(),
            product: output.product.clone(),
            serial: output.serial.clone(),
        }
    }

    fn stable_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OutputConfig {
    pub enabled: bool,
    pub rect: Rectangle,
    pub refresh_rate: f32,
    pub transform: MonitorTransform,
    pub is_primary: bool,
    pub is_presentation: bool,
    pub is_underscanning: bool,
}

impl OutputConfig {
    pub fn enabled(rect: Rectangle, refresh_rate: f32) -> Self {
        Self {
            enabled: true,
            rect,
            refresh_rate,
            ..Self::default()
        }
    }

    /// Reset to the canonical disabled state.
    pub fn disable(&mut self) {
        *self = Self::default();
    }

    fn normalized(mut self) -> Self {
        if !self.enabled {
            self.disable();
        }
        self
    }
}

/// Store key: the ordered output identities of a configuration.
///
/// The hash is the XOR of the per-output hashes while equality compares
/// the sequences element by element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigKey(Vec<OutputKey>);

impl ConfigKey {
    pub fn new(keys: Vec<OutputKey>) -> Self {
        Self(keys)
    }

    pub fn from_hardware(hw: &Hardware) -> Self {
        Self(hw.outputs().iter().map(OutputKey::from_output).collect())
    }

    /// The key with output `skip` left out.
    pub fn without(&self, skip: usize) -> Self {
        Self(
            self.0
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, key)| key.clone())
                .collect(),
        )
    }

    pub fn keys(&self) -> &[OutputKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Hash for ConfigKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self.0.iter().fold(0u64, |acc, key| acc ^ key.stable_hash());
        state.write_u64(combined);
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Configuration {
    #[serde(serialize_with = "serialize_key")]
    key: ConfigKey,
    outputs: Vec<OutputConfig>,
}

fn serialize_key<S: serde::Serializer>(key: &ConfigKey, serializer: S) -> Result<S::Ok, S::Error> {
    key.0.serialize(serializer)
}

impl Configuration {
    /// # Panics
    /// Panics if `keys` and `outputs` differ in length.
    pub fn new(keys: Vec<OutputKey>, outputs: Vec<OutputConfig>) -> Self {
        assert_eq!(keys.len(), outputs.len(), "keys and configs must align");
        Self {
            key: ConfigKey(keys),
            outputs: outputs.into_iter().map(OutputConfig::normalized).collect(),
        }
    }

    /// Snapshot of what the hardware is currently doing.
    pub fn from_hardware(hw: &Hardware) -> Self {
        let outputs = hw
            .output_ids()
            .map(|id| {
                let output = hw.output(id);
                match hw.output_crtc_config(id) {
                    Some(crtc_config) => OutputConfig {
                        enabled: true,
                        rect: crtc_config.layout,
                        refresh_rate: hw.mode(crtc_config.mode).refresh_rate,
                        transform: output.crtc_to_logical_transform(crtc_config.transform),
                        is_primary: output.is_primary,
                        is_presentation: output.is_presentation,
                        is_underscanning: output.is_underscanning,
                    },
                    None => OutputConfig::default(),
                }
            })
            .collect();
        Self::new(ConfigKey::from_hardware(hw).0, outputs)
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub fn keys(&self) -> &[OutputKey] {
        &self.key.0
    }

    pub fn outputs(&self) -> &[OutputConfig] {
        &self.outputs
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutputKey, &OutputConfig)> {
        self.key.0.iter().zip(&self.outputs)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn n_enabled(&self) -> usize {
        self.outputs.iter().filter(|o| o.enabled).count()
    }

    /// Same outputs in the same order.
    pub fn equal(&self, other: &Self) -> bool {
        self.key == other.key
    }

    /// Same outputs with the same settings.
    pub fn equal_full(&self, other: &Self) -> bool {
        self.equal(other) && self.outputs == other.outputs
    }
}
