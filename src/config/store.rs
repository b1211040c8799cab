use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::{ConfigKey, Configuration};

/// Stored configurations plus the `current`/`previous` pair used for
/// rollback.
#[derive(Debug, Default)]
pub struct ConfigStore {
    configs: IndexMap<ConfigKey, Rc<Configuration>>,
    current: Option<Rc<Configuration>>,
    previous: Option<Rc<Configuration>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = Configuration>) -> Self {
        let mut store = Self::new();
        for config in configs {
            store.insert(Rc::new(config));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Configuration>> {
        self.configs.values()
    }

    pub fn lookup(&self, key: &ConfigKey) -> Option<Rc<Configuration>> {
        self.configs.get(key).cloned()
    }

    /// Insert `config`, replacing a stored configuration for the same
    /// outputs. The replaced entry keeps its position.
    pub fn insert(&mut self, config: Rc<Configuration>) {
        self.configs.insert(config.key().clone(), config);
    }

    pub fn current(&self) -> Option<&Rc<Configuration>> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Rc<Configuration>> {
        self.previous.as_ref()
    }

    /// Make `config` current. Returns false, leaving `previous` alone, when
    /// it is fully equal to the current configuration.
    pub fn update_current(&mut self, config: Rc<Configuration>) -> bool {
        if let Some(current) = &self.current {
            if current.equal_full(&config) {
                return false;
            }
        }
        debug!("Current configuration changed ({} outputs)", config.len());
        self.previous = self.current.replace(config);
        true
    }

    pub fn take_previous(&mut self) -> Option<Rc<Configuration>> {
        self.previous.take()
    }

    pub fn clear_previous(&mut self) {
        self.previous = None;
    }
}
