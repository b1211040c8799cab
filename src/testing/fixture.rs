//! Test fixture for integration testing
//!
//! The Fixture describes virtual hardware on a [`HeadlessBackend`] and hands
//! out either a plain [`Hardware`] enumeration or a [`MonitorManager`]
//! driving the backend.

use std::path::PathBuf;

use tracing::info;

use crate::backend::{HeadlessBackend, VirtualOutput};
use crate::hardware::Hardware;
use crate::manager::{ManagerSettings, MonitorManager};

/// Test fixture for integration testing
///
/// ```ignore
/// let mut fixture = Fixture::new();
/// fixture.output("eDP-1").preferred_mode(1920, 1080, 60.0).active_at(0, 0);
/// let hw = fixture.build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct Fixture {
    backend: HeadlessBackend,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or add) the virtual output called `name`.
    pub fn output(&mut self, name: &str) -> &mut VirtualOutput {
        self.backend.add_output(name)
    }

    /// Limit the number of CRTCs; by default there is one per output.
    pub fn crtcs(&mut self, count: usize) -> &mut Self {
        self.backend.crtc_count = Some(count);
        self
    }

    /// Restrict the transforms every CRTC supports.
    pub fn crtc_transforms(&mut self, mask: u32) -> &mut Self {
        self.backend.crtc_transforms = mask;
        self
    }

    pub fn screen_limits(&mut self, width: i32, height: i32) -> &mut Self {
        self.backend.screen_limits = (width, height);
        self
    }

    pub fn backend(&self) -> &HeadlessBackend {
        &self.backend
    }

    pub fn build(&self) -> Hardware {
        self.backend.hardware()
    }

    pub fn into_backend(self) -> HeadlessBackend {
        self.backend
    }

    /// A manager over this hardware with no persisted configurations and
    /// saves disabled.
    pub fn manager(self) -> MonitorManager<HeadlessBackend> {
        self.manager_with(ManagerSettings {
            persist_path: None,
            system_paths: Vec::new(),
            ..ManagerSettings::default()
        })
    }

    /// A manager loading from and saving to `path` only.
    pub fn manager_persisting_to(self, path: PathBuf) -> MonitorManager<HeadlessBackend> {
        self.manager_with(ManagerSettings {
            persist_path: Some(path),
            system_paths: Vec::new(),
            ..ManagerSettings::default()
        })
    }

    /// # Panics
    /// Panics if the manager cannot read the virtual hardware.
    pub fn manager_with(self, settings: ManagerSettings) -> MonitorManager<HeadlessBackend> {
        info!(
            "Test fixture with {} virtual outputs",
            self.backend.outputs.len()
        );
        match MonitorManager::new(self.backend, settings) {
            Ok(manager) => manager,
            Err(err) => panic!("creating monitor manager: {:?}", err),
        }
    }
}
