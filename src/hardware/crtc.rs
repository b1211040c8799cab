//! CRTCs: the scanout engines that drive outputs.

use super::{CrtcModeId, GpuId};
use crate::rect::Rectangle;
use crate::transform::{MonitorTransform, ALL_TRANSFORMS_MASK};

/// What a CRTC is currently driving.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrtcConfig {
    pub layout: Rectangle,
    pub mode: CrtcModeId,
    pub transform: MonitorTransform,
}

#[derive(Clone, Debug)]
pub struct Crtc {
    /// Backend CRTC id (the RandR CRTC XID).
    pub id: u64,
    pub gpu: GpuId,
    /// Transforms this CRTC can apply, one bit per `MonitorTransform::to_int()`.
    pub all_transforms: u32,
    /// `None` when the CRTC is disabled.
    pub(super) config: Option<CrtcConfig>,
}

impl Crtc {
    pub fn config(&self) -> Option<&CrtcConfig> {
        self.config.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub fn supports_transform(&self, transform: MonitorTransform) -> bool {
        self.all_transforms & transform.mask_bit() != 0
    }
}

/// Backend-provided description of a CRTC before it enters the arena.
#[derive(Clone, Debug)]
pub struct CrtcDescriptor {
    pub id: u64,
    pub all_transforms: u32,
    pub config: Option<CrtcConfig>,
}

impl CrtcDescriptor {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            all_transforms: ALL_TRANSFORMS_MASK,
            config: None,
        }
    }

    pub fn with_transforms(mut self, all_transforms: u32) -> Self {
        self.all_transforms = all_transforms;
        self
    }

    pub fn with_config(mut self, config: CrtcConfig) -> Self {
        self.config = Some(config);
        self
    }
}
