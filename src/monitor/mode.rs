use serde::Serialize;

use crate::hardware::{CrtcMode, CrtcModeFlags, CrtcModeId, OutputId};

/// The user-visible part of a monitor mode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MonitorModeSpec {
    pub width: i32,
    pub height: i32,
    pub refresh_rate: f32,
    #[serde(skip)]
    pub flags: CrtcModeFlags,
}

impl MonitorModeSpec {
    pub fn from_crtc_mode(mode: &CrtcMode, swap: bool) -> Self {
        let (width, height) = if swap {
            (mode.height, mode.width)
        } else {
            (mode.width, mode.height)
        };
        Self {
            width,
            height,
            refresh_rate: mode.refresh_rate,
            flags: mode.flags.handled(),
        }
    }

    /// Stable identifier, e.g. `1920x1080@60.000` or `1920x1080i@59.940`.
    pub fn generate_id(&self) -> String {
        let interlaced = if self.flags.contains(CrtcModeFlags::INTERLACE) {
            "i"
        } else {
            ""
        };
        format!(
            "{}x{}{}@{:.3}",
            self.width, self.height, interlaced, self.refresh_rate
        )
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

/// The CRTC mode one output runs under a monitor mode. `None` disables the
/// output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorCrtcMode {
    pub output: OutputId,
    pub crtc_mode: Option<CrtcModeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonitorMode {
    pub id: String,
    pub spec: MonitorModeSpec,
    pub crtc_modes: Vec<MonitorCrtcMode>,
    /// Set for composite modes that drive every tile of a tiled monitor.
    pub is_tiled: bool,
}

impl MonitorMode {
    pub fn new(spec: MonitorModeSpec, crtc_modes: Vec<MonitorCrtcMode>, is_tiled: bool) -> Self {
        Self {
            id: spec.generate_id(),
            spec,
            crtc_modes,
            is_tiled,
        }
    }

    pub fn crtc_mode_for(&self, output: OutputId) -> Option<CrtcModeId> {
        self.crtc_modes
            .iter()
            .find(|m| m.output == output)
            .and_then(|m| m.crtc_mode)
    }
}
