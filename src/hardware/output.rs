//! Outputs (physical connectors) and their static properties.

use serde::Serialize;

use super::{CrtcId, CrtcModeId, GpuId, OutputId};
use crate::edid::EdidIdentity;
use crate::transform::MonitorTransform;

/// Connector types, following the DRM/RandR vocabulary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectorType {
    #[default]
    Unknown,
    Vga,
    DviI,
    DviD,
    DviA,
    Composite,
    SVideo,
    Lvds,
    Component,
    NinePinDin,
    DisplayPort,
    HdmiA,
    HdmiB,
    Tv,
    Edp,
    Virtual,
    Dsi,
    Dpi,
    Writeback,
    Spi,
}

impl ConnectorType {
    /// Map a RandR `ConnectorType` output property value.
    pub fn from_property(value: &str) -> Self {
        match value {
            "HDMI" => Self::HdmiA,
            "VGA" => Self::Vga,
            // No DRM equivalent, but it means an internal panel.
            "Panel" => Self::Lvds,
            "DVI" | "DVI-I" => Self::DviI,
            "DVI-A" => Self::DviA,
            "DVI-D" => Self::DviD,
            "DisplayPort" => Self::DisplayPort,
            "TV" | "TV-SCART" | "TV-C4" => Self::Tv,
            "TV-Composite" => Self::Composite,
            "TV-SVideo" => Self::SVideo,
            "TV-Component" => Self::Component,
            _ => Self::Unknown,
        }
    }

    /// Guess the connector type from the output name when the driver does
    /// not expose the property.
    pub fn from_output_name(name: &str) -> Self {
        const PREFIXES: &[(&str, ConnectorType)] = &[
            ("HDMI", ConnectorType::HdmiA),
            ("DVI", ConnectorType::DviI),
            ("VGA", ConnectorType::Vga),
            ("LVDS", ConnectorType::Lvds),
            ("eDP", ConnectorType::Edp),
            ("DP", ConnectorType::DisplayPort),
            ("DisplayPort", ConnectorType::DisplayPort),
            ("Virtual", ConnectorType::Virtual),
            ("Composite", ConnectorType::Composite),
            ("S-video", ConnectorType::SVideo),
            ("TV", ConnectorType::Tv),
            ("CTV", ConnectorType::Composite),
            ("DSI", ConnectorType::Dsi),
            ("DIN", ConnectorType::NinePinDin),
        ];
        PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, ty)| *ty)
            .unwrap_or_default()
    }

    pub fn is_laptop(self) -> bool {
        matches!(self, Self::Lvds | Self::Edp | Self::Dsi)
    }

    pub fn is_hdmi(self) -> bool {
        matches!(self, Self::HdmiA | Self::HdmiB)
    }
}

/// DisplayID tiling information. A zero `group_id` means "not tiled".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TileInfo {
    pub group_id: u32,
    pub flags: u32,
    pub max_h_tiles: u32,
    pub max_v_tiles: u32,
    pub loc_h_tile: u32,
    pub loc_v_tile: u32,
    pub tile_w: u32,
    pub tile_h: u32,
}

impl TileInfo {
    pub fn is_tiled(&self) -> bool {
        self.group_id != 0
    }

    pub fn is_origin(&self) -> bool {
        self.loc_h_tile == 0 && self.loc_v_tile == 0
    }
}

/// Raw backlight range and value as reported by the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Backlight {
    pub min: i32,
    pub max: i32,
    pub value: i32,
}

impl Backlight {
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

/// vendor/product/serial triple identifying a physical monitor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputIdentity {
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

pub const UNKNOWN: &str = "unknown";

impl Default for OutputIdentity {
    fn default() -> Self {
        Self {
            vendor: UNKNOWN.to_string(),
            product: UNKNOWN.to_string(),
            serial: UNKNOWN.to_string(),
        }
    }
}

impl OutputIdentity {
    /// Derive the identity from a raw EDID blob. Missing or broken EDID data
    /// yields `"unknown"` fields.
    pub fn from_edid(edid: Option<&[u8]>) -> Self {
        let Some(data) = edid.filter(|d| !d.is_empty()) else {
            return Self::default();
        };
        match crate::edid::parse_identity(data) {
            Ok(identity) => Self::from(&identity),
            Err(err) => {
                tracing::debug!("Ignoring EDID: {}", err);
                Self::default()
            }
        }
    }
}

impl From<&EdidIdentity> for OutputIdentity {
    fn from(edid: &EdidIdentity) -> Self {
        let vendor = edid
            .manufacturer_code
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let product = edid
            .product_name
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| format!("0x{:04x}", edid.product_code));
        let serial = edid
            .serial_string
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("0x{:08x}", edid.serial_number));
        Self {
            vendor,
            product,
            serial,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Output {
    /// Backend output id (the RandR output XID), also the winsys id.
    pub id: u64,
    pub gpu: GpuId,
    pub name: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
    pub width_mm: i32,
    pub height_mm: i32,
    pub connector_type: ConnectorType,
    pub panel_orientation_transform: MonitorTransform,
    pub modes: Vec<CrtcModeId>,
    pub preferred_mode: CrtcModeId,
    pub possible_crtcs: Vec<CrtcId>,
    pub possible_clones: Vec<OutputId>,
    pub tile_info: TileInfo,
    pub backlight: Option<Backlight>,
    pub suggested_x: i32,
    pub suggested_y: i32,
    pub hotplug_mode_update: bool,
    pub supports_underscanning: bool,

    pub(super) crtc: Option<CrtcId>,
    pub is_primary: bool,
    pub is_presentation: bool,
    pub is_underscanning: bool,
}

impl Output {
    pub fn crtc(&self) -> Option<CrtcId> {
        self.crtc
    }

    pub fn is_laptop(&self) -> bool {
        self.connector_type.is_laptop()
    }

    pub fn supports_mode(&self, mode: CrtcModeId) -> bool {
        self.modes.contains(&mode)
    }

    pub fn can_be_driven_by(&self, crtc: CrtcId) -> bool {
        self.possible_crtcs.contains(&crtc)
    }

    pub fn can_clone(&self, other: OutputId) -> bool {
        self.possible_clones.contains(&other)
    }

    /// Suggested hotplug position, if the driver reports one.
    pub fn suggested_position(&self) -> Option<(i32, i32)> {
        (self.suggested_x >= 0 && self.suggested_y >= 0)
            .then_some((self.suggested_x, self.suggested_y))
    }

    pub fn logical_to_crtc_transform(&self, transform: MonitorTransform) -> MonitorTransform {
        transform.transform(self.panel_orientation_transform)
    }

    pub fn crtc_to_logical_transform(&self, transform: MonitorTransform) -> MonitorTransform {
        transform.transform(self.panel_orientation_transform.invert())
    }
}

/// Backend-provided description of an output before it enters the arena.
///
/// Clones are given as backend output ids and resolved once every output of
/// the enumeration is known.
#[derive(Clone, Debug)]
pub struct OutputDescriptor {
    pub id: u64,
    pub name: String,
    pub identity: OutputIdentity,
    pub width_mm: i32,
    pub height_mm: i32,
    pub connector_type: Option<ConnectorType>,
    pub panel_orientation_transform: MonitorTransform,
    pub modes: Vec<CrtcModeId>,
    pub preferred_mode: Option<CrtcModeId>,
    pub possible_crtcs: Vec<CrtcId>,
    pub possible_clones: Vec<u64>,
    pub tile_info: TileInfo,
    pub backlight: Option<Backlight>,
    pub suggested_position: Option<(i32, i32)>,
    pub hotplug_mode_update: bool,
    pub supports_underscanning: bool,
    pub crtc: Option<CrtcId>,
    pub is_primary: bool,
    pub is_presentation: bool,
    pub is_underscanning: bool,
}

impl OutputDescriptor {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            identity: OutputIdentity::default(),
            width_mm: 0,
            height_mm: 0,
            connector_type: None,
            panel_orientation_transform: MonitorTransform::Normal,
            modes: Vec::new(),
            preferred_mode: None,
            possible_crtcs: Vec::new(),
            possible_clones: Vec::new(),
            tile_info: TileInfo::default(),
            backlight: None,
            suggested_position: None,
            hotplug_mode_update: false,
            supports_underscanning: false,
            crtc: None,
            is_primary: false,
            is_presentation: false,
            is_underscanning: false,
        }
    }
}
