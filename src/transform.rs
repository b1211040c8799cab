//! Monitor transforms.
//!
//! The eight transforms form the dihedral group of the square. The numeric
//! encoding matches the X RandR / D-Bus convention: the low two bits are the
//! counter-clockwise rotation in quarter turns, the high bit means flipped.

use serde::{Serialize, Serializer};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MonitorTransform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

pub const ALL_TRANSFORMS: [MonitorTransform; 8] = [
    MonitorTransform::Normal,
    MonitorTransform::Rotate90,
    MonitorTransform::Rotate180,
    MonitorTransform::Rotate270,
    MonitorTransform::Flipped,
    MonitorTransform::Flipped90,
    MonitorTransform::Flipped180,
    MonitorTransform::Flipped270,
];

/// Bitmask with one bit per transform, indexed by `to_int()`.
pub const ALL_TRANSFORMS_MASK: u32 = 0xff;

const FLIPPED_BIT: u32 = 4;

impl MonitorTransform {
    /// 0=Normal, 1=90, 2=180, 3=270, 4=Flipped, 5=Flipped90, 6=Flipped180, 7=Flipped270.
    /// Values outside the range map to Normal.
    pub fn from_int(value: u32) -> Self {
        match value {
            1 => Self::Rotate90,
            2 => Self::Rotate180,
            3 => Self::Rotate270,
            4 => Self::Flipped,
            5 => Self::Flipped90,
            6 => Self::Flipped180,
            7 => Self::Flipped270,
            _ => Self::Normal,
        }
    }

    pub fn to_int(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Rotate90 => 1,
            Self::Rotate180 => 2,
            Self::Rotate270 => 3,
            Self::Flipped => 4,
            Self::Flipped90 => 5,
            Self::Flipped180 => 6,
            Self::Flipped270 => 7,
        }
    }

    /// Bit of this transform in a CRTC transform capability mask.
    pub fn mask_bit(self) -> u32 {
        1 << self.to_int()
    }

    /// True for 90° and 270° rotations, flipped or not: width and height swap.
    pub fn is_rotated(self) -> bool {
        self.to_int() % 2 == 1
    }

    pub fn is_flipped(self) -> bool {
        self.to_int() >= FLIPPED_BIT
    }

    /// Rotation component in quarter turns, ignoring the flip.
    pub fn rotation(self) -> u32 {
        self.to_int() % FLIPPED_BIT
    }

    pub fn invert(self) -> Self {
        match self {
            Self::Rotate90 => Self::Rotate270,
            Self::Rotate270 => Self::Rotate90,
            other => other,
        }
    }

    /// Apply `other` after `self`.
    ///
    /// A flip in `other` mirrors the rotation already applied by `self`.
    pub fn transform(self, other: Self) -> Self {
        let rotation = if other.is_flipped() {
            (FLIPPED_BIT - self.rotation()) % FLIPPED_BIT
        } else {
            self.rotation()
        };
        Self::from_rotation_and_flip(
            rotation + other.rotation(),
            self.is_flipped() != other.is_flipped(),
        )
    }

    pub fn from_rotation_and_flip(rotation: u32, flipped: bool) -> Self {
        let flip = if flipped { FLIPPED_BIT } else { 0 };
        Self::from_int(rotation % FLIPPED_BIT + flip)
    }
}

impl Serialize for MonitorTransform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.to_int())
    }
}
