//! CRTC modes (timings) as enumerated by the display server.

use std::fmt;

/// X RandR mode flag bits.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct CrtcModeFlags(u32);

impl CrtcModeFlags {
    pub const NONE: Self = Self(0);
    pub const PHSYNC: Self = Self(1 << 0);
    pub const NHSYNC: Self = Self(1 << 1);
    pub const PVSYNC: Self = Self(1 << 2);
    pub const NVSYNC: Self = Self(1 << 3);
    pub const INTERLACE: Self = Self(1 << 4);
    pub const DBLSCAN: Self = Self(1 << 5);
    pub const CSYNC: Self = Self(1 << 6);
    pub const PCSYNC: Self = Self(1 << 7);
    pub const NCSYNC: Self = Self(1 << 8);
    pub const HSKEW: Self = Self(1 << 9);
    pub const BCAST: Self = Self(1 << 10);
    pub const PIXMUX: Self = Self(1 << 11);
    pub const DBLCLK: Self = Self(1 << 12);
    pub const CLKDIV2: Self = Self(1 << 13);

    /// Flags that distinguish monitor modes from each other.
    pub const HANDLED: Self = Self::INTERLACE;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn handled(self) -> Self {
        self.intersection(Self::HANDLED)
    }
}

impl fmt::Debug for CrtcModeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CrtcModeFlags({:#x})", self.0)
    }
}

/// A timing a CRTC can run at.
#[derive(Clone, Debug, PartialEq)]
pub struct CrtcMode {
    /// Backend mode id (the RandR mode XID).
    pub id: u64,
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub refresh_rate: f32,
    pub flags: CrtcModeFlags,
}

impl CrtcMode {
    pub fn new(id: u64, width: i32, height: i32, refresh_rate: f32) -> Self {
        Self {
            id,
            name: format!("{}x{}", width, height),
            width,
            height,
            refresh_rate,
            flags: CrtcModeFlags::NONE,
        }
    }

    pub fn with_flags(mut self, flags: CrtcModeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_interlaced(&self) -> bool {
        self.flags.contains(CrtcModeFlags::INTERLACE)
    }
}
