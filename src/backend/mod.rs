//! Backend abstraction layer
//!
//! The display backend is whatever actually talks to the display server: it
//! enumerates GPUs, CRTCs, outputs and modes, programs CRTC assignments and
//! sets backlight levels. Hotplug and lid events are not pulled through this
//! trait; the embedding shell forwards them to
//! [`MonitorManager`](crate::manager::MonitorManager) itself.
//!
//! - **Headless backend** (`headless`): For testing without a display
//!   server. Virtual outputs live in memory and applied assignments are
//!   reflected in the next enumeration.
//!
//! # Design Invariants
//!
//! 1. **Fresh enumerations**: `read_current` returns a new [`Hardware`]
//!    arena every time. Ids from a previous enumeration must not be used
//!    with it.
//!
//! 2. **All or nothing**: `apply_configuration` either programs the whole
//!    assignment or returns an error; CRTCs missing from the assignment are
//!    disabled.

pub mod headless;

pub use headless::{HeadlessBackend, VirtualOutput};

use crate::assign::CrtcAssignment;
use crate::hardware::Hardware;

pub trait DisplayBackend {
    /// Enumerate the current hardware state.
    fn read_current(&mut self) -> anyhow::Result<Hardware>;

    /// Maximum screen width and height the display server accepts.
    fn screen_limits(&self) -> (i32, i32);

    /// Program `assignment`, computed against `hw`.
    fn apply_configuration(&mut self, hw: &Hardware, assignment: &CrtcAssignment)
        -> anyhow::Result<()>;

    /// Set the backlight of the output with backend id `output_id`.
    fn set_backlight(&mut self, output_id: u64, value: i32) -> anyhow::Result<()>;
}
