use super::{CrtcId, CrtcModeId, OutputId};

/// One display adapter and the entities it enumerated.
#[derive(Clone, Debug)]
pub struct Gpu {
    /// Opaque backend handle (screen number, device node id, ...).
    pub handle: u64,
    pub outputs: Vec<OutputId>,
    pub crtcs: Vec<CrtcId>,
    pub modes: Vec<CrtcModeId>,
}

impl Gpu {
    pub(super) fn new(handle: u64) -> Self {
        Self {
            handle,
            outputs: Vec::new(),
            crtcs: Vec::new(),
            modes: Vec::new(),
        }
    }
}
