use serde::{Deserialize, Serialize};

/// Tuning for zombie-slot resurrection during frame simulation.
///
/// Thresholds are inclusive upper bounds; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalsSettings {
    /// Resurrect trimmed slots that a frame explicitly marks as `top`.
    pub bogus_top: bool,
    /// Resurrect zombies inside the frame exposed by a load.
    pub exposed_on_load: bool,
    /// Resurrect zombies inside the frame exposed by a store.
    pub exposed_on_store: bool,
    pub chopped_insn_threshold: Option<u32>,
    pub chopped_frame_threshold: Option<u32>,
    pub trimmed_insn_threshold: Option<u32>,
    pub trimmed_frame_threshold: Option<u32>,
}

impl LocalsSettings {
    pub const DEFAULT: LocalsSettings = LocalsSettings {
        bogus_top: true,
        exposed_on_load: true,
        exposed_on_store: true,
        chopped_insn_threshold: None,
        chopped_frame_threshold: Some(1),
        trimmed_insn_threshold: None,
        trimmed_frame_threshold: None,
    };

    /// No resurrection at all.
    pub const COMPATIBLE: LocalsSettings = LocalsSettings {
        bogus_top: false,
        exposed_on_load: false,
        exposed_on_store: false,
        chopped_insn_threshold: None,
        chopped_frame_threshold: None,
        trimmed_insn_threshold: None,
        trimmed_frame_threshold: None,
    };
}

impl Default for LocalsSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}
