use pda_sdcard::SdInfo;

/// Construction-time knobs for [`crate::Machine`]. Grouped here rather than threaded through
/// `Machine::new` as separate arguments, the same way the device crates favor small config
/// structs over global mutable state (SPEC_FULL.md §1.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineConfig {
    /// Identity fields reported by `SEND_CID`/`SEND_CSD` once a card is inserted. Only used
    /// when `insert_card` is called without an explicit `SdInfo` override.
    pub default_sd_info: SdInfo,
    /// The CP15 "clean DCache" over-flush needed to boot Linux guests; see `CpuCopConfig`.
    pub linux_support: bool,
}
