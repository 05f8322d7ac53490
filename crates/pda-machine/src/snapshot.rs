/// Per-device save-state blobs, kept apart rather than concatenated into one stream (SPEC_FULL.md
/// §4.4: the container format bundling these together is explicitly out of scope for this crate).
///
/// Only `Sed1376` has protocol state worth snapshotting here: `CpuCop` owns nothing but its
/// construction-time config, and `SDCard` does not implement `IoSnapshot` at all (see
/// DESIGN.md) — its backing flash image is the caller's to persist, the same way the original
/// treats `flashChipData` as externally owned.
#[derive(Debug, Clone, Default)]
pub struct MachineSnapshot {
    pub display: Vec<u8>,
}
