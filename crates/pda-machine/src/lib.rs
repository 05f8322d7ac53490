//! Thin top-level aggregator: owns one `CpuCop`, one optional `SDCard`, and one `Sed1376`, and
//! exposes the handful of cross-device operations a host integration needs. Contains no device
//! protocol logic of its own — it is ambient scaffolding, not a fourth device model.

mod config;
mod machine;
mod snapshot;

pub use config::MachineConfig;
pub use machine::Machine;
pub use snapshot::MachineSnapshot;
