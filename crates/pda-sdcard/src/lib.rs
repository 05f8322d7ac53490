//! Bit-serial SPI-mode SD card emulation: command framing, CRC7/CRC16 checking, and the
//! single/multi-block read and write state machines.
//!
//! The card's own protocol state (shift registers, FIFO, in-flight multi-block cursor) has no
//! save-state contract of its own — only the backing flash image persists across a run, the
//! same way the original treats `flashChipData` as externally owned storage rather than part
//! of a per-device save-state blob. See DESIGN.md.

mod card;
mod constants;
mod crc;
mod fifo;
mod sd_info;

pub use card::SDCard;
pub use constants::BLOCK_SIZE;
pub use sd_info::SdInfo;
