//! SED1376 LCD/PIP display controller: memory-mapped register file, palette LUTs, and the
//! frame renderer that materializes a 160x160 RGB565 framebuffer.

mod lut;
mod registers;
mod sed1376;
mod snapshot;

pub use lut::encode_rgb565_from_sed666;
pub use registers::*;
pub use sed1376::Sed1376;
