/// Static physical attributes of an inserted card. Never mutated by `reset()` (reset only
/// touches the electronic/protocol state, not the card's own identity).
#[derive(Debug, Clone, Copy)]
pub struct SdInfo {
    pub manufacturer_id: u8,
    pub oem_id: [u8; 2],
    pub product_name: [u8; 5],
    pub product_revision: u8,
    pub serial_number: u32,
    pub manufacturing_year: u16,
    pub manufacturing_month: u8,
    /// The physical write-protect notch/switch on the card, not block-level write protection
    /// (the original leaves block-level write protection unimplemented; so do we, per spec).
    pub write_protect_switch: bool,
}

impl Default for SdInfo {
    fn default() -> Self {
        Self {
            manufacturer_id: 0x27,
            oem_id: *b"PD",
            product_name: *b"PALMD",
            product_revision: 0x10,
            serial_number: 0x0001_0203,
            manufacturing_year: 2008,
            manufacturing_month: 1,
            write_protect_switch: false,
        }
    }
}
