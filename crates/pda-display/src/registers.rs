//! SED1376 register plane: a sparse 0xB4-byte map. Addresses and masks below follow the
//! abridged register table; every address not named here is treated as a generic byte with no
//! write mask and no side effect.

pub const REGISTER_COUNT: usize = 0xB4;

pub const REV_CODE: usize = 0x00;
pub const DISP_BUFF_SIZE: usize = 0x04;
pub const DISP_MODE: usize = 0x08;
pub const PANEL_TYPE: usize = 0x09;
pub const MOD_RATE: usize = 0x0A;
pub const SPECIAL_EFFECT: usize = 0x0B;
pub const PWM_CONTROL: usize = 0x0C;
pub const PWR_SAVE_CFG: usize = 0x0D;

pub const DISP_ADDR_0: usize = 0x10;
pub const DISP_ADDR_1: usize = 0x11;
pub const DISP_ADDR_2: usize = 0x12;
pub const PIP_ADDR_0: usize = 0x14;
pub const PIP_ADDR_1: usize = 0x15;
pub const PIP_ADDR_2: usize = 0x16;

pub const LINE_SIZE_0: usize = 0x18;
pub const LINE_SIZE_1: usize = 0x19;
pub const PIP_LINE_SZ_0: usize = 0x1A;
pub const PIP_LINE_SZ_1: usize = 0x1B;

pub const PIP_X_START_0: usize = 0x1C;
pub const PIP_X_START_1: usize = 0x1D;
pub const PIP_X_END_0: usize = 0x1E;
pub const PIP_X_END_1: usize = 0x1F;
pub const PIP_Y_START_0: usize = 0x20;
pub const PIP_Y_START_1: usize = 0x21;
pub const PIP_Y_END_0: usize = 0x22;
pub const PIP_Y_END_1: usize = 0x23;

pub const LUT_B_WRITE: usize = 0x28;
pub const LUT_G_WRITE: usize = 0x29;
pub const LUT_R_WRITE: usize = 0x2A;
pub const LUT_WRITE_LOC: usize = 0x2B;
pub const LUT_B_READ: usize = 0x2C;
pub const LUT_G_READ: usize = 0x2D;
pub const LUT_R_READ: usize = 0x2E;
pub const LUT_READ_LOC: usize = 0x2F;

pub const GPIO_CONF_0: usize = 0x30;
pub const GPIO_CONT_0: usize = 0x31;
pub const GPIO_CONF_1: usize = 0x32;
pub const GPIO_CONT_1: usize = 0x33;

pub const MEM_CLK: usize = 0x38;
pub const PIXEL_CLK: usize = 0x39;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 160;
pub const RAM_TRUE_SIZE: usize = 0x14000;
pub const RAM_PADDED_SIZE: usize = 0x20000;

/// Write mask for a register address, or `None` for the unrestricted default (`0xFF`).
pub fn write_mask(addr: usize) -> u8 {
    match addr {
        DISP_MODE => 0xF7,
        PANEL_TYPE => 0xFB,
        MOD_RATE => 0x3F,
        SPECIAL_EFFECT => 0xD3,
        PWM_CONTROL => 0x9B,
        PWR_SAVE_CFG => 0x01,
        DISP_ADDR_2 => 0x01,
        PIP_ADDR_2 => 0x01,
        LINE_SIZE_1 => 0x03,
        PIP_LINE_SZ_1 => 0x03,
        PIP_X_START_1 | PIP_X_END_1 | PIP_Y_START_1 | PIP_Y_END_1 => 0x03,
        LUT_B_WRITE | LUT_G_WRITE | LUT_R_WRITE | LUT_B_READ | LUT_G_READ | LUT_R_READ => 0xFC,
        LUT_WRITE_LOC | LUT_READ_LOC => 0x00, // write-triggered, never holds a stored value
        GPIO_CONF_0 | GPIO_CONT_0 => 0x7F,
        GPIO_CONF_1 | GPIO_CONT_1 => 0x80,
        MEM_CLK => 0x30,
        PIXEL_CLK => 0x73,
        REV_CODE | DISP_BUFF_SIZE => 0x00, // read-only
        _ => 0xFF,
    }
}

/// Power-on reset value for a register address.
pub fn reset_value(addr: usize) -> u8 {
    match addr {
        REV_CODE => 0x28,
        DISP_BUFF_SIZE => 0x14,
        _ => 0x00,
    }
}
