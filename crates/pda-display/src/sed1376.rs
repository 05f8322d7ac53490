use tracing::{debug, warn};

use crate::lut::encode_rgb565_from_sed666;
use crate::registers::*;

/// Memory-mapped SED1376 display/PIP controller: register file, palette LUTs, graphics RAM,
/// and the frame renderer that materializes the 160x160 RGB565 framebuffer on demand.
pub struct Sed1376 {
    pub(crate) registers: [u8; REGISTER_COUNT],
    pub(crate) r_lut: [u8; 256],
    pub(crate) g_lut: [u8; 256],
    pub(crate) b_lut: [u8; 256],
    output_lut: [u16; 256],
    pub(crate) ram: Vec<u8>,
    framebuffer: Vec<u16>,

    /// Driven by GPIO writes via `update_lcd_status`; not itself part of the register plane
    /// (the source keeps this in an external `palmMisc` observer struct).
    lcd_on: bool,
    pll_on: bool,
    backlight_level: u8,
}

impl Sed1376 {
    pub fn new() -> Self {
        let mut dev = Self {
            registers: [0; REGISTER_COUNT],
            r_lut: [0; 256],
            g_lut: [0; 256],
            b_lut: [0; 256],
            output_lut: [0; 256],
            ram: vec![0; RAM_PADDED_SIZE],
            framebuffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            lcd_on: true,
            pll_on: true,
            backlight_level: 2,
        };
        dev.reset();
        dev
    }

    pub fn reset(&mut self) {
        for addr in 0..REGISTER_COUNT {
            self.registers[addr] = reset_value(addr);
        }
        self.lcd_on = true;
        self.pll_on = true;
        self.backlight_level = 2;
        self.regenerate_output_lut();
    }

    pub fn framebuffer(&self) -> &[u16] {
        &self.framebuffer
    }

    pub fn output_lut(&self, index: u8) -> u16 {
        self.output_lut[index as usize]
    }

    pub fn set_pll_on(&mut self, on: bool) {
        self.pll_on = on;
    }

    /// Test/host hook mirroring the external `palmMisc.lcdOn` observer directly, for scenarios
    /// that need to force the LCD off without going through GPIO register bit-banging.
    pub fn set_lcd_on(&mut self, on: bool) {
        self.lcd_on = on;
    }

    pub fn read_register(&self, addr: usize) -> u8 {
        match addr {
            LUT_WRITE_LOC | LUT_READ_LOC | LUT_B_WRITE | LUT_G_WRITE | LUT_R_WRITE => 0,
            a if a < REGISTER_COUNT => self.registers[a],
            _ => {
                warn!(addr, "SED1376 register read out of range");
                0
            }
        }
    }

    pub fn write_register(&mut self, addr: usize, value: u8) {
        if addr >= REGISTER_COUNT {
            warn!(addr, value, "SED1376 register write out of range");
            return;
        }

        match addr {
            LUT_WRITE_LOC => {
                let i = value as usize;
                self.b_lut[i] = self.registers[LUT_B_WRITE] >> 2;
                self.g_lut[i] = self.registers[LUT_G_WRITE] >> 2;
                self.r_lut[i] = self.registers[LUT_R_WRITE] >> 2;
                self.output_lut[i] =
                    encode_rgb565_from_sed666(self.r_lut[i], self.g_lut[i], self.b_lut[i]);
            }
            LUT_READ_LOC => {
                let i = value as usize;
                self.registers[LUT_B_READ] = self.b_lut[i] << 2;
                self.registers[LUT_G_READ] = self.g_lut[i] << 2;
                self.registers[LUT_R_READ] = self.r_lut[i] << 2;
            }
            PWR_SAVE_CFG => {
                self.registers[addr] = (value & write_mask(addr)) | 0x80;
            }
            _ => {
                self.registers[addr] = value & write_mask(addr);
            }
        }

        if matches!(addr, GPIO_CONF_0 | GPIO_CONT_0 | GPIO_CONF_1 | GPIO_CONT_1) {
            self.update_lcd_status();
        }
    }

    /// Recomputes `lcd_on`/`backlight_level` from the GPIO register pair, mirroring how real
    /// firmware wires specific GPIO lines to the panel's power and backlight-PWM control.
    fn update_lcd_status(&mut self) {
        self.lcd_on = self.registers[GPIO_CONT_0] & 0x01 != 0;
        self.backlight_level = (self.registers[GPIO_CONT_0] >> 1) & 0x03;
        if self.backlight_level > 2 {
            self.backlight_level = 2;
        }
    }

    pub(crate) fn regenerate_output_lut(&mut self) {
        for i in 0..256 {
            self.output_lut[i] =
                encode_rgb565_from_sed666(self.r_lut[i], self.g_lut[i], self.b_lut[i]);
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    fn power_save(&self) -> bool {
        self.registers[PWR_SAVE_CFG] & 0x01 != 0
    }

    fn forced_blank(&self) -> bool {
        self.registers[DISP_MODE] & 0x80 != 0
    }

    pub fn render(&mut self) {
        if !self.lcd_on || !self.pll_on || self.power_save() || self.forced_blank() {
            self.framebuffer.fill(0);
            return;
        }

        let color = self.registers[PANEL_TYPE] & 0x40 != 0;
        let bpp_code = self.registers[DISP_MODE] & 0x07;
        let bpp = match bpp_code {
            0 => 1,
            1 => 2,
            2 => 4,
            3 => 8,
            4 => 16,
            _ => {
                warn!(bpp_code, "SED1376 no renderer for this bit depth");
                self.framebuffer.fill(0);
                return;
            }
        };
        let rotation = 90 * (self.registers[SPECIAL_EFFECT] & 0x03) as u32;
        let pip = self.registers[SPECIAL_EFFECT] & 0x10 != 0;

        let start = self.buffer_start_address(DISP_ADDR_0, DISP_ADDR_1, DISP_ADDR_2, rotation);
        let line_size = self.line_size(LINE_SIZE_0, LINE_SIZE_1);

        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                self.framebuffer[y * SCREEN_WIDTH + x] =
                    self.render_pixel(x, y, color, bpp, start, line_size);
            }
        }

        if pip {
            let pip_start =
                self.buffer_start_address(PIP_ADDR_0, PIP_ADDR_1, PIP_ADDR_2, rotation);
            let pip_line_size = self.line_size(PIP_LINE_SZ_0, PIP_LINE_SZ_1);
            self.render_pip(color, bpp, rotation, pip_start, pip_line_size);
        }

        if self.registers[DISP_MODE] & 0x30 == 0x10 {
            for pixel in self.framebuffer.iter_mut() {
                *pixel = !*pixel;
            }
        }

        self.apply_backlight();
    }

    fn render_pip(&mut self, color: bool, bpp: u8, rotation: u32, start: usize, line_size: usize) {
        let scale = (32 / bpp as u32).max(1);
        let raw_x0 = self.reg16(PIP_X_START_0, PIP_X_START_1) as u32;
        let raw_x1 = self.reg16(PIP_X_END_0, PIP_X_END_1) as u32 + 1;
        let raw_y0 = self.reg16(PIP_Y_START_0, PIP_Y_START_1) as u32;
        let raw_y1 = self.reg16(PIP_Y_END_0, PIP_Y_END_1) as u32 + 1;

        let (x0, x1, y0, y1) = if matches!(rotation, 0 | 180) {
            (raw_x0 * scale, raw_x1 * scale, raw_y0, raw_y1)
        } else {
            (raw_x0, raw_x1, raw_y0 * scale, raw_y1 * scale)
        };

        let x0 = (x0 as usize).min(SCREEN_WIDTH);
        let x1 = (x1 as usize).min(SCREEN_WIDTH);
        let y0 = (y0 as usize).min(SCREEN_HEIGHT);
        let y1 = (y1 as usize).min(SCREEN_HEIGHT);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        for y in y0..y1 {
            for x in x0..x1 {
                let local_x = x - x0;
                let local_y = y - y0;
                self.framebuffer[y * SCREEN_WIDTH + x] =
                    self.render_pixel(local_x, local_y, color, bpp, start, line_size);
            }
        }
    }

    fn apply_backlight(&mut self) {
        match self.backlight_level {
            0 => {
                for pixel in self.framebuffer.iter_mut() {
                    *pixel = (*pixel >> 2) & 0x39E7;
                }
            }
            1 => {
                for pixel in self.framebuffer.iter_mut() {
                    *pixel = (*pixel >> 1) & 0x7BEF;
                }
            }
            _ => {}
        }
    }

    fn render_pixel(&self, x: usize, y: usize, color: bool, bpp: u8, start: usize, line_size: usize) -> u16 {
        if bpp == 16 {
            let offset = start + y * line_size + x * 2;
            if offset + 1 >= self.ram.len() {
                return 0;
            }
            return u16::from_le_bytes([self.ram[offset], self.ram[offset + 1]]);
        }

        let pixels_per_byte = 8 / bpp as usize;
        let byte_offset = start + y * line_size + x / pixels_per_byte;
        if byte_offset >= self.ram.len() {
            return 0;
        }
        let byte = self.ram[byte_offset];
        let slot = x % pixels_per_byte;
        let shift = 8 - bpp as usize * (slot + 1);
        let mask = (1u16 << bpp) as u8 - 1;
        let index = (byte >> shift) & mask;

        if color {
            self.output_lut[index as usize]
        } else {
            let rgb = self.output_lut[index as usize];
            gray_from_rgb565(rgb)
        }
    }

    fn reg16(&self, lo: usize, hi: usize) -> u16 {
        self.registers[lo] as u16 | ((self.registers[hi] as u16) << 8)
    }

    fn line_size(&self, lo: usize, hi: usize) -> usize {
        self.reg16(lo, hi) as usize * 4
    }

    /// §4.3.3: for rotation 0/270 the 24-bit register triple is multiplied by 4 directly; for
    /// 90/180 it is incremented by one unit first. A panel-dimension subtraction is commented
    /// out in the source and is not applied here — see DESIGN.md.
    fn buffer_start_address(&self, lo: usize, mid: usize, hi: usize, rotation: u32) -> usize {
        let addr = self.registers[lo] as usize
            | (self.registers[mid] as usize) << 8
            | (self.registers[hi] as usize) << 16;
        match rotation {
            0 | 270 => addr * 4,
            90 | 180 => (addr + 1) * 4,
            other => {
                debug!(other, "unexpected rotation value, treating as 0");
                addr * 4
            }
        }
    }
}

fn gray_from_rgb565(rgb: u16) -> u16 {
    let r = (rgb >> 11) & 0x1F;
    let g = (rgb >> 5) & 0x3F;
    let b = rgb & 0x1F;
    let intensity = ((r * 2 + g + b * 2) / 5) & 0x1F;
    (intensity << 11) | ((intensity as u16 * 2) << 5) | intensity
}

impl Default for Sed1376 {
    fn default() -> Self {
        Self::new()
    }
}
