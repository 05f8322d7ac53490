use pda_display::{encode_rgb565_from_sed666, Sed1376, DISP_MODE, LUT_B_WRITE, LUT_G_WRITE, LUT_R_WRITE, LUT_WRITE_LOC, PANEL_TYPE};
use pda_snapshot::IoSnapshot;

/// S5: with the LCD forced off, `render()` leaves the framebuffer entirely zero.
#[test]
fn s5_render_with_lcd_off_blanks_framebuffer() {
    let mut lcd = Sed1376::new();
    lcd.set_lcd_on(false);
    lcd.render();
    assert!(lcd.framebuffer().iter().all(|&p| p == 0));
}

/// S6: writing the three LUT channel registers then latching `LUT_WRITE_LOC` updates
/// `outputLut` at that index to the expected RGB565 encoding.
#[test]
fn s6_lut_write_latches_output_lut_entry() {
    let mut lcd = Sed1376::new();
    lcd.write_register(LUT_R_WRITE, 0xFC);
    lcd.write_register(LUT_G_WRITE, 0x00);
    lcd.write_register(LUT_B_WRITE, 0x00);
    lcd.write_register(LUT_WRITE_LOC, 5);
    assert_eq!(lcd.output_lut(5), encode_rgb565_from_sed666(0x3F, 0, 0));
    assert_eq!(lcd.output_lut(5), 0xF800);
}

/// Property 7: `outputLut` coherence survives a save/load round trip (it is rederived, not
/// itself serialized).
#[test]
fn lut_coherence_survives_snapshot_round_trip() {
    let mut lcd = Sed1376::new();
    lcd.write_register(LUT_R_WRITE, 0x3C);
    lcd.write_register(LUT_G_WRITE, 0xFC);
    lcd.write_register(LUT_B_WRITE, 0x80);
    lcd.write_register(LUT_WRITE_LOC, 200);
    let expected = lcd.output_lut(200);

    let blob = lcd.save_state();
    let mut restored = Sed1376::new();
    restored.load_state(&blob).unwrap();
    assert_eq!(restored.output_lut(200), expected);
}

/// Property 8: every write-masked register's stored byte never has a bit set outside its mask.
#[test]
fn disp_mode_write_respects_reserved_bit_mask() {
    let mut lcd = Sed1376::new();
    lcd.write_register(DISP_MODE, 0xFF);
    assert_eq!(lcd.read_register(DISP_MODE) & !0xF7, 0);
}

#[test]
fn pwr_save_cfg_bit_7_is_always_forced_high() {
    let mut lcd = Sed1376::new();
    lcd.write_register(pda_display::PWR_SAVE_CFG, 0x00);
    assert_eq!(lcd.read_register(pda_display::PWR_SAVE_CFG) & 0x80, 0x80);
}

/// Property 9: render preconditions. PLL off also blanks the frame even with the LCD "on".
#[test]
fn render_with_pll_off_blanks_framebuffer() {
    let mut lcd = Sed1376::new();
    lcd.set_pll_on(false);
    lcd.write_register(PANEL_TYPE, 0x40); // color panel, irrelevant once PLL is off
    lcd.render();
    assert!(lcd.framebuffer().iter().all(|&p| p == 0));
}

/// Property 9 (forced blank bit). `DISP_MODE` bit 7 blanks regardless of LCD/PLL/power state.
#[test]
fn render_with_forced_blank_bit_blanks_framebuffer() {
    let mut lcd = Sed1376::new();
    lcd.write_register(DISP_MODE, 0x80);
    lcd.render();
    assert!(lcd.framebuffer().iter().all(|&p| p == 0));
}

/// A solid 8bpp color frame renders every pixel as the palette entry at that index.
#[test]
fn eight_bpp_color_frame_uses_palette_lookup() {
    let mut lcd = Sed1376::new();
    lcd.write_register(LUT_R_WRITE, 0xFC);
    lcd.write_register(LUT_G_WRITE, 0x00);
    lcd.write_register(LUT_B_WRITE, 0x00);
    lcd.write_register(LUT_WRITE_LOC, 7);
    lcd.write_register(PANEL_TYPE, 0x40); // color
    lcd.write_register(DISP_MODE, 0x03); // 8bpp
    lcd.ram_mut()[..160 * 160].fill(7);
    // LINE_SIZE in 4-byte units: 160 px / 1 byte-per-px at 8bpp = 160 bytes = 40 units.
    lcd.write_register(pda_display::LINE_SIZE_0, 40);
    lcd.write_register(pda_display::LINE_SIZE_1, 0);

    lcd.render();
    assert!(lcd.framebuffer().iter().all(|&p| p == 0xF800));
}

/// Property 10: backlight attenuation never increases per-channel intensity level over level.
#[test]
fn backlight_attenuation_is_monotonic_non_increasing() {
    fn channels(rgb: u16) -> (u16, u16, u16) {
        ((rgb >> 11) & 0x1F, (rgb >> 5) & 0x3F, rgb & 0x1F)
    }

    let full = 0xFFFFu16;
    let level0 = (full >> 2) & 0x39E7;
    let level1 = (full >> 1) & 0x7BEF;
    let level2 = full;

    let (r0, g0, b0) = channels(level0);
    let (r1, g1, b1) = channels(level1);
    let (r2, g2, b2) = channels(level2);
    assert!(r0 <= r1 && r1 <= r2);
    assert!(g0 <= g1 && g1 <= g2);
    assert!(b0 <= b1 && b1 <= b2);
}
