use pda_machine::{Machine, MachineConfig};
use pda_sdcard::{SdInfo, BLOCK_SIZE};

fn crc7_for(cmd: u8, arg: u32) -> u8 {
    let bytes = [0x40 | cmd, (arg >> 24) as u8, (arg >> 16) as u8, (arg >> 8) as u8, arg as u8];
    let mut crc: u8 = 0;
    for &byte in &bytes {
        for i in (0..8).rev() {
            let bit = (byte >> i) & 1;
            let top = (crc >> 6) & 1;
            crc = (crc << 1) & 0x7F;
            if top ^ bit != 0 {
                crc ^= 0x09;
            }
        }
    }
    crc
}

fn send_command(machine: &mut Machine, cmd: u8, arg: u32, crc: u8) {
    let frame = ((0x40u64 | cmd as u64) << 40) | ((arg as u64) << 8) | ((crc as u64) << 1) | 1;
    for i in (0..48).rev() {
        machine.tick_sd_bit(false, (frame >> i) & 1 != 0);
    }
}

fn read_response_byte(machine: &mut Machine) -> u8 {
    let mut byte = 0u8;
    for _ in 0..8 {
        byte = (byte << 1) | machine.tick_sd_bit(false, true) as u8;
    }
    byte
}

fn read_until_non_ff(machine: &mut Machine, max_bytes: usize) -> u8 {
    for _ in 0..max_bytes {
        let byte = read_response_byte(machine);
        if byte != 0xFF {
            return byte;
        }
    }
    panic!("no non-0xFF response byte within {max_bytes} bytes");
}

fn reselect(machine: &mut Machine) {
    machine.tick_sd_bit(true, true);
    machine.tick_sd_bit(false, true);
}

fn boot(machine: &mut Machine) {
    send_command(machine, 0, 0, crc7_for(0, 0));
    read_until_non_ff(machine, 16);
    reselect(machine);
    send_command(machine, 1, 0, 0);
    read_until_non_ff(machine, 16);
    reselect(machine);
}

#[test]
fn no_card_inserted_bus_reads_idle_high() {
    let mut machine = Machine::new(MachineConfig::default());
    assert!(!machine.is_card_inserted());
    assert!(machine.tick_sd_bit(false, true));
}

#[test]
fn insert_then_eject_round_trips_the_backing_image() {
    let mut machine = Machine::new(MachineConfig::default());
    let image = vec![0xAB; 4 * BLOCK_SIZE];
    machine.insert_card(image.clone(), SdInfo::default());
    assert!(machine.is_card_inserted());

    let ejected = machine.eject_card();
    assert_eq!(ejected, Some(image));
    assert!(!machine.is_card_inserted());
}

/// Driving the bus one bit at a time through `Machine::tick_sd_bit` reproduces S1/boot exactly
/// as `pda_sdcard`'s own protocol tests exercise `SDCard` directly.
#[test]
fn tick_sd_bit_drives_a_freshly_inserted_card_out_of_idle() {
    let mut machine = Machine::new(MachineConfig::default());
    machine.insert_card(vec![0u8; 4 * BLOCK_SIZE], SdInfo::default());

    send_command(&mut machine, 0, 0, crc7_for(0, 0));
    let r1 = read_until_non_ff(&mut machine, 16);
    assert_eq!(r1, 0x01, "power-on reset must answer GO_IDLE_STATE with idle-state R1");

    reselect(&mut machine);
    send_command(&mut machine, 1, 0, 0);
    let r1 = read_until_non_ff(&mut machine, 16);
    assert_eq!(r1 & 0x01, 0, "SEND_OP_COND must clear in-idle-state once the card is ready");
}

#[test]
fn single_block_read_through_the_machine_returns_a_full_block() {
    let mut machine = Machine::new(MachineConfig::default());
    machine.insert_card(vec![0u8; 4 * BLOCK_SIZE], SdInfo::default());
    boot(&mut machine);

    send_command(&mut machine, 17, 0, 0);
    let r1 = read_until_non_ff(&mut machine, 16);
    assert_eq!(r1 & 0x04, 0);
    let token = read_until_non_ff(&mut machine, 16);
    assert_eq!(token, 0xFE);
    let mut data = [0u8; BLOCK_SIZE];
    for b in data.iter_mut() {
        *b = read_response_byte(&mut machine);
    }
    assert_eq!(data, [0u8; BLOCK_SIZE]);
}

#[test]
fn render_frame_returns_full_panel_and_is_blank_by_default() {
    let mut machine = Machine::new(MachineConfig::default());
    machine.display_mut().set_lcd_on(false);
    let frame = machine.render_frame();
    assert_eq!(frame.len(), 160 * 160);
    assert!(frame.iter().all(|&p| p == 0));
}

#[test]
fn save_and_load_state_round_trips_the_display() {
    let mut machine = Machine::new(MachineConfig::default());
    machine.display_mut().write_register(pda_display::LUT_R_WRITE, 0xFC);
    machine.display_mut().write_register(pda_display::LUT_WRITE_LOC, 9);
    let expected = machine.display().output_lut(9);

    let snap = machine.save_state();

    let mut restored = Machine::new(MachineConfig::default());
    restored.load_state(&snap).unwrap();
    assert_eq!(restored.display().output_lut(9), expected);
}
