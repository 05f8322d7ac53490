//! Command opcodes, response bit layouts and packet sizing for the SD SPI-mode protocol.
//! Values match the SD Physical Layer Specification's SPI-mode framing.

pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_DATA_PACKET_SIZE: usize = 1 + BLOCK_SIZE + 2;

// Standard (non-ACMD) commands.
pub const GO_IDLE_STATE: u8 = 0;
pub const SEND_OP_COND: u8 = 1;
pub const SEND_CSD: u8 = 9;
pub const SEND_CID: u8 = 10;
pub const STOP_TRANSMISSION: u8 = 12;
pub const SEND_STATUS: u8 = 13;
pub const SET_BLOCKLEN: u8 = 16;
pub const READ_SINGLE_BLOCK: u8 = 17;
pub const READ_MULTIPLE_BLOCK: u8 = 18;
pub const WRITE_SINGLE_BLOCK: u8 = 24;
pub const WRITE_MULTIPLE_BLOCK: u8 = 25;
pub const SEND_WRITE_PROT: u8 = 30;
pub const APP_CMD: u8 = 55;
pub const READ_OCR: u8 = 58;
pub const CRC_ON_OFF: u8 = 59;

// Application-specific commands (valid only immediately after APP_CMD).
pub const SET_WR_BLOCK_ERASE_COUNT: u8 = 23;
pub const APP_SEND_OP_COND: u8 = 41;
pub const SEND_SCR: u8 = 51;

// Data tokens.
pub const DATA_TOKEN_DEFAULT: u8 = 0xFE;
pub const DATA_TOKEN_CMD25: u8 = 0xFC;
pub const STOP_TRAN: u8 = 0xFD;

// R1 response bits.
pub const R1_IN_IDLE_STATE: u8 = 0x01;
pub const R1_ILLEGAL_COMMAND: u8 = 0x04;
pub const R1_COMMAND_CRC_ERROR: u8 = 0x08;
pub const R1_PARAMETER_ERROR: u8 = 0x40;

// Data-response token status codes (3 bits, framed as 0b000_0_SSS_1).
pub const DR_ACCEPTED: u8 = 0b010;
pub const DR_CRC_ERROR: u8 = 0b101;
pub const DR_WRITE_ERROR: u8 = 0b110;

// Error token bits (sent in place of a data packet token).
pub const ET_OUT_OF_RANGE: u8 = 0x08;

pub(crate) fn data_response_byte(status: u8) -> u8 {
    (status << 1) | 0x01
}
