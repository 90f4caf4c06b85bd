//! HD44780 instruction opcodes and flags.
//!
//! Every instruction is a single base bit, optionally ORed with the flags of its own bit field.
//! The values come from the HD44780U datasheet (Hitachi, table 6).

pub const CLEAR_DISPLAY: u8 = 0b00000001;
pub const RETURN_HOME: u8 = 0b00000010;

pub const ENTRY_MODE: u8 = 0b00000100;
/// Increment the address counter after each access (cursor moves right).
pub const ENTRY_MODE_INC: u8 = 0b00000010;
/// Shift the whole display on each write.
pub const ENTRY_MODE_SHIFT: u8 = 0b00000001;

pub const DISPLAY_CONTROL: u8 = 0b00001000;
pub const DISPLAY_ON: u8 = 0b00000100;
pub const DISPLAY_SHOW_CURSOR: u8 = 0b00000010;
pub const DISPLAY_BLINK_CURSOR: u8 = 0b00000001;

pub const SHIFT: u8 = 0b00010000;
/// Shift the display instead of moving the cursor.
pub const SHIFT_DISPLAY: u8 = 0b00001000;
pub const SHIFT_RIGHT: u8 = 0b00000100;

pub const FUNCTION_SET: u8 = 0b00100000;
/// 8-bit interface data length. Cleared for the 4-bit interface used over the expander.
pub const FUNCTION_8BIT_DL: u8 = 0b00010000;
pub const FUNCTION_2_LINES: u8 = 0b00001000;
pub const FUNCTION_5X10_FONT: u8 = 0b00000100;

/// Sets the CGRAM (custom character) address, 6 bits.
pub const CGRAM_SET: u8 = 0b01000000;
/// Sets the DDRAM (display data) address, 7 bits.
pub const DDRAM_SET: u8 = 0b10000000;

/// Function set with 8-bit data length, sent three times while initializing by instruction.
pub const RESET: u8 = 0b00110000;

/// Busy flag bit of the instruction register read.
pub const BUSY_FLAG: u8 = 0b10000000;
/// Address counter bits of the instruction register read.
pub const ADDRESS_COUNTER: u8 = 0b01111111;
