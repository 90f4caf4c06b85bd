//! Simulated PCF8574 backpack wired to an HD44780 controller.
//!
//! [SimulatedDisplay] implements [I2cBus] and reacts to the written port bytes the way the real
//! hardware does: the expander latches each byte onto its pins, and the controller samples the data
//! pins on the falling edge of E. It starts in 8-bit mode like a freshly powered controller and only
//! switches to 4-bit transfers after a function set with DL cleared.
//!
//! Every raw transaction and every decoded register access is recorded, which makes it suitable for
//! checking the exact bus traffic of the driver without any hardware attached.
//!
//! **⚠️ The model is intentionally small: timing is not checked, the busy flag is scripted with
//! [SimulatedDisplay::set_busy_reads], and the expander outputs start low instead of high.**

use crate::I2cBus;
use crate::lcd::hd44780::driver::{PIN_BL, PIN_E, PIN_RS, PIN_RW, PINS_DATA};
use crate::lcd::hd44780::instructions::*;
use log::trace;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum SimError {
    #[error("no device acknowledged address 0x{0:02x}")]
    NoAcknowledge(u8),
    #[error("bus fault")]
    BusFault,
}

/// A single raw byte transaction seen by the expander.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transaction {
    Write(u8),
    Read(u8),
}

/// A register access decoded from the enable pulses on the bus.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusOperation {
    /// Upper nibble clocked in while the controller was still in 8-bit mode.
    InitWrite(u8),
    WriteInstruction(u8),
    WriteData(u8),
    /// Busy flag and address counter, as returned to the host.
    ReadInstruction(u8),
    ReadData(u8),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Memory {
    Ddram,
    Cgram,
}

#[derive(Clone)]
pub struct SimulatedDisplay {
    address: u8,
    port: u8,
    failing: bool,
    busy_reads: usize,

    four_bit: bool,
    pending_nibble: Option<u8>,
    read_value: Option<u8>,
    read_lower: bool,

    ddram: [u8; 128],
    cgram: [u8; 64],
    address_counter: u8,
    memory: Memory,
    increment: bool,
    entry_shift: bool,
    display_on: bool,
    cursor_visible: bool,
    cursor_blink: bool,
    two_lines: bool,
    large_font: bool,
    display_shift: i32,

    transactions: Vec<Transaction>,
    operations: Vec<BusOperation>,
}

impl SimulatedDisplay {
    /// Creates a powered-on display answering at the 7-bit `address`.
    pub fn new(address: u8) -> Self {
        SimulatedDisplay {
            address,
            port: 0,
            failing: false,
            busy_reads: 0,
            four_bit: false,
            pending_nibble: None,
            read_value: None,
            read_lower: false,
            ddram: [b' '; 128],
            cgram: [0; 64],
            address_counter: 0,
            memory: Memory::Ddram,
            increment: true,
            entry_shift: false,
            display_on: false,
            cursor_visible: false,
            cursor_blink: false,
            two_lines: false,
            large_font: false,
            display_shift: 0,
            transactions: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Makes the next `count` instruction register reads report the busy flag.
    /// `usize::MAX` keeps the controller busy forever.
    pub fn set_busy_reads(&mut self, count: usize) {
        self.busy_reads = count;
    }

    /// Makes every following transaction fail with [SimError::BusFault].
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Bytes written to the expander, in order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                Transaction::Write(byte) => Some(*byte),
                Transaction::Read(_) => None,
            })
            .collect()
    }

    pub fn operations(&self) -> &[BusOperation] {
        &self.operations
    }

    /// Instructions written since the log was last cleared.
    pub fn instructions(&self) -> Vec<u8> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                BusOperation::WriteInstruction(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Forgets all recorded transactions and operations, keeping the display state.
    pub fn clear_log(&mut self) {
        self.transactions.clear();
        self.operations.clear();
    }

    /// The 40 characters of a display row as stored in DDRAM.
    pub fn row(&self, row: u8) -> String {
        let base = if row == 0 { 0x00 } else { 0x40 };
        self.ddram[base..base + 40]
            .iter()
            .map(|&b| b as char)
            .collect()
    }

    pub fn ddram(&self, address: u8) -> u8 {
        self.ddram[(address & 0x7F) as usize]
    }

    /// The 8 pattern rows stored for custom character `index`.
    pub fn glyph(&self, index: u8) -> [u8; 8] {
        let base = ((index & 0x07) << 3) as usize;
        let mut glyph = [0u8; 8];
        glyph.copy_from_slice(&self.cgram[base..base + 8]);
        glyph
    }

    pub fn address_counter(&self) -> u8 {
        self.address_counter
    }

    pub fn is_four_bit(&self) -> bool {
        self.four_bit
    }

    pub fn is_display_on(&self) -> bool {
        self.display_on
    }

    pub fn is_cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn is_cursor_blinking(&self) -> bool {
        self.cursor_blink
    }

    pub fn is_two_lines(&self) -> bool {
        self.two_lines
    }

    pub fn is_large_font(&self) -> bool {
        self.large_font
    }

    pub fn is_incrementing(&self) -> bool {
        self.increment
    }

    pub fn is_entry_shift(&self) -> bool {
        self.entry_shift
    }

    /// Net display shift, positive to the right.
    pub fn display_shift(&self) -> i32 {
        self.display_shift
    }

    pub fn is_backlight_on(&self) -> bool {
        self.port & PIN_BL != 0
    }

    fn check_address(&self, address: u8) -> Result<(), SimError> {
        if self.failing {
            return Err(SimError::BusFault);
        }
        if address != self.address {
            return Err(SimError::NoAcknowledge(address));
        }
        Ok(())
    }

    fn set_port(&mut self, byte: u8) {
        let previous = self.port;
        self.port = byte;

        let rising = previous & PIN_E == 0 && byte & PIN_E != 0;
        let falling = previous & PIN_E != 0 && byte & PIN_E == 0;

        if rising && byte & PIN_RW != 0 && self.read_value.is_none() {
            self.read_value = Some(self.register_value(byte & PIN_RS != 0));
        }
        if falling {
            // RS, RW and the data pins are sampled as they were while E was high
            self.clock(previous);
        }
    }

    /// Levels of the expander pins. The controller only drives the data pins while RW and E are
    /// high, and can only pull down the pins the host left high.
    fn pin_levels(&self) -> u8 {
        let driving = self.port & PIN_RW != 0 && self.port & PIN_E != 0;
        match (driving, self.read_value) {
            (true, Some(value)) => {
                let nibble = if self.read_lower { value << 4 } else { value & PINS_DATA };
                self.port & (nibble | !PINS_DATA)
            }
            _ => self.port,
        }
    }

    fn register_value(&self, rs: bool) -> u8 {
        if rs {
            self.read_memory()
        } else {
            let busy = if self.busy_reads > 0 { BUSY_FLAG } else { 0 };
            busy | (self.address_counter & ADDRESS_COUNTER)
        }
    }

    fn clock(&mut self, latched: u8) {
        let rs = latched & PIN_RS != 0;
        let nibble = latched & PINS_DATA;

        if latched & PIN_RW != 0 {
            if self.four_bit {
                self.clock_read(rs);
            }
            return;
        }

        if !self.four_bit {
            // DB0-DB3 are not wired, so the controller sees them low
            self.operations.push(BusOperation::InitWrite(nibble));
            if !rs {
                self.execute(nibble);
            }
            return;
        }

        match self.pending_nibble.take() {
            None => self.pending_nibble = Some(nibble),
            Some(upper) => {
                let value = upper | (nibble >> 4);
                if rs {
                    self.operations.push(BusOperation::WriteData(value));
                    self.write_memory(value);
                } else {
                    self.operations.push(BusOperation::WriteInstruction(value));
                    self.execute(value);
                }
            }
        }
    }

    fn clock_read(&mut self, rs: bool) {
        if !self.read_lower {
            self.read_lower = true;
            return;
        }

        let value = self.read_value.take().unwrap_or(0);
        self.read_lower = false;
        if rs {
            self.operations.push(BusOperation::ReadData(value));
            self.advance();
        } else {
            self.operations.push(BusOperation::ReadInstruction(value));
            self.busy_reads = self.busy_reads.saturating_sub(1);
        }
    }

    fn execute(&mut self, value: u8) {
        trace!("Simulated HD44780 executing {:08b}", value);
        if value & DDRAM_SET != 0 {
            self.address_counter = value & 0b01111111;
            self.memory = Memory::Ddram;
        } else if value & CGRAM_SET != 0 {
            self.address_counter = value & 0b00111111;
            self.memory = Memory::Cgram;
        } else if value & FUNCTION_SET != 0 {
            self.four_bit = value & FUNCTION_8BIT_DL == 0;
            self.two_lines = value & FUNCTION_2_LINES != 0;
            self.large_font = value & FUNCTION_5X10_FONT != 0;
            self.pending_nibble = None;
        } else if value & SHIFT != 0 {
            let right = value & SHIFT_RIGHT != 0;
            if value & SHIFT_DISPLAY != 0 {
                self.display_shift += if right { 1 } else { -1 };
            } else {
                let increment = self.increment;
                self.increment = right;
                self.advance();
                self.increment = increment;
            }
        } else if value & DISPLAY_CONTROL != 0 {
            self.display_on = value & DISPLAY_ON != 0;
            self.cursor_visible = value & DISPLAY_SHOW_CURSOR != 0;
            self.cursor_blink = value & DISPLAY_BLINK_CURSOR != 0;
        } else if value & ENTRY_MODE != 0 {
            self.increment = value & ENTRY_MODE_INC != 0;
            self.entry_shift = value & ENTRY_MODE_SHIFT != 0;
        } else if value & RETURN_HOME != 0 {
            self.address_counter = 0;
            self.memory = Memory::Ddram;
            self.display_shift = 0;
        } else if value & CLEAR_DISPLAY != 0 {
            self.ddram.fill(b' ');
            self.address_counter = 0;
            self.memory = Memory::Ddram;
            self.increment = true;
            self.display_shift = 0;
        }
    }

    fn read_memory(&self) -> u8 {
        match self.memory {
            Memory::Ddram => self.ddram[(self.address_counter & 0x7F) as usize],
            Memory::Cgram => self.cgram[(self.address_counter & 0x3F) as usize],
        }
    }

    fn write_memory(&mut self, value: u8) {
        match self.memory {
            Memory::Ddram => self.ddram[(self.address_counter & 0x7F) as usize] = value,
            Memory::Cgram => self.cgram[(self.address_counter & 0x3F) as usize] = value,
        }
        self.advance();
    }

    fn advance(&mut self) {
        let mask = match self.memory {
            Memory::Ddram => 0x7F,
            Memory::Cgram => 0x3F,
        };
        let next = if self.increment {
            self.address_counter.wrapping_add(1)
        } else {
            self.address_counter.wrapping_sub(1)
        };
        self.address_counter = next & mask;
    }
}

impl Default for SimulatedDisplay {
    /// A display at `0x27`, the usual address of PCF8574T backpacks.
    fn default() -> Self {
        Self::new(0x27)
    }
}

impl Debug for SimulatedDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimulatedDisplay(0x{:02x})", self.address)
    }
}

impl I2cBus for SimulatedDisplay {
    type Error = SimError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), SimError> {
        self.check_address(address)?;
        for &byte in bytes {
            self.transactions.push(Transaction::Write(byte));
            self.set_port(byte);
        }
        Ok(())
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), SimError> {
        self.check_address(address)?;
        for slot in buffer.iter_mut() {
            let byte = self.pin_levels();
            self.transactions.push(Transaction::Read(byte));
            *slot = byte;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(sim: &mut SimulatedDisplay, byte: u8) {
        sim.write(0x27, &[byte, byte | PIN_E, byte]).unwrap();
    }

    #[test]
    fn starts_in_8bit_mode_and_switches_on_function_set() {
        let mut sim = SimulatedDisplay::default();
        pulse(&mut sim, RESET);
        assert!(!sim.is_four_bit());
        pulse(&mut sim, FUNCTION_SET);
        assert!(sim.is_four_bit());
        assert_eq!(
            sim.operations(),
            &[BusOperation::InitWrite(RESET), BusOperation::InitWrite(FUNCTION_SET)]
        );
    }

    #[test]
    fn latches_nibbles_on_falling_edge_only() {
        let mut sim = SimulatedDisplay::default();
        pulse(&mut sim, FUNCTION_SET);
        sim.clear_log();

        // Data pins change while E is low: nothing happens
        sim.write(0x27, &[0x40 | PIN_RS, 0x10 | PIN_RS]).unwrap();
        assert!(sim.operations().is_empty());

        pulse(&mut sim, 0x40 | PIN_RS);
        pulse(&mut sim, 0x10 | PIN_RS);
        assert_eq!(sim.operations(), &[BusOperation::WriteData(0x41)]);
        assert_eq!(sim.ddram(0), 0x41);
        assert_eq!(sim.address_counter(), 1);
    }

    #[test]
    fn reads_only_pull_down_pins_left_high() {
        let mut sim = SimulatedDisplay::default();
        pulse(&mut sim, FUNCTION_SET);
        pulse(&mut sim, DDRAM_SET);
        pulse(&mut sim, 0x05 << 4);
        sim.set_busy_reads(1);

        sim.write(0x27, &[PIN_RW, PIN_RW | PIN_E]).unwrap();
        // Data pins were driven low by the host, so the controller cannot raise them
        assert_eq!(sim.read_byte(0x27).unwrap(), PIN_RW | PIN_E);

        sim.write(0x27, &[PIN_RW | PIN_E | PINS_DATA]).unwrap();
        assert_eq!(sim.read_byte(0x27).unwrap(), 0x80 | PIN_RW | PIN_E);
    }

    #[test]
    fn rejects_other_addresses_and_injected_faults() {
        let mut sim = SimulatedDisplay::default();
        assert_eq!(sim.write_byte(0x3f, 0), Err(SimError::NoAcknowledge(0x3f)));
        sim.set_failing(true);
        assert_eq!(sim.read_byte(0x27), Err(SimError::BusFault));
        assert!(sim.transactions().is_empty());
    }
}
