mod pcf8574;

use crate::lcd::hd44780::instructions::*;
use crate::{LcdError, LcdResult};
use std::fmt::Debug;
pub use pcf8574::*;

/// Instruction-level interface of an HD44780 controller.
///
/// Implementations provide the four register accesses. The provided methods assemble every other
/// instruction from [instructions](crate::lcd::hd44780::instructions) and send it through
/// [HD44780Driver::write_instruction].
pub trait HD44780Driver: Debug {
    /// Error type of the bus the controller is attached to.
    type BusError;

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> LcdResult<(), Self::BusError> {
        self.write_instruction(CLEAR_DISPLAY)
    }

    /// Sets the cursor to the home position and undoes any display shift.
    fn return_home(&mut self) -> LcdResult<(), Self::BusError> {
        self.write_instruction(RETURN_HOME)
    }

    /// Sets the direction the cursor moves after each access, and whether the whole display
    /// shifts along with it.
    fn set_entry_mode(
        &mut self,
        cursor_direction: CursorDirection,
        shift: bool,
    ) -> LcdResult<(), Self::BusError> {
        let mut command = ENTRY_MODE;
        if cursor_direction == CursorDirection::Right {
            command |= ENTRY_MODE_INC;
        }
        if shift {
            command |= ENTRY_MODE_SHIFT;
        }
        self.write_instruction(command)
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> LcdResult<(), Self::BusError> {
        let mut command = DISPLAY_CONTROL;
        if display_on {
            command |= DISPLAY_ON;
        }
        if cursor_on {
            command |= DISPLAY_SHOW_CURSOR;
        }
        if blink_on {
            command |= DISPLAY_BLINK_CURSOR;
        }
        self.write_instruction(command)
    }

    /// Moves the cursor or shifts the display.
    fn cursor_shift(
        &mut self,
        display_shift: bool,
        direction: CursorDirection,
    ) -> LcdResult<(), Self::BusError> {
        let mut command = SHIFT;
        if display_shift {
            command |= SHIFT_DISPLAY;
        }
        if direction == CursorDirection::Right {
            command |= SHIFT_RIGHT;
        }
        self.write_instruction(command)
    }

    /// Sets the number of lines and the font, keeping the 4-bit interface.
    fn function_set(&mut self, two_lines: bool, large_font: bool) -> LcdResult<(), Self::BusError> {
        let mut command = FUNCTION_SET;
        if two_lines {
            command |= FUNCTION_2_LINES;
        }
        if large_font {
            command |= FUNCTION_5X10_FONT;
        }
        self.write_instruction(command)
    }

    /// Sets the CGRAM address. Following data accesses go to the custom character memory.
    fn set_cgram_address(&mut self, address: u8) -> LcdResult<(), Self::BusError> {
        if address > 0b00111111 {
            return Err(LcdError::InvalidArgument);
        }
        self.write_instruction(CGRAM_SET | address)
    }

    /// Sets the DDRAM address. Following data accesses go to the display memory.
    fn set_ddram_address(&mut self, address: u8) -> LcdResult<(), Self::BusError> {
        if address > 0b01111111 {
            return Err(LcdError::InvalidArgument);
        }
        self.write_instruction(DDRAM_SET | address)
    }

    /// Reads the busy flag and address counter.
    fn get_busy_flag_and_address(&mut self) -> LcdResult<(bool, u8), Self::BusError> {
        let value = self.read_instruction()?;
        let busy_flag = value & BUSY_FLAG != 0;
        let address = value & ADDRESS_COUNTER;
        Ok((busy_flag, address))
    }

    // Low-level register accesses.
    // These are used by the instructions above and implemented by the bus-specific driver.

    /// Writes to the instruction register (RS = 0).
    fn write_instruction(&mut self, value: u8) -> LcdResult<(), Self::BusError>;

    /// Writes to the data register (RS = 1), storing `value` at the current DDRAM or CGRAM address.
    fn write_data(&mut self, value: u8) -> LcdResult<(), Self::BusError>;

    /// Reads the instruction register: busy flag in bit 7, address counter in bits 6-0.
    fn read_instruction(&mut self) -> LcdResult<u8, Self::BusError>;

    /// Reads the data register at the current DDRAM or CGRAM address.
    fn read_data(&mut self) -> LcdResult<u8, Self::BusError>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}
