use crate::lcd::hd44780::driver::{CursorDirection, HD44780Driver};
use crate::lcd::hd44780::instructions::*;
use crate::{I2cBus, LcdError, LcdResult};
use log::{debug, trace, warn};
use std::thread::sleep;
use std::time::{Duration, Instant};

// PCF8574 port bits, as wired on the common backpack boards:
// P7 P6 P5 P4 P3 P2 P1 P0 = DB7 DB6 DB5 DB4 BL E RW RS

/// Register select: set for the data register.
pub const PIN_RS: u8 = 0b00000001;
/// Read/write: set for read.
pub const PIN_RW: u8 = 0b00000010;
/// Clock enable.
pub const PIN_E: u8 = 0b00000100;
/// Backlight.
pub const PIN_BL: u8 = 0b00001000;
/// DB4-DB7. Both nibbles of a byte travel over these pins.
pub const PINS_DATA: u8 = 0b11110000;

/// HD44780 driver for the PCF8574 I2C backpack, using the 4-bit interface.
///
/// Every change of the RS, RW, E and data lines is one single-byte I2C write to the expander, so
/// clocking a nibble takes three writes: setup, E high, E low. The controller latches on the
/// falling edge of E. The pin hold times required by the HD44780 are in the tens or hundreds of
/// nanoseconds; a 1 µs sleep after every write covers all of them.
///
/// After each access the driver waits for the instruction to execute, either by polling the busy
/// flag or by sleeping for the worst-case execution time (190 kHz oscillator). Polling gives up
/// after the same worst-case time and logs a warning.
///
/// The geometry is fixed to 2 rows of 40 columns, which is what the DDRAM addressing of the
/// controller covers in 2-line mode. Smaller displays show a window of it.
///
/// Backlight, cursor position and initialization state are tracked in software, since the expander
/// outputs cannot be read back and the cursor is not re-read from the controller.
#[derive(Debug)]
pub struct Pcf8574HD44780Driver<'a, B: I2cBus> {
    bus: &'a mut B,
    address: u8,
    poll_busy_flag: bool,

    backlight: bool,
    cursor_x: u8,
    cursor_y: u8,
    initialized: bool,
}

impl<'a, B: I2cBus> Pcf8574HD44780Driver<'a, B> {
    pub const COLUMNS: u8 = 40;
    pub const ROWS: u8 = 2;
    /// DDRAM address of the first character of the second row.
    const SECOND_ROW_ADDRESS: u8 = 0x40;

    /// Clear display and return home: 1.52 ms at 270 kHz, 2.16 ms at 190 kHz.
    pub const LONG_DELAY: Duration = Duration::from_micros(2160);
    /// Every other instruction and data access: 37 µs at 270 kHz, 52 µs at 190 kHz.
    pub const SHORT_DELAY: Duration = Duration::from_micros(52);
    const PIN_HOLD: Duration = Duration::from_micros(1);

    /// Creates a new driver for the backpack at the 7-bit I2C `address`.
    ///
    /// # Parameters
    ///
    /// - `bus`: The I2C bus the backpack is attached to. It's borrowed for as long as the driver
    ///   lives, nothing else may talk to the display in the meantime.
    /// - `address`: Address of the PCF8574, usually `0x27` (PCF8574T) or `0x3f` (PCF8574AT).
    /// - `poll_busy_flag`: Whether to wait for instructions by reading the busy flag, instead of
    ///   sleeping for the worst-case execution time. Requires the RW line to be wired.
    ///
    /// [Self::initialize] has to be called before anything else.
    pub fn new(bus: &'a mut B, address: u8, poll_busy_flag: bool) -> Self {
        Pcf8574HD44780Driver {
            bus,
            address,
            poll_busy_flag,
            backlight: true,
            cursor_x: 0,
            cursor_y: 0,
            initialized: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bus(&self) -> &B {
        &*self.bus
    }

    /// Gives direct access to the bus. Anything written here bypasses the tracked display state.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut *self.bus
    }

    pub fn polls_busy_flag(&self) -> bool {
        self.poll_busy_flag
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_backlight_on(&self) -> bool {
        self.backlight
    }

    /// Current cursor position as `(column, row)`.
    pub fn cursor(&self) -> (u8, u8) {
        (self.cursor_x, self.cursor_y)
    }

    /// Initializes the controller by instruction, as described in figure 24 of the HD44780U
    /// datasheet, then selects 2 lines and the 5x8 font.
    ///
    /// The reset instruction is sent three times to get the controller into 8-bit mode no matter
    /// what state it was in, then a function set switches it to 4-bit mode. Only the upper nibble
    /// is clocked in for these, since the controller still expects 8-bit transfers.
    ///
    /// Can be called again to reset the controller; the tracked state is kept.
    pub fn initialize(&mut self) -> LcdResult<(), B::Error> {
        debug!("Initializing HD44780 at 0x{:02x}", self.address);
        self.initialized = false;

        // More than 40 ms after Vcc rises to 2.7 V
        sleep(Duration::from_millis(100));
        self.write_init(RESET)?;
        // More than 4.1 ms
        sleep(Duration::from_millis(5));
        self.write_init(RESET)?;
        // More than 100 µs
        sleep(Duration::from_millis(1));
        self.write_init(RESET)?;
        sleep(Duration::from_millis(1));

        self.write_init(FUNCTION_SET)?;
        sleep(Duration::from_millis(1));
        self.initialized = true;

        self.function_set(true, false)?;
        debug!("HD44780 initialized");
        Ok(())
    }

    /// Clears the display and moves the cursor to (0, 0).
    pub fn clear(&mut self) -> LcdResult<(), B::Error> {
        self.clear_display()
    }

    /// Moves the cursor to (0, 0) and undoes any display shift.
    pub fn home(&mut self) -> LcdResult<(), B::Error> {
        self.return_home()
    }

    /// Turns the display and cursor off. The display contents are kept.
    pub fn display_off(&mut self) -> LcdResult<(), B::Error> {
        self.set_display_control(false, false, false)
    }

    /// Turns the display on with the cursor hidden.
    pub fn display_on(&mut self) -> LcdResult<(), B::Error> {
        self.set_display_control(true, false, false)
    }

    /// Shows the cursor as an underline, optionally with a blinking block. Turns the display on.
    pub fn cursor_on(&mut self, blink: bool) -> LcdResult<(), B::Error> {
        self.set_display_control(true, true, blink)
    }

    /// Hides the cursor.
    ///
    /// **⚠️ This is the same instruction as [Self::display_on], so it also turns on a display that
    /// was off.**
    pub fn cursor_off(&mut self) -> LcdResult<(), B::Error> {
        self.display_on()
    }

    /// Sets whether the address counter increments or decrements after each write, and whether the
    /// display shifts along with it.
    pub fn entry_mode(&mut self, increment: bool, shift: bool) -> LcdResult<(), B::Error> {
        let direction = if increment {
            CursorDirection::Right
        } else {
            CursorDirection::Left
        };
        self.set_entry_mode(direction, shift)
    }

    /// Shifts the whole display by one character. The DDRAM contents and cursor are unchanged.
    pub fn shift_display(&mut self, right: bool) -> LcdResult<(), B::Error> {
        let direction = if right {
            CursorDirection::Right
        } else {
            CursorDirection::Left
        };
        self.cursor_shift(true, direction)
    }

    /// Moves the cursor to column `x` of row `y`, both zero-based.
    pub fn set_cursor(&mut self, x: u8, y: u8) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        if x >= Self::COLUMNS || y >= Self::ROWS {
            return Err(LcdError::CursorOutOfRange {
                x,
                y,
                columns: Self::COLUMNS,
                rows: Self::ROWS,
            });
        }

        self.set_ddram_address(x + y * Self::SECOND_ROW_ADDRESS)
    }

    /// Writes a character at the cursor and advances it, wrapping to the next row and from the
    /// last row back to the first.
    ///
    /// `'\n'` moves to the start of the next row without writing anything. Characters `'\0'` to
    /// `'\x07'` show the custom glyphs, everything else up to `'\u{ff}'` is looked up in the
    /// character ROM of the controller. Other characters are rejected.
    pub fn write_char(&mut self, c: char) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;

        if c == '\n' {
            self.cursor_x = Self::COLUMNS;
        } else {
            let code = u8::try_from(c).map_err(|_| LcdError::UnsupportedCharacter(c))?;
            self.write_data(code)?;
            self.cursor_x += 1;
        }
        self.wrap_cursor();

        // The address counter runs from 0x27 to 0x40, not to the next row, so always re-sync
        self.set_cursor(self.cursor_x, self.cursor_y)
    }

    /// Writes every character of `s` with [Self::write_char]. Stops at the first error, leaving
    /// the characters before it on the display.
    pub fn write_str(&mut self, s: &str) -> LcdResult<(), B::Error> {
        for c in s.chars() {
            self.write_char(c)?;
        }
        Ok(())
    }

    /// Stores a 5x8 custom glyph in CGRAM slot `index` (0-7), shown by writing the character with
    /// that code. Each of the 8 pattern bytes is one row, top first, using the low 5 bits.
    ///
    /// The cursor is restored afterwards, since CGRAM writes move the address counter out of DDRAM.
    pub fn define_custom_glyph(&mut self, index: u8, pattern: &[u8]) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        if index > 7 {
            return Err(LcdError::GlyphIndexOutOfRange(index));
        }
        if pattern.len() != 8 {
            return Err(LcdError::GlyphPatternLength(pattern.len()));
        }

        self.set_cgram_address(index << 3)?;
        for &row in pattern {
            self.write_data(row)?;
        }
        self.set_cursor(self.cursor_x, self.cursor_y)
    }

    pub fn backlight_on(&mut self) -> LcdResult<(), B::Error> {
        self.set_backlight(true)
    }

    pub fn backlight_off(&mut self) -> LcdResult<(), B::Error> {
        self.set_backlight(false)
    }

    /// Reads the busy flag (bit 7) and the address counter (bits 6-0).
    pub fn read_instruction_register(&mut self) -> LcdResult<u8, B::Error> {
        self.read_instruction()
    }

    /// Reads the character at the cursor. The cursor does not move.
    pub fn read_data_register(&mut self) -> LcdResult<u8, B::Error> {
        let data = self.read_data()?;
        // Reading advanced the address counter
        self.set_cursor(self.cursor_x, self.cursor_y)?;
        Ok(data)
    }

    /// Waits for the last instruction to execute.
    ///
    /// With busy flag polling, the instruction register is read until the busy flag clears. If it's
    /// still set after `duration`, a warning is logged and the wait ends anyway: real controllers
    /// regularly run a bit slower than their nominal timing. Otherwise, just sleeps for `duration`.
    pub fn execution_delay(&mut self, duration: Duration) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;

        if !self.poll_busy_flag {
            sleep(duration);
            return Ok(());
        }

        let deadline = Instant::now() + duration;
        while self.read(false)? & BUSY_FLAG != 0 {
            if Instant::now() >= deadline {
                warn!("Busy flag did not clear within {:?}, continuing anyway", duration);
                break;
            }
        }
        Ok(())
    }

    /// Moves a cursor that ran past the last column to the start of the next row, and from the
    /// last row back to the first.
    fn wrap_cursor(&mut self) {
        if self.cursor_x >= Self::COLUMNS {
            self.cursor_x = 0;
            self.cursor_y += 1;
        }
        if self.cursor_y >= Self::ROWS {
            self.cursor_y = 0;
        }
    }

    fn ensure_initialized(&self) -> LcdResult<(), B::Error> {
        if self.initialized {
            Ok(())
        } else {
            Err(LcdError::NotInitialized)
        }
    }

    fn set_backlight(&mut self, on: bool) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        self.backlight = on;
        // Not an HD44780 access: only the backlight pin changes, E stays low
        self.write_port(if on { PIN_BL } else { 0 })
    }

    /// RS, RW and backlight bits for the next access.
    fn control_bits(&self, rs: bool, rw: bool) -> u8 {
        let mut bits = 0;
        if rs {
            bits |= PIN_RS;
        }
        if rw {
            bits |= PIN_RW;
        }
        if self.backlight {
            bits |= PIN_BL;
        }
        bits
    }

    fn write_port(&mut self, byte: u8) -> LcdResult<(), B::Error> {
        trace!("Port write: {:08b}", byte);
        self.bus
            .write_byte(self.address, byte)
            .map_err(LcdError::Bus)
    }

    fn read_port(&mut self) -> LcdResult<u8, B::Error> {
        let byte = self.bus.read_byte(self.address).map_err(LcdError::Bus)?;
        trace!("Port read: {:08b}", byte);
        Ok(byte)
    }

    /// Clocks the upper nibble of `value` into the controller.
    fn pulse_nibble(&mut self, value: u8, control: u8) -> LcdResult<(), B::Error> {
        let byte = (value & PINS_DATA) | control;

        // Address setup time, at least 60 ns
        self.write_port(byte)?;
        sleep(Self::PIN_HOLD);
        // Enable pulse width, at least 450 ns
        self.write_port(byte | PIN_E)?;
        sleep(Self::PIN_HOLD);
        // Enable fall time (25 ns) plus address hold time (20 ns)
        self.write_port(byte)?;
        sleep(Self::PIN_HOLD);

        Ok(())
    }

    /// Sends an upper nibble only, while the controller is still in 8-bit mode.
    fn write_init(&mut self, value: u8) -> LcdResult<(), B::Error> {
        trace!("Sending init: {:04b}", value >> 4);
        let control = self.control_bits(false, false);
        self.pulse_nibble(value, control)
    }

    fn write(&mut self, value: u8, rs: bool) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        trace!("Sending data: {:08b}, RS: {}", value, rs);

        let control = self.control_bits(rs, false);
        self.pulse_nibble(value, control)?;
        self.pulse_nibble(value << 4, control)?;

        if !rs && (value == CLEAR_DISPLAY || value == RETURN_HOME) {
            self.execution_delay(Self::LONG_DELAY)
        } else {
            self.execution_delay(Self::SHORT_DELAY)
        }
    }

    /// Clocks out one nibble, returned in the upper four bits.
    fn read_nibble(&mut self, control: u8) -> LcdResult<u8, B::Error> {
        // The expander pins are quasi-bidirectional: the controller can only pull a pin low if
        // it's driven high here
        self.write_port(control | PIN_E | PINS_DATA)?;
        sleep(Self::PIN_HOLD);
        let nibble = self.read_port()? & PINS_DATA;
        self.write_port(control)?;
        sleep(Self::PIN_HOLD);
        Ok(nibble)
    }

    fn read(&mut self, rs: bool) -> LcdResult<u8, B::Error> {
        self.ensure_initialized()?;

        let control = self.control_bits(rs, true);
        self.write_port(control)?;
        sleep(Self::PIN_HOLD);

        let high_nibble = self.read_nibble(control)?;
        let low_nibble = self.read_nibble(control)?;
        let data = high_nibble | (low_nibble >> 4);
        trace!("Read data: {:08b}, RS: {}", data, rs);

        if rs {
            self.execution_delay(Self::SHORT_DELAY)?;
        }
        Ok(data)
    }
}

impl<B: I2cBus> HD44780Driver for Pcf8574HD44780Driver<'_, B> {
    type BusError = B::Error;

    fn clear_display(&mut self) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.write_instruction(CLEAR_DISPLAY)
    }

    fn return_home(&mut self) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.write_instruction(RETURN_HOME)
    }

    /// Moving the cursor steps the tracked position with the same wrapping as
    /// [Pcf8574HD44780Driver::write_char]. Shifting the display leaves it alone.
    fn cursor_shift(
        &mut self,
        display_shift: bool,
        direction: CursorDirection,
    ) -> LcdResult<(), B::Error> {
        let mut command = SHIFT;
        if display_shift {
            command |= SHIFT_DISPLAY;
        }
        if direction == CursorDirection::Right {
            command |= SHIFT_RIGHT;
        }
        self.write_instruction(command)?;
        if display_shift {
            return Ok(());
        }

        match direction {
            CursorDirection::Right => {
                self.cursor_x += 1;
                self.wrap_cursor();
            }
            CursorDirection::Left if self.cursor_x > 0 => self.cursor_x -= 1,
            CursorDirection::Left => {
                self.cursor_x = Self::COLUMNS - 1;
                self.cursor_y = if self.cursor_y == 0 {
                    Self::ROWS - 1
                } else {
                    self.cursor_y - 1
                };
            }
        }
        self.set_cursor(self.cursor_x, self.cursor_y)
    }

    /// Only addresses of visible cells are accepted: `0x00`-`0x27` for the first row and
    /// `0x40`-`0x67` for the second. The tracked cursor follows.
    fn set_ddram_address(&mut self, address: u8) -> LcdResult<(), B::Error> {
        self.ensure_initialized()?;
        let (x, y) = match address {
            0x00..=0x27 => (address, 0),
            0x40..=0x67 => (address - Self::SECOND_ROW_ADDRESS, 1),
            _ => return Err(LcdError::InvalidArgument),
        };

        self.cursor_x = x;
        self.cursor_y = y;
        self.write_instruction(DDRAM_SET | address)
    }

    fn write_instruction(&mut self, value: u8) -> LcdResult<(), B::Error> {
        self.write(value, false)
    }

    fn write_data(&mut self, value: u8) -> LcdResult<(), B::Error> {
        self.write(value, true)
    }

    fn read_instruction(&mut self) -> LcdResult<u8, B::Error> {
        self.read(false)
    }

    fn read_data(&mut self) -> LcdResult<u8, B::Error> {
        self.read(true)
    }
}
