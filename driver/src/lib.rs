pub mod lcd;
pub mod linux;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError<E> {
    #[error("display has not been initialized")]
    NotInitialized,
    #[error("cursor position ({x}, {y}) is outside of the {columns}x{rows} display")]
    CursorOutOfRange {
        x: u8,
        y: u8,
        columns: u8,
        rows: u8,
    },
    #[error("custom glyph index {0} is outside of 0-7")]
    GlyphIndexOutOfRange(u8),
    #[error("custom glyph pattern must be 8 rows long, got {0}")]
    GlyphPatternLength(usize),
    #[error("character {0:?} cannot be shown on the display")]
    UnsupportedCharacter(char),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("I2C bus error: {0}")]
    Bus(E),
}

pub type LcdResult<T, E> = Result<T, LcdError<E>>;

/// A byte-oriented I2C bus the display driver talks through.
///
/// Implementations own the platform side of the transaction (bus number, clock speed, pin
/// assignment). The driver only ever needs single-byte writes and reads, but the trait takes
/// slices so that any ordinary I2C master fits.
pub trait I2cBus: Debug {
    type Error: std::error::Error;

    /// Writes `bytes` to the device at the 7-bit `address`.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Fills `buffer` with bytes read from the device at the 7-bit `address`.
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes a single byte to the device.
    fn write_byte(&mut self, address: u8, byte: u8) -> Result<(), Self::Error> {
        self.write(address, &[byte])
    }

    /// Reads a single byte from the device.
    fn read_byte(&mut self, address: u8) -> Result<u8, Self::Error> {
        let mut buffer = [0u8; 1];
        self.read(address, &mut buffer)?;
        Ok(buffer[0])
    }
}
