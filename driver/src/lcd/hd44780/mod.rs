//! HD44780 LCD module.
//!
//! [instructions] holds the raw command set, [driver] the trait that assembles commands from it and
//! the PCF8574 I2C backpack implementation.

pub mod driver;
pub mod instructions;
