//! I2C bus implementation for Linux, using the `/dev/i2c-*` character devices through the
//! i2cdev library.

use crate::I2cBus;
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use log::debug;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// LinuxI2cBus talks to devices on one `/dev/i2c-*` bus.
///
/// The kernel binds a file descriptor to a single slave address, so the bus re-targets it whenever
/// a transaction names a different address than the previous one.
pub struct LinuxI2cBus {
    path: PathBuf,
    device: LinuxI2CDevice,
    address: u8,
}

impl LinuxI2cBus {
    /// Opens `/dev/i2c-<bus>`, initially targeting `address`.
    pub fn new(bus: u8, address: u8) -> Result<Self, LinuxI2CError> {
        Self::with_path(format!("/dev/i2c-{}", bus), address)
    }

    /// Opens the I2C character device at `path`, initially targeting `address`.
    pub fn with_path(path: impl AsRef<Path>, address: u8) -> Result<Self, LinuxI2CError> {
        let path = path.as_ref().to_path_buf();
        let device = LinuxI2CDevice::new(&path, u16::from(address))?;
        debug!("Opened {} for 0x{:02x}", path.display(), address);
        Ok(LinuxI2cBus {
            path,
            device,
            address,
        })
    }

    fn target(&mut self, address: u8) -> Result<(), LinuxI2CError> {
        if address != self.address {
            self.device.set_slave_address(u16::from(address))?;
            self.address = address;
        }
        Ok(())
    }
}

impl Debug for LinuxI2cBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LinuxI2cBus({}, 0x{:02x})", self.path.display(), self.address)
    }
}

impl I2cBus for LinuxI2cBus {
    type Error = LinuxI2CError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), LinuxI2CError> {
        self.target(address)?;
        self.device.write(bytes)
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), LinuxI2CError> {
        self.target(address)?;
        self.device.read(buffer)
    }
}
