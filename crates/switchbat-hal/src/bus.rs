//! I2C bus access
//!
//! The telemetry pipeline talks to the embedded controller through the [`I2cBus`]
//! trait, so the same code runs against a Linux `/dev/i2c-N` character device or
//! against [`crate::mock::MockBus`] on a development machine.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("No acknowledge from device")]
    Nack,

    #[error("Bus busy")]
    Busy,

    #[error("Transfer timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl BusError {
    /// Errno-style result code, negative like the kernel adapter reports it
    pub fn code(&self) -> i32 {
        match self {
            BusError::Nack => -libc::ENXIO,
            BusError::Busy => -libc::EBUSY,
            BusError::Timeout => -libc::ETIMEDOUT,
            BusError::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<io::Error> for BusError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENXIO) => BusError::Nack,
            #[cfg(target_os = "linux")]
            Some(libc::EREMOTEIO) => BusError::Nack,
            Some(libc::EBUSY) | Some(libc::EAGAIN) => BusError::Busy,
            Some(libc::ETIMEDOUT) => BusError::Timeout,
            _ => BusError::Io(e),
        }
    }
}

/// A handle to one device on an I2C bus
///
/// Each call is a single bus transaction addressed to [`I2cBus::address`].
pub trait I2cBus: Send {
    /// 7-bit slave address this handle talks to
    fn address(&self) -> u16;

    /// Write `bytes` in one transaction
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    /// Fill `buf` from one read transaction
    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError>;
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn address(&self) -> u16 {
        (**self).address()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(buf)
    }
}

/// Boxed bus handle, as owned by the poller
pub type BoxedBus = Box<dyn I2cBus>;

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBus;

#[cfg(target_os = "linux")]
mod linux {
    use super::{BusError, I2cBus};
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;
    use std::io;
    use std::path::{Path, PathBuf};

    /// I2C device opened through the kernel's i2c-dev interface
    pub struct LinuxI2cBus {
        device: LinuxI2CDevice,
        path: PathBuf,
        address: u16,
    }

    impl LinuxI2cBus {
        /// Open `/dev/i2c-<bus_index>` bound to `address`
        pub fn open(bus_index: u8, address: u16) -> Result<Self, BusError> {
            let path = PathBuf::from(format!("/dev/i2c-{}", bus_index));
            Self::open_path(&path, address)
        }

        pub fn open_path(path: &Path, address: u16) -> Result<Self, BusError> {
            let device = LinuxI2CDevice::new(path, address).map_err(io::Error::from)?;
            tracing::info!("Opened I2C device 0x{:02X} on {}", address, path.display());

            Ok(Self {
                device,
                path: path.to_path_buf(),
                address,
            })
        }
    }

    impl I2cBus for LinuxI2cBus {
        fn address(&self) -> u16 {
            self.address
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
            self.device.write(bytes).map_err(|e| io::Error::from(e).into())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
            self.device.read(buf).map_err(|e| io::Error::from(e).into())
        }
    }

    impl Drop for LinuxI2cBus {
        fn drop(&mut self) {
            tracing::debug!(
                "Released I2C device 0x{:02X} on {}",
                self.address,
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_codes() {
        assert_eq!(BusError::Nack.code(), -libc::ENXIO);
        assert_eq!(BusError::Busy.code(), -libc::EBUSY);
        assert_eq!(BusError::Timeout.code(), -libc::ETIMEDOUT);

        let err = BusError::Io(io::Error::other("no errno"));
        assert_eq!(err.code(), -libc::EIO);
    }

    #[test]
    fn test_io_error_classification() {
        let err = BusError::from(io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(err, BusError::Busy));

        let err = BusError::from(io::Error::from_raw_os_error(libc::ETIMEDOUT));
        assert!(matches!(err, BusError::Timeout));

        let err = BusError::from(io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(err.code(), -libc::EACCES);
    }
}
