//! I2C transport for the module, one flavour per `embedded-hal` mode.
//!
//! The transport neither retries nor interprets frames. The bus timeout is
//! the one configured on the HAL's I2C peripheral.

use embedded_hal::i2c::{Error, ErrorKind};

use crate::BusError;

/// Classify a HAL error.
///
/// `embedded-hal` has no dedicated timeout kind, HALs report an expired
/// transfer timeout as `ErrorKind::Other`.
pub(crate) fn bus_error<E: Error>(e: E) -> BusError {
    match e.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::Nack,
        ErrorKind::Other => BusError::Timeout,
        _ => BusError::Bus,
    }
}

/// Blocking transport.
#[derive(Debug)]
pub(crate) struct Transport<I2C> {
    pub(crate) i2c: I2C,
    address: u8,
}

impl<I2C> Transport<I2C> {
    pub(crate) fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub(crate) fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: embedded_hal::i2c::I2c> Transport<I2C> {
    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.i2c.write(self.address, bytes).map_err(bus_error)
    }

    pub(crate) fn read(&mut self, buffer: &mut [u8]) -> Result<(), BusError> {
        self.i2c.read(self.address, buffer).map_err(bus_error)
    }
}

/// Async transport.
#[cfg(feature = "async")]
#[derive(Debug)]
pub(crate) struct AsyncTransport<I2C> {
    pub(crate) i2c: I2C,
    address: u8,
}

#[cfg(feature = "async")]
impl<I2C> AsyncTransport<I2C> {
    pub(crate) fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub(crate) fn release(self) -> I2C {
        self.i2c
    }
}

#[cfg(feature = "async")]
impl<I2C: embedded_hal_async::i2c::I2c> AsyncTransport<I2C> {
    pub(crate) async fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.i2c.write(self.address, bytes).await.map_err(bus_error)
    }

    pub(crate) async fn read(&mut self, buffer: &mut [u8]) -> Result<(), BusError> {
        self.i2c.read(self.address, buffer).await.map_err(bus_error)
    }
}
