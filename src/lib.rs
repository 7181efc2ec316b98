//! This crate provides a platform agnostic no_std measurement engine for the SEN6X sensor modules.
//! The driver is compatible with the [`embedded-hal`](https://crates.io/crates/embedded-hal) traits.
//!
//! The data sheet of the sensor modules can be found [here](https://sensirion.com/resource/datasheet/SEN6x).
//!
//! The driver owns the module's lifecycle. It identifies the connected variant at runtime and
//! applies the persisted calibration on initialization. Afterwards the host calls `poll()` on a
//! fixed cadence.
//!
//! ## Supported Features by Sensor Variant (Blocking & Async)
//!
//! | Functionality                        | SEN60 | SEN63C | SEN65 | SEN66 | SEN68 |
//! |--------------------------------------|-------|--------|-------|-------|-------|
//! | Start/stop measurement               | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Data ready gated polling             | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Measured values                      | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Raw measured values                  | ✗     | ✓      | ✓     | ✓     | ✓     |
//! | Number concentration values          | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Automatic identification (AUTO)      | ✗     | ✓      | ✓     | ✓     | ✓     |
//! | Temperature compensation             | ✗     | ✓      | ✓     | ✓     | ✓     |
//! | Product name / firmware version      | ✗     | ✓      | ✓     | ✓     | ✓     |
//! | Serial number                        | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Read/clear device status             | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Device reset                         | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Fan cleaning                         | ✓     | ✓      | ✓     | ✓     | ✓     |
//! | Activate SHT heater                  | ✗     | ✓      | ✓     | ✓     | ✓     |
//! | VOC/NOx algorithm tuning and state   | ✗     | ✗      | ✓     | ✓     | ✓     |
//! | CO2 calibration, pressure, altitude  | ✗     | ✓      | ✗     | ✓     | ✗     |
//!
//! ## Usage
//!
//! By default, the driver is in blocking mode. To access the async mode variant, enable the `async` feature.
//! Both façades share the same configuration, state machine and decoding.
//!
//! ```rust,ignore
//! use sen6x_driver::{DriverConfig, PollOutcome, Variant};
//! use sen6x_driver::blocking::Sen6X;
//!
//! let config = DriverConfig::default().with_variant(Variant::Auto);
//! let mut sensor = Sen6X::with_config(delay, i2c, config, sen6x_driver::NoStore);
//! sensor.init()?;
//! sensor.start_measurement()?;
//! loop {
//!     if let PollOutcome::Sample(readings) = sensor.poll()? {
//!         for reading in readings.iter() {
//!             // publish reading.value() if reading.is_valid()
//!         }
//!     }
//!     // wait for `sensor.update_interval_ms()`
//! }
//! ```
//!
//! ## Crate features
//!
//! * `async`: async façade based on `embedded-hal-async`
//! * `defmt`: `defmt::Format` for all public types and `defmt` logging
//! * `log`: logging through the `log` facade
//! * `serde`: (de)serialization of configuration and baseline types
//! * `std`: `std::error::Error` implementations through `thiserror`
//!
//! ## Unit tests
//! To run the unit tests for all feature combinations, use the following command:
//! ```bash
//! cargo xtask test-features
//! ```
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

#[macro_use]
mod fmt;

#[cfg(feature = "async")]
pub mod asynchronous;

pub mod blocking;

mod calibration;
mod channel;
mod codec;
mod config;
mod crc_internal;
mod state;
mod transport;
mod variant;

pub use calibration::{
    AlgorithmTuningParameters, Baseline, BaselineStore, CalibrationStore, MemoryStore, NoStore,
    TempAccelPars, TemperatureCompensation,
};
pub use channel::{Channel, ChannelReading, ChannelSet, Readings, Unit, Validity};
pub use codec::{CommandFrame, Frame};
pub use config::DriverConfig;
pub use state::{DeviceInfo, DeviceStatus, DriverState, FirmwareVersion, PollOutcome};
pub use variant::{Command, Variant};

/// Default I2C address of the SEN6X modules.
pub const DEFAULT_ADDRESS: u8 = 0x6B;

/// Shorthand for all functions returning an error in this crate.
pub type Result<T> = core::result::Result<T, Sen6xError>;

/// Failure of a single bus transaction.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum BusError {
    /// The module did not acknowledge its address or data
    #[cfg_attr(feature = "std", error("The SEN6x module did not acknowledge"))]
    Nack,
    /// The reply did not arrive within the bus timeout
    #[cfg_attr(feature = "std", error("Timeout while talking to the SEN6x module"))]
    Timeout,
    /// Any other bus level failure (arbitration loss, overrun, ...)
    #[cfg_attr(feature = "std", error("I2C bus error"))]
    Bus,
}

/// Failure while decoding a reply frame.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum CodecError {
    /// The CRC of a single word did not match
    #[cfg_attr(feature = "std", error("CRC failure on SEN6x data"))]
    ChecksumMismatch,
    /// Fewer bytes arrived than the command produces
    #[cfg_attr(feature = "std", error("The SEN6x module returned a short frame"))]
    ShortFrame,
}

/// Failure to resolve the connected module variant.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum IdentifyError {
    /// The reported product name matches no known variant
    #[cfg_attr(feature = "std", error("Unknown device connected"))]
    UnknownDevice,
}

/// Requests rejected by the state machine. These never change the state.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum DriverError {
    /// A measurement is already running
    #[cfg_attr(feature = "std", error("The SEN6x module is already measuring"))]
    AlreadyMeasuring,
    /// The module is measuring or busy with a maintenance operation
    #[cfg_attr(feature = "std", error("The SEN6x module is busy"))]
    Busy,
    /// The sensor module is in a state that does not permit this command
    #[cfg_attr(
        feature = "std",
        error("The SEN6x module is in a state that does not permit this command")
    )]
    InvalidState,
    /// The driver is faulted, only `device_reset()` or `init()` are accepted
    #[cfg_attr(feature = "std", error("The SEN6x driver is faulted"))]
    Faulted,
    /// The resolved variant does not implement this command
    #[cfg_attr(feature = "std", error("Command not supported by this SEN6x variant"))]
    Unsupported,
}

/// Rejected configuration values.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum ValidationError {
    /// A parameter is outside of its documented range
    #[cfg_attr(feature = "std", error("Parameter {0} is out of range"))]
    OutOfRange(&'static str),
    /// The normalized offset slope looks like a percentage (e.g. `5.0` instead of `0.05`)
    #[cfg_attr(
        feature = "std",
        error("The normalized offset slope must not be given as a percentage")
    )]
    PercentageSlope,
}

/// Represents any error that may happen in the driver.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum Sen6xError {
    /// Bus transaction failed
    #[cfg_attr(feature = "std", error(transparent))]
    Bus(BusError),
    /// Reply could not be decoded
    #[cfg_attr(feature = "std", error(transparent))]
    Codec(CodecError),
    /// Variant identification failed
    #[cfg_attr(feature = "std", error(transparent))]
    Identify(IdentifyError),
    /// Request rejected by the state machine
    #[cfg_attr(feature = "std", error(transparent))]
    Driver(DriverError),
    /// Invalid parameter
    #[cfg_attr(feature = "std", error(transparent))]
    Validation(ValidationError),
    /// The baseline storage failed
    #[cfg_attr(feature = "std", error("The baseline storage failed"))]
    Storage,
    /// The sensor module returned data which could not be parsed
    #[cfg_attr(
        feature = "std",
        error("The SEN6x module returned data which could not be parsed")
    )]
    InvalidData,
}

impl From<BusError> for Sen6xError {
    fn from(e: BusError) -> Self {
        Sen6xError::Bus(e)
    }
}

impl From<CodecError> for Sen6xError {
    fn from(e: CodecError) -> Self {
        Sen6xError::Codec(e)
    }
}

impl From<IdentifyError> for Sen6xError {
    fn from(e: IdentifyError) -> Self {
        Sen6xError::Identify(e)
    }
}

impl From<DriverError> for Sen6xError {
    fn from(e: DriverError) -> Self {
        Sen6xError::Driver(e)
    }
}

impl From<ValidationError> for Sen6xError {
    fn from(e: ValidationError) -> Self {
        Sen6xError::Validation(e)
    }
}

impl Sen6xError {
    /// Errors that only affect the current transaction and are retried on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, Sen6xError::Bus(_) | Sen6xError::Codec(_))
    }
}
