//! # Blocking API
//!
//! This module contains the blocking façade of the measurement engine.
//! It is based on the `embedded-hal` traits and is intended to be used
//! with synchronous blocking code.
//!
//! The methods usually return `Result` with the error type being `Sen6xError`.
//! Requests that are not legal in the current [`DriverState`] are rejected
//! with a [`DriverError`] before anything is sent to the module.
//!
//! ## Examples
//!
//! ### Create a driver instance
//!
//! ```rust,ignore
//! use sen6x_driver::blocking::Sen6X;
//!
//! // These would be your actual implementations
//! let i2c = MyI2C::new();
//! let delay = MyDelay::new();
//!
//! // Driver with the default configuration, the variant is identified by `init()`
//! let mut sensor = Sen6X::new(delay, i2c);
//! sensor.init().unwrap();
//! ```
//!
//! ### Read samples
//!
//! ```rust,ignore
//! use sen6x_driver::blocking::Sen6X;
//! use sen6x_driver::{DriverConfig, NoStore, PollOutcome, Variant};
//!
//! let config = DriverConfig::default()
//!     .with_variant(Variant::Sen66)
//!     .with_update_interval_ms(1000);
//! let mut sensor = Sen6X::with_config(delay, i2c, config, NoStore);
//! sensor.init().unwrap();
//! sensor.start_measurement().unwrap();
//!
//! loop {
//!     match sensor.poll() {
//!         Ok(PollOutcome::Sample(readings)) => {
//!             for reading in readings.iter().filter(|r| r.is_valid()) {
//!                 println!("{:?}: {:?} {}", reading.channel, reading.value(), reading.unit().symbol());
//!             }
//!         }
//!         Ok(_) => {}
//!         Err(e) => println!("poll failed: {:?}", e),
//!     }
//!     delay2.delay_ms(sensor.update_interval_ms());
//! }
//! ```

use crate::calibration::{BaselineStore, CalibrationStore, NoStore};
use crate::channel::{self, Channel, ChannelSet, Readings};
use crate::codec::{CommandFrame, Frame, MAX_RX_BYTES};
use crate::config::DriverConfig;
use crate::state::{
    self, DeviceInfo, DeviceStatus, DriverState, FAN_CLEANING_DURATION_MS, FirmwareVersion,
    PollOutcome, StateMachine,
};
use crate::transport::Transport;
use crate::variant::{Command, Variant, get_execution_time};
use crate::{
    AlgorithmTuningParameters, Baseline, CodecError, Result, Sen6xError, TempAccelPars,
    TemperatureCompensation,
};

/// Represents an I2C-connected SEN6X sensor module.
#[derive(Debug)]
pub struct Sen6X<I2C, D, S = NoStore> {
    /// Delay provider for the command execution times
    delay: D,

    /// I2C transport for communicating with the module
    transport: Transport<I2C>,

    config: DriverConfig,

    /// Configured variant, or the identified one after `init()`
    variant: Variant,

    machine: StateMachine,

    calibration: CalibrationStore<S>,

    info: DeviceInfo,
}

impl<I2C, D> Sen6X<I2C, D, NoStore>
where
    D: embedded_hal::delay::DelayNs,
    I2C: embedded_hal::i2c::I2c,
{
    /// Creates a driver with the default configuration and no baseline storage.
    pub fn new(delay: D, i2c: I2C) -> Self {
        Self::with_config(delay, i2c, DriverConfig::default(), NoStore)
    }
}

impl<I2C, D, S> Sen6X<I2C, D, S>
where
    D: embedded_hal::delay::DelayNs,
    I2C: embedded_hal::i2c::I2c,
    S: BaselineStore,
{
    /// Creates a driver. Nothing is sent to the module until `init()`.
    pub fn with_config(delay: D, i2c: I2C, config: DriverConfig, storage: S) -> Self {
        Self {
            delay,
            transport: Transport::new(i2c, config.effective_address()),
            config,
            variant: config.variant,
            machine: StateMachine::new(),
            calibration: CalibrationStore::new(
                storage,
                config.store_baseline,
                config.temperature_compensation,
            ),
            info: DeviceInfo::default(),
        }
    }

    /// Current lifecycle state of the driver
    pub fn state(&self) -> DriverState {
        self.machine.state()
    }

    /// Whether a failure left the driver faulted, only `init()` or `device_reset()` recover
    pub fn is_faulted(&self) -> bool {
        self.machine.state() == DriverState::Faulted
    }

    /// The configured variant, or the identified one once `init()` succeeded
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Configuration the driver was created with
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Product name, serial number, firmware version and last status
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Cadence at which the host is expected to call `poll()`
    pub fn update_interval_ms(&self) -> u32 {
        self.config.update_interval_ms
    }

    pub fn calibration(&self) -> &CalibrationStore<S> {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationStore<S> {
        &mut self.calibration
    }

    /// Give back the peripherals
    pub fn release(self) -> (D, I2C) {
        (self.delay, self.transport.release())
    }

    /// Channels published by `poll()`: the configured ones the variant provides
    pub fn enabled_channels(&self) -> ChannelSet {
        self.config.channels.intersection(self.variant.channels())
    }

    /// Bring the module into idle mode.
    ///
    /// Identifies the variant if configured as `Auto`, reads the device
    /// information and applies the stored calibration. Accepted in the
    /// uninitialized and the faulted state.
    pub fn init(&mut self) -> Result<()> {
        self.machine.check_init()?;
        let result = self.initialize();
        self.fault_on_error(result)
    }

    fn initialize(&mut self) -> Result<()> {
        self.info = DeviceInfo::default();

        if !self.variant.is_resolved() {
            self.machine.enter(DriverState::Identifying);
            let product_name = self.read_text(Command::GetProductName)?;
            self.variant = Variant::from_product_name(&product_name)?;
            info!("Identified SEN6x variant {:?}", self.variant);
            self.info.product_name = product_name;
        } else if self.supports(Command::GetProductName) {
            let product_name = self.read_text(Command::GetProductName)?;
            if Variant::from_product_name(&product_name).ok() != Some(self.variant) {
                warn!("Configured variant {:?} reports a different product name", self.variant);
            }
            self.info.product_name = product_name;
        }

        if self.supports(Command::GetSerialNumber) {
            self.info.serial_number = self.read_text(Command::GetSerialNumber)?;
        }
        if self.supports(Command::GetVersion) {
            let [version] = self.read_words::<1>(Command::GetVersion)?;
            self.info.firmware_version = Some(FirmwareVersion::from(version));
        }
        info!(
            "SEN6x product {} serial {}",
            self.info.product_name.as_str(),
            self.info.serial_number.as_str()
        );

        self.machine.enter(DriverState::Idle);
        let baseline = self.calibration.load();
        self.write_calibration(baseline)
    }

    /// Start continuous measurement (1/second)
    pub fn start_measurement(&mut self) -> Result<()> {
        self.machine.check_start()?;
        let result = self.send_wait(Command::StartContinuousMeasurement);
        self.fault_on_error(result)?;
        self.machine.enter(DriverState::Measuring);
        Ok(())
    }

    /// Stop continuous measurement. Stopping an idle module sends nothing.
    pub fn stop_measurement(&mut self) -> Result<()> {
        if !self.machine.check_stop()? {
            return Ok(());
        }
        let result = self.send_wait(Command::StopMeasurement);
        self.fault_on_error(result)?;
        self.machine.enter(DriverState::Idle);
        Ok(())
    }

    /// One tick of the host's update cycle.
    ///
    /// While measuring, this optionally checks the data ready flag and reads
    /// the blocks holding the enabled channels. A failed data ready check is
    /// returned as an error without changing the state. During fan cleaning or
    /// heating it counts the update interval off the remaining duration.
    pub fn poll(&mut self) -> Result<PollOutcome> {
        if let Some(outcome) = self.machine.begin_poll(self.config.update_interval_ms)? {
            return Ok(outcome);
        }

        if self.config.use_data_ready && !self.is_data_ready()? {
            trace!("No new SEN6x data");
            return Ok(PollOutcome::NotReady);
        }

        let enabled = self.enabled_channels();
        let mut readings = Readings::new();
        for block in state::measurement_blocks(self.variant, enabled) {
            let reply = self.send_wait_read(block.command, block.layout.len());
            if let Err(e) = &reply {
                warn!("Reading {:?} failed: {:?}", block.command, e);
            }
            state::collect_block(&mut readings, &block, enabled, &reply);
        }
        Ok(PollOutcome::Sample(readings))
    }

    /// Check if new data can be retrieved from the sensor module
    pub fn is_data_ready(&mut self) -> Result<bool> {
        self.machine.require_ready()?;
        let [ready] = self.read_words::<1>(Command::GetDataReady)?;
        Ok(ready & 0x00FF != 0)
    }

    /// Start the fan cleaning procedure, `poll()` reports when it has finished
    pub fn start_fan_cleaning(&mut self) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send(Command::StartFanCleaning);
        self.fault_on_error(result)?;
        self.machine
            .begin_transient(DriverState::FanCleaning, FAN_CLEANING_DURATION_MS);
        Ok(())
    }

    /// Activate the SHT heater, `poll()` reports when it has finished
    pub fn activate_heater(&mut self) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send(Command::ActivateShtHeater);
        self.fault_on_error(result)?;
        self.machine.begin_transient(
            DriverState::HeaterActive,
            get_execution_time(Command::ActivateShtHeater),
        );
        Ok(())
    }

    /// Humidity and temperature measured at the end of the last heater cycle
    pub fn read_heater_measurements(&mut self) -> Result<Readings> {
        self.machine.require_idle()?;
        let result = self.read_words::<2>(Command::GetShtHeaterMeasurements);
        let [humidity, temperature] = self.fault_on_error(result)?;

        let mut readings = Readings::new();
        readings.insert(channel::decode(Channel::Humidity, Ok(humidity)));
        readings.insert(channel::decode(Channel::Temperature, Ok(temperature)));
        Ok(readings)
    }

    /// Reset the module. Accepted in any state, `init()` has to run afterwards.
    pub fn device_reset(&mut self) -> Result<()> {
        self.machine.enter(DriverState::Resetting);
        let result = self.send_wait(Command::DeviceReset);
        self.fault_on_error(result)?;

        self.variant = self.config.variant;
        self.info = DeviceInfo::default();
        self.machine.enter(DriverState::Uninitialized);
        Ok(())
    }

    /// Read the device status (no clearing of flags!)
    pub fn read_status(&mut self) -> Result<DeviceStatus> {
        self.read_status_with(Command::ReadDeviceStatus)
    }

    /// Read the device status and clear the flags
    pub fn read_and_clear_status(&mut self) -> Result<DeviceStatus> {
        self.read_status_with(Command::ReadAndClearDeviceStatus)
    }

    fn read_status_with(&mut self, command: Command) -> Result<DeviceStatus> {
        self.machine.require_ready()?;
        let result = self.read_words::<2>(command);
        let status = DeviceStatus::new(self.fault_on_error(result)?, self.variant);
        if status.has_error() {
            warn!("SEN6x reports errors: {:?}", status);
        }
        self.info.set_status(&status);
        Ok(status)
    }

    /// Write the current calibration to the module again, including runtime changes
    pub fn apply_calibration(&mut self) -> Result<()> {
        self.machine.require_idle()?;
        let baseline = *self.calibration.current();
        let result = self.write_calibration(baseline);
        self.fault_on_error(result)
    }

    fn write_calibration(&mut self, baseline: Baseline) -> Result<()> {

        if !baseline.temperature_compensation.is_zero() {
            if self.supports(Command::SetTempOffsetPars) {
                let data: [u16; 4] = baseline.temperature_compensation.into();
                self.send_write_wait(Command::SetTempOffsetPars, &data)?;
            } else {
                warn!("{:?} has no temperature compensation", self.variant);
            }
        }

        if !self.variant.has_gas_algorithms() {
            if self.config.voc_tuning.is_some() || self.config.nox_tuning.is_some() {
                warn!("{:?} has no gas index algorithms, tuning ignored", self.variant);
            }
            return Ok(());
        }
        if let Some(tuning) = self.config.voc_tuning {
            let data: [u16; 6] = tuning.into();
            self.send_write_wait(Command::VocAlgoTuningPars, &data)?;
        }
        if let Some(tuning) = self.config.nox_tuning {
            let data: [u16; 6] = tuning.into();
            self.send_write_wait(Command::NoxAlgoTuningPars, &data)?;
        }
        if let Some(voc_state) = baseline.voc_state {
            debug!("Restoring VOC algorithm state");
            self.send_write_wait(Command::VocAlgoState, &voc_state)?;
        }
        Ok(())
    }

    /// Set the temperature compensation and persist it if `store_baseline` is enabled
    pub fn set_temperature_compensation(
        &mut self,
        compensation: TemperatureCompensation,
    ) -> Result<()> {
        self.machine.require_idle()?;
        let data: [u16; 4] = compensation.into();
        let result = self.send_write_wait(Command::SetTempOffsetPars, &data);
        self.fault_on_error(result)?;

        let baseline = Baseline {
            temperature_compensation: compensation,
            ..*self.calibration.current()
        };
        self.calibration.save(baseline)?;
        Ok(())
    }

    /// Set the temperature acceleration parameters (volatile)
    pub fn set_temperature_acceleration(&mut self, pars: TempAccelPars) -> Result<()> {
        self.machine.require_idle()?;
        let data: [u16; 4] = pars.into();
        let result = self.send_write_wait(Command::SetTempAccelPars, &data);
        self.fault_on_error(result)
    }

    /// Read the current VOC algorithm state and persist it with the compensation.
    ///
    /// Returns whether anything was written to the storage.
    pub fn save_baseline(&mut self) -> Result<bool> {
        self.machine.require_ready()?;
        if !self.calibration.store_baseline() {
            return Ok(false);
        }
        let mut baseline = *self.calibration.current();
        if self.variant.has_gas_algorithms() {
            let result = self.read_words::<4>(Command::VocAlgoState);
            baseline.voc_state = Some(self.fault_on_error(result)?);
        }
        self.calibration.save(baseline)
    }

    /// Get the VOC algorithm tuning parameters
    pub fn get_voc_tuning(&mut self) -> Result<AlgorithmTuningParameters> {
        self.get_tuning(Command::VocAlgoTuningPars)
    }

    /// Set the VOC algorithm tuning parameters
    pub fn set_voc_tuning(&mut self, tuning: AlgorithmTuningParameters) -> Result<()> {
        self.set_tuning(Command::VocAlgoTuningPars, tuning)
    }

    /// Get the NOx algorithm tuning parameters
    pub fn get_nox_tuning(&mut self) -> Result<AlgorithmTuningParameters> {
        self.get_tuning(Command::NoxAlgoTuningPars)
    }

    /// Set the NOx algorithm tuning parameters
    pub fn set_nox_tuning(&mut self, tuning: AlgorithmTuningParameters) -> Result<()> {
        self.set_tuning(Command::NoxAlgoTuningPars, tuning)
    }

    fn get_tuning(&mut self, command: Command) -> Result<AlgorithmTuningParameters> {
        self.machine.require_idle()?;
        let result = self.read_words::<6>(command);
        Ok(AlgorithmTuningParameters::from(self.fault_on_error(result)?))
    }

    fn set_tuning(&mut self, command: Command, tuning: AlgorithmTuningParameters) -> Result<()> {
        self.machine.require_idle()?;
        let data: [u16; 6] = tuning.into();
        let result = self.send_write_wait(command, &data);
        self.fault_on_error(result)
    }

    /// Get the VOC algorithm state
    ///
    /// Due to the long initialization phase of the algorithm and no sensor-internal
    /// persistent storing of it's state, the algorithm state ideally should be preserved
    /// between restarts, see [`Self::save_baseline`].
    pub fn get_voc_state(&mut self) -> Result<[u16; 4]> {
        self.machine.require_ready()?;
        let result = self.read_words::<4>(Command::VocAlgoState);
        self.fault_on_error(result)
    }

    /// Set the VOC algorithm state
    pub fn set_voc_state(&mut self, voc_state: [u16; 4]) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send_write_wait(Command::VocAlgoState, &voc_state);
        self.fault_on_error(result)
    }

    /// Perform a forced CO2 recalibration, returns the correction reported by the module
    pub fn perform_forced_co2_recalibration(&mut self, target_ppm: u16) -> Result<u16> {
        self.machine.require_idle()?;
        let result = self
            .send_write_wait_read(Command::PerformForcedCo2Recalibration, &[target_ppm], 1)
            .and_then(|frame| frame.word(0).map_err(Sen6xError::from));
        let correction = self.fault_on_error(result)?;
        if correction == 0xFFFF {
            warn!("Forced CO2 recalibration failed");
            return Err(Sen6xError::InvalidData);
        }
        Ok(correction)
    }

    /// Get the automatic self-calibration state of the CO2 sensor
    pub fn get_co2_auto_calibration(&mut self) -> Result<bool> {
        self.machine.require_idle()?;
        let result = self.read_words::<1>(Command::Co2SensorAutoCalibrationState);
        let [enabled] = self.fault_on_error(result)?;
        Ok(enabled & 0x00FF != 0)
    }

    /// Enable or disable the automatic self-calibration of the CO2 sensor
    pub fn set_co2_auto_calibration(&mut self, enabled: bool) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send_write_wait(
            Command::Co2SensorAutoCalibrationState,
            &[u16::from(enabled)],
        );
        self.fault_on_error(result)
    }

    /// Get the ambient pressure in hPa that is assumed by the sensor
    /// (used by the sensor for pressure compensation)
    pub fn get_ambient_pressure(&mut self) -> Result<u16> {
        self.machine.require_ready()?;
        let result = self.read_words::<1>(Command::AmbientPressure);
        let [pressure] = self.fault_on_error(result)?;
        Ok(pressure)
    }

    /// Set the ambient pressure in hPa, accepted while measuring
    pub fn set_ambient_pressure(&mut self, pressure_hpa: u16) -> Result<()> {
        self.machine.require_ready()?;
        let result = self.send_write_wait(Command::AmbientPressure, &[pressure_hpa]);
        self.fault_on_error(result)
    }

    /// Get the altitude in meters that is assumed by the sensor
    pub fn get_altitude(&mut self) -> Result<u16> {
        self.machine.require_idle()?;
        let result = self.read_words::<1>(Command::SensorAltitude);
        let [altitude] = self.fault_on_error(result)?;
        Ok(altitude)
    }

    /// Set the sensor altitude in meters
    pub fn set_altitude(&mut self, altitude_m: u16) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send_write_wait(Command::SensorAltitude, &[altitude_m]);
        self.fault_on_error(result)
    }

    fn supports(&self, command: Command) -> bool {
        self.variant.opcode(command).is_some()
    }

    /// Transport and decoding failures of an explicit action leave the driver faulted
    fn fault_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if !matches!(
                e,
                Sen6xError::Driver(_) | Sen6xError::Validation(_) | Sen6xError::Storage
            ) {
                self.machine.fault(e);
            }
        }
        result
    }

    /// Send a command without waiting, for commands the state machine times itself
    fn send(&mut self, command: Command) -> Result<()> {
        let frame = self.variant.frame(command, &[], 0)?;
        self.transport.write(&frame.encode())?;
        Ok(())
    }

    /// Send a command to the sensor module and wait for the execution time associated to the command
    fn send_wait(&mut self, command: Command) -> Result<()> {
        let frame = self.variant.frame(command, &[], 0)?;
        self.execute(&frame).map(|_| ())
    }

    /// Send a command, wait for the execution time and read `words` words
    fn send_wait_read(&mut self, command: Command, words: usize) -> Result<Frame> {
        let frame = self.variant.frame(command, &[], words)?;
        self.execute(&frame)
    }

    /// Send command, write data to the sensor module and wait for the execution time
    fn send_write_wait(&mut self, command: Command, data: &[u16]) -> Result<()> {
        let frame = self.variant.frame(command, data, 0)?;
        self.execute(&frame).map(|_| ())
    }

    /// Send command with data in one transaction, wait and read the reply
    fn send_write_wait_read(
        &mut self,
        command: Command,
        data: &[u16],
        words: usize,
    ) -> Result<Frame> {
        let frame = self.variant.frame(command, data, words)?;
        self.execute(&frame)
    }

    fn execute(&mut self, frame: &CommandFrame) -> Result<Frame> {
        let length = frame.reply_len();
        if length > MAX_RX_BYTES {
            return Err(CodecError::ShortFrame.into());
        }

        self.transport.write(&frame.encode())?;
        self.delay.delay_ms(frame.execution_time_ms);

        let mut raw_data = [0u8; MAX_RX_BYTES];
        if length > 0 {
            self.transport.read(&mut raw_data[..length])?;
        }
        Ok(Frame::decode(&raw_data[..length], frame.reply_words)?)
    }

    /// Read exactly `N` words, any checksum failure fails the whole read
    fn read_words<const N: usize>(&mut self, command: Command) -> Result<[u16; N]> {
        let frame = self.send_wait_read(command, N)?;
        let mut data = [0u16; N];
        for (slot, word) in data.iter_mut().zip(frame.iter()) {
            *slot = word?;
        }
        Ok(data)
    }

    fn read_text(&mut self, command: Command) -> Result<heapless::String<32>> {
        self.send_wait_read(command, 16)?.to_text()
    }
}
