//! # Async API
//!
//! This module contains the async façade of the measurement engine.
//! It is based on the `embedded-hal-async` traits and is intended to be used
//! with async executors such as `embassy`.
//!
//! State handling, decoding and calibration are shared with the blocking
//! façade, only the bus access is awaited.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sen6x_driver::asynchronous::Sen6X;
//! use sen6x_driver::{DriverConfig, NoStore, PollOutcome};
//!
//! let mut sensor = Sen6X::with_config(delay, i2c, DriverConfig::default(), NoStore);
//! sensor.init().await.unwrap();
//! sensor.start_measurement().await.unwrap();
//!
//! loop {
//!     if let Ok(PollOutcome::Sample(readings)) = sensor.poll().await {
//!         for reading in readings.iter() {
//!             println!("{:?}: {:?}", reading.channel, reading.value());
//!         }
//!     }
//!     let interval = sensor.update_interval_ms();
//!     sensor.delay.delay_ms(interval).await;
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
use crate::transport::AsyncTransport;
use crate::variant::{Command, Variant, get_execution_time};
use crate::{
    AlgorithmTuningParameters, Baseline, CodecError, Result, Sen6xError, TempAccelPars,
    TemperatureCompensation,
};

/// Represents an I2C-connected SEN6X sensor module with async operations.
pub struct Sen6X<I2C, D, S = NoStore> {
    /// Delay provider for async delay operations.
    pub delay: D,

    /// I2C transport for communicating with the module asynchronously.
    transport: AsyncTransport<I2C>,

    config: DriverConfig,

    variant: Variant,

    machine: StateMachine,

    calibration: CalibrationStore<S>,

    info: DeviceInfo,
}

impl<I2C, D> Sen6X<I2C, D, NoStore>
where
    D: embedded_hal_async::delay::DelayNs,
    I2C: embedded_hal_async::i2c::I2c,
{
    /// Creates a driver with the default configuration and no baseline storage.
    pub fn new(delay: D, i2c: I2C) -> Self {
        Self::with_config(delay, i2c, DriverConfig::default(), NoStore)
    }
}

impl<I2C, D, S> Sen6X<I2C, D, S>
where
    D: embedded_hal_async::delay::DelayNs,
    I2C: embedded_hal_async::i2c::I2c,
    S: BaselineStore,
{
    /// Creates a driver. Nothing is sent to the module until `init()`.
    pub fn with_config(delay: D, i2c: I2C, config: DriverConfig, storage: S) -> Self {
        Self {
            delay,
            transport: AsyncTransport::new(i2c, config.effective_address()),
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

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Configuration the driver was created with
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn update_interval_ms(&self) -> u32 {
        self.config.update_interval_ms
    }

    pub fn calibration(&self) -> &CalibrationStore<S> {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationStore<S> {
        &mut self.calibration
    }

    pub fn release(self) -> (D, I2C) {
        (self.delay, self.transport.release())
    }

    pub fn enabled_channels(&self) -> ChannelSet {
        self.config.channels.intersection(self.variant.channels())
    }

    /// Bring the module into idle mode, see [`crate::blocking::Sen6X::init`]
    pub async fn init(&mut self) -> Result<()> {
        self.machine.check_init()?;
        let result = self.initialize().await;
        self.fault_on_error(result)
    }

    async fn initialize(&mut self) -> Result<()> {
        self.info = DeviceInfo::default();

        if !self.variant.is_resolved() {
            self.machine.enter(DriverState::Identifying);
            let product_name = self.read_text(Command::GetProductName).await?;
            self.variant = Variant::from_product_name(&product_name)?;
            info!("Identified SEN6x variant {:?}", self.variant);
            self.info.product_name = product_name;
        } else if self.supports(Command::GetProductName) {
            let product_name = self.read_text(Command::GetProductName).await?;
            if Variant::from_product_name(&product_name).ok() != Some(self.variant) {
                warn!("Configured variant {:?} reports a different product name", self.variant);
            }
            self.info.product_name = product_name;
        }

        if self.supports(Command::GetSerialNumber) {
            self.info.serial_number = self.read_text(Command::GetSerialNumber).await?;
        }
        if self.supports(Command::GetVersion) {
            let [version] = self.read_words::<1>(Command::GetVersion).await?;
            self.info.firmware_version = Some(FirmwareVersion::from(version));
        }

        self.machine.enter(DriverState::Idle);
        let baseline = self.calibration.load();
        self.write_calibration(baseline).await
    }

    /// Start continuous measurement (1/second)
    pub async fn start_measurement(&mut self) -> Result<()> {
        self.machine.check_start()?;
        let result = self.send_wait(Command::StartContinuousMeasurement).await;
        self.fault_on_error(result)?;
        self.machine.enter(DriverState::Measuring);
        Ok(())
    }

    /// Stop continuous measurement. Stopping an idle module sends nothing.
    pub async fn stop_measurement(&mut self) -> Result<()> {
        if !self.machine.check_stop()? {
            return Ok(());
        }
        let result = self.send_wait(Command::StopMeasurement).await;
        self.fault_on_error(result)?;
        self.machine.enter(DriverState::Idle);
        Ok(())
    }

    /// One tick of the host's update cycle, see [`crate::blocking::Sen6X::poll`]
    pub async fn poll(&mut self) -> Result<PollOutcome> {
        if let Some(outcome) = self.machine.begin_poll(self.config.update_interval_ms)? {
            return Ok(outcome);
        }

        if self.config.use_data_ready && !self.is_data_ready().await? {
            trace!("No new SEN6x data");
            return Ok(PollOutcome::NotReady);
        }

        let enabled = self.enabled_channels();
        let mut readings = Readings::new();
        for block in state::measurement_blocks(self.variant, enabled) {
            let reply = self.send_wait_read(block.command, block.layout.len()).await;
            if let Err(e) = &reply {
                warn!("Reading {:?} failed: {:?}", block.command, e);
            }
            state::collect_block(&mut readings, &block, enabled, &reply);
        }
        Ok(PollOutcome::Sample(readings))
    }

    /// Check if new data can be retrieved from the sensor module
    pub async fn is_data_ready(&mut self) -> Result<bool> {
        self.machine.require_ready()?;
        let [ready] = self.read_words::<1>(Command::GetDataReady).await?;
        Ok(ready & 0x00FF != 0)
    }

    /// Start the fan cleaning procedure
    pub async fn start_fan_cleaning(&mut self) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send(Command::StartFanCleaning).await;
        self.fault_on_error(result)?;
        self.machine
            .begin_transient(DriverState::FanCleaning, FAN_CLEANING_DURATION_MS);
        Ok(())
    }

    /// Activate the SHT heater
    pub async fn activate_heater(&mut self) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send(Command::ActivateShtHeater).await;
        self.fault_on_error(result)?;
        self.machine.begin_transient(
            DriverState::HeaterActive,
            get_execution_time(Command::ActivateShtHeater),
        );
        Ok(())
    }

    pub async fn read_heater_measurements(&mut self) -> Result<Readings> {
        self.machine.require_idle()?;
        let result = self.read_words::<2>(Command::GetShtHeaterMeasurements).await;
        let [humidity, temperature] = self.fault_on_error(result)?;

        let mut readings = Readings::new();
        readings.insert(channel::decode(Channel::Humidity, Ok(humidity)));
        readings.insert(channel::decode(Channel::Temperature, Ok(temperature)));
        Ok(readings)
    }

    /// Reset the module. Accepted in any state, `init()` has to run afterwards.
    pub async fn device_reset(&mut self) -> Result<()> {
        self.machine.enter(DriverState::Resetting);
        let result = self.send_wait(Command::DeviceReset).await;
        self.fault_on_error(result)?;

        self.variant = self.config.variant;
        self.info = DeviceInfo::default();
        self.machine.enter(DriverState::Uninitialized);
        Ok(())
    }

    /// Read the device status (no clearing of flags!)
    pub async fn read_status(&mut self) -> Result<DeviceStatus> {
        self.read_status_with(Command::ReadDeviceStatus).await
    }

    /// Read the device status and clear the flags
    pub async fn read_and_clear_status(&mut self) -> Result<DeviceStatus> {
        self.read_status_with(Command::ReadAndClearDeviceStatus)
            .await
    }

    async fn read_status_with(&mut self, command: Command) -> Result<DeviceStatus> {
        self.machine.require_ready()?;
        let result = self.read_words::<2>(command).await;
        let status = DeviceStatus::new(self.fault_on_error(result)?, self.variant);
        if status.has_error() {
            warn!("SEN6x reports errors: {:?}", status);
        }
        self.info.set_status(&status);
        Ok(status)
    }

    /// Write the current calibration to the module again, including runtime changes
    pub async fn apply_calibration(&mut self) -> Result<()> {
        self.machine.require_idle()?;
        let baseline = *self.calibration.current();
        let result = self.write_calibration(baseline).await;
        self.fault_on_error(result)
    }

    async fn write_calibration(&mut self, baseline: Baseline) -> Result<()> {

        if !baseline.temperature_compensation.is_zero() {
            if self.supports(Command::SetTempOffsetPars) {
                let data: [u16; 4] = baseline.temperature_compensation.into();
                self.send_write_wait(Command::SetTempOffsetPars, &data)
                    .await?;
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
            self.send_write_wait(Command::VocAlgoTuningPars, &data)
                .await?;
        }
        if let Some(tuning) = self.config.nox_tuning {
            let data: [u16; 6] = tuning.into();
            self.send_write_wait(Command::NoxAlgoTuningPars, &data)
                .await?;
        }
        if let Some(voc_state) = baseline.voc_state {
            self.send_write_wait(Command::VocAlgoState, &voc_state)
                .await?;
        }
        Ok(())
    }

    pub async fn set_temperature_compensation(
        &mut self,
        compensation: TemperatureCompensation,
    ) -> Result<()> {
        self.machine.require_idle()?;
        let data: [u16; 4] = compensation.into();
        let result = self.send_write_wait(Command::SetTempOffsetPars, &data).await;
        self.fault_on_error(result)?;

        let baseline = Baseline {
            temperature_compensation: compensation,
            ..*self.calibration.current()
        };
        self.calibration.save(baseline)?;
        Ok(())
    }

    pub async fn set_temperature_acceleration(&mut self, pars: TempAccelPars) -> Result<()> {
        self.machine.require_idle()?;
        let data: [u16; 4] = pars.into();
        let result = self.send_write_wait(Command::SetTempAccelPars, &data).await;
        self.fault_on_error(result)
    }

    /// Read the current VOC algorithm state and persist it with the compensation
    pub async fn save_baseline(&mut self) -> Result<bool> {
        self.machine.require_ready()?;
        if !self.calibration.store_baseline() {
            return Ok(false);
        }
        let mut baseline = *self.calibration.current();
        if self.variant.has_gas_algorithms() {
            let result = self.read_words::<4>(Command::VocAlgoState).await;
            baseline.voc_state = Some(self.fault_on_error(result)?);
        }
        self.calibration.save(baseline)
    }

    pub async fn get_voc_tuning(&mut self) -> Result<AlgorithmTuningParameters> {
        self.get_tuning(Command::VocAlgoTuningPars).await
    }

    pub async fn set_voc_tuning(&mut self, tuning: AlgorithmTuningParameters) -> Result<()> {
        self.set_tuning(Command::VocAlgoTuningPars, tuning).await
    }

    pub async fn get_nox_tuning(&mut self) -> Result<AlgorithmTuningParameters> {
        self.get_tuning(Command::NoxAlgoTuningPars).await
    }

    pub async fn set_nox_tuning(&mut self, tuning: AlgorithmTuningParameters) -> Result<()> {
        self.set_tuning(Command::NoxAlgoTuningPars, tuning).await
    }

    async fn get_tuning(&mut self, command: Command) -> Result<AlgorithmTuningParameters> {
        self.machine.require_idle()?;
        let result = self.read_words::<6>(command).await;
        Ok(AlgorithmTuningParameters::from(self.fault_on_error(result)?))
    }

    async fn set_tuning(
        &mut self,
        command: Command,
        tuning: AlgorithmTuningParameters,
    ) -> Result<()> {
        self.machine.require_idle()?;
        let data: [u16; 6] = tuning.into();
        let result = self.send_write_wait(command, &data).await;
        self.fault_on_error(result)
    }

    pub async fn get_voc_state(&mut self) -> Result<[u16; 4]> {
        self.machine.require_ready()?;
        let result = self.read_words::<4>(Command::VocAlgoState).await;
        self.fault_on_error(result)
    }

    pub async fn set_voc_state(&mut self, voc_state: [u16; 4]) -> Result<()> {
        self.machine.require_idle()?;
        let result = self.send_write_wait(Command::VocAlgoState, &voc_state).await;
        self.fault_on_error(result)
    }

    /// Perform a forced CO2 recalibration, returns the correction reported by the module
    pub async fn perform_forced_co2_recalibration(&mut self, target_ppm: u16) -> Result<u16> {
        self.machine.require_idle()?;
        let result = match self
            .send_write_wait_read(Command::PerformForcedCo2Recalibration, &[target_ppm], 1)
            .await
        {
            Ok(frame) => frame.word(0).map_err(Sen6xError::from),
            Err(e) => Err(e),
        };
        let correction = self.fault_on_error(result)?;
        if correction == 0xFFFF {
            warn!("Forced CO2 recalibration failed");
            return Err(Sen6xError::InvalidData);
        }
        Ok(correction)
    }

    pub async fn get_co2_auto_calibration(&mut self) -> Result<bool> {
        self.machine.require_idle()?;
        let result = self
            .read_words::<1>(Command::Co2SensorAutoCalibrationState)
            .await;
        let [enabled] = self.fault_on_error(result)?;
        Ok(enabled & 0x00FF != 0)
    }

    pub async fn set_co2_auto_calibration(&mut self, enabled: bool) -> Result<()> {
        self.machine.require_idle()?;
        let result = self
            .send_write_wait(Command::Co2SensorAutoCalibrationState, &[u16::from(enabled)])
            .await;
        self.fault_on_error(result)
    }

    pub async fn get_ambient_pressure(&mut self) -> Result<u16> {
        self.machine.require_ready()?;
        let result = self.read_words::<1>(Command::AmbientPressure).await;
        let [pressure] = self.fault_on_error(result)?;
        Ok(pressure)
    }

    pub async fn set_ambient_pressure(&mut self, pressure_hpa: u16) -> Result<()> {
        self.machine.require_ready()?;
        let result = self
            .send_write_wait(Command::AmbientPressure, &[pressure_hpa])
            .await;
        self.fault_on_error(result)
    }

    pub async fn get_altitude(&mut self) -> Result<u16> {
        self.machine.require_idle()?;
        let result = self.read_words::<1>(Command::SensorAltitude).await;
        let [altitude] = self.fault_on_error(result)?;
        Ok(altitude)
    }

    pub async fn set_altitude(&mut self, altitude_m: u16) -> Result<()> {
        self.machine.require_idle()?;
        let result = self
            .send_write_wait(Command::SensorAltitude, &[altitude_m])
            .await;
        self.fault_on_error(result)
    }

    fn supports(&self, command: Command) -> bool {
        self.variant.opcode(command).is_some()
    }

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

    async fn send(&mut self, command: Command) -> Result<()> {
        let frame = self.variant.frame(command, &[], 0)?;
        self.transport.write(&frame.encode()).await?;
        Ok(())
    }

    async fn send_wait(&mut self, command: Command) -> Result<()> {
        let frame = self.variant.frame(command, &[], 0)?;
        self.execute(&frame).await.map(|_| ())
    }

    async fn send_wait_read(&mut self, command: Command, words: usize) -> Result<Frame> {
        let frame = self.variant.frame(command, &[], words)?;
        self.execute(&frame).await
    }

    async fn send_write_wait(&mut self, command: Command, data: &[u16]) -> Result<()> {
        let frame = self.variant.frame(command, data, 0)?;
        self.execute(&frame).await.map(|_| ())
    }

    async fn send_write_wait_read(
        &mut self,
        command: Command,
        data: &[u16],
        words: usize,
    ) -> Result<Frame> {
        let frame = self.variant.frame(command, data, words)?;
        self.execute(&frame).await
    }

    async fn execute(&mut self, frame: &CommandFrame) -> Result<Frame> {
        let length = frame.reply_len();
        if length > MAX_RX_BYTES {
            return Err(CodecError::ShortFrame.into());
        }

        self.transport.write(&frame.encode()).await?;
        self.delay.delay_ms(frame.execution_time_ms).await;

        let mut raw_data = [0u8; MAX_RX_BYTES];
        if length > 0 {
            self.transport.read(&mut raw_data[..length]).await?;
        }
        Ok(Frame::decode(&raw_data[..length], frame.reply_words)?)
    }

    async fn read_words<const N: usize>(&mut self, command: Command) -> Result<[u16; N]> {
        let frame = self.send_wait_read(command, N).await?;
        let mut data = [0u16; N];
        for (slot, word) in data.iter_mut().zip(frame.iter()) {
            *slot = word?;
        }
        Ok(data)
    }

    async fn read_text(&mut self, command: Command) -> Result<heapless::String<32>> {
        self.send_wait_read(command, 16).await?.to_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DriverError, IdentifyError, MemoryStore, Validity};
    use embedded_hal_mock::eh1::{
        delay::NoopDelay as DelayMock,
        i2c::{Mock as I2cMock, Transaction as I2cTransaction},
    };
    use futures::executor::block_on;

    const ADDR: u8 = 0x6B;

    // Same helpers as the blocking tests
    const CRC_ALGO: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_NRSC_5);

    // Helper macro to generate data bytes with correct CRC
    macro_rules! bytes_with_crc {
        ($msb:expr, $lsb:expr) => {{
            let data = [$msb, $lsb];
            let crc = CRC_ALGO.checksum(&data);
            vec![$msb, $lsb, crc]
        }};
    }

    // Helper to combine multiple bytes with CRC
    macro_rules! combine_bytes_with_crc {
        ($( [$msb:expr, $lsb:expr] ),* $(,)?) => {{
            let mut result = Vec::new();
            $(
                let mut bytes = bytes_with_crc!($msb, $lsb);
                result.append(&mut bytes);
            )*
            result
        }};
    }

    fn text_reply(text: &str) -> Vec<u8> {
        let mut bytes = [0u8; 32];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        bytes
            .chunks(2)
            .flat_map(|pair| bytes_with_crc!(pair[0], pair[1]))
            .collect()
    }

    fn sen65_config() -> DriverConfig {
        DriverConfig::default()
            .with_variant(Variant::Sen65)
            .with_update_interval_ms(1000)
            .with_channels(ChannelSet::from_channels(&[
                Channel::Pm2_5,
                Channel::Temperature,
                Channel::VocIndex,
            ]))
    }

    fn sensor_in(
        state: DriverState,
        config: DriverConfig,
        expectations: &[I2cTransaction],
    ) -> Sen6X<I2cMock, DelayMock> {
        let mut sensor = Sen6X::with_config(
            DelayMock::new(),
            I2cMock::new(expectations),
            config,
            NoStore,
        );
        sensor.machine.enter(state);
        sensor
    }

    #[test]
    fn test_new_async() {
        let mut sensor = Sen6X::new(DelayMock::new(), I2cMock::new(&[]));

        // Verify the initial state
        assert_eq!(sensor.state(), DriverState::Uninitialized);

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_init_identifies_variant_async() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xD0, 0x14]),
            I2cTransaction::read(ADDR, text_reply("SEN68")),
            I2cTransaction::write(ADDR, vec![0xD0, 0x33]),
            I2cTransaction::read(ADDR, text_reply("0123456789")),
            I2cTransaction::write(ADDR, vec![0xD1, 0x00]),
            I2cTransaction::read(ADDR, bytes_with_crc!(0x02, 0x00)),
        ];
        let mut sensor = Sen6X::new(DelayMock::new(), I2cMock::new(&expectations));

        assert!(block_on(sensor.init()).is_ok());
        assert_eq!(sensor.state(), DriverState::Idle);
        assert_eq!(sensor.variant(), Variant::Sen68);
        assert!(sensor.enabled_channels().contains(Channel::Hcho));
        assert_eq!(sensor.device_info().serial_number.as_str(), "0123456789");

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_init_unknown_device_async() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xD0, 0x14]),
            I2cTransaction::read(ADDR, text_reply("STC31")),
        ];
        let mut sensor = Sen6X::new(DelayMock::new(), I2cMock::new(&expectations));

        assert_eq!(
            block_on(sensor.init()),
            Err(Sen6xError::Identify(IdentifyError::UnknownDevice))
        );
        assert!(sensor.is_faulted());

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_measurement_cycle_async() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x00, 0x21]),
            I2cTransaction::write(ADDR, vec![0x02, 0x02]),
            I2cTransaction::read(ADDR, bytes_with_crc!(0x00, 0x00)),
            I2cTransaction::write(ADDR, vec![0x02, 0x02]),
            I2cTransaction::read(ADDR, bytes_with_crc!(0x00, 0x01)),
            I2cTransaction::write(ADDR, vec![0x04, 0x46]),
            I2cTransaction::read(
                ADDR,
                combine_bytes_with_crc!(
                    [0x00, 0x0A], // PM1.0
                    [0x00, 0x0F], // PM2.5 = 1.5 μg/m³
                    [0x00, 0x14], // PM4.0
                    [0x00, 0x19], // PM10
                    [0x13, 0x88], // Humidity
                    [0xFF, 0x38], // Temperature = -1.0 °C (-200)
                    [0x03, 0xE8], // VOC = 100.0
                    [0x00, 0x0A], // NOx
                ),
            ),
            I2cTransaction::write(ADDR, vec![0x01, 0x04]),
        ];
        let mut sensor = sensor_in(DriverState::Idle, sen65_config(), &expectations);

        assert!(block_on(sensor.start_measurement()).is_ok());
        assert_eq!(block_on(sensor.poll()), Ok(PollOutcome::NotReady));

        let PollOutcome::Sample(readings) = block_on(sensor.poll()).unwrap() else {
            panic!("expected a sample");
        };
        assert_eq!(readings.len(), 3);
        assert_eq!(readings.value(Channel::Pm2_5), Some(1.5));
        assert_eq!(readings.value(Channel::Temperature), Some(-1.0));
        assert_eq!(readings.value(Channel::VocIndex), Some(100.0));
        assert!(readings.get(Channel::Humidity).is_none());

        assert!(block_on(sensor.stop_measurement()).is_ok());
        assert!(block_on(sensor.stop_measurement()).is_ok());
        assert_eq!(sensor.state(), DriverState::Idle);

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_checksum_error_async() {
        let mut sample = combine_bytes_with_crc!(
            [0x00, 0x0A],
            [0x00, 0x0F],
            [0x00, 0x14],
            [0x00, 0x19],
            [0x13, 0x88],
            [0x13, 0x88],
            [0x03, 0xE8],
            [0x00, 0x0A],
        );
        // PM2.5 checksum
        sample[5] ^= 0x10;
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x04, 0x46]),
            I2cTransaction::read(ADDR, sample),
        ];
        let config = sen65_config().with_data_ready(false);
        let mut sensor = sensor_in(DriverState::Measuring, config, &expectations);

        let PollOutcome::Sample(readings) = block_on(sensor.poll()).unwrap() else {
            panic!("expected a sample");
        };
        assert_eq!(readings.invalid_count(), 1);
        assert_eq!(
            readings.get(Channel::Pm2_5).unwrap().validity,
            Validity::ChecksumMismatch
        );
        assert_eq!(readings.value(Channel::Temperature), Some(25.0));

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_fan_cleaning_rejected_while_measuring_async() {
        let mut sensor = sensor_in(DriverState::Measuring, sen65_config(), &[]);

        assert_eq!(
            block_on(sensor.start_fan_cleaning()),
            Err(Sen6xError::Driver(DriverError::Busy))
        );

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_device_reset_async() {
        let expectations = [I2cTransaction::write(ADDR, vec![0xD3, 0x04])];
        let mut sensor = sensor_in(DriverState::Measuring, sen65_config(), &expectations);

        assert!(block_on(sensor.device_reset()).is_ok());
        assert_eq!(sensor.state(), DriverState::Uninitialized);

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_save_baseline_async() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x61, 0x81]),
            I2cTransaction::read(
                ADDR,
                combine_bytes_with_crc!([0x00, 0x05], [0x00, 0x06], [0x00, 0x07], [0x00, 0x08]),
            ),
        ];
        let mut sensor = Sen6X::with_config(
            DelayMock::new(),
            I2cMock::new(&expectations),
            sen65_config(),
            MemoryStore::default(),
        );
        sensor.machine.enter(DriverState::Idle);

        assert_eq!(block_on(sensor.save_baseline()), Ok(true));
        assert_eq!(sensor.calibration().storage().writes(), 1);

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_sen60_init_and_poll_async() {
        const SEN60_ADDR: u8 = 0x6C;
        let expectations = [
            I2cTransaction::write(SEN60_ADDR, vec![0x36, 0x82]),
            I2cTransaction::read(SEN60_ADDR, text_reply("SEN60-0001")),
            I2cTransaction::write(SEN60_ADDR, vec![0x21, 0x52]),
            I2cTransaction::write(SEN60_ADDR, vec![0xE4, 0xB8]),
            I2cTransaction::read(SEN60_ADDR, bytes_with_crc!(0x00, 0x01)),
            I2cTransaction::write(SEN60_ADDR, vec![0xEC, 0x05]),
            I2cTransaction::read(
                SEN60_ADDR,
                combine_bytes_with_crc!(
                    [0x00, 0x0A], // PM1.0
                    [0x00, 0x0F], // PM2.5 = 1.5 μg/m³
                    [0x00, 0x14], // PM4.0
                    [0x00, 0x19], // PM10
                    [0x00, 0x64], // NC0.5 = 10.0 #/cm³
                    [0x00, 0x78], // NC1.0
                    [0x00, 0x82], // NC2.5
                    [0x00, 0x8C], // NC4.0
                    [0x00, 0x96], // NC10 = 15.0 #/cm³
                ),
            ),
        ];
        let config = DriverConfig::default()
            .with_variant(Variant::Sen60)
            .with_update_interval_ms(1000);
        let mut sensor = Sen6X::with_config(
            DelayMock::new(),
            I2cMock::new(&expectations),
            config,
            NoStore,
        );

        assert!(block_on(sensor.init()).is_ok());
        assert_eq!(sensor.device_info().serial_number.as_str(), "SEN60-0001");
        assert_eq!(sensor.device_info().firmware_version, None);

        assert!(block_on(sensor.start_measurement()).is_ok());
        let PollOutcome::Sample(readings) = block_on(sensor.poll()).unwrap() else {
            panic!("expected a sample");
        };
        assert_eq!(readings.len(), 9);
        assert_eq!(readings.invalid_count(), 0);
        assert_eq!(readings.value(Channel::Nc0_5), Some(10.0));
        assert_eq!(readings.value(Channel::Nc10_0), Some(15.0));

        sensor.transport.i2c.done();
    }

    #[test]
    fn test_apply_calibration_keeps_runtime_compensation_async() {
        let compensation = TemperatureCompensation::new(1.5, 0.0, 0).unwrap();
        let write = I2cTransaction::write(
            ADDR,
            [
                vec![0x60, 0xB2],
                combine_bytes_with_crc!([0x01, 0x2C], [0x00, 0x00], [0x00, 0x00], [0x00, 0x00]),
            ]
            .concat(),
        );
        let expectations = [write.clone(), write];
        let mut sensor = Sen6X::with_config(
            DelayMock::new(),
            I2cMock::new(&expectations),
            sen65_config().with_store_baseline(false),
            MemoryStore::default(),
        );
        sensor.machine.enter(DriverState::Idle);

        assert!(block_on(sensor.set_temperature_compensation(compensation)).is_ok());
        assert!(block_on(sensor.apply_calibration()).is_ok());
        assert_eq!(
            sensor.calibration().current().temperature_compensation,
            compensation
        );

        sensor.transport.i2c.done();
    }
}
