//! Measurement state machine shared by the blocking and the async façade.
//!
//! The façades perform the bus traffic, this module decides which requests
//! are legal in which state and which reads make up a measurement cycle.

use core::fmt::Write;

use crate::channel::{self, Channel, ChannelReading, ChannelSet, Readings, Validity};
use crate::codec::Frame;
use crate::variant::{Command, Variant};
use crate::{DriverError, Result, Sen6xError};

/// Duration of the fan cleaning procedure
pub(crate) const FAN_CLEANING_DURATION_MS: u32 = 10_000;

/// Lifecycle of the driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverState {
    /// `init()` has not run (or a reset happened since)
    Uninitialized,
    /// Reading the product name to resolve `Variant::Auto`
    Identifying,
    /// Initialized, no measurement running
    Idle,
    /// Continuous measurement running, `poll()` reads samples
    Measuring,
    /// Fan cleaning in progress
    FanCleaning,
    /// SHT heater active
    HeaterActive,
    /// Device reset in progress
    Resetting,
    /// A transition failed, only `device_reset()` or `init()` are accepted
    Faulted,
}

/// Result of a successful `poll()`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// The module had no new data, nothing was read
    NotReady,
    /// A new sample, one reading per enabled channel of the variant
    Sample(Readings),
    /// A fan cleaning or heater cycle finished, the driver is idle again
    Settled,
}

/// Decoded device status register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStatus {
    /// Both status words, high word first
    pub raw: u32,
    /// Fan speed is too high or too low
    pub fan_speed_warning: bool,
    /// CO2 sensor error
    pub co2_error: bool,
    /// PM sensor error
    pub pm_error: bool,
    /// VOC/NOx sensor error
    pub gas_error: bool,
    /// Humidity/temperature sensor error
    pub rh_t_error: bool,
    /// Fan error
    pub fan_error: bool,
    /// HCHO error
    pub hcho_error: bool,
}

impl DeviceStatus {
    pub(crate) fn new(data: [u16; 2], variant: Variant) -> Self {
        // Non-existing flags in a variant can simply be ignored,
        // only the CO2 error bit moves between variants.
        let co2_bit = match variant {
            Variant::Sen63C => 12,
            _ => 9,
        };
        Self {
            raw: (u32::from(data[0]) << 16) | u32::from(data[1]),
            fan_speed_warning: (data[0] & (1 << 5)) != 0,
            co2_error: (data[1] & (1 << co2_bit)) != 0,
            pm_error: (data[1] & (1 << 11)) != 0,
            gas_error: (data[1] & (1 << 7)) != 0,
            rh_t_error: (data[1] & (1 << 6)) != 0,
            fan_error: (data[1] & (1 << 4)) != 0,
            hcho_error: (data[1] & (1 << 10)) != 0,
        }
    }

    /// Any flag other than the fan speed warning set
    pub fn has_error(&self) -> bool {
        self.co2_error
            || self.pm_error
            || self.gas_error
            || self.rh_t_error
            || self.fan_error
            || self.hcho_error
    }
}

/// Firmware version reported by the module.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl From<u16> for FirmwareVersion {
    fn from(word: u16) -> Self {
        let [major, minor] = word.to_be_bytes();
        Self { major, minor }
    }
}

impl core::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Text outputs of the driver, filled by `init()` and `read_status()`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    pub product_name: heapless::String<32>,
    pub serial_number: heapless::String<32>,
    pub firmware_version: Option<FirmwareVersion>,
    /// Last status register as `0x%08X`
    pub status: heapless::String<10>,
}

impl DeviceInfo {
    pub(crate) fn set_status(&mut self, status: &DeviceStatus) {
        self.status.clear();
        // 10 characters always fit
        let _ = write!(self.status, "0x{:08X}", status.raw);
    }
}

/// Owner of the driver state. Callers request transitions, they never set the state.
#[derive(Copy, Clone, Debug)]
pub(crate) struct StateMachine {
    state: DriverState,
    transient_remaining_ms: u32,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: DriverState::Uninitialized,
            transient_remaining_ms: 0,
        }
    }

    pub(crate) fn state(&self) -> DriverState {
        self.state
    }

    pub(crate) fn enter(&mut self, state: DriverState) {
        if self.state != state {
            debug!("SEN6x state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
    }

    pub(crate) fn fault(&mut self, error: &Sen6xError) {
        error!("SEN6x faulted in {:?}: {:?}", self.state, error);
        self.state = DriverState::Faulted;
        self.transient_remaining_ms = 0;
    }

    /// Rejection for a request that needs an idle module
    fn rejection(&self) -> DriverError {
        match self.state {
            DriverState::Uninitialized => DriverError::InvalidState,
            DriverState::Faulted => DriverError::Faulted,
            _ => DriverError::Busy,
        }
    }

    /// Commands that may only be sent while no measurement is running
    pub(crate) fn require_idle(&self) -> Result<()> {
        match self.state {
            DriverState::Idle => Ok(()),
            _ => Err(self.rejection().into()),
        }
    }

    /// Commands accepted in idle and measuring mode
    pub(crate) fn require_ready(&self) -> Result<()> {
        match self.state {
            DriverState::Idle | DriverState::Measuring => Ok(()),
            _ => Err(self.rejection().into()),
        }
    }

    pub(crate) fn check_init(&self) -> Result<()> {
        match self.state {
            DriverState::Uninitialized | DriverState::Faulted => Ok(()),
            _ => Err(DriverError::InvalidState.into()),
        }
    }

    pub(crate) fn check_start(&self) -> Result<()> {
        match self.state {
            DriverState::Measuring => Err(DriverError::AlreadyMeasuring.into()),
            _ => self.require_idle(),
        }
    }

    /// `Ok(true)` if a stop command has to be sent, `Ok(false)` if already idle
    pub(crate) fn check_stop(&self) -> Result<bool> {
        match self.state {
            DriverState::Measuring => Ok(true),
            DriverState::Idle => Ok(false),
            _ => Err(self.rejection().into()),
        }
    }

    pub(crate) fn begin_transient(&mut self, state: DriverState, duration_ms: u32) {
        self.enter(state);
        self.transient_remaining_ms = duration_ms;
    }

    /// Decide how a poll tick proceeds.
    ///
    /// `Ok(None)` means a measurement cycle has to run. A tick in a transient
    /// state counts `elapsed_ms` off the remaining duration.
    pub(crate) fn begin_poll(&mut self, elapsed_ms: u32) -> Result<Option<PollOutcome>> {
        match self.state {
            DriverState::Measuring => Ok(None),
            DriverState::FanCleaning | DriverState::HeaterActive => {
                self.transient_remaining_ms = self.transient_remaining_ms.saturating_sub(elapsed_ms);
                if self.transient_remaining_ms > 0 {
                    return Err(DriverError::Busy.into());
                }
                info!("SEN6x {:?} finished", self.state);
                self.enter(DriverState::Idle);
                Ok(Some(PollOutcome::Settled))
            }
            DriverState::Identifying | DriverState::Resetting => Err(DriverError::Busy.into()),
            DriverState::Faulted => Err(DriverError::Faulted.into()),
            DriverState::Idle | DriverState::Uninitialized => Err(DriverError::InvalidState.into()),
        }
    }
}

/// One read command of a measurement cycle and the channels its reply carries.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ReadBlock {
    pub(crate) command: Command,
    pub(crate) layout: &'static [Channel],
}

/// Read commands needed to serve the `enabled` channels on `variant`
pub(crate) fn measurement_blocks(
    variant: Variant,
    enabled: ChannelSet,
) -> impl Iterator<Item = ReadBlock> {
    [
        ReadBlock {
            command: Command::ReadMeasuredValues,
            layout: variant.measured_layout(),
        },
        ReadBlock {
            command: Command::ReadNumberConcentrationValues,
            layout: variant.number_concentration_layout(),
        },
        ReadBlock {
            command: Command::ReadMeasuredRawValues,
            layout: variant.raw_layout(),
        },
    ]
    .into_iter()
    .filter(move |block| enabled.contains_any(block.layout))
}

/// Route a block reply into `readings`.
///
/// Only channels in `enabled` produce readings. A failed transaction marks all
/// of the block's channels as `ReadFailed`, a bad checksum only its own word.
pub(crate) fn collect_block(
    readings: &mut Readings,
    block: &ReadBlock,
    enabled: ChannelSet,
    reply: &Result<Frame>,
) {
    for (index, channel) in block.layout.iter().enumerate() {
        if !enabled.contains(*channel) {
            continue;
        }
        let reading = match reply {
            Ok(frame) => channel::decode(*channel, frame.word(index)),
            Err(_) => ChannelReading::invalid(*channel, Validity::ReadFailed),
        };
        readings.insert(reading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = StateMachine::new();
        assert_eq!(machine.state(), DriverState::Uninitialized);
        assert!(machine.check_init().is_ok());
        assert_eq!(
            machine.require_idle(),
            Err(Sen6xError::Driver(DriverError::InvalidState))
        );
    }

    #[test]
    fn test_measuring_rejections() {
        let mut machine = StateMachine::new();
        machine.enter(DriverState::Measuring);
        assert_eq!(
            machine.check_start(),
            Err(Sen6xError::Driver(DriverError::AlreadyMeasuring))
        );
        assert_eq!(
            machine.require_idle(),
            Err(Sen6xError::Driver(DriverError::Busy))
        );
        assert_eq!(machine.check_stop(), Ok(true));
        assert!(machine.require_ready().is_ok());
        assert_eq!(machine.begin_poll(1000), Ok(None));
    }

    #[test]
    fn test_transient_countdown() {
        let mut machine = StateMachine::new();
        machine.begin_transient(DriverState::FanCleaning, FAN_CLEANING_DURATION_MS);

        assert_eq!(
            machine.begin_poll(4000),
            Err(Sen6xError::Driver(DriverError::Busy))
        );
        assert_eq!(
            machine.begin_poll(4000),
            Err(Sen6xError::Driver(DriverError::Busy))
        );
        assert_eq!(machine.begin_poll(4000), Ok(Some(PollOutcome::Settled)));
        assert_eq!(machine.state(), DriverState::Idle);
    }

    #[test]
    fn test_fault_only_allows_init() {
        let mut machine = StateMachine::new();
        machine.enter(DriverState::Idle);
        machine.fault(&Sen6xError::InvalidData);
        assert_eq!(machine.state(), DriverState::Faulted);
        assert_eq!(
            machine.check_start(),
            Err(Sen6xError::Driver(DriverError::Faulted))
        );
        assert_eq!(
            machine.begin_poll(1000),
            Err(Sen6xError::Driver(DriverError::Faulted))
        );
        assert!(machine.check_init().is_ok());
    }

    #[test]
    fn test_blocks_follow_enabled_channels() {
        let enabled = ChannelSet::from_channels(&[Channel::Temperature]);
        let blocks: Vec<_> = measurement_blocks(Variant::Sen66, enabled).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].command, Command::ReadMeasuredValues);

        let enabled = ChannelSet::from_channels(&[Channel::RawVoc, Channel::Nc2_5]);
        let blocks: Vec<_> = measurement_blocks(Variant::Sen65, enabled).collect();
        assert_eq!(blocks.len(), 2);

        // SEN60 has no raw block, the raw channel is dropped
        let enabled = ChannelSet::from_channels(&[Channel::RawTemperature]);
        assert_eq!(measurement_blocks(Variant::Sen60, enabled).count(), 0);
    }

    #[test]
    fn test_blocks_stay_within_variant() {
        for variant in [
            Variant::Sen60,
            Variant::Sen63C,
            Variant::Sen65,
            Variant::Sen66,
            Variant::Sen68,
        ] {
            let legal = variant.channels();
            for block in measurement_blocks(variant, ChannelSet::all()) {
                assert!(block.layout.iter().all(|channel| legal.contains(*channel)));
            }
        }
        assert_eq!(measurement_blocks(Variant::Auto, ChannelSet::all()).count(), 0);
    }

    #[test]
    fn test_status_text() {
        let status = DeviceStatus::new([0x0020, 0x0090], Variant::Sen66);
        assert!(status.fan_speed_warning);
        assert!(status.gas_error);
        assert!(status.fan_error);
        assert!(!status.co2_error);

        let mut info = DeviceInfo::default();
        info.set_status(&status);
        assert_eq!(info.status.as_str(), "0x00200090");
    }

    #[test]
    fn test_co2_bit_per_variant() {
        assert!(DeviceStatus::new([0, 1 << 12], Variant::Sen63C).co2_error);
        assert!(!DeviceStatus::new([0, 1 << 12], Variant::Sen66).co2_error);
        assert!(DeviceStatus::new([0, 1 << 9], Variant::Sen66).co2_error);
    }

    #[test]
    fn test_firmware_version() {
        let version = FirmwareVersion::from(0x0401);
        assert_eq!(version.major, 4);
        assert_eq!(version.minor, 1);
    }
}
