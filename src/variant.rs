//! Variant registry: channel sets, command tables and identification.

use crate::channel::{Channel, ChannelSet};
use crate::codec::CommandFrame;
use crate::{DEFAULT_ADDRESS, DriverError, IdentifyError, Sen6xError};

/// SEN6X module variant.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Variant {
    /// Resolve the variant from the product name during `init()`
    #[default]
    Auto,
    Sen60,
    Sen63C,
    Sen65,
    Sen66,
    Sen68,
}

/// Commands known to the driver. Which of them a variant accepts is defined by [`Variant::opcode`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    StartContinuousMeasurement,
    StopMeasurement,
    GetDataReady,
    ReadMeasuredValues,
    ReadMeasuredRawValues,
    ReadNumberConcentrationValues,
    SetTempOffsetPars,
    SetTempAccelPars,
    GetProductName,
    GetSerialNumber,
    GetVersion,
    ReadDeviceStatus,
    ReadAndClearDeviceStatus,
    DeviceReset,
    StartFanCleaning,
    ActivateShtHeater,
    GetShtHeaterMeasurements,
    VocAlgoTuningPars,
    VocAlgoState,
    NoxAlgoTuningPars,
    PerformForcedCo2Recalibration,
    Co2SensorAutoCalibrationState,
    AmbientPressure,
    SensorAltitude,
}

/// Get execution time per command id
pub(crate) fn get_execution_time(command: Command) -> u32 {
    match command {
        Command::StartContinuousMeasurement => 50,
        Command::StopMeasurement => 1000,
        Command::ActivateShtHeater => 1300,
        Command::DeviceReset => 1200,
        Command::PerformForcedCo2Recalibration => 500,
        _ => 20,
    }
}

/// Registry entry of a concrete variant.
struct VariantInfo {
    /// Prefix of the product name reported by the module
    product_prefix: &'static str,
    /// Word layout of the measured values reply
    measured: &'static [Channel],
    /// Word layout of the raw values reply
    raw: &'static [Channel],
    /// Word layout of the number concentration reply
    number_concentration: &'static [Channel],
}

const NC: [Channel; 5] = [
    Channel::Nc0_5,
    Channel::Nc1_0,
    Channel::Nc2_5,
    Channel::Nc4_0,
    Channel::Nc10_0,
];

const SEN60: VariantInfo = VariantInfo {
    product_prefix: "SEN60",
    measured: &[
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Nc0_5,
        Channel::Nc1_0,
        Channel::Nc2_5,
        Channel::Nc4_0,
        Channel::Nc10_0,
    ],
    raw: &[],
    number_concentration: &[],
};

const SEN63C: VariantInfo = VariantInfo {
    product_prefix: "SEN63C",
    measured: &[
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Humidity,
        Channel::Temperature,
        Channel::Co2,
    ],
    raw: &[Channel::RawHumidity, Channel::RawTemperature],
    number_concentration: &NC,
};

const SEN65: VariantInfo = VariantInfo {
    product_prefix: "SEN65",
    measured: &[
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Humidity,
        Channel::Temperature,
        Channel::VocIndex,
        Channel::NoxIndex,
    ],
    raw: &[
        Channel::RawHumidity,
        Channel::RawTemperature,
        Channel::RawVoc,
        Channel::RawNox,
    ],
    number_concentration: &NC,
};

const SEN66: VariantInfo = VariantInfo {
    product_prefix: "SEN66",
    measured: &[
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Humidity,
        Channel::Temperature,
        Channel::VocIndex,
        Channel::NoxIndex,
        Channel::Co2,
    ],
    raw: &[
        Channel::RawHumidity,
        Channel::RawTemperature,
        Channel::RawVoc,
        Channel::RawNox,
        Channel::RawCo2,
    ],
    number_concentration: &NC,
};

const SEN68: VariantInfo = VariantInfo {
    product_prefix: "SEN68",
    measured: &[
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Humidity,
        Channel::Temperature,
        Channel::VocIndex,
        Channel::NoxIndex,
        Channel::Hcho,
    ],
    // According to the datasheet v0.9, the SEN68 does not provide raw HCHO values
    raw: &[
        Channel::RawHumidity,
        Channel::RawTemperature,
        Channel::RawVoc,
        Channel::RawNox,
    ],
    number_concentration: &NC,
};

/// Variants that can be resolved from a product name, most specific prefix first
const IDENTIFIABLE: [Variant; 4] = [
    Variant::Sen63C,
    Variant::Sen65,
    Variant::Sen66,
    Variant::Sen68,
];

impl Variant {
    fn info(&self) -> Option<&'static VariantInfo> {
        match self {
            Variant::Auto => None,
            Variant::Sen60 => Some(&SEN60),
            Variant::Sen63C => Some(&SEN63C),
            Variant::Sen65 => Some(&SEN65),
            Variant::Sen66 => Some(&SEN66),
            Variant::Sen68 => Some(&SEN68),
        }
    }

    /// Whether this is a concrete variant
    pub fn is_resolved(&self) -> bool {
        *self != Variant::Auto
    }

    /// Default I2C address of the variant
    pub fn default_address(&self) -> u8 {
        match self {
            Variant::Sen60 => 0x6C,
            _ => DEFAULT_ADDRESS,
        }
    }

    /// Product name prefix reported by the module
    pub fn product_prefix(&self) -> Option<&'static str> {
        self.info().map(|info| info.product_prefix)
    }

    /// Channels the variant can produce (empty for `Auto`)
    pub fn channels(&self) -> ChannelSet {
        match self.info() {
            Some(info) => ChannelSet::from_channels(info.measured)
                .union(ChannelSet::from_channels(info.raw))
                .union(ChannelSet::from_channels(info.number_concentration)),
            None => ChannelSet::empty(),
        }
    }

    /// Word layout of the measured values reply
    pub(crate) fn measured_layout(&self) -> &'static [Channel] {
        self.info().map(|info| info.measured).unwrap_or(&[])
    }

    /// Word layout of the raw values reply
    pub(crate) fn raw_layout(&self) -> &'static [Channel] {
        self.info().map(|info| info.raw).unwrap_or(&[])
    }

    /// Word layout of the number concentration reply
    pub(crate) fn number_concentration_layout(&self) -> &'static [Channel] {
        self.info()
            .map(|info| info.number_concentration)
            .unwrap_or(&[])
    }

    /// Whether the variant runs the VOC/NOx gas index algorithms
    pub fn has_gas_algorithms(&self) -> bool {
        matches!(self, Variant::Sen65 | Variant::Sen66 | Variant::Sen68)
    }

    /// Whether the variant carries a CO2 sensor
    pub fn has_co2(&self) -> bool {
        matches!(self, Variant::Sen63C | Variant::Sen66)
    }

    /// Opcode of `command` on this variant, `None` if the variant does not accept it
    pub fn opcode(&self, command: Command) -> Option<u16> {
        match self {
            Variant::Auto => match command {
                // Only what is needed to identify or reset the module
                Command::GetProductName => Some(0xD014),
                Command::DeviceReset => Some(0xD304),
                _ => None,
            },
            Variant::Sen60 => match command {
                Command::StartContinuousMeasurement => Some(0x2152),
                Command::StopMeasurement => Some(0x3F86),
                Command::GetDataReady => Some(0xE4B8),
                Command::ReadMeasuredValues => Some(0xEC05),
                Command::StartFanCleaning => Some(0x3730),
                Command::DeviceReset => Some(0x3F8D),
                Command::GetSerialNumber => Some(0x3682),
                Command::ReadDeviceStatus => Some(0xD206),
                Command::ReadAndClearDeviceStatus => Some(0xD210),
                _ => None,
            },
            _ => self.sen6x_opcode(command),
        }
    }

    fn sen6x_opcode(&self, command: Command) -> Option<u16> {
        let opcode = match command {
            Command::StartContinuousMeasurement => 0x0021,
            Command::StopMeasurement => 0x0104,
            Command::GetDataReady => 0x0202,
            Command::ReadMeasuredValues => match self {
                Variant::Sen63C => 0x0471,
                Variant::Sen65 => 0x0446,
                Variant::Sen66 => 0x0300,
                _ => 0x0467,
            },
            Command::ReadMeasuredRawValues => match self {
                Variant::Sen63C => 0x0492,
                Variant::Sen66 => 0x0405,
                _ => 0x0455,
            },
            Command::ReadNumberConcentrationValues => 0x0316,
            Command::SetTempOffsetPars => 0x60B2,
            Command::SetTempAccelPars => 0x6100,
            Command::GetProductName => 0xD014,
            Command::GetSerialNumber => 0xD033,
            Command::GetVersion => 0xD100,
            Command::ReadDeviceStatus => 0xD206,
            Command::ReadAndClearDeviceStatus => 0xD210,
            Command::DeviceReset => 0xD304,
            Command::StartFanCleaning => 0x5607,
            Command::ActivateShtHeater => 0x6765,
            Command::GetShtHeaterMeasurements => 0x6790,
            Command::VocAlgoTuningPars if self.has_gas_algorithms() => 0x60D0,
            Command::VocAlgoState if self.has_gas_algorithms() => 0x6181,
            Command::NoxAlgoTuningPars if self.has_gas_algorithms() => 0x60E1,
            Command::PerformForcedCo2Recalibration if self.has_co2() => 0x6707,
            Command::Co2SensorAutoCalibrationState if self.has_co2() => 0x6711,
            Command::AmbientPressure if self.has_co2() => 0x6720,
            Command::SensorAltitude if self.has_co2() => 0x6736,
            _ => return None,
        };
        Some(opcode)
    }

    /// Resolve a product name reported by the module
    pub fn from_product_name(name: &str) -> Result<Variant, IdentifyError> {
        IDENTIFIABLE
            .into_iter()
            .find(|variant| {
                variant
                    .product_prefix()
                    .is_some_and(|prefix| name.trim().starts_with(prefix))
            })
            .ok_or(IdentifyError::UnknownDevice)
    }

    /// Wire frame for `command`, `Unsupported` if the variant has no opcode for it
    pub(crate) fn frame(
        &self,
        command: Command,
        payload: &[u16],
        reply_words: usize,
    ) -> Result<CommandFrame, Sen6xError> {
        let opcode = self.opcode(command).ok_or(DriverError::Unsupported)?;
        Ok(CommandFrame::with_payload(
            opcode,
            payload,
            reply_words,
            get_execution_time(command),
        )?)
    }
}
