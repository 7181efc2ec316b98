//! Measurement channels and the conversion of raw register values into readings.

use crate::CodecError;

/// Number of distinct channels across all variants
pub const CHANNEL_COUNT: usize = 20;

/// A single measurement output of the module.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Channel {
    /// PM1.0 mass concentration
    Pm1_0 = 0,
    /// PM2.5 mass concentration
    Pm2_5,
    /// PM4.0 mass concentration
    Pm4_0,
    /// PM10 mass concentration
    Pm10_0,
    /// PM0.5 number concentration
    Nc0_5,
    /// PM1.0 number concentration
    Nc1_0,
    /// PM2.5 number concentration
    Nc2_5,
    /// PM4.0 number concentration
    Nc4_0,
    /// PM10 number concentration
    Nc10_0,
    /// Compensated relative humidity
    Humidity,
    /// Compensated temperature
    Temperature,
    /// VOC index
    VocIndex,
    /// NOx index
    NoxIndex,
    /// CO2 concentration
    Co2,
    /// Formaldehyde concentration
    Hcho,
    /// Uncompensated humidity, scaled by 100
    RawHumidity,
    /// Uncompensated temperature, scaled by 200
    RawTemperature,
    /// Raw VOC ticks
    RawVoc,
    /// Raw NOx ticks
    RawNox,
    /// Raw (non-interpolated) CO2
    RawCo2,
}

/// Engineering unit of a channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    /// µg/m³
    MicrogramsPerCubicMeter,
    /// #/cm³
    ParticlesPerCubicCentimeter,
    /// %RH
    Percent,
    /// °C
    Celsius,
    /// Index points
    Index,
    /// ppm
    PartsPerMillion,
    /// ppb
    PartsPerBillion,
    /// Unscaled register value
    Ticks,
}

impl Unit {
    /// Unit symbol as shown to a user
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::MicrogramsPerCubicMeter => "µg/m³",
            Unit::ParticlesPerCubicCentimeter => "#/cm³",
            Unit::Percent => "%",
            Unit::Celsius => "°C",
            Unit::Index => "",
            Unit::PartsPerMillion => "ppm",
            Unit::PartsPerBillion => "ppb",
            Unit::Ticks => "",
        }
    }
}

impl Channel {
    /// All channels, in register order
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Nc0_5,
        Channel::Nc1_0,
        Channel::Nc2_5,
        Channel::Nc4_0,
        Channel::Nc10_0,
        Channel::Humidity,
        Channel::Temperature,
        Channel::VocIndex,
        Channel::NoxIndex,
        Channel::Co2,
        Channel::Hcho,
        Channel::RawHumidity,
        Channel::RawTemperature,
        Channel::RawVoc,
        Channel::RawNox,
        Channel::RawCo2,
    ];

    /// Unit of the scaled value
    pub fn unit(&self) -> Unit {
        match self {
            Channel::Pm1_0 | Channel::Pm2_5 | Channel::Pm4_0 | Channel::Pm10_0 => {
                Unit::MicrogramsPerCubicMeter
            }
            Channel::Nc0_5 | Channel::Nc1_0 | Channel::Nc2_5 | Channel::Nc4_0 | Channel::Nc10_0 => {
                Unit::ParticlesPerCubicCentimeter
            }
            Channel::Humidity => Unit::Percent,
            Channel::Temperature => Unit::Celsius,
            Channel::VocIndex | Channel::NoxIndex => Unit::Index,
            Channel::Co2 => Unit::PartsPerMillion,
            Channel::Hcho => Unit::PartsPerBillion,
            Channel::RawHumidity
            | Channel::RawTemperature
            | Channel::RawVoc
            | Channel::RawNox
            | Channel::RawCo2 => Unit::Ticks,
        }
    }

    /// Fixed divisor from register value to engineering unit
    pub fn divisor(&self) -> f32 {
        match self {
            Channel::Humidity => 100.0,
            Channel::Temperature => 200.0,
            Channel::Co2
            | Channel::RawHumidity
            | Channel::RawTemperature
            | Channel::RawVoc
            | Channel::RawNox
            | Channel::RawCo2 => 1.0,
            _ => 10.0,
        }
    }

    /// Whether the register holds a two's complement value
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Channel::Humidity
                | Channel::Temperature
                | Channel::VocIndex
                | Channel::NoxIndex
                | Channel::RawHumidity
                | Channel::RawTemperature
        )
    }

    /// Whether the register value is the module's "not available" marker
    pub fn is_sentinel(&self, raw: u16) -> bool {
        match self.is_signed() {
            true => raw == 0x7FFF || raw == 0xFFFF,
            false => raw == 0xFFFF,
        }
    }

    fn bit(&self) -> u32 {
        1 << (*self as u8)
    }
}

/// Set of channels, used both for the enabled outputs and the outputs a variant provides.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSet(u32);

impl ChannelSet {
    /// No channel
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every known channel
    pub const fn all() -> Self {
        Self((1 << CHANNEL_COUNT) - 1)
    }

    /// Build a set from a list of channels
    pub fn from_channels(channels: &[Channel]) -> Self {
        channels
            .iter()
            .fold(Self::empty(), |set, channel| set.with(*channel))
    }

    /// Copy of the set with `channel` added
    pub fn with(self, channel: Channel) -> Self {
        Self(self.0 | channel.bit())
    }

    /// Copy of the set with `channel` removed
    pub fn without(self, channel: Channel) -> Self {
        Self(self.0 & !channel.bit())
    }

    /// Whether `channel` is part of the set
    pub fn contains(&self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub fn intersection(&self, other: ChannelSet) -> ChannelSet {
        Self(self.0 & other.0)
    }

    /// Channels in either set
    pub fn union(&self, other: ChannelSet) -> ChannelSet {
        Self(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if any of `channels` is in the set
    pub fn contains_any(&self, channels: &[Channel]) -> bool {
        channels.iter().any(|c| self.contains(*c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

/// Why a reading carries no value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Validity {
    /// The value is usable
    Valid,
    /// The module reported the "not available" marker
    NotAvailable,
    /// The word failed its CRC check
    ChecksumMismatch,
    /// The transaction carrying this channel failed
    ReadFailed,
}

/// One decoded channel value.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelReading {
    /// The channel the value belongs to
    pub channel: Channel,
    /// Register value as transmitted
    pub raw: u16,
    /// Scaled value, only present for valid readings
    value: Option<f32>,
    /// Validity of the reading
    pub validity: Validity,
}

impl ChannelReading {
    /// A reading without value
    pub fn invalid(channel: Channel, validity: Validity) -> Self {
        Self {
            channel,
            raw: 0,
            value: None,
            validity,
        }
    }

    /// Scaled value in `channel.unit()`, `None` for invalid readings
    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    pub fn unit(&self) -> Unit {
        self.channel.unit()
    }
}

/// Convert a decoded word into a reading for `channel`.
pub fn decode(channel: Channel, word: core::result::Result<u16, CodecError>) -> ChannelReading {
    let raw = match word {
        Ok(raw) => raw,
        Err(CodecError::ChecksumMismatch) => {
            return ChannelReading::invalid(channel, Validity::ChecksumMismatch);
        }
        Err(CodecError::ShortFrame) => {
            return ChannelReading::invalid(channel, Validity::ReadFailed);
        }
    };

    if channel.is_sentinel(raw) {
        return ChannelReading {
            channel,
            raw,
            value: None,
            validity: Validity::NotAvailable,
        };
    }

    let numeric = match channel.is_signed() {
        true => raw as i16 as f32,
        false => raw as f32,
    };

    ChannelReading {
        channel,
        raw,
        value: Some(numeric / channel.divisor()),
        validity: Validity::Valid,
    }
}

/// All readings of one completed poll, at most one per channel.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Readings {
    readings: heapless::Vec<ChannelReading, CHANNEL_COUNT>,
}

impl Readings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the reading of a channel
    pub(crate) fn insert(&mut self, reading: ChannelReading) {
        match self
            .readings
            .iter_mut()
            .find(|r| r.channel == reading.channel)
        {
            Some(existing) => *existing = reading,
            // Capacity equals the number of channels, so a new channel always fits
            None => {
                let _ = self.readings.push(reading);
            }
        }
    }

    pub fn get(&self, channel: Channel) -> Option<&ChannelReading> {
        self.readings.iter().find(|r| r.channel == channel)
    }

    /// Scaled value of a channel if present and valid
    pub fn value(&self, channel: Channel) -> Option<f32> {
        self.get(channel).and_then(|r| r.value())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelReading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Number of readings without value
    pub fn invalid_count(&self) -> usize {
        self.readings.iter().filter(|r| !r.is_valid()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_scaling() {
        let reading = decode(Channel::Temperature, Ok(5000));
        assert!(reading.is_valid());
        assert_eq!(reading.value(), Some(25.0));
        assert_eq!(reading.unit(), Unit::Celsius);
    }

    #[test]
    fn test_temperature_sentinel_is_not_zero() {
        let reading = decode(Channel::Temperature, Ok(0xFFFF));
        assert_eq!(reading.validity, Validity::NotAvailable);
        assert_eq!(reading.value(), None);

        let reading = decode(Channel::Temperature, Ok(0x7FFF));
        assert_eq!(reading.validity, Validity::NotAvailable);
    }

    #[test]
    fn test_negative_temperature() {
        // -10.00 °C = -2000
        let reading = decode(Channel::Temperature, Ok((-2000i16) as u16));
        assert_eq!(reading.value(), Some(-10.0));
    }

    #[test]
    fn test_humidity_and_pm_scaling() {
        assert_eq!(decode(Channel::Humidity, Ok(5000)).value(), Some(50.0));
        assert_eq!(decode(Channel::Pm2_5, Ok(15)).value(), Some(1.5));
        assert_eq!(decode(Channel::Nc10_0, Ok(123)).value(), Some(12.3));
        assert_eq!(decode(Channel::VocIndex, Ok(1000)).value(), Some(100.0));
        assert_eq!(decode(Channel::Co2, Ok(400)).value(), Some(400.0));
        assert_eq!(decode(Channel::Hcho, Ok(400)).value(), Some(40.0));
    }

    #[test]
    fn test_unsigned_sentinel() {
        assert_eq!(
            decode(Channel::Pm1_0, Ok(0xFFFF)).validity,
            Validity::NotAvailable
        );
        // 0x7FFF is a regular value on unsigned channels
        assert_eq!(decode(Channel::Co2, Ok(0x7FFF)).value(), Some(32767.0));
    }

    #[test]
    fn test_raw_channels_are_unscaled() {
        let reading = decode(Channel::RawTemperature, Ok((-123i16) as u16));
        assert_eq!(reading.value(), Some(-123.0));
        assert_eq!(reading.unit(), Unit::Ticks);
        assert_eq!(decode(Channel::RawVoc, Ok(567)).value(), Some(567.0));
    }

    #[test]
    fn test_checksum_mismatch_marks_reading_invalid() {
        let reading = decode(Channel::Pm10_0, Err(CodecError::ChecksumMismatch));
        assert_eq!(reading.validity, Validity::ChecksumMismatch);
        assert_eq!(reading.value(), None);
    }

    #[test]
    fn test_channel_set() {
        let set = ChannelSet::from_channels(&[Channel::Co2, Channel::Temperature]);
        assert!(set.contains(Channel::Co2));
        assert!(!set.contains(Channel::Pm1_0));
        assert!(set.contains_any(&[Channel::Pm1_0, Channel::Temperature]));
        assert_eq!(set.iter().count(), 2);
        assert!(!set.without(Channel::Co2).contains(Channel::Co2));
        assert_eq!(ChannelSet::all().iter().count(), CHANNEL_COUNT);
        assert!(
            ChannelSet::all()
                .intersection(ChannelSet::empty())
                .is_empty()
        );
    }

    #[test]
    fn test_readings_replace_existing_channel() {
        let mut readings = Readings::new();
        readings.insert(decode(Channel::Co2, Ok(400)));
        readings.insert(decode(Channel::Co2, Ok(500)));
        assert_eq!(readings.len(), 1);
        assert_eq!(readings.value(Channel::Co2), Some(500.0));
        assert_eq!(readings.value(Channel::Pm1_0), None);
    }
}
