//! Calibration parameters and the store persisting them across power cycles.

use crate::{Result, Sen6xError, ValidationError};

/// Temperature compensation as applied through the "set temperature offset parameters" command.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TemperatureCompensation {
    offset: f32,
    normalized_offset_slope: f32,
    time_constant: u16,
}

/// Largest offset in °C representable with the module's ×200 scaling
const MAX_OFFSET: f32 = i16::MAX as f32 / 200.0;

/// A normalized slope at or above this magnitude was almost certainly given in percent
const MAX_NORMALIZED_SLOPE: f32 = 1.0;

/// Scale and round to the nearest integer, saturating at the i16 range
fn scale_to_i16(value: f32, factor: f32) -> i16 {
    let scaled = value * factor;
    match scaled >= 0.0 {
        true => (scaled + 0.5) as i16,
        false => (scaled - 0.5) as i16,
    }
}

impl TemperatureCompensation {
    /// Create a compensation set.
    ///
    /// * `offset`: constant offset in °C
    /// * `normalized_offset_slope`: slope as a factor, e.g. `0.01` for 1%
    /// * `time_constant`: time constant in seconds
    pub fn new(
        offset: f32,
        normalized_offset_slope: f32,
        time_constant: u16,
    ) -> core::result::Result<Self, ValidationError> {
        if !offset.is_finite() || offset > MAX_OFFSET || offset < -MAX_OFFSET {
            return Err(ValidationError::OutOfRange("offset"));
        }
        if !normalized_offset_slope.is_finite() {
            return Err(ValidationError::OutOfRange("normalized_offset_slope"));
        }
        if normalized_offset_slope >= MAX_NORMALIZED_SLOPE
            || normalized_offset_slope <= -MAX_NORMALIZED_SLOPE
        {
            return Err(ValidationError::PercentageSlope);
        }
        Ok(Self {
            offset,
            normalized_offset_slope,
            time_constant,
        })
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn normalized_offset_slope(&self) -> f32 {
        self.normalized_offset_slope
    }

    pub fn time_constant(&self) -> u16 {
        self.time_constant
    }

    /// No compensation configured, matches the module's power-on state
    pub fn is_zero(&self) -> bool {
        self.offset == 0.0 && self.normalized_offset_slope == 0.0 && self.time_constant == 0
    }
}

impl From<TemperatureCompensation> for [u16; 4] {
    fn from(data: TemperatureCompensation) -> [u16; 4] {
        [
            scale_to_i16(data.offset, 200.0) as u16,
            scale_to_i16(data.normalized_offset_slope, 10000.0) as u16,
            data.time_constant,
            // Slot 0, the driver manages a single compensation set
            0,
        ]
    }
}

/// (Volatile) internal temperature acceleration parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempAccelPars {
    /// Filter constant K (already scaled)
    pub k: u16,
    /// Filter constant P (already scaled)
    pub p: u16,
    /// Time constant T1 (already scaled)
    pub t1: u16,
    /// Time constant T2 (already scaled)
    pub t2: u16,
}

impl From<TempAccelPars> for [u16; 4] {
    fn from(data: TempAccelPars) -> [u16; 4] {
        [data.k, data.p, data.t1, data.t2]
    }
}

/// VOC/NOx algorithm tuning parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AlgorithmTuningParameters {
    index_offset: i16,
    learning_time_offset_hours: i16,
    learning_time_gain_hours: i16,
    gating_max_duration_minutes: i16,
    std_initial: i16,
    gain_factor: i16,
}

/// The NOx algorithm only accepts this initial standard deviation
const NOX_STD_INITIAL: i16 = 50;

fn check_range(
    name: &'static str,
    value: i16,
    min: i16,
    max: i16,
) -> core::result::Result<i16, ValidationError> {
    match (min..=max).contains(&value) {
        true => Ok(value),
        false => Err(ValidationError::OutOfRange(name)),
    }
}

impl AlgorithmTuningParameters {
    /// VOC tuning parameters
    ///
    /// * `index_offset`: range 1..=250, default 100
    /// * `learning_time_offset_hours`: range 1..=1000, default 12
    /// * `learning_time_gain_hours`: range 1..=1000, default 12
    /// * `gating_max_duration_minutes`: range 0..=3000, default 180
    /// * `std_initial`: range 10..=5000, default 50
    /// * `gain_factor`: range 1..=1000, default 230
    pub fn voc(
        index_offset: i16,
        learning_time_offset_hours: i16,
        learning_time_gain_hours: i16,
        gating_max_duration_minutes: i16,
        std_initial: i16,
        gain_factor: i16,
    ) -> core::result::Result<Self, ValidationError> {
        Ok(Self {
            index_offset: check_range("index_offset", index_offset, 1, 250)?,
            learning_time_offset_hours: check_range(
                "learning_time_offset_hours",
                learning_time_offset_hours,
                1,
                1000,
            )?,
            learning_time_gain_hours: check_range(
                "learning_time_gain_hours",
                learning_time_gain_hours,
                1,
                1000,
            )?,
            gating_max_duration_minutes: check_range(
                "gating_max_duration_minutes",
                gating_max_duration_minutes,
                0,
                3000,
            )?,
            std_initial: check_range("std_initial", std_initial, 10, 5000)?,
            gain_factor: check_range("gain_factor", gain_factor, 1, 1000)?,
        })
    }

    /// NOx tuning parameters, same ranges as [`Self::voc`] with a fixed initial standard deviation
    pub fn nox(
        index_offset: i16,
        learning_time_offset_hours: i16,
        learning_time_gain_hours: i16,
        gating_max_duration_minutes: i16,
        gain_factor: i16,
    ) -> core::result::Result<Self, ValidationError> {
        Self::voc(
            index_offset,
            learning_time_offset_hours,
            learning_time_gain_hours,
            gating_max_duration_minutes,
            NOX_STD_INITIAL,
            gain_factor,
        )
    }

    /// Module defaults of the VOC algorithm
    pub fn voc_default() -> Self {
        Self {
            index_offset: 100,
            learning_time_offset_hours: 12,
            learning_time_gain_hours: 12,
            gating_max_duration_minutes: 180,
            std_initial: 50,
            gain_factor: 230,
        }
    }

    /// Module defaults of the NOx algorithm
    pub fn nox_default() -> Self {
        Self {
            index_offset: 1,
            learning_time_offset_hours: 12,
            learning_time_gain_hours: 12,
            gating_max_duration_minutes: 720,
            std_initial: NOX_STD_INITIAL,
            gain_factor: 230,
        }
    }

    pub fn index_offset(&self) -> i16 {
        self.index_offset
    }

    pub fn learning_time_offset_hours(&self) -> i16 {
        self.learning_time_offset_hours
    }

    pub fn learning_time_gain_hours(&self) -> i16 {
        self.learning_time_gain_hours
    }

    pub fn gating_max_duration_minutes(&self) -> i16 {
        self.gating_max_duration_minutes
    }

    pub fn std_initial(&self) -> i16 {
        self.std_initial
    }

    pub fn gain_factor(&self) -> i16 {
        self.gain_factor
    }
}

impl From<AlgorithmTuningParameters> for [u16; 6] {
    fn from(data: AlgorithmTuningParameters) -> [u16; 6] {
        [
            data.index_offset as u16,
            data.learning_time_offset_hours as u16,
            data.learning_time_gain_hours as u16,
            data.gating_max_duration_minutes as u16,
            data.std_initial as u16,
            data.gain_factor as u16,
        ]
    }
}

/// Parameters as reported by the module, not validated
impl From<[u16; 6]> for AlgorithmTuningParameters {
    fn from(data: [u16; 6]) -> Self {
        Self {
            index_offset: data[0] as i16,
            learning_time_offset_hours: data[1] as i16,
            learning_time_gain_hours: data[2] as i16,
            gating_max_duration_minutes: data[3] as i16,
            std_initial: data[4] as i16,
            gain_factor: data[5] as i16,
        }
    }
}

/// Deserialization goes through the validating constructors.
#[cfg(feature = "serde")]
mod de {
    use super::{AlgorithmTuningParameters, TemperatureCompensation};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Default, Deserialize)]
    #[serde(default)]
    struct RawTemperatureCompensation {
        offset: f32,
        normalized_offset_slope: f32,
        time_constant: u16,
    }

    #[derive(Deserialize)]
    struct RawTuning {
        index_offset: i16,
        learning_time_offset_hours: i16,
        learning_time_gain_hours: i16,
        gating_max_duration_minutes: i16,
        std_initial: i16,
        gain_factor: i16,
    }

    impl<'de> Deserialize<'de> for TemperatureCompensation {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let raw = RawTemperatureCompensation::deserialize(deserializer)?;
            TemperatureCompensation::new(raw.offset, raw.normalized_offset_slope, raw.time_constant)
                .map_err(|e| D::Error::custom(format_args!("temperature compensation: {:?}", e)))
        }
    }

    impl<'de> Deserialize<'de> for AlgorithmTuningParameters {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let raw = RawTuning::deserialize(deserializer)?;
            AlgorithmTuningParameters::voc(
                raw.index_offset,
                raw.learning_time_offset_hours,
                raw.learning_time_gain_hours,
                raw.gating_max_duration_minutes,
                raw.std_initial,
                raw.gain_factor,
            )
            .map_err(|e| D::Error::custom(format_args!("algorithm tuning: {:?}", e)))
        }
    }
}

/// State carried across power cycles.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Baseline {
    /// Temperature compensation written at every initialization
    pub temperature_compensation: TemperatureCompensation,
    /// VOC algorithm state, restored to skip the algorithm's learning phase
    pub voc_state: Option<[u16; 4]>,
}

/// Persistent storage for the [`Baseline`], provided by the host (flash, EEPROM, file, ...).
pub trait BaselineStore {
    type Error;

    /// Read the stored baseline, `None` if nothing was stored yet
    fn load(&mut self) -> core::result::Result<Option<Baseline>, Self::Error>;

    /// Replace the stored baseline
    fn save(&mut self, baseline: &Baseline) -> core::result::Result<(), Self::Error>;
}

/// Storage that never holds anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoStore;

impl BaselineStore for NoStore {
    type Error = core::convert::Infallible;

    fn load(&mut self) -> core::result::Result<Option<Baseline>, Self::Error> {
        Ok(None)
    }

    fn save(&mut self, _baseline: &Baseline) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// RAM backed storage, survives re-initialization but not a power cycle.
#[derive(Copy, Clone, Debug, Default)]
pub struct MemoryStore {
    baseline: Option<Baseline>,
    writes: usize,
}

impl MemoryStore {
    /// Storage pre-filled with a baseline
    pub fn with_baseline(baseline: Baseline) -> Self {
        Self {
            baseline: Some(baseline),
            writes: 0,
        }
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Number of successful `save` calls
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl BaselineStore for MemoryStore {
    type Error = core::convert::Infallible;

    fn load(&mut self) -> core::result::Result<Option<Baseline>, Self::Error> {
        Ok(self.baseline)
    }

    fn save(&mut self, baseline: &Baseline) -> core::result::Result<(), Self::Error> {
        self.baseline = Some(*baseline);
        self.writes += 1;
        Ok(())
    }
}

/// Decides where the baseline comes from and whether it is written back.
///
/// With `store_baseline` disabled the configured defaults are used on every
/// initialization and nothing is ever written to the storage.
#[derive(Debug)]
pub struct CalibrationStore<S> {
    storage: S,
    store_baseline: bool,
    defaults: Baseline,
    current: Baseline,
}

impl<S: BaselineStore> CalibrationStore<S> {
    pub fn new(storage: S, store_baseline: bool, compensation: TemperatureCompensation) -> Self {
        let defaults = Baseline {
            temperature_compensation: compensation,
            voc_state: None,
        };
        Self {
            storage,
            store_baseline,
            defaults,
            current: defaults,
        }
    }

    /// Baseline to apply at initialization
    pub fn load(&mut self) -> Baseline {
        self.current = match self.store_baseline {
            false => self.defaults,
            true => match self.storage.load() {
                Ok(Some(baseline)) => {
                    debug!("Loaded stored baseline");
                    baseline
                }
                Ok(None) => self.defaults,
                Err(_) => {
                    warn!("Reading the stored baseline failed, using defaults");
                    self.defaults
                }
            },
        };
        self.current
    }

    /// Persist `baseline`, returns whether anything was written
    pub fn save(&mut self, baseline: Baseline) -> Result<bool> {
        self.current = baseline;
        if !self.store_baseline {
            return Ok(false);
        }
        self.storage
            .save(&baseline)
            .map_err(|_| Sen6xError::Storage)?;
        Ok(true)
    }

    /// Baseline that was loaded or saved last, including runtime changes
    pub fn current(&self) -> &Baseline {
        &self.current
    }

    pub fn store_baseline(&self) -> bool {
        self.store_baseline
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}
