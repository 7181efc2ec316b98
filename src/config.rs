//! Driver configuration supplied by the binding.

use crate::calibration::{AlgorithmTuningParameters, TemperatureCompensation};
use crate::channel::ChannelSet;
use crate::variant::Variant;

/// Default cadence of `poll()`
const DEFAULT_UPDATE_INTERVAL_MS: u32 = 60_000;

/// Parameters supplied by the binding when the driver is created.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverConfig {
    /// Module variant, `Auto` resolves it from the product name
    pub variant: Variant,
    /// I2C address, `None` uses the variant's default address
    pub address: Option<u8>,
    /// Cadence in ms at which the host calls `poll()`
    pub update_interval_ms: u32,
    /// Query the data ready flag before reading and skip the cycle if no new data is available
    pub use_data_ready: bool,
    /// Channels to read and publish
    pub channels: ChannelSet,
    /// Persist the baseline through the [`crate::BaselineStore`]
    pub store_baseline: bool,
    /// Compensation applied when no stored baseline exists
    pub temperature_compensation: TemperatureCompensation,
    /// VOC algorithm tuning written at initialization
    pub voc_tuning: Option<AlgorithmTuningParameters>,
    /// NOx algorithm tuning written at initialization
    pub nox_tuning: Option<AlgorithmTuningParameters>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Auto,
            address: None,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            use_data_ready: true,
            channels: ChannelSet::all(),
            store_baseline: true,
            temperature_compensation: TemperatureCompensation::default(),
            voc_tuning: None,
            nox_tuning: None,
        }
    }
}

impl DriverConfig {
    /// Use a fixed variant instead of identifying it
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_update_interval_ms(mut self, update_interval_ms: u32) -> Self {
        self.update_interval_ms = update_interval_ms;
        self
    }

    pub fn with_data_ready(mut self, use_data_ready: bool) -> Self {
        self.use_data_ready = use_data_ready;
        self
    }

    pub fn with_channels(mut self, channels: ChannelSet) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_store_baseline(mut self, store_baseline: bool) -> Self {
        self.store_baseline = store_baseline;
        self
    }

    pub fn with_temperature_compensation(mut self, compensation: TemperatureCompensation) -> Self {
        self.temperature_compensation = compensation;
        self
    }

    pub fn with_voc_tuning(mut self, tuning: AlgorithmTuningParameters) -> Self {
        self.voc_tuning = Some(tuning);
        self
    }

    pub fn with_nox_tuning(mut self, tuning: AlgorithmTuningParameters) -> Self {
        self.nox_tuning = Some(tuning);
        self
    }

    /// Address the transport talks to
    pub fn effective_address(&self) -> u8 {
        self.address
            .unwrap_or_else(|| self.variant.default_address())
    }
}
