//! Level metering using IAudioMeterInformation.

use super::capability::{Capability, CapabilityId};
use super::error::{native, AudioError};
use super::types::HardwareSupport;
use windows::Win32::Media::Audio::Endpoints::IAudioMeterInformation;

/// Level meter for a specific device.
pub struct LevelMeter {
    meter_info: IAudioMeterInformation,
}

impl Capability for LevelMeter {
    const ID: CapabilityId = CapabilityId::LevelMeter;
    type Interface = IAudioMeterInformation;

    fn from_interface(meter_info: IAudioMeterInformation) -> Self {
        Self { meter_info }
    }
}

impl LevelMeter {
    /// Get the current peak level (0.0 to 1.0).
    pub fn peak(&self) -> Result<f32, AudioError> {
        unsafe { self.meter_info.GetPeakValue() }.map_err(native("GetPeakValue"))
    }

    /// Get peak values for all channels.
    pub fn channel_peaks(&self) -> Result<Vec<f32>, AudioError> {
        unsafe {
            let channel_count = self
                .meter_info
                .GetMeteringChannelCount()
                .map_err(native("GetMeteringChannelCount"))?;

            let mut peaks = vec![0.0f32; channel_count as usize];
            self.meter_info
                .GetChannelsPeakValues(&mut peaks)
                .map_err(native("GetChannelsPeakValues"))?;

            Ok(peaks)
        }
    }

    pub fn hardware_support(&self) -> Result<HardwareSupport, AudioError> {
        let mask = unsafe { self.meter_info.QueryHardwareSupport() }
            .map_err(native("QueryHardwareSupport"))?;
        Ok(HardwareSupport::from_bits_truncate(mask))
    }
}
