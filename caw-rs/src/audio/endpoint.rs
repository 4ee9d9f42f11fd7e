//! A single audio endpoint (IMMDevice).

use super::capability::{self, Activated, ActivationContext, Capability, CapabilityId};
use super::com::{CoTaskPtr, CoTaskString};
use super::error::{native, AudioError};
use super::meter::LevelMeter;
use super::session_manager::{AudioSession, SessionManager};
use super::types::{collect_properties, AudioFormat, DataFlow, DeviceInfo, DeviceState};
use super::volume::EndpointVolume;
use std::collections::BTreeMap;
use windows::core::Interface;
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{IAudioClient, IMMDevice, IMMEndpoint};
use windows::Win32::System::Com::STGM_READ;
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

/// Handle to an OS audio endpoint. The COM reference is released on drop.
#[derive(Clone)]
pub struct AudioDevice {
    device: IMMDevice,
    context: ActivationContext,
}

impl AudioDevice {
    pub(crate) fn new(device: IMMDevice, context: ActivationContext) -> Self {
        Self { device, context }
    }

    /// Persistent endpoint ID string.
    pub fn id(&self) -> Result<String, AudioError> {
        let id = unsafe { self.device.GetId() }.map_err(native("IMMDevice::GetId"))?;
        unsafe { CoTaskString::new(id) }.to_string_lossless()
    }

    pub fn state(&self) -> Result<DeviceState, AudioError> {
        let state = unsafe { self.device.GetState() }.map_err(native("IMMDevice::GetState"))?;
        Ok(DeviceState::from_raw(state.0).unwrap_or(DeviceState::NotPresent))
    }

    /// Render or capture, read through IMMEndpoint.
    pub fn flow(&self) -> Result<DataFlow, AudioError> {
        let endpoint: IMMEndpoint = self
            .device
            .cast()
            .map_err(native("QueryInterface(IMMEndpoint)"))?;
        let flow = unsafe { endpoint.GetDataFlow() }.map_err(native("IMMEndpoint::GetDataFlow"))?;
        Ok(DataFlow::from_raw(flow.0).unwrap_or(DataFlow::All))
    }

    /// Friendly name from the property store, `None` if it cannot be read.
    pub fn friendly_name(&self) -> Option<String> {
        let props: IPropertyStore = match unsafe { self.device.OpenPropertyStore(STGM_READ) } {
            Ok(props) => props,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open device property store");
                return None;
            }
        };

        // Convert DEVPROPKEY to PROPERTYKEY
        let key = PROPERTYKEY {
            fmtid: DEVPKEY_Device_FriendlyName.fmtid,
            pid: DEVPKEY_Device_FriendlyName.pid,
        };

        match unsafe { props.GetValue(&key) } {
            Ok(prop) => {
                let s = prop.to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read device friendly name");
                None
            }
        }
    }

    /// Every readable entry of the device property store, keyed
    /// `{FMTID} pid`. Unreadable entries are logged and skipped.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let id = self.id().unwrap_or_default();
        let props: IPropertyStore = match unsafe { self.device.OpenPropertyStore(STGM_READ) } {
            Ok(props) => props,
            Err(e) => {
                tracing::warn!(device_id = %id, error = %e, "Failed to open device property store");
                return BTreeMap::new();
            }
        };
        let count = match unsafe { props.GetCount() } {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(device_id = %id, error = %e, "Failed to count device properties");
                return BTreeMap::new();
            }
        };

        let reads = (0..count).map(|index| {
            let key = match unsafe { props.GetAt(index) } {
                Ok(key) => key,
                Err(e) => return (format!("#{index}"), Err(native("IPropertyStore::GetAt")(e))),
            };
            let value = unsafe { props.GetValue(&key) }
                .map(|value| value.to_string())
                .map_err(native("IPropertyStore::GetValue"));
            (property_key_name(&key), value)
        });
        collect_properties(&id, reads)
    }

    /// Activate a capability, returning its typed handle.
    pub fn activate<C: Capability>(&self) -> Result<C, AudioError> {
        capability::activate(&self.device, self.context)
    }

    /// Activate a capability chosen at runtime.
    pub fn activate_by_id(&self, id: CapabilityId) -> Result<Activated, AudioError> {
        capability::activate_by_id(&self.device, id, self.context)
    }

    /// Whether the device exposes `id`. Other activation failures propagate.
    pub fn supports(&self, id: CapabilityId) -> Result<bool, AudioError> {
        match self.activate_by_id(id) {
            Ok(_) => Ok(true),
            Err(AudioError::UnsupportedCapability { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn endpoint_volume(&self) -> Result<EndpointVolume, AudioError> {
        self.activate()
    }

    pub fn level_meter(&self) -> Result<LevelMeter, AudioError> {
        self.activate()
    }

    pub fn session_manager(&self) -> Result<SessionManager, AudioError> {
        self.activate()
    }

    /// Shared-mode mix format of the audio engine for this endpoint.
    pub fn mix_format(&self) -> Result<Option<AudioFormat>, AudioError> {
        let client: IAudioClient = self.activate()?;
        let format_ptr = unsafe { client.GetMixFormat() }.map_err(native("GetMixFormat"))?;
        let format = unsafe { CoTaskPtr::new(format_ptr) };

        Ok(format.as_ref().map(|format| AudioFormat {
            sample_rate: format.nSamplesPerSec,
            bit_depth: format.wBitsPerSample,
            channels: format.nChannels,
        }))
    }

    /// Sessions currently open on this device.
    ///
    /// Only active devices carry sessions; any other state yields an empty
    /// list. Sessions come and go between calls.
    pub fn sessions(&self) -> Result<Vec<AudioSession>, AudioError> {
        if self.state()? != DeviceState::Active {
            return Ok(Vec::new());
        }
        self.session_manager()?.sessions()
    }

    pub fn info(&self) -> Result<DeviceInfo, AudioError> {
        Ok(DeviceInfo {
            id: self.id()?,
            name: self.friendly_name(),
            state: self.state().ok(),
            flow: self.flow().ok(),
        })
    }

    /// Get the raw IMMDevice.
    pub fn raw(&self) -> &IMMDevice {
        &self.device
    }
}

/// `{FMTID} pid`, the form property keys are reported in.
pub(crate) fn property_key_name(key: &PROPERTYKEY) -> String {
    format!("{{{:?}}} {}", key.fmtid, key.pid)
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("id", &self.id().ok())
            .finish()
    }
}
