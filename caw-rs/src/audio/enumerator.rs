//! Device enumeration using Windows MMDevice API.
//!
//! COM must be initialized on the calling thread (see [`ComGuard`]) before a
//! [`DeviceEnumerator`] is created.
//!
//! [`ComGuard`]: super::com::ComGuard

use super::capability::ActivationContext;
use super::com::WideString;
use super::endpoint::AudioDevice;
use super::error::{native, AudioError, NativeStatus};
use super::session::{gather_sessions, SessionControlApi};
use super::session_manager::AudioSession;
use super::types::{DataFlow, DeviceRole, SessionState, StateFilter};
use windows::Win32::Media::Audio::{
    EDataFlow, ERole, IMMDeviceCollection, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE,
};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX};

/// Device enumerator using Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
    context: ActivationContext,
}

impl DeviceEnumerator {
    /// Create a new DeviceEnumerator using CLSCTX_ALL.
    pub fn new() -> Result<Self, AudioError> {
        Self::with_context(ActivationContext::All)
    }

    /// Create an enumerator; `context` is also used for every activation
    /// on the devices it returns.
    pub fn with_context(context: ActivationContext) -> Result<Self, AudioError> {
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX(context.as_raw())) }
                .map_err(native("CoCreateInstance(MMDeviceEnumerator)"))?;
        Ok(Self {
            enumerator,
            context,
        })
    }

    /// The OS default endpoint for `flow` and `role`.
    pub fn default_endpoint(
        &self,
        flow: DataFlow,
        role: DeviceRole,
    ) -> Result<AudioDevice, AudioError> {
        let device = unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(EDataFlow(flow.as_raw()), ERole(role.as_raw()))
        }
        .map_err(|e| {
            AudioError::from_lookup(
                "GetDefaultAudioEndpoint",
                format!("default {flow:?} endpoint for {role:?} role"),
                NativeStatus::from(&e),
            )
        })?;
        Ok(AudioDevice::new(device, self.context))
    }

    /// ID of the default endpoint, or `None` if no default is configured.
    pub fn default_device_id(
        &self,
        flow: DataFlow,
        role: DeviceRole,
    ) -> Result<Option<String>, AudioError> {
        match self.default_endpoint(flow, role) {
            Ok(device) => device.id().map(Some),
            Err(AudioError::DeviceNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Endpoints matching `flow` and `filter`, as of this call.
    pub fn endpoints(&self, flow: DataFlow, filter: StateFilter) -> Result<Endpoints, AudioError> {
        let collection = unsafe {
            self.enumerator
                .EnumAudioEndpoints(EDataFlow(flow.as_raw()), DEVICE_STATE(filter.bits()))
        }
        .map_err(native("EnumAudioEndpoints"))?;
        let count = unsafe { collection.GetCount() }.map_err(native("GetCount"))?;
        tracing::debug!(?flow, ?filter, count, "Enumerated endpoints");

        Ok(Endpoints {
            collection,
            index: 0,
            count,
            context: self.context,
        })
    }

    /// Get a specific device by ID.
    pub fn device(&self, device_id: &str) -> Result<AudioDevice, AudioError> {
        let wide = WideString::new(device_id);
        let device = unsafe { self.enumerator.GetDevice(wide.as_pcwstr()) }.map_err(|e| {
            AudioError::from_lookup("GetDevice", device_id, NativeStatus::from(&e))
        })?;
        Ok(AudioDevice::new(device, self.context))
    }

    /// Default render endpoint for the multimedia role.
    pub fn speakers(&self) -> Result<AudioDevice, AudioError> {
        self.default_endpoint(DataFlow::Render, DeviceRole::Multimedia)
    }

    /// Default capture endpoint for the multimedia role.
    pub fn microphone(&self) -> Result<AudioDevice, AudioError> {
        self.default_endpoint(DataFlow::Capture, DeviceRole::Multimedia)
    }

    /// Every endpoint in every state.
    pub fn all_devices(&self) -> Result<Vec<AudioDevice>, AudioError> {
        self.endpoints(DataFlow::All, StateFilter::all())?.collect()
    }

    /// Sessions on all active devices of `flow`, optionally only those in `state`.
    ///
    /// A device unplugged during the listing contributes no sessions.
    pub fn sessions(
        &self,
        flow: DataFlow,
        state: Option<SessionState>,
    ) -> Result<Vec<AudioSession>, AudioError> {
        let listings = self
            .endpoints(flow, StateFilter::ACTIVE)?
            .map(|device| device.and_then(|device| device.sessions()));
        gather_sessions(listings, state)
    }

    /// First session owned by process `pid`, across all active devices.
    pub fn process_session(&self, pid: u32) -> Result<Option<AudioSession>, AudioError> {
        for session in self.sessions(DataFlow::All, None)? {
            if session.process_id()? == pid {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    /// Get the raw IMMDeviceEnumerator for notification registration.
    pub fn raw_enumerator(&self) -> &IMMDeviceEnumerator {
        &self.enumerator
    }
}

/// Endpoints captured by one enumeration call. Finite and single-pass.
pub struct Endpoints {
    collection: IMMDeviceCollection,
    index: u32,
    count: u32,
    context: ActivationContext,
}

impl Iterator for Endpoints {
    type Item = Result<AudioDevice, AudioError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let i = self.index;
        self.index += 1;
        Some(
            unsafe { self.collection.Item(i) }
                .map(|device| AudioDevice::new(device, self.context))
                .map_err(native("IMMDeviceCollection::Item")),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.index) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Endpoints {}

