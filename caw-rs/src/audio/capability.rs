//! Capability identifiers and typed interface activation.
//!
//! A capability names one native interface that can be activated on an
//! endpoint. Callers either ask for a concrete handle type through
//! [`Capability`] (resolved at compile time) or pass a [`CapabilityId`] and get
//! an [`Activated`] sum back.

use serde::{Deserialize, Serialize};

/// Interfaces that can be activated on an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    /// IAudioEndpointVolume
    EndpointVolume,
    /// IAudioMeterInformation
    LevelMeter,
    /// IAudioSessionManager2
    SessionManager,
    /// IAudioClient
    AudioClient,
}

impl CapabilityId {
    pub const ALL: [CapabilityId; 4] = [
        CapabilityId::EndpointVolume,
        CapabilityId::LevelMeter,
        CapabilityId::SessionManager,
        CapabilityId::AudioClient,
    ];

    /// Interface identifier of the native interface.
    pub fn iid(self) -> &'static str {
        match self {
            CapabilityId::EndpointVolume => "5CDF2C82-841E-4546-9722-0CF74078229A",
            CapabilityId::LevelMeter => "C02216F6-8C67-4B5B-9D00-D008E73E0064",
            CapabilityId::SessionManager => "77AA99A0-1BD6-484F-8BC7-2C654C9A9B6F",
            CapabilityId::AudioClient => "1CB9AD4C-DBFA-4C32-B178-C2F568A703B2",
        }
    }

    pub fn interface_name(self) -> &'static str {
        match self {
            CapabilityId::EndpointVolume => "IAudioEndpointVolume",
            CapabilityId::LevelMeter => "IAudioMeterInformation",
            CapabilityId::SessionManager => "IAudioSessionManager2",
            CapabilityId::AudioClient => "IAudioClient",
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.interface_name())
    }
}

/// Server context used for activation and object creation (CLSCTX).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationContext {
    /// CLSCTX_INPROC_SERVER
    InprocServer,
    /// CLSCTX_LOCAL_SERVER
    LocalServer,
    /// CLSCTX_ALL
    #[default]
    All,
}

impl ActivationContext {
    pub fn as_raw(self) -> u32 {
        match self {
            ActivationContext::InprocServer => 0x1,
            ActivationContext::LocalServer => 0x4,
            ActivationContext::All => 0x17,
        }
    }
}

#[cfg(windows)]
pub use native::{Activated, Capability};

#[cfg(windows)]
mod native {
    use super::{ActivationContext, CapabilityId};
    use crate::audio::error::{AudioError, NativeStatus};
    use crate::audio::meter::LevelMeter;
    use crate::audio::session_manager::SessionManager;
    use crate::audio::volume::EndpointVolume;
    use windows::core::Interface;
    use windows::Win32::Media::Audio::{IAudioClient, IMMDevice};
    use windows::Win32::System::Com::CLSCTX;

    /// A typed handle that can be activated on an endpoint.
    pub trait Capability: Sized {
        const ID: CapabilityId;
        type Interface: Interface;

        fn from_interface(interface: Self::Interface) -> Self;
    }

    impl Capability for IAudioClient {
        const ID: CapabilityId = CapabilityId::AudioClient;
        type Interface = IAudioClient;

        fn from_interface(interface: IAudioClient) -> Self {
            interface
        }
    }

    /// Activate `C` on `device`.
    pub(crate) fn activate<C: Capability>(
        device: &IMMDevice,
        context: ActivationContext,
    ) -> Result<C, AudioError> {
        let interface: C::Interface = unsafe {
            device
                .Activate(CLSCTX(context.as_raw()), None)
                .map_err(|e| AudioError::from_activation(C::ID, NativeStatus::from(&e)))?
        };
        tracing::debug!(capability = %C::ID, "Activated interface");
        Ok(C::from_interface(interface))
    }

    /// Result of activating a capability chosen at runtime.
    pub enum Activated {
        EndpointVolume(EndpointVolume),
        LevelMeter(LevelMeter),
        SessionManager(SessionManager),
        AudioClient(IAudioClient),
    }

    impl Activated {
        pub fn id(&self) -> CapabilityId {
            match self {
                Activated::EndpointVolume(_) => CapabilityId::EndpointVolume,
                Activated::LevelMeter(_) => CapabilityId::LevelMeter,
                Activated::SessionManager(_) => CapabilityId::SessionManager,
                Activated::AudioClient(_) => CapabilityId::AudioClient,
            }
        }
    }

    pub(crate) fn activate_by_id(
        device: &IMMDevice,
        id: CapabilityId,
        context: ActivationContext,
    ) -> Result<Activated, AudioError> {
        Ok(match id {
            CapabilityId::EndpointVolume => Activated::EndpointVolume(activate(device, context)?),
            CapabilityId::LevelMeter => Activated::LevelMeter(activate(device, context)?),
            CapabilityId::SessionManager => Activated::SessionManager(activate(device, context)?),
            CapabilityId::AudioClient => Activated::AudioClient(activate(device, context)?),
        })
    }
}

#[cfg(windows)]
pub(crate) use native::{activate, activate_by_id};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_ids_are_distinct() {
        for (i, a) in CapabilityId::ALL.iter().enumerate() {
            assert_eq!(CapabilityId::from_raw(i as u32), Some(*a));
            for b in &CapabilityId::ALL[i + 1..] {
                assert_ne!(a.iid(), b.iid());
            }
        }
        assert_eq!(CapabilityId::from_raw(4), None);
    }

    #[test]
    fn test_activation_context_raw_values() {
        assert_eq!(ActivationContext::default(), ActivationContext::All);
        assert_eq!(ActivationContext::InprocServer.as_raw(), 0x1);
        assert_eq!(ActivationContext::All.as_raw(), 0x17);
    }

    #[test]
    fn test_display_uses_interface_name() {
        assert_eq!(
            CapabilityId::SessionManager.to_string(),
            "IAudioSessionManager2"
        );
    }
}
