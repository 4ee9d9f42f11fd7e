//! Audio module for Windows Core Audio API interactions.
//!
//! This module provides endpoint enumeration, capability activation, volume
//! and mute control, audio sessions, and change notifications.
//!
//! The value types, error taxonomy, controllers and notification registry are
//! platform neutral; everything that talks to COM is only built on Windows.

pub mod capability;
pub mod com;
pub mod error;
pub mod events;
pub mod notifications;
pub mod session;
pub mod types;
pub mod volume;

#[cfg(windows)]
pub mod endpoint;
#[cfg(windows)]
pub mod enumerator;
#[cfg(windows)]
pub mod meter;
#[cfg(windows)]
pub mod session_manager;
#[cfg(windows)]
mod sinks;

pub use capability::{ActivationContext, CapabilityId};
pub use com::Apartment;
pub use error::{AudioError, NativeStatus};
pub use events::{AudioEvent, Notification, RegistrationId};
pub use notifications::{EventSink, Listener, NotificationRegistry, NotificationSource};
pub use session::{ChannelVolume, SessionControlApi, SessionVolume};
pub use types::{
    AudioFormat, DataFlow, DeviceInfo, DeviceRole, DeviceState, DisconnectReason, EventContext,
    HardwareSupport, SessionInfo, SessionState, StateFilter, VolumeRange, VolumeStep,
};
pub use volume::{EndpointVolumeApi, VolumeController};

#[cfg(windows)]
pub use capability::{Activated, Capability};
#[cfg(windows)]
pub use com::ComGuard;
#[cfg(windows)]
pub use endpoint::AudioDevice;
#[cfg(windows)]
pub use enumerator::{DeviceEnumerator, Endpoints};
#[cfg(windows)]
pub use meter::LevelMeter;
#[cfg(windows)]
pub use session_manager::{AudioSession, SessionManager};
#[cfg(windows)]
pub use volume::EndpointVolume;
