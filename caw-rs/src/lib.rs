//! caw - Windows Core Audio binding
//!
//! A typed wrapper over the Windows Core Audio COM API.
//!
//! ## Features
//!
//! - Enumerate render and capture endpoints, filtered by flow and state
//! - Look up the default endpoint per flow and role
//! - Activate endpoint capabilities (volume, level meter, sessions, audio client)
//! - Control master and per-channel volume, in scalar and dB, plus mute
//! - List audio sessions and control their volume, mute and metadata
//! - Receive device, volume and session notifications with a strict
//!   no-delivery-after-unregister guarantee
//!
//! COM is only touched on Windows. The value types, the error taxonomy, the
//! controllers (over their trait seams) and the notification registry build
//! everywhere.

pub mod audio;
pub mod config;
pub mod logging;

pub use audio::{
    AudioError, AudioEvent, DataFlow, DeviceRole, DeviceState, EventContext, Listener,
    Notification, NotificationRegistry, RegistrationId, SessionState, StateFilter,
};
pub use config::BindingConfig;

#[cfg(windows)]
pub use audio::{AudioDevice, AudioSession, ComGuard, DeviceEnumerator, EndpointVolume};
