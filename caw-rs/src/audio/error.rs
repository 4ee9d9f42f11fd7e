//! Error taxonomy for the binding.
//!
//! Native failures are translated once, at the call site, into an
//! [`AudioError`]. Nothing is retried and nothing is replaced by a default.

use super::capability::CapabilityId;
use super::types::VolumeRange;
use thiserror::Error;

/// HRESULT reported by a failed native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeStatus(pub i32);

impl NativeStatus {
    /// AUDCLNT_E_DEVICE_INVALIDATED: the endpoint was removed or disabled.
    pub const DEVICE_INVALIDATED: NativeStatus = NativeStatus(0x8889_0004_u32 as i32);
    /// AUDCLNT_E_SERVICE_NOT_RUNNING
    pub const SERVICE_NOT_RUNNING: NativeStatus = NativeStatus(0x8889_0010_u32 as i32);
    /// HRESULT_FROM_WIN32(ERROR_NOT_FOUND)
    pub const NOT_FOUND: NativeStatus = NativeStatus(0x8007_0490_u32 as i32);
    /// RPC_E_DISCONNECTED: the object behind the proxy is gone.
    pub const DISCONNECTED: NativeStatus = NativeStatus(0x8001_0108_u32 as i32);
    pub const NO_INTERFACE: NativeStatus = NativeStatus(0x8000_4002_u32 as i32);
    pub const NOT_IMPLEMENTED: NativeStatus = NativeStatus(0x8000_4001_u32 as i32);
    /// REGDB_E_CLASSNOTREG
    pub const CLASS_NOT_REGISTERED: NativeStatus = NativeStatus(0x8004_0154_u32 as i32);
    pub const INVALID_ARG: NativeStatus = NativeStatus(0x8007_0057_u32 as i32);
    /// RPC_E_CHANGED_MODE: COM already initialized with another apartment.
    pub const CHANGED_MODE: NativeStatus = NativeStatus(0x8001_0106_u32 as i32);

    /// Whether this status means the handle's device no longer exists.
    pub fn is_device_gone(self) -> bool {
        matches!(
            self,
            Self::DEVICE_INVALIDATED | Self::NOT_FOUND | Self::DISCONNECTED
        )
    }

    /// Whether this status means the requested interface is not offered.
    pub fn is_unsupported(self) -> bool {
        matches!(
            self,
            Self::NO_INTERFACE | Self::NOT_IMPLEMENTED | Self::CLASS_NOT_REGISTERED
        )
    }
}

impl std::fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

/// Audio binding error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("Device not found: {what}")]
    DeviceNotFound { what: String },

    #[error("Capability {capability} not supported by device")]
    UnsupportedCapability { capability: CapabilityId },

    #[error("Volume level {level} outside [0.0, 1.0]")]
    InvalidRange { level: f32 },

    #[error("Volume {db} dB outside device range [{}, {}] dB", .range.min_db, .range.max_db)]
    OutOfRange { db: f32, range: VolumeRange },

    #[error("Channel {index} out of range (device has {count} channels)")]
    InvalidChannel { index: u32, count: u32 },

    #[error("Device is no longer available")]
    DeviceUnavailable,

    #[error("Invalid notification handle")]
    InvalidHandle,

    #[error("COM initialization failed: {0}")]
    ComInitFailed(NativeStatus),

    #[error("{call} failed: {status}")]
    NativeCallFailure {
        call: &'static str,
        status: NativeStatus,
    },

    #[error("String conversion error: {0}")]
    StringConversion(String),
}

impl AudioError {
    /// Translate the status of a failed call made on an existing handle.
    pub fn from_status(call: &'static str, status: NativeStatus) -> Self {
        if status.is_device_gone() {
            AudioError::DeviceUnavailable
        } else {
            AudioError::NativeCallFailure { call, status }
        }
    }

    /// Translate the status of a failed lookup (default endpoint, device by id).
    pub fn from_lookup(call: &'static str, what: impl Into<String>, status: NativeStatus) -> Self {
        if status == NativeStatus::NOT_FOUND || status == NativeStatus::INVALID_ARG {
            AudioError::DeviceNotFound { what: what.into() }
        } else {
            Self::from_status(call, status)
        }
    }

    /// Translate the status of a failed interface activation.
    pub fn from_activation(capability: CapabilityId, status: NativeStatus) -> Self {
        if status.is_unsupported() {
            AudioError::UnsupportedCapability { capability }
        } else {
            Self::from_status("IMMDevice::Activate", status)
        }
    }

    /// The native status carried by this error, if any.
    pub fn status(&self) -> Option<NativeStatus> {
        match self {
            AudioError::ComInitFailed(status) => Some(*status),
            AudioError::NativeCallFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(windows)]
impl From<&windows::core::Error> for NativeStatus {
    fn from(err: &windows::core::Error) -> Self {
        NativeStatus(err.code().0)
    }
}

/// Map a `windows::core::Error` from a handle call into an [`AudioError`].
#[cfg(windows)]
pub(crate) fn native(call: &'static str) -> impl FnOnce(windows::core::Error) -> AudioError {
    move |err| AudioError::from_status(call, NativeStatus::from(&err))
}
