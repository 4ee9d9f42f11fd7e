//! Audio data models.
//!
//! Plain value types mirroring the Core Audio enumerations (data flow, role,
//! device and session state) plus the snapshots handed out to callers.
//! Nothing here holds OS state.

use super::error::AudioError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Direction of an audio endpoint (maps to Windows EDataFlow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DataFlow {
    /// Playback devices (speakers, headphones)
    Render = 0,

    /// Recording devices (microphones, line in)
    Capture = 1,

    /// Both directions; only valid as an enumeration filter
    All = 2,
}

impl DataFlow {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Render),
            1 => Some(Self::Capture),
            2 => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Render => "eRender",
            Self::Capture => "eCapture",
            Self::All => "eAll",
        }
    }
}

/// Audio device role (maps to Windows ERole enum).
///
/// The meaning of each role is defined by the OS; the binding passes it
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DeviceRole {
    /// Used by games, system sounds, most general applications
    Console = 0,

    /// Used by music players, video players
    Multimedia = 1,

    /// Used by Teams, Zoom, Discord, and other VoIP applications
    Communications = 2,
}

impl DeviceRole {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Console),
            1 => Some(Self::Multimedia),
            2 => Some(Self::Communications),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Windows device state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum DeviceState {
    /// Device is active and available for use
    Active = 0x1,

    /// Device is disabled in Windows Sound settings
    Disabled = 0x2,

    /// Device is not present (driver issue)
    NotPresent = 0x4,

    /// Device is unplugged (for pluggable devices)
    Unplugged = 0x8,
}

impl DeviceState {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1 => Some(Self::Active),
            0x2 => Some(Self::Disabled),
            0x4 => Some(Self::NotPresent),
            0x8 => Some(Self::Unplugged),
            _ => None,
        }
    }
}

bitflags! {
    /// Device state mask used to filter endpoint enumeration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFilter: u32 {
        const ACTIVE = 0x1;
        const DISABLED = 0x2;
        const NOT_PRESENT = 0x4;
        const UNPLUGGED = 0x8;
    }
}

impl Default for StateFilter {
    fn default() -> Self {
        StateFilter::ACTIVE
    }
}

/// Lifecycle state of an audio session (maps to AudioSessionState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum SessionState {
    Inactive = 0,
    Active = 1,
    Expired = 2,
}

impl SessionState {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Inactive),
            1 => Some(Self::Active),
            2 => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Why the OS disconnected a session (maps to AudioSessionDisconnectReason).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum DisconnectReason {
    DeviceRemoval = 0,
    ServerShutdown = 1,
    FormatChanged = 2,
    SessionLogoff = 3,
    SessionDisconnected = 4,
    ExclusiveModeOverride = 5,
}

impl DisconnectReason {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::DeviceRemoval),
            1 => Some(Self::ServerShutdown),
            2 => Some(Self::FormatChanged),
            3 => Some(Self::SessionLogoff),
            4 => Some(Self::SessionDisconnected),
            5 => Some(Self::ExclusiveModeOverride),
            _ => None,
        }
    }
}

bitflags! {
    /// Volume features implemented in endpoint hardware
    /// (ENDPOINT_HARDWARE_SUPPORT_*).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HardwareSupport: u32 {
        const VOLUME = 0x1;
        const MUTE = 0x2;
        const METER = 0x4;
    }
}

/// Decibel range reported by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRange {
    pub min_db: f32,
    pub max_db: f32,
    pub increment_db: f32,
}

impl VolumeRange {
    /// Whether `db` lies inside the range, bounds included.
    pub fn contains(&self, db: f32) -> bool {
        db >= self.min_db && db <= self.max_db
    }
}

/// Current step position of an endpoint volume (GetVolumeStepInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStep {
    pub step: u32,
    pub step_count: u32,
}

/// Opaque token identifying who caused a volume or mute change.
///
/// Pass the same context to setters that you later compare against incoming
/// notifications to skip changes your own code made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventContext(u128);

impl EventContext {
    /// No context; setters pass a null pointer.
    pub const NONE: EventContext = EventContext(0);

    pub fn generate() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(|u| Self(u.as_u128()))
    }
}

impl std::fmt::Display for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Uuid::from_u128(self.0).hyphenated())
    }
}

/// Audio format (sample rate, bit depth, channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Bits per sample (e.g., 16, 24, 32)
    pub bit_depth: u16,

    /// Number of audio channels
    pub channels: u16,
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rate_khz = self.sample_rate as f64 / 1000.0;
        if rate_khz.fract() == 0.0 {
            write!(f, "{}kHz/{}-bit", rate_khz as u32, self.bit_depth)
        } else {
            write!(f, "{:.1}kHz/{}-bit", rate_khz, self.bit_depth)
        }
    }
}

/// Snapshot of an endpoint, read once from the OS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Persistent Windows device ID (opaque string from IMMDevice::GetId)
    pub id: String,

    /// Friendly name from the property store, if readable
    pub name: Option<String>,

    pub state: Option<DeviceState>,

    pub flow: Option<DataFlow>,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AudioDevice: {}", self.name.as_deref().unwrap_or(&self.id))
    }
}

/// Build a device's property map from `(key, value)` reads.
///
/// A key that fails to read is logged and left out; empty values are left
/// out too. Keys use the `{FMTID} pid` form.
pub(crate) fn collect_properties<I>(device_id: &str, reads: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, Result<String, AudioError>)>,
{
    let mut properties = BTreeMap::new();
    for (key, value) in reads {
        match value {
            Ok(value) if value.is_empty() => {}
            Ok(value) => {
                properties.insert(key, value);
            }
            Err(e) => {
                tracing::warn!(device_id, key = %key, error = %e, "Failed to read device property");
            }
        }
    }
    properties
}

/// Snapshot of an audio session, read once from the OS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique per session instance; stable while the session lives
    pub instance_id: String,

    /// Shared by all sessions of the same app and device
    pub identifier: String,

    /// Zero for the system sounds session and cross-process sessions
    pub process_id: u32,

    /// Executable name, when the owning process could be looked up
    pub process_name: Option<String>,

    /// Empty unless the owning app set one
    pub display_name: String,

    pub icon_path: String,

    pub state: Option<SessionState>,

    pub is_system_sounds: bool,
}

impl std::fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.display_name.is_empty() {
            write!(f, "DisplayName: {}", self.display_name)
        } else if let Some(process) = &self.process_name {
            write!(f, "Process: {process}")
        } else {
            write!(f, "Pid: {}", self.process_id)
        }
    }
}
