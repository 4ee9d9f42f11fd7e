//! Events delivered by the OS audio subsystem.

use super::types::{DataFlow, DeviceRole, DeviceState, DisconnectReason, EventContext, SessionState};
use serde::Serialize;

/// Identifies one notification registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegistrationId(pub(crate) u64);

impl RegistrationId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something changed in the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioEvent {
    /// A new audio device was connected
    DeviceAdded { device_id: String },

    /// An audio device was disconnected
    DeviceRemoved { device_id: String },

    /// Device state changed (active, disabled, not present, unplugged)
    DeviceStateChanged {
        device_id: String,
        new_state: Option<DeviceState>,
    },

    /// Default device changed for a flow and role
    DefaultDeviceChanged {
        flow: Option<DataFlow>,
        role: Option<DeviceRole>,
        device_id: Option<String>, // None if no default device
    },

    /// A device property changed; `key` is "{fmtid} pid"
    PropertyValueChanged { device_id: String, key: String },

    /// Endpoint volume or mute changed
    EndpointVolumeChanged {
        #[serde(serialize_with = "serialize_context")]
        context: EventContext,
        muted: bool,
        master_volume: f32,
        channel_volumes: Vec<f32>,
    },

    /// A session was opened on the device
    SessionCreated {
        instance_id: Option<String>,
        process_id: Option<u32>,
    },

    SessionDisplayNameChanged {
        display_name: String,
        #[serde(serialize_with = "serialize_context")]
        context: EventContext,
    },

    SessionIconPathChanged {
        icon_path: String,
        #[serde(serialize_with = "serialize_context")]
        context: EventContext,
    },

    /// Session master volume or mute changed
    SessionVolumeChanged {
        volume: f32,
        muted: bool,
        #[serde(serialize_with = "serialize_context")]
        context: EventContext,
    },

    SessionChannelVolumeChanged {
        channel_volumes: Vec<f32>,
        changed_channel: Option<u32>,
        #[serde(serialize_with = "serialize_context")]
        context: EventContext,
    },

    SessionGroupingChanged {
        grouping_param: String,
        #[serde(serialize_with = "serialize_context")]
        context: EventContext,
    },

    SessionStateChanged { state: Option<SessionState> },

    SessionDisconnected { reason: Option<DisconnectReason> },
}

impl AudioEvent {
    /// The event context of a change event, if the event carries one.
    pub fn context(&self) -> Option<EventContext> {
        match self {
            AudioEvent::EndpointVolumeChanged { context, .. }
            | AudioEvent::SessionDisplayNameChanged { context, .. }
            | AudioEvent::SessionIconPathChanged { context, .. }
            | AudioEvent::SessionVolumeChanged { context, .. }
            | AudioEvent::SessionChannelVolumeChanged { context, .. }
            | AudioEvent::SessionGroupingChanged { context, .. } => Some(*context),
            _ => None,
        }
    }

    /// Whether this change was caused by a setter called with `own`.
    pub fn is_caused_by(&self, own: EventContext) -> bool {
        !own.is_none() && self.context() == Some(own)
    }
}

fn serialize_context<S: serde::Serializer>(
    context: &EventContext,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if context.is_none() {
        serializer.serialize_none()
    } else {
        serializer.collect_str(context)
    }
}

/// An event together with the registration that received it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub registration: RegistrationId,
    pub event: AudioEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_changes_are_recognized() {
        let own = EventContext::generate();
        let event = AudioEvent::SessionVolumeChanged {
            volume: 0.5,
            muted: false,
            context: own,
        };
        assert!(event.is_caused_by(own));
        assert!(!event.is_caused_by(EventContext::generate()));
        assert!(!event.is_caused_by(EventContext::NONE));

        let added = AudioEvent::DeviceAdded {
            device_id: "dev".into(),
        };
        assert_eq!(added.context(), None);
    }

    #[test]
    fn test_notification_json_shape() {
        let n = Notification {
            registration: RegistrationId(3),
            event: AudioEvent::EndpointVolumeChanged {
                context: EventContext::NONE,
                muted: true,
                master_volume: 0.5,
                channel_volumes: vec![0.5, 0.5],
            },
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["registration"], 3);
        assert_eq!(json["event"]["kind"], "endpoint_volume_changed");
        assert!(json["event"]["context"].is_null());
        assert_eq!(json["event"]["muted"], true);
    }
}
