//! Per-session control: state, naming and session volume.
//!
//! The traits here are the raw method tables of IAudioSessionControl2,
//! ISimpleAudioVolume and IChannelAudioVolume. The Windows implementations
//! live in `session_manager`.

use super::error::AudioError;
use super::types::{EventContext, SessionInfo, SessionState};
use super::volume::check_level;
use uuid::Uuid;

pub trait SessionControlApi {
    fn state(&self) -> Result<SessionState, AudioError>;

    /// Empty unless the owning client set a name.
    fn display_name(&self) -> Result<String, AudioError>;
    fn set_display_name(&self, name: &str, context: EventContext) -> Result<(), AudioError>;

    /// Empty unless the owning client set an icon.
    fn icon_path(&self) -> Result<String, AudioError>;
    fn set_icon_path(&self, path: &str, context: EventContext) -> Result<(), AudioError>;

    fn grouping_param(&self) -> Result<Uuid, AudioError>;
    fn set_grouping_param(&self, group: Uuid, context: EventContext) -> Result<(), AudioError>;

    fn process_id(&self) -> Result<u32, AudioError>;

    /// Executable name of the owning process; `None` for the system sounds
    /// session or when the process has already exited.
    fn process_name(&self) -> Option<String>;

    fn identifier(&self) -> Result<String, AudioError>;
    fn instance_identifier(&self) -> Result<String, AudioError>;
    fn is_system_sounds(&self) -> Result<bool, AudioError>;

    /// Set the display name only if it differs. Returns whether it was written.
    fn update_display_name(&self, name: &str, context: EventContext) -> Result<bool, AudioError> {
        if self.display_name()? == name {
            return Ok(false);
        }
        self.set_display_name(name, context)?;
        Ok(true)
    }

    /// Set the icon path only if it differs. Returns whether it was written.
    fn update_icon_path(&self, path: &str, context: EventContext) -> Result<bool, AudioError> {
        if self.icon_path()? == path {
            return Ok(false);
        }
        self.set_icon_path(path, context)?;
        Ok(true)
    }

    /// Read a snapshot of the session's identity and state.
    fn info(&self) -> Result<SessionInfo, AudioError> {
        Ok(SessionInfo {
            instance_id: self.instance_identifier()?,
            identifier: self.identifier()?,
            process_id: self.process_id()?,
            process_name: self.process_name(),
            display_name: self.display_name()?,
            icon_path: self.icon_path()?,
            state: Some(self.state()?),
            is_system_sounds: self.is_system_sounds()?,
        })
    }
}

pub trait SimpleVolumeApi {
    fn master_volume(&self) -> Result<f32, AudioError>;
    fn set_master_volume(&self, level: f32, context: EventContext) -> Result<(), AudioError>;
    fn mute(&self) -> Result<bool, AudioError>;
    fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError>;
}

pub trait ChannelVolumeApi {
    fn channel_count(&self) -> Result<u32, AudioError>;
    fn channel_volume(&self, channel: u32) -> Result<f32, AudioError>;
    fn set_channel_volume(
        &self,
        channel: u32,
        level: f32,
        context: EventContext,
    ) -> Result<(), AudioError>;
    fn all_volumes(&self) -> Result<Vec<f32>, AudioError>;
    fn set_all_volumes(&self, levels: &[f32], context: EventContext) -> Result<(), AudioError>;
}

/// File name part of a process image path, either separator style.
pub(crate) fn image_file_name(path: &str) -> Option<String> {
    path.rsplit(['\\', '/'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Flatten the session lists of several devices, keeping those in `state`.
///
/// Devices and sessions that disappear while the listing runs are skipped;
/// any other failure ends it.
pub(crate) fn gather_sessions<S, I>(
    per_device: I,
    state: Option<SessionState>,
) -> Result<Vec<S>, AudioError>
where
    S: SessionControlApi,
    I: IntoIterator<Item = Result<Vec<S>, AudioError>>,
{
    let mut sessions = Vec::new();
    for listing in per_device {
        let listing = match listing {
            Ok(listing) => listing,
            Err(AudioError::DeviceUnavailable) => {
                tracing::warn!("Skipping sessions of a device that went away");
                continue;
            }
            Err(e) => return Err(e),
        };
        for session in listing {
            let Some(wanted) = state else {
                sessions.push(session);
                continue;
            };
            match session.state() {
                Ok(current) if current == wanted => sessions.push(session),
                Ok(_) => {}
                Err(AudioError::DeviceUnavailable) => {
                    tracing::debug!("Skipping session that went away");
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(sessions)
}

/// Session master volume and mute, scoped to one session.
pub struct SessionVolume<S> {
    api: S,
}

impl<S: SimpleVolumeApi> SessionVolume<S> {
    pub fn new(api: S) -> Self {
        Self { api }
    }

    pub fn volume(&self) -> Result<f32, AudioError> {
        self.api.master_volume()
    }

    pub fn set_volume(&self, level: f32, context: EventContext) -> Result<(), AudioError> {
        check_level(level)?;
        self.api.set_master_volume(level, context)
    }

    pub fn mute(&self) -> Result<bool, AudioError> {
        self.api.mute()
    }

    pub fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError> {
        self.api.set_mute(muted, context)
    }

    pub fn toggle_mute(&self, context: EventContext) -> Result<bool, AudioError> {
        let new_state = !self.api.mute()?;
        self.api.set_mute(new_state, context)?;
        Ok(new_state)
    }

    pub fn raw(&self) -> &S {
        &self.api
    }
}

/// Per-channel session volume.
pub struct ChannelVolume<C> {
    api: C,
}

impl<C: ChannelVolumeApi> ChannelVolume<C> {
    pub fn new(api: C) -> Self {
        Self { api }
    }

    pub fn channel_count(&self) -> Result<u32, AudioError> {
        self.api.channel_count()
    }

    fn check_channel(&self, channel: u32) -> Result<(), AudioError> {
        let count = self.api.channel_count()?;
        if channel < count {
            Ok(())
        } else {
            Err(AudioError::InvalidChannel {
                index: channel,
                count,
            })
        }
    }

    pub fn channel_volume(&self, channel: u32) -> Result<f32, AudioError> {
        self.check_channel(channel)?;
        self.api.channel_volume(channel)
    }

    pub fn set_channel_volume(
        &self,
        channel: u32,
        level: f32,
        context: EventContext,
    ) -> Result<(), AudioError> {
        check_level(level)?;
        self.check_channel(channel)?;
        self.api.set_channel_volume(channel, level, context)
    }

    pub fn all_volumes(&self) -> Result<Vec<f32>, AudioError> {
        self.api.all_volumes()
    }

    /// Set every channel at once; `levels` must cover exactly the channel count.
    pub fn set_all_volumes(&self, levels: &[f32], context: EventContext) -> Result<(), AudioError> {
        for &level in levels {
            check_level(level)?;
        }
        let count = self.api.channel_count()?;
        if levels.len() != count as usize {
            return Err(AudioError::InvalidChannel {
                index: levels.len() as u32,
                count,
            });
        }
        self.api.set_all_volumes(levels, context)
    }
}
