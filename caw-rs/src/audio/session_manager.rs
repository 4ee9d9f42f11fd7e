//! Session enumeration and per-session handles over IAudioSessionManager2.

use super::capability::{Capability, CapabilityId};
use super::com::{with_context, CoTaskString, WideString};
use super::error::{native, AudioError};
use super::session::{
    image_file_name, ChannelVolume, ChannelVolumeApi, SessionControlApi, SessionVolume,
    SimpleVolumeApi,
};
use super::types::{EventContext, SessionState};
use uuid::Uuid;
use windows::core::{Interface, GUID, PWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE, S_OK};
use windows::Win32::Media::Audio::{
    IAudioSessionControl2, IAudioSessionManager2, IChannelAudioVolume, ISimpleAudioVolume,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};

/// Session manager of one endpoint.
pub struct SessionManager {
    manager: IAudioSessionManager2,
}

impl Capability for SessionManager {
    const ID: CapabilityId = CapabilityId::SessionManager;
    type Interface = IAudioSessionManager2;

    fn from_interface(manager: IAudioSessionManager2) -> Self {
        Self { manager }
    }
}

impl SessionManager {
    /// Sessions open on the endpoint right now.
    pub fn sessions(&self) -> Result<Vec<AudioSession>, AudioError> {
        unsafe {
            let enumerator = self
                .manager
                .GetSessionEnumerator()
                .map_err(native("GetSessionEnumerator"))?;
            let count = enumerator
                .GetCount()
                .map_err(native("IAudioSessionEnumerator::GetCount"))?;

            let mut sessions = Vec::with_capacity(count.max(0) as usize);
            for i in 0..count {
                let control = enumerator
                    .GetSession(i)
                    .map_err(native("IAudioSessionEnumerator::GetSession"))?;
                match control.cast::<IAudioSessionControl2>() {
                    Ok(control) => sessions.push(AudioSession { control }),
                    Err(e) => {
                        tracing::warn!(index = i, error = %e, "Skipping session without IAudioSessionControl2");
                    }
                }
            }
            tracing::debug!(count = sessions.len(), "Enumerated sessions");
            Ok(sessions)
        }
    }

    /// Get the raw IAudioSessionManager2 for notification registration.
    pub fn raw(&self) -> &IAudioSessionManager2 {
        &self.manager
    }
}

/// Handle to one audio session. The COM reference is released on drop.
#[derive(Clone)]
pub struct AudioSession {
    control: IAudioSessionControl2,
}

impl AudioSession {
    pub(crate) fn from_control(control: IAudioSessionControl2) -> Self {
        Self { control }
    }

    /// Master volume and mute of this session.
    pub fn volume(&self) -> Result<SessionVolume<ISimpleAudioVolume>, AudioError> {
        let simple: ISimpleAudioVolume = self
            .control
            .cast()
            .map_err(native("QueryInterface(ISimpleAudioVolume)"))?;
        Ok(SessionVolume::new(simple))
    }

    /// Per-channel volume of this session.
    pub fn channels(&self) -> Result<ChannelVolume<IChannelAudioVolume>, AudioError> {
        let channels: IChannelAudioVolume = self
            .control
            .cast()
            .map_err(native("QueryInterface(IChannelAudioVolume)"))?;
        Ok(ChannelVolume::new(channels))
    }

    /// Get the raw IAudioSessionControl2 for notification registration.
    pub fn raw(&self) -> &IAudioSessionControl2 {
        &self.control
    }
}

impl SessionControlApi for AudioSession {
    fn state(&self) -> Result<SessionState, AudioError> {
        let state = unsafe { self.control.GetState() }.map_err(native("GetState"))?;
        Ok(SessionState::from_raw(state.0).unwrap_or(SessionState::Inactive))
    }

    fn display_name(&self) -> Result<String, AudioError> {
        let name = unsafe { self.control.GetDisplayName() }.map_err(native("GetDisplayName"))?;
        unsafe { CoTaskString::new(name) }.to_string_lossless()
    }

    fn set_display_name(&self, name: &str, context: EventContext) -> Result<(), AudioError> {
        let wide = WideString::new(name);
        with_context(context, |ctx| unsafe {
            self.control.SetDisplayName(wide.as_pcwstr(), ctx)
        })
        .map_err(native("SetDisplayName"))
    }

    fn icon_path(&self) -> Result<String, AudioError> {
        let path = unsafe { self.control.GetIconPath() }.map_err(native("GetIconPath"))?;
        unsafe { CoTaskString::new(path) }.to_string_lossless()
    }

    fn set_icon_path(&self, path: &str, context: EventContext) -> Result<(), AudioError> {
        let wide = WideString::new(path);
        with_context(context, |ctx| unsafe {
            self.control.SetIconPath(wide.as_pcwstr(), ctx)
        })
        .map_err(native("SetIconPath"))
    }

    fn grouping_param(&self) -> Result<Uuid, AudioError> {
        let guid = unsafe { self.control.GetGroupingParam() }.map_err(native("GetGroupingParam"))?;
        Ok(Uuid::from_u128(guid.to_u128()))
    }

    fn set_grouping_param(&self, group: Uuid, context: EventContext) -> Result<(), AudioError> {
        let guid = GUID::from_u128(group.as_u128());
        with_context(context, |ctx| unsafe {
            self.control.SetGroupingParam(&guid, ctx)
        })
        .map_err(native("SetGroupingParam"))
    }

    fn process_id(&self) -> Result<u32, AudioError> {
        unsafe { self.control.GetProcessId() }.map_err(native("GetProcessId"))
    }

    fn process_name(&self) -> Option<String> {
        let pid = self.process_id().ok()?;
        process_image(pid).as_deref().and_then(image_file_name)
    }

    fn identifier(&self) -> Result<String, AudioError> {
        let id = unsafe { self.control.GetSessionIdentifier() }
            .map_err(native("GetSessionIdentifier"))?;
        unsafe { CoTaskString::new(id) }.to_string_lossless()
    }

    fn instance_identifier(&self) -> Result<String, AudioError> {
        let id = unsafe { self.control.GetSessionInstanceIdentifier() }
            .map_err(native("GetSessionInstanceIdentifier"))?;
        unsafe { CoTaskString::new(id) }.to_string_lossless()
    }

    fn is_system_sounds(&self) -> Result<bool, AudioError> {
        let hr = unsafe { self.control.IsSystemSoundsSession() };
        hr.ok().map_err(native("IsSystemSoundsSession"))?;
        Ok(hr == S_OK)
    }
}

struct ProcessHandle(HANDLE);

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// Full image path of process `pid`. `None` when the process has exited or
/// cannot be queried.
fn process_image(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }
    let process = match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) } {
        Ok(handle) => ProcessHandle(handle),
        Err(e) => {
            tracing::debug!(pid, error = %e, "Cannot open session process");
            return None;
        }
    };

    let mut path = vec![0u16; 32_768];
    let mut len = path.len() as u32;
    let queried = unsafe {
        QueryFullProcessImageNameW(process.0, PROCESS_NAME_WIN32, PWSTR(path.as_mut_ptr()), &mut len)
    };
    if let Err(e) = queried {
        tracing::debug!(pid, error = %e, "Cannot read session process image");
        return None;
    }
    path.truncate(len as usize);
    Some(String::from_utf16_lossy(&path))
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("instance_id", &self.instance_identifier().ok())
            .finish()
    }
}

impl SimpleVolumeApi for ISimpleAudioVolume {
    fn master_volume(&self) -> Result<f32, AudioError> {
        unsafe { self.GetMasterVolume() }.map_err(native("ISimpleAudioVolume::GetMasterVolume"))
    }

    fn set_master_volume(&self, level: f32, context: EventContext) -> Result<(), AudioError> {
        with_context(context, |ctx| unsafe { self.SetMasterVolume(level, ctx) })
            .map_err(native("ISimpleAudioVolume::SetMasterVolume"))
    }

    fn mute(&self) -> Result<bool, AudioError> {
        let muted = unsafe { self.GetMute() }.map_err(native("ISimpleAudioVolume::GetMute"))?;
        Ok(muted.as_bool())
    }

    fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError> {
        with_context(context, |ctx| unsafe { self.SetMute(muted, ctx) })
            .map_err(native("ISimpleAudioVolume::SetMute"))
    }
}

impl ChannelVolumeApi for IChannelAudioVolume {
    fn channel_count(&self) -> Result<u32, AudioError> {
        unsafe { self.GetChannelCount() }.map_err(native("IChannelAudioVolume::GetChannelCount"))
    }

    fn channel_volume(&self, channel: u32) -> Result<f32, AudioError> {
        unsafe { self.GetChannelVolume(channel) }
            .map_err(native("IChannelAudioVolume::GetChannelVolume"))
    }

    fn set_channel_volume(
        &self,
        channel: u32,
        level: f32,
        context: EventContext,
    ) -> Result<(), AudioError> {
        with_context(context, |ctx| unsafe {
            self.SetChannelVolume(channel, level, ctx)
        })
        .map_err(native("IChannelAudioVolume::SetChannelVolume"))
    }

    fn all_volumes(&self) -> Result<Vec<f32>, AudioError> {
        let count = self.channel_count()?;
        let mut levels = vec![0.0f32; count as usize];
        unsafe { self.GetAllVolumes(&mut levels) }
            .map_err(native("IChannelAudioVolume::GetAllVolumes"))?;
        Ok(levels)
    }

    fn set_all_volumes(&self, levels: &[f32], context: EventContext) -> Result<(), AudioError> {
        with_context(context, |ctx| unsafe { self.SetAllVolumes(levels, ctx) })
            .map_err(native("IChannelAudioVolume::SetAllVolumes"))
    }
}
