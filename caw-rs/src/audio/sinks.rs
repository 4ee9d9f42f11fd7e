//! COM callback objects handed to the OS, and the registrations that
//! withdraw them.
//!
//! Every callback translates its arguments into an [`AudioEvent`] and hands
//! it to the registration's [`EventSink`]; none of them block or call back
//! into the registry.

use super::com::context_from_ptr;
use super::endpoint::property_key_name;
use super::enumerator::DeviceEnumerator;
use super::error::{native, AudioError};
use super::events::AudioEvent;
use super::notifications::{EventSink, NativeRegistration, NotificationSource};
use super::session::SessionControlApi;
use super::session_manager::{AudioSession, SessionManager};
use super::types::{DataFlow, DeviceRole, DeviceState, DisconnectReason, SessionState};
use super::volume::EndpointVolume;
use windows::core::{implement, Interface, GUID, PCWSTR};
use windows::Win32::Media::Audio::Endpoints::{
    IAudioEndpointVolume, IAudioEndpointVolumeCallback, IAudioEndpointVolumeCallback_Impl,
};
use windows::Win32::Media::Audio::{
    AudioSessionDisconnectReason, AudioSessionState, EDataFlow, ERole, IAudioSessionControl,
    IAudioSessionControl2, IAudioSessionEvents, IAudioSessionEvents_Impl,
    IAudioSessionManager2, IAudioSessionNotification, IAudioSessionNotification_Impl,
    IMMDeviceEnumerator, IMMNotificationClient, IMMNotificationClient_Impl,
    AUDIO_VOLUME_NOTIFICATION_DATA, DEVICE_STATE,
};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
// The implement macro expands to paths under windows_core
#[allow(unused_imports)]
use windows_core;

fn pcwstr_to_string(s: &PCWSTR) -> Option<String> {
    if s.is_null() {
        None
    } else {
        unsafe { s.to_string().ok() }
    }
}

// ---------------------------------------------------------------------------
// Device changes (IMMNotificationClient)
// ---------------------------------------------------------------------------

#[implement(IMMNotificationClient)]
struct DeviceNotificationClient {
    sink: EventSink,
}

impl IMMNotificationClient_Impl for DeviceNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        if let Some(device_id) = pcwstr_to_string(pwstrdeviceid) {
            self.sink.dispatch(AudioEvent::DeviceStateChanged {
                device_id,
                new_state: DeviceState::from_raw(dwnewstate.0),
            });
        }
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        if let Some(device_id) = pcwstr_to_string(pwstrdeviceid) {
            self.sink.dispatch(AudioEvent::DeviceAdded { device_id });
        }
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        if let Some(device_id) = pcwstr_to_string(pwstrdeviceid) {
            self.sink.dispatch(AudioEvent::DeviceRemoved { device_id });
        }
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        self.sink.dispatch(AudioEvent::DefaultDeviceChanged {
            flow: DataFlow::from_raw(flow.0),
            role: DeviceRole::from_raw(role.0),
            device_id: pcwstr_to_string(pwstrdefaultdeviceid),
        });
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        if let Some(device_id) = pcwstr_to_string(pwstrdeviceid) {
            self.sink.dispatch(AudioEvent::PropertyValueChanged {
                device_id,
                key: property_key_name(key),
            });
        }
        Ok(())
    }
}

struct DeviceRegistration {
    enumerator: IMMDeviceEnumerator,
    client: IMMNotificationClient,
}

impl NativeRegistration for DeviceRegistration {
    fn unregister(&mut self) -> Result<(), AudioError> {
        unsafe {
            self.enumerator
                .UnregisterEndpointNotificationCallback(&self.client)
                .map_err(native("UnregisterEndpointNotificationCallback"))
        }
    }
}

impl NotificationSource for DeviceEnumerator {
    fn attach(&self, sink: EventSink) -> Result<Box<dyn NativeRegistration>, AudioError> {
        let enumerator = self.raw_enumerator().clone();
        let client: IMMNotificationClient = DeviceNotificationClient { sink }.into();
        unsafe { enumerator.RegisterEndpointNotificationCallback(&client) }
            .map_err(native("RegisterEndpointNotificationCallback"))?;
        Ok(Box::new(DeviceRegistration { enumerator, client }))
    }
}

// ---------------------------------------------------------------------------
// Endpoint volume (IAudioEndpointVolumeCallback)
// ---------------------------------------------------------------------------

#[implement(IAudioEndpointVolumeCallback)]
struct EndpointVolumeCallback {
    sink: EventSink,
}

impl IAudioEndpointVolumeCallback_Impl for EndpointVolumeCallback_Impl {
    fn OnNotify(&self, pnotify: *mut AUDIO_VOLUME_NOTIFICATION_DATA) -> windows::core::Result<()> {
        let Some(data) = (unsafe { pnotify.as_ref() }) else {
            return Ok(());
        };
        // afChannelVolumes is a variable-length trailing array
        let channel_volumes = unsafe {
            std::slice::from_raw_parts(data.afChannelVolumes.as_ptr(), data.nChannels as usize)
        }
        .to_vec();
        self.sink.dispatch(AudioEvent::EndpointVolumeChanged {
            context: unsafe { context_from_ptr(&data.guidEventContext) },
            muted: data.bMuted.as_bool(),
            master_volume: data.fMasterVolume,
            channel_volumes,
        });
        Ok(())
    }
}

struct EndpointVolumeRegistration {
    volume: IAudioEndpointVolume,
    callback: IAudioEndpointVolumeCallback,
}

impl NativeRegistration for EndpointVolumeRegistration {
    fn unregister(&mut self) -> Result<(), AudioError> {
        unsafe {
            self.volume
                .UnregisterControlChangeNotify(&self.callback)
                .map_err(native("UnregisterControlChangeNotify"))
        }
    }
}

impl NotificationSource for EndpointVolume {
    fn attach(&self, sink: EventSink) -> Result<Box<dyn NativeRegistration>, AudioError> {
        let volume = self.raw().clone();
        let callback: IAudioEndpointVolumeCallback = EndpointVolumeCallback { sink }.into();
        unsafe { volume.RegisterControlChangeNotify(&callback) }
            .map_err(native("RegisterControlChangeNotify"))?;
        Ok(Box::new(EndpointVolumeRegistration { volume, callback }))
    }
}

// ---------------------------------------------------------------------------
// New sessions (IAudioSessionNotification)
// ---------------------------------------------------------------------------

#[implement(IAudioSessionNotification)]
struct SessionNotificationClient {
    sink: EventSink,
}

impl IAudioSessionNotification_Impl for SessionNotificationClient_Impl {
    fn OnSessionCreated(
        &self,
        newsession: Option<&IAudioSessionControl>,
    ) -> windows::core::Result<()> {
        let session = newsession
            .and_then(|control| control.cast::<IAudioSessionControl2>().ok())
            .map(AudioSession::from_control);
        self.sink.dispatch(AudioEvent::SessionCreated {
            instance_id: session.as_ref().and_then(|s| s.instance_identifier().ok()),
            process_id: session.as_ref().and_then(|s| s.process_id().ok()),
        });
        Ok(())
    }
}

struct SessionCreatedRegistration {
    manager: IAudioSessionManager2,
    client: IAudioSessionNotification,
}

impl NativeRegistration for SessionCreatedRegistration {
    fn unregister(&mut self) -> Result<(), AudioError> {
        unsafe {
            self.manager
                .UnregisterSessionNotification(&self.client)
                .map_err(native("UnregisterSessionNotification"))
        }
    }
}

impl NotificationSource for SessionManager {
    fn attach(&self, sink: EventSink) -> Result<Box<dyn NativeRegistration>, AudioError> {
        let manager = self.raw().clone();
        // The manager only reports new sessions after its enumerator was requested once
        unsafe { manager.GetSessionEnumerator() }.map_err(native("GetSessionEnumerator"))?;
        let client: IAudioSessionNotification = SessionNotificationClient { sink }.into();
        unsafe { manager.RegisterSessionNotification(&client) }
            .map_err(native("RegisterSessionNotification"))?;
        Ok(Box::new(SessionCreatedRegistration { manager, client }))
    }
}

// ---------------------------------------------------------------------------
// Session events (IAudioSessionEvents)
// ---------------------------------------------------------------------------

#[implement(IAudioSessionEvents)]
struct SessionEventsClient {
    sink: EventSink,
}

impl IAudioSessionEvents_Impl for SessionEventsClient_Impl {
    fn OnDisplayNameChanged(
        &self,
        newdisplayname: &PCWSTR,
        eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        self.sink.dispatch(AudioEvent::SessionDisplayNameChanged {
            display_name: pcwstr_to_string(newdisplayname).unwrap_or_default(),
            context: unsafe { context_from_ptr(eventcontext) },
        });
        Ok(())
    }

    fn OnIconPathChanged(
        &self,
        newiconpath: &PCWSTR,
        eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        self.sink.dispatch(AudioEvent::SessionIconPathChanged {
            icon_path: pcwstr_to_string(newiconpath).unwrap_or_default(),
            context: unsafe { context_from_ptr(eventcontext) },
        });
        Ok(())
    }

    fn OnSimpleVolumeChanged(
        &self,
        newvolume: f32,
        newmute: windows::Win32::Foundation::BOOL,
        eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        self.sink.dispatch(AudioEvent::SessionVolumeChanged {
            volume: newvolume,
            muted: newmute.as_bool(),
            context: unsafe { context_from_ptr(eventcontext) },
        });
        Ok(())
    }

    fn OnChannelVolumeChanged(
        &self,
        channelcount: u32,
        newchannelvolumearray: *const f32,
        changedchannel: u32,
        eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        let channel_volumes = if newchannelvolumearray.is_null() {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(newchannelvolumearray, channelcount as usize) }
                .to_vec()
        };
        self.sink.dispatch(AudioEvent::SessionChannelVolumeChanged {
            channel_volumes,
            // (DWORD)-1 means every channel changed
            changed_channel: (changedchannel != u32::MAX).then_some(changedchannel),
            context: unsafe { context_from_ptr(eventcontext) },
        });
        Ok(())
    }

    fn OnGroupingParamChanged(
        &self,
        newgroupingparam: *const GUID,
        eventcontext: *const GUID,
    ) -> windows::core::Result<()> {
        let grouping_param = unsafe { newgroupingparam.as_ref() }
            .map(|g| format!("{g:?}"))
            .unwrap_or_default();
        self.sink.dispatch(AudioEvent::SessionGroupingChanged {
            grouping_param,
            context: unsafe { context_from_ptr(eventcontext) },
        });
        Ok(())
    }

    fn OnStateChanged(&self, newstate: AudioSessionState) -> windows::core::Result<()> {
        self.sink.dispatch(AudioEvent::SessionStateChanged {
            state: SessionState::from_raw(newstate.0),
        });
        Ok(())
    }

    fn OnSessionDisconnected(
        &self,
        disconnectreason: AudioSessionDisconnectReason,
    ) -> windows::core::Result<()> {
        self.sink.dispatch(AudioEvent::SessionDisconnected {
            reason: DisconnectReason::from_raw(disconnectreason.0),
        });
        Ok(())
    }
}

struct SessionEventsRegistration {
    control: IAudioSessionControl2,
    events: IAudioSessionEvents,
}

impl NativeRegistration for SessionEventsRegistration {
    fn unregister(&mut self) -> Result<(), AudioError> {
        unsafe {
            self.control
                .UnregisterAudioSessionNotification(&self.events)
                .map_err(native("UnregisterAudioSessionNotification"))
        }
    }
}

impl NotificationSource for AudioSession {
    fn attach(&self, sink: EventSink) -> Result<Box<dyn NativeRegistration>, AudioError> {
        let control = self.raw().clone();
        let events: IAudioSessionEvents = SessionEventsClient { sink }.into();
        unsafe { control.RegisterAudioSessionNotification(&events) }
            .map_err(native("RegisterAudioSessionNotification"))?;
        Ok(Box::new(SessionEventsRegistration { control, events }))
    }
}
