//! Volume control using IAudioEndpointVolume.
//!
//! [`EndpointVolumeApi`] is the raw method table; [`VolumeController`] adds
//! argument validation on top of it so a rejected call never reaches the OS.

use super::error::AudioError;
use super::types::{EventContext, HardwareSupport, VolumeRange, VolumeStep};

/// Raw endpoint volume operations, one per native method.
pub trait EndpointVolumeApi {
    fn channel_count(&self) -> Result<u32, AudioError>;

    fn master_scalar(&self) -> Result<f32, AudioError>;
    fn set_master_scalar(&self, level: f32, context: EventContext) -> Result<(), AudioError>;

    fn master_db(&self) -> Result<f32, AudioError>;
    fn set_master_db(&self, db: f32, context: EventContext) -> Result<(), AudioError>;

    fn channel_scalar(&self, channel: u32) -> Result<f32, AudioError>;
    fn set_channel_scalar(
        &self,
        channel: u32,
        level: f32,
        context: EventContext,
    ) -> Result<(), AudioError>;

    fn channel_db(&self, channel: u32) -> Result<f32, AudioError>;
    fn set_channel_db(&self, channel: u32, db: f32, context: EventContext)
        -> Result<(), AudioError>;

    fn mute(&self) -> Result<bool, AudioError>;
    fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError>;

    fn volume_range(&self) -> Result<VolumeRange, AudioError>;
    fn step_info(&self) -> Result<VolumeStep, AudioError>;
    fn step_up(&self, context: EventContext) -> Result<(), AudioError>;
    fn step_down(&self, context: EventContext) -> Result<(), AudioError>;

    fn hardware_support(&self) -> Result<HardwareSupport, AudioError>;
}

pub(crate) fn check_level(level: f32) -> Result<(), AudioError> {
    // NaN fails both comparisons
    if (0.0..=1.0).contains(&level) {
        Ok(())
    } else {
        Err(AudioError::InvalidRange { level })
    }
}

/// Volume controller for a specific device.
pub struct VolumeController<A> {
    api: A,
}

impl<A: EndpointVolumeApi> VolumeController<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Get the current volume level (0.0 to 1.0).
    pub fn master_volume(&self) -> Result<f32, AudioError> {
        self.api.master_scalar()
    }

    /// Set the volume level (0.0 to 1.0).
    pub fn set_master_volume(&self, level: f32, context: EventContext) -> Result<(), AudioError> {
        check_level(level)?;
        self.api.set_master_scalar(level, context)
    }

    pub fn master_volume_db(&self) -> Result<f32, AudioError> {
        self.api.master_db()
    }

    /// Set the volume in decibels; must lie within [`Self::volume_range`].
    pub fn set_master_volume_db(&self, db: f32, context: EventContext) -> Result<(), AudioError> {
        let range = self.api.volume_range()?;
        if !range.contains(db) {
            return Err(AudioError::OutOfRange { db, range });
        }
        self.api.set_master_db(db, context)
    }

    /// Get the current mute state.
    pub fn mute(&self) -> Result<bool, AudioError> {
        self.api.mute()
    }

    /// Set the mute state.
    pub fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError> {
        self.api.set_mute(muted, context)
    }

    /// Toggle the mute state. Returns the new state.
    pub fn toggle_mute(&self, context: EventContext) -> Result<bool, AudioError> {
        let new_state = !self.api.mute()?;
        self.api.set_mute(new_state, context)?;
        Ok(new_state)
    }

    pub fn volume_range(&self) -> Result<VolumeRange, AudioError> {
        self.api.volume_range()
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
        self.api.channel_scalar(channel)
    }

    pub fn set_channel_volume(
        &self,
        channel: u32,
        level: f32,
        context: EventContext,
    ) -> Result<(), AudioError> {
        check_level(level)?;
        self.check_channel(channel)?;
        self.api.set_channel_scalar(channel, level, context)
    }

    pub fn channel_volume_db(&self, channel: u32) -> Result<f32, AudioError> {
        self.check_channel(channel)?;
        self.api.channel_db(channel)
    }

    pub fn set_channel_volume_db(
        &self,
        channel: u32,
        db: f32,
        context: EventContext,
    ) -> Result<(), AudioError> {
        self.check_channel(channel)?;
        let range = self.api.volume_range()?;
        if !range.contains(db) {
            return Err(AudioError::OutOfRange { db, range });
        }
        self.api.set_channel_db(channel, db, context)
    }

    /// Scalar volume of every channel, in channel order.
    pub fn channel_volumes(&self) -> Result<Vec<f32>, AudioError> {
        let count = self.api.channel_count()?;
        (0..count).map(|ch| self.api.channel_scalar(ch)).collect()
    }

    pub fn step_info(&self) -> Result<VolumeStep, AudioError> {
        self.api.step_info()
    }

    pub fn step_up(&self, context: EventContext) -> Result<(), AudioError> {
        self.api.step_up(context)
    }

    pub fn step_down(&self, context: EventContext) -> Result<(), AudioError> {
        self.api.step_down(context)
    }

    pub fn hardware_support(&self) -> Result<HardwareSupport, AudioError> {
        self.api.hardware_support()
    }

    /// The raw method table, for notification registration.
    pub fn raw(&self) -> &A {
        &self.api
    }
}

#[cfg(windows)]
pub use native::EndpointVolume;

#[cfg(windows)]
mod native {
    use super::*;
    use crate::audio::capability::{Capability, CapabilityId};
    use crate::audio::com::with_context;
    use crate::audio::error::native;
    use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;

    /// Volume controller over a device's IAudioEndpointVolume.
    pub type EndpointVolume = VolumeController<IAudioEndpointVolume>;

    impl Capability for EndpointVolume {
        const ID: CapabilityId = CapabilityId::EndpointVolume;
        type Interface = IAudioEndpointVolume;

        fn from_interface(interface: IAudioEndpointVolume) -> Self {
            VolumeController::new(interface)
        }
    }

    impl EndpointVolumeApi for IAudioEndpointVolume {
        fn channel_count(&self) -> Result<u32, AudioError> {
            unsafe { self.GetChannelCount() }.map_err(native("GetChannelCount"))
        }

        fn master_scalar(&self) -> Result<f32, AudioError> {
            unsafe { self.GetMasterVolumeLevelScalar() }
                .map_err(native("GetMasterVolumeLevelScalar"))
        }

        fn set_master_scalar(&self, level: f32, context: EventContext) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe {
                self.SetMasterVolumeLevelScalar(level, ctx)
            })
            .map_err(native("SetMasterVolumeLevelScalar"))
        }

        fn master_db(&self) -> Result<f32, AudioError> {
            unsafe { self.GetMasterVolumeLevel() }.map_err(native("GetMasterVolumeLevel"))
        }

        fn set_master_db(&self, db: f32, context: EventContext) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe { self.SetMasterVolumeLevel(db, ctx) })
                .map_err(native("SetMasterVolumeLevel"))
        }

        fn channel_scalar(&self, channel: u32) -> Result<f32, AudioError> {
            unsafe { self.GetChannelVolumeLevelScalar(channel) }
                .map_err(native("GetChannelVolumeLevelScalar"))
        }

        fn set_channel_scalar(
            &self,
            channel: u32,
            level: f32,
            context: EventContext,
        ) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe {
                self.SetChannelVolumeLevelScalar(channel, level, ctx)
            })
            .map_err(native("SetChannelVolumeLevelScalar"))
        }

        fn channel_db(&self, channel: u32) -> Result<f32, AudioError> {
            unsafe { self.GetChannelVolumeLevel(channel) }.map_err(native("GetChannelVolumeLevel"))
        }

        fn set_channel_db(
            &self,
            channel: u32,
            db: f32,
            context: EventContext,
        ) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe {
                self.SetChannelVolumeLevel(channel, db, ctx)
            })
            .map_err(native("SetChannelVolumeLevel"))
        }

        fn mute(&self) -> Result<bool, AudioError> {
            let muted = unsafe { self.GetMute() }.map_err(native("GetMute"))?;
            Ok(muted.as_bool())
        }

        fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe { self.SetMute(muted, ctx) })
                .map_err(native("SetMute"))
        }

        fn volume_range(&self) -> Result<VolumeRange, AudioError> {
            let mut range = VolumeRange {
                min_db: 0.0,
                max_db: 0.0,
                increment_db: 0.0,
            };
            unsafe {
                self.GetVolumeRange(
                    &mut range.min_db,
                    &mut range.max_db,
                    &mut range.increment_db,
                )
            }
            .map_err(native("GetVolumeRange"))?;
            Ok(range)
        }

        fn step_info(&self) -> Result<VolumeStep, AudioError> {
            let mut step = VolumeStep {
                step: 0,
                step_count: 0,
            };
            unsafe { self.GetVolumeStepInfo(&mut step.step, &mut step.step_count) }
                .map_err(native("GetVolumeStepInfo"))?;
            Ok(step)
        }

        fn step_up(&self, context: EventContext) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe { self.VolumeStepUp(ctx) })
                .map_err(native("VolumeStepUp"))
        }

        fn step_down(&self, context: EventContext) -> Result<(), AudioError> {
            with_context(context, |ctx| unsafe { self.VolumeStepDown(ctx) })
                .map_err(native("VolumeStepDown"))
        }

        fn hardware_support(&self) -> Result<HardwareSupport, AudioError> {
            let mask = unsafe { self.QueryHardwareSupport() }.map_err(native("QueryHardwareSupport"))?;
            Ok(HardwareSupport::from_bits_truncate(mask))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::error::NativeStatus;
    use std::cell::{Cell, RefCell};

    /// In-memory endpoint that behaves like the OS: values persist, and an
    /// unplugged device fails every call.
    pub(crate) struct FakeEndpoint {
        pub master: Cell<f32>,
        pub channels: RefCell<Vec<f32>>,
        pub muted: Cell<bool>,
        pub range: VolumeRange,
        pub unplugged: Cell<bool>,
        pub last_context: Cell<EventContext>,
        pub native_calls: Cell<u32>,
    }

    impl FakeEndpoint {
        pub(crate) fn stereo() -> Self {
            Self {
                master: Cell::new(0.5),
                channels: RefCell::new(vec![0.5, 0.5]),
                muted: Cell::new(false),
                range: VolumeRange {
                    min_db: -65.25,
                    max_db: 0.0,
                    increment_db: 0.03125,
                },
                unplugged: Cell::new(false),
                last_context: Cell::new(EventContext::NONE),
                native_calls: Cell::new(0),
            }
        }

        fn call(&self, name: &'static str) -> Result<(), AudioError> {
            self.native_calls.set(self.native_calls.get() + 1);
            if self.unplugged.get() {
                Err(AudioError::from_status(name, NativeStatus::DEVICE_INVALIDATED))
            } else {
                Ok(())
            }
        }

        fn db_to_scalar(&self, db: f32) -> f32 {
            (db - self.range.min_db) / (self.range.max_db - self.range.min_db)
        }

        fn scalar_to_db(&self, level: f32) -> f32 {
            self.range.min_db + level * (self.range.max_db - self.range.min_db)
        }
    }

    impl EndpointVolumeApi for FakeEndpoint {
        fn channel_count(&self) -> Result<u32, AudioError> {
            self.call("GetChannelCount")?;
            Ok(self.channels.borrow().len() as u32)
        }

        fn master_scalar(&self) -> Result<f32, AudioError> {
            self.call("GetMasterVolumeLevelScalar")?;
            Ok(self.master.get())
        }

        fn set_master_scalar(&self, level: f32, context: EventContext) -> Result<(), AudioError> {
            self.call("SetMasterVolumeLevelScalar")?;
            self.master.set(level);
            self.last_context.set(context);
            Ok(())
        }

        fn master_db(&self) -> Result<f32, AudioError> {
            self.call("GetMasterVolumeLevel")?;
            Ok(self.scalar_to_db(self.master.get()))
        }

        fn set_master_db(&self, db: f32, context: EventContext) -> Result<(), AudioError> {
            self.call("SetMasterVolumeLevel")?;
            self.master.set(self.db_to_scalar(db));
            self.last_context.set(context);
            Ok(())
        }

        fn channel_scalar(&self, channel: u32) -> Result<f32, AudioError> {
            self.call("GetChannelVolumeLevelScalar")?;
            Ok(self.channels.borrow()[channel as usize])
        }

        fn set_channel_scalar(
            &self,
            channel: u32,
            level: f32,
            context: EventContext,
        ) -> Result<(), AudioError> {
            self.call("SetChannelVolumeLevelScalar")?;
            self.channels.borrow_mut()[channel as usize] = level;
            self.last_context.set(context);
            Ok(())
        }

        fn channel_db(&self, channel: u32) -> Result<f32, AudioError> {
            self.call("GetChannelVolumeLevel")?;
            Ok(self.scalar_to_db(self.channels.borrow()[channel as usize]))
        }

        fn set_channel_db(
            &self,
            channel: u32,
            db: f32,
            context: EventContext,
        ) -> Result<(), AudioError> {
            self.call("SetChannelVolumeLevel")?;
            let level = self.db_to_scalar(db);
            self.channels.borrow_mut()[channel as usize] = level;
            self.last_context.set(context);
            Ok(())
        }

        fn mute(&self) -> Result<bool, AudioError> {
            self.call("GetMute")?;
            Ok(self.muted.get())
        }

        fn set_mute(&self, muted: bool, context: EventContext) -> Result<(), AudioError> {
            self.call("SetMute")?;
            self.muted.set(muted);
            self.last_context.set(context);
            Ok(())
        }

        fn volume_range(&self) -> Result<VolumeRange, AudioError> {
            self.call("GetVolumeRange")?;
            Ok(self.range)
        }

        fn step_info(&self) -> Result<VolumeStep, AudioError> {
            self.call("GetVolumeStepInfo")?;
            Ok(VolumeStep {
                step: (self.master.get() * 50.0).round() as u32,
                step_count: 51,
            })
        }

        fn step_up(&self, _context: EventContext) -> Result<(), AudioError> {
            self.call("VolumeStepUp")?;
            self.master.set((self.master.get() + 0.02).min(1.0));
            Ok(())
        }

        fn step_down(&self, _context: EventContext) -> Result<(), AudioError> {
            self.call("VolumeStepDown")?;
            self.master.set((self.master.get() - 0.02).max(0.0));
            Ok(())
        }

        fn hardware_support(&self) -> Result<HardwareSupport, AudioError> {
            self.call("QueryHardwareSupport")?;
            Ok(HardwareSupport::METER)
        }
    }

    #[test]
    fn test_set_then_get_master_volume() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        ctrl.set_master_volume(0.25, EventContext::NONE).unwrap();
        assert_eq!(ctrl.master_volume().unwrap(), 0.25);
    }

    #[test]
    fn test_out_of_range_scalar_leaves_volume_unchanged() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        for bad in [-0.01, 1.01, f32::NAN, f32::INFINITY] {
            let err = ctrl.set_master_volume(bad, EventContext::NONE).unwrap_err();
            assert!(matches!(err, AudioError::InvalidRange { .. }));
        }
        assert_eq!(ctrl.master_volume().unwrap(), 0.5);
    }

    #[test]
    fn test_db_outside_device_range() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        let err = ctrl.set_master_volume_db(3.0, EventContext::NONE).unwrap_err();
        assert!(matches!(err, AudioError::OutOfRange { db, .. } if db == 3.0));
        assert_eq!(ctrl.master_volume().unwrap(), 0.5);

        ctrl.set_master_volume_db(0.0, EventContext::NONE).unwrap();
        assert_eq!(ctrl.master_volume().unwrap(), 1.0);
        assert_eq!(ctrl.master_volume_db().unwrap(), 0.0);
    }

    #[test]
    fn test_double_toggle_restores_mute() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        ctrl.set_mute(true, EventContext::NONE).unwrap();
        assert!(ctrl.mute().unwrap());

        let original = ctrl.mute().unwrap();
        assert!(!ctrl.toggle_mute(EventContext::NONE).unwrap());
        assert!(ctrl.toggle_mute(EventContext::NONE).unwrap());
        assert_eq!(ctrl.mute().unwrap(), original);
    }

    #[test]
    fn test_channel_index_checked() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        ctrl.set_channel_volume(1, 0.75, EventContext::NONE).unwrap();
        assert_eq!(ctrl.channel_volumes().unwrap(), vec![0.5, 0.75]);

        let err = ctrl.channel_volume(2).unwrap_err();
        assert_eq!(err, AudioError::InvalidChannel { index: 2, count: 2 });
        let err = ctrl.set_channel_volume_db(0, 1.0, EventContext::NONE).unwrap_err();
        assert!(matches!(err, AudioError::OutOfRange { .. }));
    }

    #[test]
    fn test_unplugged_device_surfaces_unavailable() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        ctrl.raw().unplugged.set(true);
        assert_eq!(ctrl.master_volume().unwrap_err(), AudioError::DeviceUnavailable);
        assert_eq!(ctrl.mute().unwrap_err(), AudioError::DeviceUnavailable);
        assert_eq!(
            ctrl.set_master_volume_db(-10.0, EventContext::NONE).unwrap_err(),
            AudioError::DeviceUnavailable
        );
        assert_eq!(ctrl.volume_range().unwrap_err(), AudioError::DeviceUnavailable);
    }

    #[test]
    fn test_invalid_level_never_reaches_native_layer() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        let _ = ctrl.set_master_volume(2.0, EventContext::NONE);
        let _ = ctrl.set_channel_volume(0, -1.0, EventContext::NONE);
        assert_eq!(ctrl.raw().native_calls.get(), 0);
    }

    #[test]
    fn test_context_is_forwarded() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        let ctx = EventContext::generate();
        ctrl.set_mute(true, ctx).unwrap();
        assert_eq!(ctrl.raw().last_context.get(), ctx);
    }

    #[test]
    fn test_steps() {
        let ctrl = VolumeController::new(FakeEndpoint::stereo());
        ctrl.step_up(EventContext::NONE).unwrap();
        assert_eq!(ctrl.step_info().unwrap().step, 26);
        ctrl.step_down(EventContext::NONE).unwrap();
        ctrl.step_down(EventContext::NONE).unwrap();
        assert_eq!(ctrl.step_info().unwrap().step, 24);
        assert_eq!(ctrl.hardware_support().unwrap(), HardwareSupport::METER);
    }
}
