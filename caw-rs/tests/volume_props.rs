use caw::audio::session::{ChannelVolumeApi, SimpleVolumeApi};
use caw::audio::{
    AudioError, ChannelVolume, EndpointVolumeApi, EventContext, HardwareSupport, SessionVolume,
    VolumeController, VolumeRange, VolumeStep,
};
use proptest::prelude::*;
use std::cell::{Cell, RefCell};

const RANGE: VolumeRange = VolumeRange {
    min_db: -65.25,
    max_db: 0.0,
    increment_db: 0.03125,
};

/// In-memory endpoint. Counts every write that reaches it.
struct Endpoint {
    master: Cell<f32>,
    master_db: Cell<f32>,
    channels: RefCell<Vec<f32>>,
    muted: Cell<bool>,
    writes: Cell<u32>,
}

impl Endpoint {
    fn new(channels: usize) -> Self {
        Self {
            master: Cell::new(0.5),
            master_db: Cell::new(-10.0),
            channels: RefCell::new(vec![0.5; channels]),
            muted: Cell::new(false),
            writes: Cell::new(0),
        }
    }

    fn wrote(&self) {
        self.writes.set(self.writes.get() + 1);
    }
}

impl EndpointVolumeApi for Endpoint {
    fn channel_count(&self) -> Result<u32, AudioError> {
        Ok(self.channels.borrow().len() as u32)
    }

    fn master_scalar(&self) -> Result<f32, AudioError> {
        Ok(self.master.get())
    }

    fn set_master_scalar(&self, level: f32, _context: EventContext) -> Result<(), AudioError> {
        self.wrote();
        self.master.set(level);
        Ok(())
    }

    fn master_db(&self) -> Result<f32, AudioError> {
        Ok(self.master_db.get())
    }

    fn set_master_db(&self, db: f32, _context: EventContext) -> Result<(), AudioError> {
        self.wrote();
        self.master_db.set(db);
        Ok(())
    }

    fn channel_scalar(&self, channel: u32) -> Result<f32, AudioError> {
        Ok(self.channels.borrow()[channel as usize])
    }

    fn set_channel_scalar(
        &self,
        channel: u32,
        level: f32,
        _context: EventContext,
    ) -> Result<(), AudioError> {
        self.wrote();
        self.channels.borrow_mut()[channel as usize] = level;
        Ok(())
    }

    fn channel_db(&self, _channel: u32) -> Result<f32, AudioError> {
        Ok(self.master_db.get())
    }

    fn set_channel_db(
        &self,
        _channel: u32,
        _db: f32,
        _context: EventContext,
    ) -> Result<(), AudioError> {
        self.wrote();
        Ok(())
    }

    fn mute(&self) -> Result<bool, AudioError> {
        Ok(self.muted.get())
    }

    fn set_mute(&self, muted: bool, _context: EventContext) -> Result<(), AudioError> {
        self.wrote();
        self.muted.set(muted);
        Ok(())
    }

    fn volume_range(&self) -> Result<VolumeRange, AudioError> {
        Ok(RANGE)
    }

    fn step_info(&self) -> Result<VolumeStep, AudioError> {
        Ok(VolumeStep {
            step: 0,
            step_count: 100,
        })
    }

    fn step_up(&self, _context: EventContext) -> Result<(), AudioError> {
        Ok(())
    }

    fn step_down(&self, _context: EventContext) -> Result<(), AudioError> {
        Ok(())
    }

    fn hardware_support(&self) -> Result<HardwareSupport, AudioError> {
        Ok(HardwareSupport::empty())
    }
}

/// In-memory session volume.
#[derive(Default)]
struct Session {
    volume: Cell<f32>,
    muted: Cell<bool>,
    channels: RefCell<Vec<f32>>,
    writes: Cell<u32>,
}

impl SimpleVolumeApi for Session {
    fn master_volume(&self) -> Result<f32, AudioError> {
        Ok(self.volume.get())
    }

    fn set_master_volume(&self, level: f32, _context: EventContext) -> Result<(), AudioError> {
        self.writes.set(self.writes.get() + 1);
        self.volume.set(level);
        Ok(())
    }

    fn mute(&self) -> Result<bool, AudioError> {
        Ok(self.muted.get())
    }

    fn set_mute(&self, muted: bool, _context: EventContext) -> Result<(), AudioError> {
        self.writes.set(self.writes.get() + 1);
        self.muted.set(muted);
        Ok(())
    }
}

impl ChannelVolumeApi for Session {
    fn channel_count(&self) -> Result<u32, AudioError> {
        Ok(self.channels.borrow().len() as u32)
    }

    fn channel_volume(&self, channel: u32) -> Result<f32, AudioError> {
        Ok(self.channels.borrow()[channel as usize])
    }

    fn set_channel_volume(
        &self,
        channel: u32,
        level: f32,
        _context: EventContext,
    ) -> Result<(), AudioError> {
        self.writes.set(self.writes.get() + 1);
        self.channels.borrow_mut()[channel as usize] = level;
        Ok(())
    }

    fn all_volumes(&self) -> Result<Vec<f32>, AudioError> {
        Ok(self.channels.borrow().clone())
    }

    fn set_all_volumes(&self, levels: &[f32], _context: EventContext) -> Result<(), AudioError> {
        self.writes.set(self.writes.get() + 1);
        *self.channels.borrow_mut() = levels.to_vec();
        Ok(())
    }
}

fn outside_unit() -> impl Strategy<Value = f32> {
    prop_oneof![
        1.000_001f32..1.0e6,
        -1.0e6f32..-1.0e-6,
        Just(f32::NAN),
        Just(f32::INFINITY),
        Just(f32::NEG_INFINITY),
    ]
}

proptest! {
    #[test]
    fn master_volume_round_trips_inside_unit_range(level in 0.0f32..=1.0) {
        let controller = VolumeController::new(Endpoint::new(2));
        controller.set_master_volume(level, EventContext::NONE).unwrap();
        let read = controller.master_volume().unwrap();
        prop_assert!((read - level).abs() <= 1e-6);
    }

    #[test]
    fn master_volume_outside_unit_range_is_rejected_untouched(level in outside_unit()) {
        let controller = VolumeController::new(Endpoint::new(2));
        let before = controller.master_volume().unwrap();
        let err = controller.set_master_volume(level, EventContext::NONE).unwrap_err();
        prop_assert!(matches!(err, AudioError::InvalidRange { .. }), "unexpected {err:?}");
        prop_assert_eq!(controller.master_volume().unwrap(), before);
        prop_assert_eq!(controller.raw().writes.get(), 0);
    }

    #[test]
    fn double_toggle_restores_mute(initial in any::<bool>()) {
        let controller = VolumeController::new(Endpoint::new(2));
        controller.set_mute(initial, EventContext::NONE).unwrap();
        let first = controller.toggle_mute(EventContext::NONE).unwrap();
        prop_assert_eq!(first, !initial);
        let second = controller.toggle_mute(EventContext::NONE).unwrap();
        prop_assert_eq!(second, initial);
        prop_assert_eq!(controller.mute().unwrap(), initial);
    }

    #[test]
    fn db_writes_are_accepted_exactly_inside_the_range(db in -200.0f32..100.0) {
        let controller = VolumeController::new(Endpoint::new(2));
        let before = controller.master_volume_db().unwrap();
        let result = controller.set_master_volume_db(db, EventContext::NONE);
        if RANGE.contains(db) {
            prop_assert!(result.is_ok());
            prop_assert_eq!(controller.master_volume_db().unwrap(), db);
        } else {
            prop_assert!(
                matches!(result, Err(AudioError::OutOfRange { .. })),
                "unexpected {result:?}"
            );
            prop_assert_eq!(controller.master_volume_db().unwrap(), before);
        }
    }

    #[test]
    fn channel_index_must_be_below_count(count in 0usize..8, channel in 0u32..16) {
        let controller = VolumeController::new(Endpoint::new(count));
        let result = controller.set_channel_volume(channel, 0.25, EventContext::NONE);
        if (channel as usize) < count {
            prop_assert!(result.is_ok());
            prop_assert_eq!(controller.channel_volume(channel).unwrap(), 0.25);
        } else {
            prop_assert_eq!(
                result,
                Err(AudioError::InvalidChannel { index: channel, count: count as u32 })
            );
            prop_assert_eq!(controller.raw().writes.get(), 0);
        }
    }

    #[test]
    fn session_volume_matches_endpoint_validation(level in prop_oneof![0.0f32..=1.0, outside_unit()]) {
        let volume = SessionVolume::new(Session::default());
        let result = volume.set_volume(level, EventContext::NONE);
        if (0.0..=1.0).contains(&level) {
            prop_assert!(result.is_ok());
            prop_assert_eq!(volume.volume().unwrap(), level);
        } else {
            prop_assert!(
                matches!(result, Err(AudioError::InvalidRange { .. })),
                "unexpected {result:?}"
            );
            prop_assert_eq!(volume.raw().writes.get(), 0);
        }
    }

    #[test]
    fn set_all_volumes_needs_one_level_per_channel(
        count in 1usize..8,
        levels in proptest::collection::vec(0.0f32..=1.0, 0..10),
    ) {
        let session = Session {
            channels: RefCell::new(vec![1.0; count]),
            ..Session::default()
        };
        let channels = ChannelVolume::new(session);
        let result = channels.set_all_volumes(&levels, EventContext::NONE);
        if levels.len() == count {
            prop_assert!(result.is_ok());
            prop_assert_eq!(channels.all_volumes().unwrap(), levels);
        } else {
            prop_assert!(
                matches!(result, Err(AudioError::InvalidChannel { .. })),
                "unexpected {result:?}"
            );
            prop_assert_eq!(channels.all_volumes().unwrap(), vec![1.0; count]);
        }
    }
}
