//! Tests against the real audio stack. They need a Windows machine with at
//! least one active render endpoint; run with `cargo test -- --ignored`.
#![cfg(windows)]

use caw::audio::{
    Apartment, AudioError, CapabilityId, ComGuard, DataFlow, DeviceEnumerator, DeviceRole,
    DeviceState, EventContext, NotificationRegistry, SessionControlApi, StateFilter,
};
use std::time::Duration;

fn setup() -> (ComGuard, DeviceEnumerator) {
    let com = ComGuard::new(Apartment::MultiThreaded).unwrap();
    let enumerator = DeviceEnumerator::new().unwrap();
    (com, enumerator)
}

#[test]
#[ignore = "needs audio hardware"]
fn active_filter_only_yields_active_endpoints() {
    let (_com, enumerator) = setup();
    for device in enumerator.endpoints(DataFlow::All, StateFilter::ACTIVE).unwrap() {
        assert_eq!(device.unwrap().state().unwrap(), DeviceState::Active);
    }
}

#[test]
#[ignore = "needs audio hardware"]
fn filter_without_disabled_never_yields_disabled_endpoints() {
    let (_com, enumerator) = setup();
    let filter = StateFilter::all() - StateFilter::DISABLED;
    for device in enumerator.endpoints(DataFlow::All, filter).unwrap() {
        assert_ne!(device.unwrap().state().unwrap(), DeviceState::Disabled);
    }
}

#[test]
#[ignore = "needs audio hardware"]
fn default_endpoint_is_enumerated() {
    let (_com, enumerator) = setup();
    let default_id = enumerator
        .default_device_id(DataFlow::Render, DeviceRole::Multimedia)
        .unwrap()
        .expect("no default render endpoint");
    let ids: Vec<String> = enumerator
        .endpoints(DataFlow::Render, StateFilter::ACTIVE)
        .unwrap()
        .map(|d| d.unwrap().id().unwrap())
        .collect();
    assert!(ids.contains(&default_id));
    assert_eq!(enumerator.device(&default_id).unwrap().id().unwrap(), default_id);
}

#[test]
#[ignore = "needs audio hardware"]
fn unknown_device_id_is_not_found() {
    let (_com, enumerator) = setup();
    let err = enumerator
        .device("{0.0.0.00000000}.{00000000-0000-0000-0000-000000000000}")
        .unwrap_err();
    assert!(matches!(err, AudioError::DeviceNotFound { .. }), "{err:?}");
}

#[test]
#[ignore = "needs audio hardware"]
fn render_endpoint_supports_volume_and_sessions() {
    let (_com, enumerator) = setup();
    let speakers = enumerator.speakers().unwrap();
    assert!(speakers.supports(CapabilityId::EndpointVolume).unwrap());
    assert!(speakers.supports(CapabilityId::SessionManager).unwrap());
    assert!(speakers.mix_format().unwrap().is_some());

    let properties = speakers.properties();
    let name = properties.get("{A45C254E-DF1C-4EFD-8020-67D146A850E0} 14");
    assert_eq!(name, speakers.friendly_name().as_ref());

    let meter = speakers.level_meter().unwrap();
    assert!((0.0..=1.0).contains(&meter.peak().unwrap()));
    assert_eq!(
        meter.channel_peaks().unwrap().len() as u32,
        speakers.endpoint_volume().unwrap().channel_count().unwrap()
    );
}

#[test]
#[ignore = "changes the system volume"]
fn volume_round_trip_and_rejection() {
    let (_com, enumerator) = setup();
    let volume = enumerator.speakers().unwrap().endpoint_volume().unwrap();
    let original = volume.master_volume().unwrap();
    let context = EventContext::generate();

    volume.set_master_volume(0.37, context).unwrap();
    assert!((volume.master_volume().unwrap() - 0.37).abs() < 0.01);

    assert!(matches!(
        volume.set_master_volume(1.5, context),
        Err(AudioError::InvalidRange { .. })
    ));
    assert!((volume.master_volume().unwrap() - 0.37).abs() < 0.01);

    let range = volume.volume_range().unwrap();
    assert!(matches!(
        volume.set_master_volume_db(range.max_db + 10.0, context),
        Err(AudioError::OutOfRange { .. })
    ));

    let muted = volume.mute().unwrap();
    volume.toggle_mute(context).unwrap();
    volume.toggle_mute(context).unwrap();
    assert_eq!(volume.mute().unwrap(), muted);

    volume.set_master_volume(original, context).unwrap();
}

#[test]
#[ignore = "changes the system volume"]
fn own_volume_change_is_reported_with_context() {
    let (_com, enumerator) = setup();
    let volume = enumerator.speakers().unwrap().endpoint_volume().unwrap();
    let registry = NotificationRegistry::new();
    let (id, rx) = registry.subscribe(&volume).unwrap();
    let original = volume.master_volume().unwrap();
    let context = EventContext::generate();

    let target = if original > 0.5 { 0.25 } else { 0.75 };
    volume.set_master_volume(target, context).unwrap();
    let notification = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(notification.registration, id);
    assert!(notification.event.is_caused_by(context));

    registry.unregister(id).unwrap();
    registry.unregister(id).unwrap();
    while rx.try_recv().is_ok() {}
    volume.set_master_volume(original, EventContext::NONE).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
#[ignore = "needs audio hardware"]
fn sessions_report_consistent_identity() {
    let (_com, enumerator) = setup();
    for session in enumerator.sessions(DataFlow::Render, None).unwrap() {
        let info = session.info().unwrap();
        assert!(!info.instance_id.is_empty());
        if info.is_system_sounds {
            assert_eq!(info.process_id, 0);
        }
        let volume = session.volume().unwrap().volume().unwrap();
        assert!((0.0..=1.0).contains(&volume));
    }
}

#[test]
#[ignore = "needs audio hardware"]
fn session_events_registration_is_withdrawn() {
    let (_com, enumerator) = setup();
    let Some(session) = enumerator
        .sessions(DataFlow::Render, None)
        .unwrap()
        .into_iter()
        .next()
    else {
        return;
    };
    let registry = NotificationRegistry::new();
    let (id, rx) = registry.subscribe(&session).unwrap();
    registry.unregister(id).unwrap();

    let control = session.volume().unwrap();
    let level = control.volume().unwrap();
    control.set_volume(level, EventContext::generate()).unwrap();
    if let Ok(n) = rx.recv_timeout(Duration::from_millis(300)) {
        panic!("event after unregister: {:?}", n.event);
    }
}
