//! Engine handle and the Core Audio operations behind it.

use super::*;
use caw::audio::{
    AudioDevice, AudioSession, CapabilityId, ComGuard, DataFlow, DeviceEnumerator, DeviceInfo,
    DeviceRole, Listener, Notification, NotificationRegistry, RegistrationId, SessionControlApi,
    SessionInfo, SessionState, StateFilter, VolumeRange,
};
use caw::BindingConfig;
use serde::Deserialize;
use std::ffi::c_void;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

// ============================================================================
// Data Types for JSON Serialization
// ============================================================================

/// Response containing a list of devices.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceInfo>,
}

/// Response containing a list of sessions.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// Response containing the per-channel levels of an endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelVolumesResponse {
    pub channels: Vec<f32>,
}

// ============================================================================
// Engine Handle Type
// ============================================================================

/// Opaque handle to the engine. Actually points to a CawEngine struct.
pub type CawEngineHandle = *mut c_void;

/// Internal engine state.
///
/// Fields drop in declaration order: registrations are withdrawn before the
/// enumerator is released and COM is uninitialized last.
struct CawEngine {
    registry: NotificationRegistry,
    events: Receiver<Notification>,
    sender: Sender<Notification>,
    enumerator: DeviceEnumerator,
    _com: ComGuard,
}

impl CawEngine {
    fn new(config: &BindingConfig) -> Result<Self, AudioError> {
        let com = ComGuard::new(config.apartment)?;
        let enumerator = DeviceEnumerator::with_context(config.activation)?;
        let (sender, events) = mpsc::channel();
        Ok(Self {
            registry: NotificationRegistry::new(),
            events,
            sender,
            enumerator,
            _com: com,
        })
    }

    fn device(&self, device_id: *const c_char) -> Result<AudioDevice, Failure> {
        let id = unsafe { required_str(device_id, "device ID") }?;
        Ok(self.enumerator.device(id)?)
    }

    fn session(&self, instance_id: *const c_char) -> Result<AudioSession, Failure> {
        let id = unsafe { required_str(instance_id, "session instance ID") }?;
        for session in self.enumerator.sessions(DataFlow::All, None)? {
            if session.instance_identifier()? == id {
                return Ok(session);
            }
        }
        Err(AudioError::DeviceNotFound {
            what: format!("session {id}"),
        }
        .into())
    }

    fn listener(&self) -> Listener {
        Listener::from(self.sender.clone())
    }

    fn registered(&self, id: RegistrationId, out: *mut u64) -> Result<(), Failure> {
        if let Err(failure) = unsafe { write_out(out, id.as_u64()) } {
            // Nobody can unregister an id they never saw
            let _ = self.registry.unregister(id);
            return Err(failure);
        }
        Ok(())
    }
}

/// Resolve a handle to its engine.
unsafe fn engine<'a>(handle: CawEngineHandle) -> Result<&'a CawEngine, Failure> {
    (handle as *const CawEngine)
        .as_ref()
        .ok_or_else(|| Failure::new(ErrorCode::InvalidHandle, "Null engine handle"))
}

fn parse_flow(flow: i32) -> Result<DataFlow, Failure> {
    DataFlow::from_raw(flow).ok_or_else(|| Failure::invalid_argument("Invalid data flow"))
}

fn parse_role(role: i32) -> Result<DeviceRole, Failure> {
    DeviceRole::from_raw(role).ok_or_else(|| Failure::invalid_argument("Invalid role"))
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Create a new engine instance.
///
/// Initializes COM on the calling thread. The handle must only be used from
/// this thread.
///
/// # Arguments
/// * `config_json` - JSON configuration string (can be null for defaults):
///   `{"apartment": "multi_threaded" | "single_threaded",
///     "activation": "all" | "inproc_server" | "local_server",
///     "log_filter": "caw=debug"}`
///
/// # Returns
/// Handle to the engine, or null on failure. Check caw_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with caw_engine_destroy().
#[no_mangle]
pub extern "C" fn caw_engine_create(config_json: *const c_char) -> CawEngineHandle {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let config = if config_json.is_null() {
            BindingConfig::default()
        } else {
            let json = unsafe { required_str(config_json, "configuration") }?;
            BindingConfig::from_json(json)?
        };
        caw::logging::init(config.log_filter.as_deref());

        let engine = CawEngine::new(&config)?;
        tracing::debug!(?config, "Engine created");
        Ok::<_, Failure>(Box::into_raw(Box::new(engine)) as CawEngineHandle)
    });

    match result {
        Ok(Ok(handle)) => handle,
        Ok(Err(failure)) => {
            set_last_error(failure);
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error(Failure::new(ErrorCode::Panic, "Panic during engine creation"));
            ptr::null_mut()
        }
    }
}

/// Destroy an engine instance, withdrawing every notification registration.
///
/// # Safety
/// The handle must have been created by caw_engine_create() on this thread
/// and must not be used after this call.
#[no_mangle]
pub extern "C" fn caw_engine_destroy(handle: CawEngineHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let engine = Box::from_raw(handle as *mut CawEngine);
        tracing::debug!(registrations = engine.registry.len(), "Engine destroyed");
        drop(engine);
    });
}

// ============================================================================
// FFI Functions - Device Operations
// ============================================================================

/// Get the default endpoint for a flow and role.
///
/// # Arguments
/// * `flow` - 0 = Render, 1 = Capture
/// * `role` - 0 = Console, 1 = Multimedia, 2 = Communications
///
/// # Returns
/// JSON device object. Caller must free with caw_free_string().
/// Returns null on failure; DeviceNotFound if no default is configured.
#[no_mangle]
pub extern "C" fn caw_get_default_endpoint(
    handle: CawEngineHandle,
    flow: i32,
    role: i32,
) -> *mut c_char {
    ffi_json("default endpoint lookup", || {
        let engine = unsafe { engine(handle) }?;
        let device = engine
            .enumerator
            .default_endpoint(parse_flow(flow)?, parse_role(role)?)?;
        Ok(device.info()?)
    })
}

/// Enumerate endpoints.
///
/// # Arguments
/// * `flow` - 0 = Render, 1 = Capture, 2 = All
/// * `state_mask` - DEVICE_STATE_* bits (1 = Active, 2 = Disabled,
///   4 = NotPresent, 8 = Unplugged); 0 means Active
///
/// # Returns
/// JSON `{"devices": [...]}`. Caller must free with caw_free_string().
#[no_mangle]
pub extern "C" fn caw_enumerate_endpoints(
    handle: CawEngineHandle,
    flow: i32,
    state_mask: u32,
) -> *mut c_char {
    ffi_json("endpoint enumeration", || {
        let engine = unsafe { engine(handle) }?;
        let filter = match state_mask {
            0 => StateFilter::ACTIVE,
            mask => StateFilter::from_bits(mask)
                .ok_or_else(|| Failure::invalid_argument("Invalid state mask"))?,
        };
        let devices = engine
            .enumerator
            .endpoints(parse_flow(flow)?, filter)?
            .map(|device| device?.info())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DeviceListResponse { devices })
    })
}

/// Check whether an endpoint exposes a capability.
///
/// # Arguments
/// * `capability` - 0 = EndpointVolume, 1 = LevelMeter, 2 = SessionManager, 3 = AudioClient
///
/// # Returns
/// 1 if supported, 0 if not, negative error code on failure.
#[no_mangle]
pub extern "C" fn caw_device_supports(
    handle: CawEngineHandle,
    device_id: *const c_char,
    capability: u32,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle) }?;
        let id = CapabilityId::from_raw(capability)
            .ok_or_else(|| Failure::invalid_argument("Invalid capability"))?;
        Ok::<_, Failure>(engine.device(device_id)?.supports(id)?)
    });

    match result {
        Ok(Ok(supported)) => supported as i32,
        Ok(Err(failure)) => {
            let code = failure.code;
            set_last_error(failure);
            code as i32
        }
        Err(_) => {
            set_last_error(Failure::new(ErrorCode::Panic, "Panic during capability check"));
            ErrorCode::Panic as i32
        }
    }
}

// ============================================================================
// FFI Functions - Endpoint Volume
// ============================================================================

/// Get the master volume level (0.0 to 1.0).
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn caw_get_master_volume(
    handle: CawEngineHandle,
    device_id: *const c_char,
    out_level: *mut f32,
) -> i32 {
    ffi_status("get volume", || {
        let engine = unsafe { engine(handle) }?;
        let level = engine.device(device_id)?.endpoint_volume()?.master_volume()?;
        unsafe { write_out(out_level, level) }
    })
}

/// Set the master volume level.
///
/// # Arguments
/// * `level` - Volume level (0.0 to 1.0); anything else fails with InvalidRange
/// * `context` - Event context UUID, or null
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn caw_set_master_volume(
    handle: CawEngineHandle,
    device_id: *const c_char,
    level: f32,
    context: *const c_char,
) -> i32 {
    ffi_status("set volume", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        engine
            .device(device_id)?
            .endpoint_volume()?
            .set_master_volume(level, context)?;
        Ok(())
    })
}

/// Get the master volume in decibels.
#[no_mangle]
pub extern "C" fn caw_get_master_volume_db(
    handle: CawEngineHandle,
    device_id: *const c_char,
    out_db: *mut f32,
) -> i32 {
    ffi_status("get volume dB", || {
        let engine = unsafe { engine(handle) }?;
        let db = engine.device(device_id)?.endpoint_volume()?.master_volume_db()?;
        unsafe { write_out(out_db, db) }
    })
}

/// Set the master volume in decibels. Values outside the device range fail
/// with OutOfRange.
#[no_mangle]
pub extern "C" fn caw_set_master_volume_db(
    handle: CawEngineHandle,
    device_id: *const c_char,
    db: f32,
    context: *const c_char,
) -> i32 {
    ffi_status("set volume dB", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        engine
            .device(device_id)?
            .endpoint_volume()?
            .set_master_volume_db(db, context)?;
        Ok(())
    })
}

/// Get the decibel range of an endpoint.
///
/// # Returns
/// JSON `{"min_db": .., "max_db": .., "increment_db": ..}`.
/// Caller must free with caw_free_string().
#[no_mangle]
pub extern "C" fn caw_get_volume_range(
    handle: CawEngineHandle,
    device_id: *const c_char,
) -> *mut c_char {
    ffi_json("volume range", || {
        let engine = unsafe { engine(handle) }?;
        let range: VolumeRange = engine.device(device_id)?.endpoint_volume()?.volume_range()?;
        Ok(range)
    })
}

/// Get every channel level of an endpoint.
///
/// # Returns
/// JSON `{"channels": [..]}`. Caller must free with caw_free_string().
#[no_mangle]
pub extern "C" fn caw_get_channel_volumes(
    handle: CawEngineHandle,
    device_id: *const c_char,
) -> *mut c_char {
    ffi_json("channel volumes", || {
        let engine = unsafe { engine(handle) }?;
        let channels = engine.device(device_id)?.endpoint_volume()?.channel_volumes()?;
        Ok(ChannelVolumesResponse { channels })
    })
}

/// Set one channel level (0.0 to 1.0). A channel index past the last one
/// fails with InvalidChannel.
#[no_mangle]
pub extern "C" fn caw_set_channel_volume(
    handle: CawEngineHandle,
    device_id: *const c_char,
    channel: u32,
    level: f32,
    context: *const c_char,
) -> i32 {
    ffi_status("set channel volume", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        engine
            .device(device_id)?
            .endpoint_volume()?
            .set_channel_volume(channel, level, context)?;
        Ok(())
    })
}

/// Get the mute state of an endpoint.
///
/// # Arguments
/// * `out_muted` - receives 1 = muted, 0 = unmuted
#[no_mangle]
pub extern "C" fn caw_get_mute(
    handle: CawEngineHandle,
    device_id: *const c_char,
    out_muted: *mut i32,
) -> i32 {
    ffi_status("get mute", || {
        let engine = unsafe { engine(handle) }?;
        let muted = engine.device(device_id)?.endpoint_volume()?.mute()?;
        unsafe { write_out(out_muted, muted as i32) }
    })
}

/// Set the mute state of an endpoint.
///
/// # Arguments
/// * `muted` - 1 = muted, 0 = unmuted
#[no_mangle]
pub extern "C" fn caw_set_mute(
    handle: CawEngineHandle,
    device_id: *const c_char,
    muted: i32,
    context: *const c_char,
) -> i32 {
    ffi_status("set mute", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        engine
            .device(device_id)?
            .endpoint_volume()?
            .set_mute(muted != 0, context)?;
        Ok(())
    })
}

/// Toggle the mute state of an endpoint.
///
/// # Arguments
/// * `out_muted` - receives the new state, 1 = muted, 0 = unmuted
#[no_mangle]
pub extern "C" fn caw_toggle_mute(
    handle: CawEngineHandle,
    device_id: *const c_char,
    context: *const c_char,
    out_muted: *mut i32,
) -> i32 {
    ffi_status("toggle mute", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        let muted = engine
            .device(device_id)?
            .endpoint_volume()?
            .toggle_mute(context)?;
        unsafe { write_out(out_muted, muted as i32) }
    })
}

// ============================================================================
// FFI Functions - Sessions
// ============================================================================

/// Enumerate sessions on all active endpoints of a flow.
///
/// # Arguments
/// * `flow` - 0 = Render, 1 = Capture, 2 = All
/// * `active_only` - nonzero to list only sessions currently playing/recording
///
/// # Returns
/// JSON `{"sessions": [...]}`. Caller must free with caw_free_string().
#[no_mangle]
pub extern "C" fn caw_enumerate_sessions(
    handle: CawEngineHandle,
    flow: i32,
    active_only: i32,
) -> *mut c_char {
    ffi_json("session enumeration", || {
        let engine = unsafe { engine(handle) }?;
        let state = (active_only != 0).then_some(SessionState::Active);
        let sessions = engine
            .enumerator
            .sessions(parse_flow(flow)?, state)?
            .iter()
            .map(|s| s.info())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SessionListResponse { sessions })
    })
}

/// Get a session's volume (0.0 to 1.0), by session instance ID.
#[no_mangle]
pub extern "C" fn caw_get_session_volume(
    handle: CawEngineHandle,
    instance_id: *const c_char,
    out_level: *mut f32,
) -> i32 {
    ffi_status("get session volume", || {
        let engine = unsafe { engine(handle) }?;
        let level = engine.session(instance_id)?.volume()?.volume()?;
        unsafe { write_out(out_level, level) }
    })
}

/// Set a session's volume (0.0 to 1.0), by session instance ID.
#[no_mangle]
pub extern "C" fn caw_set_session_volume(
    handle: CawEngineHandle,
    instance_id: *const c_char,
    level: f32,
    context: *const c_char,
) -> i32 {
    ffi_status("set session volume", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        engine
            .session(instance_id)?
            .volume()?
            .set_volume(level, context)?;
        Ok(())
    })
}

/// Get a session's mute state, by session instance ID.
#[no_mangle]
pub extern "C" fn caw_get_session_mute(
    handle: CawEngineHandle,
    instance_id: *const c_char,
    out_muted: *mut i32,
) -> i32 {
    ffi_status("get session mute", || {
        let engine = unsafe { engine(handle) }?;
        let muted = engine.session(instance_id)?.volume()?.mute()?;
        unsafe { write_out(out_muted, muted as i32) }
    })
}

/// Set a session's mute state, by session instance ID.
#[no_mangle]
pub extern "C" fn caw_set_session_mute(
    handle: CawEngineHandle,
    instance_id: *const c_char,
    muted: i32,
    context: *const c_char,
) -> i32 {
    ffi_status("set session mute", || {
        let engine = unsafe { engine(handle) }?;
        let context = unsafe { parse_context(context) }?;
        engine
            .session(instance_id)?
            .volume()?
            .set_mute(muted != 0, context)?;
        Ok(())
    })
}

// ============================================================================
// FFI Functions - Notifications
// ============================================================================
//
// Every registration feeds the engine's event queue; drain it with
// caw_poll_event(). Once caw_unregister() returns, no further events of that
// registration are queued.

/// Register for device added/removed/state/default/property notifications.
///
/// # Arguments
/// * `out_registration` - receives the registration ID
#[no_mangle]
pub extern "C" fn caw_register_device_notifications(
    handle: CawEngineHandle,
    out_registration: *mut u64,
) -> i32 {
    ffi_status("device notification registration", || {
        let engine = unsafe { engine(handle) }?;
        let id = engine
            .registry
            .register(&engine.enumerator, engine.listener())?;
        engine.registered(id, out_registration)
    })
}

/// Register for volume and mute changes of an endpoint.
#[no_mangle]
pub extern "C" fn caw_register_endpoint_volume_notifications(
    handle: CawEngineHandle,
    device_id: *const c_char,
    out_registration: *mut u64,
) -> i32 {
    ffi_status("endpoint volume notification registration", || {
        let engine = unsafe { engine(handle) }?;
        let volume = engine.device(device_id)?.endpoint_volume()?;
        let id = engine.registry.register(&volume, engine.listener())?;
        engine.registered(id, out_registration)
    })
}

/// Register for sessions created on an endpoint.
#[no_mangle]
pub extern "C" fn caw_register_session_created_notifications(
    handle: CawEngineHandle,
    device_id: *const c_char,
    out_registration: *mut u64,
) -> i32 {
    ffi_status("session creation notification registration", || {
        let engine = unsafe { engine(handle) }?;
        let manager = engine.device(device_id)?.session_manager()?;
        let id = engine.registry.register(&manager, engine.listener())?;
        engine.registered(id, out_registration)
    })
}

/// Register for events of one session (volume, name, icon, grouping, state,
/// disconnect), by session instance ID.
#[no_mangle]
pub extern "C" fn caw_register_session_notifications(
    handle: CawEngineHandle,
    instance_id: *const c_char,
    out_registration: *mut u64,
) -> i32 {
    ffi_status("session notification registration", || {
        let engine = unsafe { engine(handle) }?;
        let session = engine.session(instance_id)?;
        let id = engine.registry.register(&session, engine.listener())?;
        engine.registered(id, out_registration)
    })
}

/// Withdraw a registration.
///
/// Repeating the call for the same ID succeeds; an ID this engine never
/// issued fails with InvalidHandle.
#[no_mangle]
pub extern "C" fn caw_unregister(handle: CawEngineHandle, registration: u64) -> i32 {
    ffi_status("unregister", || {
        let engine = unsafe { engine(handle) }?;
        engine
            .registry
            .unregister(RegistrationId::from_u64(registration))?;
        Ok(())
    })
}

/// Wait for the next queued notification.
///
/// Events still queued for a registration that has since been withdrawn
/// are discarded.
///
/// # Arguments
/// * `timeout_ms` - how long to wait; 0 returns immediately
///
/// # Returns
/// JSON `{"registration": id, "event": {"kind": .., ...}}`. Caller must free
/// with caw_free_string(). Returns null on timeout (last error code 0) or on
/// failure.
#[no_mangle]
pub extern "C" fn caw_poll_event(handle: CawEngineHandle, timeout_ms: u32) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = unsafe { engine(handle) }?;
        let timeout = Duration::from_millis(u64::from(timeout_ms));
        match engine.registry.recv_live(&engine.events, timeout) {
            Ok(notification) => Ok(Some(serde_json::to_string(&notification)?)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // The engine holds a sender, so this means it is being torn down
            Err(RecvTimeoutError::Disconnected) => {
                Err(Failure::new(ErrorCode::InvalidHandle, "Engine is shutting down"))
            }
        }
    });

    match result {
        Ok(Ok(Some(json))) => alloc_c_string(&json),
        Ok(Ok(None)) => ptr::null_mut(),
        Ok(Err(failure)) => {
            set_last_error(failure);
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error(Failure::new(ErrorCode::Panic, "Panic during event poll"));
            ptr::null_mut()
        }
    }
}
