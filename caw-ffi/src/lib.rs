//! FFI bindings for the caw Core Audio binding.
//!
//! This crate provides C ABI functions for scripting hosts (ctypes, P/Invoke,
//! ffi). Structured results are exchanged as JSON strings. All functions use
//! panic::catch_unwind to prevent Rust panics from unwinding across the FFI
//! boundary.
//!
//! An engine handle owns the COM initialization of the thread that created
//! it and must only be used from that thread.

use caw::{AudioError, EventContext};
use serde::Serialize;
use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, UnwindSafe};
use std::ptr;

#[cfg(windows)]
mod engine;
#[cfg(windows)]
pub use engine::*;

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    DeviceNotFound = -3,
    ComError = -4,
    JsonError = -5,
    UnsupportedCapability = -6,
    InvalidRange = -7,
    DeviceUnavailable = -8,
    NativeCallFailure = -9,
    OutOfRange = -10,
    InvalidChannel = -11,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            AudioError::UnsupportedCapability { .. } => ErrorCode::UnsupportedCapability,
            AudioError::InvalidRange { .. } => ErrorCode::InvalidRange,
            AudioError::OutOfRange { .. } => ErrorCode::OutOfRange,
            AudioError::InvalidChannel { .. } => ErrorCode::InvalidChannel,
            AudioError::DeviceUnavailable => ErrorCode::DeviceUnavailable,
            AudioError::InvalidHandle => ErrorCode::InvalidHandle,
            AudioError::ComInitFailed(_) => ErrorCode::ComError,
            AudioError::NativeCallFailure { .. } => ErrorCode::NativeCallFailure,
            AudioError::StringConversion(_) => ErrorCode::InvalidArgument,
        }
    }
}

/// A failed call, as reported through the last-error functions.
#[derive(Debug, Clone, PartialEq)]
struct Failure {
    code: ErrorCode,
    message: String,
    /// HRESULT of the failing native call, if any
    status: Option<i32>,
}

impl Failure {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
        }
    }

    fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }
}

impl From<AudioError> for Failure {
    fn from(err: AudioError) -> Self {
        Self {
            code: ErrorCode::from(&err),
            message: err.to_string(),
            status: err.status().map(|s| s.0),
        }
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::JsonError, err.to_string())
    }
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<Failure>> = const { RefCell::new(None) };
}

fn set_last_error(failure: Failure) {
    tracing::debug!(code = ?failure.code, message = %failure.message, "FFI call failed");
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(failure);
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Allocate a C string from a Rust string. Caller must free with caw_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    // Interior NUL bytes cannot cross the boundary; drop them
    let bytes: Vec<u8> = s.bytes().filter(|&b| b != 0).collect();
    match CString::new(bytes) {
        Ok(cs) => cs.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Parse a required UTF-8 string argument.
unsafe fn required_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, Failure> {
    parse_c_str(ptr).ok_or_else(|| Failure::invalid_argument(format!("Invalid {what}")))
}

/// Parse an optional event context: null or empty means none, otherwise a UUID.
unsafe fn parse_context(ptr: *const c_char) -> Result<EventContext, Failure> {
    if ptr.is_null() {
        return Ok(EventContext::NONE);
    }
    match parse_c_str(ptr) {
        Some("") => Ok(EventContext::NONE),
        Some(s) => EventContext::parse(s)
            .ok_or_else(|| Failure::invalid_argument(format!("Invalid event context: {s}"))),
        None => Err(Failure::invalid_argument("Invalid event context")),
    }
}

/// Run `f` for a function returning a status code.
fn ffi_status<F>(what: &str, f: F) -> i32
where
    F: FnOnce() -> Result<(), Failure> + UnwindSafe,
{
    clear_last_error();
    match panic::catch_unwind(f) {
        Ok(Ok(())) => ErrorCode::Success as i32,
        Ok(Err(failure)) => {
            let code = failure.code;
            set_last_error(failure);
            code as i32
        }
        Err(_) => {
            set_last_error(Failure::new(ErrorCode::Panic, format!("Panic during {what}")));
            ErrorCode::Panic as i32
        }
    }
}

/// Run `f` for a function returning a JSON string, or null on failure.
fn ffi_json<T, F>(what: &str, f: F) -> *mut c_char
where
    T: Serialize,
    F: FnOnce() -> Result<T, Failure> + UnwindSafe,
{
    clear_last_error();
    let result = panic::catch_unwind(|| {
        let value = f()?;
        Ok::<_, Failure>(serde_json::to_string(&value)?)
    });
    match result {
        Ok(Ok(json)) => alloc_c_string(&json),
        Ok(Err(failure)) => {
            set_last_error(failure);
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error(Failure::new(ErrorCode::Panic, format!("Panic during {what}")));
            ptr::null_mut()
        }
    }
}

/// Store `value` through an out pointer.
unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), Failure> {
    if out.is_null() {
        return Err(Failure::invalid_argument("Null output pointer"));
    }
    out.write(value);
    Ok(())
}

// ============================================================================
// FFI Functions - Event Contexts
// ============================================================================

/// Generate a fresh event context.
///
/// Pass it to setters and compare it against the `context` field of incoming
/// notifications to recognize changes your own code made.
///
/// # Returns
/// UUID string. Caller must free with caw_free_string().
#[no_mangle]
pub extern "C" fn caw_new_event_context() -> *mut c_char {
    alloc_c_string(&EventContext::generate().to_string())
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the caw_* functions.
/// Do not call this on strings from other sources.
#[no_mangle]
pub extern "C" fn caw_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn caw_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|failure| failure.code as i32)
            .unwrap_or(0)
    })
}

/// Get the HRESULT behind the last error.
///
/// # Returns
/// The native status of the failing call, or 0 if the last error did not
/// come from a native call.
#[no_mangle]
pub extern "C" fn caw_last_error_status() -> i32 {
    LAST_ERROR.with(|e| e.borrow().as_ref().and_then(|f| f.status).unwrap_or(0))
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with caw_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn caw_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|failure| alloc_c_string(&failure.message))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with caw_free_string().
#[no_mangle]
pub extern "C" fn caw_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use caw::audio::{CapabilityId, NativeStatus, VolumeRange};

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_owned();
        caw_free_string(ptr);
        s
    }

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(
            ErrorCode::from(&AudioError::DeviceNotFound {
                what: "test".to_string()
            }),
            ErrorCode::DeviceNotFound
        );
        assert_eq!(
            ErrorCode::from(&AudioError::UnsupportedCapability {
                capability: CapabilityId::LevelMeter
            }),
            ErrorCode::UnsupportedCapability
        );
        assert_eq!(
            ErrorCode::from(&AudioError::OutOfRange {
                db: 12.0,
                range: VolumeRange {
                    min_db: -65.25,
                    max_db: 0.0,
                    increment_db: 0.03125,
                },
            }),
            ErrorCode::OutOfRange
        );
        assert_eq!(
            ErrorCode::from(&AudioError::InvalidRange { level: 1.5 }),
            ErrorCode::InvalidRange
        );
        assert_eq!(
            ErrorCode::from(&AudioError::InvalidChannel { index: 2, count: 2 }),
            ErrorCode::InvalidChannel
        );
        assert_eq!(
            ErrorCode::from(&AudioError::InvalidHandle),
            ErrorCode::InvalidHandle
        );
    }

    #[test]
    fn test_native_failure_keeps_status() {
        let failure = Failure::from(AudioError::NativeCallFailure {
            call: "SetMasterVolumeLevelScalar",
            status: NativeStatus::DEVICE_INVALIDATED,
        });
        assert_eq!(failure.code, ErrorCode::NativeCallFailure);
        assert_eq!(failure.status, Some(NativeStatus::DEVICE_INVALIDATED.0));
    }

    #[test]
    fn test_status_call_records_last_error() {
        let code = ffi_status("test", || Err(Failure::from(AudioError::DeviceUnavailable)));
        assert_eq!(code, ErrorCode::DeviceUnavailable as i32);
        assert_eq!(caw_last_error_code(), ErrorCode::DeviceUnavailable as i32);
        assert_eq!(caw_last_error_status(), 0);
        assert!(!take_string(caw_last_error_message()).is_empty());

        assert_eq!(ffi_status("test", || Ok(())), 0);
        assert_eq!(caw_last_error_code(), 0);
        assert!(caw_last_error_message().is_null());
    }

    #[test]
    fn test_panic_is_reported_not_propagated() {
        let code = ffi_status("test", || panic!("boom"));
        assert_eq!(code, ErrorCode::Panic as i32);

        let json = ffi_json::<u32, _>("test", || panic!("boom"));
        assert!(json.is_null());
        assert_eq!(caw_last_error_code(), ErrorCode::Panic as i32);
    }

    #[test]
    fn test_json_result() {
        let json = ffi_json("test", || Ok(serde_json::json!({ "muted": true })));
        assert_eq!(take_string(json), r#"{"muted":true}"#);
    }

    #[test]
    fn test_context_parsing() {
        unsafe {
            assert_eq!(parse_context(ptr::null()).unwrap(), EventContext::NONE);
            assert_eq!(parse_context(c"".as_ptr()).unwrap(), EventContext::NONE);
            assert_eq!(
                parse_context(c"not a uuid".as_ptr()).unwrap_err().code,
                ErrorCode::InvalidArgument
            );
        }

        let generated = take_string(caw_new_event_context());
        let cs = CString::new(generated.clone()).unwrap();
        let parsed = unsafe { parse_context(cs.as_ptr()) }.unwrap();
        assert!(!parsed.is_none());
        assert_eq!(parsed.to_string(), generated);
    }

    #[test]
    fn test_out_pointer_must_not_be_null() {
        let mut value = 0.0f32;
        unsafe {
            write_out(&mut value, 0.5).unwrap();
            assert!(write_out(ptr::null_mut::<f32>(), 0.5).is_err());
        }
        assert_eq!(value, 0.5);
    }

    #[test]
    fn test_version() {
        assert!(!take_string(caw_version()).is_empty());
    }
}
