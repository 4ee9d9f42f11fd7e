//! COM plumbing: apartment initialization and scoped ownership of memory
//! the OS hands back to us.

use serde::{Deserialize, Serialize};

/// COM apartment model for the initializing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Apartment {
    /// COINIT_APARTMENTTHREADED, for threads that own a UI
    SingleThreaded,
    /// COINIT_MULTITHREADED
    #[default]
    MultiThreaded,
}

#[cfg(windows)]
pub use native::ComGuard;
#[cfg(windows)]
pub(crate) use native::{context_from_ptr, with_context, CoTaskPtr, CoTaskString, WideString};

#[cfg(windows)]
mod native {
    use crate::audio::error::{AudioError, NativeStatus};
    use crate::audio::types::EventContext;
    use super::*;
    use windows::core::{GUID, PCWSTR, PWSTR};
    use windows::Win32::System::Com::{
        CoInitializeEx, CoTaskMemFree, CoUninitialize, COINIT_APARTMENTTHREADED,
        COINIT_MULTITHREADED,
    };

    /// COM initialization guard that uninitializes COM on drop.
    pub struct ComGuard {
        initialized: bool,
    }

    impl ComGuard {
        /// Initialize COM for the current thread.
        ///
        /// If the thread was already initialized with a different apartment
        /// the existing initialization is used and nothing is undone on drop.
        pub fn new(apartment: Apartment) -> Result<Self, AudioError> {
            let coinit = match apartment {
                Apartment::SingleThreaded => COINIT_APARTMENTTHREADED,
                Apartment::MultiThreaded => COINIT_MULTITHREADED,
            };
            let hr = unsafe { CoInitializeEx(None, coinit) };
            if hr.0 == NativeStatus::CHANGED_MODE.0 {
                tracing::debug!(?apartment, "COM already initialized with another apartment");
                return Ok(Self { initialized: false });
            }
            hr.ok()
                .map_err(|e| AudioError::ComInitFailed(NativeStatus::from(&e)))?;
            Ok(Self { initialized: true })
        }
    }

    impl Drop for ComGuard {
        fn drop(&mut self) {
            if self.initialized {
                unsafe {
                    CoUninitialize();
                }
            }
        }
    }

    /// A wide string allocated by the OS, freed with CoTaskMemFree on drop.
    pub(crate) struct CoTaskString(PWSTR);

    impl CoTaskString {
        /// # Safety
        /// `ptr` must be null or a CoTaskMemAlloc'd, NUL-terminated string.
        pub(crate) unsafe fn new(ptr: PWSTR) -> Self {
            Self(ptr)
        }

        pub(crate) fn to_string_lossless(&self) -> Result<String, AudioError> {
            if self.0.is_null() {
                return Ok(String::new());
            }
            unsafe {
                self.0
                    .to_string()
                    .map_err(|e| AudioError::StringConversion(e.to_string()))
            }
        }
    }

    impl Drop for CoTaskString {
        fn drop(&mut self) {
            if !self.0.is_null() {
                unsafe { CoTaskMemFree(Some(self.0 .0 as *const _)) };
            }
        }
    }

    /// A structure allocated by the OS, freed with CoTaskMemFree on drop.
    pub(crate) struct CoTaskPtr<T>(*mut T);

    impl<T> CoTaskPtr<T> {
        /// # Safety
        /// `ptr` must be null or point to a CoTaskMemAlloc'd `T`.
        pub(crate) unsafe fn new(ptr: *mut T) -> Self {
            Self(ptr)
        }

        pub(crate) fn as_ref(&self) -> Option<&T> {
            unsafe { self.0.as_ref() }
        }
    }

    impl<T> Drop for CoTaskPtr<T> {
        fn drop(&mut self) {
            if !self.0.is_null() {
                unsafe { CoTaskMemFree(Some(self.0 as *const _)) };
            }
        }
    }

    /// Owned NUL-terminated UTF-16 copy of a Rust string.
    pub(crate) struct WideString(Vec<u16>);

    impl WideString {
        pub(crate) fn new(s: &str) -> Self {
            Self(s.encode_utf16().chain(std::iter::once(0)).collect())
        }

        pub(crate) fn as_pcwstr(&self) -> PCWSTR {
            PCWSTR::from_raw(self.0.as_ptr())
        }
    }

    fn guid_from_context(context: EventContext) -> GUID {
        GUID::from_u128(context.as_u128())
    }

    /// # Safety
    /// `ptr` must be null or point to a valid GUID.
    pub(crate) unsafe fn context_from_ptr(ptr: *const GUID) -> EventContext {
        match ptr.as_ref() {
            Some(guid) => EventContext::from_u128(guid.to_u128()),
            None => EventContext::NONE,
        }
    }

    /// Run `f` with a pointer to the context GUID, or null for no context.
    pub(crate) fn with_context<R>(context: EventContext, f: impl FnOnce(*const GUID) -> R) -> R {
        if context.is_none() {
            f(std::ptr::null())
        } else {
            let guid = guid_from_context(context);
            f(&guid)
        }
    }
}
