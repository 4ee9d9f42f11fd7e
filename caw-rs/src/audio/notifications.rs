//! Notification registration.
//!
//! The OS calls our sinks on its own threads. Each registration owns a gate
//! holding the listener; a sink delivers only while the gate is open and
//! [`NotificationRegistry::unregister`] closes the gate before asking the OS
//! to drop the sink. Once `unregister` returns, the listener is never called
//! again, even if the OS still has a callback in flight.
//!
//! Listeners are either a channel sender, so the OS thread only enqueues and
//! the application drains on its own schedule, or a callback run directly on
//! the OS thread. Callbacks must return quickly and must not unregister their
//! own registration.

use super::error::AudioError;
use super::events::{AudioEvent, Notification, RegistrationId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Callback invoked on the OS notification thread.
pub type Callback = dyn Fn(&Notification) + Send + Sync;

/// Where notifications for one registration go.
pub enum Listener {
    Channel(Sender<Notification>),
    Callback(Box<Callback>),
}

impl Listener {
    pub fn callback(f: impl Fn(&Notification) + Send + Sync + 'static) -> Self {
        Listener::Callback(Box::new(f))
    }
}

impl From<Sender<Notification>> for Listener {
    fn from(sender: Sender<Notification>) -> Self {
        Listener::Channel(sender)
    }
}

struct Gate {
    listener: Mutex<Option<Listener>>,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, Option<Listener>> {
        // A panicking callback must not wedge later deliveries or unregister
        match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Handle given to a native sink for delivering events of one registration.
#[derive(Clone)]
pub struct EventSink {
    id: RegistrationId,
    gate: Arc<Gate>,
}

impl EventSink {
    fn new(id: RegistrationId, listener: Listener) -> Self {
        Self {
            id,
            gate: Arc::new(Gate {
                listener: Mutex::new(Some(listener)),
            }),
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Deliver `event` if the registration is still open.
    ///
    /// Returns false when the event was dropped: the gate is closed, or the
    /// receiving end of a channel listener is gone.
    pub fn dispatch(&self, event: AudioEvent) -> bool {
        let guard = self.gate.lock();
        let Some(listener) = guard.as_ref() else {
            return false;
        };
        let notification = Notification {
            registration: self.id,
            event,
        };
        match listener {
            Listener::Channel(sender) => sender.send(notification).is_ok(),
            Listener::Callback(callback) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&notification)));
                if result.is_err() {
                    tracing::error!(registration = %self.id, "Notification callback panicked");
                }
                result.is_ok()
            }
        }
    }

    /// Close the gate; blocks until an in-flight delivery finishes.
    fn close(&self) -> Option<Listener> {
        self.gate.lock().take()
    }
}

/// An OS-side registration that can be withdrawn.
pub trait NativeRegistration {
    fn unregister(&mut self) -> Result<(), AudioError>;
}

/// Anything the OS can report changes on: the device enumerator, an
/// endpoint volume, a session manager or a single session.
pub trait NotificationSource {
    /// Hook `sink` up to the OS. The returned registration withdraws it.
    fn attach(&self, sink: EventSink) -> Result<Box<dyn NativeRegistration>, AudioError>;
}

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

struct Entry {
    sink: EventSink,
    native: Box<dyn NativeRegistration>,
}

/// Tracks live registrations; dropping it unregisters everything.
#[derive(Default)]
pub struct NotificationRegistry {
    active: RefCell<HashMap<RegistrationId, Entry>>,
    issued: RefCell<HashSet<RegistrationId>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for the events `source` reports.
    pub fn register<S: NotificationSource + ?Sized>(
        &self,
        source: &S,
        listener: Listener,
    ) -> Result<RegistrationId, AudioError> {
        let id = RegistrationId(NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed));
        let sink = EventSink::new(id, listener);
        let native = match source.attach(sink.clone()) {
            Ok(native) => native,
            Err(e) => {
                sink.close();
                return Err(e);
            }
        };

        self.issued.borrow_mut().insert(id);
        self.active.borrow_mut().insert(id, Entry { sink, native });
        tracing::debug!(registration = %id, "Registered notification listener");
        Ok(id)
    }

    /// Register a fresh channel and hand back its receiving end.
    pub fn subscribe<S: NotificationSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<(RegistrationId, Receiver<Notification>), AudioError> {
        let (sender, receiver) = mpsc::channel();
        let id = self.register(source, Listener::Channel(sender))?;
        Ok((id, receiver))
    }

    /// Withdraw a registration.
    ///
    /// Safe to repeat; fails with `InvalidHandle` only for ids this registry
    /// never issued.
    pub fn unregister(&self, id: RegistrationId) -> Result<(), AudioError> {
        let entry = self.active.borrow_mut().remove(&id);
        match entry {
            Some(mut entry) => {
                entry.sink.close();
                tracing::debug!(registration = %id, "Unregistered notification listener");
                entry.native.unregister()
            }
            None if self.issued.borrow().contains(&id) => Ok(()),
            None => Err(AudioError::InvalidHandle),
        }
    }

    /// Withdraw every live registration. Returns the first failure, after
    /// attempting all of them.
    pub fn unregister_all(&self) -> Result<(), AudioError> {
        let entries: Vec<(RegistrationId, Entry)> = self.active.borrow_mut().drain().collect();
        let mut first_error = None;
        for (id, mut entry) in entries {
            entry.sink.close();
            if let Err(e) = entry.native.unregister() {
                tracing::warn!(registration = %id, error = %e, "Failed to unregister listener");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Wait up to `timeout` for a notification on a channel shared by several
    /// registrations of this registry.
    ///
    /// Notifications queued before their registration was withdrawn are
    /// discarded, so nothing is handed out for an id once `unregister`
    /// has returned.
    pub fn recv_live(
        &self,
        events: &Receiver<Notification>,
        timeout: Duration,
    ) -> Result<Notification, RecvTimeoutError> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            let notification = events.recv_timeout(remaining)?;
            if self.is_registered(notification.registration) {
                return Ok(notification);
            }
            tracing::trace!(
                registration = %notification.registration,
                "Dropping notification queued before unregister"
            );
        }
    }

    pub fn is_registered(&self, id: RegistrationId) -> bool {
        self.active.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.active.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.borrow().is_empty()
    }
}

impl Drop for NotificationRegistry {
    fn drop(&mut self) {
        let _ = self.unregister_all();
    }
}
