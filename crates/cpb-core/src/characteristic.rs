//! Shared characteristic handle.
//!
//! A [`Characteristic`] is created by a transport when a service's
//! characteristic is looked up, and shared between the transport (which
//! stores values and dispatches notifications) and this crate (which installs
//! notification handlers). Cloning is cheap; all clones refer to the same state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Callback invoked once per notification event.
///
/// `Ok(())` means a new value has been stored on the characteristic;
/// `Err` carries a delivery error reported by the transport.
pub type NotifyHandler = Arc<dyn Fn(Result<()>) + Send + Sync>;

struct Inner {
    service_uuid: Uuid,
    uuid: Uuid,
    value: Mutex<Option<Bytes>>,
    notifying: AtomicBool,
    handler: Mutex<Option<NotifyHandler>>,
}

/// Handle to a characteristic within a service.
///
/// Holds the last value read or notified, the "is notifying" flag, and at most
/// one notification handler. Installing a handler replaces the previous one.
#[derive(Clone)]
pub struct Characteristic {
    inner: Arc<Inner>,
}

/// Non-owning reference to a [`Characteristic`].
///
/// Notification handlers hold this instead of a strong handle so that a
/// characteristic owning its own handler does not keep itself alive.
#[derive(Clone, Debug)]
pub struct WeakCharacteristic {
    inner: Weak<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Characteristic {
    /// Create a characteristic handle with no value and notifications off.
    pub fn new(service_uuid: Uuid, uuid: Uuid) -> Self {
        Self {
            inner: Arc::new(Inner {
                service_uuid,
                uuid,
                value: Mutex::new(None),
                notifying: AtomicBool::new(false),
                handler: Mutex::new(None),
            }),
        }
    }

    /// Characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    /// UUID of the service this characteristic belongs to.
    pub fn service_uuid(&self) -> Uuid {
        self.inner.service_uuid
    }

    /// Last value read or notified, if any.
    pub fn value(&self) -> Option<Bytes> {
        lock(&self.inner.value).clone()
    }

    /// Store a value (called by transports after a read or notification).
    pub fn set_value(&self, value: impl Into<Bytes>) {
        *lock(&self.inner.value) = Some(value.into());
    }

    /// Whether the peripheral is currently pushing notifications.
    pub fn is_notifying(&self) -> bool {
        self.inner.notifying.load(Ordering::SeqCst)
    }

    /// Update the notifying flag (called by transports).
    pub fn set_notifying(&self, notifying: bool) {
        self.inner.notifying.store(notifying, Ordering::SeqCst);
    }

    /// Whether a notification handler is installed.
    pub fn has_handler(&self) -> bool {
        lock(&self.inner.handler).is_some()
    }

    /// Install a notification handler, returning the one it replaces.
    pub fn replace_handler(&self, handler: NotifyHandler) -> Option<NotifyHandler> {
        lock(&self.inner.handler).replace(handler)
    }

    /// Remove the notification handler.
    pub fn clear_handler(&self) -> Option<NotifyHandler> {
        lock(&self.inner.handler).take()
    }

    /// Store a notified value and invoke the handler.
    pub fn deliver(&self, value: impl Into<Bytes>) {
        self.set_value(value);
        self.dispatch(Ok(()));
    }

    /// Forward a notification delivery error to the handler.
    pub fn deliver_error(&self, error: Error) {
        self.dispatch(Err(error));
    }

    fn dispatch(&self, event: Result<()>) {
        // Release the lock before calling out; handlers may touch the characteristic.
        let handler = lock(&self.inner.handler).clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Create a non-owning reference.
    pub fn downgrade(&self) -> WeakCharacteristic {
        WeakCharacteristic {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same characteristic state.
    pub fn ptr_eq(&self, other: &Characteristic) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl WeakCharacteristic {
    /// Upgrade to a strong handle if the characteristic still exists.
    pub fn upgrade(&self) -> Option<Characteristic> {
        self.inner.upgrade().map(|inner| Characteristic { inner })
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("service_uuid", &self.inner.service_uuid)
            .field("uuid", &self.inner.uuid)
            .field("notifying", &self.is_notifying())
            .field("has_handler", &self.has_handler())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use cpb_types::uuids::{LIGHT_LEVEL, LIGHT_SERVICE};

    #[test]
    fn test_new_characteristic_is_idle() {
        let c = Characteristic::new(LIGHT_SERVICE, LIGHT_LEVEL);
        assert_eq!(c.uuid(), LIGHT_LEVEL);
        assert_eq!(c.service_uuid(), LIGHT_SERVICE);
        assert!(c.value().is_none());
        assert!(!c.is_notifying());
        assert!(!c.has_handler());
    }

    #[test]
    fn test_clones_share_state() {
        let a = Characteristic::new(LIGHT_SERVICE, LIGHT_LEVEL);
        let b = a.clone();
        a.set_value(vec![1u8, 2]);
        a.set_notifying(true);
        assert_eq!(b.value().as_deref(), Some(&[1u8, 2][..]));
        assert!(b.is_notifying());
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_replace_handler_swaps_not_stacks() {
        let c = Characteristic::new(LIGHT_SERVICE, LIGHT_LEVEL);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        assert!(
            c.replace_handler(Arc::new(move |_: Result<()>| {
                f.fetch_add(1, Ordering::SeqCst);
            }))
            .is_none()
        );
        let s = Arc::clone(&second);
        assert!(
            c.replace_handler(Arc::new(move |_: Result<()>| {
                s.fetch_add(1, Ordering::SeqCst);
            }))
            .is_some()
        );

        c.deliver(vec![7u8]);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(c.value().as_deref(), Some(&[7u8][..]));
    }

    #[test]
    fn test_deliver_error_reaches_handler() {
        let c = Characteristic::new(LIGHT_SERVICE, LIGHT_LEVEL);
        let errors = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&errors);
        c.replace_handler(Arc::new(move |event: Result<()>| {
            if event.is_err() {
                e.fetch_add(1, Ordering::SeqCst);
            }
        }));
        c.deliver_error(Error::transport("link lost"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(c.value().is_none());
    }

    #[test]
    fn test_deliver_without_handler_stores_value() {
        let c = Characteristic::new(LIGHT_SERVICE, LIGHT_LEVEL);
        c.deliver(vec![9u8]);
        assert_eq!(c.value().as_deref(), Some(&[9u8][..]));
    }

    #[test]
    fn test_weak_upgrade_after_drop() {
        let c = Characteristic::new(LIGHT_SERVICE, LIGHT_LEVEL);
        let weak = c.downgrade();
        assert!(weak.upgrade().is_some());
        drop(c);
        assert!(weak.upgrade().is_none());
    }
}
