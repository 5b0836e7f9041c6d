// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped installation of a captor on the current thread.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::captor::{self, Captor};

/// Makes a captor the current one for its type until the handle is dropped.
///
/// Handles nest: dropping one restores whatever was current when it was created.  They must be
/// dropped in reverse order of creation, which falls out naturally when they are locals.  A handle
/// cannot leave its thread.
///
/// `ScopedCapture` does not follow work into other threads.  Use
/// [`AutoThreadCrosser`](crate::AutoThreadCrosser) for captors that should be picked up by
/// [`wrap`](crate::wrap), or [`ThreadBridge`](crate::ThreadBridge) to cross by hand.
///
/// ```
/// use std::sync::Arc;
/// use capture_thread::{Captor, ScopedCapture, impl_captor};
///
/// struct Depth(u32);
/// impl_captor!(Depth);
///
/// let outer = ScopedCapture::new(Arc::new(Depth(1)));
/// {
///     let _inner = ScopedCapture::new(Arc::new(Depth(2)));
///     assert_eq!(Depth::with_current(|d| d.0), Some(2));
/// }
/// assert_eq!(Depth::with_current(|d| d.0), Some(1));
/// assert!(outer.previous().is_none());
/// drop(outer);
/// assert!(Depth::current().is_none());
/// ```
#[must_use = "the captor is only current while the handle is alive"]
pub struct ScopedCapture<T: Captor + ?Sized> {
    previous: Option<Arc<T>>,
    current: Arc<T>,
    // !Send, !Sync
    _thread: PhantomData<*const ()>,
}

impl<T: Captor + ?Sized> ScopedCapture<T> {
    /// Makes `captor` current on this thread.
    pub fn new(captor: Arc<T>) -> Self {
        let previous = captor::set_current(Some(captor.clone()));
        ScopedCapture {
            previous,
            current: captor,
            _thread: PhantomData,
        }
    }

    /// The captor that was current when this handle was created.
    #[inline]
    pub fn previous(&self) -> Option<&Arc<T>> {
        self.previous.as_ref()
    }

    /// The captor this handle installed.
    #[inline]
    pub fn captor(&self) -> &Arc<T> {
        &self.current
    }
}

impl<T: Captor + ?Sized> Drop for ScopedCapture<T> {
    fn drop(&mut self) {
        let in_order = captor::is_current(&self.current);
        captor::set_current(self.previous.take());
        if !in_order {
            captor::report_lifo_violation::<T>("ScopedCapture");
        }
    }
}

impl<T: Captor + ?Sized> Debug for ScopedCapture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCapture")
            .field("captor", &std::any::type_name::<T>())
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}

/*
Boilerplate notes.

Clone would put two handles in charge of restoring the same slot, so no.
Default has no captor to install.
PartialEq/Hash could compare captors by pointer, but handles are scopes, not values.
Send/Sync are ruled out; the slot belongs to the creating thread.
*/
