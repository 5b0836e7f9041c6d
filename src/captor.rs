// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-thread, per-type current captor.
//!
//! Every captor type owns exactly one thread-local slot, created by
//! [`impl_captor!`](crate::impl_captor). The slot holds the innermost captor
//! of that type that is in scope on the running thread, or nothing.

use std::cell::Cell;
use std::sync::Arc;
use std::thread::LocalKey;

/// Storage behind a captor type's thread-local slot.
///
/// You never touch this directly; [`impl_captor!`](crate::impl_captor) creates one per type and
/// the scoped handles swap values in and out of it.
pub struct CurrentSlot<T: ?Sized> {
    current: Cell<Option<Arc<T>>>,
}

impl<T: ?Sized> CurrentSlot<T> {
    #[doc(hidden)]
    pub const fn new() -> Self {
        CurrentSlot {
            current: Cell::new(None),
        }
    }

    fn get(&self) -> Option<Arc<T>> {
        let current = self.current.take();
        let result = current.clone();
        self.current.set(current);
        result
    }

    fn replace(&self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        self.current.replace(value)
    }

    fn is(&self, captor: &Arc<T>) -> bool {
        let current = self.current.take();
        let result = current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, captor));
        self.current.set(current);
        result
    }

    fn is_empty(&self) -> bool {
        let current = self.current.take();
        let result = current.is_none();
        self.current.set(current);
        result
    }
}

impl<T: ?Sized> Default for CurrentSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A type whose instances can be made visible to code further down the call stack.
///
/// Implement this with [`impl_captor!`](crate::impl_captor) rather than by hand. Polymorphic
/// captors are usually trait objects: declare a trait with the operations code should be able to
/// reach, then `impl_captor!(dyn YourTrait)`.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use capture_thread::{Captor, ScopedCapture, impl_captor};
///
/// pub trait Counter: Send + Sync {
///     fn count(&self, n: u64);
/// }
/// impl_captor!(dyn Counter);
///
/// fn count(n: u64) {
///     //no-op when nothing is in scope
///     <dyn Counter>::with_current(|counter| counter.count(n));
/// }
///
/// #[derive(Default)]
/// struct Total(Mutex<u64>);
/// impl Counter for Total {
///     fn count(&self, n: u64) {
///         *self.0.lock().unwrap() += n;
///     }
/// }
///
/// count(1);
/// let total = Arc::new(Total::default());
/// {
///     let _capture = ScopedCapture::<dyn Counter>::new(total.clone());
///     count(2);
///     count(3);
/// }
/// count(4);
/// assert_eq!(*total.0.lock().unwrap(), 5);
/// ```
pub trait Captor: 'static {
    #[doc(hidden)]
    fn slot() -> &'static LocalKey<CurrentSlot<Self>>;

    /// Returns the innermost captor of this type on the current thread, if any.
    #[inline]
    fn current() -> Option<Arc<Self>> {
        current::<Self>()
    }

    /// Runs `f` against the current captor.
    ///
    /// Returns `None` without calling `f` when no captor of this type is in scope.  This is the
    /// dispatch idiom: libraries can emit signals freely and they are dropped unless a caller
    /// installed something to receive them.
    ///
    /// Each call clones the captor's `Arc` (one increment and one decrement), which keeps the
    /// captor alive even if `f` ends scopes or installs new ones of the same type.  With nothing
    /// installed the call is a single thread-local read.  Hot loops can hoist the `Arc` with
    /// [`Captor::current`] and call it directly.
    #[inline]
    fn with_current<R>(f: impl FnOnce(&Self) -> R) -> Option<R> {
        Self::current().map(|captor| f(&*captor))
    }
}

/// Returns the innermost captor of type `T` on the current thread, if any.
///
/// Returns `None` during thread teardown, after the slot has been destroyed.
#[inline]
pub fn current<T: Captor + ?Sized>() -> Option<Arc<T>> {
    T::slot().try_with(|slot| slot.get()).unwrap_or(None)
}

/// Swaps the current captor of type `T`, returning the previous one.
pub(crate) fn set_current<T: Captor + ?Sized>(value: Option<Arc<T>>) -> Option<Arc<T>> {
    T::slot().try_with(|slot| slot.replace(value)).unwrap_or(None)
}

/// Whether `captor` is the current captor of type `T`.
pub(crate) fn is_current<T: Captor + ?Sized>(captor: &Arc<T>) -> bool {
    T::slot().try_with(|slot| slot.is(captor)).unwrap_or(false)
}

/// Whether no captor of type `T` is current.
pub(crate) fn is_unset<T: Captor + ?Sized>() -> bool {
    T::slot().try_with(|slot| slot.is_empty()).unwrap_or(true)
}

/// Reports a scope that was exited out of order.
pub(crate) fn report_lifo_violation<T: ?Sized>(handle: &'static str) {
    report_out_of_order(handle, std::any::type_name::<T>());
}

/// Like [`report_lifo_violation`], for callers that only know the captor's type name.
pub(crate) fn report_out_of_order(handle: &'static str, captor: &'static str) {
    logwise::warn_sync!(
        "{handle} for {captor} dropped out of order; scopes must end in reverse order of creation",
        handle = handle,
        captor = captor
    );
    if cfg!(debug_assertions) && !std::thread::panicking() {
        panic!("{handle} for {captor} dropped out of order");
    }
}

/// Implements [`Captor`] for a type, giving it a thread-local slot.
///
/// The type must be `'static`.  Trait objects are the common case:
///
/// ```
/// pub trait LogText: Send + Sync {
///     fn log_line(&self, line: String);
/// }
/// capture_thread::impl_captor!(dyn LogText);
/// ```
///
/// Concrete types work as well:
///
/// ```
/// pub struct Deadline(pub std::time::Instant);
/// capture_thread::impl_captor!(Deadline);
/// ```
#[macro_export]
macro_rules! impl_captor {
    ($ty:ty) => {
        impl $crate::Captor for $ty {
            #[inline]
            fn slot() -> &'static ::std::thread::LocalKey<$crate::CurrentSlot<Self>> {
                ::std::thread_local! {
                    static SLOT: $crate::CurrentSlot<$ty> = const { $crate::CurrentSlot::new() };
                }
                &SLOT
            }
        }
    };
}
