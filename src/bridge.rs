// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manual crossing of a single captor type into another thread.
//!
//! A [`ThreadBridge`] names the captor on the source thread; a [`CrossThreads`] installs it on
//! the destination thread.  Keeping the two apart makes the point where the captor is chosen
//! explicit, separate from where it is used.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use capture_thread::{Captor, CrossThreads, ScopedCapture, ThreadBridge, impl_captor};
//!
//! #[derive(Default)]
//! struct Lines(Mutex<Vec<String>>);
//! impl_captor!(Lines);
//!
//! fn log(line: &str) {
//!     Lines::with_current(|lines| lines.0.lock().unwrap().push(line.to_string()));
//! }
//!
//! let lines = Arc::new(Lines::default());
//! let _capture = ScopedCapture::new(lines.clone());
//! log("main");
//!
//! let bridge = ThreadBridge::<Lines>::new();
//! std::thread::spawn(move || {
//!     let _cross = CrossThreads::new(&bridge);
//!     log("worker");
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(*lines.0.lock().unwrap(), vec!["main", "worker"]);
//! ```

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::captor::{self, Captor};
use crate::scoped::ScopedCapture;

/// The captor of type `T` that was current where the bridge was built.
///
/// Building a bridge does not change anything on the source thread.  The bridge may be cloned and
/// sent to other threads when `T: Send + Sync`.
pub struct ThreadBridge<T: Captor + ?Sized> {
    captor: Option<Arc<T>>,
}

impl<T: Captor + ?Sized> ThreadBridge<T> {
    /// Captures the current captor of type `T`, which may be none.
    pub fn new() -> Self {
        let captor = captor::current::<T>();
        logwise::debuginternal_sync!(
            "ThreadBridge for {captor} (present: {present})",
            captor = std::any::type_name::<T>(),
            present = captor.is_some()
        );
        ThreadBridge { captor }
    }

    /// Bridges the captor installed by a specific handle, whether or not it is still innermost.
    pub fn from_capture(capture: &ScopedCapture<T>) -> Self {
        ThreadBridge {
            captor: Some(capture.captor().clone()),
        }
    }

    /// The bridged captor.
    #[inline]
    pub fn captor(&self) -> Option<&Arc<T>> {
        self.captor.as_ref()
    }
}

impl<T: Captor + ?Sized> Default for ThreadBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Captor + ?Sized> Clone for ThreadBridge<T> {
    fn clone(&self) -> Self {
        ThreadBridge {
            captor: self.captor.clone(),
        }
    }
}

impl<T: Captor + ?Sized> Debug for ThreadBridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadBridge")
            .field("captor", &std::any::type_name::<T>())
            .field("present", &self.captor.is_some())
            .finish()
    }
}

/// Installs a bridged captor on the current thread until dropped.
///
/// If the bridge carries no captor, the slot is cleared for the duration instead, so code in scope
/// behaves as it did on the source thread.
#[must_use = "the bridged captor is only current while the handle is alive"]
pub struct CrossThreads<T: Captor + ?Sized> {
    previous: Option<Arc<T>>,
    installed: Option<Arc<T>>,
    _thread: PhantomData<*const ()>,
}

impl<T: Captor + ?Sized> CrossThreads<T> {
    /// Installs the bridge's captor.
    pub fn new(bridge: &ThreadBridge<T>) -> Self {
        Self::install(bridge.captor.clone())
    }

    pub(crate) fn install(installed: Option<Arc<T>>) -> Self {
        let previous = captor::set_current(installed.clone());
        CrossThreads {
            previous,
            installed,
            _thread: PhantomData,
        }
    }

    /// The captor that was current before this handle was created.
    #[inline]
    pub fn previous(&self) -> Option<&Arc<T>> {
        self.previous.as_ref()
    }
}

impl<T: Captor + ?Sized> Drop for CrossThreads<T> {
    fn drop(&mut self) {
        let in_order = match &self.installed {
            Some(installed) => captor::is_current(installed),
            None => captor::is_unset::<T>(),
        };
        captor::set_current(self.previous.take());
        if !in_order {
            captor::report_lifo_violation::<T>("CrossThreads");
        }
    }
}

impl<T: Captor + ?Sized> Debug for CrossThreads<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossThreads")
            .field("captor", &std::any::type_name::<T>())
            .field("present", &self.installed.is_some())
            .finish()
    }
}
