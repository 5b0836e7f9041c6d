// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wrapping callables and futures with the current scope.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use crate::crosser::Snapshot;

/// A callable or future bundled with the [`Snapshot`] taken when it was wrapped.
///
/// Every invocation (or poll) reinstalls the snapshot's captors first.  The snapshot is taken
/// eagerly: captors that come into scope after wrapping are not part of it.
///
/// Produced by [`wrap`] and [`wrap_future`].
#[derive(Clone)]
#[must_use = "wrapped callables do nothing unless called"]
pub struct Wrapped<F> {
    snapshot: Snapshot,
    inner: F,
}

impl<F> Wrapped<F> {
    fn new(snapshot: Snapshot, inner: F) -> Self {
        Wrapped { snapshot, inner }
    }

    /// The scope captured at wrapping time.
    #[inline]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Discards the captured scope, returning the original callable.
    #[inline]
    pub fn into_inner(self) -> F {
        self.inner
    }

    /// Calls a `Fn()` inside the captured scope.
    #[inline]
    pub fn call<R>(&self) -> R
    where
        F: Fn() -> R,
    {
        self.snapshot.call_in_context(|| (self.inner)())
    }

    /// Calls an `FnMut()` inside the captured scope.
    #[inline]
    pub fn call_mut<R>(&mut self) -> R
    where
        F: FnMut() -> R,
    {
        let inner = &mut self.inner;
        self.snapshot.call_in_context(inner)
    }

    /// Calls an `FnOnce()` inside the captured scope.
    #[inline]
    pub fn call_once<R>(self) -> R
    where
        F: FnOnce() -> R,
    {
        let Wrapped { snapshot, inner } = self;
        snapshot.call_in_context(inner)
    }

    /// Calls a one-argument `Fn` inside the captured scope.  Pass a tuple for several arguments.
    #[inline]
    pub fn call_with<A, R>(&self, arg: A) -> R
    where
        F: Fn(A) -> R,
    {
        self.snapshot.call_in_context(|| (self.inner)(arg))
    }

    /// Calls a one-argument `FnOnce` inside the captured scope.
    #[inline]
    pub fn call_once_with<A, R>(self, arg: A) -> R
    where
        F: FnOnce(A) -> R,
    {
        let Wrapped { snapshot, inner } = self;
        snapshot.call_in_context(|| inner(arg))
    }

    /// Converts into a plain closure, for APIs such as [`std::thread::spawn`] that take one.
    ///
    /// The closure is no longer recognised by [`wrap`]; wrapping it again captures a second
    /// snapshot, which the inner one overrides when they share a type.
    #[inline]
    pub fn into_fn<R>(self) -> impl FnOnce() -> R
    where
        F: FnOnce() -> R,
    {
        move || self.call_once()
    }
}

impl<F> std::fmt::Debug for Wrapped<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapped")
            .field("snapshot", &self.snapshot)
            .field("inner", &std::any::type_name::<F>())
            .finish()
    }
}

/// Polls the inner future inside the captured scope.
///
/// The caller's own state is put back after every poll, so executors that move tasks between
/// threads, or interleave them on one thread, see consistent captors.
impl<F: Future> Future for Wrapped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        //safety: inner is structurally pinned; snapshot is never pinned and Wrapped has no Drop
        let (snapshot, fut) = unsafe {
            let d = self.get_unchecked_mut();
            (&d.snapshot, Pin::new_unchecked(&mut d.inner))
        };
        snapshot.call_in_context(|| fut.poll(cx))
    }
}

/// Marker used by [`WrapCall`] for values that are already [`Wrapped`].
#[doc(hidden)]
pub struct AlreadyWrapped;

/// Things [`wrap`] accepts.
///
/// Implemented for closures and functions taking zero or one argument, for [`Wrapped`] itself
/// (returned unchanged), and for `Option` of any of those (`None` stays `None`).  The `Marker`
/// parameter only keeps the implementations apart and is always inferred.
pub trait WrapCall<Marker>: Sized {
    /// What wrapping produces.
    type Output;

    #[doc(hidden)]
    fn wrap_call(self, snapshot: Snapshot) -> Self::Output;
}

impl<F, R> WrapCall<fn() -> R> for F
where
    F: FnOnce() -> R,
{
    type Output = Wrapped<F>;

    #[inline]
    fn wrap_call(self, snapshot: Snapshot) -> Wrapped<F> {
        Wrapped::new(snapshot, self)
    }
}

impl<F, A, R> WrapCall<fn(A) -> R> for F
where
    F: FnOnce(A) -> R,
{
    type Output = Wrapped<F>;

    #[inline]
    fn wrap_call(self, snapshot: Snapshot) -> Wrapped<F> {
        Wrapped::new(snapshot, self)
    }
}

impl<F> WrapCall<AlreadyWrapped> for Wrapped<F> {
    type Output = Wrapped<F>;

    #[inline]
    fn wrap_call(self, _snapshot: Snapshot) -> Wrapped<F> {
        self
    }
}

impl<M, W: WrapCall<M>> WrapCall<Option<M>> for Option<W> {
    type Output = Option<W::Output>;

    #[inline]
    fn wrap_call(self, snapshot: Snapshot) -> Option<W::Output> {
        self.map(|w| w.wrap_call(snapshot))
    }
}

/// Wraps a callable with the current scope.
///
/// Every [`AutoThreadCrosser`](crate::AutoThreadCrosser) in scope right now is captured.  Whenever
/// and wherever the result is called, those captors are current again for the duration of the
/// call; captor types not in the snapshot fall through to whatever the calling thread has.
///
/// Wrapping something already wrapped returns it unchanged, and `None` stays `None`.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use capture_thread::{AutoThreadCrosser, Captor, impl_captor, wrap};
///
/// #[derive(Default)]
/// struct Lines(Mutex<Vec<String>>);
/// impl_captor!(Lines);
///
/// fn log(line: String) {
///     Lines::with_current(|lines| lines.0.lock().unwrap().push(line));
/// }
///
/// let lines = Arc::new(Lines::default());
/// let _crosser = AutoThreadCrosser::new(lines.clone());
/// let square = wrap(|x: u32| {
///     log(format!("squaring {x}"));
///     x * x
/// });
/// let result = std::thread::spawn(move || square.call_with(7)).join().unwrap();
/// assert_eq!(result, 49);
/// assert_eq!(*lines.0.lock().unwrap(), vec!["squaring 7"]);
///
/// let nothing: Option<fn()> = None;
/// assert!(wrap(nothing).is_none());
/// ```
#[inline]
pub fn wrap<M, W: WrapCall<M>>(callable: W) -> W::Output {
    callable.wrap_call(Snapshot::capture())
}

/// Wraps a future with the current scope; every poll runs inside it.
///
/// Each poll must leave scopes as it found them.  A [`ScopedCapture`](crate::ScopedCapture) or
/// [`AutoThreadCrosser`](crate::AutoThreadCrosser) created inside the future must not be held
/// across an `.await`: the poll would return with it still installed, leaking it into whatever
/// the executor runs next.  Debug builds panic when they detect this.  Scope the handle to a
/// block that ends before the `.await`.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use capture_thread::{AutoThreadCrosser, Captor, impl_captor, wrap_future};
///
/// #[derive(Default)]
/// struct Lines(Mutex<Vec<String>>);
/// impl_captor!(Lines);
///
/// let lines = Arc::new(Lines::default());
/// let task = {
///     let _crosser = AutoThreadCrosser::new(lines.clone());
///     wrap_future(async {
///         Lines::with_current(|l| l.0.lock().unwrap().push("polled".to_string()));
///     })
/// };
/// test_executors::spin_on(task);
/// assert_eq!(*lines.0.lock().unwrap(), vec!["polled"]);
/// ```
#[inline]
pub fn wrap_future<F: Future>(future: F) -> Wrapped<F> {
    Wrapped::new(Snapshot::capture(), future)
}
