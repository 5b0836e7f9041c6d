// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automatic thread crossing.
//!
//! Each thread keeps a chain of the [`AutoThreadCrosser`]s in scope, innermost at the tail.  A
//! [`Snapshot`] is a reference to the tail of that chain.  Calling into a snapshot, possibly on a
//! different thread, walks the chain from the tail and installs the innermost captor of each type
//! it finds.  Shadowed captors further up are skipped.
//!
//! Nodes are reference counted.  A snapshot keeps the captors it names alive for as long as it
//! exists, even after the scopes that created them have ended on their own thread.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bridge::CrossThreads;
use crate::captor::{self, Captor};
use crate::scoped::ScopedCapture;

thread_local! {
    static CHAIN_TAIL: Cell<Option<Arc<CrosserNode>>> = const { Cell::new(None) };
}

fn chain_tail() -> Option<Arc<CrosserNode>> {
    CHAIN_TAIL
        .try_with(|tail| {
            let current = tail.take();
            let result = current.clone();
            tail.set(current);
            result
        })
        .unwrap_or(None)
}

fn set_chain_tail(node: Option<Arc<CrosserNode>>) -> Option<Arc<CrosserNode>> {
    CHAIN_TAIL.try_with(|tail| tail.replace(node)).unwrap_or(None)
}

fn chain_tail_is(node: Option<&Arc<CrosserNode>>) -> bool {
    CHAIN_TAIL
        .try_with(|tail| {
            let current = tail.take();
            let result = match (&current, node) {
                (Some(current), Some(node)) => Arc::ptr_eq(current, node),
                (None, None) => true,
                _ => false,
            };
            tail.set(current);
            result
        })
        .unwrap_or(false)
}

/// A captor of some type, installable on any thread.
trait CrossingEntry: Send + Sync {
    fn captor_type(&self) -> TypeId;
    /// Makes the captor current until the returned guard is dropped.
    fn install(&self) -> Box<dyn Any>;
    fn type_name(&self) -> &'static str;
}

struct CaptorEntry<T: Captor + ?Sized + Send + Sync> {
    captor: Arc<T>,
}

impl<T: Captor + ?Sized + Send + Sync> CrossingEntry for CaptorEntry<T> {
    fn captor_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn install(&self) -> Box<dyn Any> {
        Box::new(CrossThreads::install(Some(self.captor.clone())))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// One [`AutoThreadCrosser`] on a chain.
struct CrosserNode {
    /// The tail when this node was pushed.  May have been pushed on another thread.
    parent: Option<Arc<CrosserNode>>,
    entry: Box<dyn CrossingEntry>,
}

impl CrosserNode {
    /// The innermost entry of each captor type, walking from this node towards the head.
    fn innermost_entries(&self) -> Vec<&dyn CrossingEntry> {
        let mut entries: Vec<&dyn CrossingEntry> = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            let captor_type = current.entry.captor_type();
            if !entries.iter().any(|e| e.captor_type() == captor_type) {
                entries.push(&*current.entry);
            }
            node = current.parent.as_deref();
        }
        entries
    }

    fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some(parent) = &current.parent {
            depth += 1;
            current = parent;
        }
        depth
    }
}

impl Drop for CrosserNode {
    //long chains would otherwise recurse once per node
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(node) = parent {
            match Arc::try_unwrap(node) {
                Ok(mut node) => parent = node.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Like [`ScopedCapture`], but also visible to [`wrap`](crate::wrap) and [`Snapshot`].
///
/// While the crosser is alive, any callable wrapped on this thread carries its captor along, and
/// installs it wherever the callable runs.  The captor type must be `Send + Sync` since it may be
/// used from several threads at once.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use capture_thread::{AutoThreadCrosser, Captor, impl_captor, wrap};
///
/// #[derive(Default)]
/// struct Lines(Mutex<Vec<String>>);
/// impl_captor!(Lines);
///
/// fn log(line: &str) {
///     Lines::with_current(|lines| lines.0.lock().unwrap().push(line.to_string()));
/// }
///
/// let lines = Arc::new(Lines::default());
/// let _crosser = AutoThreadCrosser::new(lines.clone());
/// let worker = wrap(|| log("from worker"));
/// std::thread::spawn(worker.into_fn()).join().unwrap();
/// assert_eq!(*lines.0.lock().unwrap(), vec!["from worker"]);
/// ```
#[must_use = "the captor is only current while the handle is alive"]
pub struct AutoThreadCrosser<T: Captor + ?Sized + Send + Sync> {
    node: Arc<CrosserNode>,
    capture: ScopedCapture<T>,
    _thread: PhantomData<*const ()>,
}

impl<T: Captor + ?Sized + Send + Sync> AutoThreadCrosser<T> {
    /// Makes `captor` current on this thread and pushes it onto the thread's chain.
    pub fn new(captor: Arc<T>) -> Self {
        let node = Arc::new(CrosserNode {
            parent: chain_tail(),
            entry: Box::new(CaptorEntry {
                captor: captor.clone(),
            }),
        });
        set_chain_tail(Some(node.clone()));
        AutoThreadCrosser {
            node,
            capture: ScopedCapture::new(captor),
            _thread: PhantomData,
        }
    }

    /// The captor that was current when this handle was created.
    #[inline]
    pub fn previous(&self) -> Option<&Arc<T>> {
        self.capture.previous()
    }

    /// The captor this handle installed.
    #[inline]
    pub fn captor(&self) -> &Arc<T> {
        self.capture.captor()
    }
}

impl<T: Captor + ?Sized + Send + Sync> Drop for AutoThreadCrosser<T> {
    fn drop(&mut self) {
        let in_order = chain_tail_is(Some(&self.node));
        set_chain_tail(self.node.parent.clone());
        if !in_order {
            captor::report_lifo_violation::<T>("AutoThreadCrosser");
        }
        //self.capture restores the slot when dropped after this
    }
}

impl<T: Captor + ?Sized + Send + Sync> Debug for AutoThreadCrosser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoThreadCrosser")
            .field("captor", &std::any::type_name::<T>())
            .field("depth", &self.node.depth())
            .finish()
    }
}

/// The auto-crossing captors visible at some point on some thread.
///
/// Taking a snapshot is O(1); it only holds the tail of the chain.  Cheap to clone and safe to
/// send to other threads.
#[derive(Clone, Default)]
pub struct Snapshot {
    tail: Option<Arc<CrosserNode>>,
}

impl Snapshot {
    /// Captures the chain of the current thread.
    #[inline]
    pub fn capture() -> Snapshot {
        Snapshot { tail: chain_tail() }
    }

    /// Whether the snapshot holds no captors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail.is_none()
    }

    /// Number of auto-crossing captors on the captured chain, across all types.
    pub fn depth(&self) -> usize {
        self.tail.as_ref().map_or(0, |tail| tail.depth())
    }

    /// Runs `f` on the current thread as if inside the captured scope.
    ///
    /// For every captor type on the chain, the innermost captor becomes current for the duration.
    /// Types that do not appear on the chain are left alone, so the caller's own captors of other
    /// types stay visible.  An empty snapshot runs `f` directly.
    pub fn call_in_context<R>(&self, f: impl FnOnce() -> R) -> R {
        let Some(tail) = &self.tail else {
            return f();
        };
        let entries = tail.innermost_entries();
        #[cfg(debug_assertions)]
        let depth = tail.depth() as u64;
        #[cfg(debug_assertions)]
        let types = entries.len() as u64;
        logwise::debuginternal_sync!(
            "Reconstructing {types} captor types from {depth} crossers, innermost {captor}",
            types = types,
            depth = depth,
            captor = tail.entry.type_name()
        );
        //types are distinct, so the guards touch disjoint slots and may drop in any order
        let _installed: Vec<Box<dyn Any>> =
            entries.iter().rev().map(|entry| entry.install()).collect();
        let _delegate = DelegateChain::new(tail.clone());
        f()
    }
}

impl Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("depth", &self.depth())
            .finish()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        match (&self.tail, &other.tail) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Snapshot {}

/// Makes a snapshot's tail the thread's chain tail, so the call can cross threads again.
struct DelegateChain {
    node: Arc<CrosserNode>,
    previous: Option<Arc<CrosserNode>>,
}

impl DelegateChain {
    fn new(node: Arc<CrosserNode>) -> Self {
        let previous = set_chain_tail(Some(node.clone()));
        DelegateChain { node, previous }
    }
}

impl Drop for DelegateChain {
    fn drop(&mut self) {
        let in_order = chain_tail_is(Some(&self.node));
        let leftover = set_chain_tail(self.previous.take());
        if !in_order {
            //a crosser pushed during the call is still alive
            match leftover {
                Some(node) => {
                    captor::report_out_of_order("AutoThreadCrosser", node.entry.type_name())
                }
                None => captor::report_lifo_violation::<Snapshot>("wrapped call"),
            }
        }
    }
}

/// A captured scope that can be re-entered on demand.
///
/// Use this when a framework calls into your code on threads it controls, so there is no
/// opportunity to [`wrap`](crate::wrap) the callback.  Build the override point where the scope is
/// known, and route each incoming call through [`OverridePoint::call`].
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use capture_thread::{AutoThreadCrosser, Captor, OverridePoint, impl_captor};
///
/// #[derive(Default)]
/// struct Queries(Mutex<Vec<String>>);
/// impl_captor!(Queries);
///
/// struct Handler {
///     override_point: OverridePoint,
/// }
/// impl Handler {
///     fn handle(&self, query: &str) {
///         self.override_point.call(|| {
///             Queries::with_current(|q| q.0.lock().unwrap().push(query.to_string()));
///         });
///     }
/// }
///
/// let queries = Arc::new(Queries::default());
/// let _crosser = AutoThreadCrosser::new(queries.clone());
/// let handler = Handler { override_point: OverridePoint::new() };
/// std::thread::scope(|s| {
///     s.spawn(|| handler.handle("query 1"));
/// });
/// assert_eq!(*queries.0.lock().unwrap(), vec!["query 1"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverridePoint {
    snapshot: Snapshot,
}

impl OverridePoint {
    /// Captures the current scope.
    pub fn new() -> Self {
        OverridePoint {
            snapshot: Snapshot::capture(),
        }
    }

    /// Runs `f` now, inside the captured scope.
    #[inline]
    pub fn call<R>(&self, f: impl FnOnce() -> R) -> R {
        self.snapshot.call_in_context(f)
    }

    /// The captured scope.
    #[inline]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}
