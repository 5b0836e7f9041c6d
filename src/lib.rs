//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# capture_thread

capture_thread makes scoped, typed, per-thread context objects available to code deep in a call
chain, including code that runs on other threads, without passing them through every function
signature.

# Development status

capture_thread is experimental and the API may change.

# The problem

Suppose a library function several layers down wants to report something: a log line, a metric,
a "this was slow" note.  The usual options are a global (which every caller shares, whether they
want it or not) or a parameter threaded through every function between the caller and the
reporter (which nobody wants).

What you usually want is *dynamic scope*: "whoever called me, directly or indirectly, and cares
about this, should get it".  Thread-locals give you most of that, until work is handed off to
another thread and the context stays behind.

# Captors

A *captor* is any value that wants to receive calls from code running inside its scope.  The
captor type is typically a trait object, so many implementations can stand in for one interface:

```rust
use std::sync::{Arc, Mutex};
use capture_thread::{AutoThreadCrosser, Captor, impl_captor, wrap};

pub trait LogText: Send + Sync {
    fn log_line(&self, line: String);
}
impl_captor!(dyn LogText);

// Library code: a no-op unless someone up the stack is listening.
fn log(line: &str) {
    <dyn LogText>::with_current(|logger| logger.log_line(line.to_string()));
}

#[derive(Default)]
struct Collect(Mutex<Vec<String>>);
impl LogText for Collect {
    fn log_line(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }
}

let lines = Arc::new(Collect::default());
let _scope = AutoThreadCrosser::<dyn LogText>::new(lines.clone());
log("on main");
let worker = wrap(|| log("on worker"));
std::thread::spawn(worker.into_fn()).join().unwrap();
assert_eq!(*lines.0.lock().unwrap(), vec!["on main", "on worker"]);
```

Each captor type has its own thread-local slot.  Scopes of one type never affect another type.

# Scopes

| Handle                 | Visible on this thread | Follows [`wrap`]ped calls | Crosses by hand |
|------------------------|------------------------|---------------------------|-----------------|
| [`ScopedCapture`]      | yes                    | no                        | via [`ThreadBridge`] |
| [`AutoThreadCrosser`]  | yes                    | yes                       | via [`ThreadBridge`] |

Handles nest, and must be dropped in reverse order of creation.  Out-of-order drops are reported
through logwise, and panic in debug builds.

# Crossing threads

* [`wrap`] captures every [`AutoThreadCrosser`] in scope into a [`Wrapped`] callable.  Calling it,
  on any thread, reinstalls those captors, innermost winning for each type.  Types absent from the
  snapshot fall through to the calling thread's own captors.
* [`wrap_future`] does the same for every poll of a future.
* [`OverridePoint`] captures the scope up front for frameworks that call you back on threads you
  don't control.
* [`ThreadBridge`] and [`CrossThreads`] move a single captor type across by hand, which also works
  for [`ScopedCapture`].

# Lifetimes

Captors are shared through [`Arc`](std::sync::Arc).  A snapshot keeps the captors it names alive,
so a wrapped callable can never observe a destroyed captor.  Captors that cross threads must be
`Send + Sync` and do their own synchronization.
*/

mod bridge;
mod captor;
mod crosser;
mod scoped;
mod wrap;

logwise::declare_logging_domain!();

pub use bridge::{CrossThreads, ThreadBridge};
pub use captor::{Captor, CurrentSlot, current};
pub use crosser::{AutoThreadCrosser, OverridePoint, Snapshot};
pub use scoped::ScopedCapture;
pub use wrap::{WrapCall, Wrapped, wrap, wrap_future};

#[doc(hidden)]
pub mod hidden {
    pub use crate::wrap::AlreadyWrapped;
}
