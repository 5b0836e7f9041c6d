// SPDX-License-Identifier: MIT OR Apache-2.0

//! Randomized nesting of scopes.

use std::sync::Arc;

use capture_thread::{AutoThreadCrosser, Captor, ScopedCapture, Snapshot, impl_captor, wrap};
use proptest::prelude::*;

#[derive(Debug)]
struct Primary(u32);
impl_captor!(Primary);

#[derive(Debug)]
struct Secondary(u32);
impl_captor!(Secondary);

#[derive(Debug, Clone, Copy)]
enum ScopeOp {
    /// Enter a thread-only scope.
    Scoped(u32),
    /// Enter an auto-crossing scope.
    Crossing(u32),
    /// Leave the innermost scope, if any.
    Exit,
}

fn scope_op() -> impl Strategy<Value = ScopeOp> {
    prop_oneof![
        3 => any::<u32>().prop_map(ScopeOp::Scoped),
        3 => any::<u32>().prop_map(ScopeOp::Crossing),
        2 => Just(ScopeOp::Exit),
    ]
}

/// A live scope of either kind.
type Handle = Box<dyn std::any::Any>;

fn current_id<T: Captor + ?Sized>(id: impl FnOnce(&T) -> u32) -> Option<u32> {
    T::with_current(id)
}

/// Applies `ops`, calling `check` after every step with the ids of the live captors.
fn run_ops(ops: &[ScopeOp], mut check: impl FnMut(&[u32])) {
    let mut handles: Vec<Handle> = Vec::new();
    let mut model: Vec<u32> = Vec::new();
    for op in ops {
        match *op {
            ScopeOp::Scoped(id) => {
                handles.push(Box::new(ScopedCapture::new(Arc::new(Primary(id)))));
                model.push(id);
            }
            ScopeOp::Crossing(id) => {
                handles.push(Box::new(AutoThreadCrosser::new(Arc::new(Primary(id)))));
                model.push(id);
            }
            ScopeOp::Exit => {
                handles.pop();
                model.pop();
            }
        }
        check(&model);
    }
    while handles.pop().is_some() {
        model.pop();
        check(&model);
    }
}

proptest! {
    #[test]
    fn innermost_scope_is_current(ops in prop::collection::vec(scope_op(), 0..48)) {
        let base = ScopedCapture::new(Arc::new(Primary(u32::MAX)));
        let mut seen = Vec::new();
        run_ops(&ops, |model| {
            let expected = model.last().copied().unwrap_or(u32::MAX);
            seen.push((current_id::<Primary>(|p| p.0), expected));
        });
        for (actual, expected) in seen {
            prop_assert_eq!(actual, Some(expected));
        }
        drop(base);
        prop_assert!(Primary::current().is_none());
        prop_assert!(Snapshot::capture().is_empty());
    }

    #[test]
    fn scopes_do_not_touch_other_types(ops in prop::collection::vec(scope_op(), 0..48)) {
        let secondary = Arc::new(Secondary(7));
        let _secondary = ScopedCapture::new(secondary.clone());
        let mut isolated = true;
        run_ops(&ops, |_| {
            isolated &= current_id::<Secondary>(|s| s.0) == Some(7);
        });
        prop_assert!(isolated);

        let other_thread = std::thread::spawn(|| Secondary::current().is_none())
            .join()
            .unwrap();
        prop_assert!(other_thread);
    }

    #[test]
    fn snapshot_sees_innermost_crossing(ops in prop::collection::vec(scope_op(), 0..32)) {
        let mut handles: Vec<Handle> = Vec::new();
        let mut crossing: Vec<u32> = Vec::new();
        let mut kinds: Vec<bool> = Vec::new();
        for op in &ops {
            match *op {
                ScopeOp::Scoped(id) => {
                    handles.push(Box::new(ScopedCapture::new(Arc::new(Primary(id)))));
                    kinds.push(false);
                }
                ScopeOp::Crossing(id) => {
                    handles.push(Box::new(AutoThreadCrosser::new(Arc::new(Primary(id)))));
                    crossing.push(id);
                    kinds.push(true);
                }
                ScopeOp::Exit => {
                    handles.pop();
                    if kinds.pop() == Some(true) {
                        crossing.pop();
                    }
                }
            }
        }

        let expected = crossing.last().copied();
        let callback = wrap(|| current_id::<Primary>(|p| p.0));
        let seen = std::thread::spawn(move || callback.call()).join().unwrap();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(Snapshot::capture().depth(), crossing.len());

        while handles.pop().is_some() {}
        prop_assert!(Primary::current().is_none());
    }
}
