// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sample captors shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use capture_thread::{AutoThreadCrosser, Captor, ScopedCapture, impl_captor};

/// Receives text log lines.
pub trait LogText: Send + Sync {
    fn log_line(&self, line: String);
}
impl_captor!(dyn LogText);

impl dyn LogText {
    pub fn log(line: impl Into<String>) {
        <dyn LogText>::with_current(|logger| logger.log_line(line.into()));
    }
}

/// Receives counted values.
pub trait LogValues: Send + Sync {
    fn count_value(&self, value: i32);
}
impl_captor!(dyn LogValues);

impl dyn LogValues {
    pub fn count(value: i32) {
        <dyn LogValues>::with_current(|logger| logger.count_value(value));
    }
}

#[derive(Default)]
pub struct TextLines(Mutex<Vec<String>>);

impl TextLines {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl LogText for TextLines {
    fn log_line(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }
}

#[derive(Default)]
pub struct Counts(Mutex<Vec<i32>>);

impl Counts {
    pub fn counts(&self) -> Vec<i32> {
        self.0.lock().unwrap().clone()
    }
}

impl LogValues for Counts {
    fn count_value(&self, value: i32) {
        self.0.lock().unwrap().push(value);
    }
}

/// Text logger that stays on its own thread.
pub struct LogTextSingleThread {
    lines: Arc<TextLines>,
    _capture: ScopedCapture<dyn LogText>,
}

impl LogTextSingleThread {
    pub fn new() -> Self {
        let lines = Arc::new(TextLines::default());
        LogTextSingleThread {
            _capture: ScopedCapture::<dyn LogText>::new(lines.clone()),
            lines,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lines()
    }
}

/// Text logger that follows wrapped calls.
pub struct LogTextMultiThread {
    lines: Arc<TextLines>,
    _crosser: AutoThreadCrosser<dyn LogText>,
}

impl LogTextMultiThread {
    pub fn new() -> Self {
        let lines = Arc::new(TextLines::default());
        LogTextMultiThread {
            _crosser: AutoThreadCrosser::<dyn LogText>::new(lines.clone()),
            lines,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lines()
    }
}

/// Value logger that stays on its own thread.
pub struct LogValuesSingleThread {
    counts: Arc<Counts>,
    _capture: ScopedCapture<dyn LogValues>,
}

impl LogValuesSingleThread {
    pub fn new() -> Self {
        let counts = Arc::new(Counts::default());
        LogValuesSingleThread {
            _capture: ScopedCapture::<dyn LogValues>::new(counts.clone()),
            counts,
        }
    }

    pub fn counts(&self) -> Vec<i32> {
        self.counts.counts()
    }
}

/// Value logger that follows wrapped calls.
pub struct LogValuesMultiThread {
    counts: Arc<Counts>,
    _crosser: AutoThreadCrosser<dyn LogValues>,
}

impl LogValuesMultiThread {
    pub fn new() -> Self {
        let counts = Arc::new(Counts::default());
        LogValuesMultiThread {
            _crosser: AutoThreadCrosser::<dyn LogValues>::new(counts.clone()),
            counts,
        }
    }

    pub fn counts(&self) -> Vec<i32> {
        self.counts.counts()
    }
}

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Callback>,
    active: usize,
    terminated: bool,
}

/// A work queue serviced by a worker thread.
#[derive(Default)]
pub struct CallbackQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl CallbackQueue {
    pub fn push(&self, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(Box::new(callback));
        self.changed.notify_all();
    }

    /// Blocks until a callback is available and runs it.  Returns false once terminated.
    pub fn pop_and_call(&self) -> bool {
        let callback = {
            let mut state = self.state.lock().unwrap();
            loop {
                if state.terminated {
                    return false;
                }
                if let Some(callback) = state.queue.pop_front() {
                    state.active += 1;
                    break callback;
                }
                state = self.changed.wait(state).unwrap();
            }
        };
        callback();
        let mut state = self.state.lock().unwrap();
        state.active -= 1;
        self.changed.notify_all();
        true
    }

    pub fn wait_until_empty(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.queue.is_empty() || state.active > 0 {
            state = self.changed.wait(state).unwrap();
        }
    }

    pub fn terminate(&self) {
        let mut state = self.state.lock().unwrap();
        state.terminated = true;
        self.changed.notify_all();
    }
}
