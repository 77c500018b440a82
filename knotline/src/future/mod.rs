mod aggregate;

pub use self::aggregate::{
    AggregatingFuture, Aggregator, CharCountAggregator, ConcatAggregator, PartialAggregator,
    RowHashAggregator,
};

use std::sync::{Arc, Condvar, Mutex};

/// A value that will exist in the future.
///
/// The producing side calls [`fire`](Future::fire) exactly once; consumers
/// either block on [`wait`](Future::wait)/[`value`](Future::value) or
/// register callbacks. Futures are cheap to copy by value, so they can be
/// handed across threads and components without ownership ceremony.
pub struct Future<T> {
    data: Arc<FutureData<T>>,
}

struct FutureData<T> {
    state: Mutex<State<T>>,
    fired_cond: Condvar,
}

struct State<T> {
    fired: bool,
    value: Option<T>,
    callbacks: Vec<Box<dyn FnOnce(T) + Send>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> Default for Future<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Future<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            data: Arc::new(FutureData {
                state: Mutex::new(State {
                    fired: false,
                    value: None,
                    callbacks: Vec::new(),
                }),
                fired_cond: Condvar::new(),
            }),
        }
    }

    /// Fires the future: releases waiters and runs every registered
    /// callback, in registration order, before `fired` becomes observable.
    /// Firing twice is a detected error. Callbacks run under the internal
    /// lock and must not call back into this future.
    pub fn fire(&self, value: T) {
        let mut state = self.data.state.lock().unwrap();
        assert!(!state.fired, "future fired twice");
        state.value = Some(value.clone());
        for callback in state.callbacks.drain(..) {
            callback(value.clone());
        }
        state.fired = true;
        self.data.fired_cond.notify_all();
    }

    /// Blocks until some thread calls `fire`.
    pub fn wait(&self) {
        let mut state = self.data.state.lock().unwrap();
        while !state.fired {
            state = self.data.fired_cond.wait(state).unwrap();
        }
    }

    /// Blocks until fired, then returns the fired value.
    pub fn value(&self) -> T {
        let mut state = self.data.state.lock().unwrap();
        while !state.fired {
            state = self.data.fired_cond.wait(state).unwrap();
        }
        state.value.clone().unwrap()
    }

    /// Non-blocking check. When this returns true, `wait` and `value` will
    /// not block.
    pub fn has_fired(&self) -> bool {
        self.data.state.lock().unwrap().fired
    }

    /// Runs `callback` with the fired value as soon as possible after
    /// `fire`; immediately if the future already fired.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut state = self.data.state.lock().unwrap();
        if state.fired {
            let value = state.value.clone().unwrap();
            callback(value);
        } else {
            state.callbacks.push(Box::new(callback));
        }
    }
}

/// Waits for a whole group of futures.
///
/// `add` every future of interest, then `wait` blocks until each one has
/// fired. Adding while other threads are already blocked in `wait` is
/// fine: the outstanding count bumps and the callback registration happen
/// under one lock.
pub struct FutureWaiter<T> {
    data: Arc<WaiterData>,
    _marker: std::marker::PhantomData<fn(T)>,
}

struct WaiterData {
    outstanding: Mutex<usize>,
    none_pending_cond: Condvar,
}

impl<T> Default for FutureWaiter<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FutureWaiter<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            data: Arc::new(WaiterData {
                outstanding: Mutex::new(0),
                none_pending_cond: Condvar::new(),
            }),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn add(&self, future: Future<T>) {
        {
            let mut outstanding = self.data.outstanding.lock().unwrap();
            *outstanding += 1;
        }
        let data = Arc::clone(&self.data);
        future.add_callback(move |_| {
            let mut outstanding = data.outstanding.lock().unwrap();
            assert!(*outstanding > 0);
            *outstanding -= 1;
            if *outstanding == 0 {
                data.none_pending_cond.notify_all();
            }
        });
    }

    pub fn wait(&self) {
        let mut outstanding = self.data.outstanding.lock().unwrap();
        while *outstanding > 0 {
            outstanding = self.data.none_pending_cond.wait(outstanding).unwrap();
        }
    }
}
