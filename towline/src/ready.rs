use {
    crate::prelude::*,
    knotline::{Flow, Knot, ProtocolExtension, WriteQueue},
    std::{
        collections::VecDeque,
        sync::{Arc, Condvar, Mutex},
    },
};

pub type ReadySentCallback = Box<dyn FnOnce() + Send>;

struct SentSignal {
    sent: Mutex<bool>,
    cond: Condvar,
}

struct SendItem {
    payload: Knot,
    on_sent: Option<ReadySentCallback>,
    signal: Option<Arc<SentSignal>>,
}

struct ReadyState {
    ready: bool,
    send_queue: VecDeque<SendItem>,
}

/// Tracks the peer's READY state and gates every outbound payload on it.
///
/// Register this as the extension for the `READY` token, then route all
/// sends to the peer through it: `schedule_send` queues and returns,
/// `block_until_ready_and_send` waits for the payload to go out. Exactly
/// one payload is released per READY received, in FIFO order, and a
/// payload's `on_sent` callback runs after dequeue but *before* the write
/// syscall so callers timing a command measure up to the moment the bytes
/// leave the harness.
pub struct ReadyMonitor {
    write_queue: WriteQueue,
    /// Serializes releases so concurrent READY + schedule cannot reorder
    /// payloads between dequeue and write. User callbacks run under this
    /// lock but never under `state`.
    release_tex: Mutex<()>,
    state: Mutex<ReadyState>,
    ready_cond: Condvar,
}

impl ReadyMonitor {
    /// `write_queue` carries everything this monitor releases; for a SUT
    /// it is the queue on the child's stdin.
    pub fn new(write_queue: WriteQueue) -> Self {
        Self {
            write_queue,
            release_tex: Mutex::new(()),
            state: Mutex::new(ReadyState {
                ready: false,
                send_queue: VecDeque::new(),
            }),
            ready_cond: Condvar::new(),
        }
    }

    /// Current ready state. May be stale by the time it returns.
    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    /// Blocks until the peer is in the READY state. Mainly for the
    /// initial READY before a test begins.
    pub fn wait_until_ready(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.ready {
            state = self.ready_cond.wait(state).unwrap();
        }
    }

    /// Sends as soon as the peer allows; returns immediately.
    pub fn schedule_send(&self, payload: Knot) {
        self.schedule_item(SendItem {
            payload,
            on_sent: None,
            signal: None,
        });
    }

    /// Like `schedule_send`, with `on_sent` invoked at release time,
    /// before the bytes hit the descriptor.
    pub fn schedule_send_with_callback<F>(&self, payload: Knot, on_sent: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_item(SendItem {
            payload,
            on_sent: Some(Box::new(on_sent)),
            signal: None,
        });
    }

    /// Synchronous variant: returns once the payload has been released
    /// and handed to the write queue.
    pub fn block_until_ready_and_send(&self, payload: Knot) {
        let signal = Arc::new(SentSignal {
            sent: Mutex::new(false),
            cond: Condvar::new(),
        });
        self.schedule_item(SendItem {
            payload,
            on_sent: None,
            signal: Some(Arc::clone(&signal)),
        });
        let mut sent = signal.sent.lock().unwrap();
        while !*sent {
            sent = signal.cond.wait(sent).unwrap();
        }
    }

    fn schedule_item(&self, item: SendItem) {
        let _release = self.release_tex.lock().unwrap();
        let releasable = {
            let mut state = self.state.lock().unwrap();
            if state.ready && state.send_queue.is_empty() {
                state.ready = false;
                Some(item)
            } else {
                state.send_queue.push_back(item);
                None
            }
        };
        if let Some(item) = releasable {
            self.release(item);
        }
    }

    /// Hands one item to the write queue. Caller holds `release_tex` and
    /// has already cleared the ready flag.
    fn release(&self, item: SendItem) {
        if let Some(cb) = item.on_sent {
            cb();
        }
        if let Err(err) = self.write_queue.write(item.payload) {
            warn!("release refused by the write queue: {}", err);
        }
        if let Some(signal) = item.signal {
            let mut sent = signal.sent.lock().unwrap();
            *sent = true;
            signal.cond.notify_all();
        }
    }
}

impl ProtocolExtension for ReadyMonitor {
    /// The peer signalled READY: release the oldest pending payload, or
    /// remember the state for the next send.
    fn on_start(&self, _start_line: Knot) -> Flow {
        let _release = self.release_tex.lock().unwrap();
        let releasable = {
            let mut state = self.state.lock().unwrap();
            match state.send_queue.pop_front() {
                // The flag stays false: this READY is consumed by the
                // release below.
                Some(item) => Some(item),
                None => {
                    state.ready = true;
                    self.ready_cond.notify_all();
                    None
                }
            }
        };
        if let Some(item) = releasable {
            self.release(item);
        }
        Flow::Done
    }
}
