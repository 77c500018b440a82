use {
    super::WritableCallback,
    crate::{
        error::Error,
        fatal,
        knot::{Cursor, Knot},
        prelude::*,
    },
    mio::{unix::SourceFd, Events, Interest, Poll, Token, Waker},
    std::{
        collections::{HashMap, VecDeque},
        io,
        os::unix::io::RawFd,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
        thread,
    },
};

const WAKER: Token = Token(usize::MAX);

/// Back-pressure threshold per queue. A `write` that would push the
/// pending byte count past this is refused and the caller decides whether
/// to retry, abandon, or block.
pub const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

pub(crate) type SentCallback = Box<dyn FnOnce() + Send>;

struct QueueItem {
    payload: Knot,
    /// First unwritten character of `payload`.
    cursor: Cursor,
    on_sent: Option<SentCallback>,
}

struct QueueState {
    items: VecDeque<QueueItem>,
    pending_bytes: usize,
    /// Writable interest currently registered with the poller. Holds
    /// exactly when `items` is non-empty.
    registered: bool,
}

pub(crate) struct QueueInner {
    fd: RawFd,
    registry: mio::Registry,
    state: Mutex<QueueState>,
}

/// Serializes all writes to one descriptor.
///
/// Handles are clones of a per-descriptor singleton, so writes from any
/// thread leave in the order `write` accepted them. When the descriptor
/// can take the bytes immediately they are written on the calling thread;
/// otherwise the residue is parked and the write worker finishes it on
/// writable-readiness.
#[derive(Clone)]
pub struct WriteQueue {
    inner: Arc<QueueInner>,
}

impl WriteQueue {
    /// Queues `payload` for sending. Fails with
    /// [`Error::WriteRefused`] when the queue is over its back-pressure
    /// threshold.
    pub fn write(&self, payload: Knot) -> Result<()> {
        self.write_with_callback_impl(payload, None)
    }

    /// Like `write`; `on_sent` runs once the final byte of the payload has
    /// been handed to the kernel.
    pub fn write_with_callback<F>(&self, payload: Knot, on_sent: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.write_with_callback_impl(payload, Some(Box::new(on_sent)))
    }

    fn write_with_callback_impl(&self, payload: Knot, on_sent: Option<SentCallback>) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        if state.pending_bytes + payload.size() > MAX_PENDING_BYTES {
            return Err(Error::WriteRefused {
                pending: state.pending_bytes,
            });
        }

        if state.items.is_empty() && !state.registered {
            // Queue idle: try to push the whole payload out right here.
            let cursor = payload.write_nonblocking(inner.fd, payload.begin());
            if cursor.is_end() {
                drop(state);
                if let Some(cb) = on_sent {
                    cb();
                }
                return Ok(());
            }
            state.pending_bytes += payload.distance(cursor, Cursor::End);
            state.items.push_back(QueueItem {
                payload,
                cursor,
                on_sent,
            });
            state.registered = true;
            if let Err(err) = inner.registry.register(
                &mut SourceFd(&inner.fd),
                Token(inner.fd as usize),
                Interest::WRITABLE,
            ) {
                fatal!(
                    "cannot register descriptor {} for writing: {}",
                    inner.fd,
                    err
                );
            }
            return Ok(());
        }

        state.pending_bytes += payload.size();
        let cursor = payload.begin();
        state.items.push_back(QueueItem {
            payload,
            cursor,
            on_sent,
        });
        Ok(())
    }

    /// Bytes accepted but not yet written.
    pub fn pending_bytes(&self) -> usize {
        self.inner.state.lock().unwrap().pending_bytes
    }

    pub fn fd(&self) -> RawFd {
        self.inner.fd
    }
}

enum WriteEntry {
    Queue(Arc<QueueInner>),
    OneShot(Option<WritableCallback>),
}

struct WriteShared {
    entries: HashMap<RawFd, WriteEntry>,
    registry: mio::Registry,
}

/// The write half of the event loop: one thread draining the parked
/// residue of every write queue.
pub(crate) struct WriteLoop {
    registry: mio::Registry,
    waker: Arc<Waker>,
    shared: Arc<Mutex<WriteShared>>,
    exit: Arc<AtomicBool>,
    poll: Mutex<Option<Poll>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WriteLoop {
    pub(crate) fn new() -> Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let shared = WriteShared {
            entries: HashMap::new(),
            registry: poll.registry().try_clone()?,
        };
        Ok(Self {
            registry,
            waker,
            shared: Arc::new(Mutex::new(shared)),
            exit: Arc::new(AtomicBool::new(false)),
            poll: Mutex::new(Some(poll)),
            handle: Mutex::new(None),
        })
    }

    pub(crate) fn start(&self) {
        let mut poll = match self.poll.lock().unwrap().take() {
            Some(poll) => poll,
            None => return,
        };
        let shared = Arc::clone(&self.shared);
        let exit = Arc::clone(&self.exit);
        let worker = thread::Builder::new()
            .name("write-loop".into())
            .spawn(move || run(&mut poll, &shared, &exit))
            .expect("failed to spawn the write loop");
        *self.handle.lock().unwrap() = Some(worker);
    }

    pub(crate) fn get_write_queue(&self, fd: RawFd) -> WriteQueue {
        let mut shared = self.shared.lock().unwrap();
        if let Some(WriteEntry::Queue(inner)) = shared.entries.get(&fd) {
            return WriteQueue {
                inner: Arc::clone(inner),
            };
        }
        if let Err(err) = crate::fd::set_nonblocking(fd) {
            fatal!("cannot make descriptor {} non-blocking: {}", fd, err);
        }
        let inner = Arc::new(QueueInner {
            fd,
            registry: self
                .registry
                .try_clone()
                .expect("cannot clone the write registry"),
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                pending_bytes: 0,
                registered: false,
            }),
        });
        shared
            .entries
            .insert(fd, WriteEntry::Queue(Arc::clone(&inner)));
        WriteQueue { inner }
    }

    /// Runs `cb` once, the next time the descriptor becomes writable. Used
    /// for non-blocking connect completion.
    pub(crate) fn register_writable_once(&self, fd: RawFd, cb: WritableCallback) {
        let mut shared = self.shared.lock().unwrap();
        shared.entries.insert(fd, WriteEntry::OneShot(Some(cb)));
        if let Err(err) =
            self.registry
                .register(&mut SourceFd(&fd), Token(fd as usize), Interest::WRITABLE)
        {
            fatal!(
                "cannot register descriptor {} for connect completion: {}",
                fd,
                err
            );
        }
    }

    pub(crate) fn exit_loop(&self) {
        self.exit.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }

    pub(crate) fn wait_for_exit(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn run(poll: &mut Poll, shared: &Arc<Mutex<WriteShared>>, exit: &Arc<AtomicBool>) {
    let mut events = Events::with_capacity(256);
    loop {
        if let Err(err) = poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            fatal!("write loop poll failed: {}", err);
        }
        for event in events.iter() {
            if event.token() == WAKER {
                continue;
            }
            writable(event.token().0 as RawFd, shared);
        }
        if exit.load(Ordering::SeqCst) {
            debug!("write loop exiting");
            return;
        }
    }
}

fn writable(fd: RawFd, shared: &Arc<Mutex<WriteShared>>) {
    let entry = {
        let mut guard = shared.lock().unwrap();
        match guard.entries.get_mut(&fd) {
            Some(WriteEntry::Queue(inner)) => WriteEntry::Queue(Arc::clone(inner)),
            Some(WriteEntry::OneShot(cb)) => WriteEntry::OneShot(cb.take()),
            None => return,
        }
    };
    match entry {
        WriteEntry::Queue(inner) => drain(&inner),
        WriteEntry::OneShot(cb) => {
            {
                let mut guard = shared.lock().unwrap();
                guard.entries.remove(&fd);
                let _ = guard.registry.deregister(&mut SourceFd(&fd));
            }
            if let Some(cb) = cb {
                cb();
            }
        }
    }
}

/// Writes queued items until the descriptor pushes back or the queue is
/// empty. Completion callbacks run outside the queue lock so they may call
/// `write` themselves.
fn drain(inner: &Arc<QueueInner>) {
    loop {
        let mut state = inner.state.lock().unwrap();
        let (finished, progressed) = match state.items.front_mut() {
            Some(item) => {
                let resumed = item.payload.write_nonblocking(inner.fd, item.cursor);
                let progressed = item.payload.distance(item.cursor, resumed);
                item.cursor = resumed;
                (resumed.is_end(), progressed)
            }
            None => {
                if state.registered {
                    state.registered = false;
                    let _ = inner.registry.deregister(&mut SourceFd(&inner.fd));
                }
                return;
            }
        };
        state.pending_bytes -= progressed;
        if finished {
            let item = state.items.pop_front().unwrap();
            drop(state);
            if let Some(cb) = item.on_sent {
                cb();
            }
            continue;
        }
        // The descriptor pushed back; stay registered for the next edge.
        return;
    }
}
