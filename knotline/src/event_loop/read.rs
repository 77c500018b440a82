use {
    super::{ConnectionCallback, DataCallback, EofCallback, LoopInner},
    crate::{
        event_loop::EventLoop,
        fatal,
        knot::{Knot, Strand},
        net::NetworkConnection,
        prelude::*,
    },
    mio::{event::Event, net::TcpListener, unix::SourceFd, Events, Interest, Poll, Token, Waker},
    std::{
        collections::{HashMap, HashSet},
        io,
        net::SocketAddr,
        os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex, Weak,
        },
        thread,
    },
};

const WAKER: Token = Token(usize::MAX);

/// Upper bound on bytes moved per read syscall. Each chunk becomes one
/// strand handed to the data callback.
const READ_CHUNK: usize = 8192;

struct ReadSource {
    data_cb: Option<DataCallback>,
    eof_cbs: Vec<EofCallback>,
}

struct ListenEntry {
    listener: TcpListener,
    addr: SocketAddr,
    cb: ConnectionCallback,
}

struct ReadShared {
    sources: HashMap<RawFd, ReadSource>,
    listeners: HashMap<RawFd, ListenEntry>,
    listener_fds: HashMap<SocketAddr, RawFd>,
    /// Descriptors the worker is currently servicing. Their entry is out
    /// of `sources` but they are still registered with the poller.
    checked_out: HashSet<RawFd>,
    /// Descriptors whose removal was requested while checked out.
    doomed: HashSet<RawFd>,
    registry: mio::Registry,
    loop_handle: Weak<LoopInner>,
}

/// The read half of the event loop: one thread, one poller, every
/// registered descriptor's inbound data.
pub(crate) struct ReadLoop {
    registry: mio::Registry,
    waker: Arc<Waker>,
    shared: Arc<Mutex<ReadShared>>,
    exit: Arc<AtomicBool>,
    poll: Mutex<Option<Poll>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ReadLoop {
    pub(crate) fn new() -> Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let shared = ReadShared {
            sources: HashMap::new(),
            listeners: HashMap::new(),
            listener_fds: HashMap::new(),
            checked_out: HashSet::new(),
            doomed: HashSet::new(),
            registry: poll.registry().try_clone()?,
            loop_handle: Weak::new(),
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

    pub(crate) fn set_loop_handle(&self, handle: Weak<LoopInner>) {
        self.shared.lock().unwrap().loop_handle = handle;
    }

    pub(crate) fn start(&self) {
        let mut poll = match self.poll.lock().unwrap().take() {
            Some(poll) => poll,
            None => return,
        };
        let shared = Arc::clone(&self.shared);
        let exit = Arc::clone(&self.exit);
        let worker = thread::Builder::new()
            .name("read-loop".into())
            .spawn(move || run(&mut poll, &shared, &exit))
            .expect("failed to spawn the read loop");
        *self.handle.lock().unwrap() = Some(worker);
    }

    pub(crate) fn register_data_callback(&self, fd: RawFd, cb: DataCallback) {
        if let Err(err) = crate::fd::set_nonblocking(fd) {
            fatal!("cannot make descriptor {} non-blocking: {}", fd, err);
        }
        let mut shared = self.shared.lock().unwrap();
        shared.doomed.remove(&fd);
        let known = shared.sources.contains_key(&fd) || shared.checked_out.contains(&fd);
        let entry = shared.sources.entry(fd).or_insert_with(|| ReadSource {
            data_cb: None,
            eof_cbs: Vec::new(),
        });
        assert!(entry.data_cb.is_none(), "data callback already registered");
        entry.data_cb = Some(cb);
        if !known {
            self.register_fd(fd);
        }
    }

    pub(crate) fn register_eof_callback(&self, fd: RawFd, cb: EofCallback) {
        let mut shared = self.shared.lock().unwrap();
        let known = shared.sources.contains_key(&fd) || shared.checked_out.contains(&fd);
        let entry = shared.sources.entry(fd).or_insert_with(|| ReadSource {
            data_cb: None,
            eof_cbs: Vec::new(),
        });
        entry.eof_cbs.push(cb);
        if !known {
            self.register_fd(fd);
        }
    }

    fn register_fd(&self, fd: RawFd) {
        if let Err(err) = self
            .registry
            .register(&mut SourceFd(&fd), Token(fd as usize), Interest::READABLE)
        {
            fatal!("cannot register descriptor {} for reading: {}", fd, err);
        }
    }

    pub(crate) fn remove_data_callback(&self, fd: RawFd) {
        let mut shared = self.shared.lock().unwrap();
        if shared.sources.contains_key(&fd) {
            shared.sources.remove(&fd);
            let _ = self.registry.deregister(&mut SourceFd(&fd));
        } else {
            // Checked out by the worker right now; it drops it on return.
            shared.doomed.insert(fd);
        }
    }

    pub(crate) fn remove_eof_callbacks(&self, fd: RawFd) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(entry) = shared.sources.get_mut(&fd) {
            entry.eof_cbs.clear();
        }
    }

    /// Binds and registers the listener, returning the bound address
    /// (relevant when the caller asked for port 0).
    pub(crate) fn listen(&self, addr: SocketAddr, cb: ConnectionCallback) -> Result<SocketAddr> {
        let listener = bind_listener(addr)?;
        let local = listener.local_addr()?;
        let fd = listener.as_raw_fd();
        let mut shared = self.shared.lock().unwrap();
        let mut entry = ListenEntry {
            listener,
            addr: local,
            cb,
        };
        self.registry
            .register(&mut entry.listener, Token(fd as usize), Interest::READABLE)?;
        info!(addr = %local, "listening for connections");
        shared.listener_fds.insert(local, fd);
        shared.listeners.insert(fd, entry);
        Ok(local)
    }

    pub(crate) fn stop_listening(&self, addr: SocketAddr) {
        let mut shared = self.shared.lock().unwrap();
        let fd = match shared.listener_fds.remove(&addr) {
            Some(fd) => fd,
            None => fatal!("not listening on {}", addr),
        };
        if let Some(mut entry) = shared.listeners.remove(&fd) {
            let _ = self.registry.deregister(&mut entry.listener);
            debug!(addr = %entry.addr, "listener removed");
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

fn run(poll: &mut Poll, shared: &Arc<Mutex<ReadShared>>, exit: &Arc<AtomicBool>) {
    let mut events = Events::with_capacity(256);
    loop {
        if let Err(err) = poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            fatal!("read loop poll failed: {}", err);
        }
        for event in events.iter() {
            dispatch_event(event, shared);
        }
        if exit.load(Ordering::SeqCst) {
            debug!("read loop exiting");
            return;
        }
    }
}

fn dispatch_event(event: &Event, shared: &Arc<Mutex<ReadShared>>) {
    let token = event.token();
    if token == WAKER {
        return;
    }
    let fd = token.0 as RawFd;
    if shared.lock().unwrap().listeners.contains_key(&fd) {
        accept_ready(fd, shared);
    } else {
        read_ready(fd, shared);
    }
}

/// Accepts until the listener would block, handing each connection to the
/// registered callback.
fn accept_ready(fd: RawFd, shared: &Arc<Mutex<ReadShared>>) {
    loop {
        let accepted = {
            let mut guard = shared.lock().unwrap();
            let entry = match guard.listeners.get_mut(&fd) {
                Some(entry) => entry,
                // stop_listening raced the event; nothing to accept for.
                None => return,
            };
            entry.listener.accept()
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                let event_loop = {
                    let guard = shared.lock().unwrap();
                    EventLoop::from_weak(&guard.loop_handle)
                };
                let event_loop = match event_loop {
                    Some(event_loop) => event_loop,
                    None => return,
                };
                let connection =
                    NetworkConnection::new(stream.into_raw_fd(), Some(peer), event_loop);
                let cb_shared = Arc::clone(shared);
                with_listener_callback(&cb_shared, fd, connection);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!("failed to accept connection: {}", err);
                return;
            }
        }
    }
}

fn with_listener_callback(
    shared: &Arc<Mutex<ReadShared>>,
    fd: RawFd,
    connection: NetworkConnection,
) {
    // Check the callback out so it can register new descriptors freely.
    let mut cb = {
        let mut guard = shared.lock().unwrap();
        match guard.listeners.get_mut(&fd) {
            Some(entry) => std::mem::replace(&mut entry.cb, Box::new(|_| ())),
            None => return,
        }
    };
    cb(connection);
    let mut guard = shared.lock().unwrap();
    if let Some(entry) = guard.listeners.get_mut(&fd) {
        entry.cb = cb;
    }
}

/// Drains a readable descriptor, invoking the data callback per chunk and
/// the EOF callbacks when the peer is gone.
fn read_ready(fd: RawFd, shared: &Arc<Mutex<ReadShared>>) {
    // The source is checked out for the duration so the callback can talk
    // to the loop (e.g. register a reply descriptor) without deadlocking.
    let mut source = {
        let mut guard = shared.lock().unwrap();
        match guard.sources.remove(&fd) {
            Some(source) => {
                guard.checked_out.insert(fd);
                source
            }
            None => return,
        }
    };

    let mut saw_eof = false;
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let rc = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if rc > 0 {
            if let Some(cb) = source.data_cb.as_mut() {
                let mut chunk = Knot::new();
                chunk.append_strand(Strand::from_vec(buf[..rc as usize].to_vec()));
                cb(chunk);
            }
            continue;
        }
        if rc == 0 {
            saw_eof = true;
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            break;
        } else if err.kind() == io::ErrorKind::Interrupted {
            continue;
        } else if err.kind() == io::ErrorKind::ConnectionReset {
            saw_eof = true;
            break;
        }
        fatal!("error reading descriptor {}: {}", fd, err);
    }

    if saw_eof {
        debug!(fd, "descriptor reached EOF");
        {
            let mut guard = shared.lock().unwrap();
            guard.checked_out.remove(&fd);
            guard.doomed.remove(&fd);
            if let Some(late) = guard.sources.remove(&fd) {
                source.eof_cbs.extend(late.eof_cbs);
            }
            // Deregistration only; the descriptor's owner closes it.
            let _ = guard.registry.deregister(&mut SourceFd(&fd));
        }
        for cb in source.eof_cbs.drain(..) {
            cb();
        }
        return;
    }

    let mut guard = shared.lock().unwrap();
    guard.checked_out.remove(&fd);
    if guard.doomed.remove(&fd) {
        let _ = guard.registry.deregister(&mut SourceFd(&fd));
        return;
    }
    // Merge anything registered while the source was checked out.
    if let Some(late) = guard.sources.remove(&fd) {
        if source.data_cb.is_none() {
            source.data_cb = late.data_cb;
        }
        source.eof_cbs.extend(late.eof_cbs);
    }
    guard.sources.insert(fd, source);
}

/// Binds a non-blocking listener with `SO_REUSEADDR` and a backlog of 256.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    unsafe {
        let domain = if addr.is_ipv4() {
            libc::AF_INET
        } else {
            libc::AF_INET6
        };
        let fd = libc::socket(
            domain,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        );
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let guard = crate::fd::FdHandle::new(fd);

        let one: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const _,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        ) < 0
        {
            return Err(io::Error::last_os_error().into());
        }

        let (storage, len) = sockaddr_for(addr);
        if libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) < 0 {
            return Err(io::Error::last_os_error().into());
        }

        const BACKLOG: libc::c_int = 256;
        if libc::listen(fd, BACKLOG) < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(TcpListener::from_raw_fd(guard.release()))
    }
}

pub(crate) fn sockaddr_for(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &sin as *const _ as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    std::mem::size_of::<libc::sockaddr_in>(),
                );
            }
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &sin6 as *const _ as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    std::mem::size_of::<libc::sockaddr_in6>(),
                );
            }
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}
