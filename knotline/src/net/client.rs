use {
    super::connection::NetworkConnection,
    crate::{event_loop::EventLoop, fatal, future::Future, prelude::*},
    std::{
        io, mem,
        net::SocketAddr,
        os::unix::io::RawFd,
        sync::{Arc, Mutex},
    },
};

/// Outcome of a connection attempt.
#[derive(Clone)]
pub struct ConnectionStatus {
    /// Did the connect complete?
    pub success: bool,
    /// The live connection when `success` is true.
    pub connection: Option<Arc<NetworkConnection>>,
}

/// Makes outbound TCP connections through an [`EventLoop`].
///
/// The connect is non-blocking: `initiate_server_connection` starts it and
/// `wait_for_connection` blocks on the completion future. Re-initiating
/// before the previous attempt resolves is an error.
pub struct NetworkClient {
    event_loop: EventLoop,
    pending: Mutex<Option<Future<ConnectionStatus>>>,
}

impl NetworkClient {
    pub fn new(event_loop: &EventLoop) -> Self {
        Self {
            event_loop: event_loop.clone(),
            pending: Mutex::new(None),
        }
    }

    /// Starts a non-blocking connect to `addr`. Completion (either way)
    /// is reported through the future `wait_for_connection` consumes.
    pub fn initiate_server_connection(&self, addr: SocketAddr) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.as_ref() {
            assert!(
                previous.has_fired(),
                "connection re-initiated before the current attempt completed"
            );
        }

        let fd = match start_connect(addr) {
            Ok(fd) => fd,
            Err(err) => fatal!("connect to {} could not start: {}", addr, err),
        };

        let future: Future<ConnectionStatus> = Future::new();
        let completion = future.clone();
        let event_loop = self.event_loop.clone();
        // Registered only after the future is stashed, lest the socket
        // become writable before anyone is listening for the result.
        *pending = Some(future);
        self.event_loop.register_writable_once(
            fd,
            Box::new(move || {
                let status = connect_outcome(fd, addr, &event_loop);
                completion.fire(status);
            }),
        );
    }

    /// Blocks until the attempt started by `initiate_server_connection`
    /// resolves. May be called repeatedly for the same attempt.
    pub fn wait_for_connection(&self) -> ConnectionStatus {
        let future = {
            let pending = self.pending.lock().unwrap();
            pending
                .as_ref()
                .expect("no connection attempt in progress")
                .clone()
        };
        future.value()
    }

    /// Convenience: initiate and wait.
    pub fn connect_to_server(&self, addr: SocketAddr) -> ConnectionStatus {
        self.initiate_server_connection(addr);
        self.wait_for_connection()
    }
}

/// Issues the non-blocking connect syscall, returning the socket.
fn start_connect(addr: SocketAddr) -> io::Result<RawFd> {
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
            return Err(io::Error::last_os_error());
        }
        let (storage, len) = crate::event_loop::sockaddr_for(addr);
        let rc = libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len);
        if rc == 0 {
            // Connected immediately (loopback does this). The writable
            // event still arrives and resolves the future.
            return Ok(fd);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINPROGRESS) {
            Ok(fd)
        } else {
            libc::close(fd);
            Err(err)
        }
    }
}

/// The socket went writable: ask the kernel how the connect ended.
fn connect_outcome(fd: RawFd, addr: SocketAddr, event_loop: &EventLoop) -> ConnectionStatus {
    let mut so_error: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut so_error as *mut _ as *mut _,
            &mut len,
        )
    };
    if rc < 0 || so_error != 0 {
        warn!(%addr, so_error, "connection failed");
        unsafe {
            libc::close(fd);
        }
        return ConnectionStatus {
            success: false,
            connection: None,
        };
    }
    info!(%addr, "connection established");
    ConnectionStatus {
        success: true,
        connection: Some(Arc::new(NetworkConnection::new(
            fd,
            Some(addr),
            event_loop.clone(),
        ))),
    }
}
