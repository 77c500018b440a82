use {
    crate::{
        event_loop::{DataCallback, EofCallback, EventLoop, WriteQueue},
        prelude::*,
    },
    std::{net::SocketAddr, os::unix::io::RawFd},
};

/// An established socket managed by an [`EventLoop`].
///
/// No data callback is registered up front; callers wire one in once their
/// protocol stack is built. The connection speaks the same framed
/// protocols as a pipe, so the full parser/dispatcher suite mounts on top
/// of it unchanged.
pub struct NetworkConnection {
    fd: RawFd,
    peer: Option<SocketAddr>,
    event_loop: EventLoop,
}

impl NetworkConnection {
    pub(crate) fn new(fd: RawFd, peer: Option<SocketAddr>, event_loop: EventLoop) -> Self {
        Self {
            fd,
            peer,
            event_loop,
        }
    }

    pub fn register_data_callback(&self, cb: DataCallback) {
        self.event_loop.register_data_callback(self.fd, cb);
    }

    pub fn register_eof_callback(&self, cb: EofCallback) {
        self.event_loop.register_eof_callback(self.fd, cb);
    }

    pub fn write_queue(&self) -> WriteQueue {
        self.event_loop.get_write_queue(self.fd)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Stops watching for EOF and half-closes the socket.
    pub fn shutdown(&self) {
        debug!(fd = self.fd, "shutting down connection");
        self.event_loop.remove_eof_callbacks(self.fd);
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_WR);
        }
    }
}

impl Drop for NetworkConnection {
    fn drop(&mut self) {
        self.event_loop.remove_data_callback(self.fd);
        unsafe {
            libc::close(self.fd);
        }
    }
}
