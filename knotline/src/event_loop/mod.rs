mod read;
mod write;

pub use self::write::{WriteQueue, MAX_PENDING_BYTES};

pub(crate) use self::read::sockaddr_for;

use {
    self::{read::ReadLoop, write::WriteLoop},
    crate::{knot::Knot, net::NetworkConnection, prelude::*},
    std::{
        net::SocketAddr,
        os::unix::io::RawFd,
        sync::{Arc, Weak},
    },
};

pub type DataCallback = Box<dyn FnMut(Knot) + Send>;
pub type EofCallback = Box<dyn FnOnce() + Send>;
pub type ConnectionCallback = Box<dyn FnMut(NetworkConnection) + Send>;
pub(crate) type WritableCallback = Box<dyn FnOnce() + Send>;

/// A two-thread descriptor multiplexer.
///
/// One worker owns all reads, the other all writes, so a read callback
/// that wants to reply can never deadlock against the writer. Register a
/// data callback per descriptor to receive its bytes as single-strand
/// knots on the read thread; fetch a [`WriteQueue`] to send. The loop also
/// accepts TCP connections on behalf of [`NetworkServer`] and hands them
/// to a callback on the read thread.
///
/// [`NetworkServer`]: crate::net::NetworkServer
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<LoopInner>,
}

pub(crate) struct LoopInner {
    pub(crate) read: ReadLoop,
    pub(crate) write: WriteLoop,
}

impl EventLoop {
    pub fn new() -> Result<Self> {
        let inner = Arc::new(LoopInner {
            read: ReadLoop::new()?,
            write: WriteLoop::new()?,
        });
        inner.read.set_loop_handle(Arc::downgrade(&inner));
        Ok(Self { inner })
    }

    pub(crate) fn from_weak(weak: &Weak<LoopInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Starts both worker threads and returns immediately.
    pub fn start(&self) {
        self.inner.read.start();
        self.inner.write.start();
    }

    /// Routes new data on `file_descriptor` to `cb` on the read thread.
    /// The descriptor is placed in non-blocking mode.
    pub fn register_data_callback(&self, file_descriptor: RawFd, cb: DataCallback) {
        self.inner.read.register_data_callback(file_descriptor, cb);
    }

    /// Runs `cb` once the descriptor reaches EOF: process exit for a pipe,
    /// disconnect for a socket.
    pub fn register_eof_callback(&self, file_descriptor: RawFd, cb: EofCallback) {
        self.inner.read.register_eof_callback(file_descriptor, cb);
    }

    pub fn remove_data_callback(&self, file_descriptor: RawFd) {
        self.inner.read.remove_data_callback(file_descriptor);
    }

    pub fn remove_eof_callbacks(&self, file_descriptor: RawFd) {
        self.inner.read.remove_eof_callbacks(file_descriptor);
    }

    /// Returns the write queue for the descriptor. Every call for the same
    /// descriptor returns the same queue, which is what keeps writes from
    /// different threads ordered.
    pub fn get_write_queue(&self, file_descriptor: RawFd) -> WriteQueue {
        self.inner.write.get_write_queue(file_descriptor)
    }

    /// Binds `addr` and hands every accepted connection to `cb` on the
    /// read thread. Accepted sockets are non-blocking and owned by the
    /// connection handle. Returns the bound address.
    pub fn listen(&self, addr: SocketAddr, cb: ConnectionCallback) -> Result<SocketAddr> {
        self.inner.read.listen(addr, cb)
    }

    pub fn stop_listening(&self, addr: SocketAddr) {
        self.inner.read.stop_listening(addr);
    }

    pub(crate) fn register_writable_once(&self, file_descriptor: RawFd, cb: WritableCallback) {
        self.inner.write.register_writable_once(file_descriptor, cb);
    }

    /// Asks both workers to return once the callbacks now runnable have
    /// drained. Safe to call more than once.
    pub fn exit_loop(&self) {
        self.inner.read.exit_loop();
        self.inner.write.exit_loop();
    }

    /// Blocks until both workers are done. Call `exit_loop` first.
    pub fn wait_for_exit(&self) {
        self.inner.read.wait_for_exit();
        self.inner.write.wait_for_exit();
    }

    pub fn exit_loop_and_wait(&self) {
        self.exit_loop();
        self.wait_for_exit();
    }
}

impl Drop for LoopInner {
    fn drop(&mut self) {
        self.read.exit_loop();
        self.write.exit_loop();
        self.read.wait_for_exit();
        self.write.wait_for_exit();
        debug!("event loop shut down");
    }
}
