use {
    crate::prelude::*,
    std::{
        io,
        os::unix::io::{IntoRawFd, RawFd},
    },
};

/// Owner of a raw descriptor that closes it on drop. The event loop hands
/// these around so pipes and sockets get exactly one close.
#[derive(Debug)]
pub struct FdHandle {
    fd: RawFd,
}

impl FdHandle {
    pub fn new(fd: RawFd) -> Self {
        debug_assert!(fd >= 0);
        Self { fd }
    }

    pub fn from_io<T>(io: T) -> Self
    where
        T: IntoRawFd,
    {
        Self::new(io.into_raw_fd())
    }

    pub fn raw(&self) -> RawFd {
        self.fd
    }

    /// Gives up ownership without closing.
    pub fn release(self) -> RawFd {
        let fd = self.fd;
        std::mem::forget(self);
        fd
    }
}

impl Drop for FdHandle {
    fn drop(&mut self) {
        // Best effort, a second close of a recycled fd is worse than a leak
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Puts the descriptor in non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub(crate) fn is_nonblocking(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFL) & libc::O_NONBLOCK != 0 }
}

/// Creates a `(read, write)` pipe pair. Test fixtures use these in place of
/// a live child process.
pub fn pipe() -> io::Result<(FdHandle, FdHandle)> {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        warn!("pipe(2) failed: {}", err);
        return Err(err);
    }
    Ok((FdHandle::new(fds[0]), FdHandle::new(fds[1])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_round_trip() {
        let (read, write) = pipe().unwrap();
        let payload = b"ping";
        let wrote =
            unsafe { libc::write(write.raw(), payload.as_ptr() as *const _, payload.len()) };
        assert_eq!(wrote, payload.len() as isize);

        let mut buf = [0u8; 8];
        let read_n = unsafe { libc::read(read.raw(), buf.as_mut_ptr() as *mut _, buf.len()) };
        assert_eq!(&buf[..read_n as usize], payload);
    }

    #[test]
    fn nonblocking_flag_sticks() {
        let (read, _write) = pipe().unwrap();
        assert!(!is_nonblocking(read.raw()));
        set_nonblocking(read.raw()).unwrap();
        assert!(is_nonblocking(read.raw()));
    }
}
