//! Shared fixture: a protocol stack over bare pipes, with the test
//! playing the SUT's part on the far ends.
#![allow(dead_code)]

use {
    knotline::{pipe, EventLoop, FdHandle},
    std::{
        io,
        time::{Duration, Instant},
    },
    towline::{SutIo, SutProtocolStack},
};

pub struct SutFixture {
    pub event_loop: EventLoop,
    pub stack: SutProtocolStack,
    /// Test writes here to speak as the SUT's stdout.
    pub sut_stdout_write: FdHandle,
    /// Test reads here to observe what the harness sent to the SUT.
    pub sut_stdin_read: FdHandle,
}

impl SutFixture {
    /// Builds the stack but leaves activation to the caller so command
    /// senders can be registered first.
    pub fn new() -> Self {
        let event_loop = EventLoop::new().unwrap();
        let (stdin_read, stdin_write) = pipe().unwrap();
        let (stdout_read, stdout_write) = pipe().unwrap();

        // Observed end stays readable after the harness makes its side
        // non-blocking.
        knotline::set_nonblocking(stdin_read.raw()).unwrap();

        let stack = SutProtocolStack::new(&event_loop, SutIo::from_pipes(stdin_write, stdout_read));
        Self {
            event_loop,
            stack,
            sut_stdout_write: stdout_write,
            sut_stdin_read: stdin_read,
        }
    }

    pub fn activate_and_start(&self) {
        self.stack.activate(None);
        self.event_loop.start();
    }

    /// Speaks as the SUT: writes one line to its stdout.
    pub fn sut_says(&self, line: &str) {
        write_all(self.sut_stdout_write.raw(), format!("{}\n", line).as_bytes());
    }

    pub fn sut_says_raw(&self, bytes: &[u8]) {
        write_all(self.sut_stdout_write.raw(), bytes);
    }

    /// Reads one newline-terminated line the harness sent to the SUT.
    pub fn harness_sent_line(&self) -> String {
        read_line(self.sut_stdin_read.raw())
    }

    /// True if the harness has written nothing the SUT has not read.
    pub fn harness_is_silent(&self) -> bool {
        std::thread::sleep(Duration::from_millis(50));
        let mut byte = [0u8; 1];
        let rc = unsafe { libc::read(self.sut_stdin_read.raw(), byte.as_mut_ptr() as *mut _, 1) };
        if rc < 0 {
            return io::Error::last_os_error().kind() == io::ErrorKind::WouldBlock;
        }
        panic!("harness sent unexpected byte {:?}", byte[0] as char);
    }

    pub fn shutdown(self) {
        self.event_loop.exit_loop_and_wait();
    }
}

pub fn write_all(fd: i32, bytes: &[u8]) {
    let mut offset = 0;
    while offset < bytes.len() {
        let rc = unsafe {
            libc::write(
                fd,
                bytes[offset..].as_ptr() as *const _,
                bytes.len() - offset,
            )
        };
        assert!(rc > 0, "fixture write failed");
        offset += rc as usize;
    }
}

/// Reads one line from a non-blocking descriptor, polling up to a
/// deadline so tests fail loudly instead of hanging.
pub fn read_line(fd: i32) -> String {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let rc = unsafe { libc::read(fd, byte.as_mut_ptr() as *mut _, 1) };
        if rc == 1 {
            if byte[0] == b'\n' {
                return String::from_utf8(line).unwrap();
            }
            line.push(byte[0]);
            continue;
        }
        if rc < 0 && io::Error::last_os_error().kind() != io::ErrorKind::WouldBlock {
            panic!("fixture read failed: {}", io::Error::last_os_error());
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for a line; got {:?} so far",
            String::from_utf8_lossy(&line)
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
