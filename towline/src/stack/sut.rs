use {
    crate::{error::Error, prelude::*, ready::ReadyMonitor},
    knotline::{
        fatal, EofCallback, EventLoop, ExtensionManager, FdHandle, LineRawParser,
        ProtocolExtension, WriteQueue,
    },
    std::{
        process::{Child, Command, Stdio},
        sync::{Arc, Mutex},
    },
};

/// The descriptors (and, for a real child, the process) a SUT stack
/// drives: the parent's write end of the SUT's stdin and read end of its
/// stdout.
pub struct SutIo {
    pub stdin: FdHandle,
    pub stdout: FdHandle,
    pub process: Option<Child>,
}

impl SutIo {
    /// A notional SUT backed by bare pipes; test fixtures hold the other
    /// ends and play the SUT's part.
    pub fn from_pipes(stdin: FdHandle, stdout: FdHandle) -> Self {
        Self {
            stdin,
            stdout,
            process: None,
        }
    }
}

/// Launches the SUT command line with piped stdio.
pub fn spawn_sut(command_line: &str) -> Result<SutIo> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next().ok_or(Error::EmptySutCommand)?;
    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    info!(pid = child.id(), command = command_line, "spawned SUT");

    let stdin = FdHandle::from_io(child.stdin.take().expect("piped stdin missing"));
    let stdout = FdHandle::from_io(child.stdout.take().expect("piped stdout missing"));
    Ok(SutIo {
        stdin,
        stdout,
        process: Some(child),
    })
}

/// The protocol stack a harness mounts over one SUT's pipes.
///
/// Building it wires the framing parser and extension dispatcher onto the
/// SUT's stdout and a READY monitor onto its stdin. Command senders are
/// added with `add_extension` before `activate`, which starts routing
/// data; after that the stack answers `wait_until_ready` and
/// `wait_until_sut_dies`.
pub struct SutProtocolStack {
    event_loop: EventLoop,
    ready_monitor: Arc<ReadyMonitor>,
    write_queue: WriteQueue,
    pending_extensions: Mutex<Option<ExtensionManager>>,
    handles: Mutex<SutHandles>,
}

struct SutHandles {
    stdin: Option<FdHandle>,
    stdout: Option<FdHandle>,
    process: Option<Child>,
}

impl SutProtocolStack {
    pub fn new(event_loop: &EventLoop, io: SutIo) -> Self {
        let write_queue = event_loop.get_write_queue(io.stdin.raw());
        let ready_monitor = Arc::new(ReadyMonitor::new(write_queue.clone()));
        let mut extensions = ExtensionManager::new();
        extensions.add_handler("READY", Arc::clone(&ready_monitor) as Arc<dyn ProtocolExtension>);
        Self {
            event_loop: event_loop.clone(),
            ready_monitor,
            write_queue,
            pending_extensions: Mutex::new(Some(extensions)),
            handles: Mutex::new(SutHandles {
                stdin: Some(io.stdin),
                stdout: Some(io.stdout),
                process: io.process,
            }),
        }
    }

    /// Registers a protocol extension (RESULTS sender, DONE sender, …).
    /// Only valid before `activate`.
    pub fn add_extension(&self, token: &str, extension: Arc<dyn ProtocolExtension>) {
        let mut pending = self.pending_extensions.lock().unwrap();
        match pending.as_mut() {
            Some(extensions) => extensions.add_handler(token, extension),
            None => fatal!("extension {:?} added after the stack was activated", token),
        }
    }

    /// Starts parsing the SUT's stdout. `sut_terminated_cb` fires when
    /// the SUT closes its end, which the callback must judge: expected
    /// after a SHUTDOWN, fatal otherwise.
    pub fn activate(&self, sut_terminated_cb: Option<EofCallback>) {
        let extensions = match self.pending_extensions.lock().unwrap().take() {
            Some(extensions) => extensions,
            None => fatal!("stack activated twice"),
        };
        let stdout_fd = {
            let handles = self.handles.lock().unwrap();
            handles
                .stdout
                .as_ref()
                .expect("stack has no stdout descriptor")
                .raw()
        };
        if let Some(cb) = sut_terminated_cb {
            self.event_loop.register_eof_callback(stdout_fd, cb);
        }
        let mut parser = LineRawParser::new(extensions);
        self.event_loop
            .register_data_callback(stdout_fd, Box::new(move |chunk| parser.feed(chunk)));
    }

    pub fn ready_monitor(&self) -> Arc<ReadyMonitor> {
        Arc::clone(&self.ready_monitor)
    }

    /// Descriptor of the pipe feeding the SUT's stdin.
    pub fn sut_stdin_fd(&self) -> std::os::unix::io::RawFd {
        self.handles
            .lock()
            .unwrap()
            .stdin
            .as_ref()
            .expect("stack has no stdin descriptor")
            .raw()
    }

    /// The queue feeding the SUT's stdin, for replies that bypass the
    /// ready gate (RESULTS, READY itself).
    pub fn write_queue(&self) -> WriteQueue {
        self.write_queue.clone()
    }

    /// Blocks until the SUT sends its first READY.
    pub fn wait_until_ready(&self) {
        self.ready_monitor.wait_until_ready();
    }

    /// Blocks until the SUT process exits. A non-zero status is logged at
    /// WARNING; the harness decides what to make of it.
    pub fn wait_until_sut_dies(&self) {
        let mut child = {
            let mut handles = self.handles.lock().unwrap();
            match handles.process.take() {
                Some(child) => child,
                None => fatal!("no SUT process attached to this stack"),
            }
        };
        match child.wait() {
            Ok(status) if status.success() => debug!("SUT exited cleanly"),
            Ok(status) => warn!(%status, "SUT terminated with non-zero status"),
            Err(err) => warn!("failed to reap the SUT: {}", err),
        }
        // The pipe descriptors stay owned by the stack; the read side's
        // EOF still has to reach the event loop.
    }
}
