use {
    crate::{logger::GeneralLogger, prelude::*, ready::ReadyMonitor},
    knotline::{fatal, Flow, Future, Knot, LineRawData, ProtocolExtension, WriteQueue},
    std::sync::{Arc, Mutex},
};

const DONE_TOKEN: &[u8] = b"DONE";

pub type SharedRootResults = Arc<LineRawData>;
pub type RootResultsFuture = Future<SharedRootResults>;

/// Sends root-mode commands: bare single-line tokens issued *outside* any
/// COMMAND frame, answered by a single `DONE` line.
///
/// One command may be in flight at a time; that is inherent to the
/// protocol, since the reply carries no id to correlate by. Register this
/// as the extension for the `DONE` token.
pub struct RootModeCommandSender {
    ready_monitor: Arc<ReadyMonitor>,
    /// The future for the in-flight command. The lock closes the race
    /// between scheduling a command and the peer acknowledging it before
    /// the future is stored.
    pending: Mutex<Option<RootResultsFuture>>,
}

impl RootModeCommandSender {
    pub fn new(ready_monitor: Arc<ReadyMonitor>) -> Self {
        Self {
            ready_monitor,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `command_name` (READY-gated like everything else) and
    /// returns the future its DONE acknowledgment fires.
    pub fn send_command(&self, command_name: &str) -> RootResultsFuture {
        let mut pending = self.pending.lock().unwrap();
        self.ready_monitor
            .schedule_send(Knot::from_string(format!("{}\n", command_name)));
        let future: RootResultsFuture = Future::new();
        *pending = Some(future.clone());
        future
    }
}

impl ProtocolExtension for RootModeCommandSender {
    fn on_start(&self, start_line: Knot) -> Flow {
        let mut pending = self.pending.lock().unwrap();
        if !start_line.eq_bytes(DONE_TOKEN) {
            fatal!(
                "expected a DONE token as a root-mode result, received {:?}",
                start_line.to_string()
            );
        }
        let future = match pending.take() {
            Some(future) => future,
            None => fatal!("DONE received with no root-mode command outstanding"),
        };
        future.fire(Arc::new(LineRawData::from_single(start_line, false)));
        Flow::Done
    }

    fn on_line(&self, line: Knot) -> Flow {
        fatal!(
            "root-mode commands return a single line; received {:?}",
            line.to_string()
        );
    }

    fn on_raw(&self, _data: Knot) -> Flow {
        fatal!("root-mode commands return a single line; received raw data");
    }
}

/// A named root-mode command bound to its sender.
pub struct RootModeCommand {
    sender: Arc<RootModeCommandSender>,
    name: String,
}

impl RootModeCommand {
    pub fn new(sender: Arc<RootModeCommandSender>, name: &str) -> Self {
        Self {
            sender,
            name: name.to_string(),
        }
    }

    /// `SHUTDOWN`: ask the SUT to exit cleanly.
    pub fn shutdown(sender: Arc<RootModeCommandSender>) -> Self {
        Self::new(sender, "SHUTDOWN")
    }

    /// `CLEARCACHE`: ask the SUT to drop whatever it caches between runs.
    pub fn clearcache(sender: Arc<RootModeCommandSender>) -> Self {
        Self::new(sender, "CLEARCACHE")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> RootResultsFuture {
        self.sender.send_command(&self.name)
    }

    /// As `schedule`, logging the send and the completion to `logger`.
    pub fn schedule_logged(&self, logger: &Arc<GeneralLogger>) -> RootResultsFuture {
        let future = self.schedule();
        logger.log(&format!("root command {} sent", self.name));
        let logger = Arc::clone(logger);
        let name = self.name.clone();
        future.add_callback(move |_results| {
            logger.log(&format!("root command {} complete", name));
        });
        future
    }
}

/// Receiver-side counterpart: answers one root-mode token with `DONE`
/// after running `action`. Register one per supported token.
pub struct RootModeHandler {
    write_queue: WriteQueue,
    action: Box<dyn Fn() + Send + Sync>,
}

impl RootModeHandler {
    pub fn new<F>(write_queue: WriteQueue, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            write_queue,
            action: Box::new(action),
        }
    }
}

impl ProtocolExtension for RootModeHandler {
    fn on_start(&self, start_line: Knot) -> Flow {
        debug!(command = %start_line, "root-mode command received");
        (self.action)();
        if let Err(err) = self.write_queue.write(Knot::from_static(b"DONE\n")) {
            warn!("DONE refused: {}", err);
        }
        Flow::Done
    }
}
