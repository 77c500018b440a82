use {
    super::{
        base::SentCallback,
        multi::{MultiNumberedCommandSender, SharedResults},
    },
    crate::{event_monitor::{EventCallback, EventMessageMonitor}, ready::ReadyMonitor},
    knotline::{Flow, Future, Knot, ProtocolExtension},
    std::sync::Arc,
};

/// The future a [`NumberedCommandSender`] send resolves.
pub type ResultsFuture = Future<SharedResults>;

/// The standard numbered command/numbered results protocol: one command,
/// one RESULTS block, delivered through a future.
///
/// A thin layer over [`MultiNumberedCommandSender`] that deregisters the
/// command and fires the future when its single RESULTS block arrives.
/// Register it as the extension for the `RESULTS` token.
pub struct NumberedCommandSender {
    inner: Arc<MultiNumberedCommandSender>,
}

impl NumberedCommandSender {
    pub fn new(
        ready_monitor: Arc<ReadyMonitor>,
        event_monitor: Option<Arc<EventMessageMonitor>>,
    ) -> Self {
        Self {
            inner: Arc::new(MultiNumberedCommandSender::new(
                ready_monitor,
                event_monitor,
            )),
        }
    }

    /// Schedules `data` as soon as the peer is ready; the returned future
    /// fires when the corresponding RESULTS block completes.
    pub fn send_command(&self, data: &Knot) -> ResultsFuture {
        self.send_command_full(data, None, None).0
    }

    /// As `send_command`, also exposing the assigned command id and the
    /// sent/event callbacks.
    pub fn send_command_full(
        &self,
        data: &Knot,
        sent_cb: Option<SentCallback>,
        event_cb: Option<EventCallback>,
    ) -> (ResultsFuture, u64) {
        let future: ResultsFuture = Future::new();
        let completion = future.clone();
        let inner = Arc::clone(&self.inner);
        let command_id = self.inner.send_command(
            data,
            Arc::new(move |results: SharedResults| {
                inner.remove_callback(results.command_id);
                completion.fire(results);
            }),
            sent_cb,
            event_cb,
        );
        (future, command_id)
    }
}

impl ProtocolExtension for NumberedCommandSender {
    fn on_start(&self, start_line: Knot) -> Flow {
        self.inner.on_start(start_line)
    }

    fn on_line(&self, line: Knot) -> Flow {
        self.inner.on_line(line)
    }

    fn on_raw(&self, data: Knot) -> Flow {
        self.inner.on_raw(data)
    }
}
