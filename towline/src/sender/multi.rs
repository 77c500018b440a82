use {
    super::{
        base::{parse_results_id, CommandWriter, SentCallback, RESULTS_END},
        eventmsg::EventMsgParser,
    },
    crate::{event_monitor::{EventCallback, EventMessageMonitor}, prelude::*, ready::ReadyMonitor},
    knotline::{fatal, Flow, Knot, LineRawData, ProtocolExtension},
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
};

/// Everything the peer sent back for one command.
pub struct NumberedCommandResult {
    pub command_id: u64,
    pub results_received: LineRawData,
}

pub type SharedResults = Arc<NumberedCommandResult>;

/// Persistent per-command callback; runs once per RESULTS block carrying
/// the command's id.
pub type ResultCallback = Arc<dyn Fn(SharedResults) + Send + Sync>;

struct MultiState {
    pending_callbacks: HashMap<u64, ResultCallback>,
    current: Option<NumberedCommandResult>,
    eventmsg: EventMsgParser,
}

/// Numbered-command sender that tolerates multiple RESULTS blocks per
/// command.
///
/// This is the network-peer variant: one harness asks another to run a
/// command and hears back several times (started, progress, finished).
/// The callback registered at send time stays installed until the caller
/// decides the command is over and calls `remove_callback`. For the
/// one-reply protocol a SUT speaks, see
/// [`NumberedCommandSender`](super::NumberedCommandSender).
///
/// Register it as the extension for the `RESULTS` token.
pub struct MultiNumberedCommandSender {
    writer: CommandWriter,
    state: Mutex<MultiState>,
}

impl MultiNumberedCommandSender {
    pub fn new(
        ready_monitor: Arc<ReadyMonitor>,
        event_monitor: Option<Arc<EventMessageMonitor>>,
    ) -> Self {
        Self {
            writer: CommandWriter::new(ready_monitor, event_monitor),
            state: Mutex::new(MultiState {
                pending_callbacks: HashMap::new(),
                current: None,
                eventmsg: EventMsgParser::default(),
            }),
        }
    }

    /// Schedules `data` as a numbered command and registers `cb` for its
    /// results. Returns the assigned command id.
    ///
    /// The state lock spans the send and the registration: were it not
    /// held, a fast peer could answer and drive the RESULTS protocol to
    /// completion before the callback exists.
    pub fn send_command(
        &self,
        data: &Knot,
        cb: ResultCallback,
        sent_cb: Option<SentCallback>,
        event_cb: Option<EventCallback>,
    ) -> u64 {
        let mut state = self.state.lock().unwrap();
        let command_id = self.writer.send(data, sent_cb, event_cb);
        state.pending_callbacks.insert(command_id, cb);
        command_id
    }

    /// Deregisters the command once the caller has seen its final
    /// results. Unknown ids are a programmer error.
    pub fn remove_callback(&self, command_id: u64) {
        let mut state = self.state.lock().unwrap();
        let removed = state.pending_callbacks.remove(&command_id);
        assert!(
            removed.is_some(),
            "no callback pending for command {}",
            command_id
        );
    }

    pub fn outstanding_commands(&self) -> usize {
        self.state.lock().unwrap().pending_callbacks.len()
    }

    fn results_done(&self) -> Flow {
        let (result, cb) = {
            let mut state = self.state.lock().unwrap();
            assert!(
                !state.eventmsg.mid_sequence(),
                "ENDRESULTS received before an event message completed"
            );
            let result = state.current.take().expect("ENDRESULTS outside RESULTS");
            let cb = match state.pending_callbacks.get(&result.command_id) {
                Some(cb) => Arc::clone(cb),
                None => fatal!(
                    "received an ENDRESULTS for unknown command {}",
                    result.command_id
                ),
            };
            (result, cb)
        };
        // Outside the lock: the callback may send follow-up commands or
        // remove itself.
        cb(Arc::new(result));
        Flow::Done
    }
}

impl ProtocolExtension for MultiNumberedCommandSender {
    fn on_start(&self, start_line: Knot) -> Flow {
        let command_id = parse_results_id(&start_line);
        let mut state = self.state.lock().unwrap();
        assert!(state.current.is_none());
        state.current = Some(NumberedCommandResult {
            command_id,
            results_received: LineRawData::new(),
        });
        Flow::Continue
    }

    fn on_line(&self, line: Knot) -> Flow {
        if line.eq_bytes(RESULTS_END) {
            return self.results_done();
        }
        let mut state = self.state.lock().unwrap();
        let monitor = self.writer.event_monitor().cloned();
        let state = &mut *state;
        if state.eventmsg.offer_line(&line, monitor.as_ref()) {
            return Flow::Continue;
        }
        state
            .current
            .as_mut()
            .expect("result line outside RESULTS")
            .results_received
            .add_line(line);
        Flow::Continue
    }

    fn on_raw(&self, data: Knot) -> Flow {
        let mut state = self.state.lock().unwrap();
        assert!(
            !state.eventmsg.mid_sequence(),
            "raw data before an event message completed"
        );
        state
            .current
            .as_mut()
            .expect("raw results outside RESULTS")
            .results_received
            .add_raw(data);
        Flow::Continue
    }
}

impl Drop for MultiNumberedCommandSender {
    fn drop(&mut self) {
        let state = self.state.lock().unwrap();
        if !state.pending_callbacks.is_empty() {
            warn!(
                outstanding = state.pending_callbacks.len(),
                "sender dropped with outstanding commands"
            );
        }
    }
}
