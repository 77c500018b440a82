use {
    super::{
        base::{parse_results_id, CommandWriter, SentCallback, RESULTS_END},
        eventmsg::EventMsgParser,
    },
    crate::{event_monitor::{EventCallback, EventMessageMonitor}, ready::ReadyMonitor},
    knotline::{fatal, Flow, Knot, PartialAggregator, ProtocolExtension},
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
};

struct AggState {
    aggregators: HashMap<u64, Box<dyn PartialAggregator>>,
    current_id: Option<u64>,
    eventmsg: EventMsgParser,
}

/// Numbered-command sender that folds results as they stream in.
///
/// Instead of returning a future over the collected results, each send
/// takes a [`PartialAggregator`]: every result line and raw blob becomes
/// an `add_partial` call, and ENDRESULTS triggers `done`, firing whatever
/// future the aggregator carries. Keeps large result sets out of memory.
/// Register it as the extension for the `RESULTS` token.
pub struct AggNumberedCommandSender {
    writer: CommandWriter,
    state: Mutex<AggState>,
}

impl AggNumberedCommandSender {
    pub fn new(
        ready_monitor: Arc<ReadyMonitor>,
        event_monitor: Option<Arc<EventMessageMonitor>>,
    ) -> Self {
        Self {
            writer: CommandWriter::new(ready_monitor, event_monitor),
            state: Mutex::new(AggState {
                aggregators: HashMap::new(),
                current_id: None,
                eventmsg: EventMsgParser::default(),
            }),
        }
    }

    /// Schedules `data` and registers `aggregator` to receive the
    /// streamed results for the assigned id, which is returned.
    pub fn send_command(
        &self,
        data: &Knot,
        aggregator: Box<dyn PartialAggregator>,
        sent_cb: Option<SentCallback>,
        event_cb: Option<EventCallback>,
    ) -> u64 {
        let mut state = self.state.lock().unwrap();
        let command_id = self.writer.send(data, sent_cb, event_cb);
        debug_assert!(!state.aggregators.contains_key(&command_id));
        state.aggregators.insert(command_id, aggregator);
        command_id
    }

    pub fn outstanding_commands(&self) -> usize {
        self.state.lock().unwrap().aggregators.len()
    }
}

impl ProtocolExtension for AggNumberedCommandSender {
    fn on_start(&self, start_line: Knot) -> Flow {
        let command_id = parse_results_id(&start_line);
        let mut state = self.state.lock().unwrap();
        assert!(state.current_id.is_none());
        if !state.aggregators.contains_key(&command_id) {
            fatal!("no aggregator registered for command {}", command_id);
        }
        state.current_id = Some(command_id);
        Flow::Continue
    }

    fn on_line(&self, line: Knot) -> Flow {
        let mut guard = self.state.lock().unwrap();
        let monitor = self.writer.event_monitor().cloned();
        if line.eq_bytes(RESULTS_END) {
            assert!(
                !guard.eventmsg.mid_sequence(),
                "ENDRESULTS received before an event message completed"
            );
            let command_id = guard.current_id.take().expect("ENDRESULTS outside RESULTS");
            let mut aggregator = guard
                .aggregators
                .remove(&command_id)
                .expect("aggregator vanished mid-command");
            // Finalizing fires the aggregator's future; user callbacks do
            // not run under this sender's lock.
            drop(guard);
            aggregator.done();
            return Flow::Done;
        }
        if guard.eventmsg.offer_line(&line, monitor.as_ref()) {
            return Flow::Continue;
        }
        let command_id = guard.current_id.expect("result line outside RESULTS");
        guard
            .aggregators
            .get_mut(&command_id)
            .expect("aggregator vanished mid-command")
            .add_partial(&line);
        Flow::Continue
    }

    fn on_raw(&self, data: Knot) -> Flow {
        let mut state = self.state.lock().unwrap();
        assert!(
            !state.eventmsg.mid_sequence(),
            "raw data before an event message completed"
        );
        let command_id = state.current_id.expect("raw results outside RESULTS");
        state
            .aggregators
            .get_mut(&command_id)
            .expect("aggregator vanished mid-command")
            .add_partial(&data);
        Flow::Continue
    }
}
