use {
    crate::{
        counter::next_command_id,
        event_monitor::{parse_id, EventCallback, EventMessageMonitor},
        prelude::*,
        ready::ReadyMonitor,
    },
    knotline::{Cursor, Knot},
    std::sync::Arc,
};

pub(crate) const RESULTS_HEADER: &[u8] = b"RESULTS ";
pub(crate) const RESULTS_END: &[u8] = b"ENDRESULTS";

/// Called with the command id once the READY arrives and the command is
/// actually released, as opposed to merely queued.
pub type SentCallback = Box<dyn FnOnce(u64) + Send>;

/// The send half every numbered-command sender shares: id assignment,
/// COMMAND/ENDCOMMAND wrapping, event-callback registration, and the
/// hand-off to the ready monitor.
pub(crate) struct CommandWriter {
    ready_monitor: Arc<ReadyMonitor>,
    event_monitor: Option<Arc<EventMessageMonitor>>,
}

impl CommandWriter {
    pub(crate) fn new(
        ready_monitor: Arc<ReadyMonitor>,
        event_monitor: Option<Arc<EventMessageMonitor>>,
    ) -> Self {
        Self {
            ready_monitor,
            event_monitor,
        }
    }

    pub(crate) fn event_monitor(&self) -> Option<&Arc<EventMessageMonitor>> {
        self.event_monitor.as_ref()
    }

    /// Wraps `data` (which must end in a newline) as a numbered command,
    /// schedules it, and returns the assigned id.
    pub(crate) fn send(
        &self,
        data: &Knot,
        sent_cb: Option<SentCallback>,
        event_cb: Option<EventCallback>,
    ) -> u64 {
        debug_assert!(!data.is_empty() && data.byte_at(data.last_char_cursor()) == b'\n');
        let command_id = next_command_id();
        if let (Some(monitor), Some(event_cb)) = (&self.event_monitor, event_cb) {
            monitor.register_callback(command_id, event_cb);
            debug!(command_id, "registered event callback");
        }

        let mut full_command = Knot::new();
        full_command.append_string(format!("COMMAND {}\n", command_id));
        full_command.append_knot(data);
        full_command.append_static(b"ENDCOMMAND\n");

        match sent_cb {
            Some(cb) => self
                .ready_monitor
                .schedule_send_with_callback(full_command, move || cb(command_id)),
            None => self.ready_monitor.schedule_send(full_command),
        }
        command_id
    }
}

/// Pulls the command id out of a `RESULTS <id>` start line.
pub(crate) fn parse_results_id(start_line: &Knot) -> u64 {
    debug_assert!(start_line.starts_with(RESULTS_HEADER));
    let id_knot = start_line.sub_knot(
        start_line.cursor_for_char(RESULTS_HEADER.len()),
        Cursor::End,
    );
    parse_id(&id_knot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_id_parses_to_the_end_of_line() {
        assert_eq!(parse_results_id(&Knot::from("RESULTS 0")), 0);
        assert_eq!(parse_results_id(&Knot::from("RESULTS 4185")), 4185);
    }
}
