use {
    crate::event_monitor::EventMessageMonitor,
    knotline::{fatal, Knot},
    std::sync::Arc,
};

/// Recognizes the two-line `EVENTMSG` sub-protocol interleaved inside a
/// RESULTS block and routes each event by the id *it* names, which need
/// not be the id of the enclosing block.
#[derive(Default)]
pub(crate) struct EventMsgParser {
    awaiting_info: bool,
}

impl EventMsgParser {
    /// Offers a result line to the sub-parser. Returns true when the line
    /// belonged to an event message and must not reach the result
    /// collector.
    pub(crate) fn offer_line(
        &mut self,
        line: &Knot,
        monitor: Option<&Arc<EventMessageMonitor>>,
    ) -> bool {
        if self.awaiting_info {
            self.awaiting_info = false;
            match monitor {
                Some(monitor) => monitor.dispatch_info_line(line),
                None => unreachable!(),
            }
            return true;
        }
        if *line == "EVENTMSG" {
            if monitor.is_none() {
                fatal!("EVENTMSG received but no event monitor is attached");
            }
            self.awaiting_info = true;
            return true;
        }
        false
    }

    /// True while the id line after an `EVENTMSG` token is still owed.
    /// Raw data and block terminators must not arrive in that window.
    pub(crate) fn mid_sequence(&self) -> bool {
        self.awaiting_info
    }
}
