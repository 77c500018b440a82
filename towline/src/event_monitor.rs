use {
    crate::prelude::*,
    knotline::{fatal, Flow, Knot, ProtocolExtension},
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
};

/// Callback for one event message: `(command_id, event_id, info)`.
pub type EventCallback = Arc<dyn Fn(u64, u64, Knot) + Send + Sync>;

/// Registry of event callbacks keyed by command id.
///
/// Event messages may arrive interleaved inside a RESULTS block (the
/// numbered senders feed those here) or on their own between frames, for
/// which this type doubles as the extension for the standalone `EVENTMSG`
/// token. Callbacks stay registered until removed, since events may still
/// be reported for a command whose results already returned.
#[derive(Default)]
pub struct EventMessageMonitor {
    callbacks: Mutex<HashMap<u64, EventCallback>>,
    /// Set while the standalone extension waits for the id line that
    /// follows an `EVENTMSG` token.
    awaiting_info: Mutex<bool>,
}

impl EventMessageMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callback(&self, command_id: u64, cb: EventCallback) {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.insert(command_id, cb);
    }

    pub fn get_callback(&self, command_id: u64) -> Option<EventCallback> {
        self.callbacks.lock().unwrap().get(&command_id).cloned()
    }

    pub fn remove_callback(&self, command_id: u64) {
        self.callbacks.lock().unwrap().remove(&command_id);
    }

    /// Parses `<cmd_id> <event_id>[ <info>]` and dispatches to the
    /// callback registered for `cmd_id`, if any.
    pub fn dispatch_info_line(&self, line: &Knot) {
        let (command_id, event_id, info) = parse_event_info(line);
        debug!(command_id, event_id, "event message received");
        if let Some(cb) = self.get_callback(command_id) {
            cb(command_id, event_id, info);
        }
    }
}

/// Splits an event info line into its command id, event id, and optional
/// trailing info bytes.
pub(crate) fn parse_event_info(line: &Knot) -> (u64, u64, Knot) {
    let first_space = line.find(b' ', line.begin());
    if first_space.is_end() {
        fatal!("malformed event message line: {:?}", line.to_string());
    }
    let command_id = parse_id(&line.sub_knot(line.begin(), first_space));

    let rest = line.sub_knot(line.next_cursor(first_space), knotline::Cursor::End);
    let second_space = rest.find(b' ', rest.begin());
    if second_space.is_end() {
        (command_id, parse_id(&rest), Knot::new())
    } else {
        let event_id = parse_id(&rest.sub_knot(rest.begin(), second_space));
        let info = rest.sub_knot(rest.next_cursor(second_space), knotline::Cursor::End);
        (command_id, event_id, info)
    }
}

pub(crate) fn parse_id(knot: &Knot) -> u64 {
    let text = knot.to_string();
    match text.parse() {
        Ok(id) => id,
        Err(_) => fatal!("expected a decimal id, received {:?}", text),
    }
}

impl ProtocolExtension for EventMessageMonitor {
    fn on_start(&self, _start_line: Knot) -> Flow {
        *self.awaiting_info.lock().unwrap() = true;
        Flow::Continue
    }

    fn on_line(&self, line: Knot) -> Flow {
        let mut awaiting = self.awaiting_info.lock().unwrap();
        if !*awaiting {
            fatal!("event monitor received a line it was not expecting");
        }
        *awaiting = false;
        drop(awaiting);
        self.dispatch_info_line(&line);
        Flow::Done
    }

    fn on_raw(&self, _data: Knot) -> Flow {
        fatal!("raw data inside an event message");
    }
}
