use {
    crate::{event_monitor::parse_id, prelude::*},
    knotline::{fatal, Cursor, Flow, Knot, LineRawData, ProtocolExtension, WriteQueue},
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
};

const COMMAND_HEADER: &[u8] = b"COMMAND ";
const COMMAND_END: &[u8] = b"ENDCOMMAND";

/// Executes one received numbered command.
///
/// `data` is the command body with the COMMAND/ENDCOMMAND wrapper already
/// stripped; `results` writes RESULTS blocks back under the command's id.
/// A handler may reply more than once (progress then completion) and may
/// finish on another thread; it owns the decision of when to offer the
/// peer another slot via [`ResultsWriter::send_ready`].
pub trait CommandHandler: Send {
    fn execute(&mut self, data: LineRawData, results: ResultsWriter);
}

pub type HandlerFactory = Box<dyn Fn() -> Box<dyn CommandHandler> + Send + Sync>;

/// Writes `RESULTS <id> … ENDRESULTS` blocks for one command. Cheap to
/// clone into whatever thread finishes the work.
#[derive(Clone)]
pub struct ResultsWriter {
    command_id: u64,
    write_queue: WriteQueue,
}

impl ResultsWriter {
    pub fn command_id(&self) -> u64 {
        self.command_id
    }

    /// Sends one RESULTS block containing `data`.
    pub fn write_results(&self, data: &LineRawData) {
        let mut output = Knot::new();
        output.append_string(format!("RESULTS {}\n", self.command_id));
        data.append_encoded(&mut output);
        output.append_static(b"ENDRESULTS\n");
        if let Err(err) = self.write_queue.write(output) {
            warn!(command_id = self.command_id, "results refused: {}", err);
        }
    }

    /// Sends one RESULTS block containing a single line.
    pub fn write_line(&self, line: &str) {
        self.write_results(&LineRawData::from_single(
            Knot::from_string(line.to_string()),
            false,
        ));
    }

    /// Tells the peer it may issue another command.
    pub fn send_ready(&self) {
        send_ready(&self.write_queue);
    }
}

struct ReceiverState {
    current_id: Option<u64>,
    body: LineRawData,
}

/// The receiving side of the numbered-command protocol.
///
/// Parses `COMMAND <id> … ENDCOMMAND`, then dispatches the buffered body
/// on its first whitespace-delimited token to a registered handler
/// factory. Register it as the extension for the `COMMAND` token and call
/// `send_ready` once the component can accept its first command.
pub struct NumberedCommandReceiver {
    write_queue: WriteQueue,
    handlers: Mutex<HashMap<String, HandlerFactory>>,
    state: Mutex<ReceiverState>,
}

impl NumberedCommandReceiver {
    pub fn new(write_queue: WriteQueue) -> Self {
        Self {
            write_queue,
            handlers: Mutex::new(HashMap::new()),
            state: Mutex::new(ReceiverState {
                current_id: None,
                body: LineRawData::new(),
            }),
        }
    }

    /// Registers the handler factory for command bodies whose first token
    /// is `name`. A fresh handler is built per command.
    pub fn add_handler(&self, name: &str, factory: HandlerFactory) {
        let previous = self.handlers.lock().unwrap().insert(name.to_string(), factory);
        assert!(previous.is_none(), "handler already registered for {:?}", name);
    }

    /// Writes `READY`, inviting the peer to send one more command.
    pub fn send_ready(&self) {
        send_ready(&self.write_queue);
    }

    fn dispatch(&self, command_id: u64, body: LineRawData) {
        if body.is_empty() {
            fatal!("command {} arrived with an empty body", command_id);
        }
        let first_line = body.get(0);
        let space = first_line.find(b' ', first_line.begin());
        let token = match space {
            Cursor::End => first_line.to_string(),
            at => first_line.sub_knot(first_line.begin(), at).to_string(),
        };
        let mut handler = {
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(&token) {
                Some(factory) => factory(),
                None => fatal!("no handler registered for command token {:?}", token),
            }
        };
        debug!(command_id, token = %token, "dispatching command");
        handler.execute(
            body,
            ResultsWriter {
                command_id,
                write_queue: self.write_queue.clone(),
            },
        );
    }
}

fn send_ready(queue: &WriteQueue) {
    if let Err(err) = queue.write(Knot::from_static(b"READY\n")) {
        warn!("READY refused: {}", err);
    }
}

impl ProtocolExtension for NumberedCommandReceiver {
    fn on_start(&self, start_line: Knot) -> Flow {
        debug_assert!(start_line.starts_with(COMMAND_HEADER));
        let id_knot = start_line.sub_knot(
            start_line.cursor_for_char(COMMAND_HEADER.len()),
            Cursor::End,
        );
        let command_id = parse_id(&id_knot);
        let mut state = self.state.lock().unwrap();
        assert!(state.current_id.is_none());
        state.current_id = Some(command_id);
        state.body = LineRawData::new();
        Flow::Continue
    }

    fn on_line(&self, line: Knot) -> Flow {
        let (command_id, body) = {
            let mut state = self.state.lock().unwrap();
            if !line.eq_bytes(COMMAND_END) {
                state.body.add_line(line);
                return Flow::Continue;
            }
            let command_id = state.current_id.take().expect("ENDCOMMAND outside COMMAND");
            (command_id, std::mem::take(&mut state.body))
        };
        self.dispatch(command_id, body);
        Flow::Done
    }

    fn on_raw(&self, data: Knot) -> Flow {
        let mut state = self.state.lock().unwrap();
        assert!(state.current_id.is_some());
        state.body.add_raw(data);
        Flow::Continue
    }
}
