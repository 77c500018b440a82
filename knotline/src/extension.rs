use {
    crate::{
        fatal,
        framing::ParseHandler,
        knot::{Cursor, Knot},
        prelude::*,
    },
    std::{collections::HashMap, sync::Arc},
};

/// Whether an extension keeps control of the stream after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep routing framed events to this extension.
    Continue,
    /// Hand control back to the manager; the next line picks a handler.
    Done,
}

/// A sub-protocol handler. The manager triggers an extension when a line's
/// first whitespace-delimited token matches its registration, then routes
/// every framed event to it until one of its methods returns
/// [`Flow::Done`]. Extensions are shared across threads and guard their own
/// state.
pub trait ProtocolExtension: Send + Sync {
    /// Called with the full line that triggered the extension.
    fn on_start(&self, start_line: Knot) -> Flow;

    /// Called for each subsequent line while the extension holds control.
    fn on_line(&self, _line: Knot) -> Flow {
        Flow::Continue
    }

    /// Called for each raw blob while the extension holds control.
    fn on_raw(&self, _data: Knot) -> Flow {
        Flow::Continue
    }
}

/// Routes framed input to registered [`ProtocolExtension`]s.
///
/// Outside any extension the next event must be a line whose leading token
/// matches a registration; anything else is a protocol violation and
/// fatal. Connect the manager to a `LineRawParser` to start receiving
/// data.
#[derive(Default)]
pub struct ExtensionManager {
    handler_map: HashMap<String, Arc<dyn ProtocolExtension>>,
    current: Option<Arc<dyn ProtocolExtension>>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `extension` for lines starting with `trigger_token`.
    /// Registering a token twice is a programmer error.
    pub fn add_handler(&mut self, trigger_token: &str, extension: Arc<dyn ProtocolExtension>) {
        let previous = self
            .handler_map
            .insert(trigger_token.to_string(), extension);
        assert!(
            previous.is_none(),
            "handler already registered for token {:?}",
            trigger_token
        );
    }

    fn dispatch_start(&mut self, line: Knot) {
        let token_end = line.find(b' ', line.begin());
        let token = match token_end {
            Cursor::End => line.to_string(),
            at => line.sub_knot(line.begin(), at).to_string(),
        };
        let handler = match self.handler_map.get(&token) {
            Some(handler) => Arc::clone(handler),
            None => fatal!(
                "unexpected line {:?}: not part of any protocol and does not begin one",
                line.to_string()
            ),
        };
        trace!(token = %token, "extension triggered");
        if handler.on_start(line) == Flow::Continue {
            self.current = Some(handler);
        }
    }
}

impl ParseHandler for ExtensionManager {
    fn line_received(&mut self, line: Knot) {
        match self.current.clone() {
            Some(handler) => {
                if handler.on_line(line) == Flow::Done {
                    self.current = None;
                }
            }
            None => self.dispatch_start(line),
        }
    }

    fn raw_received(&mut self, data: Knot) {
        // Raw data outside an extension has no possible recipient.
        match self.current.clone() {
            Some(handler) => {
                if handler.on_raw(data) == Flow::Done {
                    self.current = None;
                }
            }
            None => fatal!("raw data received with no protocol extension active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::Mutex,
    };

    #[derive(Default)]
    struct EchoExtension {
        seen: Mutex<Vec<String>>,
    }

    impl ProtocolExtension for EchoExtension {
        fn on_start(&self, start_line: Knot) -> Flow {
            self.seen.lock().unwrap().push(format!("start {}", start_line));
            Flow::Continue
        }

        fn on_line(&self, line: Knot) -> Flow {
            let mut seen = self.seen.lock().unwrap();
            if line == "END" {
                seen.push("done".to_string());
                Flow::Done
            } else {
                seen.push(format!("line {}", line));
                Flow::Continue
            }
        }

        fn on_raw(&self, data: Knot) -> Flow {
            self.seen.lock().unwrap().push(format!("raw {}", data));
            Flow::Continue
        }
    }

    #[test]
    fn routes_by_leading_token_until_done() {
        let first = Arc::new(EchoExtension::default());
        let second = Arc::new(EchoExtension::default());
        let mut manager = ExtensionManager::new();
        manager.add_handler("ALPHA", first.clone());
        manager.add_handler("BETA", second.clone());

        manager.line_received(Knot::from("ALPHA with args"));
        manager.line_received(Knot::from("BETA not a trigger here"));
        manager.raw_received(Knot::from("blob"));
        manager.line_received(Knot::from("END"));
        manager.line_received(Knot::from("BETA"));
        manager.line_received(Knot::from("END"));

        assert_eq!(
            *first.seen.lock().unwrap(),
            vec![
                "start ALPHA with args",
                "line BETA not a trigger here",
                "raw blob",
                "done"
            ]
        );
        assert_eq!(*second.seen.lock().unwrap(), vec!["start BETA", "done"]);
    }

    struct OneShot;

    impl ProtocolExtension for OneShot {
        fn on_start(&self, _line: Knot) -> Flow {
            Flow::Done
        }
    }

    #[test]
    fn done_from_on_start_releases_control() {
        let mut manager = ExtensionManager::new();
        manager.add_handler("READY", Arc::new(OneShot));
        manager.line_received(Knot::from("READY"));
        manager.line_received(Knot::from("READY"));
        // A third trigger still resolves, proving no handler is stuck.
        manager.line_received(Knot::from("READY"));
    }

    #[test]
    #[should_panic(expected = "unexpected line")]
    fn unknown_token_is_fatal() {
        let mut manager = ExtensionManager::new();
        manager.add_handler("READY", Arc::new(OneShot));
        manager.line_received(Knot::from("NONSENSE"));
    }

    #[test]
    #[should_panic(expected = "no protocol extension active")]
    fn raw_without_handler_is_fatal() {
        let mut manager = ExtensionManager::new();
        manager.raw_received(Knot::from("blob"));
    }
}
