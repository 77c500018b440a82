use crate::{
    fatal,
    knot::{Cursor, Knot, Strand},
};

/// Receives the framed events a [`LineRawParser`] produces.
pub trait ParseHandler: Send {
    /// Called with each parsed line, newline excluded.
    fn line_received(&mut self, line: Knot);
    /// Called with each raw blob. The blob is the concatenation of every
    /// `<count>\n<bytes>` pair of one RAW block.
    fn raw_received(&mut self, data: Knot);
}

enum Mode {
    Line,
    Raw(RawState),
}

/// What the buffer has to yield next, lifted out of `Mode` so the parse
/// loop can mutate the parser while acting on it.
#[derive(Clone, Copy)]
enum Step {
    LineMode,
    RawHeader,
    RawBytes(usize),
}

/// Raw mode keeps the count of the pair currently in flight plus every
/// payload byte seen since the opening `RAW` line.
struct RawState {
    byte_count: Option<usize>,
    data: Knot,
}

/// Decodes a byte stream into line and raw events.
///
/// Feed arbitrary chunks through `data_received`; events come out in exact
/// byte order, and an incomplete trailing line or raw payload stays
/// buffered for the next chunk. The parser never looks past the bytes
/// needed to decide the next boundary.
pub struct LineRawParser<H> {
    handler: H,
    buf: Knot,
    /// Characters of `buf` already scanned for a newline, so repeated
    /// appends never re-scan.
    scanned: usize,
    mode: Mode,
}

impl<H> LineRawParser<H>
where
    H: ParseHandler,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            buf: Knot::new(),
            scanned: 0,
            mode: Mode::Line,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Buffers the chunk and parses everything now decidable.
    pub fn data_received(&mut self, data: Strand) {
        self.buf.append_strand(data);
        self.parse();
    }

    /// Same as `data_received` for data already wrapped in a knot, e.g.
    /// the chunks an event loop data callback delivers.
    pub fn feed(&mut self, data: Knot) {
        self.buf.append_knot(&data);
        self.parse();
    }

    fn parse(&mut self) {
        loop {
            let step = match &self.mode {
                Mode::Line => Step::LineMode,
                Mode::Raw(state) => match state.byte_count {
                    Some(count) => Step::RawBytes(count),
                    None => Step::RawHeader,
                },
            };
            match step {
                Step::LineMode => {
                    let line = match self.take_line() {
                        Some(line) => line,
                        None => return,
                    };
                    if line == "RAW" {
                        self.mode = Mode::Raw(RawState {
                            byte_count: None,
                            data: Knot::new(),
                        });
                    } else {
                        self.handler.line_received(line);
                    }
                }
                Step::RawBytes(count) => {
                    if self.buf.size() < count {
                        return;
                    }
                    let end = self.buf.cursor_for_char(count);
                    let bytes = self.buf.split(end);
                    self.scanned = 0;
                    if let Mode::Raw(state) = &mut self.mode {
                        state.data.append_knot(&bytes);
                        state.byte_count = None;
                    }
                }
                Step::RawHeader => {
                    let line = match self.take_line() {
                        Some(line) => line,
                        None => return,
                    };
                    if line == "ENDRAW" {
                        let state = match std::mem::replace(&mut self.mode, Mode::Line) {
                            Mode::Raw(state) => state,
                            Mode::Line => unreachable!(),
                        };
                        self.handler.raw_received(state.data);
                    } else if let Mode::Raw(state) = &mut self.mode {
                        state.byte_count = Some(parse_byte_count(&line));
                    }
                }
            }
        }
    }

    /// Fatal if the stream ends mid-frame. EOF callbacks that consider the
    /// close orderly should call this first.
    pub fn input_closed(&self) {
        if let Mode::Raw(_) = self.mode {
            fatal!("input closed inside a RAW block");
        }
        if !self.buf.is_empty() {
            fatal!(
                "input closed with an unterminated line buffered: {:?}",
                self.buf
            );
        }
    }

    /// Detaches one complete line from the front of the buffer, leaving
    /// partial input in place.
    fn take_line(&mut self) -> Option<Knot> {
        let from = self.buf.cursor_for_char(self.scanned);
        let newline = self.buf.find(b'\n', from);
        match newline {
            Cursor::End => {
                self.scanned = self.buf.size();
                None
            }
            at => {
                let line = self.buf.sub_knot(self.buf.begin(), at);
                let after = self.buf.next_cursor(at);
                if after.is_end() {
                    self.buf.clear();
                } else {
                    self.buf.left_erase(after);
                }
                self.scanned = 0;
                Some(line)
            }
        }
    }
}

fn parse_byte_count(line: &Knot) -> usize {
    let text = line.to_string();
    match text.parse::<usize>() {
        Ok(count) => count,
        Err(_) => fatal!("malformed raw byte count: {:?}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(bool, Vec<u8>)>,
    }

    impl ParseHandler for Recorder {
        fn line_received(&mut self, line: Knot) {
            self.events.push((false, line.to_vec()));
        }

        fn raw_received(&mut self, data: Knot) {
            self.events.push((true, data.to_vec()));
        }
    }

    fn feed_whole(input: &'static [u8]) -> Vec<(bool, Vec<u8>)> {
        let mut parser = LineRawParser::new(Recorder::default());
        parser.data_received(Strand::from_static(input));
        let events = parser.handler.events.clone();
        parser.input_closed();
        events
    }

    #[test]
    fn lines_come_out_without_newlines() {
        let events = feed_whole(b"Line 1\nLine 2\n");
        assert_eq!(
            events,
            vec![(false, b"Line 1".to_vec()), (false, b"Line 2".to_vec())]
        );
    }

    #[test]
    fn empty_lines_are_events_too() {
        let events = feed_whole(b"a\n\nb\n");
        assert_eq!(
            events,
            vec![
                (false, b"a".to_vec()),
                (false, b"".to_vec()),
                (false, b"b".to_vec())
            ]
        );
    }

    #[test]
    fn raw_block_is_one_event() {
        let events = feed_whole(b"RAW\n10\naaaaaaaaaaENDRAW\nLine 3\n");
        assert_eq!(
            events,
            vec![(true, b"aaaaaaaaaa".to_vec()), (false, b"Line 3".to_vec())]
        );
    }

    #[test]
    fn raw_pairs_concatenate_into_one_blob() {
        let events = feed_whole(b"RAW\n3\nabc4\ndefgENDRAW\n");
        assert_eq!(events, vec![(true, b"abcdefg".to_vec())]);
    }

    #[test]
    fn raw_payload_may_contain_newlines() {
        let events = feed_whole(b"RAW\n4\na\nb\nENDRAW\n");
        assert_eq!(events, vec![(true, b"a\nb\n".to_vec())]);
    }

    #[test]
    fn byte_at_a_time_matches_whole_buffer() {
        let input: &'static [u8] = b"Line 1\nLine 2\nRAW\n10\naaaaaaaaaaENDRAW\nLine 3\n";
        let whole = feed_whole(input);

        let mut parser = LineRawParser::new(Recorder::default());
        for idx in 0..input.len() {
            parser.data_received(Strand::from_static(&input[idx..idx + 1]));
        }
        assert_eq!(parser.handler.events, whole);
        parser.input_closed();
    }

    #[test]
    fn partial_input_stays_buffered() {
        let mut parser = LineRawParser::new(Recorder::default());
        parser.data_received(Strand::from_static(b"half a li"));
        assert!(parser.handler.events.is_empty());
        parser.data_received(Strand::from_static(b"ne\n"));
        assert_eq!(parser.handler.events, vec![(false, b"half a line".to_vec())]);
    }

    #[test]
    #[should_panic(expected = "malformed raw byte count")]
    fn non_numeric_count_is_fatal() {
        let mut parser = LineRawParser::new(Recorder::default());
        parser.data_received(Strand::from_static(b"RAW\nnot-a-number\n"));
    }

    #[test]
    #[should_panic(expected = "inside a RAW block")]
    fn eof_inside_raw_is_fatal() {
        let mut parser = LineRawParser::new(Recorder::default());
        parser.data_received(Strand::from_static(b"RAW\n5\nab"));
        parser.input_closed();
    }
}
