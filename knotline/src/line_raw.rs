use {
    crate::{
        fatal,
        knot::{Knot, Strand},
        prelude::*,
    },
    std::io::BufRead,
};

/// One framed unit: a line (without its terminating newline) or a raw
/// blob whose length came from the count header.
#[derive(Debug, Clone)]
pub enum FramedItem {
    Line(Knot),
    Raw(Knot),
}

impl FramedItem {
    pub fn knot(&self) -> &Knot {
        match self {
            FramedItem::Line(knot) | FramedItem::Raw(knot) => knot,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, FramedItem::Raw(_))
    }
}

/// A buffered mixture of line and raw items.
///
/// Protocol extensions typically collect everything they receive into one
/// of these and process it once the terminator arrives. Handlers that strip
/// an outer wrapper (COMMAND/ENDCOMMAND and the like) call
/// `set_start_offset`/`set_end_offset` so the inner handler sees only the
/// body, without any copying. Once an offset is set the data is immutable.
#[derive(Debug, Clone, Default)]
pub struct LineRawData {
    items: Vec<FramedItem>,
    start_offset: usize,
    end_offset: usize,
}

impl LineRawData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_single(data: Knot, is_raw: bool) -> Self {
        let mut out = Self::new();
        if is_raw {
            out.add_raw(data);
        } else {
            out.add_line(data);
        }
        out
    }

    /// Adds a line, which must not contain the terminating newline.
    pub fn add_line(&mut self, line: Knot) {
        debug_assert!(self.start_offset == 0 && self.end_offset == 0);
        self.items.push(FramedItem::Line(line));
    }

    pub fn add_raw(&mut self, data: Knot) {
        debug_assert!(self.start_offset == 0 && self.end_offset == 0);
        self.items.push(FramedItem::Raw(data));
    }

    pub fn size(&self) -> usize {
        self.items.len() - self.start_offset - self.end_offset
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn get(&self, idx: usize) -> &Knot {
        assert!(idx < self.size());
        self.items[idx + self.start_offset].knot()
    }

    pub fn is_raw(&self, idx: usize) -> bool {
        assert!(idx < self.size());
        self.items[idx + self.start_offset].is_raw()
    }

    pub fn items(&self) -> impl Iterator<Item = &FramedItem> {
        self.items[self.start_offset..self.items.len() - self.end_offset].iter()
    }

    /// Hides `offset` leading items from all further accessors. Relative to
    /// any offset already set.
    pub fn set_start_offset(&mut self, offset: usize) {
        assert!(offset <= self.size());
        self.start_offset += offset;
    }

    pub fn set_end_offset(&mut self, offset: usize) {
        assert!(offset <= self.size());
        self.end_offset += offset;
    }

    /// Appends the wire encoding of the visible items: lines get their
    /// newline back, raw blobs are bracketed as
    /// `RAW\n<len>\n<bytes>ENDRAW\n`.
    pub fn append_encoded(&self, output: &mut Knot) {
        for item in self.items() {
            match item {
                FramedItem::Line(line) => {
                    output.append_knot(line);
                    output.append_static(b"\n");
                }
                FramedItem::Raw(data) => {
                    output.append_string(format!("RAW\n{}\n", data.size()));
                    output.append_knot(data);
                    output.append_static(b"ENDRAW\n");
                }
            }
        }
    }

    pub fn encoded(&self) -> Knot {
        let mut output = Knot::new();
        self.append_encoded(&mut output);
        output
    }
}

/// Reads a wire-encoded line/raw stream to EOF, e.g. script arguments
/// stored in a file. Malformed raw headers are fatal, matching the stream
/// parser.
pub fn read_line_raw<R>(mut input: R) -> Result<LineRawData>
where
    R: BufRead,
{
    let mut out = LineRawData::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(out);
        }
        let trimmed = line.trim_end_matches('\n');
        if trimmed == "RAW" {
            out.add_raw(read_raw_block(&mut input)?);
        } else {
            out.add_line(Knot::from_string(trimmed.to_string()));
        }
    }
}

fn read_raw_block<R>(input: &mut R) -> Result<Knot>
where
    R: BufRead,
{
    let mut blob = Knot::new();
    let mut header = String::new();
    loop {
        header.clear();
        if input.read_line(&mut header)? == 0 {
            fatal!("input ended inside a RAW block");
        }
        let trimmed = header.trim_end_matches('\n');
        if trimmed == "ENDRAW" {
            return Ok(blob);
        }
        let count: usize = match trimmed.parse() {
            Ok(count) => count,
            Err(_) => fatal!("malformed raw byte count: {:?}", trimmed),
        };
        let mut bytes = vec![0u8; count];
        input.read_exact(&mut bytes)?;
        blob.append_strand(Strand::from_vec(bytes));
    }
}
