mod cursor;
mod deque;
mod strand;

pub use self::{
    cursor::{Cursor, Iter as KnotIter},
    strand::Strand,
};

use {
    self::deque::NodeDeque,
    crate::{fatal, prelude::*},
    std::{fmt, io, os::unix::io::RawFd, sync::Arc},
};

/// A string-like structure that is much faster than a flat buffer at the
/// operations the harness leans on: append, sub-range, and front erase.
///
/// A knot is an ordered sequence of [`Strand`]s behind a shared node table.
/// Copying a knot is O(1); the next mutation of either copy replaces the
/// node table (never the strand bytes) before writing, so copies observe
/// the bytes present when they were taken.
///
/// Run times below assume n characters in m strands.
#[derive(Clone, Default)]
pub struct Knot {
    deque: Arc<NodeDeque>,
}

impl Knot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let mut knot = Self::new();
        knot.append_strand(Strand::from_vec(data));
        knot
    }

    pub fn from_string(data: String) -> Self {
        let mut knot = Self::new();
        knot.append_strand(Strand::from_string(data));
        knot
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        let mut knot = Self::new();
        knot.append_strand(Strand::from_static(data));
        knot
    }

    /// Number of characters. O(1), reads the last node's cumulative count.
    pub fn size(&self) -> usize {
        self.deque.char_count()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Appends the strand. O(1) amortized; O(m) when the node table is
    /// shared and has to be replaced first.
    pub fn append_strand(&mut self, strand: Strand) {
        if strand.is_empty() {
            return;
        }
        if Arc::strong_count(&self.deque) > 1 {
            // Advisory check only. A benign race may cost an extra copy,
            // which is cheaper than taking a lock here.
            debug!("knot append triggered a copy-on-write of the node table");
        }
        Arc::make_mut(&mut self.deque).append(strand);
    }

    /// Appends every strand of `other`. O(k) where k = other's strands.
    pub fn append_knot(&mut self, other: &Knot) {
        for idx in 0..other.deque.num_strands() {
            self.append_strand(other.deque.strand(idx).clone());
        }
    }

    pub fn append_static(&mut self, data: &'static [u8]) {
        self.append_strand(Strand::from_static(data));
    }

    pub fn append_string(&mut self, data: String) {
        self.append_strand(Strand::from_string(data));
    }

    pub fn clear(&mut self) {
        self.deque = Arc::new(NodeDeque::default());
    }

    /// Cursor at the first character, or `End` for an empty knot.
    pub fn begin(&self) -> Cursor {
        if self.is_empty() {
            Cursor::End
        } else {
            Cursor::At {
                strand: 0,
                offset: 0,
            }
        }
    }

    /// Cursor at the last character. The knot must not be empty.
    pub fn last_char_cursor(&self) -> Cursor {
        assert!(!self.is_empty());
        let strand = self.deque.num_strands() - 1;
        Cursor::At {
            strand,
            offset: self.deque.strand(strand).len() - 1,
        }
    }

    /// Cursor at the `char_idx`^th character (0-indexed). O(log m).
    pub fn cursor_for_char(&self, char_idx: usize) -> Cursor {
        if char_idx == self.size() {
            return Cursor::End;
        }
        assert!(char_idx < self.size());
        let (strand, offset) = self.deque.strand_with_char(char_idx);
        Cursor::At { strand, offset }
    }

    /// Flat character index for a cursor. O(1).
    pub fn char_index(&self, cursor: Cursor) -> usize {
        match cursor {
            Cursor::End => self.size(),
            Cursor::At { strand, offset } => self.deque.left_count(strand) + offset,
        }
    }

    /// Character distance between two cursors, `from <= to`. O(1).
    pub fn distance(&self, from: Cursor, to: Cursor) -> usize {
        self.char_index(to) - self.char_index(from)
    }

    /// Cursor one character past `cursor`.
    pub fn next_cursor(&self, cursor: Cursor) -> Cursor {
        let (strand, offset) = cursor.expect_at();
        if offset + 1 < self.deque.strand(strand).len() {
            Cursor::At {
                strand,
                offset: offset + 1,
            }
        } else if strand + 1 < self.deque.num_strands() {
            Cursor::At {
                strand: strand + 1,
                offset: 0,
            }
        } else {
            Cursor::End
        }
    }

    pub fn char_at(&self, char_idx: usize) -> u8 {
        let (strand, offset) = self.deque.strand_with_char(char_idx);
        self.deque.strand(strand).byte_at(offset)
    }

    pub fn byte_at(&self, cursor: Cursor) -> u8 {
        let (strand, offset) = cursor.expect_at();
        self.deque.strand(strand).byte_at(offset)
    }

    /// First occurrence of `to_find` at or after `from`, or `End`. Scans
    /// strand by strand.
    pub fn find(&self, to_find: u8, from: Cursor) -> Cursor {
        let (mut strand_idx, mut start) = match from {
            Cursor::End => return Cursor::End,
            Cursor::At { strand, offset } => (strand, offset),
        };
        while strand_idx < self.deque.num_strands() {
            if let Some(offset) = self.deque.strand(strand_idx).find(to_find, start) {
                return Cursor::At {
                    strand: strand_idx,
                    offset,
                };
            }
            strand_idx += 1;
            start = 0;
        }
        Cursor::End
    }

    /// True if the knot starts with `other`. O(other.len()).
    pub fn starts_with(&self, other: &[u8]) -> bool {
        if other.len() > self.size() {
            return false;
        }
        let mut checked = 0;
        let mut strand_idx = 0;
        while checked < other.len() {
            let strand = self.deque.strand(strand_idx);
            let to_check = strand.len().min(other.len() - checked);
            if !strand.equal_range(&other[checked..], 0, to_check) {
                return false;
            }
            checked += to_check;
            strand_idx += 1;
        }
        true
    }

    /// Character-by-character equality against a byte slice.
    pub fn eq_bytes(&self, other: &[u8]) -> bool {
        self.size() == other.len() && self.starts_with(other)
    }

    /// The characters in `[start, end)` as a new knot sharing this knot's
    /// strands. O(strands spanned).
    pub fn sub_knot(&self, start: Cursor, end: Cursor) -> Knot {
        if start == end {
            // 0-length sub-knot. Strange, but OK.
            return Knot::new();
        }
        let (start_idx, start_off) = start.expect_at();
        let (end_idx, end_off) = match end {
            Cursor::End => {
                let last = self.deque.num_strands() - 1;
                (last, self.deque.strand(last).len())
            }
            Cursor::At { strand, offset } => {
                if offset == 0 {
                    // Exclusive end at a strand boundary: the inclusive end
                    // is the whole previous strand.
                    (strand - 1, self.deque.strand(strand - 1).len())
                } else {
                    (strand, offset)
                }
            }
        };
        assert!(start_idx <= end_idx);

        let mut deque = NodeDeque::default();
        for idx in start_idx..=end_idx {
            let strand = self.deque.strand(idx);
            let lo = if idx == start_idx { start_off } else { 0 };
            let hi = if idx == end_idx { end_off } else { strand.len() };
            deque.append(strand.substrand(lo, hi - lo));
        }
        Knot {
            deque: Arc::new(deque),
        }
    }

    /// Removes every character in front of `up_to`, which must not be
    /// `End`. O(strands removed).
    pub fn left_erase(&mut self, up_to: Cursor) {
        let (strand_idx, offset) = up_to.expect_at();
        let mut deque = NodeDeque::default();
        let first = self.deque.strand(strand_idx);
        if offset != 0 {
            deque.append(first.substrand(offset, first.len() - offset));
        } else {
            deque.append(first.clone());
        }
        for idx in strand_idx + 1..self.deque.num_strands() {
            deque.append(self.deque.strand(idx).clone());
        }
        self.deque = Arc::new(deque);
    }

    /// Splits the knot at `at`: returns `[begin, at)` and keeps
    /// `[at, end)` in `self`.
    pub fn split(&mut self, at: Cursor) -> Knot {
        let prefix = self.sub_knot(self.begin(), at);
        if at.is_end() {
            self.clear();
        } else {
            self.left_erase(at);
        }
        prefix
    }

    pub fn iter(&self) -> KnotIter<'_> {
        KnotIter::new(self)
    }

    /// Copies the whole knot into a flat buffer. O(n).
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        for idx in 0..self.deque.num_strands() {
            out.extend_from_slice(self.deque.strand(idx).as_bytes());
        }
        out
    }

    /// Writes as much as possible to the descriptor without blocking.
    /// Returns the cursor of the first unwritten character, or `End` once
    /// everything went out. The caller guarantees `O_NONBLOCK` is set.
    pub fn write_nonblocking(&self, fd: RawFd, from: Cursor) -> Cursor {
        debug_assert!(crate::fd::is_nonblocking(fd));
        let (mut strand_idx, mut offset) = match from {
            Cursor::End => return Cursor::End,
            Cursor::At { strand, offset } => (strand, offset),
        };
        while strand_idx < self.deque.num_strands() {
            let strand = self.deque.strand(strand_idx);
            let want = strand.len() - offset;
            let rc = unsafe {
                libc::write(fd, strand.as_bytes()[offset..].as_ptr() as *const _, want)
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Cursor::At {
                        strand: strand_idx,
                        offset,
                    };
                } else if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                fatal!("error writing knot to descriptor {}: {}", fd, err);
            }
            let wrote = rc as usize;
            if wrote < want {
                return Cursor::At {
                    strand: strand_idx,
                    offset: offset + wrote,
                };
            }
            strand_idx += 1;
            offset = 0;
        }
        Cursor::End
    }

    /// Writes the whole knot, blocking as necessary. The descriptor must
    /// *not* have `O_NONBLOCK` set.
    pub fn blocking_write(&self, fd: RawFd) {
        debug_assert!(!crate::fd::is_nonblocking(fd));
        for idx in 0..self.deque.num_strands() {
            let strand = self.deque.strand(idx);
            let mut offset = 0;
            while offset < strand.len() {
                let rc = unsafe {
                    libc::write(
                        fd,
                        strand.as_bytes()[offset..].as_ptr() as *const _,
                        strand.len() - offset,
                    )
                };
                if rc < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    fatal!("error writing knot to descriptor {}: {}", fd, err);
                }
                offset += rc as usize;
            }
        }
    }
}

impl fmt::Display for Knot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for idx in 0..self.deque.num_strands() {
            write!(
                f,
                "{}",
                String::from_utf8_lossy(self.deque.strand(idx).as_bytes())
            )?;
        }
        Ok(())
    }
}

impl fmt::Debug for Knot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Knot({:?})", self.to_string())
    }
}

impl PartialEq<[u8]> for Knot {
    fn eq(&self, other: &[u8]) -> bool {
        self.eq_bytes(other)
    }
}

impl PartialEq<&str> for Knot {
    fn eq(&self, other: &&str) -> bool {
        self.eq_bytes(other.as_bytes())
    }
}

impl From<&'static str> for Knot {
    fn from(data: &'static str) -> Self {
        Knot::from_static(data.as_bytes())
    }
}

impl From<String> for Knot {
    fn from(data: String) -> Self {
        Knot::from_string(data)
    }
}
