use bytes::Bytes;

/// One contiguous run of bytes inside a [`Knot`](super::Knot).
///
/// Strands share their backing storage: sub-strands and copies are O(1)
/// reference bumps, never byte copies. The character count of a strand is
/// fixed at construction.
#[derive(Clone)]
pub struct Strand {
    data: Bytes,
}

impl Strand {
    /// Takes ownership of the buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    /// Takes ownership of the string's bytes.
    pub fn from_string(data: String) -> Self {
        Self {
            data: data.into_bytes().into(),
        }
    }

    /// Wraps bytes the caller keeps alive for the whole program, most
    /// commonly literals in code. No copy is made.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            data: Bytes::from_static(data),
        }
    }

    pub fn from_bytes(data: Bytes) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_at(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Sub-strand of `len` bytes starting at `offset`, sharing storage.
    pub fn substrand(&self, offset: usize, len: usize) -> Strand {
        Self {
            data: self.data.slice(offset..offset + len),
        }
    }

    /// Offset of `to_find` at or after `start`, if present.
    pub fn find(&self, to_find: u8, start: usize) -> Option<usize> {
        memchr::memchr(to_find, &self.data[start..]).map(|pos| pos + start)
    }

    /// True if the `len` bytes at `offset` equal the first `len` bytes of
    /// `other`.
    pub fn equal_range(&self, other: &[u8], offset: usize, len: usize) -> bool {
        self.data[offset..offset + len] == other[..len]
    }
}

impl std::fmt::Debug for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Strand({:?})", String::from_utf8_lossy(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substrand_shares_window() {
        let s = Strand::from_static(b"hello world");
        let sub = s.substrand(6, 5);
        assert_eq!(sub.as_bytes(), b"world");
        assert_eq!(sub.len(), 5);
    }

    #[test]
    fn find_respects_start() {
        let s = Strand::from_static(b"a:b:c");
        assert_eq!(s.find(b':', 0), Some(1));
        assert_eq!(s.find(b':', 2), Some(3));
        assert_eq!(s.find(b':', 4), None);
    }

    #[test]
    fn equal_range_windows() {
        let s = Strand::from_static(b"COMMAND 17");
        assert!(s.equal_range(b"COMMAND", 0, 7));
        assert!(!s.equal_range(b"RESULTS", 0, 7));
        assert!(s.equal_range(b"17", 8, 2));
    }
}
