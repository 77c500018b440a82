use super::strand::Strand;

/// A strand plus the number of characters in this node and every node to
/// its left. The inclusive suffix-sum lets `strand_with_char` binary search
/// in O(log m).
#[derive(Clone)]
pub(super) struct KnotNode {
    strand: Strand,
    cum_char_count: usize,
}

/// The node table behind a `Knot`. Shared between knots through an `Arc`;
/// mutation happens only after the owning knot has ensured it holds the
/// sole reference.
#[derive(Clone, Default)]
pub(super) struct NodeDeque {
    nodes: Vec<KnotNode>,
}

impl NodeDeque {
    pub(super) fn append(&mut self, strand: Strand) {
        let cum = self.char_count() + strand.len();
        self.nodes.push(KnotNode {
            strand,
            cum_char_count: cum,
        });
    }

    pub(super) fn strand(&self, idx: usize) -> &Strand {
        &self.nodes[idx].strand
    }

    pub(super) fn num_strands(&self) -> usize {
        self.nodes.len()
    }

    pub(super) fn char_count(&self) -> usize {
        self.nodes.last().map(|n| n.cum_char_count).unwrap_or(0)
    }

    /// Characters held by every strand left of `idx`.
    pub(super) fn left_count(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        node.cum_char_count - node.strand.len()
    }

    /// Resolves the 0-based character index to `(strand_index, offset)`.
    pub(super) fn strand_with_char(&self, char_idx: usize) -> (usize, usize) {
        debug_assert!(char_idx < self.char_count());
        let idx = self.nodes.partition_point(|n| n.cum_char_count <= char_idx);
        (idx, char_idx - self.left_count(idx))
    }
}
