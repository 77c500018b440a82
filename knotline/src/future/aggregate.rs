use {
    super::Future,
    crate::knot::Knot,
    fnv::FnvHasher,
    std::hash::Hasher,
};

/// Folds a stream of partial results into a final value of a possibly
/// different type.
pub trait Aggregator: Send {
    type Output: Clone + Send + 'static;

    /// Folds one partial result into the accumulator. Not thread safe; the
    /// producer serializes its calls.
    fn add_partial(&mut self, partial: &Knot);

    /// Produces the final value once the stream is complete.
    fn finalize(&mut self) -> Self::Output;
}

/// The producer-facing face of an [`AggregatingFuture`].
///
/// Producers feed partials and signal completion through this trait, so
/// the same producing loop works no matter what the final aggregated type
/// is: a sum, a concatenation, a hash.
pub trait PartialAggregator: Send {
    fn add_partial(&mut self, partial: &Knot);

    /// Finalizes the accumulator and fires the consumer's future.
    fn done(&mut self);
}

/// Pairs an [`Aggregator`] with the [`Future`] that delivers its final
/// value. Hand the pair to the producer as a `Box<dyn PartialAggregator>`
/// and keep the future for the consumer.
pub struct AggregatingFuture<A>
where
    A: Aggregator,
{
    aggregator: A,
    future: Future<A::Output>,
}

impl<A> AggregatingFuture<A>
where
    A: Aggregator,
{
    pub fn new(aggregator: A) -> Self {
        Self {
            aggregator,
            future: Future::new(),
        }
    }

    /// The future that fires with the finalized value after the producer
    /// calls `done`.
    pub fn future(&self) -> Future<A::Output> {
        self.future.clone()
    }
}

impl<A> PartialAggregator for AggregatingFuture<A>
where
    A: Aggregator,
{
    fn add_partial(&mut self, partial: &Knot) {
        self.aggregator.add_partial(partial);
    }

    fn done(&mut self) {
        let value = self.aggregator.finalize();
        self.future.fire(value);
    }
}

/// Concatenates every partial into one knot.
#[derive(Default)]
pub struct ConcatAggregator {
    out: Knot,
}

impl ConcatAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for ConcatAggregator {
    type Output = Knot;

    fn add_partial(&mut self, partial: &Knot) {
        self.out.append_knot(partial);
    }

    fn finalize(&mut self) -> Knot {
        std::mem::take(&mut self.out)
    }
}

/// Counts the characters across all partials.
#[derive(Default)]
pub struct CharCountAggregator {
    count: usize,
}

impl CharCountAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for CharCountAggregator {
    type Output = usize;

    fn add_partial(&mut self, partial: &Knot) {
        self.count += partial.size();
    }

    fn finalize(&mut self) -> usize {
        self.count
    }
}

/// Hashes each partial independently and combines the digests with a
/// wrapping sum, so two result sets with the same rows in a different
/// order hash equal. Used to compare large query results without keeping
/// them in memory.
#[derive(Default)]
pub struct RowHashAggregator {
    combined: u64,
    rows: u64,
}

impl RowHashAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for RowHashAggregator {
    type Output = u64;

    fn add_partial(&mut self, partial: &Knot) {
        let mut hasher = FnvHasher::default();
        for byte in partial.iter() {
            hasher.write_u8(byte);
        }
        self.combined = self.combined.wrapping_add(hasher.finish());
        self.rows += 1;
    }

    fn finalize(&mut self) -> u64 {
        self.combined.wrapping_add(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(agg: &mut dyn PartialAggregator, parts: &[&'static str]) {
        for part in parts {
            agg.add_partial(&Knot::from(*part));
        }
        agg.done();
    }

    #[test]
    fn concat_preserves_order() {
        let mut agg = AggregatingFuture::new(ConcatAggregator::new());
        let future = agg.future();
        feed(&mut agg, &["So ", "ah"]);
        assert_eq!(future.value(), "So ah");
    }

    #[test]
    fn char_count_totals_partials() {
        let mut agg = AggregatingFuture::new(CharCountAggregator::new());
        let future = agg.future();
        feed(&mut agg, &["So ", "ah", "What's up doc", "That's all folks"]);
        assert_eq!(future.value(), 34);
    }

    #[test]
    fn row_hash_is_order_independent() {
        let mut forward = AggregatingFuture::new(RowHashAggregator::new());
        let forward_future = forward.future();
        feed(&mut forward, &["row one", "row two", "row three"]);

        let mut shuffled = AggregatingFuture::new(RowHashAggregator::new());
        let shuffled_future = shuffled.future();
        feed(&mut shuffled, &["row three", "row one", "row two"]);

        assert_eq!(forward_future.value(), shuffled_future.value());

        let mut different = AggregatingFuture::new(RowHashAggregator::new());
        let different_future = different.future();
        feed(&mut different, &["row one", "row two"]);
        assert_ne!(forward_future.value(), different_future.value());
    }

    #[test]
    fn future_fires_only_on_done() {
        let mut agg = AggregatingFuture::new(CharCountAggregator::new());
        let future = agg.future();
        agg.add_partial(&Knot::from("abc"));
        assert!(!future.has_fired());
        agg.done();
        assert!(future.has_fired());
        assert_eq!(future.value(), 3);
    }
}
