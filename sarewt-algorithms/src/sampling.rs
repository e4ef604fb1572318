//! Random event subsampling.

use rand::seq::SliceRandom;
use rand::Rng;
use sarewt_core::EventBatch;

/// Reduce `batch` to at most `n` events.
///
/// When the batch is larger than `n`, the events are put through a single
/// uniform random permutation and the first `n` are kept. Constituents,
/// features and truth labels are permuted together, so every kept row
/// still describes the same event. Smaller batches are returned untouched.
pub fn subsample<R>(batch: EventBatch, n: usize, rng: &mut R) -> EventBatch
where
    R: Rng + ?Sized,
{
    if batch.len() <= n {
        return batch;
    }
    let mut order: Vec<usize> = (0..batch.len()).collect();
    order.shuffle(rng);
    order.truncate(n);
    batch.take(&order)
}
