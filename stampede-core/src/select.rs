use rand::Rng;

use crate::error::{Error, Result};

/// Pick one item with probability proportional to its weight.
///
/// The caller supplies the random source so tests can inject deterministic
/// sequences. Callers must pre-filter zero-weight items; a candidate set whose
/// weights sum to zero degenerates to picking the first item.
pub fn pick_weighted<'a, T, R, W>(items: &'a [T], weight_of: W, rng: &mut R) -> Result<&'a T>
where
    R: Rng + ?Sized,
    W: Fn(&T) -> f64,
{
    match items {
        [] => Err(Error::EmptyCandidates),
        // One candidate: always select it, bypassing randomness.
        [only] => Ok(only),
        _ => {
            let total: f64 = items.iter().map(&weight_of).sum();
            if total <= 0.0 {
                return Ok(&items[0]);
            }
            let draw = rng.gen_range(0.0..total);
            Ok(pick_at(items, weight_of, draw))
        }
    }
}

/// Walk items in order, subtracting weights from the draw; the first item at
/// which the remainder reaches zero or below wins. A remainder of exactly zero
/// selects the current item.
fn pick_at<T, W>(items: &[T], weight_of: W, draw: f64) -> &T
where
    W: Fn(&T) -> f64,
{
    let mut remaining = draw;
    for item in items {
        remaining -= weight_of(item);
        if remaining <= 0.0 {
            return item;
        }
    }
    // Unreachable for draw < total; guard against float accumulation drift.
    &items[items.len() - 1]
}
