// Per-player question ordering.
//
// Every player in a room answers the same question set, each in an
// independently shuffled order.

use rand::seq::SliceRandom;
use rand::Rng;

/// Return a shuffled copy of `items` (Fisher–Yates via `SliceRandom`).
pub fn shuffled<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(rng);
    out
}
