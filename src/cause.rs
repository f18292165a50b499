//! A depth-bounded walk over an error's transitive causes.
//!
//! Used by the retry engine's classifier and by `exists` to find an
//! `unresolved address` style cause buried under a connection-refused
//! error. Bounded rather than cycle-detected: `std::error::Error::source`
//! forms a singly linked chain, so a depth cap is sufficient and avoids
//! the bookkeeping a visited-set would need for `&dyn Error`.

use std::error::Error as StdError;

/// Self-referential cause chains (a bug in some custom error type, not
/// something this crate can construct) must still terminate.
const MAX_DEPTH: usize = 20;

/// Iterates over `err` and each of its causes, depth-bounded at 20.
///
/// The first item yielded is `err` itself; subsequent items are
/// `err.source()`, `err.source().source()`, and so on.
pub fn causes(err: &(dyn StdError + 'static)) -> Causes<'_> {
    Causes {
        next: Some(err),
        remaining: MAX_DEPTH,
    }
}

/// A lazy, depth-bounded iterator over an error's cause chain.
pub struct Causes<'a> {
    next: Option<&'a (dyn StdError + 'static)>,
    remaining: usize,
}

impl<'a> Iterator for Causes<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next.take()?;
        self.remaining -= 1;
        self.next = current.source();
        Some(current)
    }
}
