//! IMAP command tag generator.
//!
//! Tags match commands with their tagged completion responses. The
//! generator produces `a001`, `a002`, … — strictly increasing for the
//! lifetime of a connection. The engine reads the current tag for the
//! very first tagged command and advances before every later one, so the
//! first command on the wire carries the tag as initialized.

use std::sync::atomic::{AtomicU32, Ordering};

/// Tag generator for IMAP commands.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator whose first tag is `<prefix>001`.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(1),
            prefix,
        }
    }

    /// Returns the current tag without advancing.
    #[must_use]
    pub fn current(&self) -> String {
        format!("{}{:03}", self.prefix, self.counter.load(Ordering::Relaxed))
    }

    /// Advances to the next tag.
    ///
    /// # Panics
    ///
    /// Panics if the counter would overflow `u32::MAX`, which would
    /// require four billion commands on one connection.
    pub fn advance(&self) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        assert!(n != u32::MAX, "tag counter overflow");
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('a')
    }
}
