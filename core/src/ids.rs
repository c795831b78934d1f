//! Identifier generators

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;


/// Monotonic id source; the first id is 1.
///
/// Safe to share between concurrent interpretations: every call returns a
/// value no other call has returned.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: IdGenerator = IdGenerator::new();

/// Process-wide generator
pub fn global() -> &'static IdGenerator {
    &GLOBAL
}

/// Random id (UUID v4). Not ordered, and with no uniqueness guarantee; use
/// [`IdGenerator`] when ids must be distinct.
pub fn entropy_id() -> String {
    Uuid::new_v4().to_string()
}
