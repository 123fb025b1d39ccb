//! Identity of layers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime-unique layer identity. Never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source.
///
/// [`IdAllocator::process`] is the allocator every layer factory uses unless
/// one is injected. It starts at zero when the process starts and is never
/// reset afterwards; separate allocators are only useful for tests that want
/// deterministic ids.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

static PROCESS_IDS: IdAllocator = IdAllocator::new();

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    pub fn process() -> &'static IdAllocator {
        &PROCESS_IDS
    }

    pub fn next_layer_id(&self) -> LayerId {
        LayerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let ids = IdAllocator::new();
        let a = ids.next_layer_id();
        let b = ids.next_layer_id();
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
        assert!(a < b);
    }
}
