use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a running transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Hands out increasing transaction ids, starting at 1
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicU64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let generator = TransactionIdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert_eq!(a, TransactionId(1));
        assert!(b > a);
    }
}
