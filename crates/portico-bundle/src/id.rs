//! Identifier generation for bundle items

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of item identifiers.
///
/// Identifiers only need to be unique within one bundle; the receiving
/// gateway maps items by name.
pub trait IdGenerator: Send + Sync {
    /// Return a new 32 character lowercase hex identifier
    fn next_id(&self) -> String;
}

/// 128 random bits, hex encoded
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        format!("{:032x}", rand::random::<u128>())
    }
}

/// Counter-based identifiers for reproducible output
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Start counting at `start`
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("{:032x}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}
