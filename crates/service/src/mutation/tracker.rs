use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::ServiceError;

/// Running count of mutations performed by one logical operation.
///
/// Clones share the same counter, so handing a clone to a nested call (or to
/// several top-level calls that should share one budget) counts against a
/// single ceiling. The count never decreases.
#[derive(Clone, Debug)]
pub struct MutationTracker {
    count: Arc<AtomicU64>,
    limit: Option<u64>,
}

impl MutationTracker {
    pub fn new(initial: u64, limit: Option<u64>) -> Self {
        Self { count: Arc::new(AtomicU64::new(initial)), limit }
    }

    pub fn unlimited() -> Self { Self::new(0, None) }

    /// Add `count` mutations. Fails once the total exceeds the ceiling unless
    /// `bypass_limits` is set; the count is added either way.
    pub fn track(&self, count: u64, bypass_limits: bool) -> Result<u64, ServiceError> {
        let total = self.count.fetch_add(count, Ordering::SeqCst).saturating_add(count);
        if bypass_limits {
            return Ok(total);
        }
        match self.limit {
            Some(limit) if total > limit => Err(ServiceError::LimitExceeded { count: total, limit }),
            _ => Ok(total),
        }
    }

    pub fn count(&self) -> u64 { self.count.load(Ordering::SeqCst) }

    pub fn limit(&self) -> Option<u64> { self.limit }

    /// Whether two handles share one counter.
    pub fn same_as(&self, other: &MutationTracker) -> bool { Arc::ptr_eq(&self.count, &other.count) }
}
