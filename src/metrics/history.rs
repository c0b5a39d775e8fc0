use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Anything that can be evicted by the retention sweep.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Ordered sequence with oldest-first eviction.
///
/// With a capacity, every `push` past the limit drops the front entry.
/// Without one, the history only shrinks through `retain_since`.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> BoundedHistory<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity: Some(capacity),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            items: VecDeque::new(),
            capacity: None,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        if let Some(cap) = self.capacity {
            while self.items.len() > cap {
                self.items.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// The newest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

impl<T: Timestamped> BoundedHistory<T> {
    /// Drop everything stamped before `cutoff`. Returns how many went.
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.timestamp() >= cutoff);
        before - self.items.len()
    }
}
