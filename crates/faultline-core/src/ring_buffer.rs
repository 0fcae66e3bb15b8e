//! Fixed-capacity FIFO-eviction buffer

/// Holds the last `capacity` records in insertion order.
///
/// Once full, each `add` overwrites the oldest slot in place. Not internally
/// synchronized: owners shared across tasks wrap it in their own lock.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    records: Vec<T>,
    capacity: usize,
    /// Slot holding the oldest record once the buffer has wrapped
    write_idx: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            write_idx: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    /// Append a record, evicting the oldest when full. O(1).
    pub fn add(&mut self, record: T) {
        if self.records.len() < self.capacity {
            self.records.push(record);
        } else {
            self.records[self.write_idx] = record;
            self.write_idx = (self.write_idx + 1) % self.capacity;
        }
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (newer, older) = self.records.split_at(self.write_idx);
        older.iter().chain(newer.iter())
    }

    /// Apply `f` to the most recently added record.
    ///
    /// Returns `false` when the buffer is empty.
    pub fn update_last<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        if self.records.is_empty() {
            return false;
        }

        let last_idx = if self.records.len() < self.capacity {
            self.records.len() - 1
        } else {
            (self.write_idx + self.capacity - 1) % self.capacity
        };

        f(&mut self.records[last_idx]);
        true
    }

    pub fn last(&self) -> Option<&T> {
        self.iter().last()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// All held records, oldest first. Empty when nothing was added.
    pub fn get_all(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(10)
    }
}
