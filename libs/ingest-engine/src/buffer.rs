use ingest_api::Record;

/// Active batch of one lane.
///
/// Owned exclusively by the lane's control loop, so no lock is involved:
/// `drain_and_reset` hands the whole `Vec` to the caller and puts a fresh one
/// in its place. A record lives in exactly one buffer instance at a time.
#[derive(Debug)]
pub struct BatchBuffer {
    records: Vec<Record>,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append to the tail (insertion order is preserved end-to-end).
    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size trigger condition.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Take the current contents and replace them with an empty buffer.
    pub fn drain_and_reset(&mut self) -> Vec<Record> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_api::Priority;

    fn rec(i: i64) -> Record {
        Record::new(i, "dev", "m", i as f64, Priority::Medium)
    }

    #[test]
    fn test_append_and_size() {
        let mut buf = BatchBuffer::new(3);
        assert!(buf.is_empty());
        buf.append(rec(1));
        buf.append(rec(2));
        assert_eq!(buf.size(), 2);
        assert!(!buf.is_full());
        buf.append(rec(3));
        assert!(buf.is_full());
    }

    #[test]
    fn test_drain_preserves_order_and_resets() {
        let mut buf = BatchBuffer::new(4);
        for i in 0..3 {
            buf.append(rec(i));
        }
        let drained = buf.drain_and_reset();
        let ts: Vec<i64> = drained.iter().map(|r| r.ts_ms()).collect();
        assert_eq!(ts, vec![0, 1, 2]);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);

        // Appends after a drain land in the new buffer only.
        buf.append(rec(9));
        assert_eq!(buf.size(), 1);
        assert_eq!(drained.len(), 3);
    }

    #[test]
    fn test_drain_empty_is_empty() {
        let mut buf = BatchBuffer::new(2);
        assert!(buf.drain_and_reset().is_empty());
    }
}
