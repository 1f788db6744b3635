//! Chronological work queue of planned files

/// Ordered queue of planned items.
///
/// Items are sorted at construction time and consumed front to back.
/// Supports filtering at construction time for resume/skip logic.
#[derive(Debug)]
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: usize,
}

impl<S: Ord> WorkQueue<S> {
    /// Create queue from all items (no filtering)
    pub fn new(mut items: Vec<S>) -> Self {
        items.sort();
        items.dedup();
        Self { items, cursor: 0 }
    }

    /// Create queue, keeping only items that pass the filter (resume support)
    pub fn filtered(items: Vec<S>, keep: impl Fn(&S) -> bool) -> Self {
        let kept: Vec<S> = items.into_iter().filter(|s| keep(s)).collect();
        let queue = Self::new(kept);
        log::debug!("{} items in work queue", queue.total());
        queue
    }
}

impl<S> WorkQueue<S> {
    /// Take the next item
    pub fn next(&mut self) -> Option<&S> {
        let item = self.items.get(self.cursor)?;
        self.cursor += 1;
        Some(item)
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items not yet taken
    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    pub fn is_drained(&self) -> bool {
        self.remaining() == 0
    }
}
