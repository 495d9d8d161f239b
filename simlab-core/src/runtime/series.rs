//! Per-stream history with bounded retention.
//!
//! A [`Series`] grows one item per delivered bar. Vectorized runs load the
//! whole history up front and reveal it one item per tick, so strategies see
//! exactly the same slice in both schedules.

use crate::domain::Bar;

/// Growable series with a visible cursor.
///
/// With a capacity set, old items are dropped in batches: the retained
/// slice stays between `cap` and `2 * cap` items so pushes remain amortized
/// O(1) while memory stays bounded.
#[derive(Debug, Clone)]
pub struct Series<T> {
    items: Vec<T>,
    visible: usize,
    dropped: usize,
    cap: Option<usize>,
}

impl<T> Series<T> {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            items: Vec::new(),
            visible: 0,
            dropped: 0,
            cap,
        }
    }

    /// Full history known in advance; nothing is visible yet.
    pub fn preloaded(items: Vec<T>) -> Self {
        Self {
            items,
            visible: 0,
            dropped: 0,
            cap: None,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.truncate(self.visible);
        self.items.push(item);
        self.visible += 1;
        self.trim();
    }

    /// Make the next preloaded item visible. Returns false once exhausted.
    pub fn reveal(&mut self) -> bool {
        if self.visible < self.items.len() {
            self.visible += 1;
            true
        } else {
            false
        }
    }

    /// Items delivered so far, including dropped ones.
    pub fn len(&self) -> usize {
        self.dropped + self.visible
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current(&self) -> Option<&T> {
        self.ago(0)
    }

    /// Item `n` steps back from the current one; `None` once dropped or
    /// before the start.
    pub fn ago(&self, n: usize) -> Option<&T> {
        self.visible
            .checked_sub(n + 1)
            .and_then(|i| self.items.get(i))
    }

    /// Retained visible items, oldest first.
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.visible]
    }

    /// The last `n` visible items (fewer if not yet delivered or retained).
    pub fn window(&self, n: usize) -> &[T] {
        let start = self.visible.saturating_sub(n);
        &self.items[start..self.visible]
    }

    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }

    fn trim(&mut self) {
        let Some(cap) = self.cap else {
            return;
        };
        let cap = cap.max(1);
        if self.visible > cap * 2 {
            let excess = self.visible - cap;
            self.items.drain(..excess);
            self.visible -= excess;
            self.dropped += excess;
        }
    }
}

/// Bars and derived indicator series of one stream.
#[derive(Debug, Clone)]
pub struct StreamHistory {
    pub bars: Series<Bar>,
    /// Indexed like the strategy's indicator list.
    pub indicators: Vec<Series<f64>>,
    /// Advanced on the current tick.
    pub fresh: bool,
}

impl StreamHistory {
    pub fn new(cap: Option<usize>, indicator_count: usize) -> Self {
        Self {
            bars: Series::new(cap),
            indicators: (0..indicator_count).map(|_| Series::new(cap)).collect(),
            fresh: false,
        }
    }

    pub fn preloaded(bars: Vec<Bar>, indicators: Vec<Vec<f64>>) -> Self {
        Self {
            bars: Series::preloaded(bars),
            indicators: indicators.into_iter().map(Series::preloaded).collect(),
            fresh: false,
        }
    }
}
