use std::collections::VecDeque;

use crate::domain::TradeTick;

/// Default number of trades kept per symbol
pub const DEFAULT_TRADE_CAPACITY: usize = 500;

/// Fixed-capacity trade buffer, oldest evicted first
#[derive(Debug, Clone)]
pub struct TradeRing {
    ticks: VecDeque<TradeTick>,
    capacity: usize,
}

impl TradeRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ticks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, tick: TradeTick) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
    }

    /// Last `n` trades, oldest first
    pub fn recent(&self, n: usize) -> Vec<TradeTick> {
        let skip = self.ticks.len().saturating_sub(n);
        self.ticks.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeTick> {
        self.ticks.iter()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TradeRing {
    fn default() -> Self {
        Self::new(DEFAULT_TRADE_CAPACITY)
    }
}
