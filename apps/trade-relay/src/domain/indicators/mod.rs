//! Relative Strength Index
//!
//! Computes a simple (non-smoothed) RSI over a fixed-length sliding window
//! of trade prices, one window per token.

use std::collections::VecDeque;

/// Default number of prices in an RSI window.
pub const DEFAULT_RSI_WINDOW: usize = 14;

/// RSI of a price series.
///
/// Uses the mean gain and mean loss over consecutive differences.
/// Returns 50 for fewer than two prices and 100 when there are no losses.
#[must_use]
pub fn relative_strength_index<'a>(prices: impl IntoIterator<Item = &'a f64>) -> f64 {
    let mut gains = 0.0;
    let mut losses = 0.0;
    let mut periods = 0_u32;
    let mut previous: Option<f64> = None;

    for &price in prices {
        if let Some(prev) = previous {
            let diff = price - prev;
            if diff >= 0.0 {
                gains += diff;
            } else {
                losses -= diff;
            }
            periods += 1;
        }
        previous = Some(price);
    }

    if periods == 0 {
        return 50.0;
    }

    let periods = f64::from(periods);
    let avg_gain = gains / periods;
    let avg_loss = losses / periods;
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Sliding window of the most recent prices for one token.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    prices: VecDeque<f64>,
    capacity: usize,
}

impl PriceWindow {
    /// Create an empty window holding at most `capacity` prices.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a price, evicting the oldest when full.
    ///
    /// Returns the RSI once the window is full.
    pub fn push(&mut self, price: f64) -> Option<f64> {
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);

        self.is_full()
            .then(|| relative_strength_index(self.prices.iter()))
    }

    /// Whether the window holds `capacity` prices.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.prices.len() == self.capacity
    }

    /// Number of prices currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no prices are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
