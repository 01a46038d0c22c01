//! Volatility circuit breaker.
//!
//! Tracks recent prints in a rolling window. The reference price is the
//! earliest print still inside the window, falling back to the latest known
//! price (last print or external reference). A prospective execution price
//! that deviates from the reference by more than the threshold trips the
//! breaker until `now + cooldown`.
//!
//! The breaker never reads a clock: every call takes `now`, and the
//! transition back to open happens lazily on the first call at or after
//! the cool-down, or earlier through [`CircuitBreaker::resume`].

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tapeline_types::constants::MAX_BREAKER_WINDOW_PRINTS;
use tapeline_types::{BreakerConfig, Price};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Open,
    Halted {
        until: DateTime<Utc>,
        reference: Price,
    },
}

/// A tripped breaker: what was compared and how long the halt lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trip {
    pub reference: Price,
    pub price: Price,
    pub until: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    window: VecDeque<(DateTime<Utc>, Price)>,
    last_known: Option<Price>,
    /// Set on a resetting resume; the next print becomes the reference.
    awaiting_reference: bool,
    state: BreakerState,
}

pub(crate) fn millis(ms: u64) -> TimeDelta {
    TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            last_known: None,
            awaiting_reference: false,
            state: BreakerState::Open,
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.state
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        matches!(self.state, BreakerState::Halted { .. })
    }

    /// Leave the halted state once the cool-down has passed.
    ///
    /// Returns `true` when the breaker resumed on this call.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Halted { until, .. } if now >= until => {
                self.reopen();
                true
            }
            _ => false,
        }
    }

    /// Operator override: reopen before the cool-down ends. Returns
    /// `false` when the breaker was not halted.
    pub fn resume(&mut self) -> bool {
        if !self.is_halted() {
            return false;
        }
        self.reopen();
        true
    }

    fn reopen(&mut self) {
        self.state = BreakerState::Open;
        if self.config.reset_reference_on_resume {
            self.window.clear();
            self.awaiting_reference = true;
        }
    }

    /// Record an executed print.
    pub fn record_print(&mut self, price: Price, now: DateTime<Utc>) {
        self.window.push_back((now, price));
        self.last_known = Some(price);
        self.awaiting_reference = false;
        self.evict(now);
    }

    /// Record an external reference price. It is only used as a fallback
    /// when no print is inside the window.
    pub fn set_reference(&mut self, price: Price) {
        self.last_known = Some(price);
    }

    /// Current reference price, if any.
    #[must_use]
    pub fn reference(&self, now: DateTime<Utc>) -> Option<Price> {
        if self.awaiting_reference {
            return None;
        }
        let cutoff = now - millis(self.config.window_ms);
        self.window
            .iter()
            .find(|(at, _)| *at >= cutoff)
            .map(|(_, price)| *price)
            .or(self.last_known)
    }

    /// Check prospective execution prices. Trips the breaker and returns
    /// the trip on the first price outside the threshold.
    pub fn evaluate(&mut self, prices: &[Price], now: DateTime<Utc>) -> Option<Trip> {
        if !self.config.enabled {
            return None;
        }
        let reference = self.reference(now)?;
        let price = prices.iter().copied().find(|price| {
            price
                .deviation_from(reference)
                .is_some_and(|deviation| deviation > self.config.threshold)
        })?;
        let until = now
            .checked_add_signed(millis(self.config.cooldown_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.state = BreakerState::Halted { until, reference };
        Some(Trip {
            reference,
            price,
            until,
        })
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - millis(self.config.window_ms);
        while let Some((at, _)) = self.window.front() {
            if *at < cutoff || self.window.len() > MAX_BREAKER_WINDOW_PRINTS {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}
