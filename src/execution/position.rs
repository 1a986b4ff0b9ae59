use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Engine state derived from the position flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionPhase {
    Idle,
    Holding,
}

/// What the engine believes it holds on the exchange
///
/// Only the order executor moves this between phases, and only after the
/// exchange has confirmed a fill.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    in_position: bool,
    held_quantity: Decimal,
    last_action: Option<DateTime<Utc>>,
}

impl PositionState {
    pub fn new() -> Self {
        Self {
            in_position: false,
            held_quantity: Decimal::ZERO,
            last_action: None,
        }
    }

    /// Seed state from known values without validating them
    ///
    /// Lets tests start from a holding; an inconsistent pair is repaired by
    /// the engine on the next sell signal.
    pub fn from_parts(in_position: bool, held_quantity: Decimal) -> Self {
        Self {
            in_position,
            held_quantity,
            last_action: None,
        }
    }

    pub fn phase(&self) -> PositionPhase {
        if self.in_position {
            PositionPhase::Holding
        } else {
            PositionPhase::Idle
        }
    }

    pub fn in_position(&self) -> bool {
        self.in_position
    }

    pub fn held_quantity(&self) -> Decimal {
        self.held_quantity
    }

    pub fn last_action(&self) -> Option<DateTime<Utc>> {
        self.last_action
    }

    /// Holding flag set with nothing actually held
    pub fn is_inconsistent(&self) -> bool {
        self.in_position && self.held_quantity <= Decimal::ZERO
    }

    /// Confirmed buy fill
    pub(crate) fn commit_buy(&mut self, executed_qty: Decimal) {
        self.held_quantity = executed_qty;
        self.in_position = true;
    }

    /// Confirmed sell fill
    pub(crate) fn commit_sell(&mut self) {
        self.held_quantity = Decimal::ZERO;
        self.in_position = false;
    }

    /// Repair transition: back to Idle without an order
    pub(crate) fn force_idle(&mut self) {
        self.held_quantity = Decimal::ZERO;
        self.in_position = false;
    }

    pub(crate) fn record_action(&mut self, at: DateTime<Utc>) {
        self.last_action = Some(at);
    }
}

impl Default for PositionState {
    fn default() -> Self {
        Self::new()
    }
}
