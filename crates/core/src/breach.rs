//! Threshold-crossing events.

use crate::Brand;
use serde::{Deserialize, Serialize};

/// A single threshold crossing, derived during a monitoring tick and
/// handed to the dispatcher. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreachEvent {
    pub subscription_id: i64,
    pub address: String,
    pub current_balance: f64,
    pub threshold: f64,
    pub previous_balance: Option<f64>,
    pub brand: Brand,
}

impl BreachEvent {
    /// Truncated address for message bodies.
    pub fn short_address(&self) -> String {
        let prefix: String = self.address.chars().take(8).collect();
        format!("{}...", prefix)
    }

    /// Balance formatted the way every transport renders it.
    pub fn balance_display(&self) -> String {
        format!("{:.4}", self.current_balance)
    }
}

/// Hysteresis rule for breach detection: fire only on the transition into
/// the below-threshold region, never while the balance stays low.
pub fn crossed_below(previous: Option<f64>, current: f64, threshold: f64) -> bool {
    if current >= threshold {
        return false;
    }
    match previous {
        Some(prev) => prev >= threshold,
        None => true,
    }
}
