//! Subscription records for monitored bond accounts.

use crate::Brand;
use serde::{Deserialize, Serialize};

/// Default per-subscription check interval in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: i64 = 900;

/// A monitored bond address with its alert threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Database ID.
    pub id: i64,
    /// Monitored bond address. Globally unique.
    pub address: String,
    /// Balance floor (SOL) below which alerts fire.
    pub threshold: f64,
    /// Minimum seconds between balance checks for this subscription.
    pub check_interval_secs: i64,
    /// Balance observed on the most recent successful check.
    pub last_balance: Option<f64>,
    /// Epoch seconds of the most recent successful check.
    pub last_checked: Option<i64>,
    /// Inactive subscriptions are skipped by the monitor. Subscriptions
    /// are deactivated, never deleted.
    pub active: bool,
    /// Brand the subscription was created under.
    pub brand: Brand,
}

impl Subscription {
    /// Whether this subscription is due for a balance check at `now`.
    /// A subscription that has never been checked is always due.
    pub fn due_at(&self, now: i64) -> bool {
        match self.last_checked {
            Some(last) => now - last >= self.check_interval_secs,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(last_checked: Option<i64>) -> Subscription {
        Subscription {
            id: 1,
            address: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_string(),
            threshold: 5.0,
            check_interval_secs: 900,
            last_balance: None,
            last_checked,
            active: true,
            brand: Brand::Jpool,
        }
    }

    #[test]
    fn test_never_checked_is_due() {
        assert!(subscription(None).due_at(0));
    }

    #[test]
    fn test_due_respects_interval() {
        let sub = subscription(Some(1000));
        assert!(!sub.due_at(1500));
        assert!(sub.due_at(1900));
        assert!(sub.due_at(2000));
    }
}
