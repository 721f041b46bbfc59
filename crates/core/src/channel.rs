//! Notification channel records and channel kinds.

use serde::{Deserialize, Serialize};

/// Seconds a pending verification code stays valid.
pub const VERIFICATION_TTL_SECS: i64 = 600;

/// The transport a subscriber receives alerts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Sms,
    Email,
    Telegram,
    Discord,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Sms,
        ChannelKind::Email,
        ChannelKind::Telegram,
        ChannelKind::Discord,
    ];

    /// Stable identifier used in persistence and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Sms => "sms",
            ChannelKind::Email => "email",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Discord => "discord",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sms" => Some(ChannelKind::Sms),
            "email" => Some(ChannelKind::Email),
            "telegram" => Some(ChannelKind::Telegram),
            "discord" => Some(ChannelKind::Discord),
            _ => None,
        }
    }

    /// Whether the subscriber supplies the destination up front.
    /// Telegram and Discord destinations are learned during verification
    /// (bot DM sender id, OAuth account id).
    pub fn destination_supplied_at_creation(self) -> bool {
        matches!(self, ChannelKind::Sms | ChannelKind::Email)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscriber-configured alert destination with its verification state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    /// Database ID.
    pub id: i64,
    /// Owning subscription.
    pub subscription_id: i64,
    pub kind: ChannelKind,
    /// Phone number, email address, or platform user id. None until
    /// verification completes for bot/OAuth kinds.
    pub destination: Option<String>,
    /// Only verified channels receive alerts.
    pub verified: bool,
    /// Pending one-time code (or OAuth state token for Discord).
    pub verification_code: Option<String>,
    /// Epoch seconds after which the pending code is dead.
    pub verification_expires: Option<i64>,
}

impl NotificationChannel {
    /// Whether a pending code exists and has not expired at `now`.
    pub fn code_pending_at(&self, now: i64) -> bool {
        match (&self.verification_code, self.verification_expires) {
            (Some(_), Some(expires)) => expires >= now,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in ChannelKind::ALL {
            assert_eq!(ChannelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChannelKind::parse("pigeon"), None);
    }

    #[test]
    fn test_destination_supplied_at_creation() {
        assert!(ChannelKind::Sms.destination_supplied_at_creation());
        assert!(ChannelKind::Email.destination_supplied_at_creation());
        assert!(!ChannelKind::Telegram.destination_supplied_at_creation());
        assert!(!ChannelKind::Discord.destination_supplied_at_creation());
    }

    #[test]
    fn test_code_pending_at() {
        let mut channel = NotificationChannel {
            id: 1,
            subscription_id: 1,
            kind: ChannelKind::Email,
            destination: Some("a@b.co".to_string()),
            verified: false,
            verification_code: Some("123456".to_string()),
            verification_expires: Some(1000),
        };
        assert!(channel.code_pending_at(999));
        assert!(channel.code_pending_at(1000));
        assert!(!channel.code_pending_at(1001));

        channel.verification_code = None;
        assert!(!channel.code_pending_at(999));
    }
}
