//! Brand tags for white-labeled notification templates.

use serde::{Deserialize, Serialize};

/// Brand a subscription was created under. Controls the display name
/// embedded in every outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    #[default]
    Jpool,
}

impl Brand {
    /// Name shown to subscribers in alert and verification messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Brand::Jpool => "Jpool",
        }
    }

    /// Stable identifier used in persistence.
    pub fn as_str(self) -> &'static str {
        match self {
            Brand::Jpool => "jpool",
        }
    }

    /// Parse a stored brand tag, falling back to the default brand for
    /// unknown values.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "jpool" => Brand::Jpool,
            _ => Brand::default(),
        }
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
