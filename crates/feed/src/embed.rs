//! How much of each event a feed entry carries.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FeedError;

/// Embedding level of feed entries. Higher levels are supersets of lower ones.
///
/// - `None`: links and entry metadata only
/// - `Body`: plus event type, number, stream and payload
/// - `Rich`: plus event id, log position and event metadata
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EmbedLevel {
    #[default]
    None,
    Body,
    Rich,
}

impl EmbedLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedLevel::None => "none",
            EmbedLevel::Body => "body",
            EmbedLevel::Rich => "rich",
        }
    }

    /// True if entries carry the event payload.
    pub fn includes_body(&self) -> bool {
        *self >= EmbedLevel::Body
    }

    /// True if entries carry system metadata.
    pub fn includes_system_metadata(&self) -> bool {
        *self >= EmbedLevel::Rich
    }
}

impl std::fmt::Display for EmbedLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbedLevel {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(EmbedLevel::None),
            "body" => Ok(EmbedLevel::Body),
            "rich" => Ok(EmbedLevel::Rich),
            _ => Err(FeedError::InvalidEmbed(s.to_string())),
        }
    }
}
