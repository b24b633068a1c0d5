//! Subscriber record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Telegram chat identifier.
pub type ChatId = i64;

/// A chat registered to receive notifications.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Subscriber {
    pub id: ChatId,

    /// Unknown for subscribers migrated from a bare id list
    pub subscribed_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn new(id: ChatId) -> Self {
        Self {
            id,
            subscribed_at: Some(Utc::now()),
        }
    }
}

/// On-disk shapes: either `{ "id": .., "subscribed_at": .. }` or a bare id.
#[derive(Deserialize)]
#[serde(untagged)]
enum SubscriberRepr {
    Full {
        id: ChatId,
        #[serde(default)]
        subscribed_at: Option<DateTime<Utc>>,
    },
    Bare(ChatId),
}

impl<'de> Deserialize<'de> for Subscriber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match SubscriberRepr::deserialize(deserializer)? {
            SubscriberRepr::Full { id, subscribed_at } => Self { id, subscribed_at },
            SubscriberRepr::Bare(id) => Self {
                id,
                subscribed_at: None,
            },
        })
    }
}
