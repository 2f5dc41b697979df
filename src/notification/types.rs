use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classification assigned to an inbound frame.
///
/// The set is closed: any discriminator outside the table folds into
/// `Unclassified` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A CSV import finished server-side
    CsvCompleted,
    /// A user account was created
    UserCreated,
    /// A user account was updated
    UserUpdated,
    /// A user account was deleted
    UserDeleted,
    /// Unknown discriminator or unstructured frame
    Unclassified,
}

impl EventKind {
    /// Map a wire discriminator to its kind
    pub fn from_discriminator(tag: &str) -> Self {
        match tag {
            "CSV_COMPLETED" => EventKind::CsvCompleted,
            "USER_CREATED" => EventKind::UserCreated,
            "USER_UPDATED" => EventKind::UserUpdated,
            "USER_DELETED" => EventKind::UserDeleted,
            _ => EventKind::Unclassified,
        }
    }

    /// Whether consumers must re-fetch their server-side view.
    ///
    /// Fixed per kind; never derived from payload content. Plain-text
    /// frames override this to `true` at construction (see
    /// [`NotificationEvent::plain_text`]).
    pub fn should_refresh(&self) -> bool {
        match self {
            EventKind::CsvCompleted => true,
            EventKind::UserCreated => true,
            EventKind::UserUpdated => true,
            EventKind::UserDeleted => true,
            EventKind::Unclassified => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CsvCompleted => "CSV_COMPLETED",
            EventKind::UserCreated => "USER_CREATED",
            EventKind::UserUpdated => "USER_UPDATED",
            EventKind::UserDeleted => "USER_DELETED",
            EventKind::Unclassified => "UNCLASSIFIED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized event handed to every subscription.
///
/// Exactly one is produced per inbound frame; unparsable frames degrade
/// to `Unclassified` instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Classification of the frame
    pub kind: EventKind,
    /// Human-readable summary, synthesized when the frame carries none
    pub text: String,
    /// Original structured payload; absent for plain-text frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    /// Whether dependent views must re-fetch server state
    pub should_refresh: bool,
    /// Local receipt time (advisory; not part of classification)
    pub received_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Event built from a structured frame; the refresh flag comes from
    /// the per-kind table.
    pub fn structured(kind: EventKind, text: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            kind,
            text: text.into(),
            payload: Some(payload),
            should_refresh: kind.should_refresh(),
            received_at: Utc::now(),
        }
    }

    /// Event built from a frame that is not a structured object.
    ///
    /// Always signals a refresh: unparsable content means "something
    /// happened server-side, re-check state".
    pub fn plain_text(raw: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Unclassified,
            text: raw.into(),
            payload: None,
            should_refresh: true,
            received_at: Utc::now(),
        }
    }
}
