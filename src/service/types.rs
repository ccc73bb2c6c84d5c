use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accept `null` wherever the service may omit a list.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub rsid: Rsid,
}

/// Handle of a server-side search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Rsid {
    pub id: String,
    pub status: String,
    pub date_from: i64,
    pub date_to: i64,
    pub elapsed_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagResult {
    pub total_events: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub tag: Vec<Tag>,
    pub unique_field_count: u64,
}

/// A logical source active in the window and its event count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub term: String,
    #[serde(default)]
    pub count: u64,
}

/// One response of the event-iteration endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
    #[serde(default)]
    pub next: Option<String>,
}

impl EventPage {
    /// Continuation cursor, or `None` once the stream is exhausted.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|next| !next.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    /// Epoch milliseconds assigned by the service.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logtypes: Vec<String>,
    #[serde(default)]
    pub event: EventBody,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<EventPayload>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Structured body the client application logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    fn payload_field(&self, pick: impl Fn(&EventPayload) -> Option<&String>) -> &str {
        self.event
            .json
            .as_ref()
            .and_then(pick)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn message(&self) -> &str {
        self.payload_field(|p| p.message.as_ref())
    }

    pub fn app_version(&self) -> &str {
        self.payload_field(|p| p.app_version.as_ref())
    }

    pub fn os_type(&self) -> &str {
        self.payload_field(|p| p.os_type.as_ref())
    }

    pub fn os_version(&self) -> &str {
        self.payload_field(|p| p.os_version.as_ref())
    }

    pub fn model(&self) -> &str {
        self.payload_field(|p| p.model.as_ref())
    }

    /// The payload's own timestamp when present, otherwise the service's epoch ms.
    pub fn display_timestamp(&self) -> String {
        match self.event.json.as_ref().and_then(|p| p.timestamp.as_ref()) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => self.timestamp.to_string(),
            Some(other) => other.to_string(),
        }
    }
}
