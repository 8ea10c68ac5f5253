//! Event feed data model
//!
//! Types describing what the backend's `GET /events` feed returns: a map from
//! timestamp-derived [`EventKey`]s to an [`EventRecord`] carrying the
//! processing status of one logging session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique, chronologically sortable identifier of one logging event
///
/// Keys are derived from the session start timestamp
/// (e.g. `2025-05-21T19-50-13-708146`), so lexical order equals
/// chronological order. Identity always uses the raw key; see
/// [`crate::timestamp::to_artifact_ref`] for the storage-safe form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for EventKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Backend processing status of an event
///
/// Wire values are lowercase (`"started"`, `"processed"`, `"done"`).
/// Anything else is kept verbatim as [`EventStatus::Unknown`] so that it can
/// still be displayed with the neutral style instead of failing the poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventStatus {
    /// Logging started, backend has not processed the session yet
    Started,
    /// Cleaning pipeline finished
    Processed,
    /// Artifacts (heatmap, trend plots) are available
    Done,
    /// Unrecognized status string from the feed
    Unknown(String),
}

impl EventStatus {
    /// Wire representation of this status
    pub fn as_str(&self) -> &str {
        match self {
            EventStatus::Started => "started",
            EventStatus::Processed => "processed",
            EventStatus::Done => "done",
            EventStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, EventStatus::Done)
    }
}

impl From<String> for EventStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "started" => EventStatus::Started,
            "processed" => EventStatus::Processed,
            "done" => EventStatus::Done,
            _ => EventStatus::Unknown(value),
        }
    }
}

impl From<&str> for EventStatus {
    fn from(value: &str) -> Self {
        EventStatus::from(value.to_string())
    }
}

impl From<EventStatus> for String {
    fn from(value: EventStatus) -> Self {
        match value {
            EventStatus::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side record for one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub status: EventStatus,
}

impl EventRecord {
    pub fn new(status: EventStatus) -> Self {
        Self { status }
    }
}

/// Complete key → record mapping returned by one poll
///
/// Backed by a `BTreeMap`, so iteration is always in ascending key order,
/// which is also the display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<EventKey, EventRecord>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests
    pub fn with(mut self, key: impl Into<EventKey>, status: EventStatus) -> Self {
        self.insert(key.into(), EventRecord::new(status));
        self
    }

    pub fn insert(&mut self, key: EventKey, record: EventRecord) -> Option<EventRecord> {
        self.0.insert(key, record)
    }

    pub fn remove(&mut self, key: &EventKey) -> Option<EventRecord> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &EventKey) -> Option<&EventRecord> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &EventKey) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, &EventRecord)> {
        self.0.iter()
    }

    /// Iterate keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &EventKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(EventKey, EventRecord)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (EventKey, EventRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_values() {
        assert_eq!(EventStatus::from("started"), EventStatus::Started);
        assert_eq!(EventStatus::from("processed"), EventStatus::Processed);
        assert_eq!(EventStatus::from("done"), EventStatus::Done);
        assert_eq!(
            EventStatus::from("archived"),
            EventStatus::Unknown("archived".to_string())
        );
    }

    #[test]
    fn test_status_is_case_sensitive() {
        // The backend only ever emits lowercase values
        assert!(matches!(EventStatus::from("Done"), EventStatus::Unknown(_)));
    }

    #[test]
    fn test_snapshot_deserializes_feed_payload() {
        let json = r#"{
            "2025-05-21T19-50-13-708146": {"status": "done"},
            "2025-05-21T18-02-44-000001": {"status": "started"},
            "2025-05-21T19-10-00-000000": {"status": "weird"}
        }"#;

        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.len(), 3);

        let keys: Vec<&str> = snapshot.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "2025-05-21T18-02-44-000001",
                "2025-05-21T19-10-00-000000",
                "2025-05-21T19-50-13-708146",
            ]
        );

        let weird = snapshot.get(&EventKey::from("2025-05-21T19-10-00-000000")).unwrap();
        assert_eq!(weird.status, EventStatus::Unknown("weird".to_string()));
    }

    #[test]
    fn test_unknown_status_serializes_verbatim() {
        let record = EventRecord::new(EventStatus::Unknown("queued".to_string()));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"status":"queued"}"#);
    }

    #[test]
    fn test_key_ordering_is_lexical() {
        let earlier = EventKey::from("2025-05-21T09-00-00-000000");
        let later = EventKey::from("2025-05-21T19-00-00-000000");
        assert!(earlier < later);
    }
}
