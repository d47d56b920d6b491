//! Person registry data types
//!
//! Per-person live state, static metadata from the persons file, and the
//! typed live-event payload delivered by the recognition transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of events retained per person, most-recent-first.
pub const EVENT_HISTORY_CAPACITY: usize = 10;

/// Lowercase underscore-separated entity slug for a person name.
pub fn slug(name: &str) -> String {
    name.to_lowercase().replace([' ', '-'], "_")
}

/// Declared role of a person in the persons file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Child,
    TrustedAdult,
    Other,
}

/// Static per-person attributes from the persons file.
///
/// Unrecognized attributes (age, notes, ...) are ignored on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonMetadata {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub requires_supervision: bool,
    #[serde(default)]
    pub can_supervise: bool,
    #[serde(default)]
    pub dangerous_zones: Vec<String>,
    /// Default camera hint, used by the frigate_integration snapshot mode.
    #[serde(default)]
    pub camera: Option<String>,
}

impl PersonMetadata {
    /// True if the metadata marks the person as a supervised child.
    pub fn is_child(&self) -> bool {
        self.role == Some(Role::Child) || self.requires_supervision
    }

    /// True if the metadata marks the person as a trusted adult.
    pub fn is_adult(&self) -> bool {
        self.role == Some(Role::TrustedAdult) || self.can_supervise
    }
}

/// Live identification event payload, already decoded from the transport.
///
/// The identity key precedence is `person_id` > `person` > `name`; a payload
/// carrying none of them is dropped by the registry. `camera` wins over the
/// legacy `checkpoint` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveEventPayload {
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub person: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub checkpoint: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub similarity_score: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub frigate_zones: Vec<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub snapshot_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl LiveEventPayload {
    /// Identity key of this payload, if any.
    pub fn identity(&self) -> Option<&str> {
        [&self.person_id, &self.person, &self.name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }

    /// Camera that produced the detection (`camera` wins over `checkpoint`).
    pub fn camera(&self) -> Option<&str> {
        self.camera
            .as_deref()
            .or(self.checkpoint.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// One retained event in a person's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub event_id: String,
    pub timestamp: i64,
    pub camera: Option<String>,
    pub confidence: Option<f64>,
}

/// Live state for a single tracked person.
#[derive(Debug, Clone, Serialize)]
pub struct PersonRecord {
    pub name: String,
    pub slug: String,
    /// Last camera/checkpoint that produced a detection.
    pub camera: Option<String>,
    pub confidence: Option<f64>,
    pub similarity_score: Option<f64>,
    pub source: Option<String>,
    /// Detector-reported zones for the last event (camera-local).
    pub zones: Vec<String>,
    pub event_id: Option<String>,
    pub snapshot_url: Option<String>,
    pub timestamp: Option<i64>,
    /// Ingestion time of the last applied event.
    pub last_seen: Option<DateTime<Utc>>,
    /// Bounded event history, most-recent-first.
    pub event_history: VecDeque<HistoryEntry>,
}

impl PersonRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slug(name),
            camera: None,
            confidence: None,
            similarity_score: None,
            source: None,
            zones: Vec::new(),
            event_id: None,
            snapshot_url: None,
            timestamp: None,
            last_seen: None,
            event_history: VecDeque::with_capacity(EVENT_HISTORY_CAPACITY),
        }
    }

    /// Apply a live event payload, stamping `last_seen` with `now`.
    ///
    /// Only events carrying both an id and a timestamp enter the history;
    /// the history is trimmed to [`EVENT_HISTORY_CAPACITY`].
    pub fn apply(&mut self, payload: &LiveEventPayload, now: DateTime<Utc>) {
        self.camera = payload.camera().map(String::from);
        self.confidence = payload.confidence;
        self.source = payload.source.clone();
        self.zones = payload.frigate_zones.clone();
        self.event_id = payload.event_id.clone();
        self.snapshot_url = payload.snapshot_url.clone();
        self.timestamp = payload.timestamp;
        self.last_seen = Some(now);
        if payload.similarity_score.is_some() {
            self.similarity_score = payload.similarity_score;
        }

        if let (Some(event_id), Some(timestamp)) = (&payload.event_id, payload.timestamp) {
            self.event_history.push_front(HistoryEntry {
                event_id: event_id.clone(),
                timestamp,
                camera: self.camera.clone(),
                confidence: self.confidence,
            });
            self.event_history.truncate(EVENT_HISTORY_CAPACITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Jo Ann"), "jo_ann");
        assert_eq!(slug("Mary-Jane Smith"), "mary_jane_smith");
    }

    #[test]
    fn test_identity_precedence() {
        let payload = LiveEventPayload {
            person_id: Some("Alice".into()),
            person: Some("Bob".into()),
            name: Some("Carol".into()),
            ..Default::default()
        };
        assert_eq!(payload.identity(), Some("Alice"));

        let payload = LiveEventPayload {
            person: Some("Bob".into()),
            name: Some("Carol".into()),
            ..Default::default()
        };
        assert_eq!(payload.identity(), Some("Bob"));

        let payload = LiveEventPayload {
            person_id: Some(String::new()),
            name: Some("Carol".into()),
            ..Default::default()
        };
        assert_eq!(payload.identity(), Some("Carol"));

        assert_eq!(LiveEventPayload::default().identity(), None);
    }

    #[test]
    fn test_camera_falls_back_to_checkpoint() {
        let payload = LiveEventPayload {
            checkpoint: Some("gate".into()),
            ..Default::default()
        };
        assert_eq!(payload.camera(), Some("gate"));
    }

    #[test]
    fn test_history_requires_id_and_timestamp() {
        let mut record = PersonRecord::new("Alice");
        let now = Utc::now();

        let mut payload = LiveEventPayload {
            event_id: Some("e1".into()),
            ..Default::default()
        };
        record.apply(&payload, now);
        assert!(record.event_history.is_empty());

        payload.timestamp = Some(100);
        record.apply(&payload, now);
        assert_eq!(record.event_history.len(), 1);
    }

    #[test]
    fn test_history_bounded_most_recent_first() {
        let mut record = PersonRecord::new("Alice");
        let now = Utc::now();
        for i in 0..15 {
            let payload = LiveEventPayload {
                event_id: Some(format!("e{i}")),
                timestamp: Some(i),
                ..Default::default()
            };
            record.apply(&payload, now);
        }
        assert_eq!(record.event_history.len(), EVENT_HISTORY_CAPACITY);
        assert_eq!(record.event_history[0].event_id, "e14");
        assert_eq!(record.event_history[9].event_id, "e5");
    }

    #[test]
    fn test_roles() {
        let meta = PersonMetadata {
            role: Some(Role::Child),
            ..Default::default()
        };
        assert!(meta.is_child());
        assert!(!meta.is_adult());

        let meta = PersonMetadata {
            requires_supervision: true,
            ..Default::default()
        };
        assert!(meta.is_child());

        let meta = PersonMetadata {
            can_supervise: true,
            ..Default::default()
        };
        assert!(meta.is_adult());
    }
}
