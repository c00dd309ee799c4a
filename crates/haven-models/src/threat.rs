//! Threat records and identifiers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Maximum evidence clips retained per threat.
pub const MAX_EVIDENCE_CLIPS: usize = 2;

/// Unique identifier for a threat record.
///
/// Assigned client-side so the in-process state and the ledger document
/// share an id before the first write lands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreatId(pub String);

impl ThreatId {
    /// Generate a new random threat ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ThreatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A threat record as persisted in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub id: ThreatId,

    /// Aggregate severity, the maximum over all contributing clips.
    pub score: i64,

    /// Explanation of the highest-scoring retained clip.
    pub explanation: String,

    /// File names of the retained evidence clips, best first.
    pub videos: Vec<String>,

    /// Merged capture metadata (later keys win on conflict).
    #[serde(default)]
    pub metadata: Map<String, Value>,

    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Last time an accepted clip touched this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,

    /// Community confirmations, maintained outside this pipeline.
    #[serde(default)]
    pub confirms: i64,

    /// Community denials, maintained outside this pipeline.
    #[serde(default)]
    pub denies: i64,
}

impl ThreatRecord {
    /// Resolve the capture origin from `metadata.camera.{lat,lng}`, if present.
    pub fn origin(&self) -> Option<GeoPoint> {
        let camera = self.metadata.get("camera")?.as_object()?;
        let lat = camera.get("lat")?.as_f64()?;
        let lng = camera.get("lng")?.as_f64()?;
        Some(GeoPoint::new(lat, lng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with_metadata(metadata: Map<String, Value>) -> ThreatRecord {
        ThreatRecord {
            id: ThreatId::from("t-1"),
            score: 8,
            explanation: "two people fighting".to_string(),
            videos: vec!["clip_1.mp4".to_string()],
            metadata,
            active: true,
            start_time: None,
            end_time: None,
            last_seen: None,
            confirms: 0,
            denies: 0,
        }
    }

    #[test]
    fn test_origin_from_camera_metadata() {
        let mut metadata = Map::new();
        metadata.insert("camera".to_string(), json!({"lat": 40.0, "lng": -73.5}));

        let origin = record_with_metadata(metadata).origin().unwrap();
        assert!((origin.lat - 40.0).abs() < f64::EPSILON);
        assert!((origin.lng - (-73.5)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_origin_missing_metadata() {
        assert!(record_with_metadata(Map::new()).origin().is_none());
    }

    #[test]
    fn test_origin_incomplete_coordinates() {
        let mut metadata = Map::new();
        metadata.insert("camera".to_string(), json!({"lat": 40.0}));
        assert!(record_with_metadata(metadata).origin().is_none());
    }

    #[test]
    fn test_threat_id_display() {
        let id = ThreatId::from("abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn test_threat_ids_are_unique() {
        assert_ne!(ThreatId::new(), ThreatId::new());
    }
}
