//! Typed repository for threat records.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Map;
use tracing::{info, warn};

use haven_models::{ThreatId, ThreatRecord};

use crate::client::FirestoreClient;
use crate::error::LedgerResult;
use crate::types::{
    json_to_value, value_to_json, Document, FromFirestoreValue, RunQueryRequest,
    ToFirestoreValue, Value,
};

/// Collection holding threat documents.
pub const THREATS_COLLECTION: &str = "threats";

/// Read-after-write visibility: poll this many times before giving up.
const VISIBILITY_ATTEMPTS: u32 = 5;
const VISIBILITY_INTERVAL: Duration = Duration::from_millis(200);

/// Fields for a threat record about to be created.
#[derive(Debug, Clone)]
pub struct NewThreat {
    pub id: ThreatId,
    pub score: i64,
    pub explanation: String,
    pub videos: Vec<String>,
    pub metadata: Option<Map<String, serde_json::Value>>,
}

/// Repository for threat documents.
pub struct ThreatRepository {
    client: FirestoreClient,
}

impl ThreatRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create a new threat record, active, with zeroed community counters.
    pub async fn create(&self, threat: &NewThreat) -> LedgerResult<()> {
        let fields = new_threat_fields(threat);
        self.client
            .create_document(THREATS_COLLECTION, threat.id.as_str(), fields)
            .await?;
        info!("Created threat record: {}", threat.id);
        Ok(())
    }

    /// Fold an accepted clip into an existing record.
    ///
    /// The aggregate score never decreases, metadata merges with later keys
    /// winning, and `replace_videos` swaps the full evidence list so
    /// evictions are reflected.
    pub async fn update(
        &self,
        id: &ThreatId,
        score: i64,
        explanation: &str,
        videos: &[String],
        metadata: Option<&Map<String, serde_json::Value>>,
        replace_videos: bool,
    ) -> LedgerResult<()> {
        let existing = match self.get(id).await? {
            Some(record) => record,
            None => {
                warn!("Threat {} not found in ledger, skipping update", id);
                return Ok(());
            }
        };

        let merged_score = existing.score.max(score);
        let merged_metadata = merge_metadata(&existing.metadata, metadata);
        let videos = if replace_videos {
            videos.to_vec()
        } else {
            let mut all = existing.videos.clone();
            all.extend(videos.iter().cloned());
            all
        };

        let mut fields = HashMap::new();
        fields.insert("score".to_string(), merged_score.to_firestore_value());
        fields.insert("explanation".to_string(), explanation.to_firestore_value());
        fields.insert("videos".to_string(), videos.to_firestore_value());
        fields.insert("metadata".to_string(), metadata_value(&merged_metadata));
        fields.insert("active".to_string(), true.to_firestore_value());
        fields.insert("last_seen".to_string(), Utc::now().to_firestore_value());

        self.client
            .patch_document(
                THREATS_COLLECTION,
                id.as_str(),
                fields,
                Some(vec![
                    "score".to_string(),
                    "explanation".to_string(),
                    "videos".to_string(),
                    "metadata".to_string(),
                    "active".to_string(),
                    "last_seen".to_string(),
                ]),
            )
            .await?;
        Ok(())
    }

    /// Mark a threat inactive and stamp its end time. Idempotent.
    pub async fn mark_inactive(&self, id: &ThreatId) -> LedgerResult<()> {
        let mut fields = HashMap::new();
        fields.insert("active".to_string(), false.to_firestore_value());
        fields.insert("end_time".to_string(), Utc::now().to_firestore_value());

        self.client
            .patch_document(
                THREATS_COLLECTION,
                id.as_str(),
                fields,
                Some(vec!["active".to_string(), "end_time".to_string()]),
            )
            .await?;
        info!("Threat marked inactive: {}", id);
        Ok(())
    }

    /// All records currently marked active.
    pub async fn list_active(&self) -> LedgerResult<Vec<ThreatRecord>> {
        let request = RunQueryRequest::where_equal(
            THREATS_COLLECTION,
            "active",
            Value::BooleanValue(true),
        );
        let documents = self.client.run_query(&request).await?;

        Ok(documents
            .iter()
            .filter_map(document_to_threat)
            .collect())
    }

    /// Get a threat by id.
    pub async fn get(&self, id: &ThreatId) -> LedgerResult<Option<ThreatRecord>> {
        let doc = self
            .client
            .get_document(THREATS_COLLECTION, id.as_str())
            .await?;
        Ok(doc.as_ref().and_then(document_to_threat))
    }

    /// Poll until a freshly written record is readable.
    ///
    /// Returns false (after a warning) when the write is not observed within
    /// the bounded window; callers proceed regardless.
    pub async fn await_visible(&self, id: &ThreatId) -> bool {
        for attempt in 1..=VISIBILITY_ATTEMPTS {
            match self.get(id).await {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => {
                    warn!("Visibility check for threat {} failed: {}", id, e);
                }
            }
            if attempt < VISIBILITY_ATTEMPTS {
                tokio::time::sleep(VISIBILITY_INTERVAL).await;
            }
        }

        warn!(
            "Threat {} not readable after {} attempts, proceeding anyway",
            id, VISIBILITY_ATTEMPTS
        );
        false
    }
}

/// Merge metadata maps; keys from `new` win on conflict.
pub(crate) fn merge_metadata(
    existing: &Map<String, serde_json::Value>,
    new: Option<&Map<String, serde_json::Value>>,
) -> Map<String, serde_json::Value> {
    let mut merged = existing.clone();
    if let Some(new) = new {
        for (key, value) in new {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn metadata_value(metadata: &Map<String, serde_json::Value>) -> Value {
    json_to_value(&serde_json::Value::Object(metadata.clone()))
}

fn new_threat_fields(threat: &NewThreat) -> HashMap<String, Value> {
    let now = Utc::now();
    let metadata = threat.metadata.clone().unwrap_or_default();

    let mut fields = HashMap::new();
    fields.insert("score".to_string(), threat.score.to_firestore_value());
    fields.insert(
        "explanation".to_string(),
        threat.explanation.to_firestore_value(),
    );
    fields.insert("videos".to_string(), threat.videos.to_firestore_value());
    fields.insert("metadata".to_string(), metadata_value(&metadata));
    fields.insert("start_time".to_string(), now.to_firestore_value());
    fields.insert("end_time".to_string(), Value::NullValue(()));
    fields.insert("active".to_string(), true.to_firestore_value());
    fields.insert("last_seen".to_string(), now.to_firestore_value());
    fields.insert("confirms".to_string(), 0i64.to_firestore_value());
    fields.insert("denies".to_string(), 0i64.to_firestore_value());
    fields
}

/// Decode a Firestore document into a threat record.
pub(crate) fn document_to_threat(doc: &Document) -> Option<ThreatRecord> {
    let id = ThreatId::from_string(doc.doc_id()?);

    let videos = match doc.field("videos") {
        Some(Value::ArrayValue(arr)) => arr
            .values
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(String::from_firestore_value)
            .collect(),
        _ => Vec::new(),
    };

    let metadata = doc
        .field("metadata")
        .map(value_to_json)
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    Some(ThreatRecord {
        id,
        score: doc.field("score").and_then(i64::from_firestore_value)?,
        explanation: doc
            .field("explanation")
            .and_then(String::from_firestore_value)
            .unwrap_or_default(),
        videos,
        metadata,
        active: doc
            .field("active")
            .and_then(bool::from_firestore_value)
            .unwrap_or(false),
        start_time: doc.field("start_time").and_then(FromFirestoreValue::from_firestore_value),
        end_time: doc.field("end_time").and_then(FromFirestoreValue::from_firestore_value),
        last_seen: doc.field("last_seen").and_then(FromFirestoreValue::from_firestore_value),
        confirms: doc
            .field("confirms")
            .and_then(i64::from_firestore_value)
            .unwrap_or(0),
        denies: doc
            .field("denies")
            .and_then(i64::from_firestore_value)
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_new_threat() -> NewThreat {
        let mut metadata = Map::new();
        metadata.insert("camera".to_string(), json!({"lat": 40.0, "lng": -73.0}));

        NewThreat {
            id: ThreatId::from("threat-1"),
            score: 8,
            explanation: "two people brawling".to_string(),
            videos: vec!["clip_1.mp4".to_string()],
            metadata: Some(metadata),
        }
    }

    #[test]
    fn test_new_threat_fields_complete() {
        let fields = new_threat_fields(&sample_new_threat());

        assert!(matches!(fields.get("active"), Some(Value::BooleanValue(true))));
        assert!(matches!(fields.get("end_time"), Some(Value::NullValue(()))));
        assert!(matches!(fields.get("score"), Some(Value::IntegerValue(s)) if s == "8"));
        assert!(fields.contains_key("start_time"));
        assert!(fields.contains_key("last_seen"));
        assert!(matches!(fields.get("confirms"), Some(Value::IntegerValue(s)) if s == "0"));
        assert!(matches!(fields.get("denies"), Some(Value::IntegerValue(s)) if s == "0"));
    }

    #[test]
    fn test_document_round_trip() {
        let fields = new_threat_fields(&sample_new_threat());
        let doc = Document {
            name: Some("projects/p/databases/(default)/documents/threats/threat-1".to_string()),
            fields: Some(fields),
            create_time: None,
            update_time: None,
        };

        let record = document_to_threat(&doc).unwrap();
        assert_eq!(record.id.as_str(), "threat-1");
        assert_eq!(record.score, 8);
        assert_eq!(record.videos, vec!["clip_1.mp4".to_string()]);
        assert!(record.active);
        assert!(record.origin().is_some());
        assert_eq!(record.confirms, 0);
    }

    #[test]
    fn test_document_without_score_is_rejected() {
        let doc = Document {
            name: Some("projects/p/databases/(default)/documents/threats/t".to_string()),
            fields: Some(HashMap::new()),
            create_time: None,
            update_time: None,
        };
        assert!(document_to_threat(&doc).is_none());
    }

    #[test]
    fn test_merge_metadata_later_keys_win() {
        let mut existing = Map::new();
        existing.insert("site".to_string(), json!("lot-a"));
        existing.insert("camera".to_string(), json!({"lat": 1.0, "lng": 2.0}));

        let mut new = Map::new();
        new.insert("site".to_string(), json!("lot-b"));

        let merged = merge_metadata(&existing, Some(&new));
        assert_eq!(merged.get("site"), Some(&json!("lot-b")));
        assert!(merged.contains_key("camera"));
    }

    #[test]
    fn test_merge_metadata_none_keeps_existing() {
        let mut existing = Map::new();
        existing.insert("site".to_string(), json!("lot-a"));

        let merged = merge_metadata(&existing, None);
        assert_eq!(merged, existing);
    }
}
