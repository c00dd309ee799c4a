//! Typed repository for registered parties.

use haven_models::{GeoPoint, Party};

use crate::client::FirestoreClient;
use crate::error::LedgerResult;
use crate::types::{Document, FromFirestoreValue, Value};

/// Collection holding registered parties.
pub const PARTIES_COLLECTION: &str = "parties";

/// Repository for party documents.
pub struct PartyRepository {
    client: FirestoreClient,
}

impl PartyRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// All registered parties. Incomplete documents still come back; the
    /// dispatcher decides who is reachable.
    pub async fn list(&self) -> LedgerResult<Vec<Party>> {
        let documents = self.client.list_documents(PARTIES_COLLECTION).await?;
        Ok(documents.iter().map(document_to_party).collect())
    }
}

/// Decode a party document. Location may arrive as a `{lat, lng}` map or a
/// native geo point.
pub(crate) fn document_to_party(doc: &Document) -> Party {
    let phone = doc.field("phone").and_then(String::from_firestore_value);

    let location = doc.field("location").and_then(|value| match value {
        Value::MapValue(map) => {
            let fields = map.fields.as_ref()?;
            let lat = fields.get("lat").and_then(f64::from_firestore_value)?;
            let lng = fields.get("lng").and_then(f64::from_firestore_value)?;
            Some(GeoPoint::new(lat, lng))
        }
        Value::GeoPointValue(point) => Some(GeoPoint::new(point.latitude, point.longitude)),
        _ => None,
    });

    Party { phone, location }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LatLng, MapValue, ToFirestoreValue};
    use std::collections::HashMap;

    fn doc_with_fields(fields: HashMap<String, Value>) -> Document {
        Document {
            name: Some("projects/p/databases/(default)/documents/parties/u1".to_string()),
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    #[test]
    fn test_party_with_map_location() {
        let mut location = HashMap::new();
        location.insert("lat".to_string(), 40.5.to_firestore_value());
        location.insert("lng".to_string(), (-74.2).to_firestore_value());

        let mut fields = HashMap::new();
        fields.insert("phone".to_string(), "+15550001111".to_firestore_value());
        fields.insert(
            "location".to_string(),
            Value::MapValue(MapValue {
                fields: Some(location),
            }),
        );

        let party = document_to_party(&doc_with_fields(fields));
        let (phone, location) = party.reachable().unwrap();
        assert_eq!(phone, "+15550001111");
        assert!((location.lat - 40.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_party_with_geo_point_location() {
        let mut fields = HashMap::new();
        fields.insert("phone".to_string(), "+15550002222".to_firestore_value());
        fields.insert(
            "location".to_string(),
            Value::GeoPointValue(LatLng {
                latitude: 1.0,
                longitude: 2.0,
            }),
        );

        let party = document_to_party(&doc_with_fields(fields));
        assert!(party.reachable().is_some());
    }

    #[test]
    fn test_party_missing_phone_is_unreachable() {
        let party = document_to_party(&doc_with_fields(HashMap::new()));
        assert!(party.reachable().is_none());
    }

    #[test]
    fn test_party_with_partial_location() {
        let mut location = HashMap::new();
        location.insert("lat".to_string(), 40.5.to_firestore_value());

        let mut fields = HashMap::new();
        fields.insert("phone".to_string(), "+15550003333".to_firestore_value());
        fields.insert(
            "location".to_string(),
            Value::MapValue(MapValue {
                fields: Some(location),
            }),
        );

        let party = document_to_party(&doc_with_fields(fields));
        assert!(party.location.is_none());
        assert!(party.reachable().is_none());
    }
}
