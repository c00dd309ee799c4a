//! Registered parties eligible for proximity alerts.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A registered party as stored in the ledger's `parties` collection.
///
/// Parties without a phone number or a complete location are skipped by the
/// alert dispatcher rather than treated as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl Party {
    /// Phone and location together, if both are known.
    pub fn reachable(&self) -> Option<(&str, GeoPoint)> {
        match (&self.phone, self.location) {
            (Some(phone), Some(location)) => Some((phone.as_str(), location)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_requires_both_fields() {
        let full = Party {
            phone: Some("+15550001111".to_string()),
            location: Some(GeoPoint::new(1.0, 2.0)),
        };
        assert!(full.reachable().is_some());

        let no_phone = Party {
            phone: None,
            location: Some(GeoPoint::new(1.0, 2.0)),
        };
        assert!(no_phone.reachable().is_none());

        let no_location = Party {
            phone: Some("+15550001111".to_string()),
            location: None,
        };
        assert!(no_location.reachable().is_none());
    }
}
