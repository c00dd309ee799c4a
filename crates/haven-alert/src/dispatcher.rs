//! Alert dispatcher: who is close enough to hear about a new threat.

use async_trait::async_trait;
use tracing::{info, warn};

use haven_ledger::PartyRepository;
use haven_models::{haversine_miles, Party, ThreatRecord};

use crate::error::AlertResult;
use crate::gateway::Notifier;

/// Source of registered parties.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn list(&self) -> AlertResult<Vec<Party>>;
}

#[async_trait]
impl PartyDirectory for PartyRepository {
    async fn list(&self) -> AlertResult<Vec<Party>> {
        Ok(PartyRepository::list(self).await?)
    }
}

/// Dispatches proximity alerts for newly created threats.
pub struct AlertDispatcher<D, N> {
    parties: D,
    gateway: N,
    radius_miles: f64,
}

impl<D: PartyDirectory, N: Notifier> AlertDispatcher<D, N> {
    pub fn new(parties: D, gateway: N, radius_miles: f64) -> Self {
        Self {
            parties,
            gateway,
            radius_miles,
        }
    }

    /// Notify every reachable party within the radius of the threat origin.
    ///
    /// Returns the number of notifications delivered. A threat without an
    /// origin produces no alerts; gateway failures are logged per party and
    /// do not stop the sweep over the remaining parties.
    pub async fn dispatch(&self, threat: &ThreatRecord) -> AlertResult<u32> {
        let origin = match threat.origin() {
            Some(origin) => origin,
            None => {
                info!(
                    "Threat {} has no camera location in metadata, skipping alerts",
                    threat.id
                );
                return Ok(0);
            }
        };

        let message = format!("SafeHaven Alert: {}", threat.explanation);
        let parties = self.parties.list().await?;

        let mut sent = 0u32;
        for party in &parties {
            let (phone, location) = match party.reachable() {
                Some(reachable) => reachable,
                None => continue,
            };

            let distance = haversine_miles(origin, location);
            if distance > self.radius_miles {
                info!(
                    "Party {} is {:.2} miles away, outside the {:.1} mile radius",
                    phone, distance, self.radius_miles
                );
                continue;
            }

            match self.gateway.send(phone, &message).await {
                Ok(()) => {
                    info!("Party {} is {:.2} miles away, alerted", phone, distance);
                    sent += 1;
                }
                Err(e) => {
                    warn!("Failed to notify {}: {}", phone, e);
                }
            }
        }

        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_models::{GeoPoint, ThreatId};
    use serde_json::{json, Map};
    use std::sync::Mutex;

    struct FixedParties(Vec<Party>);

    #[async_trait]
    impl PartyDirectory for FixedParties {
        async fn list(&self) -> AlertResult<Vec<Party>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingGateway {
        async fn send(&self, phone: &str, message: &str) -> AlertResult<()> {
            if self.fail {
                return Err(crate::error::AlertError::gateway_rejected("down"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn threat_at(lat: f64, lng: f64) -> ThreatRecord {
        let mut metadata = Map::new();
        metadata.insert("camera".to_string(), json!({"lat": lat, "lng": lng}));

        ThreatRecord {
            id: ThreatId::from("t-1"),
            score: 8,
            explanation: "fight in progress".to_string(),
            videos: vec![],
            metadata,
            active: true,
            start_time: None,
            end_time: None,
            last_seen: None,
            confirms: 0,
            denies: 0,
        }
    }

    fn threat_without_origin() -> ThreatRecord {
        ThreatRecord {
            metadata: Map::new(),
            ..threat_at(0.0, 0.0)
        }
    }

    fn party(phone: &str, lat: f64, lng: f64) -> Party {
        Party {
            phone: Some(phone.to_string()),
            location: Some(GeoPoint::new(lat, lng)),
        }
    }

    #[tokio::test]
    async fn test_party_inside_radius_is_alerted() {
        // Roughly 0.07 miles north of the origin
        let parties = FixedParties(vec![party("+15550001111", 40.001, -74.0)]);
        let dispatcher = AlertDispatcher::new(parties, RecordingGateway::default(), 5.0);

        let sent = dispatcher.dispatch(&threat_at(40.0, -74.0)).await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn test_boundary_is_inclusive() {
        // One degree of latitude is ~69 miles; use a radius just at that distance
        let origin = GeoPoint::new(0.0, 0.0);
        let edge = GeoPoint::new(1.0, 0.0);
        let radius = haversine_miles(origin, edge);

        let parties = FixedParties(vec![party("+15550001111", 1.0, 0.0)]);
        let dispatcher = AlertDispatcher::new(parties, RecordingGateway::default(), radius);
        assert_eq!(dispatcher.dispatch(&threat_at(0.0, 0.0)).await.unwrap(), 1);

        // Just past the boundary no alert goes out
        let parties = FixedParties(vec![party("+15550001111", 1.001, 0.0)]);
        let dispatcher = AlertDispatcher::new(parties, RecordingGateway::default(), radius);
        assert_eq!(dispatcher.dispatch(&threat_at(0.0, 0.0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_origin_aborts_silently() {
        let parties = FixedParties(vec![party("+15550001111", 0.0, 0.0)]);
        let dispatcher = AlertDispatcher::new(parties, RecordingGateway::default(), 5.0);

        let sent = dispatcher.dispatch(&threat_without_origin()).await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_unreachable_parties_are_skipped() {
        let parties = FixedParties(vec![
            Party {
                phone: None,
                location: Some(GeoPoint::new(40.0, -74.0)),
            },
            Party {
                phone: Some("+15550002222".to_string()),
                location: None,
            },
        ]);
        let dispatcher = AlertDispatcher::new(parties, RecordingGateway::default(), 5.0);

        let sent = dispatcher.dispatch(&threat_at(40.0, -74.0)).await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_gateway_failure_does_not_propagate() {
        let parties = FixedParties(vec![party("+15550001111", 40.0, -74.0)]);
        let gateway = RecordingGateway {
            fail: true,
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(parties, gateway, 5.0);

        let sent = dispatcher.dispatch(&threat_at(40.0, -74.0)).await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_message_carries_explanation() {
        let parties = FixedParties(vec![party("+15550001111", 40.0, -74.0)]);
        let gateway = RecordingGateway::default();
        let dispatcher = AlertDispatcher::new(parties, gateway, 5.0);

        dispatcher.dispatch(&threat_at(40.0, -74.0)).await.unwrap();

        let sent = dispatcher.gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "SafeHaven Alert: fight in progress");
    }
}
