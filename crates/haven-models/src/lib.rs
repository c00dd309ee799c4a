//! Shared data models for the SafeHaven sentinel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Detector output (bounding boxes, labels, centroids)
//! - Raw video frames
//! - Scored clip candidates and threat records
//! - Registered parties and geographic points

pub mod candidate;
pub mod detection;
pub mod frame;
pub mod geo;
pub mod party;
pub mod threat;

// Re-export common types
pub use candidate::ClipCandidate;
pub use detection::{BoundingBox, Centroid, Detection, PERSON_LABEL};
pub use frame::Frame;
pub use geo::{haversine_miles, GeoPoint, EARTH_RADIUS_MILES};
pub use party::Party;
pub use threat::{ThreatId, ThreatRecord, MAX_EVIDENCE_CLIPS};
