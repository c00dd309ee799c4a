//! Tracker bridge and trigger evaluation.
//!
//! Subjects are keyed by their position in the frame's detection list, so
//! identity only holds across consecutive frames in which the subject is
//! present. That is deliberately weak tracking: the trigger cares about
//! sustained rapid motion, not about who is who.

use std::collections::HashMap;

use haven_models::{Centroid, Detection};

/// Centroids of person-labelled detections, keyed by detection index.
pub fn person_centroids(detections: &[Detection]) -> HashMap<usize, Centroid> {
    detections
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_person())
        .map(|(i, d)| (i, d.bbox.centroid()))
        .collect()
}

/// Per-subject displacement between consecutive frames, for subjects
/// present in both.
pub fn displacements(
    prev: &HashMap<usize, Centroid>,
    next: &HashMap<usize, Centroid>,
) -> Vec<f64> {
    next.iter()
        .filter_map(|(index, centroid)| prev.get(index).map(|p| p.distance(centroid)))
        .collect()
}

/// A capture attempt fires when any subject moved faster than the threshold.
pub fn triggered(displacements: &[f64], speed_threshold: f64) -> bool {
    displacements.iter().any(|&speed| speed > speed_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_models::BoundingBox;

    fn person_at(x: f64, y: f64) -> Detection {
        Detection {
            label: "person".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(x - 10.0, y - 10.0, x + 10.0, y + 10.0),
        }
    }

    #[test]
    fn test_person_centroids_skip_other_labels() {
        let detections = vec![
            person_at(100.0, 100.0),
            Detection {
                label: "car".to_string(),
                confidence: 0.8,
                bbox: BoundingBox::new(0.0, 0.0, 50.0, 50.0),
            },
            person_at(200.0, 50.0),
        ];

        let centroids = person_centroids(&detections);
        assert_eq!(centroids.len(), 2);
        // Index is positional within the full detection list
        assert!(centroids.contains_key(&0));
        assert!(centroids.contains_key(&2));
    }

    #[test]
    fn test_displacement_requires_presence_in_both_frames() {
        let prev = person_centroids(&[person_at(0.0, 0.0)]);
        let next = person_centroids(&[person_at(3.0, 4.0), person_at(100.0, 100.0)]);

        let moved = displacements(&prev, &next);
        assert_eq!(moved.len(), 1);
        assert!((moved[0] - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trigger_is_strictly_greater_than_threshold() {
        assert!(!triggered(&[15.0], 15.0));
        assert!(triggered(&[15.1], 15.0));
        assert!(!triggered(&[], 15.0));
        assert!(triggered(&[1.0, 2.0, 30.0], 15.0));
    }
}
