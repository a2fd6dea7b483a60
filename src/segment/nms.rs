//! Class-aware non-maximum suppression.
//!
//! YOLO heads propose thousands of overlapping boxes. Greedy NMS keeps the most
//! confident proposal, drops every proposal of the same class that overlaps it
//! by more than the IoU threshold, and repeats. Proposals of different classes
//! never suppress each other.

use std::cmp::Ordering;

use super::result::BoundingBox;

/// Anything NMS can rank and compare.
pub trait Scored {
    fn score(&self) -> f32;
    fn class_id(&self) -> usize;
    fn bbox(&self) -> &BoundingBox;
}

/// Returns the survivors in descending score order, at most `max_keep`.
pub fn non_max_suppression<T: Scored>(
    mut candidates: Vec<T>,
    iou_threshold: f32,
    max_keep: usize,
) -> Vec<T> {
    candidates.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<T> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_keep {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id() == candidate.class_id() && k.bbox().iou(candidate.bbox()) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
