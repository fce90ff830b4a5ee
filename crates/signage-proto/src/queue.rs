//! Playback queue construction.
//!
//! Pure and side-effect free: given the validated records of one fetch
//! cycle and the device's orientation selector, produce the immutable
//! ordered queue the player loops over.  Remote ordering is preserved
//! exactly and duplicates are kept — a video listed twice plays twice
//! per loop.

use crate::catalog::{Orientation, VideoRecord};
use serde::{Deserialize, Serialize};

/// Device-side orientation preference from local configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationSelector {
    Landscape,
    Portrait,
    /// Matches every record regardless of its orientation.
    Auto,
}

impl OrientationSelector {
    /// A record matches when the selector is `Auto`, the record's
    /// orientation is unspecified, or the two are equal.
    pub fn matches(&self, orientation: Orientation) -> bool {
        match self {
            Self::Auto => true,
            Self::Landscape => {
                matches!(orientation, Orientation::Landscape | Orientation::Unspecified)
            }
            Self::Portrait => {
                matches!(orientation, Orientation::Portrait | Orientation::Unspecified)
            }
        }
    }
}

/// The filtered, ordered subsequence of the catalog currently being played.
/// Built once per fetch cycle; empty is a valid quiet-idle state.
#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    items: Vec<VideoRecord>,
}

impl PlaybackQueue {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VideoRecord> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoRecord> {
        self.items.iter()
    }

    /// Playable URIs in queue order, for handing to the player capability.
    pub fn urls(&self) -> Vec<String> {
        self.items.iter().map(|r| r.url.clone()).collect()
    }
}

/// Build the queue for one fetch cycle.
pub fn build(records: &[VideoRecord], selector: OrientationSelector) -> PlaybackQueue {
    PlaybackQueue {
        items: records
            .iter()
            .filter(|r| selector.matches(r.orientation))
            .cloned()
            .collect(),
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, orientation: Orientation) -> VideoRecord {
        VideoRecord {
            id,
            remote_key: None,
            url: format!("http://x/{}.mp4", id),
            orientation,
        }
    }

    #[test]
    fn test_selector_round_trip() {
        let records = vec![record(1, Orientation::Landscape)];
        assert_eq!(build(&records, OrientationSelector::Landscape).len(), 1);
        assert_eq!(build(&records, OrientationSelector::Portrait).len(), 0);
        assert_eq!(build(&records, OrientationSelector::Auto).len(), 1);
    }

    #[test]
    fn test_unspecified_matches_any_selector() {
        let records = vec![record(1, Orientation::Unspecified)];
        assert_eq!(build(&records, OrientationSelector::Landscape).len(), 1);
        assert_eq!(build(&records, OrientationSelector::Portrait).len(), 1);
        assert_eq!(build(&records, OrientationSelector::Auto).len(), 1);
    }

    #[test]
    fn test_order_preserved_no_dedup() {
        let records = vec![
            record(3, Orientation::Landscape),
            record(1, Orientation::Portrait),
            record(3, Orientation::Landscape),
            record(2, Orientation::Unspecified),
        ];
        let queue = build(&records, OrientationSelector::Landscape);
        let ids: Vec<i64> = queue.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 3, 2]);
    }

    #[test]
    fn test_empty_input_empty_output() {
        assert!(build(&[], OrientationSelector::Auto).is_empty());
    }

    #[test]
    fn test_random_records_match_rule_and_order() {
        use rand::Rng;

        let orientations = [
            Orientation::Landscape,
            Orientation::Portrait,
            Orientation::Unspecified,
        ];
        let selectors = [
            OrientationSelector::Landscape,
            OrientationSelector::Portrait,
            OrientationSelector::Auto,
        ];

        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let records: Vec<VideoRecord> = (0..rng.gen_range(0..32))
                .map(|i| record(i + 1, orientations[rng.gen_range(0..3)]))
                .collect();
            let selector = selectors[rng.gen_range(0..3)];

            let queue = build(&records, selector);

            // Exactly the matching records, in their original relative order.
            let expected: Vec<i64> = records
                .iter()
                .filter(|r| selector.matches(r.orientation))
                .map(|r| r.id)
                .collect();
            let actual: Vec<i64> = queue.iter().map(|r| r.id).collect();
            assert_eq!(actual, expected);
        }
    }
}
