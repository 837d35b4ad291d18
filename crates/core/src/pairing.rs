//! Candidate-pair generation policies.
//!
//! Every matching strategy reduces to "which unordered image pairs get fed to
//! the shared match-and-verify step". The policies here are pure functions
//! over image id (and location) lists; the matching itself lives elsewhere.
//!
//! All policies emit deduplicated pairs with the smaller id first and never
//! emit self-pairs.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{ordered_pair, ImageId, ImagePair};

// ---------------------------------------------------------------------------
// Exhaustive
// ---------------------------------------------------------------------------

/// All unordered pairs among the given images. O(n²) candidates.
pub fn exhaustive_pairs(ids: &[ImageId]) -> Vec<ImagePair> {
    let mut pairs = Vec::with_capacity(ids.len().saturating_sub(1) * ids.len() / 2);
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            pairs.push(ordered_pair(*a, *b));
        }
    }
    pairs
}

// ---------------------------------------------------------------------------
// Sequential
// ---------------------------------------------------------------------------

/// Loop-closure re-check configuration for [`sequential_pairs`].
#[derive(Debug, Clone, Copy)]
pub struct LoopClosure {
    /// Every `period`-th image is re-checked against earlier images.
    pub period: usize,
    /// How many earlier images are sampled (evenly) for the re-check.
    pub num_images: usize,
}

/// Each image against a bounded window of order-adjacent successors,
/// optionally re-checking periodic images against a sampled set of earlier
/// images for loop closure.
///
/// `ids` must be in temporal/name order; `overlap` is the window size.
pub fn sequential_pairs(
    ids: &[ImageId],
    overlap: usize,
    loop_closure: Option<LoopClosure>,
) -> Vec<ImagePair> {
    let mut seen = BTreeSet::new();

    for (i, a) in ids.iter().enumerate() {
        for b in ids.iter().skip(i + 1).take(overlap) {
            seen.insert(ordered_pair(*a, *b));
        }
    }

    if let Some(lc) = loop_closure {
        if lc.period > 0 && lc.num_images > 0 {
            for (i, a) in ids.iter().enumerate() {
                if i == 0 || i % lc.period != 0 {
                    continue;
                }
                for b in sample_earlier(&ids[..i], lc.num_images) {
                    seen.insert(ordered_pair(*a, b));
                }
            }
        }
    }

    seen.into_iter().collect()
}

/// Evenly sample up to `count` images from `earlier`, always including the
/// first (oldest) image so long loops can still close.
fn sample_earlier(earlier: &[ImageId], count: usize) -> Vec<ImageId> {
    if earlier.len() <= count {
        return earlier.to_vec();
    }
    let step = earlier.len() as f64 / count as f64;
    (0..count)
        .map(|k| earlier[(k as f64 * step) as usize])
        .collect()
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// Each image against its nearest neighbours by known location.
///
/// Images without a known location are skipped, both as query and as
/// neighbour. At most `max_neighbors` pairs per query image, and only
/// neighbours within `max_distance` (same unit as the locations).
pub fn spatial_pairs(
    locations: &[(ImageId, Option<[f64; 3]>)],
    max_neighbors: usize,
    max_distance: f64,
) -> Vec<ImagePair> {
    let located: Vec<(ImageId, [f64; 3])> = locations
        .iter()
        .filter_map(|(id, loc)| loc.map(|l| (*id, l)))
        .collect();

    let mut seen = BTreeSet::new();
    for (id, loc) in &located {
        let mut neighbors: Vec<(f64, ImageId)> = located
            .iter()
            .filter(|(other, _)| other != id)
            .map(|(other, other_loc)| (distance(loc, other_loc), *other))
            .filter(|(d, _)| *d <= max_distance)
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, other) in neighbors.into_iter().take(max_neighbors) {
            seen.insert(ordered_pair(*id, other));
        }
    }
    seen.into_iter().collect()
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

// ---------------------------------------------------------------------------
// Transitive
// ---------------------------------------------------------------------------

/// Expand an existing match graph: if A–B and B–C are matched, propose A–C.
///
/// Repeated for `rounds` rounds, each round building on the proposals of the
/// previous one. Returns only pairs that were not in `existing`.
pub fn transitive_pairs(existing: &[ImagePair], rounds: usize) -> Vec<ImagePair> {
    let mut graph: HashMap<ImageId, HashSet<ImageId>> = HashMap::new();
    for (a, b) in existing {
        graph.entry(*a).or_default().insert(*b);
        graph.entry(*b).or_default().insert(*a);
    }

    let known: HashSet<ImagePair> = existing.iter().copied().collect();
    let mut proposed = BTreeSet::new();

    for _ in 0..rounds {
        let mut round = Vec::new();
        for (a, via) in &graph {
            for b in via {
                if let Some(reachable) = graph.get(b) {
                    for c in reachable {
                        if c == a {
                            continue;
                        }
                        let pair = ordered_pair(*a, *c);
                        if !known.contains(&pair) && !proposed.contains(&pair) {
                            round.push(pair);
                        }
                    }
                }
            }
        }
        if round.is_empty() {
            break;
        }
        for pair in round {
            proposed.insert(pair);
            graph.entry(pair.0).or_default().insert(pair.1);
            graph.entry(pair.1).or_default().insert(pair.0);
        }
    }

    proposed.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Vocabulary tree
// ---------------------------------------------------------------------------

/// Retrieval interface over a precomputed visual index.
///
/// Implementations return the ids of the most visually similar images to the
/// query, best first, excluding the query itself.
pub trait VisualIndex {
    fn query(&self, image: ImageId, top_k: usize) -> Vec<ImageId>;
}

/// Each image against its `num_nearest` most visually similar candidates.
pub fn vocab_tree_pairs(
    ids: &[ImageId],
    index: &dyn VisualIndex,
    num_nearest: usize,
) -> Vec<ImagePair> {
    let mut seen = BTreeSet::new();
    for id in ids {
        for other in index.query(*id, num_nearest) {
            if other != *id {
                seen.insert(ordered_pair(*id, other));
            }
        }
    }
    seen.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustive_counts_all_unordered_pairs() {
        let ids: Vec<ImageId> = (1..=5).collect();
        let pairs = exhaustive_pairs(&ids);
        assert_eq!(pairs.len(), 10); // n(n-1)/2
        assert!(pairs.iter().all(|(a, b)| a < b));
    }

    #[test]
    fn exhaustive_empty_and_singleton_produce_nothing() {
        assert!(exhaustive_pairs(&[]).is_empty());
        assert!(exhaustive_pairs(&[7]).is_empty());
    }

    #[test]
    fn sequential_respects_window() {
        let ids: Vec<ImageId> = (1..=6).collect();
        let pairs = sequential_pairs(&ids, 2, None);
        assert!(pairs.contains(&(1, 2)));
        assert!(pairs.contains(&(1, 3)));
        assert!(!pairs.contains(&(1, 4)));
        // last image has no successors
        assert!(!pairs.iter().any(|(a, b)| a == b));
    }

    #[test]
    fn sequential_window_larger_than_set_degenerates_to_exhaustive() {
        let ids: Vec<ImageId> = (1..=4).collect();
        let pairs = sequential_pairs(&ids, 100, None);
        assert_eq!(pairs.len(), exhaustive_pairs(&ids).len());
    }

    #[test]
    fn sequential_loop_closure_adds_earlier_candidates() {
        let ids: Vec<ImageId> = (1..=30).collect();
        let without = sequential_pairs(&ids, 1, None);
        let with = sequential_pairs(
            &ids,
            1,
            Some(LoopClosure {
                period: 10,
                num_images: 3,
            }),
        );
        assert!(with.len() > without.len());
        // image 21 (index 20) is a re-check image; the oldest image must be
        // among its sampled candidates
        assert!(with.contains(&(1, 21)));
    }

    #[test]
    fn spatial_skips_unlocated_images() {
        let locations = vec![
            (1, Some([0.0, 0.0, 0.0])),
            (2, Some([1.0, 0.0, 0.0])),
            (3, None),
        ];
        let pairs = spatial_pairs(&locations, 10, 100.0);
        assert_eq!(pairs, vec![(1, 2)]);
    }

    #[test]
    fn spatial_respects_max_distance() {
        let locations = vec![
            (1, Some([0.0, 0.0, 0.0])),
            (2, Some([1.0, 0.0, 0.0])),
            (3, Some([50.0, 0.0, 0.0])),
        ];
        let pairs = spatial_pairs(&locations, 10, 5.0);
        assert_eq!(pairs, vec![(1, 2)]);
    }

    #[test]
    fn spatial_respects_neighbor_cap() {
        let locations: Vec<(ImageId, Option<[f64; 3]>)> = (0..10)
            .map(|i| (i + 1, Some([i as f64, 0.0, 0.0])))
            .collect();
        let pairs = spatial_pairs(&locations, 1, 100.0);
        // each image contributes its single nearest neighbour; adjacent
        // images pick each other, so we get exactly the chain
        assert!(pairs.len() <= 9);
        assert!(pairs.contains(&(1, 2)));
    }

    #[test]
    fn transitive_proposes_two_hop_pairs() {
        let existing = vec![(1, 2), (2, 3)];
        let proposed = transitive_pairs(&existing, 1);
        assert_eq!(proposed, vec![(1, 3)]);
    }

    #[test]
    fn transitive_rounds_extend_the_chain() {
        let existing = vec![(1, 2), (2, 3), (3, 4)];
        let one_round = transitive_pairs(&existing, 1);
        assert!(one_round.contains(&(1, 3)));
        assert!(one_round.contains(&(2, 4)));
        assert!(!one_round.contains(&(1, 4)));

        let two_rounds = transitive_pairs(&existing, 2);
        assert!(two_rounds.contains(&(1, 4)));
    }

    #[test]
    fn transitive_never_reproposes_existing_pairs() {
        let existing = vec![(1, 2), (2, 3), (1, 3)];
        assert!(transitive_pairs(&existing, 3).is_empty());
    }

    struct FixedIndex(HashMap<ImageId, Vec<ImageId>>);

    impl VisualIndex for FixedIndex {
        fn query(&self, image: ImageId, top_k: usize) -> Vec<ImageId> {
            let mut out = self.0.get(&image).cloned().unwrap_or_default();
            out.truncate(top_k);
            out
        }
    }

    #[test]
    fn vocab_tree_pairs_come_from_the_index() {
        let index = FixedIndex(HashMap::from([
            (1, vec![3, 2]),
            (2, vec![1]),
            (3, vec![1]),
        ]));
        let pairs = vocab_tree_pairs(&[1, 2, 3], &index, 1);
        assert_eq!(pairs, vec![(1, 2), (1, 3)]);
    }
}
