//! Bounded max-heap top-k selection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::Point;

#[derive(Debug)]
struct Candidate {
    distance: f64,
    seq: u64,
    point: Point,
}

// Larger distance is "greater", so the heap's top is the current worst.
// Equal distances fall back to arrival order: the later arrival is worse.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Keeps the `k` points nearest to a reference point seen so far.
///
/// Works on any source that yields points one at a time, so the same
/// selector serves the in-memory vector and the document cursor.
///
/// ```
/// use tessera_apps::points::{NearestSelector, Point};
///
/// let mut selector = NearestSelector::new(Point::new(0.0, 0.0), 1);
/// selector.push(Point::new(5.0, 5.0));
/// selector.push(Point::new(1.0, 1.0));
/// assert_eq!(selector.finish(), vec![Point::new(1.0, 1.0)]);
/// ```
#[derive(Debug)]
pub struct NearestSelector {
    from: Point,
    k: usize,
    seq: u64,
    heap: BinaryHeap<Candidate>,
}

impl NearestSelector {
    /// Creates a selector for the `k` points nearest to `from`.
    #[must_use]
    pub fn new(from: Point, k: usize) -> Self {
        Self {
            from,
            k,
            seq: 0,
            heap: BinaryHeap::with_capacity(k.saturating_add(1)),
        }
    }

    /// Offers a candidate, evicting the worst when more than `k` are held.
    pub fn push(&mut self, point: Point) {
        let distance = self.from.squared_distance(&point);
        self.heap.push(Candidate {
            distance,
            seq: self.seq,
            point,
        });
        self.seq += 1;
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    /// Drains the heap, nearest first.
    #[must_use]
    pub fn finish(mut self) -> Vec<Point> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(candidate) = self.heap.pop() {
            out.push(candidate.point);
        }
        out.reverse();
        out
    }
}

/// Selects the `k` points nearest to `from`, nearest first.
pub fn select_nearest<I>(from: Point, k: usize, points: I) -> Vec<Point>
where
    I: IntoIterator<Item = Point>,
{
    let mut selector = NearestSelector::new(from, k);
    for point in points {
        selector.push(point);
    }
    selector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_orders_nearest_first() {
        let points = vec![
            Point::new(5.0, 5.0),
            Point::new(1.0, 1.0),
            Point::new(3.0, 0.0),
        ];
        assert_eq!(
            select_nearest(Point::new(0.0, 0.0), 2, points),
            vec![Point::new(1.0, 1.0), Point::new(3.0, 0.0)]
        );
    }

    #[test]
    fn test_ties_keep_store_order() {
        let points = vec![
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(-1.0, 0.0),
        ];
        assert_eq!(
            select_nearest(Point::new(0.0, 0.0), 2, points),
            vec![Point::new(1.0, 0.0), Point::new(0.0, 1.0)]
        );
    }

    #[test]
    fn test_zero_k_selects_nothing() {
        assert!(select_nearest(Point::new(0.0, 0.0), 0, vec![Point::new(1.0, 1.0)]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_matches_full_sort(
            coords in prop::collection::vec((-100i32..100, -100i32..100), 0..40),
            k in 0usize..10,
        ) {
            let points: Vec<Point> = coords
                .iter()
                .map(|&(x, y)| Point::new(f64::from(x), f64::from(y)))
                .collect();
            let from = Point::new(0.0, 0.0);

            let mut sorted = points.clone();
            sorted.sort_by(|a, b| from.squared_distance(a).total_cmp(&from.squared_distance(b)));
            sorted.truncate(k);

            prop_assert_eq!(select_nearest(from, k, points), sorted);
        }
    }
}
