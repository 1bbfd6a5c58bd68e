//! Small from-scratch KD-tree over fixed 12-dimensional feature vectors.
//!
//! No ANN crate in the pack fits this shape cleanly: `hnsw`-style crates
//! target high-dimensional approximate search, not exact kNN over a fixed
//! 12-float key. Structured like the teacher's `memory::indexer` — an
//! incrementally updated index keyed by pattern id.

use super::feature::FEATURE_DIMS;

struct Node {
    point: [f64; FEATURE_DIMS],
    id: String,
    axis: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

/// KD-tree plus a side count so callers can assert `tree.len() == id_map.len()`.
#[derive(Default)]
pub struct KdTree {
    root: Option<Box<Node>>,
    len: usize,
}

fn sq_dist(a: &[f64; FEATURE_DIMS], b: &[f64; FEATURE_DIMS]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl KdTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, id: String, point: [f64; FEATURE_DIMS]) {
        Self::insert_node(&mut self.root, id, point, 0);
        self.len += 1;
    }

    fn insert_node(slot: &mut Option<Box<Node>>, id: String, point: [f64; FEATURE_DIMS], depth: usize) {
        match slot {
            None => {
                let axis = depth % FEATURE_DIMS;
                *slot = Some(Box::new(Node {
                    point,
                    id,
                    axis,
                    left: None,
                    right: None,
                }));
            }
            Some(node) => {
                let next_depth = depth + 1;
                if point[node.axis] < node.point[node.axis] {
                    Self::insert_node(&mut node.left, id, point, next_depth);
                } else {
                    Self::insert_node(&mut node.right, id, point, next_depth);
                }
            }
        }
    }

    /// Full rebuild from a balanced median split, called after evictions
    /// cross the 10% threshold (§4.3).
    pub fn rebuild(points: Vec<(String, [f64; FEATURE_DIMS])>) -> Self {
        let len = points.len();
        let root = Self::build_balanced(points, 0);
        Self { root, len }
    }

    fn build_balanced(mut points: Vec<(String, [f64; FEATURE_DIMS])>, depth: usize) -> Option<Box<Node>> {
        if points.is_empty() {
            return None;
        }
        let axis = depth % FEATURE_DIMS;
        points.sort_by(|a, b| a.1[axis].partial_cmp(&b.1[axis]).unwrap_or(std::cmp::Ordering::Equal));
        let mid = points.len() / 2;
        let (id, point) = points[mid].clone();
        let right_points = points.split_off(mid + 1);
        let mut left_points = points;
        left_points.truncate(mid);

        Some(Box::new(Node {
            point,
            id,
            axis,
            left: Self::build_balanced(left_points, depth + 1),
            right: Self::build_balanced(right_points, depth + 1),
        }))
    }

    /// Best-bin-first kNN: descends to the closest leaf first, then
    /// backtracks into siblings only while their splitting-plane distance
    /// could still beat the current worst candidate.
    pub fn knn(&self, target: &[f64; FEATURE_DIMS], k: usize) -> Vec<(String, f64)> {
        let mut best: Vec<(String, f64)> = Vec::with_capacity(k + 1);
        Self::search(&self.root, target, k, &mut best);
        best.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        best
    }

    fn search(node: &Option<Box<Node>>, target: &[f64; FEATURE_DIMS], k: usize, best: &mut Vec<(String, f64)>) {
        let Some(node) = node else { return };
        let d = sq_dist(target, &node.point);

        if best.len() < k {
            best.push((node.id.clone(), d));
        } else if let Some(worst_idx) = best
            .iter()
            .enumerate()
            .max_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
        {
            if d < best[worst_idx].1 {
                best[worst_idx] = (node.id.clone(), d);
            }
        }

        let diff = target[node.axis] - node.point[node.axis];
        let (near, far) = if diff < 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        Self::search(near, target, k, best);

        let worst = best
            .iter()
            .map(|(_, dist)| *dist)
            .fold(f64::NEG_INFINITY, f64::max);
        if best.len() < k || diff * diff < worst {
            Self::search(far, target, k, best);
        }
    }
}
