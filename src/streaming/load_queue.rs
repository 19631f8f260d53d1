use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::octree::{LoadStatus, OctreeNode};

/// Result of offering an octant to the load queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Admitted; `evicted` names the page pushed out to make room
    Queued { evicted: Option<i64> },
    /// Already waiting in the queue
    AlreadyQueued,
    /// Not `NotLoaded` (being loaded or resident)
    Rejected(LoadStatus),
    /// Loading is paused
    Paused,
}

impl OfferOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, OfferOutcome::Queued { .. })
    }
}

/// Entries are keyed by (depth, insertion sequence)
type QueueKey = (u32, u64);

#[derive(Debug, Default)]
struct QueueState {
    entries: BTreeMap<QueueKey, OctreeNode>,
    keys: FxHashMap<i64, QueueKey>,
    next_seq: u64,
    last_clear: Option<Instant>,
}

impl QueueState {
    fn remove_last(&mut self) -> Option<OctreeNode> {
        let (_, node) = self.entries.pop_last()?;
        self.keys.remove(&node.page_id());
        Some(node)
    }

    fn drain_all(&mut self) -> usize {
        let n = self.entries.len();
        for node in self.entries.values() {
            node.set_status(LoadStatus::NotLoaded);
        }
        self.entries.clear();
        self.keys.clear();
        n
    }
}

/// Bounded queue of octants waiting to be loaded, shallowest first
///
/// Ties between equal depths are served in insertion order. An octant is in
/// the queue at most once; while queued its status is `Queued`.
#[derive(Debug)]
pub struct LoadQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    min_clear_interval: Duration,
}

impl LoadQueue {
    pub fn new(capacity: usize, min_clear_interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
            min_clear_interval,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue `octant` for loading
    ///
    /// When full, the deepest queued octant is dropped back to `NotLoaded`
    /// before the new one is admitted.
    pub fn offer(&self, octant: &OctreeNode) -> OfferOutcome {
        let mut state = self.state.lock();

        if state.keys.contains_key(&octant.page_id()) {
            return OfferOutcome::AlreadyQueued;
        }
        let status = octant.status();
        if status != LoadStatus::NotLoaded {
            return OfferOutcome::Rejected(status);
        }

        let mut evicted = None;
        if state.entries.len() >= self.capacity {
            if let Some(out) = state.remove_last() {
                out.set_status(LoadStatus::NotLoaded);
                evicted = Some(out.page_id());
            }
        }

        let key = (octant.depth(), state.next_seq);
        state.next_seq += 1;
        state.entries.insert(key, octant.clone());
        state.keys.insert(octant.page_id(), key);
        octant.set_status(LoadStatus::Queued);

        OfferOutcome::Queued { evicted }
    }

    /// Take the most urgent octant; it keeps its `Queued` status
    pub fn poll(&self) -> Option<OctreeNode> {
        let mut state = self.state.lock();
        let (_, node) = state.entries.pop_first()?;
        state.keys.remove(&node.page_id());
        Some(node)
    }

    /// Take up to `max` octants in priority order
    pub fn poll_batch(&self, max: usize) -> Vec<OctreeNode> {
        let mut state = self.state.lock();
        let mut batch = Vec::with_capacity(max.min(state.entries.len()));
        while batch.len() < max {
            let Some((_, node)) = state.entries.pop_first() else {
                break;
            };
            state.keys.remove(&node.page_id());
            batch.push(node);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn contains(&self, octant: &OctreeNode) -> bool {
        self.state.lock().keys.contains_key(&octant.page_id())
    }

    /// Reset every queued octant to `NotLoaded` and empty the queue
    ///
    /// Returns `None` without touching the queue if the previous effective
    /// clear happened less than the minimum interval ago.
    pub fn clear(&self) -> Option<usize> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if let Some(last) = state.last_clear {
            if now.duration_since(last) < self.min_clear_interval {
                return None;
            }
        }
        state.last_clear = Some(now);
        Some(state.drain_all())
    }

    /// Clear regardless of the rate limit
    pub fn force_clear(&self) -> usize {
        let mut state = self.state.lock();
        state.last_clear = Some(Instant::now());
        state.drain_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::BoundingBox;
    use glam::DVec3;

    fn octant(page_id: i64, depth: u32) -> OctreeNode {
        OctreeNode::new(
            page_id,
            depth,
            BoundingBox::from_center_half(DVec3::ZERO, DVec3::ONE),
            1,
            1,
        )
    }

    #[test]
    fn test_depth_priority_with_insertion_ties() {
        let queue = LoadQueue::new(10, Duration::ZERO);
        let octants: Vec<OctreeNode> = [3, 1, 2, 1]
            .iter()
            .enumerate()
            .map(|(i, &d)| octant(i as i64, d))
            .collect();
        for o in &octants {
            assert!(queue.offer(o).is_queued());
            assert_eq!(o.status(), LoadStatus::Queued);
        }

        let polled: Vec<(u32, i64)> = std::iter::from_fn(|| queue.poll())
            .map(|o| (o.depth(), o.page_id()))
            .collect();
        assert_eq!(polled, vec![(1, 1), (1, 3), (2, 2), (3, 0)]);
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_requeue_is_idempotent() {
        let queue = LoadQueue::new(10, Duration::ZERO);
        let o = octant(7, 2);
        assert!(queue.offer(&o).is_queued());
        assert_eq!(queue.offer(&o), OfferOutcome::AlreadyQueued);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_deepest() {
        let queue = LoadQueue::new(3, Duration::ZERO);
        let deep = octant(1, 5);
        let mid = octant(2, 3);
        let shallow = octant(3, 1);
        for o in [&deep, &mid, &shallow] {
            queue.offer(o);
        }

        let newcomer = octant(4, 2);
        assert_eq!(queue.offer(&newcomer), OfferOutcome::Queued { evicted: Some(1) });
        assert_eq!(deep.status(), LoadStatus::NotLoaded);
        assert!(!queue.contains(&deep));
        assert_eq!(newcomer.status(), LoadStatus::Queued);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_only_unloaded_octants_admitted() {
        let queue = LoadQueue::new(3, Duration::ZERO);
        let o = octant(1, 2);
        o.set_status(LoadStatus::Loaded);
        assert_eq!(queue.offer(&o), OfferOutcome::Rejected(LoadStatus::Loaded));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_is_rate_limited() {
        let queue = LoadQueue::new(10, Duration::from_secs(60));
        let a = octant(1, 1);
        let b = octant(2, 1);
        queue.offer(&a);
        assert_eq!(queue.clear(), Some(1));
        assert_eq!(a.status(), LoadStatus::NotLoaded);

        queue.offer(&b);
        assert_eq!(queue.clear(), None);
        assert_eq!(b.status(), LoadStatus::Queued);
        assert_eq!(queue.force_clear(), 1);
        assert_eq!(b.status(), LoadStatus::NotLoaded);
    }

    #[test]
    fn test_poll_batch_respects_max() {
        let queue = LoadQueue::new(10, Duration::ZERO);
        let octants: Vec<OctreeNode> = (0..7).map(|i| octant(i, 1)).collect();
        for o in &octants {
            queue.offer(o);
        }
        let batch = queue.poll_batch(5);
        assert_eq!(batch.iter().map(OctreeNode::page_id).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.len(), 2);
        assert!(batch.iter().all(|o| o.status() == LoadStatus::Queued));
    }
}
