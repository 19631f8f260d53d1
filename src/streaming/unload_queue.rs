use std::collections::BTreeMap;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::octree::{LoadStatus, OctreeNode};

#[derive(Debug, Default)]
struct AccessOrder {
    order: BTreeMap<u64, OctreeNode>,
    stamps: FxHashMap<i64, u64>,
    next_stamp: u64,
}

impl AccessOrder {
    fn remove(&mut self, page_id: i64) -> bool {
        match self.stamps.remove(&page_id) {
            Some(stamp) => self.order.remove(&stamp).is_some(),
            None => false,
        }
    }
}

/// Resident octants ordered by last access, least recent at the head
///
/// Octants at or above the preload depth never enter the queue, so the
/// coarse levels of the tree stay resident.
#[derive(Debug)]
pub struct UnloadQueue {
    state: Mutex<AccessOrder>,
    preload_depth: u32,
}

impl UnloadQueue {
    pub fn new(preload_depth: u32) -> Self {
        Self {
            state: Mutex::new(AccessOrder::default()),
            preload_depth,
        }
    }

    pub fn preload_depth(&self) -> u32 {
        self.preload_depth
    }

    /// Mark `octant` as just accessed; returns whether it is now an eviction candidate
    pub fn touch(&self, octant: &OctreeNode) -> bool {
        let mut state = self.state.lock();
        state.remove(octant.page_id());
        if octant.depth() <= self.preload_depth || octant.status() != LoadStatus::Loaded {
            return false;
        }
        let stamp = state.next_stamp;
        state.next_stamp += 1;
        state.order.insert(stamp, octant.clone());
        state.stamps.insert(octant.page_id(), stamp);
        true
    }

    /// Remove and return the least recently touched octant
    pub fn evict_one(&self) -> Option<OctreeNode> {
        let mut state = self.state.lock();
        let (_, node) = state.order.pop_first()?;
        state.stamps.remove(&node.page_id());
        Some(node)
    }

    pub fn remove(&self, octant: &OctreeNode) -> bool {
        self.state.lock().remove(octant.page_id())
    }

    pub fn contains(&self, octant: &OctreeNode) -> bool {
        self.state.lock().stamps.contains_key(&octant.page_id())
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.order.clear();
        state.stamps.clear();
    }
}
