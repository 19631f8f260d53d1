use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::constants::files::OCTREE_CHILDREN;
use crate::octree::BoundingBox;
use crate::scene::ParticleGroup;

/// Load status of an octant
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    NotLoaded = 0,
    Queued = 1,
    Loaded = 2,
}

impl LoadStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadStatus::Queued,
            2 => LoadStatus::Loaded,
            _ => LoadStatus::NotLoaded,
        }
    }
}

/// Data attached to an octant while it is resident
#[derive(Debug, Default)]
pub struct NodePayload {
    pub objects: Vec<Arc<ParticleGroup>>,
}

struct NodeInner {
    page_id: i64,
    depth: u32,
    bounds: BoundingBox,

    // Counts from the metadata file
    catalog_objects: i64,
    catalog_objects_rec: i64,

    parent: OnceLock<Weak<NodeInner>>,
    children: OnceLock<[Option<OctreeNode>; OCTREE_CHILDREN]>,

    status: AtomicU8,
    num_objects: AtomicI64,
    num_objects_rec: AtomicI64,
    payload: Mutex<NodePayload>,
}

/// Shared handle to one octant
///
/// The skeleton (ids, bounds, links) is fixed once the tree is built; only
/// the status, live counts and payload change afterwards.
#[derive(Clone)]
pub struct OctreeNode(Arc<NodeInner>);

impl OctreeNode {
    pub fn new(
        page_id: i64,
        depth: u32,
        bounds: BoundingBox,
        catalog_objects_rec: i64,
        catalog_objects: i64,
    ) -> Self {
        Self(Arc::new(NodeInner {
            page_id,
            depth,
            bounds,
            catalog_objects,
            catalog_objects_rec,
            parent: OnceLock::new(),
            children: OnceLock::new(),
            status: AtomicU8::new(LoadStatus::NotLoaded as u8),
            num_objects: AtomicI64::new(0),
            num_objects_rec: AtomicI64::new(0),
            payload: Mutex::new(NodePayload::default()),
        }))
    }

    /// Link `children` under this node; only the first call has an effect
    pub fn set_children(&self, children: [Option<OctreeNode>; OCTREE_CHILDREN]) -> bool {
        for child in children.iter().flatten() {
            if child.0.parent.set(Arc::downgrade(&self.0)).is_err() {
                return false;
            }
        }
        self.0.children.set(children).is_ok()
    }

    pub fn page_id(&self) -> i64 {
        self.0.page_id
    }

    pub fn depth(&self) -> u32 {
        self.0.depth
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.0.bounds
    }

    pub fn catalog_objects(&self) -> i64 {
        self.0.catalog_objects
    }

    pub fn catalog_objects_rec(&self) -> i64 {
        self.0.catalog_objects_rec
    }

    pub fn parent(&self) -> Option<OctreeNode> {
        self.0.parent.get().and_then(Weak::upgrade).map(OctreeNode)
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.get().is_none()
    }

    pub fn child(&self, index: usize) -> Option<&OctreeNode> {
        self.0.children.get().and_then(|c| c.get(index)).and_then(Option::as_ref)
    }

    pub fn children(&self) -> impl Iterator<Item = &OctreeNode> {
        self.0.children.get().into_iter().flat_map(|c| c.iter().flatten())
    }

    /// Child page ids by slot, `None` for empty slots
    pub fn child_ids(&self) -> [Option<i64>; OCTREE_CHILDREN] {
        std::array::from_fn(|i| self.child(i).map(OctreeNode::page_id))
    }

    pub fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    pub fn status(&self) -> LoadStatus {
        LoadStatus::from_u8(self.0.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: LoadStatus) {
        self.0.status.store(status as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the status was something else
    pub fn transition(&self, from: LoadStatus, to: LoadStatus) -> bool {
        self.0
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The octant lock; attach and detach happen under it
    pub fn lock(&self) -> MutexGuard<'_, NodePayload> {
        self.0.payload.lock()
    }

    /// Live objects in this node
    pub fn num_objects(&self) -> i64 {
        self.0.num_objects.load(Ordering::Acquire)
    }

    /// Live objects in this node and all descendants
    pub fn num_objects_rec(&self) -> i64 {
        self.0.num_objects_rec.load(Ordering::Acquire)
    }

    /// Apply a change of `delta` live objects to this node and its ancestors
    pub fn touch(&self, delta: i64) {
        if delta == 0 {
            return;
        }
        self.0.num_objects.fetch_add(delta, Ordering::AcqRel);
        self.0.num_objects_rec.fetch_add(delta, Ordering::AcqRel);
        let mut ancestor = self.parent();
        while let Some(node) = ancestor {
            node.0.num_objects_rec.fetch_add(delta, Ordering::AcqRel);
            ancestor = node.parent();
        }
    }

    /// Attach a loaded group and mark the octant `Loaded`; returns its star count
    pub fn attach(&self, group: Arc<ParticleGroup>) -> usize {
        let stars = group.star_count();
        let mut payload = self.lock();
        payload.objects.push(group);
        self.set_status(LoadStatus::Loaded);
        self.touch(stars as i64);
        stars
    }

    /// Detach every group and mark the octant `NotLoaded`
    pub fn detach_all(&self) -> Vec<Arc<ParticleGroup>> {
        let mut payload = self.lock();
        let objects = std::mem::take(&mut payload.objects);
        let stars: usize = objects.iter().map(|g| g.star_count()).sum();
        self.set_status(LoadStatus::NotLoaded);
        self.touch(-(stars as i64));
        objects
    }

    /// Stars currently attached to this node
    pub fn count_objects(&self) -> usize {
        self.lock().objects.iter().map(|g| g.star_count()).sum()
    }

    pub fn object_groups(&self) -> usize {
        self.lock().objects.len()
    }

    /// Number of nodes below this one
    pub fn count_descendants(&self) -> usize {
        self.children().map(|c| 1 + c.count_descendants()).sum()
    }

    /// Recount live objects from the payloads, bottom-up; returns the recursive total
    pub fn update_numbers(&self) -> i64 {
        let own = self.count_objects() as i64;
        let below: i64 = self.children().map(OctreeNode::update_numbers).sum();
        self.0.num_objects.store(own, Ordering::Release);
        self.0.num_objects_rec.store(own + below, Ordering::Release);
        own + below
    }

    pub fn ptr_eq(&self, other: &OctreeNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for OctreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for OctreeNode {}

impl fmt::Debug for OctreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctreeNode")
            .field("page_id", &self.page_id())
            .field("depth", &self.depth())
            .field("status", &self.status())
            .field("num_objects_rec", &self.num_objects_rec())
            .finish()
    }
}
