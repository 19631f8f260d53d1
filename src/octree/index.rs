use std::path::Path;

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::error::{corrupted_metadata, StreamResult};
use crate::octree::metadata::read_metadata_mapped;
use crate::octree::{LoadStatus, OctreeNode};

/// Spatial index over the catalog octants
///
/// Built once at startup; afterwards only node payloads and statuses change.
#[derive(Debug)]
pub struct OctreeIndex {
    root: OctreeNode,
    nodes: FxHashMap<i64, OctreeNode>,
    max_depth: u32,
}

impl OctreeIndex {
    /// Index the tree hanging from `root`
    pub fn from_root(root: OctreeNode) -> StreamResult<Self> {
        if root.depth() != 0 || !root.is_root() {
            return Err(corrupted_metadata(format!(
                "page {} is not a root (depth {})",
                root.page_id(),
                root.depth()
            )));
        }

        let mut nodes = FxHashMap::default();
        let mut max_depth = 0;
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            max_depth = max_depth.max(node.depth());
            stack.extend(node.children().cloned());
            let page_id = node.page_id();
            if nodes.insert(page_id, node).is_some() {
                return Err(corrupted_metadata(format!("duplicate page id {}", page_id)));
            }
        }

        Ok(Self { root, nodes, max_depth })
    }

    /// Read the metadata file and index its tree
    pub fn build_from_metadata(path: &Path) -> StreamResult<Self> {
        let root = read_metadata_mapped(path)?;
        let index = Self::from_root(root)?;
        log::info!(
            "{} octree nodes loaded from {} (max depth {})",
            index.len(),
            path.display(),
            index.max_depth
        );
        Ok(index)
    }

    pub fn root(&self) -> &OctreeNode {
        &self.root
    }

    pub fn get(&self, page_id: i64) -> Option<&OctreeNode> {
        self.nodes.get(&page_id)
    }

    /// Total number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn iter(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.values()
    }

    /// Octants from the root down to the deepest one containing `position`,
    /// stopping at `max_depth`. Empty when the root does not contain it.
    pub fn locate(&self, position: DVec3, max_depth: u32) -> Vec<OctreeNode> {
        let mut path = Vec::new();
        if !self.root.bounds().contains(position) {
            return path;
        }

        let mut current = self.root.clone();
        loop {
            path.push(current.clone());
            if current.depth() >= max_depth {
                break;
            }
            let slot = current.bounds().child_index(position);
            match current.child(slot) {
                Some(child) if child.bounds().contains(position) => current = child.clone(),
                _ => break,
            }
        }
        path
    }

    /// Nodes below the root
    pub fn count_descendants(&self) -> usize {
        self.root.count_descendants()
    }

    pub fn mark_status(&self, node: &OctreeNode, status: LoadStatus) {
        node.set_status(status);
    }

    /// Nodes at `depth`, breadth-first in child slot order
    pub fn nodes_at_depth(&self, depth: u32) -> Vec<OctreeNode> {
        let mut level = vec![self.root.clone()];
        for _ in 0..depth {
            level = level.iter().flat_map(|n| n.children().cloned()).collect();
            if level.is_empty() {
                break;
            }
        }
        level
    }

    /// Octants currently in `status`
    pub fn count_with_status(&self, status: LoadStatus) -> usize {
        self.nodes.values().filter(|n| n.status() == status).count()
    }

    /// Full recount of live objects; returns the total under the root
    pub fn update_numbers(&self) -> i64 {
        self.root.update_numbers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::BoundingBox;

    /// Root with eight children and one grandchild under slot 0
    fn tree() -> OctreeIndex {
        let bounds = BoundingBox::from_center_half(DVec3::ZERO, DVec3::splat(8.0));
        let root = OctreeNode::new(0, 0, bounds, 0, 0);
        let children: [Option<OctreeNode>; 8] = std::array::from_fn(|i| {
            Some(OctreeNode::new(1 + i as i64, 1, bounds.child_box(i), 0, 0))
        });
        let first = children[0].clone().expect("slot 0");
        root.set_children(children);
        let grandchild = OctreeNode::new(100, 2, first.bounds().child_box(7), 0, 0);
        first.set_children(std::array::from_fn(|i| (i == 7).then(|| grandchild.clone())));
        OctreeIndex::from_root(root).expect("Failed to index tree")
    }

    #[test]
    fn test_index_counts() {
        let index = tree();
        assert_eq!(index.len(), 10);
        assert_eq!(index.count_descendants(), 9);
        assert_eq!(index.max_depth(), 2);
        assert_eq!(index.nodes_at_depth(1).len(), 8);
        assert_eq!(
            index.nodes_at_depth(1).iter().map(OctreeNode::page_id).collect::<Vec<_>>(),
            (1..=8).collect::<Vec<_>>()
        );
        assert_eq!(index.count_with_status(LoadStatus::NotLoaded), 10);
    }

    #[test]
    fn test_locate_descends_to_max_depth() {
        let index = tree();
        let p = DVec3::splat(-1.0);

        let path = index.locate(p, 5);
        let ids: Vec<i64> = path.iter().map(OctreeNode::page_id).collect();
        assert_eq!(ids, vec![0, 1, 100]);

        let shallow = index.locate(p, 1);
        assert_eq!(shallow.len(), 2);

        assert!(index.locate(DVec3::splat(100.0), 5).is_empty());

        // Upper octant has no grandchildren
        let ids: Vec<i64> = index
            .locate(DVec3::splat(3.0), 5)
            .iter()
            .map(OctreeNode::page_id)
            .collect();
        assert_eq!(ids, vec![0, 8]);
    }

    #[test]
    fn test_mark_status() {
        let index = tree();
        let node = index.get(100).expect("grandchild").clone();
        index.mark_status(&node, LoadStatus::Queued);
        assert_eq!(index.count_with_status(LoadStatus::Queued), 1);
    }
}
