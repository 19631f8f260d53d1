//! Octree metadata file
//!
//! ```text
//! i32 token            < 0: version and node count follow; otherwise the node count (version 0)
//! [i32 version]
//! [i32 node_count]
//! per node:
//!   i64 page_id
//!   centre x, y, z     f32 in version 0, f64 afterwards
//!   half sizes x, y, z
//!   i64 children[8]    -1 for an empty slot
//!   i32 depth
//!   i32 n_objects_rec
//!   i32 own_objects
//!   i32 child_count
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use glam::DVec3;
use memmap2::Mmap;
use rustc_hash::FxHashMap;

use crate::codec::{MappedSource, RecordSource};
use crate::constants::files::{METADATA_VERSION, METADATA_VERSION_TOKEN, NO_CHILD, OCTREE_CHILDREN};
use crate::error::{corrupted_metadata, StreamResult};
use crate::octree::{BoundingBox, OctreeNode};

/// Bytes per node entry: page id, two vectors, eight children, four counters
const NODE_SIZE_V0: usize = 8 + 2 * 3 * 4 + OCTREE_CHILDREN * 8 + 4 * 4;
const NODE_SIZE_V1: usize = 8 + 2 * 3 * 8 + OCTREE_CHILDREN * 8 + 4 * 4;

/// One node entry of the metadata file
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub page_id: i64,
    pub center: DVec3,
    pub half: DVec3,
    pub children: [i64; OCTREE_CHILDREN],
    pub depth: u32,
    pub n_objects_rec: i64,
    pub own_objects: i64,
    pub child_count: u32,
}

impl NodeRecord {
    fn from_node(node: &OctreeNode) -> Self {
        let ids = node.child_ids();
        Self {
            page_id: node.page_id(),
            center: node.bounds().center(),
            half: node.bounds().half,
            children: std::array::from_fn(|i| ids[i].unwrap_or(NO_CHILD)),
            depth: node.depth(),
            n_objects_rec: node.catalog_objects_rec(),
            own_objects: node.catalog_objects(),
            child_count: ids.iter().flatten().count() as u32,
        }
    }
}

/// Map the metadata file and build the node skeleton; returns the root
pub fn read_metadata_mapped(path: &Path) -> StreamResult<OctreeNode> {
    let file = File::open(path)?;
    // SAFETY: metadata is produced offline and is read-only while mapped
    let mmap = unsafe { Mmap::map(&file)? };
    let records = parse_records(&mmap)?;
    link_records(&records)
}

/// Parse node entries from a metadata buffer
pub fn parse_records(buf: &[u8]) -> StreamResult<Vec<NodeRecord>> {
    let mut src = MappedSource::new(buf);

    let token = src.read_i32()?;
    let (version, count) = if token < 0 {
        (src.read_i32()?, src.read_i32()?)
    } else {
        (0, token)
    };
    if count < 0 {
        return Err(corrupted_metadata(format!("negative node count {}", count)));
    }
    let node_size = if version == 0 {
        NODE_SIZE_V0
    } else {
        NODE_SIZE_V1
    };
    if count as usize > src.remaining() / node_size {
        return Err(corrupted_metadata(format!(
            "{} nodes declared but only {} bytes follow the header",
            count,
            src.remaining()
        )));
    }

    let read_vec = |src: &mut MappedSource<'_>| -> std::io::Result<DVec3> {
        if version == 0 {
            Ok(DVec3::new(
                src.read_f32()? as f64,
                src.read_f32()? as f64,
                src.read_f32()? as f64,
            ))
        } else {
            Ok(DVec3::new(src.read_f64()?, src.read_f64()?, src.read_f64()?))
        }
    };

    let mut records = Vec::with_capacity(count as usize);
    for n in 0..count {
        let page_id = src.read_i64()?;
        let center = read_vec(&mut src)?;
        let half = read_vec(&mut src)?;
        let mut children = [NO_CHILD; OCTREE_CHILDREN];
        for slot in children.iter_mut() {
            *slot = src.read_i64()?;
        }
        let depth = src.read_i32()?;
        let n_objects_rec = src.read_i32()?;
        let own_objects = src.read_i32()?;
        let child_count = src.read_i32()?;
        if depth < 0 || child_count < 0 {
            return Err(corrupted_metadata(format!(
                "node #{} (page {}) has depth {} and {} children",
                n, page_id, depth, child_count
            )));
        }

        records.push(NodeRecord {
            page_id,
            center,
            half,
            children,
            depth: depth as u32,
            n_objects_rec: n_objects_rec as i64,
            own_objects: own_objects as i64,
            child_count: child_count as u32,
        });
    }

    if !src.is_exhausted() {
        log::warn!(
            "Metadata has {} trailing bytes after {} nodes",
            src.remaining(),
            count
        );
    }
    Ok(records)
}

/// Create the nodes and resolve parent/child links
pub fn link_records(records: &[NodeRecord]) -> StreamResult<OctreeNode> {
    let mut nodes: FxHashMap<i64, OctreeNode> = FxHashMap::default();
    let mut parents = Vec::with_capacity(records.len());
    for record in records {
        let node = OctreeNode::new(
            record.page_id,
            record.depth,
            BoundingBox::from_center_half(record.center, record.half),
            record.n_objects_rec,
            record.own_objects,
        );
        if nodes.insert(record.page_id, node.clone()).is_some() {
            return Err(corrupted_metadata(format!("duplicate page id {}", record.page_id)));
        }
        parents.push(node);
    }

    for (record, parent) in records.iter().zip(&parents) {
        let mut children: [Option<OctreeNode>; OCTREE_CHILDREN] = std::array::from_fn(|_| None);
        for (slot, &child_id) in record.children.iter().enumerate() {
            if child_id == NO_CHILD {
                continue;
            }
            let child = nodes.get(&child_id).ok_or_else(|| {
                corrupted_metadata(format!(
                    "page {} references missing child {}",
                    record.page_id, child_id
                ))
            })?;
            if child.depth() != record.depth + 1 {
                return Err(corrupted_metadata(format!(
                    "child {} at depth {} under page {} at depth {}",
                    child_id,
                    child.depth(),
                    record.page_id,
                    record.depth
                )));
            }
            children[slot] = Some(child.clone());
        }
        if !parent.set_children(children) {
            return Err(corrupted_metadata(format!(
                "page {} is linked more than once",
                record.page_id
            )));
        }
    }

    let mut roots = nodes.values().filter(|n| n.is_root());
    let root = roots
        .next()
        .ok_or_else(|| corrupted_metadata("no root node"))?
        .clone();
    if roots.next().is_some() {
        return Err(corrupted_metadata("more than one root node"));
    }
    if root.depth() != 0 {
        return Err(corrupted_metadata(format!(
            "root page {} has depth {}",
            root.page_id(),
            root.depth()
        )));
    }
    Ok(root)
}

/// Write the tree under `root` in the current metadata version (breadth first)
pub fn write_metadata<W: Write>(root: &OctreeNode, out: &mut W) -> StreamResult<()> {
    let mut records = Vec::new();
    let mut frontier = vec![root.clone()];
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for node in &frontier {
            records.push(NodeRecord::from_node(node));
            next.extend(node.children().cloned());
        }
        frontier = next;
    }
    write_records(&records, out)
}

/// Write raw node entries in the current metadata version
pub fn write_records<W: Write>(records: &[NodeRecord], out: &mut W) -> StreamResult<()> {
    out.write_i32::<BigEndian>(METADATA_VERSION_TOKEN)?;
    out.write_i32::<BigEndian>(METADATA_VERSION)?;
    out.write_i32::<BigEndian>(records.len() as i32)?;
    for record in records {
        out.write_i64::<BigEndian>(record.page_id)?;
        for v in [record.center, record.half] {
            out.write_f64::<BigEndian>(v.x)?;
            out.write_f64::<BigEndian>(v.y)?;
            out.write_f64::<BigEndian>(v.z)?;
        }
        for child in record.children {
            out.write_i64::<BigEndian>(child)?;
        }
        out.write_i32::<BigEndian>(record.depth as i32)?;
        out.write_i32::<BigEndian>(record.n_objects_rec as i32)?;
        out.write_i32::<BigEndian>(record.own_objects as i32)?;
        out.write_i32::<BigEndian>(record.child_count as i32)?;
    }
    out.flush()?;
    Ok(())
}

/// Write a metadata file for the tree under `root`
pub fn write_metadata_file(root: &OctreeNode, path: &Path) -> StreamResult<()> {
    let mut out = std::io::BufWriter::new(File::create(path)?);
    write_metadata(root, &mut out)
}
