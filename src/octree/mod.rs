// Octree index of the star catalog
// Node skeleton read once from the metadata file, payloads streamed in and out

pub mod aabb;
pub mod index;
pub mod metadata;
pub mod node;

pub use aabb::BoundingBox;
pub use index::OctreeIndex;
pub use metadata::{read_metadata_mapped, write_metadata_file, NodeRecord};
pub use node::{LoadStatus, NodePayload, OctreeNode};
