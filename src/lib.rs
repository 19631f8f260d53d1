//! Streaming loader for octree-partitioned star catalogs
//!
//! The catalog is an octree whose skeleton (`metadata.bin`) is read once at
//! startup, while each octant's stars live in their own particle file. A
//! background worker loads the octants the camera asks for, shallowest
//! first, and evicts the least recently observed ones once the resident star
//! count exceeds its budget. Scene registration is handed to the main thread
//! through [`scene::MainThreadDispatcher`].

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod octree;
pub mod scene;
pub mod streaming;

pub use codec::{BinaryCodec, BinaryLayout, BinaryVersion, ParticleRecord};
pub use config::LoaderConfig;
pub use error::{StreamError, StreamResult};
pub use octree::{BoundingBox, LoadStatus, OctreeIndex, OctreeNode};
pub use scene::{CountingSceneIndex, MainThreadDispatcher, ParticleGroup, SceneIndex};
pub use streaming::{
    FileOctantSource, MemoryOctantSource, OctantSource, OctreeLoader, OfferOutcome, WorkerState,
};
