// Streaming octree loader
// Load/unload queues and a background worker keeping the resident star set in budget

pub mod error;
pub mod load_queue;
pub mod loader;
pub mod source;
pub mod unload_queue;
pub mod worker;

pub use error::StreamingErrorContext;
pub use load_queue::{LoadQueue, OfferOutcome};
pub use loader::OctreeLoader;
pub use source::{particle_file_name, FileOctantSource, MemoryOctantSource, OctantSource};
pub use unload_queue::UnloadQueue;
pub use worker::{
    LoaderStats, LoaderStatsSnapshot, StreamingContext, StreamingWorker, WorkerSignal, WorkerState,
};
