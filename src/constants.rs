// Starfield Streamer Constants - SINGLE SOURCE OF TRUTH
//
// This file contains the constants shared by the codec, the octree index and
// the streaming loader. Runtime-tunable values only provide their defaults
// here; `LoaderConfig` carries the effective values.

/// Particle record layout
pub mod record {
    /// Double slots held by a record: position (3) and velocity (3)
    pub const STAR_SIZE_D: usize = 6;
    /// Float slots held by a record
    pub const STAR_SIZE_F: usize = 8;

    /// Number of double slots that receive the positional factor
    pub const POSITION_SLOTS: usize = 3;

    // Float slot indices
    pub const I_FMUALPHA: usize = 0;
    pub const I_FMUDELTA: usize = 1;
    pub const I_FRADVEL: usize = 2;
    pub const I_FAPPMAG: usize = 3;
    pub const I_FABSMAG: usize = 4;
    pub const I_FCOL: usize = 5;
    pub const I_FSIZE: usize = 6;
    pub const I_FHIP: usize = 7;

    /// Separator used to concatenate the name list on disk
    pub const NAME_SEPARATOR: char = '|';

    /// Hipparcos number of a star without cross-match
    pub const NO_HIP: i32 = -1;

    /// Padding integers written in place of the retired extended ids
    pub const EXTENDED_ID_SLOTS: usize = 3;
    pub const EXTENDED_ID_FILL: i32 = -1;
}

/// Units
pub mod units {
    /// Global distance scale applied to positions, velocities and sizes on read
    pub const DISTANCE_SCALE_FACTOR: f64 = 1.0;

    /// Julian date of the J2015.5 epoch
    pub const JD_J2015_5: f64 = 2_457_206.375;
}

/// Streaming loader defaults
pub mod loader {
    /// Data is preloaded at startup down to this octree depth
    pub const PRELOAD_DEPTH: u32 = 3;

    /// Default load queue size in octants
    pub const LOAD_QUEUE_MAX_SIZE: usize = 100;

    /// Minimum time between two effective queue clears
    pub const MIN_QUEUE_CLEAR_MS: u64 = 2000;

    /// Maximum number of octants loaded per batch
    pub const MAX_LOAD_CHUNK: usize = 5;

    /// Default resident star budget
    pub const MAX_LOADED_STARS: i64 = 10_000_000;

    /// Eviction stops once resident stars fall to this share of the budget
    pub const UNLOAD_HYSTERESIS: f64 = 0.85;

    /// Interval at which an idle worker re-checks the queue on its own (0 disables)
    pub const AUTO_FLUSH_MS: u64 = 1000;

    /// Loaded page ids buffered before an info line is emitted
    pub const MAX_LOADED_IDS: usize = 50;

    /// Name of the worker thread
    pub const WORKER_THREAD_NAME: &str = "octree-loader";
}

/// On-disk layout
pub mod files {
    /// Per-octant particle file prefix; the page id is zero padded to six digits
    pub const PARTICLES_PREFIX: &str = "particles_";
    pub const PARTICLES_EXTENSION: &str = "bin";

    /// Header token announcing a versioned metadata file
    pub const METADATA_VERSION_TOKEN: i32 = -1;
    /// Version written by the metadata writer
    pub const METADATA_VERSION: i32 = 1;
    /// Children slots per octree node
    pub const OCTREE_CHILDREN: usize = 8;
    /// Marker for an empty child slot
    pub const NO_CHILD: i64 = -1;
}
