use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::codec::{BinaryCodec, BinaryVersion, ParticleRecord};
use crate::config::LoaderConfig;
use crate::constants::files::{PARTICLES_EXTENSION, PARTICLES_PREFIX};
use crate::error::StreamResult;

/// Supplier of the particle data of one octant
pub trait OctantSource: Send + Sync {
    /// `Ok(None)` when the octant has no data; not an error
    fn load_octant(&self, page_id: i64) -> StreamResult<Option<Vec<ParticleRecord>>>;
}

/// File name of the particle file of `page_id`
pub fn particle_file_name(page_id: i64) -> String {
    format!("{}{:06}.{}", PARTICLES_PREFIX, page_id, PARTICLES_EXTENSION)
}

/// Reads `particles_<page id>.bin` files through the memory-mapped codec
#[derive(Debug, Clone)]
pub struct FileOctantSource {
    particles_dir: PathBuf,
    codec: BinaryCodec,
    factor: f64,
}

impl FileOctantSource {
    pub fn new(particles_dir: impl Into<PathBuf>, codec: BinaryCodec, factor: f64) -> Self {
        Self {
            particles_dir: particles_dir.into(),
            codec,
            factor,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> StreamResult<Self> {
        let version = BinaryVersion::from_u32(config.data_version)?;
        let codec = BinaryCodec::for_version(version).with_distance_scale(config.distance_scale);
        Ok(Self::new(&config.particles_dir, codec, config.position_factor))
    }

    pub fn particles_dir(&self) -> &Path {
        &self.particles_dir
    }

    pub fn path_for(&self, page_id: i64) -> PathBuf {
        self.particles_dir.join(particle_file_name(page_id))
    }
}

impl OctantSource for FileOctantSource {
    fn load_octant(&self, page_id: i64) -> StreamResult<Option<Vec<ParticleRecord>>> {
        let path = self.path_for(page_id);
        if !path.is_file() {
            return Ok(None);
        }
        self.codec.read_all_mapped(&path, self.factor).map(Some)
    }
}

/// In-memory octant data, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryOctantSource {
    octants: RwLock<FxHashMap<i64, Vec<ParticleRecord>>>,
}

impl MemoryOctantSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, page_id: i64, records: Vec<ParticleRecord>) {
        self.octants.write().insert(page_id, records);
    }

    pub fn remove(&self, page_id: i64) -> Option<Vec<ParticleRecord>> {
        self.octants.write().remove(&page_id)
    }
}

impl OctantSource for MemoryOctantSource {
    fn load_octant(&self, page_id: i64) -> StreamResult<Option<Vec<ParticleRecord>>> {
        Ok(self.octants.read().get(&page_id).cloned())
    }
}
