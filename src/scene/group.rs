use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::ParticleRecord;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// The particle data of one loaded octant
#[derive(Debug)]
pub struct ParticleGroup {
    id: u64,
    page_id: i64,
    records: Vec<ParticleRecord>,
    epoch_jd: f64,
}

impl ParticleGroup {
    pub fn new(page_id: i64, records: Vec<ParticleRecord>, epoch_jd: f64) -> Self {
        Self {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            page_id,
            records,
            epoch_jd,
        }
    }

    /// Process-unique group id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> String {
        format!("stargroup-{}", self.id)
    }

    /// Page id of the octant the group belongs to
    pub fn page_id(&self) -> i64 {
        self.page_id
    }

    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    pub fn star_count(&self) -> usize {
        self.records.len()
    }

    pub fn epoch_jd(&self) -> f64 {
        self.epoch_jd
    }
}
