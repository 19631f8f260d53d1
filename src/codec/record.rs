use glam::DVec3;

use crate::constants::record::{
    I_FABSMAG, I_FAPPMAG, I_FCOL, I_FHIP, I_FMUALPHA, I_FMUDELTA, I_FRADVEL, I_FSIZE,
    NAME_SEPARATOR, STAR_SIZE_D, STAR_SIZE_F,
};

/// One star as stored in a particle file
///
/// Double slots hold position and velocity, float slots hold proper motions,
/// photometry, size and the Hipparcos cross-match. Records are immutable once
/// built.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleRecord {
    data_d: [f64; STAR_SIZE_D],
    data_f: [f32; STAR_SIZE_F],
    id: i64,
    names: Vec<String>,
}

impl ParticleRecord {
    pub fn new(
        data_d: [f64; STAR_SIZE_D],
        data_f: [f32; STAR_SIZE_F],
        id: i64,
        names: Vec<String>,
    ) -> Self {
        Self { data_d, data_f, id, names }
    }

    /// Build a record from named fields
    #[allow(clippy::too_many_arguments)]
    pub fn star(
        position: DVec3,
        velocity: DVec3,
        proper_motion: (f32, f32, f32),
        magnitudes: (f32, f32),
        color: f32,
        size: f32,
        hip: i32,
        id: i64,
        names: Vec<String>,
    ) -> Self {
        let mut data_f = [0.0f32; STAR_SIZE_F];
        data_f[I_FMUALPHA] = proper_motion.0;
        data_f[I_FMUDELTA] = proper_motion.1;
        data_f[I_FRADVEL] = proper_motion.2;
        data_f[I_FAPPMAG] = magnitudes.0;
        data_f[I_FABSMAG] = magnitudes.1;
        data_f[I_FCOL] = color;
        data_f[I_FSIZE] = size;
        data_f[I_FHIP] = hip as f32;

        Self {
            data_d: [
                position.x, position.y, position.z, velocity.x, velocity.y, velocity.z,
            ],
            data_f,
            id,
            names,
        }
    }

    pub fn data_d(&self) -> &[f64; STAR_SIZE_D] {
        &self.data_d
    }

    pub fn data_f(&self) -> &[f32; STAR_SIZE_F] {
        &self.data_f
    }

    pub fn position(&self) -> DVec3 {
        DVec3::new(self.data_d[0], self.data_d[1], self.data_d[2])
    }

    pub fn velocity(&self) -> DVec3 {
        DVec3::new(self.data_d[3], self.data_d[4], self.data_d[5])
    }

    pub fn mualpha(&self) -> f32 {
        self.data_f[I_FMUALPHA]
    }

    pub fn mudelta(&self) -> f32 {
        self.data_f[I_FMUDELTA]
    }

    pub fn radvel(&self) -> f32 {
        self.data_f[I_FRADVEL]
    }

    pub fn appmag(&self) -> f32 {
        self.data_f[I_FAPPMAG]
    }

    pub fn absmag(&self) -> f32 {
        self.data_f[I_FABSMAG]
    }

    pub fn col(&self) -> f32 {
        self.data_f[I_FCOL]
    }

    pub fn size(&self) -> f32 {
        self.data_f[I_FSIZE]
    }

    /// Hipparcos number, -1 when the star has none
    pub fn hip(&self) -> i32 {
        self.data_f[I_FHIP] as i32
    }

    pub fn has_hip(&self) -> bool {
        self.hip() > 0
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// First name, if any
    pub fn name(&self) -> Option<&str> {
        self.names.first().map(String::as_str).filter(|n| !n.is_empty())
    }

    /// Names joined with the on-disk separator
    pub fn names_concat(&self) -> String {
        let mut sep = [0u8; 4];
        self.names.join(NAME_SEPARATOR.encode_utf8(&mut sep))
    }
}

/// Split a concatenated name block
///
/// Trailing empty names are dropped, but a block without any name yields a
/// single empty entry.
pub fn split_names(concat: &str) -> Vec<String> {
    let mut names: Vec<String> = concat.split(NAME_SEPARATOR).map(str::to_string).collect();
    while names.len() > 1 && names.last().is_some_and(|n| n.is_empty()) {
        names.pop();
    }
    names
}
