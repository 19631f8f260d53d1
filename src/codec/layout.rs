use serde::{Deserialize, Serialize};

use crate::constants::record::{I_FHIP, POSITION_SLOTS, STAR_SIZE_D};
use crate::error::{invalid_layout, StreamError, StreamResult};

/// Field counts of one on-disk record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryLayout {
    /// Doubles per record; those past the record's double slots are narrowed to floats
    pub n_doubles: usize,
    /// Floats per record, stored after any narrowed doubles
    pub n_floats: usize,
    /// Whether three retired extended-id integers follow the HIP number
    pub has_extended_id: bool,
}

impl BinaryLayout {
    pub const fn new(n_doubles: usize, n_floats: usize, has_extended_id: bool) -> Self {
        Self { n_doubles, n_floats, has_extended_id }
    }

    /// Doubles that land in the float array
    pub fn narrowed_doubles(&self) -> usize {
        self.n_doubles.saturating_sub(STAR_SIZE_D)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.n_doubles < POSITION_SLOTS {
            return Err(invalid_layout(format!(
                "at least {} doubles are needed for the position, got {}",
                POSITION_SLOTS, self.n_doubles
            )));
        }
        // The HIP number always occupies the last float slot
        let float_slots = self.narrowed_doubles() + self.n_floats;
        if float_slots > I_FHIP {
            return Err(invalid_layout(format!(
                "{} narrowed doubles and {} floats exceed the {} float slots before the HIP slot",
                self.narrowed_doubles(),
                self.n_floats,
                I_FHIP
            )));
        }
        Ok(())
    }
}

/// Known particle file versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryVersion {
    /// Early catalogs: velocities, photometry and color stored as doubles,
    /// extended ids present
    V0,
    /// Current layout
    V1,
}

impl BinaryVersion {
    pub fn from_u32(version: u32) -> StreamResult<Self> {
        match version {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            other => Err(StreamError::UnsupportedVersion(other)),
        }
    }

    pub fn layout(self) -> BinaryLayout {
        match self {
            Self::V0 => BinaryLayout::new(12, 1, true),
            Self::V1 => BinaryLayout::new(6, 7, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_layouts_validate() {
        BinaryVersion::V0.layout().validate().expect("V0 layout should be valid");
        BinaryVersion::V1.layout().validate().expect("V1 layout should be valid");
        assert_eq!(BinaryVersion::V0.layout().narrowed_doubles(), 6);
        assert_eq!(BinaryVersion::V1.layout().narrowed_doubles(), 0);
    }

    #[test]
    fn test_oversized_layout_rejected() {
        assert!(BinaryLayout::new(12, 3, false).validate().is_err());
        assert!(BinaryLayout::new(2, 1, false).validate().is_err());
    }

    #[test]
    fn test_layout_cannot_reach_hip_slot() {
        // Eight float slots would put the last value where the HIP number goes
        assert!(BinaryLayout::new(6, 8, false).validate().is_err());
        assert!(BinaryLayout::new(12, 2, true).validate().is_err());
        BinaryLayout::new(6, 7, false).validate().expect("Seven float slots fit");
        BinaryLayout::new(12, 1, true).validate().expect("Seven float slots fit");
    }
}
