use glam::DVec3;

/// Axis-aligned box stored as min corner plus half extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: DVec3,
    pub half: DVec3,
}

impl BoundingBox {
    pub fn new(min: DVec3, half: DVec3) -> Self {
        Self { min, half }
    }

    pub fn from_center_half(center: DVec3, half: DVec3) -> Self {
        Self { min: center - half, half }
    }

    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        Self { min, half: (max - min) * 0.5 }
    }

    pub fn center(&self) -> DVec3 {
        self.min + self.half
    }

    pub fn max(&self) -> DVec3 {
        self.min + self.half * 2.0
    }

    pub fn size(&self) -> DVec3 {
        self.half * 2.0
    }

    /// Inclusive containment test
    pub fn contains(&self, p: DVec3) -> bool {
        let max = self.max();
        p.cmpge(self.min).all() && p.cmple(max).all()
    }

    /// Child slot of the octant holding `p`: bit 0 x, bit 1 y, bit 2 z (upper halves)
    pub fn child_index(&self, p: DVec3) -> usize {
        let c = self.center();
        (p.x >= c.x) as usize | ((p.y >= c.y) as usize) << 1 | ((p.z >= c.z) as usize) << 2
    }

    /// Bounds of child slot `index`
    pub fn child_box(&self, index: usize) -> BoundingBox {
        let half = self.half * 0.5;
        let mut min = self.min;
        if index & 0b001 != 0 {
            min.x += self.half.x;
        }
        if index & 0b010 != 0 {
            min.y += self.half.y;
        }
        if index & 0b100 != 0 {
            min.z += self.half.z;
        }
        BoundingBox { min, half }
    }
}
