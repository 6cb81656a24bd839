//! Spatial policy math: the allowed region and the coordinate offset applied
//! to everything observers see.

use shared::{Vec3, CHUNK_WIDTH};

/// Axis-aligned allowed volume. Containment is checked on X and Z only;
/// vertical movement is never restricted.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub center: Vec3,
    pub half_extent: f64,
}

impl Region {
    pub fn new(center: Vec3, half_extent: f64) -> Self {
        Self {
            center,
            half_extent,
        }
    }

    pub fn contains(&self, pos: Vec3) -> bool {
        (pos.x - self.center.x).abs() <= self.half_extent
            && (pos.z - self.center.z).abs() <= self.half_extent
    }

    /// Whole-chunk test: true only when the 16x16 column lies entirely
    /// outside the region on the X or Z axis. Columns straddling the
    /// boundary are delivered intact.
    pub fn chunk_fully_outside(&self, chunk_x: i32, chunk_z: i32) -> bool {
        let min_x = (chunk_x * CHUNK_WIDTH) as f64;
        let min_z = (chunk_z * CHUNK_WIDTH) as f64;
        let max_x = min_x + (CHUNK_WIDTH - 1) as f64;
        let max_z = min_z + (CHUNK_WIDTH - 1) as f64;

        let outside_x =
            max_x < self.center.x - self.half_extent || min_x > self.center.x + self.half_extent;
        let outside_z =
            max_z < self.center.z - self.half_extent || min_z > self.center.z + self.half_extent;

        outside_x || outside_z
    }
}

/// Fixed translation between world space and what observers are shown.
/// Outbound positions have the offset subtracted; inbound movement gets it
/// added back, so the two transforms are exact inverses.
#[derive(Debug, Clone, Copy)]
pub struct Offset(pub Vec3);

impl Offset {
    pub fn is_zero(&self) -> bool {
        self.0.x == 0.0 && self.0.y == 0.0 && self.0.z == 0.0
    }

    pub fn to_observer(&self, pos: Vec3) -> Vec3 {
        pos.minus(self.0)
    }

    pub fn to_world(&self, pos: Vec3) -> Vec3 {
        pos.plus(self.0)
    }

    pub fn block_to_observer(&self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        (
            x - self.0.x.floor() as i32,
            y - self.0.y.floor() as i32,
            z - self.0.z.floor() as i32,
        )
    }

    pub fn block_to_world(&self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        (
            x + self.0.x.floor() as i32,
            y + self.0.y.floor() as i32,
            z + self.0.z.floor() as i32,
        )
    }

    /// Chunk-grid component of the offset, for shifting chunk columns in
    /// step with block coordinates.
    pub fn chunk_shift(&self) -> (i32, i32) {
        (
            (self.0.x.floor() as i32).div_euclid(CHUNK_WIDTH),
            (self.0.z.floor() as i32).div_euclid(CHUNK_WIDTH),
        )
    }
}
