//! Water body placement.
//!
//! Columns are classified water/dry by thresholding a low-frequency 2-D
//! noise field. Within a water region a column only fills if the terrain
//! sits deep enough under the water level, judged by sampling the corners
//! and center of the coarse grid cell the column falls in (cached per
//! cell). Fill never overwrites non-air blocks, and the region test is
//! repeated over the eight surrounding columns so a region edge lands in
//! the same place no matter which chunk evaluates it.

use ahash::AHashMap;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use strata_common::BlockId;
use strata_world::chunk::ChunkColumn;
use strata_world::streaming::GenerationError;

/// Water placement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    /// Wavelength of the region-classification noise
    pub region_scale: f64,
    /// Noise values above this mark a water region
    pub region_cutoff: f64,
    /// World Y of the water surface
    pub water_level: i64,
    /// Minimum terrain depth below the water level required to fill
    pub min_depth: i64,
    /// Side length of the coarse depth-check cell, in blocks
    pub cell_size: i64,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            region_scale: 384.0,
            region_cutoff: 0.25,
            water_level: 88,
            min_depth: 3,
            cell_size: 8,
        }
    }
}

/// Terrain height oracle: world column -> surface Y.
pub type HeightFn<'a> = &'a dyn Fn(i64, i64) -> i64;

/// Seeded water-fill feature.
pub struct WaterFill {
    config: WaterConfig,
    region_noise: Perlin,
    /// Depth-check verdict per coarse cell, memoized because every column
    /// in a cell would otherwise re-sample the same five heights.
    cell_cache: RefCell<AHashMap<(i64, i64), bool>>,
}

impl WaterFill {
    /// Creates the feature for the given seed.
    #[must_use]
    pub fn new(seed: u32, config: WaterConfig) -> Self {
        Self {
            config,
            region_noise: Perlin::new(seed.wrapping_add(7)),
            cell_cache: RefCell::new(AHashMap::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &WaterConfig {
        &self.config
    }

    /// Whether the world column falls in a water region.
    #[must_use]
    pub fn is_water_region(&self, x: i64, z: i64) -> bool {
        let s = self.config.region_scale;
        self.region_noise.get([x as f64 / s, z as f64 / s]) > self.config.region_cutoff
    }

    /// Depth check for the coarse cell containing the column: passes when
    /// the deepest of the corner+center height samples leaves at least
    /// `min_depth` of water.
    fn cell_deep_enough(&self, x: i64, z: i64, height: HeightFn<'_>) -> bool {
        let size = self.config.cell_size.max(1);
        let cell = (x.div_euclid(size), z.div_euclid(size));
        if let Some(&verdict) = self.cell_cache.borrow().get(&cell) {
            return verdict;
        }

        let x0 = cell.0 * size;
        let z0 = cell.1 * size;
        let x1 = x0 + size - 1;
        let z1 = z0 + size - 1;
        let samples = [
            (x0, z0),
            (x1, z0),
            (x0, z1),
            (x1, z1),
            (x0 + size / 2, z0 + size / 2),
        ];
        let deepest = samples
            .iter()
            .map(|&(sx, sz)| height(sx, sz))
            .min()
            .unwrap_or(i64::MAX);
        let verdict = deepest <= self.config.water_level - self.config.min_depth;
        self.cell_cache.borrow_mut().insert(cell, verdict);
        verdict
    }

    /// Full fill decision for one world column.
    ///
    /// Edge continuity: the four adjacent and four diagonal columns must
    /// also classify as water region, so the region boundary is identical
    /// regardless of which chunk computes it.
    #[must_use]
    pub fn should_fill(&self, x: i64, z: i64, height: HeightFn<'_>) -> bool {
        if !self.is_water_region(x, z) {
            return false;
        }
        let ring = [
            (x + 1, z),
            (x - 1, z),
            (x, z + 1),
            (x, z - 1),
            (x + 1, z + 1),
            (x + 1, z - 1),
            (x - 1, z + 1),
            (x - 1, z - 1),
        ];
        if ring.iter().any(|&(nx, nz)| !self.is_water_region(nx, nz)) {
            return false;
        }
        self.cell_deep_enough(x, z, height)
    }

    /// Applies the feature to a generated column: fills air from one above
    /// the terrain surface up to the water level in every qualifying
    /// column-local pillar.
    pub fn apply(
        &self,
        column: &mut ChunkColumn,
        water: BlockId,
        height: HeightFn<'_>,
    ) -> Result<(), GenerationError> {
        let base = column.pos().base();
        for lx in 0..32u8 {
            for lz in 0..32u8 {
                let wx = base.x + i64::from(lx);
                let wz = base.z + i64::from(lz);
                if !self.should_fill(wx, wz, height) {
                    continue;
                }
                let surface = height(wx, wz);
                for y in (surface + 1)..=self.config.water_level {
                    if y < 0 {
                        continue;
                    }
                    let existing = column.block_id_at(lx, y, lz).map_err(|e| {
                        GenerationError::Feature {
                            feature: "water".into(),
                            reason: e.to_string(),
                        }
                    })?;
                    if existing.is_air() {
                        column.set_block_id_at(lx, y, lz, water).map_err(|e| {
                            GenerationError::Feature {
                                feature: "water".into(),
                                reason: e.to_string(),
                            }
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
}
