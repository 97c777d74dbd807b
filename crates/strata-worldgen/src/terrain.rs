//! Column terrain generation.
//!
//! The generator is a pure function of (seed, world coordinates): the same
//! configuration always produces byte-identical columns, which the cave
//! prediction path depends on.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use tracing::trace;

use strata_common::{BlockId, WORLD_HEIGHT};
use strata_world::chunk::ChunkColumn;
use strata_world::registry::CoreBlocks;
use strata_world::streaming::{ColumnGenerator, GenerationError};

use crate::caves::{CaveConfig, CaveField};
use crate::water::{WaterConfig, WaterFill};

/// Terrain generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenConfig {
    /// World seed
    pub seed: u32,
    /// Mean surface height
    pub base_height: f64,
    /// Surface height amplitude
    pub height_amplitude: f64,
    /// Horizontal wavelength of the surface (larger = smoother)
    pub terrain_scale: f64,
    /// Thickness of the dirt layer under the surface block
    pub soil_depth: i64,
    /// Whether cave carving runs
    pub carve_caves: bool,
    /// Whether water placement runs
    pub place_water: bool,
    /// Cave parameters
    pub caves: CaveConfig,
    /// Water parameters
    pub water: WaterConfig,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            base_height: 96.0,
            height_amplitude: 40.0,
            terrain_scale: 220.0,
            soil_depth: 3,
            carve_caves: true,
            place_water: true,
            caves: CaveConfig::default(),
            water: WaterConfig::default(),
        }
    }
}

/// Procedural column generator.
pub struct TerrainGenerator {
    config: GenConfig,
    surface_noise: Fbm<Perlin>,
    detail_noise: Perlin,
    caves: CaveField,
    water: WaterFill,
    blocks: CoreBlocks,
}

impl TerrainGenerator {
    /// Creates a generator from config and the registered core block ids.
    #[must_use]
    pub fn new(config: GenConfig, blocks: CoreBlocks) -> Self {
        let surface_noise = Fbm::<Perlin>::new(config.seed).set_octaves(4);
        let detail_noise = Perlin::new(config.seed.wrapping_add(101));
        let caves = CaveField::new(config.seed, config.caves.clone());
        let water = WaterFill::new(config.seed, config.water.clone());
        Self {
            config,
            surface_noise,
            detail_noise,
            caves,
            water,
            blocks,
        }
    }

    /// Creates a generator with default config for the given seed.
    #[must_use]
    pub fn with_seed(seed: u32, blocks: CoreBlocks) -> Self {
        Self::new(
            GenConfig {
                seed,
                ..GenConfig::default()
            },
            blocks,
        )
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &GenConfig {
        &self.config
    }

    /// Returns the cave field for standalone prediction.
    #[must_use]
    pub const fn caves(&self) -> &CaveField {
        &self.caves
    }

    /// Surface height at a world column: base plus fractal relief plus a
    /// small high-frequency detail term, clamped into the column.
    #[must_use]
    pub fn surface_height(&self, x: i64, z: i64) -> i64 {
        let s = self.config.terrain_scale;
        let relief = self.surface_noise.get([x as f64 / s, z as f64 / s]);
        let detail = self.detail_noise.get([x as f64 / 16.0, z as f64 / 16.0]) * 2.0;
        let height = self.config.base_height + relief * self.config.height_amplitude + detail;
        (height.floor() as i64).clamp(1, i64::from(WORLD_HEIGHT) - 2)
    }

    fn fail(reason: impl std::fmt::Display) -> GenerationError {
        GenerationError::Feature {
            feature: "terrain".into(),
            reason: reason.to_string(),
        }
    }

    /// Surface block for a pillar: sand near and under the waterline,
    /// grass elsewhere.
    fn surface_block(&self, surface: i64) -> BlockId {
        if self.config.place_water && surface <= self.config.water.water_level + 1 {
            self.blocks.sand
        } else {
            self.blocks.grass
        }
    }
}

impl ColumnGenerator for TerrainGenerator {
    fn generate(&self, column: &mut ChunkColumn) -> Result<(), GenerationError> {
        let base = column.pos().base();
        trace!("Generating terrain for {}", column.pos());

        for lx in 0..32u8 {
            for lz in 0..32u8 {
                let wx = base.x + i64::from(lx);
                let wz = base.z + i64::from(lz);
                let surface = self.surface_height(wx, wz);

                for y in 0..=surface {
                    let id = if y == surface {
                        self.surface_block(surface)
                    } else if y >= surface - self.config.soil_depth {
                        self.blocks.dirt
                    } else {
                        self.blocks.stone
                    };
                    column
                        .set_block_id_at(lx, y, lz, id)
                        .map_err(Self::fail)?;
                }

                // Carve after deposit, leaving the bedrock layer at y = 0.
                if self.config.carve_caves {
                    for y in 1..=surface {
                        if self.caves.carves(wx, y, wz) {
                            column
                                .set_block_id_at(lx, y, lz, BlockId::AIR)
                                .map_err(Self::fail)?;
                        }
                    }
                }

                // Scatter grass tufts on intact dry surfaces.
                let deco = self.detail_noise.get([wx as f64 / 3.0, wz as f64 / 3.0]);
                if deco > 0.55
                    && self.surface_block(surface) == self.blocks.grass
                    && column
                        .block_id_at(lx, surface, lz)
                        .map_err(Self::fail)?
                        == self.blocks.grass
                {
                    column
                        .set_block_id_at(lx, surface + 1, lz, self.blocks.tall_grass)
                        .map_err(Self::fail)?;
                }
            }
        }

        if self.config.place_water {
            let height = |x: i64, z: i64| self.surface_height(x, z);
            self.water.apply(column, self.blocks.water, &height)?;
        }
        Ok(())
    }
}
