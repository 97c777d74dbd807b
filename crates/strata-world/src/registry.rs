//! Block definitions and the block registry.
//!
//! Block types are stateless flyweight descriptors looked up by id. The
//! registry is built once at startup and is read-only afterwards; systems
//! that need it receive a reference explicitly rather than reaching for a
//! global.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use strata_common::BlockId;

/// Static properties of one block type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDef {
    /// Human-readable name ("stone", "water", ...)
    pub name: String,
    /// Whether bodies collide with this block
    pub solid: bool,
    /// Whether the block fully hides faces behind it
    pub opaque: bool,
    /// Mining hardness (0.0 = instant)
    pub hardness: f32,
    /// Light emitted by this block (0-15)
    pub emission: u8,
    /// Light lost per hop when passing through this block (>= 1)
    pub attenuation: u8,
    /// Whether the block participates in greedy quad merging.
    /// Partial-volume decorations set this to false and render as instances.
    pub greedy: bool,
    /// Texture group used to partition mesh batches
    pub texture_group: u16,
    /// Free-form tags ("fluid", "ore", ...)
    pub tags: Vec<String>,
}

impl BlockDef {
    /// Creates a plain opaque solid block definition.
    #[must_use]
    pub fn solid(name: &str, hardness: f32) -> Self {
        Self {
            name: name.to_owned(),
            solid: true,
            opaque: true,
            hardness,
            emission: 0,
            attenuation: 15,
            greedy: true,
            texture_group: 0,
            tags: Vec::new(),
        }
    }

    /// Creates a translucent, non-solid block definition (fluids, glass).
    #[must_use]
    pub fn translucent(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            solid: false,
            opaque: false,
            hardness: 0.0,
            emission: 0,
            attenuation: 2,
            greedy: true,
            texture_group: 0,
            tags: Vec::new(),
        }
    }

    /// Sets the light emission level (0-15).
    #[must_use]
    pub fn with_emission(mut self, emission: u8) -> Self {
        self.emission = emission.min(15);
        self
    }

    /// Sets the per-hop light attenuation (clamped to >= 1).
    #[must_use]
    pub fn with_attenuation(mut self, attenuation: u8) -> Self {
        self.attenuation = attenuation.max(1);
        self
    }

    /// Sets the texture group.
    #[must_use]
    pub fn with_texture_group(mut self, group: u16) -> Self {
        self.texture_group = group;
        self
    }

    /// Marks the block as a non-greedy decoration.
    #[must_use]
    pub fn as_decoration(mut self) -> Self {
        self.greedy = false;
        self.opaque = false;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_owned());
        self
    }

    fn air() -> Self {
        Self {
            name: "air".to_owned(),
            solid: false,
            opaque: false,
            hardness: 0.0,
            emission: 0,
            attenuation: 1,
            greedy: false,
            texture_group: 0,
            tags: Vec::new(),
        }
    }
}

/// Builder for a [`BlockRegistry`].
///
/// Air is pre-registered at id 0 and cannot be replaced.
#[derive(Debug)]
pub struct RegistryBuilder {
    defs: Vec<BlockDef>,
}

impl RegistryBuilder {
    /// Creates a builder holding only the air definition.
    #[must_use]
    pub fn new() -> Self {
        Self {
            defs: vec![BlockDef::air()],
        }
    }

    /// Registers a block definition and returns its assigned id.
    pub fn register(&mut self, def: BlockDef) -> BlockId {
        let id = BlockId::from_raw(self.defs.len() as u16);
        self.defs.push(def);
        id
    }

    /// Finalizes the registry. Read-only from here on.
    #[must_use]
    pub fn build(self) -> BlockRegistry {
        BlockRegistry {
            fallback: BlockDef::solid("unknown", 1.0),
            defs: self.defs,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable table of block definitions, indexed by [`BlockId`].
#[derive(Debug)]
pub struct BlockRegistry {
    defs: Vec<BlockDef>,
    fallback: BlockDef,
}

impl BlockRegistry {
    /// Looks up a block definition.
    ///
    /// Unknown ids resolve to a default solid definition so a corrupted
    /// block array degrades to visible geometry rather than holes.
    #[must_use]
    pub fn get(&self, id: BlockId) -> &BlockDef {
        self.defs.get(id.raw() as usize).unwrap_or(&self.fallback)
    }

    /// Checks whether an id is registered.
    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        (id.raw() as usize) < self.defs.len()
    }

    /// Number of registered definitions (including air).
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether only air is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.len() <= 1
    }

    /// Whether the block fully hides faces behind it.
    #[must_use]
    pub fn is_opaque(&self, id: BlockId) -> bool {
        !id.is_air() && self.get(id).opaque
    }

    /// Whether bodies collide with the block.
    #[must_use]
    pub fn is_solid(&self, id: BlockId) -> bool {
        !id.is_air() && self.get(id).solid
    }

    /// Collects the set of opaque ids for transfer to mesh workers.
    #[must_use]
    pub fn opaque_ids(&self) -> AHashSet<u16> {
        self.defs
            .iter()
            .enumerate()
            .filter(|(_, def)| def.opaque)
            .map(|(i, _)| i as u16)
            .collect()
    }

    /// Collects the ids that bypass greedy merging (decorations).
    #[must_use]
    pub fn non_greedy_ids(&self) -> AHashSet<u16> {
        self.defs
            .iter()
            .enumerate()
            .filter(|(i, def)| *i != 0 && !def.greedy)
            .map(|(i, _)| i as u16)
            .collect()
    }

    /// Iterates over (id, def) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BlockDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, def)| (BlockId::from_raw(i as u16), def))
    }
}

/// Builds a small registry with the handful of block types the terrain
/// generator and tests rely on.
#[must_use]
pub fn default_registry() -> (BlockRegistry, CoreBlocks) {
    let mut builder = RegistryBuilder::new();
    let stone = builder.register(BlockDef::solid("stone", 1.5));
    let dirt = builder.register(BlockDef::solid("dirt", 0.5));
    let grass = builder.register(BlockDef::solid("grass", 0.6).with_texture_group(1));
    let sand = builder.register(BlockDef::solid("sand", 0.5));
    let water = builder.register(BlockDef::translucent("water").with_tag("fluid"));
    let glowstone = builder.register(
        BlockDef::solid("glowstone", 0.3)
            .with_emission(15)
            .with_texture_group(2),
    );
    let tall_grass = builder.register(BlockDef::translucent("tall_grass").as_decoration());
    (
        builder.build(),
        CoreBlocks {
            stone,
            dirt,
            grass,
            sand,
            water,
            glowstone,
            tall_grass,
        },
    )
}

/// Ids assigned by [`default_registry`].
#[derive(Debug, Clone, Copy)]
pub struct CoreBlocks {
    /// Plain stone
    pub stone: BlockId,
    /// Dirt
    pub dirt: BlockId,
    /// Grass-topped dirt
    pub grass: BlockId,
    /// Sand
    pub sand: BlockId,
    /// Water (translucent, non-solid)
    pub water: BlockId,
    /// Light-emitting block
    pub glowstone: BlockId,
    /// Non-greedy decoration
    pub tall_grass: BlockId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_pre_registered() {
        let registry = RegistryBuilder::new().build();
        assert_eq!(registry.get(BlockId::AIR).name, "air");
        assert!(!registry.is_solid(BlockId::AIR));
        assert!(!registry.is_opaque(BlockId::AIR));
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut builder = RegistryBuilder::new();
        let a = builder.register(BlockDef::solid("a", 1.0));
        let b = builder.register(BlockDef::solid("b", 1.0));
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
    }

    #[test]
    fn test_unknown_id_falls_back_solid() {
        let registry = RegistryBuilder::new().build();
        let bogus = BlockId::from_raw(999);
        assert!(!registry.contains(bogus));
        assert!(registry.get(bogus).solid);
    }

    #[test]
    fn test_opaque_id_set() {
        let (registry, core) = default_registry();
        let opaque = registry.opaque_ids();
        assert!(opaque.contains(&core.stone.raw()));
        assert!(!opaque.contains(&core.water.raw()));
        assert!(!opaque.contains(&BlockId::AIR.raw()));
    }

    #[test]
    fn test_decoration_bypasses_greedy() {
        let (registry, core) = default_registry();
        assert!(registry.non_greedy_ids().contains(&core.tall_grass.raw()));
        assert!(!registry.non_greedy_ids().contains(&core.stone.raw()));
    }

    #[test]
    fn test_attenuation_floor() {
        let def = BlockDef::translucent("x").with_attenuation(0);
        assert_eq!(def.attenuation, 1);
    }
}
