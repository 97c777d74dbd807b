//! Greedy sub-chunk meshing.
//!
//! For each of the six face directions the mesher sweeps the sub-chunk one
//! slice at a time, builds a 2-D mask of exposed faces keyed by (block id,
//! light), and grows maximal rectangles over the mask so coplanar
//! same-material same-light faces become single quads. Blocks flagged
//! non-greedy (partial-volume decorations) bypass merging entirely and come
//! back as per-instance transforms.
//!
//! A face is emitted only when the cell behind it is non-opaque. When that
//! cell lies outside the sub-chunk and no neighbor array was provided, it
//! counts as exposed: at worst that draws a hidden face, never a hole.

use ahash::{AHashMap, AHashSet};
use bytemuck::{Pod, Zeroable};

use strata_common::{CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNK_HEIGHT};
use strata_world::registry::BlockRegistry;
use strata_world::streaming::NeighborArrays;

const SX: i32 = CHUNK_SIZE_X as i32;
const SY: i32 = SUB_CHUNK_HEIGHT as i32;
const SZ: i32 = CHUNK_SIZE_Z as i32;

/// Per-id lookup tables the mesher needs, extracted from the registry so a
/// worker thread can own them without the registry itself.
#[derive(Debug, Clone, Default)]
pub struct MeshTables {
    /// Ids that fully hide faces behind them
    pub opaque: AHashSet<u16>,
    /// Ids that bypass greedy merging
    pub non_greedy: AHashSet<u16>,
    /// Id -> texture group
    pub texture_group: AHashMap<u16, u16>,
}

impl MeshTables {
    /// Builds the tables from a registry.
    #[must_use]
    pub fn from_registry(registry: &BlockRegistry) -> Self {
        let mut texture_group = AHashMap::new();
        for (id, def) in registry.iter() {
            texture_group.insert(id.raw(), def.texture_group);
        }
        Self {
            opaque: registry.opaque_ids(),
            non_greedy: registry.non_greedy_ids(),
            texture_group,
        }
    }

    fn is_opaque(&self, id: u16) -> bool {
        self.opaque.contains(&id)
    }

    fn group_of(&self, id: u16) -> u16 {
        self.texture_group.get(&id).copied().unwrap_or(0)
    }
}

/// Everything the mesher needs for one sub-chunk. Arrays are owned copies;
/// the input is safe to move onto a worker thread.
#[derive(Debug)]
pub struct MeshInput {
    /// Block ids, Y-major layout
    pub blocks: Vec<u16>,
    /// Packed light, Y-major layout
    pub light: Vec<u8>,
    /// Horizontal neighbor block arrays for cross-boundary visibility
    pub neighbors: NeighborArrays,
    /// Id lookup tables
    pub tables: MeshTables,
}

/// One mesh vertex.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshVertex {
    /// Position in sub-chunk-local space
    pub position: [f32; 3],
    /// Outward face normal
    pub normal: [f32; 3],
    /// Texture coordinates, scaled by quad extent for tiling
    pub uv: [f32; 2],
    /// Light tint (grayscale RGBA)
    pub color: [u8; 4],
}

/// Partition key for a vertex batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    /// Whether the batch's material is opaque (false = translucent pass)
    pub opaque: bool,
    /// Texture group shared by every quad in the batch
    pub texture_group: u16,
}

/// A renderable batch of merged quads.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshBatch {
    /// Partition key
    pub key: BatchKey,
    /// Vertex data
    pub vertices: Vec<MeshVertex>,
    /// Triangle indices
    pub indices: Vec<u32>,
}

/// A non-greedy block rendered as an instanced decoration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockInstance {
    /// Sub-chunk-local cell position
    pub position: [f32; 3],
    /// Block id
    pub block: u16,
    /// Combined light level at the cell (0-15)
    pub light: u8,
}

/// Meshing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshStats {
    /// Exposed unit faces found before merging
    pub exposed_faces: usize,
    /// Quads emitted after merging
    pub quads: usize,
}

/// Output of meshing one sub-chunk.
#[derive(Debug, Default)]
pub struct MeshOutput {
    /// Vertex batches, one per (opacity, texture group)
    pub batches: Vec<MeshBatch>,
    /// Non-greedy instances
    pub instances: Vec<BlockInstance>,
    /// Statistics
    pub stats: MeshStats,
}

impl MeshOutput {
    /// Whether the sub-chunk produced no geometry at all. Empty outputs
    /// must not be submitted to the renderer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.instances.is_empty()
    }
}

/// The six face directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Face {
    const ALL: [Face; 6] = [
        Face::PosX,
        Face::NegX,
        Face::PosY,
        Face::NegY,
        Face::PosZ,
        Face::NegZ,
    ];

    const fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::PosX => (1, 0, 0),
            Face::NegX => (-1, 0, 0),
            Face::PosY => (0, 1, 0),
            Face::NegY => (0, -1, 0),
            Face::PosZ => (0, 0, 1),
            Face::NegZ => (0, 0, -1),
        }
    }

    const fn normal(self) -> [f32; 3] {
        match self {
            Face::PosX => [1.0, 0.0, 0.0],
            Face::NegX => [-1.0, 0.0, 0.0],
            Face::PosY => [0.0, 1.0, 0.0],
            Face::NegY => [0.0, -1.0, 0.0],
            Face::PosZ => [0.0, 0.0, 1.0],
            Face::NegZ => [0.0, 0.0, -1.0],
        }
    }

    /// Slice count along the sweep axis and (width, height) of the mask.
    const fn dims(self) -> (i32, i32, i32) {
        match self {
            Face::PosX | Face::NegX => (SX, SZ, SY),
            Face::PosY | Face::NegY => (SY, SX, SZ),
            Face::PosZ | Face::NegZ => (SZ, SX, SY),
        }
    }

    /// Maps (slice, u, v) back to cell coordinates.
    const fn cell(self, slice: i32, u: i32, v: i32) -> (i32, i32, i32) {
        match self {
            Face::PosX | Face::NegX => (slice, v, u),
            Face::PosY | Face::NegY => (u, slice, v),
            Face::PosZ | Face::NegZ => (u, v, slice),
        }
    }
}

/// Merge key for mask cells: faces merge only when both the material and
/// the sampled light agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FaceKey {
    id: u16,
    light: u8,
}

const fn cell_index(x: i32, y: i32, z: i32) -> usize {
    (y * SX * SZ + z * SX + x) as usize
}

fn block_at(input: &MeshInput, x: i32, y: i32, z: i32) -> Option<u16> {
    if (0..SX).contains(&x) && (0..SY).contains(&y) && (0..SZ).contains(&z) {
        return Some(input.blocks[cell_index(x, y, z)]);
    }
    // Vertical neighbors are not part of the protocol; treat as exposed.
    if !(0..SY).contains(&y) {
        return None;
    }
    let (array, wrapped_x, wrapped_z) = if x >= SX {
        (input.neighbors.pos_x.as_ref(), 0, z)
    } else if x < 0 {
        (input.neighbors.neg_x.as_ref(), SX - 1, z)
    } else if z >= SZ {
        (input.neighbors.pos_z.as_ref(), x, 0)
    } else {
        (input.neighbors.neg_z.as_ref(), x, SZ - 1)
    };
    array.map(|blocks| blocks[cell_index(wrapped_x, y, wrapped_z)])
}

/// Combined light (max of the two nibbles) of a cell, defaulting to full
/// brightness outside the sub-chunk.
fn light_at(input: &MeshInput, x: i32, y: i32, z: i32) -> u8 {
    if (0..SX).contains(&x) && (0..SY).contains(&y) && (0..SZ).contains(&z) {
        let packed = input.light[cell_index(x, y, z)];
        (packed >> 4).max(packed & 0x0F)
    } else {
        15
    }
}

/// Face visibility: the neighboring cell must be non-opaque, with missing
/// data counting as exposed. Identical translucent neighbors merge into one
/// body with no interior faces.
fn face_exposed(input: &MeshInput, id: u16, x: i32, y: i32, z: i32, face: Face) -> bool {
    let (dx, dy, dz) = face.offset();
    match block_at(input, x + dx, y + dy, z + dz) {
        None => true,
        Some(neighbor) => {
            if input.tables.is_opaque(neighbor) {
                false
            } else {
                // e.g. water against water
                !(neighbor == id && !input.tables.is_opaque(id))
            }
        }
    }
}

/// Grows maximal rectangles of identical keys over a width x height mask,
/// invoking `emit` once per rectangle.
fn greedy_rects(
    width: i32,
    height: i32,
    mask: &mut [Option<FaceKey>],
    mut emit: impl FnMut(i32, i32, i32, i32, FaceKey),
) {
    let w = width as usize;
    for v in 0..height {
        for u in 0..width {
            let idx = v as usize * w + u as usize;
            let Some(key) = mask[idx] else { continue };

            let mut run_w = 1;
            while u + run_w < width && mask[v as usize * w + (u + run_w) as usize] == Some(key) {
                run_w += 1;
            }
            let mut run_h = 1;
            'expand: while v + run_h < height {
                for i in 0..run_w {
                    if mask[(v + run_h) as usize * w + (u + i) as usize] != Some(key) {
                        break 'expand;
                    }
                }
                run_h += 1;
            }

            emit(u, v, run_w, run_h, key);
            for vv in 0..run_h {
                for uu in 0..run_w {
                    mask[(v + vv) as usize * w + (u + uu) as usize] = None;
                }
            }
        }
    }
}

fn push_quad(
    batch: &mut MeshBatch,
    face: Face,
    slice: i32,
    u: i32,
    v: i32,
    w: i32,
    h: i32,
    light: u8,
) {
    // The quad spans [u, u+w) x [v, v+h) in mask space on the face plane.
    let plane = match face {
        Face::PosX | Face::PosY | Face::PosZ => slice + 1,
        Face::NegX | Face::NegY | Face::NegZ => slice,
    } as f32;

    let corner = |cu: i32, cv: i32| -> [f32; 3] {
        let (cu, cv) = (cu as f32, cv as f32);
        match face {
            Face::PosX | Face::NegX => [plane, cv, cu],
            Face::PosY | Face::NegY => [cu, plane, cv],
            Face::PosZ | Face::NegZ => [cu, cv, plane],
        }
    };

    let mut corners = [
        corner(u, v),
        corner(u + w, v),
        corner(u + w, v + h),
        corner(u, v + h),
    ];
    let mut uvs = [
        [0.0, 0.0],
        [w as f32, 0.0],
        [w as f32, h as f32],
        [0.0, h as f32],
    ];

    // Winding: make ((c1-c0) x (c2-c0)) point along the outward normal.
    let normal = face.normal();
    let e1 = [
        corners[1][0] - corners[0][0],
        corners[1][1] - corners[0][1],
        corners[1][2] - corners[0][2],
    ];
    let e2 = [
        corners[2][0] - corners[0][0],
        corners[2][1] - corners[0][1],
        corners[2][2] - corners[0][2],
    ];
    let cross = [
        e1[1] * e2[2] - e1[2] * e2[1],
        e1[2] * e2[0] - e1[0] * e2[2],
        e1[0] * e2[1] - e1[1] * e2[0],
    ];
    let dot = cross[0] * normal[0] + cross[1] * normal[1] + cross[2] * normal[2];
    if dot < 0.0 {
        corners.swap(1, 3);
        uvs.swap(1, 3);
    }

    let shade = ((u32::from(light) * 255) / 15) as u8;
    let color = [shade, shade, shade, 255];
    let base = batch.vertices.len() as u32;
    for i in 0..4 {
        batch.vertices.push(MeshVertex {
            position: corners[i],
            normal,
            uv: uvs[i],
            color,
        });
    }
    batch
        .indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Meshes one sub-chunk.
#[must_use]
pub fn build_mesh(input: &MeshInput) -> MeshOutput {
    let mut output = MeshOutput::default();
    if input.blocks.iter().all(|&id| id == 0) {
        return output;
    }

    let mut batches: AHashMap<BatchKey, MeshBatch> = AHashMap::new();

    for face in Face::ALL {
        let (slices, width, height) = face.dims();
        let mut mask: Vec<Option<FaceKey>> = vec![None; (width * height) as usize];

        for slice in 0..slices {
            mask.fill(None);
            let mut any = false;

            for v in 0..height {
                for u in 0..width {
                    let (x, y, z) = face.cell(slice, u, v);
                    let id = input.blocks[cell_index(x, y, z)];
                    if id == 0 || input.tables.non_greedy.contains(&id) {
                        continue;
                    }
                    if !face_exposed(input, id, x, y, z, face) {
                        continue;
                    }
                    let (dx, dy, dz) = face.offset();
                    let light = light_at(input, x + dx, y + dy, z + dz);
                    mask[(v * width + u) as usize] = Some(FaceKey { id, light });
                    output.stats.exposed_faces += 1;
                    any = true;
                }
            }
            if !any {
                continue;
            }

            greedy_rects(width, height, &mut mask, |u, v, w, h, key| {
                let batch_key = BatchKey {
                    opaque: input.tables.is_opaque(key.id),
                    texture_group: input.tables.group_of(key.id),
                };
                let batch = batches.entry(batch_key).or_insert_with(|| MeshBatch {
                    key: batch_key,
                    vertices: Vec::new(),
                    indices: Vec::new(),
                });
                push_quad(batch, face, slice, u, v, w, h, key.light);
                output.stats.quads += 1;
            });
        }
    }

    // Non-greedy decorations become instances when any face is exposed.
    for y in 0..SY {
        for z in 0..SZ {
            for x in 0..SX {
                let id = input.blocks[cell_index(x, y, z)];
                if id == 0 || !input.tables.non_greedy.contains(&id) {
                    continue;
                }
                let exposed = Face::ALL
                    .iter()
                    .any(|&face| face_exposed(input, id, x, y, z, face));
                if exposed {
                    output.instances.push(BlockInstance {
                        position: [x as f32, y as f32, z as f32],
                        block: id,
                        light: light_at(input, x, y, z),
                    });
                }
            }
        }
    }

    let mut batches: Vec<MeshBatch> = batches.into_values().collect();
    batches.sort_by_key(|b| b.key);
    batches.retain(|b| !b.vertices.is_empty());
    output.batches = batches;
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::{LocalPos, SUB_CHUNK_VOLUME};
    use strata_world::registry::default_registry;

    fn tables() -> (MeshTables, strata_world::registry::CoreBlocks) {
        let (registry, core) = default_registry();
        (MeshTables::from_registry(&registry), core)
    }

    fn input_with(blocks: &[(LocalPos, u16)]) -> MeshInput {
        let (tables, _) = tables();
        let mut array = vec![0u16; SUB_CHUNK_VOLUME];
        for (pos, id) in blocks {
            array[pos.index()] = *id;
        }
        MeshInput {
            blocks: array,
            light: vec![0xF0; SUB_CHUNK_VOLUME],
            neighbors: NeighborArrays::default(),
            tables,
        }
    }

    #[test]
    fn test_empty_sub_chunk_yields_nothing() {
        let input = input_with(&[]);
        let output = build_mesh(&input);
        assert!(output.is_empty());
        assert!(output.batches.is_empty());
        assert!(output.instances.is_empty());
        assert_eq!(output.stats.exposed_faces, 0);
    }

    #[test]
    fn test_single_block_six_faces() {
        let (_, core) = tables();
        let input = input_with(&[(LocalPos::new(8, 8, 8), core.stone.raw())]);
        let output = build_mesh(&input);
        assert_eq!(output.stats.exposed_faces, 6);
        assert_eq!(output.stats.quads, 6);
        let batch = &output.batches[0];
        assert_eq!(batch.vertices.len(), 24);
        assert_eq!(batch.indices.len(), 36);
    }

    #[test]
    fn test_two_by_two_cluster_merges_minimally() {
        let (_, core) = tables();
        let mut cells = Vec::new();
        for dx in 0..2u8 {
            for dy in 0..2u8 {
                for dz in 0..2u8 {
                    cells.push((LocalPos::new(10 + dx, 10 + dy, 10 + dz), core.stone.raw()));
                }
            }
        }
        let input = input_with(&cells);
        let output = build_mesh(&input);
        // 6 sides x 4 unit faces before merging, 6 2x2 quads after.
        assert_eq!(output.stats.exposed_faces, 24);
        assert_eq!(output.stats.quads, 6);
    }

    #[test]
    fn test_buried_faces_culled() {
        let (_, core) = tables();
        // A 3x3x3 solid cube: the center block contributes no faces.
        let mut cells = Vec::new();
        for dx in 0..3u8 {
            for dy in 0..3u8 {
                for dz in 0..3u8 {
                    cells.push((LocalPos::new(5 + dx, 5 + dy, 5 + dz), core.stone.raw()));
                }
            }
        }
        let input = input_with(&cells);
        let output = build_mesh(&input);
        // 6 sides x 9 unit faces; interior faces are culled.
        assert_eq!(output.stats.exposed_faces, 54);
        assert_eq!(output.stats.quads, 6);
    }

    #[test]
    fn test_chunk_edge_without_neighbor_assumed_exposed() {
        let (_, core) = tables();
        let input = input_with(&[(LocalPos::new(0, 8, 8), core.stone.raw())]);
        let output = build_mesh(&input);
        // The -X face sits on the sub-chunk edge with no neighbor data: it
        // must still be emitted.
        assert_eq!(output.stats.exposed_faces, 6);
    }

    #[test]
    fn test_opaque_neighbor_array_culls_edge_face() {
        let (tables, core) = tables();
        let mut array = vec![0u16; SUB_CHUNK_VOLUME];
        array[LocalPos::new(0, 8, 8).index()] = core.stone.raw();

        // Neighbor column at -X has stone hugging the shared boundary.
        let mut neighbor = vec![0u16; SUB_CHUNK_VOLUME];
        neighbor[LocalPos::new(31, 8, 8).index()] = core.stone.raw();

        let input = MeshInput {
            blocks: array,
            light: vec![0xF0; SUB_CHUNK_VOLUME],
            neighbors: NeighborArrays {
                neg_x: Some(neighbor),
                ..NeighborArrays::default()
            },
            tables,
        };
        let output = build_mesh(&input);
        assert_eq!(output.stats.exposed_faces, 5);
    }

    #[test]
    fn test_translucent_neighbor_exposes_face() {
        let (_, core) = tables();
        let input = input_with(&[
            (LocalPos::new(8, 8, 8), core.stone.raw()),
            (LocalPos::new(9, 8, 8), core.water.raw()),
        ]);
        let output = build_mesh(&input);
        // Stone: all 6 faces (water is non-opaque). Water: 5 faces against
        // air plus the one against stone; stone is opaque so that one is
        // culled, leaving 5.
        assert_eq!(output.stats.exposed_faces, 11);
        // Separate batches for opaque and translucent materials.
        assert_eq!(output.batches.len(), 2);
        assert!(output.batches.iter().any(|b| b.key.opaque));
        assert!(output.batches.iter().any(|b| !b.key.opaque));
    }

    #[test]
    fn test_same_translucent_body_has_no_interior_faces() {
        let (_, core) = tables();
        let input = input_with(&[
            (LocalPos::new(8, 8, 8), core.water.raw()),
            (LocalPos::new(9, 8, 8), core.water.raw()),
        ]);
        let output = build_mesh(&input);
        // Two merged cells: 10 exterior faces, no face between them.
        assert_eq!(output.stats.exposed_faces, 10);
    }

    #[test]
    fn test_different_light_does_not_merge() {
        let (tables, core) = tables();
        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        blocks[LocalPos::new(10, 10, 10).index()] = core.stone.raw();
        blocks[LocalPos::new(11, 10, 10).index()] = core.stone.raw();

        // Light differs above the two blocks, so their +Y faces cannot
        // merge into one quad.
        let mut light = vec![0xF0u8; SUB_CHUNK_VOLUME];
        light[LocalPos::new(10, 11, 10).index()] = 0x50;

        let input = MeshInput {
            blocks,
            light,
            neighbors: NeighborArrays::default(),
            tables,
        };
        let output = build_mesh(&input);
        // A 2x1 bar: 10 exposed faces. Full merging would give 6 quads;
        // the split +Y faces make it 7.
        assert_eq!(output.stats.exposed_faces, 10);
        assert_eq!(output.stats.quads, 7);
    }

    #[test]
    fn test_decoration_becomes_instance() {
        let (_, core) = tables();
        let input = input_with(&[(LocalPos::new(4, 4, 4), core.tall_grass.raw())]);
        let output = build_mesh(&input);
        assert!(output.batches.is_empty());
        assert_eq!(output.instances.len(), 1);
        assert_eq!(output.instances[0].block, core.tall_grass.raw());
        assert_eq!(output.instances[0].position, [4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_quads_wind_outward() {
        let (_, core) = tables();
        let input = input_with(&[(LocalPos::new(8, 8, 8), core.stone.raw())]);
        let output = build_mesh(&input);
        let batch = &output.batches[0];
        for quad in 0..(batch.vertices.len() / 4) {
            let vs: Vec<glam::Vec3> = (0..4)
                .map(|i| glam::Vec3::from_array(batch.vertices[quad * 4 + i].position))
                .collect();
            let normal = glam::Vec3::from_array(batch.vertices[quad * 4].normal);
            let cross = (vs[1] - vs[0]).cross(vs[2] - vs[0]);
            assert!(cross.dot(normal) > 0.0, "quad {quad} winds inward");
        }
    }

    #[test]
    fn test_full_bright_tint_is_white() {
        let (_, core) = tables();
        let input = input_with(&[(LocalPos::new(8, 8, 8), core.stone.raw())]);
        let output = build_mesh(&input);
        assert_eq!(output.batches[0].vertices[0].color, [255, 255, 255, 255]);
    }
}
