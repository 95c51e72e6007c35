use std::collections::HashMap;

use nalgebra_glm::{DVec3, Vec3};
use quake_reader::bsp::{Face, Model, TexInfo, Texture};
use quake_reader::Level;
use texture_atlas::{copy_image, Atlas, AtlasError, Bitmap, LumaU8Image, Tile};
use thiserror::Error;
use tracing::{debug, info};
use try_insert_ext::EntryInsertExt;

use crate::config::BakeConfig;
use crate::record::RecordBuffer;
use crate::sky::{build_sky_box, Bounds};
use crate::vertex::MapVertex;

/// Light type of surfaces drawn at full brightness without a lightmap.
pub const FULLBRIGHT: u8 = 0xff;
/// Base light given to animated and liquid surfaces.
const FULLBRIGHT_LIGHT: u8 = 127;
/// World units per lightmap texel.
const LIGHTMAP_SCALE: f32 = 16.0;
const MIP_PAGES: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BakeError {
    #[error("texture atlas: {0}")]
    TextureAtlas(AtlasError),
    #[error("lightmap atlas: {0}")]
    LightmapAtlas(AtlasError),
    #[error("too many sky textures: {first} and {second}")]
    TooManySkyTextures { first: usize, second: usize },
}

/// Everything needed to draw a level.
pub struct BakedLevel {
    /// Opaque geometry, three [`MapVertex`] records per triangle.
    pub world: RecordBuffer,
    /// Surfaces the sky is seen through.
    pub sky: RecordBuffer,
    /// The two sky planes.
    pub sky_box: RecordBuffer,
    pub textures: LumaU8Image,
    /// Mip levels 1 through 3 of `textures`.
    pub texture_mips: [LumaU8Image; MIP_PAGES],
    pub lightmaps: LumaU8Image,
    pub sky_texture: Option<usize>,
}

pub fn bake_level_with_config(
    level: &Level,
    config: &BakeConfig,
) -> Result<BakedLevel, BakeError> {
    bake_level(level, config.texture_atlas(), config.lightmap_atlas())
}

/// Packs every texture and lightmap of `level` into the given atlases and triangulates its faces.
///
/// Malformed levels with out of range indices panic.
pub fn bake_level(
    level: &Level,
    mut texture_atlas: Atlas,
    lightmap_atlas: Atlas,
) -> Result<BakedLevel, BakeError> {
    let mut texture_mips = mip_pages(&texture_atlas);
    let texture_tiles = pack_textures(level, &mut texture_atlas, &mut texture_mips)?;

    let mut baker = FaceBaker {
        level,
        texture_tiles,
        lightmap_atlas,
        lightmap_tiles: HashMap::new(),
        world: RecordBuffer::for_record::<MapVertex>(),
        sky: RecordBuffer::for_record::<MapVertex>(),
        sky_texture: None,
        sky_bounds: None,
    };
    for model in &level.models {
        for face in level.model_faces(model) {
            baker.bake_face(model, face)?;
        }
    }
    debug!(
        "baked faces: {} world vertices, {} sky vertices, {} lightmaps",
        baker.world.count(),
        baker.sky.count(),
        baker.lightmap_tiles.len(),
    );

    let mut sky_box = RecordBuffer::for_record::<MapVertex>();
    if let (Some(id), Some(bounds)) = (baker.sky_texture, &baker.sky_bounds) {
        if let Some(tile) = &baker.texture_tiles[id] {
            build_sky_box(bounds, tile, &mut sky_box);
        }
    }

    info!(
        "baked level: {} world triangles, {} sky triangles",
        baker.world.count() / 3,
        baker.sky.count() / 3,
    );
    Ok(BakedLevel {
        world: baker.world,
        sky: baker.sky,
        sky_box,
        textures: texture_atlas.bake(),
        texture_mips,
        lightmaps: baker.lightmap_atlas.bake(),
        sky_texture: baker.sky_texture,
    })
}

fn mip_pages(atlas: &Atlas) -> [LumaU8Image; MIP_PAGES] {
    let page = |level: usize| {
        let width = atlas.width() >> level;
        let height = atlas.height() >> level;
        LumaU8Image::new(width, height, vec![0; width * height])
    };
    [page(1), page(2), page(3)]
}

/// Adds every texture to the atlas, largest first, and copies its mips to the same place in the
/// mip pages. Returns the tile of each texture slot.
fn pack_textures(
    level: &Level,
    atlas: &mut Atlas,
    mip_pages: &mut [LumaU8Image; MIP_PAGES],
) -> Result<Vec<Option<Tile>>, BakeError> {
    let mut textures: Vec<(usize, &Texture)> = level
        .textures
        .iter()
        .enumerate()
        .filter_map(|(id, texture)| Some((id, texture.as_ref()?)))
        .collect();
    textures.sort_by(|(_, a), (_, b)| (b.width, b.height).cmp(&(a.width, a.height)));

    let mut tiles = vec![None; level.textures.len()];
    for (id, texture) in textures {
        let tile = atlas
            .add(Bitmap::new(texture.width, texture.height, &texture.mips[0]))
            .map_err(BakeError::TextureAtlas)?;
        for (index, page) in mip_pages.iter_mut().enumerate() {
            let level = index + 1;
            let (width, height) = (texture.width >> level, texture.height >> level);
            if width == 0 || height == 0 {
                continue;
            }
            let page_width = page.width();
            copy_image(
                Bitmap::new(width, height, &texture.mips[level]),
                page.data_mut(),
                page_width,
                tile.x >> level,
                tile.y >> level,
                0,
            );
        }
        tiles[id] = Some(tile);
    }
    debug!("packed {} textures", tiles.iter().flatten().count());
    Ok(tiles)
}

/// The texel rectangle a face's lightmap covers, in lightmap texels relative to the texture
/// space origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightmapExtents {
    pub s: i32,
    pub t: i32,
    pub width: usize,
    pub height: usize,
}

impl LightmapExtents {
    /// Bounds a set of texture space points. There must be at least one.
    pub fn from_points(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut min = (f32::INFINITY, f32::INFINITY);
        let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (s, t) in points {
            min = (min.0.min(s), min.1.min(t));
            max = (max.0.max(s), max.1.max(t));
        }
        assert!(min.0 <= max.0 && min.1 <= max.1, "no points");

        let s = (min.0 / LIGHTMAP_SCALE).floor() as i32;
        let t = (min.1 / LIGHTMAP_SCALE).floor() as i32;
        let s_max = (max.0 / LIGHTMAP_SCALE).ceil() as i32;
        let t_max = (max.1 / LIGHTMAP_SCALE).ceil() as i32;
        Self {
            s,
            t,
            width: (s_max - s) as usize + 1,
            height: (t_max - t) as usize + 1,
        }
    }

    /// Lightmap texel containing a texture space point.
    pub fn texel(&self, (s, t): (f32, f32)) -> (i32, i32) {
        (
            (s / LIGHTMAP_SCALE).floor() as i32 - self.s,
            (t / LIGHTMAP_SCALE).floor() as i32 - self.t,
        )
    }
}

struct FaceBaker<'a> {
    level: &'a Level,
    texture_tiles: Vec<Option<Tile>>,
    lightmap_atlas: Atlas,
    // Keyed by lightmap data offset.
    lightmap_tiles: HashMap<usize, Tile>,
    world: RecordBuffer,
    sky: RecordBuffer,
    sky_texture: Option<usize>,
    sky_bounds: Option<Bounds>,
}

impl<'a> FaceBaker<'a> {
    fn bake_face(&mut self, model: &Model, face: &Face) -> Result<(), BakeError> {
        let level = self.level;
        let tex_info = level.tex_info(face);
        let texture_id = tex_info.texture as usize;
        let tile = self.texture_tiles[texture_id];
        let (texture, texture_tile) = match (level.texture(texture_id), tile) {
            (Some(texture), Some(tile)) if texture.name != "trigger" => (texture, tile),
            _ => return Ok(()),
        };

        let is_sky = texture.name.starts_with("sky");
        if is_sky {
            match self.sky_texture {
                Some(first) if first != texture_id => {
                    return Err(BakeError::TooManySkyTextures {
                        first,
                        second: texture_id,
                    })
                }
                _ => self.sky_texture = Some(texture_id),
            }
        }

        let (base_light, light_type) = match texture.name.chars().next() {
            Some('+' | '*') => (FULLBRIGHT_LIGHT, FULLBRIGHT),
            _ => (face.base_light, face.light_type),
        };
        let light = if base_light == 255 { 0 } else { base_light };

        let ledges = level.face_ledges(face);
        let centroid = centroid(level, ledges);

        let lightmap = match face.lightmap_offset() {
            Some(offset) if light_type != FULLBRIGHT => {
                Some(self.lightmap_tile(tex_info, ledges, offset)?)
            }
            _ => None,
        };

        let vertex = |v: &Vec3| {
            let position = model.origin + v;
            let (s, t) = tex_info.project(v);
            let lightmap = match &lightmap {
                Some((extents, tile)) => {
                    let (x, y) = extents.texel((s, t));
                    [(x + tile.x as i32) as i16, (y + tile.y as i32) as i16]
                }
                None => [-1, -1],
            };
            MapVertex {
                position: [position.x, position.y, position.z],
                texture: [texture_tile.x as u16, texture_tile.y as u16],
                texture_offset: [s as i16, t as i16],
                texture_size: [texture.width as i16, texture.height as i16],
                lightmap,
                light,
                light_type,
            }
        };

        let center = vertex(&centroid);
        let buf = if is_sky { &mut self.sky } else { &mut self.world };
        for &ledge in ledges {
            let (trailing, leading) = level.ledge_vertices(ledge);
            buf.push(&vertex(leading));
            buf.push(&vertex(trailing));
            buf.push(&center);
        }

        if is_sky {
            for &ledge in ledges {
                let (trailing, leading) = level.ledge_vertices(ledge);
                for v in [trailing, leading] {
                    let point = model.origin + v;
                    self.sky_bounds
                        .get_or_insert_with(|| Bounds::new(point))
                        .extend(&point);
                }
            }
        }

        Ok(())
    }

    /// Finds or places the lightmap patch stored at `offset`.
    fn lightmap_tile(
        &mut self,
        tex_info: &TexInfo,
        ledges: &[i32],
        offset: usize,
    ) -> Result<(LightmapExtents, Tile), BakeError> {
        let level = self.level;
        let extents = LightmapExtents::from_points(ledges.iter().flat_map(|&ledge| {
            let (trailing, leading) = level.ledge_vertices(ledge);
            [tex_info.project(trailing), tex_info.project(leading)]
        }));

        let atlas = &mut self.lightmap_atlas;
        let tile = *self
            .lightmap_tiles
            .entry(offset)
            .or_try_insert_with(|| {
                let data = &level.lightmaps[offset..][..extents.width * extents.height];
                atlas
                    .add(Bitmap::new(extents.width, extents.height, data))
                    .map_err(BakeError::LightmapAtlas)
            })?;
        Ok((extents, tile))
    }
}

/// Mean of both endpoints of every edge.
fn centroid(level: &Level, ledges: &[i32]) -> Vec3 {
    let mut sum = DVec3::zeros();
    for &ledge in ledges {
        let (trailing, leading) = level.ledge_vertices(ledge);
        sum += trailing.map(f64::from) + leading.map(f64::from);
    }
    let count = (2 * ledges.len()) as f64;
    sum.map(|c| (c / count) as f32)
}

#[cfg(test)]
mod tests {
    use super::LightmapExtents;

    #[test]
    fn extents_are_inclusive() {
        let extents = LightmapExtents::from_points([(3.0, 0.0), (19.0, 0.0), (40.0, 0.0)]);
        assert_eq!(extents.s, 0);
        assert_eq!(extents.width, 4);
        assert_eq!(extents.height, 1);
    }

    #[test]
    fn extents_of_negative_coordinates() {
        let extents = LightmapExtents::from_points([(-17.0, -32.0), (15.0, 16.0)]);
        assert_eq!((extents.s, extents.t), (-2, -2));
        assert_eq!((extents.width, extents.height), (4, 4));
        assert_eq!(extents.texel((-17.0, -32.0)), (0, 0));
        assert_eq!(extents.texel((15.0, 16.0)), (2, 3));
    }

    #[quickcheck]
    fn texels_stay_inside_the_extents(points: Vec<(i16, i16)>) -> bool {
        if points.is_empty() {
            return true;
        }
        let points: Vec<(f32, f32)> = points
            .into_iter()
            .map(|(s, t)| (s as f32 / 4.0, t as f32 / 4.0))
            .collect();
        let extents = LightmapExtents::from_points(points.iter().copied());
        points.iter().all(|&point| {
            let (x, y) = extents.texel(point);
            x >= 0 && y >= 0 && (x as usize) < extents.width && (y as usize) < extents.height
        })
    }
}
