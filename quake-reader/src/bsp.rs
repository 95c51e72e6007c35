use std::collections::HashMap;
use std::io;

use anyhow::{anyhow, bail, ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use nalgebra_glm::{vec3, Vec3};
use tracing::debug;

use crate::entities;

pub const BSP_VERSION: i32 = 29;

const LUMP_COUNT: usize = 15;
const LUMP_ENTITIES: usize = 0;
const LUMP_PLANES: usize = 1;
const LUMP_TEXTURES: usize = 2;
const LUMP_VERTICES: usize = 3;
const LUMP_TEX_INFO: usize = 6;
const LUMP_FACES: usize = 7;
const LUMP_LIGHTING: usize = 8;
const LUMP_EDGES: usize = 12;
const LUMP_LEDGES: usize = 13;
const LUMP_MODELS: usize = 14;

const PLANE_SIZE: usize = 20;
const VERTEX_SIZE: usize = 12;
const TEX_INFO_SIZE: usize = 40;
const FACE_SIZE: usize = 20;
const EDGE_SIZE: usize = 4;
const LEDGE_SIZE: usize = 4;
const MODEL_SIZE: usize = 64;
const MIP_TEXTURE_HEADER_SIZE: usize = 40;

#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub kind: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub v: [u16; 2],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Face {
    pub plane: u16,
    pub side: u16,
    pub first_ledge: i32,
    pub num_ledges: u16,
    pub tex_info: u16,
    pub light_type: u8,
    pub base_light: u8,
    pub light: [u8; 2],
    /// Byte offset into the lighting lump, or -1 if the face is not lightmapped.
    pub lightmap: i32,
}

impl Face {
    pub fn lightmap_offset(&self) -> Option<usize> {
        usize::try_from(self.lightmap).ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TexInfo {
    pub s: Vec3,
    pub s_dist: f32,
    pub t: Vec3,
    pub t_dist: f32,
    pub texture: u32,
    pub animated: bool,
}

impl TexInfo {
    /// Projects a point into texture space.
    pub fn project(&self, v: &Vec3) -> (f32, f32) {
        (v.dot(&self.s) + self.s_dist, v.dot(&self.t) + self.t_dist)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texture {
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// Full resolution indexed texels followed by three successively halved mips.
    pub mips: [Vec<u8>; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub head_nodes: [i32; 4],
    pub vis_leafs: i32,
    pub first_face: i32,
    pub num_faces: i32,
}

/// A decoded level. Indices between the tables are kept as stored; the accessors panic when
/// they are out of range.
#[derive(Clone, Debug, Default)]
pub struct Level {
    pub entities: Vec<HashMap<String, String>>,
    pub planes: Vec<Plane>,
    pub vertices: Vec<Vec3>,
    pub edges: Vec<Edge>,
    pub ledges: Vec<i32>,
    pub faces: Vec<Face>,
    pub tex_infos: Vec<TexInfo>,
    pub textures: Vec<Option<Texture>>,
    pub models: Vec<Model>,
    pub lightmaps: Vec<u8>,
}

impl Level {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = data;
        let version = r.read_i32::<LittleEndian>().context("reading BSP version")?;
        if version != BSP_VERSION {
            bail!("unsupported BSP version: {}", version);
        }
        let mut lumps = [(0, 0); LUMP_COUNT];
        for lump in lumps.iter_mut() {
            let offset = r.read_i32::<LittleEndian>().context("reading BSP header")?;
            let len = r.read_i32::<LittleEndian>().context("reading BSP header")?;
            *lump = (offset, len);
        }
        let lump = |index| lump_data(data, &lumps, index);

        let level = Level {
            entities: decode_entities(lump(LUMP_ENTITIES)?)?,
            planes: read_records(lump(LUMP_PLANES)?, PLANE_SIZE, "plane", |r| {
                Ok(Plane {
                    normal: read_vec3(r)?,
                    dist: r.read_f32::<LittleEndian>()?,
                    kind: r.read_i32::<LittleEndian>()?,
                })
            })?,
            vertices: read_records(lump(LUMP_VERTICES)?, VERTEX_SIZE, "vertex", read_vec3)?,
            edges: read_records(lump(LUMP_EDGES)?, EDGE_SIZE, "edge", |r| {
                Ok(Edge {
                    v: [r.read_u16::<LittleEndian>()?, r.read_u16::<LittleEndian>()?],
                })
            })?,
            ledges: read_records(lump(LUMP_LEDGES)?, LEDGE_SIZE, "ledge", |r| {
                r.read_i32::<LittleEndian>()
            })?,
            faces: read_records(lump(LUMP_FACES)?, FACE_SIZE, "face", |r| {
                Ok(Face {
                    plane: r.read_u16::<LittleEndian>()?,
                    side: r.read_u16::<LittleEndian>()?,
                    first_ledge: r.read_i32::<LittleEndian>()?,
                    num_ledges: r.read_u16::<LittleEndian>()?,
                    tex_info: r.read_u16::<LittleEndian>()?,
                    light_type: r.read_u8()?,
                    base_light: r.read_u8()?,
                    light: [r.read_u8()?, r.read_u8()?],
                    lightmap: r.read_i32::<LittleEndian>()?,
                })
            })?,
            tex_infos: read_records(lump(LUMP_TEX_INFO)?, TEX_INFO_SIZE, "texinfo", |r| {
                Ok(TexInfo {
                    s: read_vec3(r)?,
                    s_dist: r.read_f32::<LittleEndian>()?,
                    t: read_vec3(r)?,
                    t_dist: r.read_f32::<LittleEndian>()?,
                    texture: r.read_u32::<LittleEndian>()?,
                    animated: r.read_u32::<LittleEndian>()? != 0,
                })
            })?,
            textures: decode_textures(lump(LUMP_TEXTURES)?)?,
            models: read_records(lump(LUMP_MODELS)?, MODEL_SIZE, "model", |r| {
                Ok(Model {
                    mins: read_vec3(r)?,
                    maxs: read_vec3(r)?,
                    origin: read_vec3(r)?,
                    head_nodes: [
                        r.read_i32::<LittleEndian>()?,
                        r.read_i32::<LittleEndian>()?,
                        r.read_i32::<LittleEndian>()?,
                        r.read_i32::<LittleEndian>()?,
                    ],
                    vis_leafs: r.read_i32::<LittleEndian>()?,
                    first_face: r.read_i32::<LittleEndian>()?,
                    num_faces: r.read_i32::<LittleEndian>()?,
                })
            })?,
            lightmaps: lump(LUMP_LIGHTING)?.to_vec(),
        };

        debug!(
            "decoded level: {} models, {} faces, {} textures, {} lightmap bytes",
            level.models.len(),
            level.faces.len(),
            level.textures.iter().flatten().count(),
            level.lightmaps.len(),
        );
        Ok(level)
    }

    pub fn face_ledges(&self, face: &Face) -> &[i32] {
        &self.ledges[face.first_ledge as usize..][..face.num_ledges as usize]
    }

    pub fn model_faces(&self, model: &Model) -> &[Face] {
        &self.faces[model.first_face as usize..][..model.num_faces as usize]
    }

    /// Resolves a ledge to its (trailing, leading) vertices in traversal order.
    pub fn ledge_vertices(&self, ledge: i32) -> (&Vec3, &Vec3) {
        let flipped = usize::from(ledge < 0);
        let edge = &self.edges[ledge.unsigned_abs() as usize];
        (
            &self.vertices[edge.v[0 ^ flipped] as usize],
            &self.vertices[edge.v[1 ^ flipped] as usize],
        )
    }

    pub fn tex_info(&self, face: &Face) -> &TexInfo {
        &self.tex_infos[face.tex_info as usize]
    }

    /// Looks up a texture by id. Empty slots yield `None`.
    pub fn texture(&self, id: usize) -> Option<&Texture> {
        self.textures[id].as_ref()
    }

    pub fn worldspawn(&self) -> Option<&HashMap<String, String>> {
        self.entities
            .iter()
            .find(|entity| entity.get("classname").map(String::as_str) == Some("worldspawn"))
    }
}

fn lump_data<'a>(
    data: &'a [u8],
    lumps: &[(i32, i32); LUMP_COUNT],
    index: usize,
) -> Result<&'a [u8]> {
    let (offset, len) = lumps[index];
    usize::try_from(offset)
        .ok()
        .zip(usize::try_from(len).ok())
        .and_then(|(offset, len)| data.get(offset..offset.checked_add(len)?))
        .ok_or_else(|| anyhow!("lump {} out of range: offset={}, len={}", index, offset, len))
}

fn read_vec3(r: &mut &[u8]) -> io::Result<Vec3> {
    Ok(vec3(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn read_records<T>(
    data: &[u8],
    record_size: usize,
    name: &str,
    mut read: impl FnMut(&mut &[u8]) -> io::Result<T>,
) -> Result<Vec<T>> {
    ensure!(
        data.len() % record_size == 0,
        "{} lump size {} is not a multiple of {}",
        name,
        data.len(),
        record_size,
    );
    let mut r = data;
    let mut records = Vec::with_capacity(data.len() / record_size);
    while !r.is_empty() {
        records.push(read(&mut r).with_context(|| format!("reading {} records", name))?);
    }
    Ok(records)
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

fn decode_entities(data: &[u8]) -> Result<Vec<HashMap<String, String>>> {
    let text = c_string(data);
    entities::parse(&text).map_err(|e| anyhow!("parsing entities: {}", e))
}

fn decode_textures(data: &[u8]) -> Result<Vec<Option<Texture>>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut r = data;
    let count = r.read_i32::<LittleEndian>().context("reading texture count")?;
    let mut textures = Vec::with_capacity(count.max(0) as usize);
    for index in 0..count {
        let offset = r
            .read_i32::<LittleEndian>()
            .context("reading texture offsets")?;
        if offset == -1 {
            textures.push(None);
            continue;
        }
        let texture = usize::try_from(offset)
            .ok()
            .and_then(|offset| data.get(offset..))
            .ok_or_else(|| anyhow!("texture {} offset out of range: {}", index, offset))
            .and_then(decode_texture)
            .with_context(|| format!("decoding texture {}", index))?;
        textures.push(Some(texture));
    }
    Ok(textures)
}

fn decode_texture(data: &[u8]) -> Result<Texture> {
    ensure!(
        data.len() >= MIP_TEXTURE_HEADER_SIZE,
        "truncated texture header"
    );
    let name = c_string(&data[..16]);
    let mut r = &data[16..];
    let width = r.read_u32::<LittleEndian>()? as usize;
    let height = r.read_u32::<LittleEndian>()? as usize;
    let mut mips: [Vec<u8>; 4] = Default::default();
    for (level, mip) in mips.iter_mut().enumerate() {
        let offset = r.read_u32::<LittleEndian>()? as usize;
        let len = (width >> level) * (height >> level);
        *mip = data
            .get(offset..offset + len)
            .ok_or_else(|| anyhow!("{} mip {} out of range", name, level))?
            .to_vec();
    }
    Ok(Texture {
        name,
        width,
        height,
        mips,
    })
}

#[cfg(test)]
pub(crate) mod test_data {
    use byteorder::{LittleEndian, WriteBytesExt};

    use super::{BSP_VERSION, LUMP_COUNT};

    /// Assembles a BSP file from raw lump contents.
    pub fn assemble(version: i32, lumps: &[Vec<u8>; LUMP_COUNT]) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(version).unwrap();
        let mut offset = 4 + 8 * LUMP_COUNT;
        for lump in lumps {
            data.write_i32::<LittleEndian>(offset as i32).unwrap();
            data.write_i32::<LittleEndian>(lump.len() as i32).unwrap();
            offset += lump.len();
        }
        for lump in lumps {
            data.extend_from_slice(lump);
        }
        data
    }

    pub fn miptex(name: &str, width: usize, height: usize, fill: u8) -> Vec<u8> {
        let mut data = vec![0; 16];
        data[..name.len()].copy_from_slice(name.as_bytes());
        data.write_u32::<LittleEndian>(width as u32).unwrap();
        data.write_u32::<LittleEndian>(height as u32).unwrap();
        let mut offset = 40;
        for level in 0..4 {
            data.write_u32::<LittleEndian>(offset as u32).unwrap();
            offset += (width >> level) * (height >> level);
        }
        for level in 0..4 {
            let len = (width >> level) * (height >> level);
            data.extend(std::iter::repeat(fill + level as u8).take(len));
        }
        data
    }

    /// A single textured square face in one model, with one empty texture slot.
    pub fn square_level() -> Vec<u8> {
        let mut lumps: [Vec<u8>; LUMP_COUNT] = Default::default();

        lumps[super::LUMP_ENTITIES] = concat!(
            "{\n",
            "\"classname\" \"worldspawn\"\n",
            "\"message\" \"The Slipgate Complex\"\n",
            "}\n\0",
        )
        .as_bytes()
        .to_vec();

        let plane = &mut lumps[super::LUMP_PLANES];
        for value in [0.0, 0.0, 1.0, 0.0] {
            plane.write_f32::<LittleEndian>(value).unwrap();
        }
        plane.write_i32::<LittleEndian>(2).unwrap();

        let mut textures = Vec::new();
        textures.write_i32::<LittleEndian>(2).unwrap();
        textures.write_i32::<LittleEndian>(-1).unwrap();
        textures.write_i32::<LittleEndian>(12).unwrap();
        textures.extend(miptex("floor1", 16, 8, 10));
        lumps[super::LUMP_TEXTURES] = textures;

        let vertices = &mut lumps[super::LUMP_VERTICES];
        for [x, y] in [[0.0, 0.0], [64.0, 0.0], [64.0, 64.0], [0.0, 64.0]] {
            for value in [x, y, 0.0f32] {
                vertices.write_f32::<LittleEndian>(value).unwrap();
            }
        }

        let tex_info = &mut lumps[super::LUMP_TEX_INFO];
        for value in [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 8.0] {
            tex_info.write_f32::<LittleEndian>(value).unwrap();
        }
        tex_info.write_u32::<LittleEndian>(1).unwrap();
        tex_info.write_u32::<LittleEndian>(0).unwrap();

        let face = &mut lumps[super::LUMP_FACES];
        face.write_u16::<LittleEndian>(0).unwrap();
        face.write_u16::<LittleEndian>(0).unwrap();
        face.write_i32::<LittleEndian>(0).unwrap();
        face.write_u16::<LittleEndian>(4).unwrap();
        face.write_u16::<LittleEndian>(0).unwrap();
        face.extend_from_slice(&[0, 200, 0xff, 0xff]);
        face.write_i32::<LittleEndian>(-1).unwrap();

        lumps[super::LUMP_LIGHTING] = vec![1, 2, 3, 4];

        let edges = &mut lumps[super::LUMP_EDGES];
        for [a, b] in [[0, 0], [0, 1], [1, 2], [3, 2], [0, 3]] {
            edges.write_u16::<LittleEndian>(a).unwrap();
            edges.write_u16::<LittleEndian>(b).unwrap();
        }

        let ledges = &mut lumps[super::LUMP_LEDGES];
        for ledge in [1, 2, -3, -4] {
            ledges.write_i32::<LittleEndian>(ledge).unwrap();
        }

        let model = &mut lumps[super::LUMP_MODELS];
        for value in [0.0, 0.0, 0.0, 64.0, 64.0, 0.0, 0.0, 0.0, 0.0f32] {
            model.write_f32::<LittleEndian>(value).unwrap();
        }
        for value in [0, -1, -1, -1, 1, 0, 1] {
            model.write_i32::<LittleEndian>(value).unwrap();
        }

        assemble(BSP_VERSION, &lumps)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra_glm::vec3;

    use super::test_data::{assemble, square_level};
    use super::{Level, LUMP_COUNT};

    #[test]
    fn decodes_square_level() {
        let level = Level::decode(&square_level()).unwrap();

        assert_eq!(level.planes.len(), 1);
        assert_eq!(level.planes[0].normal, vec3(0.0, 0.0, 1.0));
        assert_eq!(level.vertices.len(), 4);
        assert_eq!(level.edges.len(), 5);
        assert_eq!(level.ledges, [1, 2, -3, -4]);
        assert_eq!(level.lightmaps, [1, 2, 3, 4]);

        assert_eq!(level.textures.len(), 2);
        assert!(level.texture(0).is_none());
        let texture = level.texture(1).unwrap();
        assert_eq!(texture.name, "floor1");
        assert_eq!((texture.width, texture.height), (16, 8));
        assert_eq!(texture.mips[0], vec![10; 128]);
        assert_eq!(texture.mips[3], vec![13; 2]);

        let face = &level.faces[0];
        assert_eq!(face.base_light, 200);
        assert_eq!(face.light_type, 0);
        assert_eq!(face.lightmap_offset(), None);
        assert_eq!(level.tex_info(face).t_dist, 8.0);
        assert_eq!(level.tex_info(face).texture, 1);

        let model = &level.models[0];
        assert_eq!(model.maxs, vec3(64.0, 64.0, 0.0));
        assert_eq!(level.model_faces(model).len(), 1);

        assert_eq!(
            level.worldspawn().unwrap()["message"],
            "The Slipgate Complex"
        );
    }

    #[test]
    fn ledges_follow_edge_direction() {
        let level = Level::decode(&square_level()).unwrap();
        let face = &level.faces[0];
        let walk: Vec<_> = level
            .face_ledges(face)
            .iter()
            .map(|&ledge| level.ledge_vertices(ledge))
            .collect();
        for (index, &(trailing, leading)) in walk.iter().enumerate() {
            // Each edge continues where the previous one ended.
            assert_eq!(leading, walk[(index + 1) % walk.len()].0);
            assert_ne!(trailing, leading);
        }
        // The third ledge is edge 3 reversed: 2 -> 3.
        assert_eq!(walk[2], (&level.vertices[2], &level.vertices[3]));
    }

    #[test]
    fn rejects_other_versions() {
        let lumps: [Vec<u8>; LUMP_COUNT] = Default::default();
        let err = Level::decode(&assemble(30, &lumps)).unwrap_err();
        assert!(err.to_string().contains("unsupported BSP version"));
    }

    #[test]
    fn rejects_truncated_lumps() {
        let mut data = square_level();
        data.truncate(data.len() - 10);
        assert!(Level::decode(&data).is_err());
    }
}
