use byteorder::{ByteOrder, NativeEndian};

use crate::record::{Record, RecordBuffer};

/// One triangle corner of baked level geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapVertex {
    pub position: [f32; 3],
    /// Top-left texel of the texture tile.
    pub texture: [u16; 2],
    /// Texture-space position before wrapping to the tile.
    pub texture_offset: [i16; 2],
    pub texture_size: [i16; 2],
    /// Lightmap atlas texel, or `[-1, -1]` for unlit geometry.
    pub lightmap: [i16; 2],
    pub light: u8,
    /// Light style. 0xff marks fullbright surfaces.
    pub light_type: u8,
}

impl MapVertex {
    /// Reads a vertex back from its serialized form.
    pub fn read(data: &[u8]) -> Self {
        assert_eq!(data.len(), Self::SIZE);
        let f32_at = |offset| NativeEndian::read_f32(&data[offset..]);
        let u16_at = |offset| NativeEndian::read_u16(&data[offset..]);
        let i16_at = |offset| NativeEndian::read_i16(&data[offset..]);
        Self {
            position: [f32_at(0), f32_at(4), f32_at(8)],
            texture: [u16_at(12), u16_at(14)],
            texture_offset: [i16_at(16), i16_at(18)],
            texture_size: [i16_at(20), i16_at(22)],
            lightmap: [i16_at(24), i16_at(26)],
            light: data[28],
            light_type: data[29],
        }
    }
}

impl Record for MapVertex {
    const SIZE: usize = 30;

    fn write_to(&self, buf: &mut RecordBuffer) {
        for &value in &self.position {
            buf.f32(value);
        }
        for &value in &self.texture {
            buf.u16(value);
        }
        for &value in self
            .texture_offset
            .iter()
            .chain(&self.texture_size)
            .chain(&self.lightmap)
        {
            buf.i16(value);
        }
        buf.u8(self.light);
        buf.u8(self.light_type);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    F32,
    U16,
    I16,
    U8,
}

impl ComponentKind {
    pub fn size(self) -> usize {
        match self {
            ComponentKind::F32 => 4,
            ComponentKind::U16 | ComponentKind::I16 => 2,
            ComponentKind::U8 => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub offset: usize,
    pub components: usize,
    pub kind: ComponentKind,
}

/// Layout of a serialized [`MapVertex`], in declaration order.
pub const VERTEX_ATTRIBUTES: [VertexAttribute; 7] = [
    VertexAttribute {
        name: "position",
        offset: 0,
        components: 3,
        kind: ComponentKind::F32,
    },
    VertexAttribute {
        name: "texture",
        offset: 12,
        components: 2,
        kind: ComponentKind::U16,
    },
    VertexAttribute {
        name: "texture_offset",
        offset: 16,
        components: 2,
        kind: ComponentKind::I16,
    },
    VertexAttribute {
        name: "texture_size",
        offset: 20,
        components: 2,
        kind: ComponentKind::I16,
    },
    VertexAttribute {
        name: "lightmap",
        offset: 24,
        components: 2,
        kind: ComponentKind::I16,
    },
    VertexAttribute {
        name: "light",
        offset: 28,
        components: 1,
        kind: ComponentKind::U8,
    },
    VertexAttribute {
        name: "light_type",
        offset: 29,
        components: 1,
        kind: ComponentKind::U8,
    },
];
