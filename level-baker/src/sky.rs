use nalgebra_glm::{max2, min2, vec3, Vec3};
use texture_atlas::Tile;

use crate::record::RecordBuffer;
use crate::vertex::MapVertex;

/// How far the sky planes extend past the sky surfaces on each horizontal side.
pub const SKY_INFLATE: f32 = 2000.0;
/// Vertical distance between the two sky planes.
pub const SKY_LAYER_SPACING: f32 = 100.0;

/// An axis-aligned box grown one point at a time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(point: Vec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    pub fn extend(&mut self, point: &Vec3) {
        self.min = min2(&self.min, point);
        self.max = max2(&self.max, point);
    }
}

/// Emits the two scrolling sky planes above `bounds`.
///
/// Each plane is a quad of two triangles at the top of the bounds, `z` layers up. The sky tile
/// holds both layers side by side; layer `z` samples half `z` and carries `z` as its light type
/// so the renderer can tell them apart.
pub fn build_sky_box(bounds: &Bounds, tile: &Tile, buf: &mut RecordBuffer) {
    let inflate = vec3(SKY_INFLATE, SKY_INFLATE, 0.0);
    let min = bounds.min - inflate;
    let max = bounds.max + inflate;
    let half_width = tile.width / 2;

    for z in 0..2u8 {
        let height = max.z + SKY_LAYER_SPACING * z as f32;
        let corners = [
            (min.x, min.y),
            (min.x, max.y),
            (max.x, min.y),
            (min.x, max.y),
            (max.x, max.y),
            (max.x, min.y),
        ];
        for (x, y) in corners {
            buf.push(&MapVertex {
                position: [x, y, height],
                texture: [
                    (tile.x + half_width * z as usize) as u16,
                    tile.y as u16,
                ],
                texture_size: [half_width as i16, tile.height as i16],
                light_type: z,
                ..Default::default()
            });
        }
    }
}
