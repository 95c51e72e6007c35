#[cfg(test)]
#[macro_use]
extern crate quickcheck_macros;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Result;
use thiserror::Error;

/// An 8-bit single channel image, used for baked atlas pages.
pub struct LumaU8Image {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl LumaU8Image {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        assert!(x < self.width && y < self.height);
        self.data[self.width * y + x]
    }

    pub fn write_to_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let w = BufWriter::new(File::create(path)?);
        let mut encoder = png::Encoder::new(w, self.width as u32, self.height as u32);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.data)?;
        Ok(())
    }
}

/// A borrowed row-major 8-bit bitmap to be placed in an atlas.
#[derive(Clone, Copy)]
pub struct Bitmap<'a> {
    width: usize,
    height: usize,
    data: &'a [u8],
}

impl<'a> Bitmap<'a> {
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Self {
        assert!(width > 0 && height > 0, "empty bitmap: {}x{}", width, height);
        assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Samples the bitmap, moving out of bounds coordinates to the nearest edge.
    fn get_clamped(&self, x: isize, y: isize) -> u8 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[self.width * y + x]
    }
}

/// The location of a placed bitmap. Padding is not included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtlasError {
    #[error("atlas full: no free space for a {width}x{height} tile")]
    Full { width: usize, height: usize },
}

struct Region {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    used: bool,
    // Leftover space split off below this region after it was used.
    children: Vec<usize>,
}

/// A fixed-size page of 8-bit texels that bitmaps are packed into.
///
/// Placement is first-fit over a guillotine tree of free regions: the regions are searched
/// depth-first in insertion order, descending into the leftovers of used regions. The packing
/// result therefore depends on insertion order, and callers should add larger bitmaps first.
pub struct Atlas {
    width: usize,
    height: usize,
    padding: usize,
    data: Vec<u8>,
    regions: Vec<Region>,
    roots: Vec<usize>,
}

impl Atlas {
    /// Creates an empty atlas. Every tile is surrounded by `padding` texels duplicated from its
    /// edges, so filtering near a tile border never picks up a neighboring tile.
    pub fn new(width: usize, height: usize, padding: usize) -> Self {
        Self {
            width,
            height,
            padding,
            data: vec![0; width * height],
            regions: vec![Region {
                x: 0,
                y: 0,
                width,
                height,
                used: false,
                children: Vec::new(),
            }],
            roots: vec![0],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Copies a bitmap into the atlas and returns where it landed.
    ///
    /// On failure the atlas is left untouched.
    pub fn add(&mut self, bitmap: Bitmap) -> Result<Tile, AtlasError> {
        let width = bitmap.width + 2 * self.padding;
        let height = bitmap.height + 2 * self.padding;

        let (parent, index) = self
            .find_free(&self.roots, None, width, height)
            .ok_or(AtlasError::Full {
                width: bitmap.width,
                height: bitmap.height,
            })?;
        let Region {
            x,
            y,
            width: free_width,
            height: free_height,
            ..
        } = self.regions[index];

        if free_width > width {
            // Space to the right keeps the full height and sits next to the used region.
            let sibling = self.push_region(x + width, y, free_width - width, free_height);
            match parent {
                Some(parent) => self.regions[parent].children.push(sibling),
                None => self.roots.push(sibling),
            }
        }
        if free_height > height {
            // Space below is limited to the used width and belongs to the used region.
            let child = self.push_region(x, y + height, width, free_height - height);
            self.regions[index].children.push(child);
        }

        let region = &mut self.regions[index];
        region.used = true;
        region.width = width;
        region.height = height;

        copy_image(bitmap, &mut self.data, self.width, x, y, self.padding);

        Ok(Tile {
            x: x + self.padding,
            y: y + self.padding,
            width: bitmap.width,
            height: bitmap.height,
        })
    }

    /// Finishes packing. The free space bookkeeping is dropped and only the texels remain.
    pub fn bake(self) -> LumaU8Image {
        LumaU8Image::new(self.width, self.height, self.data)
    }

    fn push_region(&mut self, x: usize, y: usize, width: usize, height: usize) -> usize {
        self.regions.push(Region {
            x,
            y,
            width,
            height,
            used: false,
            children: Vec::new(),
        });
        self.regions.len() - 1
    }

    fn find_free(
        &self,
        list: &[usize],
        parent: Option<usize>,
        width: usize,
        height: usize,
    ) -> Option<(Option<usize>, usize)> {
        for &index in list {
            let region = &self.regions[index];
            if region.used {
                if let Some(found) = self.find_free(&region.children, Some(index), width, height) {
                    return Some(found);
                }
            } else if region.width >= width && region.height >= height {
                return Some((parent, index));
            }
        }
        None
    }
}

/// Writes `bitmap` into a row-major destination buffer `dst_width` texels wide, with its padded
/// top-left corner at (`x`, `y`). Padding texels repeat the nearest edge texel.
pub fn copy_image(
    bitmap: Bitmap,
    dst: &mut [u8],
    dst_width: usize,
    x: usize,
    y: usize,
    padding: usize,
) {
    let padded_width = bitmap.width + 2 * padding;
    let padded_height = bitmap.height + 2 * padding;
    assert!(x + padded_width <= dst_width);
    for row in 0..padded_height {
        let dst_offset = dst_width * (y + row) + x;
        let src_y = row as isize - padding as isize;
        for (col, texel) in dst[dst_offset..dst_offset + padded_width]
            .iter_mut()
            .enumerate()
        {
            *texel = bitmap.get_clamped(col as isize - padding as isize, src_y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Atlas, AtlasError, Bitmap, LumaU8Image, Tile};

    fn pattern(width: usize, height: usize, seed: u8) -> Vec<u8> {
        (0..width * height)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    fn read_back(image: &LumaU8Image, tile: Tile) -> Vec<u8> {
        let mut data = Vec::new();
        for y in tile.y..tile.y + tile.height {
            for x in tile.x..tile.x + tile.width {
                data.push(image.get(x, y));
            }
        }
        data
    }

    fn overlaps(a: Tile, b: Tile) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    fn clamp_size(value: u8) -> usize {
        value as usize % 24 + 1
    }

    #[test]
    fn first_fit_order() {
        let mut atlas = Atlas::new(64, 64, 0);
        let a = pattern(32, 16, 0);
        let b = pattern(16, 16, 1);
        let c = pattern(32, 32, 2);
        let d = pattern(16, 16, 3);

        let placed = [
            atlas.add(Bitmap::new(32, 16, &a)).unwrap(),
            atlas.add(Bitmap::new(16, 16, &b)).unwrap(),
            atlas.add(Bitmap::new(32, 32, &c)).unwrap(),
            atlas.add(Bitmap::new(16, 16, &d)).unwrap(),
        ];
        let origins: Vec<_> = placed.iter().map(|tile| (tile.x, tile.y)).collect();
        // The second tile descends into the space below the first and the third falls through
        // to the right-hand remainder of the root. The fourth is found below the second before
        // the remainder beside it is considered.
        assert_eq!(origins, [(0, 0), (0, 16), (32, 0), (0, 32)]);
    }

    #[test]
    fn exact_fill_then_full() {
        let mut atlas = Atlas::new(32, 32, 0);
        let data = pattern(16, 16, 7);
        for _ in 0..4 {
            atlas.add(Bitmap::new(16, 16, &data)).unwrap();
        }
        assert_eq!(
            atlas.add(Bitmap::new(1, 1, &[0])),
            Err(AtlasError::Full {
                width: 1,
                height: 1
            }),
        );
    }

    #[test]
    fn oversized_tile_fails_without_side_effects() {
        let mut atlas = Atlas::new(32, 32, 0);
        let big = pattern(33, 8, 0);
        assert_eq!(
            atlas.add(Bitmap::new(33, 8, &big)),
            Err(AtlasError::Full {
                width: 33,
                height: 8
            }),
        );

        // The whole page is still available.
        let full = pattern(32, 32, 5);
        let tile = atlas.add(Bitmap::new(32, 32, &full)).unwrap();
        assert_eq!(
            tile,
            Tile {
                x: 0,
                y: 0,
                width: 32,
                height: 32
            }
        );
        assert_eq!(atlas.bake().data(), &full[..]);
    }

    #[test]
    fn padding_counts_against_capacity() {
        let mut atlas = Atlas::new(16, 16, 1);
        let data = pattern(15, 15, 0);
        assert!(atlas.add(Bitmap::new(15, 15, &data)).is_err());
        let data = pattern(14, 14, 0);
        assert_eq!(
            atlas.add(Bitmap::new(14, 14, &data)),
            Ok(Tile {
                x: 1,
                y: 1,
                width: 14,
                height: 14
            }),
        );
    }

    #[test]
    fn padding_repeats_edges() {
        let padding = 2;
        let mut atlas = Atlas::new(32, 32, padding);
        let data = pattern(5, 3, 11);
        let bitmap = Bitmap::new(5, 3, &data);
        let tile = atlas.add(bitmap).unwrap();
        let image = atlas.bake();

        for d in 1..=padding {
            for y in 0..3 {
                assert_eq!(image.get(tile.x - d, tile.y + y), data[5 * y]);
                assert_eq!(image.get(tile.x + 4 + d, tile.y + y), data[5 * y + 4]);
            }
            for x in 0..5 {
                assert_eq!(image.get(tile.x + x, tile.y - d), data[x]);
                assert_eq!(image.get(tile.x + x, tile.y + 2 + d), data[10 + x]);
            }
            // Corners clamp on both axes.
            assert_eq!(image.get(tile.x - d, tile.y - d), data[0]);
            assert_eq!(image.get(tile.x + 4 + d, tile.y + 2 + d), data[14]);
        }
    }

    #[quickcheck]
    fn placed_tiles_are_disjoint_and_in_bounds(sizes: Vec<(u8, u8)>, padding: u8) -> bool {
        let padding = padding as usize % 3;
        let mut atlas = Atlas::new(128, 96, padding);
        let mut tiles: Vec<Tile> = Vec::new();
        for (width, height) in sizes {
            let (width, height) = (clamp_size(width), clamp_size(height));
            let data = vec![0; width * height];
            if let Ok(tile) = atlas.add(Bitmap::new(width, height, &data)) {
                if tile.width != width || tile.height != height {
                    return false;
                }
                tiles.push(tile);
            }
        }

        let padded = |tile: Tile| Tile {
            x: tile.x - padding,
            y: tile.y - padding,
            width: tile.width + 2 * padding,
            height: tile.height + 2 * padding,
        };
        tiles.iter().all(|&tile| {
            let tile = padded(tile);
            tile.x + tile.width <= 128 && tile.y + tile.height <= 96
        }) && tiles.iter().enumerate().all(|(i, &a)| {
            tiles[i + 1..]
                .iter()
                .all(|&b| !overlaps(padded(a), padded(b)))
        })
    }

    #[quickcheck]
    fn placed_tiles_read_back(sizes: Vec<(u8, u8)>, padding: u8) -> bool {
        let padding = padding as usize % 3;
        let mut atlas = Atlas::new(128, 128, padding);
        let mut placed = Vec::new();
        for (seed, (width, height)) in sizes.into_iter().enumerate() {
            let (width, height) = (clamp_size(width), clamp_size(height));
            let data = pattern(width, height, seed as u8);
            if let Ok(tile) = atlas.add(Bitmap::new(width, height, &data)) {
                placed.push((tile, data));
            }
        }

        let image = atlas.bake();
        placed
            .into_iter()
            .all(|(tile, data)| read_back(&image, tile) == data)
    }
}
