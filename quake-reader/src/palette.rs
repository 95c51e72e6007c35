use anyhow::{ensure, Result};

const PALETTE_SIZE: usize = 256 * 3;
const COLORMAP_ROWS: usize = 64;

/// The colormap row that leaves colors at their authored brightness.
pub const NORMAL_BRIGHTNESS_ROW: usize = 32;

/// `gfx/palette.lmp`: 256 RGB triples.
#[derive(Clone)]
pub struct Palette {
    rgb: [[u8; 3]; 256],
}

impl Palette {
    pub fn from_lmp(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= PALETTE_SIZE,
            "palette is {} bytes, expected {}",
            data.len(),
            PALETTE_SIZE,
        );
        let mut rgb = [[0; 3]; 256];
        for (dst, src) in rgb.iter_mut().zip(data.chunks_exact(3)) {
            dst.copy_from_slice(src);
        }
        Ok(Self { rgb })
    }

    pub fn rgb(&self, index: u8) -> [u8; 3] {
        self.rgb[index as usize]
    }

    /// Expands indexed texels to packed RGB. With a colormap, each index is first remapped through
    /// the normal brightness row.
    pub fn expand(&self, indices: &[u8], colormap: Option<&Colormap>) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(indices.len() * 3);
        for &index in indices {
            let index = match colormap {
                Some(colormap) => colormap.get(NORMAL_BRIGHTNESS_ROW, index),
                None => index,
            };
            rgb.extend_from_slice(&self.rgb(index));
        }
        rgb
    }
}

/// `gfx/colormap.lmp`: 64 rows of 256 palette indices, one row per light level.
#[derive(Clone)]
pub struct Colormap {
    rows: Vec<u8>,
}

impl Colormap {
    pub fn from_lmp(data: &[u8]) -> Result<Self> {
        let len = COLORMAP_ROWS * 256;
        // The shipped file carries one trailing byte past the table.
        ensure!(
            data.len() >= len,
            "colormap is {} bytes, expected {}",
            data.len(),
            len,
        );
        Ok(Self {
            rows: data[..len].to_vec(),
        })
    }

    pub fn get(&self, row: usize, index: u8) -> u8 {
        self.rows[row * 256 + index as usize]
    }
}
